//! ChaCha20-Poly1305 AEAD, composed by hand per RFC 8439 (§4.2 of the spec).
//!
//! We deliberately don't reach for the all-in-one `chacha20poly1305` crate:
//! the point of this module is to own the composition (one-time key at
//! counter 0, data keystream from counter 1, AAD/ciphertext/length-trailer
//! MAC framing, constant-time tag compare, secure wipe) rather than delegate
//! it. The primitives themselves (`chacha20`, `poly1305`) come straight from
//! RustCrypto, the same family ZeroTier's own crypto crate wraps.

mod chacha20;
mod poly1305;

use zeroize::Zeroize;

pub const NONCE_LEN: usize = 12;
pub const TAG_LEN: usize = poly1305::TAG_LEN;
pub const KEY_LEN: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("AEAD authentication failed")]
    AuthFailure,
}

/// Encrypt `plaintext` into `ciphertext` (same length) and produce the tag,
/// authenticating `aad` but not encrypting it.
pub fn seal(
    key: &[u8; KEY_LEN],
    nonce: &[u8; NONCE_LEN],
    aad: &[u8],
    plaintext: &[u8],
    ciphertext: &mut [u8],
) -> [u8; TAG_LEN] {
    let mut block0 = chacha20::keystream_block0(key, nonce);
    let mut otk = [0u8; poly1305::ONE_TIME_KEY_LEN];
    otk.copy_from_slice(&block0[..32]);
    block0.zeroize();

    chacha20::xor_from_counter1(key, nonce, plaintext, ciphertext);
    let tag = poly1305::tag(&otk, aad, ciphertext);
    otk.zeroize();
    tag
}

/// Verify `tag` and, only on success, decrypt `ciphertext` into `plaintext`
/// (same length). On authentication failure `plaintext` is left untouched
/// and zeroed — the caller must not release its prior contents.
pub fn open(
    key: &[u8; KEY_LEN],
    nonce: &[u8; NONCE_LEN],
    aad: &[u8],
    ciphertext: &[u8],
    tag: &[u8; TAG_LEN],
    plaintext: &mut [u8],
) -> Result<(), AuthError> {
    let mut block0 = chacha20::keystream_block0(key, nonce);
    let mut otk = [0u8; poly1305::ONE_TIME_KEY_LEN];
    otk.copy_from_slice(&block0[..32]);
    block0.zeroize();

    let expected = poly1305::tag(&otk, aad, ciphertext);
    otk.zeroize();

    if !poly1305::tags_equal(&expected, tag) {
        plaintext.zeroize();
        return Err(AuthError::AuthFailure);
    }

    chacha20::xor_from_counter1(key, nonce, ciphertext, plaintext);
    Ok(())
}

/// Derive the per-packet nonce: `packet_id` big-endian in the first four
/// bytes, the source address in the next six, two zero bytes trailing.
/// Session separation comes from which session key is in use, not from
/// nonce content — `(src, packet_id)` pairs simply must not repeat within a
/// session, which is the sender's responsibility (spec §4.2).
pub fn derive_packet_nonce(packet_id: u32, src: &crate::address::Address) -> [u8; NONCE_LEN] {
    let mut nonce = [0u8; NONCE_LEN];
    nonce[0..4].copy_from_slice(&packet_id.to_be_bytes());
    nonce[4..10].copy_from_slice(src.as_bytes());
    nonce
}

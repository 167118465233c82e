//! Thin wrapper over the RustCrypto `chacha20` block cipher giving us the
//! two keystream regions RFC 8439 composition needs: the 64-byte block at
//! counter 0 (source of the Poly1305 one-time key) and the keystream
//! starting at counter 1 (source of ciphertext).

use chacha20::cipher::{KeyIvInit, StreamCipher};
use chacha20::ChaCha20;
use zeroize::Zeroize;

/// `ChaCha20` keystream applied to `buf` in place, counter starting at 0.
/// A freshly constructed cipher instance always starts at counter 0, so the
/// first 64 bytes produced are exactly the counter-0 block and everything
/// after is the counter-1-onward stream the spec calls for — callers that
/// want both (derive the Poly1305 key, then encrypt) just keep using the
/// same `apply_keystream` call across a longer buffer, or in two calls on
/// the same cipher instance as [`keystream_block0`] and [`xor_from_counter1`]
/// do.
fn new_cipher(key: &[u8; 32], nonce: &[u8; 12]) -> ChaCha20 {
    ChaCha20::new(key.into(), nonce.into())
}

/// The 64-byte keystream block at counter 0 — the Poly1305 one-time key
/// lives in its first 32 bytes (RFC 8439 §2.6).
pub fn keystream_block0(key: &[u8; 32], nonce: &[u8; 12]) -> [u8; 64] {
    let mut cipher = new_cipher(key, nonce);
    let mut block = [0u8; 64];
    cipher.apply_keystream(&mut block);
    block
}

/// XOR `data` with the ChaCha20 keystream starting at counter 1, writing the
/// result into `out` (same length as `data`). Used for both encryption and
/// decryption since ChaCha20 is a symmetric stream cipher.
pub fn xor_from_counter1(key: &[u8; 32], nonce: &[u8; 12], data: &[u8], out: &mut [u8]) {
    debug_assert_eq!(data.len(), out.len());
    let mut cipher = new_cipher(key, nonce);
    // Advance past the counter-0 block without keeping its output.
    let mut discard = [0u8; 64];
    cipher.apply_keystream(&mut discard);
    discard.zeroize();

    out.copy_from_slice(data);
    cipher.apply_keystream(out);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keystream_is_deterministic_for_a_given_key_and_nonce() {
        let key = [0x11u8; 32];
        let nonce = [0x22u8; 12];
        assert_eq!(keystream_block0(&key, &nonce), keystream_block0(&key, &nonce));
    }

    #[test]
    fn different_nonces_give_different_keystreams() {
        let key = [0x11u8; 32];
        assert_ne!(
            keystream_block0(&key, &[0u8; 12]),
            keystream_block0(&key, &[1u8; 12])
        );
    }

    #[test]
    fn xor_is_its_own_inverse() {
        let key = [0x33u8; 32];
        let nonce = [0x44u8; 12];
        let plaintext = b"round trip me please";
        let mut ciphertext = vec![0u8; plaintext.len()];
        xor_from_counter1(&key, &nonce, plaintext, &mut ciphertext);
        assert_ne!(ciphertext.as_slice(), plaintext.as_slice());

        let mut back = vec![0u8; plaintext.len()];
        xor_from_counter1(&key, &nonce, &ciphertext, &mut back);
        assert_eq!(back.as_slice(), plaintext.as_slice());
    }
}

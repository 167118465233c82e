//! Thin wrapper over the RustCrypto `poly1305` one-time MAC, used to build
//! the RFC 8439 `AAD || pad16 || ciphertext || pad16 || len(AAD) || len(ct)`
//! authentication input by hand (see [`crate::aead::seal`]/[`open`]).

use poly1305::universal_hash::{KeyInit, UniversalHash};
use poly1305::Poly1305;

pub const TAG_LEN: usize = 16;
pub const ONE_TIME_KEY_LEN: usize = 32;

/// Compute the RFC 8439 tag over `aad` and `ciphertext` under one-time key
/// `otk`. `update_padded` implicitly zero-pads each region to a 16-byte
/// boundary, which is exactly the `pad16` RFC 8439 calls for.
pub fn tag(otk: &[u8; ONE_TIME_KEY_LEN], aad: &[u8], ciphertext: &[u8]) -> [u8; TAG_LEN] {
    let mut mac = Poly1305::new(otk.into());
    mac.update_padded(aad);
    mac.update_padded(ciphertext);

    let mut trailer = [0u8; 16];
    trailer[0..8].copy_from_slice(&(aad.len() as u64).to_le_bytes());
    trailer[8..16].copy_from_slice(&(ciphertext.len() as u64).to_le_bytes());
    mac.update_padded(&trailer);

    mac.finalize().into()
}

/// Constant-time tag comparison: branch- and access-pattern independent of
/// where (or whether) the tags differ.
pub fn tags_equal(a: &[u8; TAG_LEN], b: &[u8; TAG_LEN]) -> bool {
    let mut diff = 0u8;
    for i in 0..TAG_LEN {
        diff |= a[i] ^ b[i];
    }
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_is_deterministic() {
        let otk = [0x5u8; ONE_TIME_KEY_LEN];
        let a = tag(&otk, b"aad", b"ciphertext");
        let b = tag(&otk, b"aad", b"ciphertext");
        assert_eq!(a, b);
    }

    #[test]
    fn tag_changes_with_aad_or_ciphertext() {
        let otk = [0x5u8; ONE_TIME_KEY_LEN];
        let base = tag(&otk, b"aad", b"ciphertext");
        assert_ne!(base, tag(&otk, b"aad!", b"ciphertext"));
        assert_ne!(base, tag(&otk, b"aad", b"ciphertext!"));
    }

    #[test]
    fn tags_equal_detects_single_bit_flip() {
        let mut t1 = [0u8; TAG_LEN];
        for (i, b) in t1.iter_mut().enumerate() {
            *b = i as u8;
        }
        let mut t2 = t1;
        t2[7] ^= 0x01;
        assert!(tags_equal(&t1, &t1));
        assert!(!tags_equal(&t1, &t2));
    }
}

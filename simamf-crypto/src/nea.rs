//! NEA2 (128-EEA2): AES-CTR based NAS ciphering

use aes::Aes128;
use ctr::cipher::{KeyIvInit, StreamCipher};

use crate::KEY_SIZE;

type Aes128Ctr = ctr::Ctr128BE<Aes128>;

/// Encrypts or decrypts `data` in place with NEA2.
///
/// Initial counter block:
/// ```text
/// | COUNT (32 bits) | BEARER (5 bits) | DIRECTION (1 bit) | 0 (90 bits) |
/// ```
pub fn nea2_apply(count: u32, bearer: u8, direction: u8, key: &[u8; KEY_SIZE], data: &mut [u8]) {
    let iv = build_nea2_iv(count, bearer, direction);
    let mut cipher = Aes128Ctr::new(key.into(), &iv.into());
    cipher.apply_keystream(data);
}

fn build_nea2_iv(count: u32, bearer: u8, direction: u8) -> [u8; 16] {
    let mut iv = [0u8; 16];
    iv[..4].copy_from_slice(&count.to_be_bytes());
    iv[4] = ((bearer & 0x1F) << 3) | ((direction & 0x01) << 2);
    iv
}

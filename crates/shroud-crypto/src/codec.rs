//! Message codec: AES-256-CBC with PKCS#7 padding.
//!
//! Wire form: `IV(16) || ciphertext`. A fresh random IV is drawn for every
//! call to [`encrypt`].

use aes::Aes256;
use cbc::cipher::block_padding::{NoPadding, Pkcs7};
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};

use crate::types::SymmetricKey;
use crate::utils::ct_lt_mask;

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

/// Cipher block size and IV length.
pub const BLOCK_SIZE: usize = 16;
pub const IV_LEN: usize = 16;

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("envelope too short: {0} bytes")]
    TooShort(usize),
    #[error("ciphertext length {0} is not a multiple of the block size")]
    Misaligned(usize),
    /// Wrong key and corrupted padding yield the same error.
    #[error("decryption failed")]
    DecryptFailed,
    #[error("RNG failed")]
    RngError,
}

/// Encrypt `plaintext` under `key`, returning `IV || ciphertext`.
pub fn encrypt(key: &SymmetricKey, plaintext: &[u8]) -> Result<Vec<u8>, CodecError> {
    let mut iv = [0u8; IV_LEN];
    getrandom::getrandom(&mut iv).map_err(|_| CodecError::RngError)?;
    Ok(encrypt_with_iv(key, &iv, plaintext))
}

pub(crate) fn encrypt_with_iv(key: &SymmetricKey, iv: &[u8; IV_LEN], plaintext: &[u8]) -> Vec<u8> {
    let ct = Aes256CbcEnc::new(key.as_bytes().into(), iv.into())
        .encrypt_padded_vec_mut::<Pkcs7>(plaintext);

    let mut out = Vec::with_capacity(IV_LEN + ct.len());
    out.extend_from_slice(iv);
    out.extend_from_slice(&ct);
    out
}

/// Decrypt an `IV || ciphertext` envelope.
pub fn decrypt(key: &SymmetricKey, envelope: &[u8]) -> Result<Vec<u8>, CodecError> {
    if envelope.len() < IV_LEN + BLOCK_SIZE {
        return Err(CodecError::TooShort(envelope.len()));
    }
    let (iv, ct) = envelope.split_at(IV_LEN);
    if ct.len() % BLOCK_SIZE != 0 {
        return Err(CodecError::Misaligned(ct.len()));
    }

    let mut padded = Aes256CbcDec::new(key.as_bytes().into(), iv.into())
        .decrypt_padded_vec_mut::<NoPadding>(ct)
        .map_err(|_| CodecError::DecryptFailed)?;

    let pad_len = pkcs7_pad_len(&padded)?;
    padded.truncate(padded.len() - pad_len);
    Ok(padded)
}

/// Validate PKCS#7 padding over the final block without data-dependent
/// branches, returning the pad length.
fn pkcs7_pad_len(padded: &[u8]) -> Result<usize, CodecError> {
    let last = &padded[padded.len() - BLOCK_SIZE..];
    let pad = last[BLOCK_SIZE - 1];

    // pad must be in 1..=16
    let mut bad = ct_lt_mask(pad, 1) | ct_lt_mask(BLOCK_SIZE as u8, pad);
    for (i, &b) in last.iter().rev().enumerate() {
        let in_pad = ct_lt_mask(i as u8, pad);
        bad |= in_pad & (b ^ pad);
    }

    if bad == 0 {
        Ok(pad as usize)
    } else {
        Err(CodecError::DecryptFailed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(b: u8) -> SymmetricKey {
        SymmetricKey::from_bytes([b; 32])
    }

    #[test]
    fn test_round_trip() {
        let k = key(0x42);
        let env = encrypt(&k, b"Hello, encrypted world!").unwrap();
        assert_eq!(decrypt(&k, &env).unwrap(), b"Hello, encrypted world!");
    }

    #[test]
    fn test_empty_plaintext_gets_full_pad_block() {
        let k = key(1);
        let env = encrypt(&k, b"").unwrap();
        assert_eq!(env.len(), IV_LEN + BLOCK_SIZE);
        assert!(decrypt(&k, &env).unwrap().is_empty());
    }

    #[test]
    fn test_block_aligned_plaintext_adds_block() {
        let k = key(2);
        let env = encrypt(&k, &[0x55; 32]).unwrap();
        assert_eq!(env.len(), IV_LEN + 48);
    }

    #[test]
    fn test_fresh_iv_per_message() {
        let k = key(3);
        let a = encrypt(&k, b"same").unwrap();
        let b = encrypt(&k, b"same").unwrap();
        assert_ne!(a[..IV_LEN], b[..IV_LEN]);
        assert_ne!(a, b);
        assert_eq!(decrypt(&k, &a).unwrap(), decrypt(&k, &b).unwrap());
    }

    #[test]
    fn test_known_vector_is_stable() {
        let k = key(0);
        let iv = [0u8; IV_LEN];
        let first = encrypt_with_iv(&k, &iv, b"abc");
        let second = encrypt_with_iv(&k, &iv, b"abc");
        assert_eq!(first, second);
        assert_eq!(&first[..IV_LEN], &iv);
    }

    #[test]
    fn test_too_short_rejected() {
        let k = key(4);
        assert!(matches!(decrypt(&k, &[0u8; 20]), Err(CodecError::TooShort(20))));
    }

    #[test]
    fn test_misaligned_rejected() {
        let k = key(4);
        assert!(matches!(
            decrypt(&k, &[0u8; IV_LEN + 17]),
            Err(CodecError::Misaligned(17))
        ));
    }

    #[test]
    fn test_wrong_key_fails_or_differs() {
        let env = encrypt(&key(5), b"for someone else").unwrap();
        match decrypt(&key(6), &env) {
            Err(CodecError::DecryptFailed) => {}
            Ok(pt) => assert_ne!(pt, b"for someone else"),
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_pad_validation() {
        let mut block = [0u8; BLOCK_SIZE];
        block[BLOCK_SIZE - 1] = 0;
        assert!(pkcs7_pad_len(&block).is_err());

        block[BLOCK_SIZE - 1] = 17;
        assert!(pkcs7_pad_len(&block).is_err());

        let block = [16u8; BLOCK_SIZE];
        assert_eq!(pkcs7_pad_len(&block).unwrap(), 16);

        let mut block = [0u8; BLOCK_SIZE];
        block[BLOCK_SIZE - 3..].copy_from_slice(&[3, 3, 3]);
        assert_eq!(pkcs7_pad_len(&block).unwrap(), 3);

        block[BLOCK_SIZE - 3] = 2;
        assert!(pkcs7_pad_len(&block).is_err());
    }
}

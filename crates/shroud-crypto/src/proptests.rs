#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use crate::agreement::derive;
    use crate::codec::{decrypt, encrypt, encrypt_with_iv, CodecError, BLOCK_SIZE, IV_LEN};
    use crate::framing::{frame_for_recipient, split_recipient};
    use crate::identity::IdentityKeyPair;
    use crate::types::{PeerId, SymmetricKey};

    proptest! {
        #[test]
        fn test_codec_round_trip(
            key in any::<[u8; 32]>(),
            plaintext in proptest::collection::vec(any::<u8>(), 0..2048)
        ) {
            let key = SymmetricKey::from_bytes(key);
            let env = encrypt(&key, &plaintext).unwrap();
            prop_assert_eq!(env.len() % BLOCK_SIZE, 0);
            prop_assert!(env.len() > plaintext.len() + IV_LEN);
            prop_assert_eq!(decrypt(&key, &env).unwrap(), plaintext);
        }

        #[test]
        fn test_same_plaintext_different_envelopes(
            key in any::<[u8; 32]>(),
            plaintext in proptest::collection::vec(any::<u8>(), 0..256)
        ) {
            let key = SymmetricKey::from_bytes(key);
            let a = encrypt(&key, &plaintext).unwrap();
            let b = encrypt(&key, &plaintext).unwrap();
            prop_assert_ne!(&a, &b);
            prop_assert_eq!(decrypt(&key, &a).unwrap(), decrypt(&key, &b).unwrap());
        }

        #[test]
        fn test_decrypt_arbitrary_bytes_never_panics(
            key in any::<[u8; 32]>(),
            junk in proptest::collection::vec(any::<u8>(), 0..256)
        ) {
            let key = SymmetricKey::from_bytes(key);
            let _ = decrypt(&key, &junk);
        }

        #[test]
        fn test_group_frame_split(
            envelope in proptest::collection::vec(any::<u8>(), 0..128),
            recipient in any::<u64>()
        ) {
            let framed = frame_for_recipient(envelope.clone(), PeerId(recipient));
            let (inner, who) = split_recipient(&framed).unwrap();
            prop_assert_eq!(inner, envelope.as_slice());
            prop_assert_eq!(who, PeerId(recipient));
        }
    }

    proptest! {
        // Key generation dominates; a handful of cases is enough.
        #![proptest_config(ProptestConfig::with_cases(8))]

        #[test]
        fn test_ecdh_symmetry_and_cross_decrypt(
            plaintext in proptest::collection::vec(any::<u8>(), 0..512)
        ) {
            let alice = IdentityKeyPair::generate();
            let bob = IdentityKeyPair::generate();

            let k_ab = derive(&alice, &bob.public_key()).unwrap();
            let k_ba = derive(&bob, &alice.public_key()).unwrap();
            prop_assert_eq!(&k_ab, &k_ba);

            let env = encrypt(&k_ab, &plaintext).unwrap();
            prop_assert_eq!(decrypt(&k_ba, &env).unwrap(), plaintext);
        }
    }

    /// CBC carries no MAC: only corruption that reaches the final plaintext
    /// block is caught, through the pad check. Flip every bit of the final
    /// ciphertext block and require near-total rejection.
    #[test]
    fn test_final_block_bit_flips_rejected() {
        let key = SymmetricKey::from_bytes([0x3C; 32]);
        let iv = [0x11u8; IV_LEN];
        let plaintext = b"meet at noon";
        let env = encrypt_with_iv(&key, &iv, plaintext);

        let start = env.len() - BLOCK_SIZE;
        let mut rejected = 0;
        let mut accepted_unchanged = 0;
        for byte in start..env.len() {
            for bit in 0..8 {
                let mut tampered = env.clone();
                tampered[byte] ^= 1 << bit;
                match decrypt(&key, &tampered) {
                    Err(CodecError::DecryptFailed) => rejected += 1,
                    Ok(pt) if pt == plaintext => accepted_unchanged += 1,
                    _ => {}
                }
            }
        }

        assert_eq!(accepted_unchanged, 0);
        assert!(rejected >= 120, "only {rejected}/128 flips rejected");
    }

    /// Bits flipped in the penultimate block land on the pad bytes of the
    /// final block and must always be rejected.
    #[test]
    fn test_pad_region_bit_flips_always_rejected() {
        let key = SymmetricKey::from_bytes([0x5A; 32]);
        let iv = [0x22u8; IV_LEN];
        // 20 bytes -> two blocks, 12 bytes of padding in the last one.
        let plaintext = [0x41u8; 20];
        let env = encrypt_with_iv(&key, &iv, &plaintext);
        assert_eq!(env.len(), IV_LEN + 2 * BLOCK_SIZE);

        let penultimate = IV_LEN;
        let pad_start_in_block = 20 % BLOCK_SIZE;
        for offset in pad_start_in_block..BLOCK_SIZE {
            for bit in 0..8 {
                let mut tampered = env.clone();
                tampered[penultimate + offset] ^= 1 << bit;
                assert!(
                    matches!(decrypt(&key, &tampered), Err(CodecError::DecryptFailed)),
                    "flip at offset {offset} bit {bit} accepted"
                );
            }
        }
    }
}

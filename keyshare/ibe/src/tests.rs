use super::*;
use blstrs::{pairing, Scalar};
use ff::Field;

fn share(value: u64, index: u32) -> KeyShare {
    KeyShare::new(Scalar::from(value), ShareIndex(index)).unwrap()
}

#[test]
fn derivation_is_deterministic() {
    let suite = IbeSuite::default();
    let share = share(0x5eed_cafe, 2);

    let first = suite.derive(&share, 77).unwrap();
    let second = suite.derive(&share, 77).unwrap();
    let from_other_suite = IbeSuite::default().derive(&share, 77).unwrap();

    assert_eq!(first, second);
    assert_eq!(first, from_other_suite);
    assert_eq!(first.key_hex.len(), EXTRACTED_KEY_LEN * 2);
    assert_eq!(first.commitment_hex.len(), 96);
}

#[test]
fn heights_and_shares_give_distinct_keys() {
    let suite = IbeSuite::default();
    let share_a = share(11, 1);
    let share_b = share(12, 2);

    let a_100 = suite.derive(&share_a, 100).unwrap();
    let a_101 = suite.derive(&share_a, 101).unwrap();
    let b_100 = suite.derive(&share_b, 100).unwrap();

    assert_ne!(a_100.key_hex, a_101.key_hex);
    assert_ne!(a_100.key_hex, b_100.key_hex);
    // the commitment depends on the share only
    assert_eq!(a_100.commitment_hex, a_101.commitment_hex);
    assert_ne!(a_100.commitment_hex, b_100.commitment_hex);
}

#[test]
fn extraction_uses_decimal_height_identity() {
    let suite = IbeSuite::default();
    let s = Scalar::from(987_654_321u64);
    let share = KeyShare::new(s, ShareIndex(3)).unwrap();

    let derived = suite.derive(&share, 1000).unwrap();
    assert_eq!(derived.index, ShareIndex(3));
    assert_eq!(derived.height, 1000);

    let expected = (G2Projective::hash_to_curve(b"1000", G2_HASH_DST, &[]) * s).to_affine();
    let decoded = decode_extracted_key(&derived.key_hex).unwrap();
    assert_eq!(decoded, expected);
    assert_eq!(hex::encode(decoded.to_compressed()), derived.key_hex);
}

#[test]
fn commitment_verifies_extracted_key() {
    let suite = IbeSuite::default();
    let share = share(424_242, 5);
    let derived = suite.derive(&share, 31337).unwrap();

    let key = decode_extracted_key(&derived.key_hex).unwrap();
    let commitment = decode_commitment(&derived.commitment_hex).unwrap();
    let q_id = suite.hash_identity(b"31337").to_affine();

    // e(s * G1, H(id)) == e(G1, s * H(id))
    assert_eq!(
        pairing(&commitment, &q_id),
        pairing(&G1Projective::generator().to_affine(), &key)
    );
}

#[test]
fn zero_share_is_rejected() {
    let suite = IbeSuite::default();
    let zero = KeyShare::new(Scalar::ZERO, ShareIndex(1)).unwrap();
    assert_eq!(
        suite.derive(&zero, 9),
        Err(DerivationError::IdentityKey { height: 9 })
    );
}

#[test]
fn malformed_keys_do_not_decode() {
    assert!(matches!(
        decode_extracted_key("zz"),
        Err(DerivationError::Decode(_))
    ));
    assert!(decode_extracted_key(&"00".repeat(48)).is_err());
    assert!(decode_extracted_key(&"ff".repeat(EXTRACTED_KEY_LEN)).is_err());
    assert!(decode_commitment(&"00".repeat(96)).is_err());
}

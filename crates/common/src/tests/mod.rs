use alloy_primitives::{Address, U256};
use sha2::{Digest as _, Sha256};
use std::str::FromStr;
use trellis_errors::ValidationError;

use crate::{
    args::args_hash,
    batch::{BatchArgs, BatchUpdateInput},
    calldata::{self, BatchCall, HEADER_SIZE},
    digest::Digest,
    event::{EventKind, LEAF_RECORD_SIZE, LeafRecord},
    field::{FIELD_SIZE, ZERO_VALUE, is_field_element, zero_value, zero_value_from_seed},
    proof::{Proof, SnarkjsProof, parse_public_signals},
};

fn leaf(seed: u8) -> LeafRecord {
    LeafRecord::new(
        Address::repeat_byte(seed),
        Digest::hash([seed]),
        1_000 + seed as u32,
    )
}

fn leaves(n: u8) -> Vec<LeafRecord> {
    (0..n).map(leaf).collect()
}

#[test]
fn test_zero_value_is_reduced_keccak_of_tornado() {
    assert_eq!(zero_value_from_seed("tornado"), zero_value());
    assert!(ZERO_VALUE < FIELD_SIZE);
}

#[test]
fn test_args_hash_layout() {
    let old_root = Digest::hash("old");
    let new_root = Digest::hash("new");
    let records = leaves(4);

    let mut preimage = Vec::new();
    preimage.extend_from_slice(old_root.as_ref());
    preimage.extend_from_slice(new_root.as_ref());
    preimage.extend_from_slice(&7u32.to_be_bytes());
    for record in &records {
        preimage.extend_from_slice(record.payload_hash.as_ref());
        preimage.extend_from_slice(record.instance.as_slice());
        preimage.extend_from_slice(&record.block.to_be_bytes());
    }
    assert_eq!(preimage.len(), 68 + 4 * LEAF_RECORD_SIZE);

    let raw: [u8; 32] = Sha256::digest(&preimage).into();
    let expected = U256::from_be_bytes(raw) % FIELD_SIZE;

    let hash = args_hash(&old_root, &new_root, 7, &records);
    assert_eq!(hash.to_u256(), expected);
    assert!(is_field_element(&hash));
}

#[test]
fn test_args_hash_binds_every_field() {
    let old_root = Digest::hash("old");
    let new_root = Digest::hash("new");
    let records = leaves(4);
    let base = args_hash(&old_root, &new_root, 0, &records);

    assert_eq!(base, args_hash(&old_root, &new_root, 0, &records));
    assert_ne!(base, args_hash(&new_root, &old_root, 0, &records));
    assert_ne!(base, args_hash(&old_root, &new_root, 1, &records));

    let mut reordered = records.clone();
    reordered.swap(0, 1);
    assert_ne!(base, args_hash(&old_root, &new_root, 0, &reordered));

    let mut altered = records.clone();
    altered[3].block += 1;
    assert_ne!(base, args_hash(&old_root, &new_root, 0, &altered));

    assert_ne!(base, args_hash(&old_root, &new_root, 0, &records[..2]));
}

#[test]
fn test_batch_args_recompute() {
    let mut args = BatchArgs::new(Digest::hash("a"), Digest::hash("b"), 3, leaves(2));
    assert_eq!(args.args_hash, args.computed_args_hash());

    args.path_indices = 4;
    assert_ne!(args.args_hash, args.computed_args_hash());
}

#[test]
fn test_circuit_input_uses_decimal_strings() {
    let records = leaves(2);
    let input = BatchUpdateInput {
        kind: EventKind::Deposit,
        first_index: 0,
        old_root: Digest::from_u256(U256::from(5u64)),
        new_root: Digest::from_u256(U256::from(6u64)),
        path_indices: 9,
        path_elements: vec![Digest::from_u256(U256::from(42u64))],
        leaves: records.clone(),
        args_hash: Digest::from_u256(U256::from(1u64)),
    };

    let json = serde_json::to_value(input.circuit_input()).unwrap();
    assert_eq!(json["oldRoot"], "5");
    assert_eq!(json["newRoot"], "6");
    assert_eq!(json["pathIndices"], "9");
    assert_eq!(json["pathElements"][0], "42");
    assert_eq!(json["argsHash"], "1");
    assert_eq!(json["blocks"][1], "1001");
    assert_eq!(
        json["instances"][0],
        U256::from_be_slice(records[0].instance.as_slice()).to_string()
    );
}

#[test]
fn test_snarkjs_proof_element_order() {
    let snarkjs = SnarkjsProof {
        pi_a: vec!["1".into(), "2".into(), "1".into()],
        pi_b: vec![
            vec!["3".into(), "4".into()],
            vec!["5".into(), "6".into()],
            vec!["1".into(), "0".into()],
        ],
        pi_c: vec!["7".into(), "8".into(), "1".into()],
        protocol: "groth16".into(),
    };

    let proof = Proof::from_snarkjs(&snarkjs).unwrap();
    let order: Vec<u64> = proof.0.iter().map(|e| e.to::<u64>()).collect();
    assert_eq!(order, vec![1, 2, 4, 3, 6, 5, 7, 8]);
}

#[test]
fn test_snarkjs_proof_rejects_missing_coordinates() {
    let json = r#"{"pi_a":["1"],"pi_b":[["3","4"],["5","6"]],"pi_c":["7","8"]}"#;
    assert!(Proof::from_snarkjs_json(json).is_err());
}

#[test]
fn test_parse_public_signals() {
    let signals = parse_public_signals(r#"["123", "456"]"#).unwrap();
    assert_eq!(signals[0].to_u256(), U256::from(123u64));
    assert_eq!(signals[1].to_u256(), U256::from(456u64));
    assert!(parse_public_signals(r#"["0xzz"]"#).is_err());
}

#[test]
fn test_calldata_path_index_from_length() {
    for kind in EventKind::ALL {
        let args = BatchArgs::new(Digest::hash("a"), Digest::hash("b"), 0, leaves(8));
        let call = BatchCall::new(kind, Proof::default(), args);
        let encoded = call.encode();

        assert_eq!(encoded.len(), HEADER_SIZE + 8 * LEAF_RECORD_SIZE);
        assert_eq!(calldata::path_index(&encoded).unwrap(), 8);
        assert_eq!(calldata::kind_of(&encoded).unwrap(), kind);
        assert_eq!(BatchCall::decode(&encoded).unwrap(), call);
    }
}

#[test]
fn test_calldata_rejects_inconsistent_length() {
    let args = BatchArgs::new(Digest::hash("a"), Digest::hash("b"), 0, leaves(4));
    let encoded = BatchCall::new(EventKind::Deposit, Proof::default(), args).encode();

    let truncated = &encoded[..encoded.len() - 1];
    assert!(matches!(
        calldata::path_index(truncated),
        Err(ValidationError::CalldataLength { .. })
    ));
    assert!(calldata::path_index(&encoded[..10]).is_err());

    let mut unknown = encoded.clone();
    unknown[0] ^= 0xff;
    assert!(matches!(
        calldata::kind_of(&unknown),
        Err(ValidationError::UnknownSelector(_))
    ));
}

#[test]
fn test_selectors_differ_per_kind() {
    assert_ne!(
        calldata::selector(EventKind::Deposit),
        calldata::selector(EventKind::Withdrawal)
    );
}

#[test]
fn test_digest_display_round_trip() {
    let digest = Digest::hash("trellis");
    let rendered = digest.to_string();
    assert!(rendered.starts_with("0x"));
    assert_eq!(Digest::from_str(&rendered).unwrap(), digest);
    assert_eq!(Digest::from_str(&digest.to_hex()).unwrap(), digest);
    assert!(Digest::from_str("0x1234").is_err());
}

#[test]
fn test_leaf_record_encoding_is_left_aligned() {
    let record = leaf(9);
    let encoded = record.encode();
    assert_eq!(&encoded[..32], record.payload_hash.as_ref());
    assert_eq!(&encoded[32..52], record.instance.as_slice());
    assert_eq!(&encoded[52..], &record.block.to_be_bytes());
    assert_eq!(LeafRecord::decode(&encoded), record);
}

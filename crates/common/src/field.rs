use alloy_primitives::{U256, keccak256, uint};

use crate::digest::Digest;

/// Order of the BN254 scalar field. Every public input of the batch circuit
/// lives below this value.
pub const FIELD_SIZE: U256 = uint!(
    21888242871839275222246405745257275088548364400416034343698204186575808495617_U256
);

/// Value of an empty leaf, `keccak256("tornado") mod FIELD_SIZE`.
pub const ZERO_VALUE: U256 = uint!(
    21663839004416932945382355908790599225266501822907911457504978515578255421292_U256
);

pub fn reduce(bytes: [u8; 32]) -> Digest {
    Digest::from_u256(U256::from_be_bytes(bytes) % FIELD_SIZE)
}

pub fn is_field_element(value: &Digest) -> bool {
    value.to_u256() < FIELD_SIZE
}

pub fn zero_value() -> Digest {
    Digest::from_u256(ZERO_VALUE)
}

/// Derives a zero leaf from a seed the same way [`ZERO_VALUE`] was derived.
pub fn zero_value_from_seed(seed: &str) -> Digest {
    reduce(keccak256(seed.as_bytes()).0)
}

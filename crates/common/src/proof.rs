use alloy_primitives::U256;
use serde::{Deserialize, Serialize};
use trellis_errors::{ProverError, ValidationError};

use crate::digest::Digest;

pub const PROOF_SIZE: usize = 8 * 32;

/// Groth16 proof flattened into the element order the verifying contract expects:
/// `[a.x, a.y, b.x.c1, b.x.c0, b.y.c1, b.y.c0, c.x, c.y]`.
///
/// The G2 point `b` has its extension-field coefficients swapped relative to
/// snarkjs output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Proof(pub [U256; 8]);

impl Proof {
    pub fn to_bytes(&self) -> [u8; PROOF_SIZE] {
        let mut out = [0u8; PROOF_SIZE];
        for (chunk, element) in out.chunks_exact_mut(32).zip(self.0.iter()) {
            chunk.copy_from_slice(&element.to_be_bytes::<32>());
        }
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ValidationError> {
        if bytes.len() != PROOF_SIZE {
            return Err(ValidationError::CalldataLength {
                expected: PROOF_SIZE,
                got: bytes.len(),
            });
        }
        let mut elements = [U256::ZERO; 8];
        for (element, chunk) in elements.iter_mut().zip(bytes.chunks_exact(32)) {
            *element = U256::from_be_slice(chunk);
        }
        Ok(Self(elements))
    }

    pub fn from_snarkjs(proof: &SnarkjsProof) -> Result<Self, ProverError> {
        let b0 = proof.pi_b.first().ok_or_else(|| missing("pi_b[0]"))?;
        let b1 = proof.pi_b.get(1).ok_or_else(|| missing("pi_b[1]"))?;

        Ok(Self([
            coordinate(&proof.pi_a, 0, "pi_a")?,
            coordinate(&proof.pi_a, 1, "pi_a")?,
            coordinate(b0, 1, "pi_b[0]")?,
            coordinate(b0, 0, "pi_b[0]")?,
            coordinate(b1, 1, "pi_b[1]")?,
            coordinate(b1, 0, "pi_b[1]")?,
            coordinate(&proof.pi_c, 0, "pi_c")?,
            coordinate(&proof.pi_c, 1, "pi_c")?,
        ]))
    }

    pub fn from_snarkjs_json(json: &str) -> Result<Self, ProverError> {
        let proof: SnarkjsProof = serde_json::from_str(json)
            .map_err(|e| ProverError::InvalidOutput(format!("parsing proof: {e}")))?;
        Self::from_snarkjs(&proof)
    }
}

/// Proof file as written by snarkjs and rapidsnark. Coordinates are decimal
/// strings; projective points carry a trailing `1` that is ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnarkjsProof {
    pub pi_a: Vec<String>,
    pub pi_b: Vec<Vec<String>>,
    pub pi_c: Vec<String>,
    #[serde(default)]
    pub protocol: String,
}

/// Parses a `public.json` file into field elements.
pub fn parse_public_signals(json: &str) -> Result<Vec<Digest>, ProverError> {
    let signals: Vec<String> = serde_json::from_str(json)
        .map_err(|e| ProverError::InvalidOutput(format!("parsing public signals: {e}")))?;
    signals.iter().map(|s| parse_decimal(s).map(Digest::from_u256)).collect()
}

fn coordinate(values: &[String], idx: usize, name: &str) -> Result<U256, ProverError> {
    let value = values.get(idx).ok_or_else(|| missing(&format!("{name}[{idx}]")))?;
    parse_decimal(value)
}

fn parse_decimal(value: &str) -> Result<U256, ProverError> {
    U256::from_str_radix(value, 10)
        .map_err(|e| ProverError::InvalidOutput(format!("invalid field element {value}: {e}")))
}

fn missing(name: &str) -> ProverError {
    ProverError::InvalidOutput(format!("missing {name}"))
}

use alloy_primitives::{Address, U256};
use rand::{Rng, SeedableRng, rngs::StdRng};
use std::collections::HashMap;

use crate::{
    digest::Digest,
    event::{EventKind, LeafEvent, LeafRecord},
    field::{FIELD_SIZE, reduce},
    proof::Proof,
};

const MOCK_PROOF_DOMAIN: &[u8] = b"trellis/mock-proof";

/// A stand-in for a Groth16 proof: eight field elements derived from the
/// args hash. Verifies only against the args hash it was made for.
pub fn mock_proof(args_hash: &Digest) -> Proof {
    let mut elements = [U256::ZERO; 8];
    for (i, element) in elements.iter_mut().enumerate() {
        let digest = Digest::hash_items(&[MOCK_PROOF_DOMAIN, args_hash.as_ref(), &[i as u8]]);
        *element = reduce(digest.0).to_u256();
    }
    Proof(elements)
}

pub fn is_valid_mock_proof(proof: &Proof, args_hash: &Digest) -> bool {
    proof.0.iter().all(|e| *e < FIELD_SIZE) && *proof == mock_proof(args_hash)
}

/// Produces deterministic deposit and withdrawal events from a seed.
pub struct EventGenerator {
    rng: StdRng,
    instances: Vec<Address>,
    block: u32,
    next_index: HashMap<EventKind, u64>,
}

impl EventGenerator {
    pub fn new(seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let instances = (0..4).map(|_| Address::from(rng.r#gen::<[u8; 20]>())).collect();
        Self {
            rng,
            instances,
            block: 1_000,
            next_index: HashMap::new(),
        }
    }

    pub fn next_event(&mut self, kind: EventKind) -> LeafEvent {
        let index = self.next_index.entry(kind).or_insert(0);
        let event = LeafEvent {
            kind,
            instance: self.instances[self.rng.gen_range(0..self.instances.len())],
            payload_hash: reduce(self.rng.r#gen::<[u8; 32]>()),
            block: self.block,
            index: *index,
        };
        *index += 1;
        self.block += self.rng.gen_range(0..3);
        event
    }

    pub fn events(&mut self, kind: EventKind, count: usize) -> Vec<LeafEvent> {
        (0..count).map(|_| self.next_event(kind)).collect()
    }

    pub fn records(&mut self, kind: EventKind, count: usize) -> Vec<LeafRecord> {
        self.events(kind, count).iter().map(LeafEvent::record).collect()
    }
}

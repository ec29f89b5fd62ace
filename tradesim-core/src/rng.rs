//! Deterministic episode seeding.
//!
//! A master seed expands into one sub-seed per `(dataset, episode)` pair via
//! BLAKE3, so a sweep produces identical episodes regardless of how episodes
//! are scheduled across threads.

use crate::domain::DatasetHash;
use crate::engine::ResetMode;
use rand::rngs::StdRng;
use rand::SeedableRng;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EpisodeSeeds {
    master_seed: u64,
}

impl EpisodeSeeds {
    pub fn new(master_seed: u64) -> Self {
        Self { master_seed }
    }

    pub fn master_seed(&self) -> u64 {
        self.master_seed
    }

    /// Sub-seed for one episode over one dataset.
    pub fn seed_for(&self, dataset: &DatasetHash, episode: u64) -> u64 {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&self.master_seed.to_le_bytes());
        hasher.update(dataset.as_bytes());
        hasher.update(&episode.to_le_bytes());
        let hash = hasher.finalize();
        let mut head = [0u8; 8];
        head.copy_from_slice(&hash.as_bytes()[..8]);
        u64::from_le_bytes(head)
    }

    pub fn rng_for(&self, dataset: &DatasetHash, episode: u64) -> StdRng {
        StdRng::seed_from_u64(self.seed_for(dataset, episode))
    }

    /// Reset mode for `episode`: a seeded random start, or the first
    /// admissible timestamp.
    pub fn reset_mode(&self, dataset: &DatasetHash, episode: u64, random_start: bool) -> ResetMode {
        if random_start {
            ResetMode::Random {
                seed: self.seed_for(dataset, episode),
            }
        } else {
            ResetMode::Start
        }
    }
}

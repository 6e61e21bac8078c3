//! Deterministic seed mixing and pseudo-random stream helpers for level generation.

use rand_chacha::ChaCha8Rng;
use rand_chacha::rand_core::{Rng, SeedableRng};

use crate::types::GridPos;

pub(crate) fn mix_seed_stream(seed: u64, stream: u64) -> u64 {
    let mut mixed = seed ^ stream.wrapping_mul(0xD6E8_FD9A_5B89_7A4D);
    mixed ^= mixed >> 33;
    mixed = mixed.wrapping_mul(0xFF51_AFD7_ED55_8CCD);
    mixed ^= mixed >> 33;
    mixed = mixed.wrapping_mul(0xC4CE_B9FE_1A85_EC53);
    mixed ^ (mixed >> 33)
}

/// Seed used when a level is generated without an explicit one.
pub fn default_level_seed(level: u32) -> u64 {
    derive_level_seed(0x5EED_1E7E_1000_0000, level)
}

pub(crate) fn derive_level_seed(run_seed: u64, level: u32) -> u64 {
    let mut mixed = run_seed ^ 0x9E37_79B9_7F4A_7C15;
    mixed ^= u64::from(level).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    mixed ^= mixed >> 30;
    mixed = mixed.wrapping_mul(0xBF58_476D_1CE4_E5B9);
    mixed ^= mixed >> 27;
    mixed = mixed.wrapping_mul(0x94D0_49BB_1331_11EB);
    mixed ^ (mixed >> 31)
}

/// Independent stream for per-room decoration so it does not perturb graph placement.
pub(crate) fn room_stream_seed(level_seed: u64, grid: GridPos) -> u64 {
    let packed = (u64::from(grid.x as u32) << 32) | u64::from(grid.y as u32);
    mix_seed_stream(level_seed, packed)
}

pub(crate) struct GenRng {
    inner: ChaCha8Rng,
}

impl GenRng {
    pub(crate) fn new(seed: u64) -> Self {
        Self { inner: ChaCha8Rng::seed_from_u64(seed) }
    }

    pub(crate) fn next_u64(&mut self) -> u64 {
        self.inner.next_u64()
    }

    pub(crate) fn range_inclusive(&mut self, min_value: usize, max_value: usize) -> usize {
        debug_assert!(min_value <= max_value);
        let range_size = (max_value - min_value + 1) as u64;
        min_value + (self.next_u64() % range_size) as usize
    }

    pub(crate) fn pick_index(&mut self, len: usize) -> Option<usize> {
        if len == 0 {
            return None;
        }
        Some(self.range_inclusive(0, len - 1))
    }

    pub(crate) fn shuffle<T>(&mut self, items: &mut [T]) {
        for index in (1..items.len()).rev() {
            let swap_with = self.range_inclusive(0, index);
            items.swap(index, swap_with);
        }
    }
}

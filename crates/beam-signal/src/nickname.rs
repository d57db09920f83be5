//! Nickname allocation
//!
//! Display names are two adjectives, a noun, and a number, drawn from fixed
//! vocabularies. The allocator keeps the global used-set and retries until it
//! lands on a free combination; check and insert happen under one lock, so
//! two peers can never be handed the same name. With 24x24x24x10000
//! combinations exhaustion is not a practical concern, but the retry loop is
//! capped anyway rather than trusting that arithmetic forever.

use std::collections::HashSet;

use parking_lot::Mutex;
use thiserror::Error;

const ADJECTIVES: &[&str] = &[
    "Swift", "Brave", "Bright", "Clever", "Calm", "Gentle", "Noble", "Fierce",
    "Quick", "Happy", "Mighty", "Bold", "Wise", "Lucky", "Daring", "Kind",
    "Sly", "Quiet", "Shy", "Loyal", "Eager", "Strong", "Zesty", "Sharp",
];

const NOUNS: &[&str] = &[
    "Fox", "Hawk", "Lion", "Bear", "Wolf", "Falcon", "Tiger", "Eagle",
    "Panther", "Otter", "Raven", "Panda", "Cougar", "Shark", "Lynx", "Badger",
    "Dragon", "Phoenix", "Orca", "Cheetah", "Jaguar", "Cobra", "Viper", "Stag",
];

const NUMBER_RANGE: u32 = 10_000;

/// Retry cap before giving up
const MAX_ATTEMPTS: usize = 64;

/// Nickname space exhausted (every sampled candidate collided)
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("nickname space exhausted")]
pub struct AllocationExhausted;

/// Collision-free nickname source shared by all room operations
pub struct NicknameAllocator {
    adjectives: &'static [&'static str],
    nouns: &'static [&'static str],
    number_range: u32,
    used: Mutex<HashSet<String>>,
}

impl NicknameAllocator {
    pub fn new() -> Self {
        Self {
            adjectives: ADJECTIVES,
            nouns: NOUNS,
            number_range: NUMBER_RANGE,
            used: Mutex::new(HashSet::new()),
        }
    }

    #[cfg(test)]
    fn with_vocab(
        adjectives: &'static [&'static str],
        nouns: &'static [&'static str],
        number_range: u32,
    ) -> Self {
        Self {
            adjectives,
            nouns,
            number_range,
            used: Mutex::new(HashSet::new()),
        }
    }

    /// Hand out a nickname not currently in use.
    ///
    /// The used-set is locked across the sample-check-insert cycle, so the
    /// returned name is reserved before any other caller can see it.
    pub fn allocate(&self) -> Result<String, AllocationExhausted> {
        let mut used = self.used.lock();
        for _ in 0..MAX_ATTEMPTS {
            let candidate = self.sample();
            if !used.contains(&candidate) {
                used.insert(candidate.clone());
                return Ok(candidate);
            }
        }
        Err(AllocationExhausted)
    }

    /// Return a nickname to the free pool. True if it was actually in use.
    pub fn release(&self, nickname: &str) -> bool {
        self.used.lock().remove(nickname)
    }

    pub fn is_used(&self, nickname: &str) -> bool {
        self.used.lock().contains(nickname)
    }

    pub fn used_count(&self) -> usize {
        self.used.lock().len()
    }

    fn sample(&self) -> String {
        let mut buf = [0u8; 8];
        getrandom::fill(&mut buf).expect("RNG failed");

        let a1 = self.adjectives[buf[0] as usize % self.adjectives.len()];
        let a2 = self.adjectives[buf[1] as usize % self.adjectives.len()];
        let noun = self.nouns[buf[2] as usize % self.nouns.len()];
        let number =
            u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]) % self.number_range;

        format!("{a1}{a2}{noun}{number}")
    }
}

impl Default for NicknameAllocator {
    fn default() -> Self {
        Self::new()
    }
}

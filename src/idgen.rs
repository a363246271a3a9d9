//! Resource id generation.
//!
//! Ids are `res-` followed by a v7 UUID in simple form: time-ordered, so ids
//! sort by creation time, and globally unique without coordination. Ids are
//! never reused; a deleted resource keeps its id as a tombstone.

use uuid::Uuid;

/// Prefix carried by every resource id.
pub const RESOURCE_ID_PREFIX: &str = "res-";

#[derive(Clone, Debug)]
pub struct IdGenerator {
    prefix: &'static str,
}

impl IdGenerator {
    pub fn new(prefix: &'static str) -> Self {
        Self { prefix }
    }

    /// Produce the next id.
    pub fn take(&self) -> String {
        format!("{}{}", self.prefix, Uuid::now_v7().simple())
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new(RESOURCE_ID_PREFIX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_carry_prefix_and_are_unique() {
        let generator = IdGenerator::default();
        let a = generator.take();
        let b = generator.take();
        assert!(a.starts_with(RESOURCE_ID_PREFIX));
        assert_ne!(a, b);
    }

    #[test]
    fn ids_are_time_ordered() {
        let generator = IdGenerator::default();
        let ids: Vec<String> = (0..16).map(|_| generator.take()).collect();
        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(ids, sorted);
    }
}

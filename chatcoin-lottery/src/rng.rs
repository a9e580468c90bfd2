use rand::RngCore;
use sha2::{Digest, Sha256};

/// Random hex seed for draws where the operator did not supply one.
pub fn generate_seed() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Derive the winning ticket index for one ordinal of a draw.
///
/// The index comes from a SHA-256 hash of (seed, ordinal), widened to a
/// u64 and rejection-sampled into [0, total). Identical inputs always
/// yield identical outputs. The rejection step avoids the modulo bias a
/// naive `hash % total` would pick up when total is not a power of two.
///
/// `total` must be positive.
pub fn deterministic_index(seed: &str, ordinal: u64, total: u64) -> u64 {
    debug_assert!(total > 0, "index space must be non-empty");

    // Largest multiple of `total` that fits in a u64; values above it
    // would fold unevenly and are re-hashed instead.
    let zone = (u64::MAX / total) * total;

    let mut attempt = 0u64;
    loop {
        let value = hash_to_u64(seed, ordinal, attempt);
        if value < zone {
            return value % total;
        }
        attempt += 1;
    }
}

fn hash_to_u64(seed: &str, ordinal: u64, attempt: u64) -> u64 {
    let mut hasher = Sha256::new();
    hasher.update(seed.as_bytes());
    hasher.update(ordinal.to_le_bytes());
    hasher.update(attempt.to_le_bytes());
    let digest = hasher.finalize();

    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_inputs_identical_outputs() {
        for ordinal in 0..16 {
            let first = deterministic_index("stream-seed", ordinal, 1000);
            let second = deterministic_index("stream-seed", ordinal, 1000);
            assert_eq!(first, second);
        }
    }

    #[test]
    fn test_outputs_stay_in_bounds() {
        for total in [1u64, 2, 3, 7, 10, 1000, 12345] {
            for ordinal in 0..64 {
                let index = deterministic_index("bounds-seed", ordinal, total);
                assert!(index < total);
            }
        }
    }

    #[test]
    fn test_different_seeds_diverge() {
        let same = (0..32)
            .filter(|&k| {
                deterministic_index("seed-a", k, 1_000_000)
                    == deterministic_index("seed-b", k, 1_000_000)
            })
            .count();
        assert!(same < 2, "independent seeds should almost never collide");
    }

    #[test]
    fn test_rough_uniformity_over_small_space() {
        // 10_000 samples over 10 buckets; each bucket should land near
        // 1000. Loose bounds keep this robust, the draw-level fairness
        // test does the statistical heavy lifting.
        let total = 10u64;
        let mut buckets = [0u32; 10];
        for ordinal in 0..10_000 {
            buckets[deterministic_index("uniformity-seed", ordinal, total) as usize] += 1;
        }
        for &count in &buckets {
            assert!(
                (600..=1400).contains(&count),
                "bucket count {} outside tolerance",
                count
            );
        }
    }

    #[test]
    fn test_generated_seeds_are_unique_hex() {
        let first = generate_seed();
        let second = generate_seed();
        assert_ne!(first, second);
        assert_eq!(first.len(), 64);
        assert!(first.chars().all(|c| c.is_ascii_hexdigit()));
    }
}

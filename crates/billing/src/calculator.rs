use serde::{Deserialize, Serialize};

/// Metrics describing a submitted repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoMetrics {
    /// Repository size in kilobytes.
    pub repository_size_kb: u64,
    /// Number of files in the repository.
    pub file_count: u64,
    /// Analysis complexity on a 1..=10 scale.
    pub complexity: u8,
}

impl RepoMetrics {
    pub fn new(repository_size_kb: u64, file_count: u64, complexity: u8) -> Self {
        Self {
            repository_size_kb,
            file_count,
            complexity,
        }
    }
}

/// Compute the credit cost of analyzing a repository.
///
/// Raw cost is `1 + files * 0.1 + size_kb * 0.01`, scaled by a complexity
/// multiplier in `1.0..=1.9` and rounded up to a whole credit. The `f64`
/// arithmetic must stay bit-for-bit stable: billed amounts may never drift
/// between releases.
///
/// Total function: complexity outside `1..=10` is clamped, no error paths.
pub fn cost(metrics: &RepoMetrics) -> i64 {
    let complexity = metrics.complexity.clamp(1, 10);
    let raw = 1.0 + metrics.file_count as f64 * 0.1 + metrics.repository_size_kb as f64 * 0.01;
    let multiplier = 1.0 + f64::from(complexity - 1) * 0.1;
    (raw * multiplier).ceil() as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn published_price_points_are_exact() {
        // These values are billed to customers; they are pinned exactly.
        assert_eq!(cost(&RepoMetrics::new(1000, 50, 5)), 23);
        assert_eq!(cost(&RepoMetrics::new(100, 10, 1)), 3);
        assert_eq!(cost(&RepoMetrics::new(100, 10, 10)), 6);
    }

    #[test]
    fn minimal_repository_costs_the_base_credit() {
        assert_eq!(cost(&RepoMetrics::new(0, 0, 1)), 1);
    }

    #[test]
    fn complexity_is_clamped_into_range() {
        assert_eq!(
            cost(&RepoMetrics::new(100, 10, 0)),
            cost(&RepoMetrics::new(100, 10, 1))
        );
        assert_eq!(
            cost(&RepoMetrics::new(100, 10, 255)),
            cost(&RepoMetrics::new(100, 10, 10))
        );
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: cost is deterministic and monotonically non-decreasing
        /// in each input dimension.
        #[test]
        fn cost_is_monotone(
            size_kb in 0u64..1_000_000,
            files in 0u64..100_000,
            complexity in 1u8..=10,
        ) {
            let base = cost(&RepoMetrics::new(size_kb, files, complexity));

            prop_assert_eq!(base, cost(&RepoMetrics::new(size_kb, files, complexity)));
            prop_assert!(cost(&RepoMetrics::new(size_kb + 100, files, complexity)) >= base);
            prop_assert!(cost(&RepoMetrics::new(size_kb, files + 10, complexity)) >= base);
            if complexity < 10 {
                prop_assert!(cost(&RepoMetrics::new(size_kb, files, complexity + 1)) >= base);
            }
        }

        #[test]
        fn cost_is_at_least_one_credit(
            size_kb in 0u64..1_000_000,
            files in 0u64..100_000,
            complexity in 0u8..=20,
        ) {
            prop_assert!(cost(&RepoMetrics::new(size_kb, files, complexity)) >= 1);
        }
    }
}

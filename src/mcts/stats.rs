//! MCTS search statistics for diagnostics and tuning.

use serde::{Deserialize, Serialize};

/// Statistics collected during MCTS search.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchStats {
    /// Total iterations attempted.
    pub iterations: u32,

    /// Simulations that reached a leaf and backed up a value.
    pub simulations: u32,

    /// Simulations abandoned because evaluation failed.
    pub failed_simulations: u32,

    /// Nodes expanded (children generated).
    pub nodes_expanded: u32,

    /// Maximum depth reached during search.
    pub max_depth: u16,

    /// Total time spent searching (microseconds).
    pub time_us: u64,
}

impl SearchStats {
    /// Create new empty statistics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset all statistics to zero.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Calculate simulations per second.
    #[must_use]
    pub fn simulations_per_second(&self) -> f64 {
        if self.time_us == 0 {
            0.0
        } else {
            f64::from(self.simulations) / (self.time_us as f64 / 1_000_000.0)
        }
    }

    /// Fraction of iterations that failed.
    #[must_use]
    pub fn failure_rate(&self) -> f64 {
        if self.iterations == 0 {
            0.0
        } else {
            f64::from(self.failed_simulations) / f64::from(self.iterations)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_default() {
        let stats = SearchStats::new();
        assert_eq!(stats.iterations, 0);
        assert_eq!(stats.simulations, 0);
        assert_eq!(stats.failure_rate(), 0.0);
    }

    #[test]
    fn test_stats_simulations_per_second() {
        let mut stats = SearchStats::new();
        stats.simulations = 1000;
        stats.time_us = 1_000_000; // 1 second

        assert_eq!(stats.simulations_per_second(), 1000.0);
    }

    #[test]
    fn test_stats_failure_rate_and_reset() {
        let mut stats = SearchStats::new();
        stats.iterations = 10;
        stats.simulations = 6;
        stats.failed_simulations = 4;
        assert!((stats.failure_rate() - 0.4).abs() < 1e-12);

        stats.reset();

        assert_eq!(stats, SearchStats::default());
    }
}

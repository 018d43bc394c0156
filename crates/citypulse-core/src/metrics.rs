//! Percentage indicators derived from the status column.

use serde::{Deserialize, Serialize};

use crate::{Population, StatusCounts};

/// Productivity contributed by each burnout agent relative to a normal one.
pub const BURNOUT_PRODUCTIVITY: f64 = 0.3;
/// Happiness lost per percentage point of burnout.
pub const BURNOUT_HAPPINESS_PENALTY: f64 = 1.5;
/// Happiness lost per percentage point of unemployment.
pub const UNEMPLOYMENT_HAPPINESS_PENALTY: f64 = 0.5;

/// Aggregate indicators, each in `[0, 100]`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Metrics {
    pub productivity: f64,
    pub happiness: f64,
    pub burnout: f64,
    pub unemployment: f64,
}

impl Metrics {
    /// Derive indicators from a status histogram. An empty histogram yields zeros.
    #[must_use]
    pub fn from_counts(counts: StatusCounts) -> Self {
        let total = counts.total();
        if total == 0 {
            return Self::default();
        }
        let total = total as f64;
        let normal = counts.normal as f64;
        let burnout_agents = counts.burnout as f64;

        let burnout = 100.0 * burnout_agents / total;
        let unemployment = 100.0 * counts.unemployed as f64 / total;
        let productivity = 100.0 * (normal + BURNOUT_PRODUCTIVITY * burnout_agents) / total;
        let happiness = (100.0
            - BURNOUT_HAPPINESS_PENALTY * burnout
            - UNEMPLOYMENT_HAPPINESS_PENALTY * unemployment)
            .max(0.0);

        Self {
            productivity,
            happiness,
            burnout,
            unemployment,
        }
    }
}

/// Scan the population's statuses and compute its indicators.
#[must_use]
pub fn compute_metrics(population: &Population) -> Metrics {
    Metrics::from_counts(population.status_counts())
}

//! Credit score sources

use crate::config::ScoringConfig;
use crate::Result;
use rand::Rng;

/// Produces a score for an applicant with no prior loan on file.
#[async_trait::async_trait]
pub trait CreditScorer: Send + Sync {
    fn name(&self) -> &'static str;
    async fn score(&self, account_number: &str) -> Result<u32>;
}

/// Uniform draw from `[simulated_min, simulated_max)`.
pub struct SimulatedScorer {
    min: u32,
    max: u32,
}

impl SimulatedScorer {
    pub fn new(scoring: &ScoringConfig) -> Self {
        Self {
            min: scoring.simulated_min,
            max: scoring.simulated_max.max(scoring.simulated_min + 1),
        }
    }
}

#[async_trait::async_trait]
impl CreditScorer for SimulatedScorer {
    fn name(&self) -> &'static str {
        "simulated"
    }

    async fn score(&self, _account_number: &str) -> Result<u32> {
        Ok(rand::thread_rng().gen_range(self.min..self.max))
    }
}

/// Always returns the same score. Used by demos and tests.
pub struct FixedScorer(pub u32);

#[async_trait::async_trait]
impl CreditScorer for FixedScorer {
    fn name(&self) -> &'static str {
        "fixed"
    }

    async fn score(&self, _account_number: &str) -> Result<u32> {
        Ok(self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_simulated_scores_stay_in_range() {
        let scorer = SimulatedScorer::new(&ScoringConfig::default());
        for _ in 0..500 {
            let score = scorer.score("OW10001").await.unwrap();
            assert!((650..850).contains(&score));
        }
    }

    #[test]
    fn test_fixed_scorer() {
        let scorer = FixedScorer(780);
        assert_eq!(tokio_test::block_on(scorer.score("OW10001")).unwrap(), 780);
    }
}

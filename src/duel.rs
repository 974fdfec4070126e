//! Stochastic resolution of proximity events.
//!
//! Every event independently draws one of three outcomes. Nothing is deduplicated here:
//! an agent that loses two duels in the same tick shows up twice, and
//! `crate::transition` makes sure it converts only once.
use log::debug;
use rand::distr::weighted::WeightedIndex;
use rand::distr::Distribution;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::agents::AgentId;
use crate::error::GeospreadError;
use crate::proximity::ProximityEvent;

const PROBABILITY_TOLERANCE: f64 = 1e-9;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum DuelOutcome {
    NoChange,
    /// The infectious agent is defeated.
    SusceptibleWins,
    /// The susceptible agent is defeated.
    InfectiousWins,
}

impl DuelOutcome {
    const ALL: [DuelOutcome; 3] = [
        DuelOutcome::NoChange,
        DuelOutcome::SusceptibleWins,
        DuelOutcome::InfectiousWins,
    ];
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DuelProbabilities {
    pub no_change: f64,
    pub susceptible_wins: f64,
    pub infectious_wins: f64,
}

impl Default for DuelProbabilities {
    fn default() -> Self {
        DuelProbabilities {
            no_change: 0.4,
            susceptible_wins: 0.3,
            infectious_wins: 0.3,
        }
    }
}

impl DuelProbabilities {
    /// # Errors
    ///
    /// Returns `ConfigurationError` unless the probabilities are valid (see `validate`).
    pub fn new(
        no_change: f64,
        susceptible_wins: f64,
        infectious_wins: f64,
    ) -> Result<DuelProbabilities, GeospreadError> {
        let probabilities = DuelProbabilities {
            no_change,
            susceptible_wins,
            infectious_wins,
        };
        probabilities.validate()?;
        Ok(probabilities)
    }

    /// Checks that every probability is finite and non-negative and that they sum to 1.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError` describing the first violated condition.
    pub fn validate(&self) -> Result<(), GeospreadError> {
        let weights = self.weights();
        if weights.iter().any(|p| !p.is_finite() || *p < 0.0) {
            return Err(GeospreadError::ConfigurationError(format!(
                "duel probabilities must be finite and non-negative, got {weights:?}"
            )));
        }
        let total: f64 = weights.iter().sum();
        if (total - 1.0).abs() > PROBABILITY_TOLERANCE {
            return Err(GeospreadError::ConfigurationError(format!(
                "duel probabilities must sum to 1, got {total}"
            )));
        }
        Ok(())
    }

    fn weights(&self) -> [f64; 3] {
        [self.no_change, self.susceptible_wins, self.infectious_wins]
    }

    fn sampler(&self) -> Result<WeightedIndex<f64>, GeospreadError> {
        self.validate()?;
        WeightedIndex::new(self.weights())
            .map_err(|err| GeospreadError::ConfigurationError(err.to_string()))
    }
}

/// The agents that lost at least one duel, in event order and possibly repeated.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DuelResults {
    pub defeated_susceptibles: Vec<AgentId>,
    pub defeated_infectious: Vec<AgentId>,
    pub no_change: usize,
}

/// Draws a single outcome.
///
/// # Errors
///
/// Returns `ConfigurationError` for invalid probabilities.
pub fn draw_outcome<R: Rng + ?Sized>(
    probabilities: &DuelProbabilities,
    rng: &mut R,
) -> Result<DuelOutcome, GeospreadError> {
    let sampler = probabilities.sampler()?;
    Ok(DuelOutcome::ALL[sampler.sample(rng)])
}

/// Draws one outcome per event and collects the losers of each decisive duel.
///
/// # Errors
///
/// Returns `ConfigurationError` for invalid probabilities, even when `events` is empty.
pub fn resolve_duels<R: Rng + ?Sized>(
    events: &[ProximityEvent],
    probabilities: &DuelProbabilities,
    rng: &mut R,
) -> Result<DuelResults, GeospreadError> {
    let sampler = probabilities.sampler()?;
    let mut results = DuelResults::default();
    for event in events {
        match DuelOutcome::ALL[sampler.sample(rng)] {
            DuelOutcome::NoChange => results.no_change += 1,
            DuelOutcome::SusceptibleWins => results.defeated_infectious.push(event.infectious),
            DuelOutcome::InfectiousWins => results.defeated_susceptibles.push(event.susceptible),
        }
    }
    debug!(
        "{} duels: {} no change, {} infectious defeated, {} susceptibles defeated",
        events.len(),
        results.no_change,
        results.defeated_infectious.len(),
        results.defeated_susceptibles.len()
    );
    Ok(results)
}

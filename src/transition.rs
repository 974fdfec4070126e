//! Role conversions applied after all duels of a tick are resolved.
use log::debug;
use serde::{Deserialize, Serialize};

use crate::agents::{Agent, AgentId, Role};
use crate::error::GeospreadError;
use crate::hashing::HashSet;
use crate::population::Population;

/// Which defeat list is applied first when an agent is targeted by both in one batch.
/// An agent converts at most once per batch, so the first list to reach it wins.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionPriority {
    /// Defeated susceptibles become infectious before defeated infectious agents are
    /// removed.
    #[default]
    InfectionFirst,
    RemovalFirst,
}

/// A conversion that was applied.
#[derive(Clone, Debug, PartialEq)]
pub struct Transition {
    pub agent: AgentId,
    pub from: Role,
    pub to: Role,
    pub agent_after: Agent,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct TransitionSummary {
    /// Applied conversions in the order they happened.
    pub transitions: Vec<Transition>,
    /// Targets that were already converted in this batch or did not have the expected role.
    pub skipped: usize,
}

impl TransitionSummary {
    #[must_use]
    pub fn count(&self, to: Role) -> usize {
        self.transitions.iter().filter(|t| t.to == to).count()
    }
}

/// Converts every defeated agent once.
///
/// Defeated susceptibles become infectious with their speed scaled by `speed_ratio`;
/// defeated infectious agents are removed. Repeated ids, ids already converted in this
/// batch and ids whose current role does not match the list are skipped.
///
/// # Errors
///
/// Returns `UnknownAgent` for an id that is not in the population and `ConfigurationError`
/// for a negative or non-finite `speed_ratio`. Conversions made before the error stay
/// applied.
pub fn apply_transitions(
    population: &mut Population,
    defeated_susceptibles: &[AgentId],
    defeated_infectious: &[AgentId],
    speed_ratio: f64,
    priority: TransitionPriority,
) -> Result<TransitionSummary, GeospreadError> {
    if !(speed_ratio.is_finite() && speed_ratio >= 0.0) {
        return Err(GeospreadError::ConfigurationError(format!(
            "infectious speed ratio must be finite and non-negative, got {speed_ratio}"
        )));
    }

    let batches = match priority {
        TransitionPriority::InfectionFirst => [
            (Role::Susceptible, defeated_susceptibles),
            (Role::Infectious, defeated_infectious),
        ],
        TransitionPriority::RemovalFirst => [
            (Role::Infectious, defeated_infectious),
            (Role::Susceptible, defeated_susceptibles),
        ],
    };

    let mut converted = HashSet::default();
    let mut summary = TransitionSummary::default();
    for (expected, ids) in batches {
        for &id in ids {
            if converted.contains(&id) {
                debug!("agent {id} was already converted in this batch");
                summary.skipped += 1;
                continue;
            }
            let agent = population
                .get(id)
                .ok_or(GeospreadError::UnknownAgent(id))?;
            let converted_agent = match (expected, agent) {
                (Role::Susceptible, Agent::Susceptible(susceptible)) => {
                    Agent::Infectious(susceptible.clone().into_infectious(speed_ratio))
                }
                (Role::Infectious, Agent::Infectious(infectious)) => {
                    Agent::Removed(infectious.clone().into_removed())
                }
                (_, agent) => {
                    debug!(
                        "skipping agent {id}: expected {expected}, found {}",
                        agent.role()
                    );
                    summary.skipped += 1;
                    continue;
                }
            };
            let to = converted_agent.role();
            population.replace(id, converted_agent.clone())?;
            converted.insert(id);
            summary.transitions.push(Transition {
                agent: id,
                from: expected,
                to,
                agent_after: converted_agent,
            });
        }
    }
    Ok(summary)
}

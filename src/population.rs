//! The set of agents in a simulation, keyed by `AgentId`.
//!
//! Besides the agents themselves the `Population` keeps the ids of the susceptible and
//! infectious agents in ordered sets, so matching never scans the whole population and
//! always visits agents in id order (which keeps seeded runs reproducible).
use std::collections::BTreeSet;

use log::{debug, trace};
use serde::{Deserialize, Serialize};

use crate::agents::{Agent, AgentId, Infectious, Position, Removed, Role, Sex, Susceptible};
use crate::context::Context;
use crate::define_data_plugin;
use crate::error::GeospreadError;
use crate::hashing::HashMap;

#[derive(Debug, Default, Clone)]
pub struct Population {
    agents: HashMap<AgentId, Agent>,
    susceptible: BTreeSet<AgentId>,
    infectious: BTreeSet<AgentId>,
    removed: usize,
    next_id: u64,
}

impl Population {
    #[must_use]
    pub fn new() -> Population {
        Population::default()
    }

    /// Inserts `agent` under `id`.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateAgent` if `id` is taken and `InvalidPosition` if the agent's
    /// position is not a valid coordinate.
    pub fn insert(&mut self, id: AgentId, agent: Agent) -> Result<(), GeospreadError> {
        if self.agents.contains_key(&id) {
            return Err(GeospreadError::DuplicateAgent(id));
        }
        agent.position().validate()?;
        self.track(id, agent.role());
        self.agents.insert(id, agent);
        self.next_id = self.next_id.max(id.0.saturating_add(1));
        Ok(())
    }

    /// Inserts `agent` under the next unused id and returns that id.
    ///
    /// # Errors
    ///
    /// Returns `InvalidPosition` if the agent's position is not a valid coordinate, and
    /// `DuplicateAgent` once the id space is used up (after `AgentId(u64::MAX)` is taken).
    pub fn add(&mut self, agent: Agent) -> Result<AgentId, GeospreadError> {
        let id = AgentId(self.next_id);
        self.insert(id, agent)?;
        Ok(id)
    }

    #[must_use]
    pub fn get(&self, id: AgentId) -> Option<&Agent> {
        self.agents.get(&id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.agents.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    #[must_use]
    pub fn count(&self, role: Role) -> usize {
        match role {
            Role::Susceptible => self.susceptible.len(),
            Role::Infectious => self.infectious.len(),
            Role::Removed => self.removed,
        }
    }

    /// Iterates over all agents in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = (AgentId, &Agent)> {
        self.agents.iter().map(|(id, agent)| (*id, agent))
    }

    /// Ids of the agents currently in `role` in ascending order. Removed agents are not
    /// indexed, so `Role::Removed` yields a freshly sorted list.
    #[must_use]
    pub fn ids_with_role(&self, role: Role) -> Vec<AgentId> {
        match role {
            Role::Susceptible => self.susceptible.iter().copied().collect(),
            Role::Infectious => self.infectious.iter().copied().collect(),
            Role::Removed => {
                let mut ids: Vec<AgentId> = self
                    .agents
                    .iter()
                    .filter(|(_, agent)| agent.role() == Role::Removed)
                    .map(|(id, _)| *id)
                    .collect();
                ids.sort_unstable();
                ids
            }
        }
    }

    /// Positions of the agents in `role`, in ascending id order.
    #[must_use]
    pub fn positions_with_role(&self, role: Role) -> Vec<(AgentId, Position)> {
        self.ids_with_role(role)
            .into_iter()
            .filter_map(|id| self.agents.get(&id).map(|agent| (id, agent.position())))
            .collect()
    }

    /// Every mobile agent with its position and speed, in ascending id order.
    #[must_use]
    pub fn mobile_agents(&self) -> Vec<(AgentId, Position, f64)> {
        let mut ids: Vec<AgentId> = self
            .susceptible
            .iter()
            .chain(self.infectious.iter())
            .copied()
            .collect();
        ids.sort_unstable();
        ids.into_iter()
            .filter_map(|id| {
                let agent = self.agents.get(&id)?;
                Some((id, agent.position(), agent.speed()?))
            })
            .collect()
    }

    /// Moves a mobile agent to `position`, appending its previous position to its path.
    ///
    /// # Errors
    ///
    /// Returns `UnknownAgent` if there is no agent `id` and `InvalidPosition` for an
    /// invalid coordinate.
    pub fn relocate(&mut self, id: AgentId, position: Position) -> Result<(), GeospreadError> {
        position.validate()?;
        let agent = self
            .agents
            .get_mut(&id)
            .ok_or(GeospreadError::UnknownAgent(id))?;
        agent.relocate(position);
        Ok(())
    }

    /// Swaps the record stored under `id`, keeping the role indexes current. Returns the
    /// previous record.
    pub(crate) fn replace(&mut self, id: AgentId, agent: Agent) -> Result<Agent, GeospreadError> {
        let slot = self
            .agents
            .get_mut(&id)
            .ok_or(GeospreadError::UnknownAgent(id))?;
        let role = agent.role();
        let previous = std::mem::replace(slot, agent);
        self.untrack(id, previous.role());
        self.track(id, role);
        Ok(previous)
    }

    fn track(&mut self, id: AgentId, role: Role) {
        match role {
            Role::Susceptible => {
                self.susceptible.insert(id);
            }
            Role::Infectious => {
                self.infectious.insert(id);
            }
            Role::Removed => self.removed += 1,
        }
    }

    fn untrack(&mut self, id: AgentId, role: Role) {
        match role {
            Role::Susceptible => {
                self.susceptible.remove(&id);
            }
            Role::Infectious => {
                self.infectious.remove(&id);
            }
            Role::Removed => self.removed -= 1,
        }
    }
}

/// The initial state of one agent, as supplied by a population source such as
/// `census::seeds_from_census`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AgentSeed {
    pub role: Role,
    pub position: Position,
    pub age: u32,
    pub sex: Sex,
    /// Speed in km per tick, ignored for `Role::Removed`.
    pub speed: f64,
}

impl From<AgentSeed> for Agent {
    fn from(seed: AgentSeed) -> Self {
        match seed.role {
            Role::Susceptible => Agent::Susceptible(Susceptible {
                speed: seed.speed,
                sex: seed.sex,
                age: seed.age,
                position: seed.position,
                path: Vec::new(),
            }),
            Role::Infectious => Agent::Infectious(Infectious {
                speed: seed.speed,
                position: seed.position,
                path: Vec::new(),
                age: seed.age,
                prior_path: Vec::new(),
            }),
            Role::Removed => Agent::Removed(Removed {
                sex: Some(seed.sex),
                age: seed.age,
                position: seed.position,
            }),
        }
    }
}

define_data_plugin!(PopulationPlugin, Population, Population::new());

pub trait ContextPopulationExt {
    /// Adds `agent` to the population and returns its id.
    ///
    /// # Errors
    ///
    /// Returns `InvalidPosition` if the agent's position is not a valid coordinate.
    fn add_agent(&mut self, agent: Agent) -> Result<AgentId, GeospreadError>;

    /// Adds one agent per seed, in order, returning the assigned ids.
    ///
    /// # Errors
    ///
    /// Fails on the first seed with an invalid position or a negative speed; seeds before
    /// it stay in the population.
    fn seed_population(
        &mut self,
        seeds: impl IntoIterator<Item = AgentSeed>,
    ) -> Result<Vec<AgentId>, GeospreadError>;

    fn get_agent(&self, id: AgentId) -> Option<&Agent>;

    fn get_role_count(&self, role: Role) -> usize;

    fn get_population_size(&self) -> usize;

    fn population_mut(&mut self) -> &mut Population;
}

impl ContextPopulationExt for Context {
    fn add_agent(&mut self, agent: Agent) -> Result<AgentId, GeospreadError> {
        let id = self.population_mut().add(agent)?;
        trace!("added agent {id}");
        Ok(id)
    }

    fn seed_population(
        &mut self,
        seeds: impl IntoIterator<Item = AgentSeed>,
    ) -> Result<Vec<AgentId>, GeospreadError> {
        let population = self.population_mut();
        let mut ids = Vec::new();
        for seed in seeds {
            if !(seed.speed.is_finite() && seed.speed >= 0.0) {
                return Err(GeospreadError::InvalidSpeed(seed.speed));
            }
            ids.push(population.add(seed.into())?);
        }
        debug!(
            "seeded {} agents ({} susceptible, {} infectious)",
            ids.len(),
            population.count(Role::Susceptible),
            population.count(Role::Infectious)
        );
        Ok(ids)
    }

    fn get_agent(&self, id: AgentId) -> Option<&Agent> {
        self.get_data::<PopulationPlugin>()
            .and_then(|population| population.get(id))
    }

    fn get_role_count(&self, role: Role) -> usize {
        self.get_data::<PopulationPlugin>()
            .map_or(0, |population| population.count(role))
    }

    fn get_population_size(&self) -> usize {
        self.get_data::<PopulationPlugin>()
            .map_or(0, Population::len)
    }

    fn population_mut(&mut self) -> &mut Population {
        self.get_data_mut::<PopulationPlugin>()
    }
}

//! Agent records. An agent is exactly one of three roles at any time:
//!
//! * `Susceptible`: mobile, can be converted into an infectious agent.
//! * `Infectious`: mobile, converts susceptibles it defeats and can itself be removed.
//! * `Removed`: immobile and terminal.
//!
//! Converting between roles always builds a new record that copies only the fields that
//! are meaningful for the target role (see `Susceptible::into_infectious` and
//! `Infectious::into_removed`).
use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

use crate::error::GeospreadError;

/// A stable identifier; it does not change when the agent changes role.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentId(pub u64);

impl Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sex {
    Female,
    Male,
}

/// A point on the plane in degrees.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub latitude: f64,
    pub longitude: f64,
}

impl Position {
    #[must_use]
    pub fn new(latitude: f64, longitude: f64) -> Position {
        Position {
            latitude,
            longitude,
        }
    }

    /// Checks that both coordinates are finite and within `[-90, 90]` x `[-180, 180]`.
    pub fn validate(&self) -> Result<(), GeospreadError> {
        let valid = self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude);
        if valid {
            Ok(())
        } else {
            Err(GeospreadError::InvalidPosition {
                latitude: self.latitude,
                longitude: self.longitude,
            })
        }
    }

    /// Euclidean distance in raw coordinate units (degrees).
    #[must_use]
    pub fn coordinate_distance(&self, other: &Position) -> f64 {
        (self.latitude - other.latitude).hypot(self.longitude - other.longitude)
    }
}

impl From<(f64, f64)> for Position {
    fn from((latitude, longitude): (f64, f64)) -> Self {
        Position::new(latitude, longitude)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Susceptible,
    Infectious,
    Removed,
}

impl Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            Role::Susceptible => "susceptible",
            Role::Infectious => "infectious",
            Role::Removed => "removed",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Susceptible {
    /// Speed in km per tick.
    pub speed: f64,
    pub sex: Sex,
    pub age: u32,
    pub position: Position,
    /// Previously visited positions, oldest first.
    pub path: Vec<Position>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Infectious {
    pub speed: f64,
    pub position: Position,
    /// Positions visited since becoming infectious.
    pub path: Vec<Position>,
    pub age: u32,
    /// The path accumulated while susceptible. Empty for agents seeded as infectious.
    pub prior_path: Vec<Position>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Removed {
    /// Only known for agents that were seeded directly as removed.
    pub sex: Option<Sex>,
    pub age: u32,
    pub position: Position,
}

impl Susceptible {
    /// Builds the infectious agent this susceptible turns into. The current path becomes
    /// the prior path and the speed is scaled by `speed_ratio`.
    #[must_use]
    pub fn into_infectious(self, speed_ratio: f64) -> Infectious {
        Infectious {
            speed: self.speed * speed_ratio,
            position: self.position,
            path: Vec::new(),
            age: self.age,
            prior_path: self.path,
        }
    }
}

impl Infectious {
    #[must_use]
    pub fn into_removed(self) -> Removed {
        Removed {
            sex: None,
            age: self.age,
            position: self.position,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Agent {
    Susceptible(Susceptible),
    Infectious(Infectious),
    Removed(Removed),
}

impl Agent {
    #[must_use]
    pub fn role(&self) -> Role {
        match self {
            Agent::Susceptible(_) => Role::Susceptible,
            Agent::Infectious(_) => Role::Infectious,
            Agent::Removed(_) => Role::Removed,
        }
    }

    #[must_use]
    pub fn position(&self) -> Position {
        match self {
            Agent::Susceptible(agent) => agent.position,
            Agent::Infectious(agent) => agent.position,
            Agent::Removed(agent) => agent.position,
        }
    }

    #[must_use]
    pub fn age(&self) -> u32 {
        match self {
            Agent::Susceptible(agent) => agent.age,
            Agent::Infectious(agent) => agent.age,
            Agent::Removed(agent) => agent.age,
        }
    }

    /// The speed of a mobile agent, `None` for removed agents.
    #[must_use]
    pub fn speed(&self) -> Option<f64> {
        match self {
            Agent::Susceptible(agent) => Some(agent.speed),
            Agent::Infectious(agent) => Some(agent.speed),
            Agent::Removed(_) => None,
        }
    }

    #[must_use]
    pub fn is_mobile(&self) -> bool {
        !matches!(self, Agent::Removed(_))
    }

    /// Records the current position in the path and moves to `position`. Removed agents
    /// do not move.
    pub(crate) fn relocate(&mut self, position: Position) {
        match self {
            Agent::Susceptible(agent) => {
                agent.path.push(agent.position);
                agent.position = position;
            }
            Agent::Infectious(agent) => {
                agent.path.push(agent.position);
                agent.position = position;
            }
            Agent::Removed(_) => {}
        }
    }
}

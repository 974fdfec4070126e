//! Spatial agent-based simulation of an infection spreading through a mobile population.
//!
//! Every agent is in exactly one of three roles: susceptible, infectious or removed.
//! Each tick of the simulation runs one pass of:
//! * Movement: every mobile agent takes a randomly oriented step, kept inside an optional
//!   bounding box (`movement`).
//! * Indexing: infectious agents are bucketed into quadkey map tiles (`tiles`).
//! * Matching: susceptible agents sharing a tile with an infectious agent are compared
//!   against every infectious agent, and pairs within a threshold distance become
//!   proximity events (`proximity`).
//! * Resolution: each event is a duel with three possible outcomes (`duel`).
//! * Transition: defeated susceptibles become infectious and defeated infectious agents
//!   are removed, at most once per agent and tick (`transition`).
//!
//! The simulation is driven by a `Context`, which keeps time with a plan queue and stores
//! the state of each module (the population, the parameters, random number generators,
//! report writers) as type-keyed data plugins. Modules expose their API as extension
//! traits on `Context`, for example `ContextPopulationExt` or `ContextRandomExt`.
pub mod agents;
pub mod census;
pub mod context;
pub mod duel;
pub mod error;
pub mod execution_stats;
pub mod hashing;
pub mod log;
pub mod movement;
pub mod parameters;
pub mod plan;
pub mod population;
pub mod proximity;
pub mod random;
pub mod report;
pub mod runner;
pub mod simulation;
pub mod tiles;
pub mod transition;

pub use agents::{Agent, AgentId, Position, Role, Sex};
pub use context::Context;
pub use error::GeospreadError;
pub use parameters::{ContextParametersExt, Parameters};
pub use population::{AgentSeed, ContextPopulationExt, Population};
pub use random::ContextRandomExt;
pub use report::ContextReportExt;

// Re-exports for the `define_rng!` macro.
pub use paste;
pub use rand;

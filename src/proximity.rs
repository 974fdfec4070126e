//! Detection of infectious/susceptible pairs that are close enough to duel.
//!
//! Comparing every infectious agent with every susceptible agent is `O(N x M)`. The
//! matcher first drops every susceptible agent whose tile (see `crate::tiles`) holds no
//! infectious agent, then computes exact distances between all infectious agents and the
//! remaining candidates. Only the susceptible side is filtered, so an infectious agent can
//! still match a candidate in a neighboring tile as long as some infectious agent occupies
//! that tile. A susceptible agent just across the edge of a tile with no infectious agent
//! is never considered, even if it is within the threshold.
//!
//! Distances are Euclidean in coordinate degrees, the same unit as movement steps.
use log::debug;

use crate::agents::{AgentId, Position, Role};
use crate::error::GeospreadError;
use crate::hashing::HashSet;
use crate::population::Population;
use crate::tiles::{tile_key, TileKey, MAX_TILE_LEVEL, MIN_TILE_LEVEL};

/// An infectious and a susceptible agent within the threshold distance of each other.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ProximityEvent {
    pub infectious: AgentId,
    pub susceptible: AgentId,
    /// Distance in coordinate degrees.
    pub distance: f64,
}

/// Row-major matrix of distances between two sets of positions.
#[derive(Clone, Debug, PartialEq)]
pub struct DistanceMatrix {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl DistanceMatrix {
    #[must_use]
    pub fn pairwise(rows: &[Position], cols: &[Position]) -> DistanceMatrix {
        let data = rows
            .iter()
            .flat_map(|row| cols.iter().map(move |col| row.coordinate_distance(col)))
            .collect();
        DistanceMatrix {
            rows: rows.len(),
            cols: cols.len(),
            data,
        }
    }

    #[must_use]
    pub fn rows(&self) -> usize {
        self.rows
    }

    #[must_use]
    pub fn cols(&self) -> usize {
        self.cols
    }

    #[must_use]
    pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        if row < self.rows && col < self.cols {
            Some(self.data[row * self.cols + col])
        } else {
            None
        }
    }

    /// Cells with a distance at most `threshold`, as `(row, col, distance)` in row-major
    /// order.
    pub fn within(&self, threshold: f64) -> impl Iterator<Item = (usize, usize, f64)> + '_ {
        self.data
            .iter()
            .enumerate()
            .filter(move |(_, distance)| **distance <= threshold)
            .map(|(index, distance)| (index / self.cols, index % self.cols, *distance))
    }
}

/// The distinct tiles occupied by `positions` at `level`.
pub fn occupied_tiles<'a>(
    positions: impl IntoIterator<Item = &'a Position>,
    level: u8,
) -> HashSet<TileKey> {
    positions
        .into_iter()
        .map(|position| tile_key(*position, level))
        .collect()
}

fn validate(level: u8, threshold_distance: f64) -> Result<(), GeospreadError> {
    if !(MIN_TILE_LEVEL..=MAX_TILE_LEVEL).contains(&level) {
        return Err(GeospreadError::ConfigurationError(format!(
            "tile level {level} is outside {MIN_TILE_LEVEL}..={MAX_TILE_LEVEL}"
        )));
    }
    if !(threshold_distance.is_finite() && threshold_distance >= 0.0) {
        return Err(GeospreadError::ConfigurationError(format!(
            "threshold distance must be finite and non-negative, got {threshold_distance}"
        )));
    }
    Ok(())
}

/// Finds every infectious/susceptible pair within `threshold_distance` degrees, subject to
/// the tile filter described in the module documentation.
///
/// Events are ordered by infectious id, then susceptible id. Agents sharing a position
/// produce one event per pair; nothing is deduplicated.
///
/// # Errors
///
/// Returns `ConfigurationError` for a tile level outside `1..=23` or a negative or
/// non-finite threshold.
pub fn find_proximity_events(
    population: &Population,
    level: u8,
    threshold_distance: f64,
) -> Result<Vec<ProximityEvent>, GeospreadError> {
    validate(level, threshold_distance)?;

    let infectious = population.positions_with_role(Role::Infectious);
    if infectious.is_empty() {
        debug!("no infectious agents, nothing to match");
        return Ok(Vec::new());
    }

    let tiles = occupied_tiles(infectious.iter().map(|(_, position)| position), level);
    let candidates: Vec<(AgentId, Position)> = population
        .positions_with_role(Role::Susceptible)
        .into_iter()
        .filter(|(_, position)| tiles.contains(&tile_key(*position, level)))
        .collect();
    debug!(
        "{} infectious agents in {} tiles, {} candidate susceptibles",
        infectious.len(),
        tiles.len(),
        candidates.len()
    );

    let infectious_positions: Vec<Position> = infectious.iter().map(|(_, p)| *p).collect();
    let candidate_positions: Vec<Position> = candidates.iter().map(|(_, p)| *p).collect();
    let matrix = DistanceMatrix::pairwise(&infectious_positions, &candidate_positions);

    let events: Vec<ProximityEvent> = matrix
        .within(threshold_distance)
        .map(|(row, col, distance)| ProximityEvent {
            infectious: infectious[row].0,
            susceptible: candidates[col].0,
            distance,
        })
        .collect();
    debug!("{} proximity events", events.len());
    Ok(events)
}

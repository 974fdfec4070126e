//! Random-walk movement for mobile agents.
//!
//! Each tick a mobile agent takes one step of length `speed_km * DEGREES_PER_KM` degrees
//! along a heading drawn from a discrete pool of evenly spaced angles. When the step
//! leaves the bounding box it is retried with a shorter length (`speed_km / attempt`)
//! up to `MovementOptions::max_retries` times; if every attempt fails the agent stays
//! where it is.
use std::f64::consts::PI;

use geo::{GeodesicDistance, Point};
use log::trace;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::agents::{AgentId, Position};
use crate::error::GeospreadError;
use crate::population::Population;

/// Conversion from km of travel to degrees of offset. Applied to latitude and longitude
/// alike, so steps are measured in coordinate units rather than on the ellipsoid.
pub const DEGREES_PER_KM: f64 = 0.013;

/// Number of evenly spaced headings in `[0, 2π]` a full-circle step picks from. Each
/// half-circle pool holds half as many.
pub const HEADING_POOL_SIZE: usize = 1000;

/// The region agents must stay inside. Containment is strict on all four sides.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

impl BoundingBox {
    /// # Errors
    ///
    /// Returns `ConfigurationError` if a bound is not finite or a minimum is not below its
    /// maximum.
    pub fn new(
        min_lat: f64,
        max_lat: f64,
        min_lon: f64,
        max_lon: f64,
    ) -> Result<BoundingBox, GeospreadError> {
        let bbox = BoundingBox {
            min_lat,
            max_lat,
            min_lon,
            max_lon,
        };
        bbox.validate()?;
        Ok(bbox)
    }

    /// # Errors
    ///
    /// Returns `ConfigurationError` if a bound is not finite or a minimum is not below its
    /// maximum.
    pub fn validate(&self) -> Result<(), GeospreadError> {
        let bounds = [self.min_lat, self.max_lat, self.min_lon, self.max_lon];
        if bounds.iter().any(|bound| !bound.is_finite()) {
            return Err(GeospreadError::ConfigurationError(format!(
                "bounding box bounds must be finite: {self:?}"
            )));
        }
        if self.min_lat >= self.max_lat || self.min_lon >= self.max_lon {
            return Err(GeospreadError::ConfigurationError(format!(
                "bounding box minimums must be below maximums: {self:?}"
            )));
        }
        Ok(())
    }

    #[must_use]
    pub fn contains(&self, position: &Position) -> bool {
        position.latitude > self.min_lat
            && position.latitude < self.max_lat
            && position.longitude > self.min_lon
            && position.longitude < self.max_lon
    }

    /// The smallest box containing every position, widened by `margin` degrees on each
    /// side and clipped to the valid coordinate range. Returns `None` for an empty input.
    pub fn enclosing(
        positions: impl IntoIterator<Item = Position>,
        margin: f64,
    ) -> Option<BoundingBox> {
        let mut positions = positions.into_iter();
        let first = positions.next()?;
        let mut bbox = BoundingBox {
            min_lat: first.latitude,
            max_lat: first.latitude,
            min_lon: first.longitude,
            max_lon: first.longitude,
        };
        for position in positions {
            bbox.min_lat = bbox.min_lat.min(position.latitude);
            bbox.max_lat = bbox.max_lat.max(position.latitude);
            bbox.min_lon = bbox.min_lon.min(position.longitude);
            bbox.max_lon = bbox.max_lon.max(position.longitude);
        }
        bbox.min_lat = (bbox.min_lat - margin).max(-90.0);
        bbox.max_lat = (bbox.max_lat + margin).min(90.0);
        bbox.min_lon = (bbox.min_lon - margin).max(-180.0);
        bbox.max_lon = (bbox.max_lon + margin).min(180.0);
        Some(bbox)
    }
}

/// How a step's heading is chosen.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeadingPolicy {
    /// One heading from the whole circle, kept for every retry.
    #[default]
    FullCircle,
    /// One heading from each half circle; the walk starts on a random half and switches
    /// to the other half on every retry.
    HalfCircle,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MovementOptions {
    pub heading_policy: HeadingPolicy,
    /// Number of shortened attempts after the first one leaves the bounding box.
    pub max_retries: usize,
    /// Compute the geodesic distance travelled. Off by default since it dominates the
    /// cost of a step.
    pub record_distance: bool,
}

impl Default for MovementOptions {
    fn default() -> Self {
        MovementOptions {
            heading_policy: HeadingPolicy::FullCircle,
            max_retries: 3,
            record_distance: false,
        }
    }
}

/// The result of one step.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Step {
    /// Geodesic distance travelled in meters; NaN unless
    /// `MovementOptions::record_distance` is set.
    pub distance: f64,
    pub position: Position,
    /// True if every attempt left the bounding box and the agent stayed in place.
    pub fell_back: bool,
}

#[allow(clippy::cast_precision_loss)]
fn pool_heading<R: Rng + ?Sized>(rng: &mut R, start: f64, span: f64, pool_size: usize) -> f64 {
    let index = rng.random_range(0..pool_size);
    start + span * index as f64 / (pool_size - 1) as f64
}

fn offset(start: Position, heading: f64, speed_km: f64) -> Position {
    let step = DEGREES_PER_KM * speed_km;
    Position::new(
        start.latitude + step * heading.cos(),
        start.longitude + step * heading.sin(),
    )
}

fn geodesic_meters(from: Position, to: Position) -> f64 {
    Point::new(from.longitude, from.latitude)
        .geodesic_distance(&Point::new(to.longitude, to.latitude))
}

/// Moves one agent from `start` at `speed_km`.
///
/// With a bounding box, a step that leaves it is retried with the length divided by the
/// attempt number (`speed_km / 2`, `speed_km / 3`, ...). Without one, the valid coordinate
/// range plays the same role. If no attempt lands inside, the result is `start`.
///
/// # Errors
///
/// Returns `InvalidPosition` if `start` is not a valid coordinate and `InvalidSpeed` if
/// `speed_km` is negative or not finite.
pub fn move_one_step<R: Rng + ?Sized>(
    start: Position,
    speed_km: f64,
    bbox: Option<&BoundingBox>,
    options: &MovementOptions,
    rng: &mut R,
) -> Result<Step, GeospreadError> {
    start.validate()?;
    if !(speed_km.is_finite() && speed_km >= 0.0) {
        return Err(GeospreadError::InvalidSpeed(speed_km));
    }

    // A box may reach past the poles or the antimeridian; the coordinate range still applies.
    let inside = |position: &Position| {
        position.validate().is_ok() && bbox.is_none_or(|bbox| bbox.contains(position))
    };

    let (headings, mut half) = match options.heading_policy {
        HeadingPolicy::FullCircle => {
            let heading = pool_heading(rng, 0.0, 2.0 * PI, HEADING_POOL_SIZE);
            ([heading, heading], 0)
        }
        HeadingPolicy::HalfCircle => {
            let half_pool = HEADING_POOL_SIZE / 2;
            let lower = pool_heading(rng, 0.0, PI, half_pool);
            let upper = pool_heading(rng, PI, PI, half_pool);
            ([lower, upper], rng.random_range(0..2))
        }
    };

    let mut candidate = offset(start, headings[half], speed_km);
    let mut attempt = 1;
    while !inside(&candidate) && attempt <= options.max_retries {
        attempt += 1;
        half = 1 - half;
        #[allow(clippy::cast_precision_loss)]
        let shortened = speed_km / attempt as f64;
        candidate = offset(start, headings[half], shortened);
        trace!("step left the bounding box, attempt {attempt} with {shortened} km");
    }

    let fell_back = !inside(&candidate);
    if fell_back {
        trace!("no valid step from {start:?}, staying in place");
        candidate = start;
    }

    let distance = if options.record_distance {
        geodesic_meters(start, candidate)
    } else {
        f64::NAN
    };

    Ok(Step {
        distance,
        position: candidate,
        fell_back,
    })
}

#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct MovementSummary {
    pub moved: usize,
    pub stayed: usize,
    /// Total geodesic meters travelled, NaN unless distances are recorded.
    pub total_distance: f64,
}

/// Moves every mobile agent in `population` by one step. All steps are computed from the
/// positions at the start of the call and applied afterwards.
///
/// # Errors
///
/// Propagates the first `move_one_step` error; no agent is moved in that case.
pub fn move_population<R: Rng + ?Sized>(
    population: &mut Population,
    bbox: Option<&BoundingBox>,
    options: &MovementOptions,
    rng: &mut R,
) -> Result<MovementSummary, GeospreadError> {
    let steps = population
        .mobile_agents()
        .into_iter()
        .map(|(id, position, speed)| {
            move_one_step(position, speed, bbox, options, rng).map(|step| (id, step))
        })
        .collect::<Result<Vec<(AgentId, Step)>, GeospreadError>>()?;

    let mut summary = MovementSummary {
        total_distance: if options.record_distance { 0.0 } else { f64::NAN },
        ..MovementSummary::default()
    };
    for (id, step) in steps {
        population.relocate(id, step.position)?;
        if step.fell_back {
            summary.stayed += 1;
        } else {
            summary.moved += 1;
        }
        summary.total_distance += step.distance;
    }
    Ok(summary)
}

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use log::error;
use serde::{Deserialize, Serialize};

use crate::context::Context;
use crate::define_data_plugin;
use crate::duel::DuelProbabilities;
use crate::error::GeospreadError;
use crate::movement::{BoundingBox, MovementOptions};
use crate::tiles::{MAX_TILE_LEVEL, MIN_TILE_LEVEL};
use crate::transition::TransitionPriority;

/// How a census is turned into an initial population.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SeedingOptions {
    /// Speed of every seeded agent in km per tick, before the infectious ratio.
    pub susceptible_speed_km: f64,
    pub initial_infectious: usize,
    pub min_age: u32,
    pub max_age: u32,
}

impl Default for SeedingOptions {
    fn default() -> Self {
        SeedingOptions {
            susceptible_speed_km: 1.0,
            initial_infectious: 1,
            min_age: 0,
            max_age: 90,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Parameters {
    pub max_steps: usize,
    pub tile_level: u8,
    /// In coordinate degrees.
    pub threshold_distance: f64,
    pub duel: DuelProbabilities,
    pub infectious_speed_ratio: f64,
    pub bounding_box: Option<BoundingBox>,
    pub movement: MovementOptions,
    pub transition_priority: TransitionPriority,
    pub seeding: SeedingOptions,
}

impl Default for Parameters {
    fn default() -> Self {
        Parameters {
            max_steps: 100,
            tile_level: 14,
            threshold_distance: 0.0005,
            duel: DuelProbabilities::default(),
            infectious_speed_ratio: 0.5,
            bounding_box: None,
            movement: MovementOptions::default(),
            transition_priority: TransitionPriority::default(),
            seeding: SeedingOptions::default(),
        }
    }
}

impl Parameters {
    /// Reads parameters from a JSON file. Fields that are missing take their defaults.
    ///
    /// # Errors
    ///
    /// Returns `IoError` if the file cannot be opened and `JsonError` if it is not a valid
    /// parameters document. The result is not validated.
    pub fn from_json_file(path: &Path) -> Result<Parameters, GeospreadError> {
        let file = File::open(path)?;
        let parameters = serde_json::from_reader(BufReader::new(file))?;
        Ok(parameters)
    }

    /// # Errors
    ///
    /// Returns `ConfigurationError` naming the first invalid field.
    pub fn validate(&self) -> Result<(), GeospreadError> {
        let invalid = |message: String| Err(GeospreadError::ConfigurationError(message));
        if !(MIN_TILE_LEVEL..=MAX_TILE_LEVEL).contains(&self.tile_level) {
            return invalid(format!(
                "tile_level must be in {MIN_TILE_LEVEL}..={MAX_TILE_LEVEL}, got {}",
                self.tile_level
            ));
        }
        if !(self.threshold_distance.is_finite() && self.threshold_distance >= 0.0) {
            return invalid(format!(
                "threshold_distance must be finite and non-negative, got {}",
                self.threshold_distance
            ));
        }
        if !(self.infectious_speed_ratio.is_finite() && self.infectious_speed_ratio >= 0.0) {
            return invalid(format!(
                "infectious_speed_ratio must be finite and non-negative, got {}",
                self.infectious_speed_ratio
            ));
        }
        let seeding = &self.seeding;
        if !(seeding.susceptible_speed_km.is_finite() && seeding.susceptible_speed_km >= 0.0) {
            return invalid(format!(
                "seeding.susceptible_speed_km must be finite and non-negative, got {}",
                seeding.susceptible_speed_km
            ));
        }
        if seeding.min_age > seeding.max_age {
            return invalid(format!(
                "seeding.min_age ({}) is greater than seeding.max_age ({})",
                seeding.min_age, seeding.max_age
            ));
        }
        self.duel.validate()?;
        if let Some(bounding_box) = &self.bounding_box {
            bounding_box.validate()?;
        }
        Ok(())
    }
}

define_data_plugin!(ParametersPlugin, Option<Parameters>, None);

pub trait ContextParametersExt {
    /// Validates and stores the parameters of this run, replacing any earlier value.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError` if `parameters` are invalid; the stored value is left
    /// unchanged.
    fn set_parameters(&mut self, parameters: Parameters) -> Result<(), GeospreadError>;

    fn get_parameters(&self) -> Option<&Parameters>;

    /// Reads, validates and stores parameters from a JSON file.
    ///
    /// # Errors
    ///
    /// See `Parameters::from_json_file` and `set_parameters`.
    fn load_parameters_from_json(&mut self, path: &Path) -> Result<(), GeospreadError> {
        let parameters = Parameters::from_json_file(path)?;
        self.set_parameters(parameters)
    }
}

impl ContextParametersExt for Context {
    fn set_parameters(&mut self, parameters: Parameters) -> Result<(), GeospreadError> {
        if let Err(err) = parameters.validate() {
            error!("rejected parameters: {err}");
            return Err(err);
        }
        *self.get_data_mut::<ParametersPlugin>() = Some(parameters);
        Ok(())
    }

    fn get_parameters(&self) -> Option<&Parameters> {
        self.get_data::<ParametersPlugin>().and_then(Option::as_ref)
    }
}

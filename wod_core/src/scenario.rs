//! Scenario files.
//!
//! A scenario bundles everything one run needs: athlete capabilities,
//! context, day state, the workout, and optionally explicit constraints,
//! carry-over fatigue and extra catalog movements. Files are JSON or TOML,
//! chosen by extension.

use crate::catalog::build_default_catalog;
use crate::engine::SimulationInputs;
use crate::strategy::RpeConstraints;
use crate::{
    AthleteCapabilities, Catalog, ContextParams, DayState, Error, FatigueState, MovementSpec,
    Result, Wod,
};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Scenario {
    pub athlete: AthleteCapabilities,

    #[serde(default)]
    pub context: ContextParams,

    #[serde(default)]
    pub day: DayState,

    pub workout: Wod,

    #[serde(default)]
    pub constraints: Option<RpeConstraints>,

    #[serde(default)]
    pub initial_fatigue: Option<FatigueState>,

    /// Movements added to (or replacing entries of) the default catalog
    #[serde(default)]
    pub movements: Vec<MovementSpec>,
}

impl Scenario {
    pub fn inputs(&self) -> SimulationInputs {
        SimulationInputs {
            capabilities: self.athlete.clone(),
            context: self.context.clone(),
            day: self.day.clone(),
            constraints: self.constraints.clone(),
            wod: self.workout.clone(),
            initial_fatigue: self.initial_fatigue.clone(),
        }
    }

    /// Default catalog extended with the scenario's own movements
    pub fn catalog(&self) -> Result<Catalog> {
        let mut catalog = build_default_catalog();
        for movement in &self.movements {
            catalog.insert(movement.clone());
        }

        let errors = catalog.validate();
        if !errors.is_empty() {
            return Err(Error::InvalidWorkout(format!(
                "custom movements: {}",
                errors.join("; ")
            )));
        }
        Ok(catalog)
    }
}

/// Load a scenario from a `.toml` or `.json` file
///
/// Any extension other than `.toml` is read as JSON.
pub fn load_scenario(path: &Path) -> Result<Scenario> {
    let contents = std::fs::read_to_string(path)?;
    let is_toml = path
        .extension()
        .map_or(false, |ext| ext.eq_ignore_ascii_case("toml"));

    let scenario: Scenario = if is_toml {
        toml::from_str(&contents)?
    } else {
        serde_json::from_str(&contents)?
    };

    tracing::info!(
        "Loaded scenario '{}' from {:?}",
        scenario.workout.name,
        path
    );
    Ok(scenario)
}

//! Simulation parameters: an immutable-per-day configuration snapshot read by
//! the step function. Field and enum spellings follow the JSON surface of the
//! parameter files (`camelCase` keys, `kebab-case` enum tags).

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::OutbreakError;

/// How the pathogen moves between hosts. Scales transmission probability.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransmissionMode {
    Airborne,
    DirectContact,
    FluidExchange,
}

impl TransmissionMode {
    /// Multiplier applied to the transmission probability formula.
    #[must_use]
    pub fn factor(self) -> f64 {
        match self {
            TransmissionMode::Airborne => 1.5,
            TransmissionMode::DirectContact => 1.0,
            TransmissionMode::FluidExchange => 0.6,
        }
    }
}

/// Population-level countermeasure in effect for the whole run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InterventionType {
    None,
    MaskMandate,
    SocialDistancing,
    Lockdown,
    SchoolClosure,
}

impl InterventionType {
    /// Transmission reduction fraction at full compliance.
    #[must_use]
    pub fn reduction(self) -> f64 {
        match self {
            InterventionType::None => 0.0,
            InterventionType::MaskMandate => 0.3,
            InterventionType::SocialDistancing => 0.5,
            InterventionType::Lockdown => 0.9,
            InterventionType::SchoolClosure => 0.4,
        }
    }
}

/// The full parameter surface. `incubation_period`, `asymptomatic_rate`,
/// `immunity_duration` and `testing_rate` are part of the public surface but
/// unused by the current propagation math (reserved).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Params {
    pub r_factor: f64,
    pub incubation_period: u32,
    /// Days an infection runs in a city before recovery/mortality resolution
    /// begins.
    pub infectious_period: u32,
    pub asymptomatic_rate: f64,
    pub transmission_mode: TransmissionMode,
    pub mortality_rate: f64,
    pub recovery_period: u32,
    pub immunity_duration: u32,
    pub population_density_factor: f64,
    /// Scales the maximum transmission radius.
    pub mobility_factor: f64,
    pub intervention_type: InterventionType,
    pub compliance_rate: f64,
    pub testing_rate: f64,
    /// Fraction of a city's population treatable before the mortality
    /// penalty applies.
    pub healthcare_capacity: f64,
}

impl Default for Params {
    fn default() -> Self {
        Params {
            r_factor: 2.5,
            incubation_period: 5,
            infectious_period: 14,
            asymptomatic_rate: 0.3,
            transmission_mode: TransmissionMode::Airborne,
            mortality_rate: 0.02,
            recovery_period: 14,
            immunity_duration: 180,
            population_density_factor: 1.0,
            mobility_factor: 1.0,
            intervention_type: InterventionType::None,
            compliance_rate: 0.7,
            testing_rate: 0.5,
            healthcare_capacity: 0.7,
        }
    }
}

impl Params {
    /// Loads parameters from a JSON file. Missing fields fall back to the
    /// defaults, so partial files are fine.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is unreachable or not valid JSON.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Params, OutbreakError> {
        let file = File::open(path.as_ref())?;
        let params = serde_json::from_reader(BufReader::new(file))?;
        Ok(params)
    }
}

//! A toy stochastic epidemic simulator over geographic population centers.
//!
//! The simulation steps a discrete-time infection model across a fixed set
//! of cities loaded from a GeoJSON dataset. Each simulated day, existing
//! infections progress (recovery and mortality resolve once a city's
//! infectious period elapses) and infection spreads stochastically to
//! geographically nearby cities, dampened by whatever intervention is in
//! effect.
//!
//! The central object is the [`Simulation`] controller: an explicit owned
//! instance that holds the [`CityRegistry`], the current [`Params`] and all
//! run-wide state (day counter, run/pause flags, history, peak tracking,
//! termination detection). External observers subscribe to
//! [`SimulationEvent`]s and never touch the registry or step function
//! directly:
//!
//! ```no_run
//! use outbreak::{CityRegistry, Params, Simulation, SimulationEvent};
//!
//! let registry = CityRegistry::from_path("data/us-cities.json")?;
//! let mut simulation = Simulation::new(registry, Params::default(), 42);
//! simulation.subscribe(|event| {
//!     if let SimulationEvent::DayChanged { day } = event {
//!         println!("day {day}");
//!     }
//! });
//! simulation.set_patient_zero("Chicago");
//! simulation.start();
//! let report = simulation.run().expect("run ends on its own");
//! report.write_json("report.json")?;
//! # Ok::<(), outbreak::OutbreakError>(())
//! ```
//!
//! All randomness flows through a single seeded generator, so two runs with
//! the same seed, parameters and patient zero produce identical day-by-day
//! histories.

pub mod city;
pub mod error;
pub mod geo;
pub mod log;
pub mod params;
pub mod report;
pub mod simulation;
pub mod spread;

pub use city::{City, CityId, CityRegistry, HealthStatus, Statistics};
pub use error::OutbreakError;
pub use params::{InterventionType, Params, TransmissionMode};
pub use report::{DayRecord, FinalReport};
pub use simulation::{Simulation, SimulationEvent, SimulationState, Status, MAX_SIMULATION_DAYS};

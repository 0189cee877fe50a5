//! The simulation controller: owns run-wide state (day counter, run/pause
//! flags, speed, history, peak tracking, termination) and drives the step
//! function, publishing events to registered observers. UI layers talk to
//! the simulation only through this type.

use std::thread;
use std::time::Duration;

use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::city::{CityId, CityRegistry, Statistics};
use crate::params::Params;
use crate::report::{DayRecord, FinalReport};
use crate::spread;

/// Hard cap on run length, in simulated days.
pub const MAX_SIMULATION_DAYS: u32 = 365;
/// Consecutive low/zero-infection days required before a run may end.
const END_STREAK_DAYS: u32 = 7;
/// The low-infection streak only counts once the run is this far past the
/// recorded peak, so a still-climbing early phase is never cut short.
const DAYS_PAST_PEAK: u32 = 30;

/// Status transitions published through [`SimulationEvent::StatusChanged`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Status {
    Started,
    Resumed,
    Paused,
    Stopped,
    Reset,
    NeedPatientZero,
    PatientZeroSet,
}

/// Events published to subscribers. Observers never mutate the simulation
/// from inside a callback; they receive snapshots.
#[derive(Clone, Debug)]
pub enum SimulationEvent {
    /// Every tick.
    DayChanged { day: u32 },
    /// On state transitions.
    StatusChanged(Status),
    /// Every tick and after patient-zero set/reset.
    StatisticsUpdated(Statistics),
    /// Once, when a run ends.
    SimulationEnded(FinalReport),
}

/// A point-in-time view of the controller's state.
#[derive(Clone, Debug)]
pub struct SimulationState {
    pub is_running: bool,
    pub is_paused: bool,
    pub current_day: u32,
    pub patient_zero: Option<String>,
}

type Listener = Box<dyn FnMut(&SimulationEvent)>;

/// An explicit owned simulation instance. Construct one per run (or per
/// test); there is no global engine.
pub struct Simulation {
    registry: CityRegistry,
    params: Params,
    rng: StdRng,
    seed: u64,

    current_day: u32,
    is_running: bool,
    is_paused: bool,
    /// Ticks per second for [`Simulation::run`]. `<= 0` means unpaced.
    speed: f64,
    patient_zero: Option<CityId>,
    history: Vec<DayRecord>,
    peak_infections: u64,
    peak_infection_day: u32,
    low_infection_streak: u32,
    run_until_eradication: bool,
    end_reason: Option<String>,

    listeners: Vec<Listener>,
}

impl Simulation {
    #[must_use]
    pub fn new(registry: CityRegistry, params: Params, seed: u64) -> Simulation {
        Simulation {
            registry,
            params,
            rng: StdRng::seed_from_u64(seed),
            seed,
            current_day: 0,
            is_running: false,
            is_paused: false,
            speed: 1.0,
            patient_zero: None,
            history: Vec::new(),
            peak_infections: 0,
            peak_infection_day: 0,
            low_infection_streak: 0,
            run_until_eradication: false,
            end_reason: None,
            listeners: Vec::new(),
        }
    }

    /// Registers an observer for all published events.
    pub fn subscribe(&mut self, listener: impl FnMut(&SimulationEvent) + 'static) {
        self.listeners.push(Box::new(listener));
    }

    fn emit(&mut self, event: &SimulationEvent) {
        for listener in &mut self.listeners {
            listener(event);
        }
    }

    /// Applies a partial parameter update.
    pub fn update_params(&mut self, update: impl FnOnce(&mut Params)) {
        update(&mut self.params);
    }

    #[must_use]
    pub fn params(&self) -> &Params {
        &self.params
    }

    #[must_use]
    pub fn registry(&self) -> &CityRegistry {
        &self.registry
    }

    #[must_use]
    pub fn history(&self) -> &[DayRecord] {
        &self.history
    }

    #[must_use]
    pub fn current_day(&self) -> u32 {
        self.current_day
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.is_running
    }

    #[must_use]
    pub fn state(&self) -> SimulationState {
        SimulationState {
            is_running: self.is_running,
            is_paused: self.is_paused,
            current_day: self.current_day,
            patient_zero: self
                .patient_zero
                .map(|id| self.registry.get(id).name.clone()),
        }
    }

    /// Sets the tick rate in ticks per second. Takes effect on the next tick
    /// of a running loop; elapsed state is never lost.
    pub fn set_speed(&mut self, ticks_per_second: f64) {
        self.speed = ticks_per_second;
    }

    /// When on, a run only ends once infections reach exactly zero (plus the
    /// usual streak), not merely "low".
    pub fn set_eradication_mode(&mut self, value: bool) {
        self.run_until_eradication = value;
    }

    #[must_use]
    pub fn eradication_mode(&self) -> bool {
        self.run_until_eradication
    }

    /// Designates the outbreak origin. Unknown names are logged and ignored.
    pub fn set_patient_zero(&mut self, name: &str) {
        match self.registry.set_patient_zero(name) {
            Ok(city_id) => {
                self.patient_zero = Some(city_id);
                let stats = self.registry.statistics();
                self.emit(&SimulationEvent::StatisticsUpdated(stats));
                self.emit(&SimulationEvent::StatusChanged(Status::PatientZeroSet));
            }
            Err(error) => {
                warn!("cannot set patient zero: {error}");
            }
        }
    }

    /// Clears the patient-zero designation, forcing the city back to
    /// susceptible.
    pub fn clear_patient_zero(&mut self) {
        if let Some(city_id) = self.patient_zero.take() {
            self.registry.get_mut(city_id).reset();
        }
        self.is_running = false;
        self.is_paused = false;
        self.emit(&SimulationEvent::StatusChanged(Status::Reset));
    }

    /// Starts a new run, or resumes a paused one. Without a patient zero
    /// this emits [`Status::NeedPatientZero`] and does nothing else.
    pub fn start(&mut self) {
        if self.patient_zero.is_none() {
            warn!("start requested with no patient zero set");
            self.emit(&SimulationEvent::StatusChanged(Status::NeedPatientZero));
            return;
        }
        if self.is_running && !self.is_paused {
            return;
        }
        if self.is_running && self.is_paused {
            self.is_paused = false;
            self.emit(&SimulationEvent::StatusChanged(Status::Resumed));
            return;
        }
        self.is_running = true;
        self.is_paused = false;
        info!("simulation started");
        self.emit(&SimulationEvent::StatusChanged(Status::Started));
    }

    /// Pauses a running simulation; no-op otherwise.
    pub fn pause(&mut self) {
        if !self.is_running || self.is_paused {
            return;
        }
        self.is_paused = true;
        self.emit(&SimulationEvent::StatusChanged(Status::Paused));
    }

    /// Stops a running simulation and generates the final report, which is
    /// both emitted as [`SimulationEvent::SimulationEnded`] and returned.
    /// Returns `None` if the simulation was not running.
    pub fn stop(&mut self) -> Option<FinalReport> {
        if !self.is_running {
            return None;
        }
        self.is_running = false;
        self.is_paused = false;
        self.emit(&SimulationEvent::StatusChanged(Status::Stopped));

        let report = self.generate_report();
        info!("simulation ended: {}", report.end_reason);
        self.emit(&SimulationEvent::SimulationEnded(report.clone()));
        Some(report)
    }

    /// Returns the simulation to day zero: stops a running simulation,
    /// zeroes the day/history/peak/streak counters, reseeds the random
    /// source, and resets every city. The same patient zero is re-seeded
    /// unless `clear_patient_zero` is set. Parameters and the eradication
    /// toggle are preserved.
    pub fn reset(&mut self, clear_patient_zero: bool) {
        self.stop();
        self.current_day = 0;
        self.history.clear();
        self.peak_infections = 0;
        self.peak_infection_day = 0;
        self.low_infection_streak = 0;
        self.end_reason = None;
        self.is_running = false;
        self.is_paused = false;
        self.rng = StdRng::seed_from_u64(self.seed);
        self.registry.reset_all();

        if clear_patient_zero {
            self.patient_zero = None;
        } else if let Some(city_id) = self.patient_zero {
            let name = self.registry.get(city_id).name.clone();
            if let Ok(new_id) = self.registry.set_patient_zero(&name) {
                self.patient_zero = Some(new_id);
            }
        }

        self.emit(&SimulationEvent::DayChanged { day: 0 });
        self.emit(&SimulationEvent::StatusChanged(Status::Reset));
        let stats = self.registry.statistics();
        self.emit(&SimulationEvent::StatisticsUpdated(stats));
    }

    /// Advances one simulated day: steps the epidemic, appends to history,
    /// updates peak tracking, publishes events and evaluates termination.
    /// Returns the final report when this tick ended the run. No-op while
    /// not running or paused.
    pub fn tick(&mut self) -> Option<FinalReport> {
        if !self.is_running || self.is_paused {
            return None;
        }
        self.current_day += 1;
        spread::advance_day(
            &mut self.registry,
            &self.params,
            self.current_day,
            &mut self.rng,
        );

        let stats = self.registry.statistics();
        self.history.push(DayRecord {
            day: self.current_day,
            statistics: stats.clone(),
        });
        if stats.infected > self.peak_infections {
            self.peak_infections = stats.infected;
            self.peak_infection_day = self.current_day;
        }

        self.emit(&SimulationEvent::DayChanged {
            day: self.current_day,
        });
        self.emit(&SimulationEvent::StatisticsUpdated(stats.clone()));

        self.update_streak(&stats);
        if let Some(reason) = self.termination_reason(&stats) {
            debug!("day {}: ending run - {reason}", self.current_day);
            self.end_reason = Some(reason);
            return self.stop();
        }
        None
    }

    /// Drives ticks until the run ends or is paused, sleeping between ticks
    /// according to the configured speed. The speed is re-read every
    /// iteration, so `set_speed` reschedules the cadence without losing
    /// elapsed state. Returns the final report if the run ended.
    pub fn run(&mut self) -> Option<FinalReport> {
        while self.is_running && !self.is_paused {
            if let Some(report) = self.tick() {
                return Some(report);
            }
            if self.speed > 0.0 {
                thread::sleep(Duration::from_secs_f64(1.0 / self.speed));
            }
        }
        None
    }

    fn update_streak(&mut self, stats: &Statistics) {
        let low_threshold = low_infection_threshold(stats.total_population);
        if stats.infected == 0 {
            self.low_infection_streak += 1;
        } else if stats.infected <= low_threshold
            && self.peak_infection_day > 0
            && self.current_day > self.peak_infection_day + DAYS_PAST_PEAK
        {
            // Well past the peak with very low numbers counts as near-zero,
            // so the run cannot drag on with a trickle of cases.
            self.low_infection_streak += 1;
        } else {
            if self.low_infection_streak > 0 {
                debug!(
                    "day {}: streak of {} low days broken by {} infections",
                    self.current_day, self.low_infection_streak, stats.infected
                );
            }
            self.low_infection_streak = 0;
        }
    }

    fn termination_reason(&self, stats: &Statistics) -> Option<String> {
        if self.current_day >= MAX_SIMULATION_DAYS {
            return Some(format!(
                "Maximum simulation period reached ({MAX_SIMULATION_DAYS} days)"
            ));
        }
        if self.run_until_eradication {
            if stats.infected == 0 && self.low_infection_streak >= END_STREAK_DAYS {
                return Some(format!(
                    "No infections for {} consecutive days - disease eradicated",
                    self.low_infection_streak
                ));
            }
            return None;
        }
        if self.peak_infections > 0 && self.low_infection_streak >= END_STREAK_DAYS {
            return Some(format!(
                "Near-zero infections for {} days after peak of {} on day {}",
                self.low_infection_streak, self.peak_infections, self.peak_infection_day
            ));
        }
        None
    }

    fn generate_report(&mut self) -> FinalReport {
        let end_reason = self
            .end_reason
            .take()
            .unwrap_or_else(|| "Simulation manually stopped".to_string());
        FinalReport {
            duration_days: self.current_day,
            final_statistics: self.registry.statistics(),
            peak_infections: self.peak_infections,
            peak_infection_day: self.peak_infection_day,
            end_reason,
            history: self.history.clone(),
        }
    }
}

fn low_infection_threshold(total_population: u64) -> u64 {
    // 0.01% of the population, with a floor of 10.
    ((total_population as f64 * 0.0001).ceil() as u64).max(10)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::city::{City, HealthStatus};
    use crate::params::InterventionType;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn test_registry() -> CityRegistry {
        CityRegistry::new(vec![
            City::new("Hub", "Ohio", 1_000_000, 40.0, -83.0),
            City::new("Near", "Ohio", 200_000, 40.3, -83.2),
            City::new("Mid", "Ohio", 500_000, 40.9, -82.5),
            City::new("Edge", "Ohio", 80_000, 41.5, -84.0),
        ])
    }

    fn simulation(seed: u64) -> Simulation {
        let mut sim = Simulation::new(test_registry(), Params::default(), seed);
        sim.set_speed(0.0); // unpaced for tests
        sim
    }

    fn capture_statuses(sim: &mut Simulation) -> Rc<RefCell<Vec<Status>>> {
        let statuses = Rc::new(RefCell::new(Vec::new()));
        let captured = statuses.clone();
        sim.subscribe(move |event| {
            if let SimulationEvent::StatusChanged(status) = event {
                captured.borrow_mut().push(*status);
            }
        });
        statuses
    }

    #[test]
    fn start_without_patient_zero_emits_need_patient_zero() {
        let mut sim = simulation(0);
        let statuses = capture_statuses(&mut sim);

        sim.start();

        assert_eq!(*statuses.borrow(), vec![Status::NeedPatientZero]);
        assert!(!sim.is_running());
        assert!(sim.tick().is_none());
        assert_eq!(sim.current_day(), 0);
    }

    #[test]
    fn set_patient_zero_arms_and_emits() {
        let mut sim = simulation(0);
        let statuses = capture_statuses(&mut sim);

        sim.set_patient_zero("Hub");
        assert_eq!(sim.state().patient_zero.as_deref(), Some("Hub"));
        assert_eq!(*statuses.borrow(), vec![Status::PatientZeroSet]);
    }

    #[test]
    fn unknown_patient_zero_is_a_no_op() {
        let mut sim = simulation(0);
        let statuses = capture_statuses(&mut sim);

        sim.set_patient_zero("Atlantis");
        assert!(sim.state().patient_zero.is_none());
        assert!(statuses.borrow().is_empty());
    }

    #[test]
    fn start_pause_resume_stop_transitions() {
        let mut sim = simulation(0);
        sim.set_patient_zero("Hub");
        let statuses = capture_statuses(&mut sim);

        sim.start();
        assert!(sim.is_running());
        sim.start(); // already running: no-op
        sim.pause();
        assert!(sim.state().is_paused);
        assert!(sim.tick().is_none(), "ticks are inert while paused");
        sim.pause(); // already paused: no-op
        sim.start(); // resume
        assert!(!sim.state().is_paused);
        sim.stop().unwrap();
        assert!(!sim.is_running());
        assert!(sim.stop().is_none(), "stop while stopped is a no-op");

        assert_eq!(
            *statuses.borrow(),
            vec![
                Status::Started,
                Status::Paused,
                Status::Resumed,
                Status::Stopped
            ]
        );
    }

    #[test]
    fn tick_appends_history_and_emits() {
        let mut sim = simulation(3);
        sim.set_patient_zero("Hub");
        sim.start();

        let days = Rc::new(RefCell::new(Vec::new()));
        let captured = days.clone();
        sim.subscribe(move |event| {
            if let SimulationEvent::DayChanged { day } = event {
                captured.borrow_mut().push(*day);
            }
        });

        sim.tick();
        sim.tick();

        assert_eq!(*days.borrow(), vec![1, 2]);
        assert_eq!(sim.history().len(), 2);
        assert_eq!(sim.history()[0].day, 1);
        assert_eq!(sim.current_day(), 2);
    }

    #[test]
    fn manual_stop_reports_manual_reason() {
        let mut sim = simulation(3);
        sim.set_patient_zero("Hub");
        sim.start();
        sim.tick();

        let report = sim.stop().unwrap();
        assert_eq!(report.end_reason, "Simulation manually stopped");
        assert_eq!(report.duration_days, 1);
        assert_eq!(report.history.len(), 1);
    }

    #[test]
    fn run_terminates_within_the_hard_cap() {
        for seed in [0u64, 1, 42] {
            let mut sim = simulation(seed);
            sim.set_patient_zero("Hub");
            sim.start();
            let report = sim.run().expect("run should end on its own");
            assert!(report.duration_days <= MAX_SIMULATION_DAYS, "seed {seed}");
            assert!(!sim.is_running());
        }
    }

    #[test]
    fn run_terminates_under_varied_parameters() {
        let high_mortality = Params {
            mortality_rate: 0.5,
            ..Params::default()
        };
        let locked_down = Params {
            intervention_type: InterventionType::Lockdown,
            compliance_rate: 1.0,
            ..Params::default()
        };

        for params in [high_mortality, locked_down] {
            let mut sim = Simulation::new(test_registry(), params, 9);
            sim.set_speed(0.0);
            sim.set_patient_zero("Hub");
            sim.start();
            let report = sim.run().expect("run should end on its own");
            assert!(report.duration_days <= MAX_SIMULATION_DAYS);
        }
    }

    #[test]
    fn eradication_mode_requires_exact_zero() {
        let mut sim = simulation(5);
        sim.set_eradication_mode(true);
        sim.set_patient_zero("Hub");
        sim.start();
        let report = sim.run().unwrap();

        // Either every infection cleared, or the hard cap fired.
        if report.duration_days < MAX_SIMULATION_DAYS {
            assert_eq!(report.final_statistics.infected, 0);
            assert!(report.end_reason.contains("eradicated"));
        }
    }

    #[test]
    fn simulation_ended_is_emitted_once() {
        let mut sim = simulation(5);
        sim.set_patient_zero("Hub");
        let count = Rc::new(RefCell::new(0u32));
        let captured = count.clone();
        sim.subscribe(move |event| {
            if matches!(event, SimulationEvent::SimulationEnded(_)) {
                *captured.borrow_mut() += 1;
            }
        });

        sim.start();
        sim.run();
        sim.stop();

        assert_eq!(*count.borrow(), 1);
    }

    #[test]
    fn identical_seeds_produce_identical_histories() {
        let mut first = simulation(1234);
        let mut second = simulation(1234);
        for sim in [&mut first, &mut second] {
            sim.set_patient_zero("Hub");
            sim.start();
            sim.run();
        }
        assert_eq!(first.history(), second.history());
        assert!(!first.history().is_empty());
    }

    #[test]
    fn different_seeds_usually_diverge() {
        let mut first = simulation(1);
        let mut second = simulation(2);
        for sim in [&mut first, &mut second] {
            sim.set_patient_zero("Hub");
            sim.start();
            sim.run();
        }
        assert_ne!(first.history(), second.history());
    }

    #[test]
    fn reset_preserves_patient_zero_and_params() {
        let mut sim = simulation(7);
        sim.update_params(|p| p.r_factor = 3.5);
        sim.set_patient_zero("Near");
        sim.start();
        sim.tick();
        sim.tick();

        sim.reset(false);

        assert_eq!(sim.current_day(), 0);
        assert!(sim.history().is_empty());
        assert_eq!(sim.params().r_factor, 3.5);
        assert_eq!(sim.state().patient_zero.as_deref(), Some("Near"));
        let near = sim.registry().get(sim.registry().by_name("Near").unwrap());
        assert_eq!(near.infected_count, 1);
        assert!(near.is_patient_zero);
    }

    #[test]
    fn reset_after_run_reproduces_the_same_history() {
        let mut sim = simulation(7);
        sim.set_patient_zero("Hub");
        sim.start();
        sim.run();
        let first_history = sim.history().to_vec();

        sim.reset(false);
        sim.start();
        sim.run();

        assert_eq!(sim.history(), first_history.as_slice());
    }

    #[test]
    fn reset_can_clear_patient_zero() {
        let mut sim = simulation(7);
        sim.set_patient_zero("Hub");
        sim.reset(true);
        assert!(sim.state().patient_zero.is_none());

        let statuses = capture_statuses(&mut sim);
        sim.start();
        assert_eq!(*statuses.borrow(), vec![Status::NeedPatientZero]);
    }

    #[test]
    fn clear_patient_zero_forces_city_susceptible() {
        let mut sim = simulation(7);
        sim.set_patient_zero("Hub");
        sim.clear_patient_zero();

        assert!(sim.state().patient_zero.is_none());
        let hub = sim.registry().get(sim.registry().by_name("Hub").unwrap());
        assert_eq!(hub.status, HealthStatus::Susceptible);
        assert_eq!(hub.infected_count, 0);
        assert!(!hub.is_patient_zero);
    }

    #[test]
    fn peak_tracking_follows_history() {
        let mut sim = simulation(11);
        sim.set_patient_zero("Hub");
        sim.start();
        let report = sim.run().unwrap();

        let max_in_history = report
            .history
            .iter()
            .map(|r| r.statistics.infected)
            .max()
            .unwrap();
        assert_eq!(report.peak_infections, max_in_history);
        let peak_record = report
            .history
            .iter()
            .find(|r| r.statistics.infected == max_in_history)
            .unwrap();
        assert_eq!(report.peak_infection_day, peak_record.day);
    }

    #[test]
    fn low_infection_threshold_floor() {
        assert_eq!(low_infection_threshold(1000), 10);
        assert_eq!(low_infection_threshold(10_000_000), 1000);
    }
}

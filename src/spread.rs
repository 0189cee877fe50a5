//! The epidemic step function: advances every city by one simulated day.
//!
//! Two passes, in order. Pass 1 progresses existing infections and resolves
//! recovery/mortality, so spread for day N is computed from post-recovery
//! counts. Pass 2 spreads infection from each infectious city to its
//! geographic neighbors.
//!
//! The multipliers below are empirically tuned for a plausible-looking demo,
//! not derived from an epidemiological model. They are kept as named
//! tunables rather than re-derived.

#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss
)]

use log::{debug, error};
use rand::Rng;
use rustc_hash::FxHashSet;

use crate::city::{City, CityId, CityRegistry, HealthStatus};
use crate::geo;
use crate::params::{InterventionType, Params};

/// Maximum transmission radius before the mobility factor is applied.
pub const BASE_SPREAD_RADIUS_KM: f64 = 300.0;
/// While patient zero is this young, its search radius is doubled to model
/// early long-range seeding.
const PATIENT_ZERO_WIDE_REACH_DAYS: u32 = 20;
/// While patient zero is this young, the nearest susceptible neighbor is
/// force-infected every day, guaranteeing visible early spread.
const PATIENT_ZERO_FORCED_SEED_DAYS: u32 = 15;
/// While patient zero is this young, transmission probability bypasses the
/// general formula entirely.
const PATIENT_ZERO_AGGRESSIVE_SEED_DAYS: u32 = 10;
/// Base probability used during the aggressive seeding window.
const PATIENT_ZERO_SEED_PROBABILITY: f64 = 0.5;
/// Recovery/mortality for patient zero is mostly skipped before this day.
const PATIENT_ZERO_SLOW_RECOVERY_DAYS: u32 = 30;
/// Chance that a patient-zero recovery pass is processed during the slow
/// window.
const PATIENT_ZERO_RECOVERY_CHANCE: f64 = 0.1;
/// Patient zero keeps at least one active case until this day.
const PATIENT_ZERO_SURVIVAL_FLOOR_DAYS: u32 = 20;

/// Distance falloff never drops below this factor inside the radius.
const MIN_DISTANCE_FACTOR: f64 = 0.3;
/// Population the density term is normalized against.
const DENSITY_REFERENCE_POPULATION: f64 = 100_000.0;
/// Empirical multiplier on the transmission formula.
const TRANSMISSION_BOOST: f64 = 30.0;
const TRANSMISSION_SCALE: f64 = 10.0;
/// Minimum transmission probability once the general formula applies.
const PROBABILITY_FLOOR: f64 = 0.05;
/// Boost when the target city has never seen a case.
const SUSCEPTIBLE_CITY_BOOST: f64 = 2.0;
/// Days considered the "early phase" of the outbreak.
const EARLY_PHASE_DAYS: u32 = 30;
/// Boost applied during the early phase.
const EARLY_PHASE_BOOST: f64 = 1.5;
/// Per-day growth caps on a city's infected count.
const EARLY_GROWTH_CAP: f64 = 2.0;
const LATE_GROWTH_CAP: f64 = 1.5;
/// Chance a lone remaining case clears out entirely.
const LONE_INFECTION_RECOVERY_CHANCE: f64 = 0.8;
/// Fraction of cases recovering per resolution during the early phase.
const EARLY_RECOVERY_FRACTION: f64 = 0.3;
/// Below this many cases, at least one recovery happens per resolution.
const RECOVERY_FLOOR_THRESHOLD: u64 = 10;
/// Near-total lockdown leaves this fraction of transmission (essential
/// workers and leakage).
const LOCKDOWN_LEAKAGE: f64 = 0.01;
const LOCKDOWN_FULL_COMPLIANCE: f64 = 0.99;

// Fields of the spreading city read while its neighbors are mutated.
struct SourceCity {
    population: u64,
    infected_count: u64,
    days_since_infection: u32,
    is_patient_zero: bool,
}

impl SourceCity {
    fn snapshot(city: &City) -> SourceCity {
        SourceCity {
            population: city.population,
            infected_count: city.infected_count,
            days_since_infection: city.days_since_infection,
            is_patient_zero: city.is_patient_zero,
        }
    }
}

/// Advances all cities by one day: progression of existing infections, then
/// stochastic spread to neighbors. `day` is the day index being simulated.
pub fn advance_day(registry: &mut CityRegistry, params: &Params, day: u32, rng: &mut impl Rng) {
    // Pass 1: progression. Resolutions happen before any new spread so the
    // day's transmissions see post-recovery counts.
    for index in 0..registry.len() {
        let city = registry.get_mut(CityId(index));
        if city.status == HealthStatus::Infected {
            city.days_since_infection += 1;
            if city.days_since_infection >= params.infectious_period {
                resolve_recovery_and_mortality(city, params, day, rng);
            }
        }
    }

    // Pass 2: spread. Cities infected earlier in this pass are skipped as
    // targets for the rest of the tick but may themselves spread when their
    // turn comes, matching the per-city visit order.
    let mut newly_infected: FxHashSet<CityId> = FxHashSet::default();
    for index in 0..registry.len() {
        let source_id = CityId(index);
        {
            let city = registry.get(source_id);
            if city.status != HealthStatus::Infected || city.infected_count == 0 {
                continue;
            }
        }
        let source = SourceCity::snapshot(registry.get(source_id));

        let mut radius = BASE_SPREAD_RADIUS_KM * params.mobility_factor;
        if source.is_patient_zero && source.days_since_infection < PATIENT_ZERO_WIDE_REACH_DAYS {
            radius *= 2.0;
        }
        let neighbors = registry.nearest_to(source_id, radius);

        if source.is_patient_zero && source.days_since_infection < PATIENT_ZERO_FORCED_SEED_DAYS {
            let nearest_susceptible = neighbors.iter().find(|(target_id, _)| {
                registry.get(*target_id).status == HealthStatus::Susceptible
                    && !newly_infected.contains(target_id)
            });
            if let Some(&(target_id, _)) = nearest_susceptible {
                let target = registry.get_mut(target_id);
                target.status = HealthStatus::Infected;
                target.infection_day = Some(day);
                target.days_since_infection = 0;
                target.infected_count = 1;
                newly_infected.insert(target_id);
                debug!("day {day}: patient zero forced infection to {}", target.name);
            }
        }

        for (target_id, distance) in neighbors {
            if newly_infected.contains(&target_id) {
                continue;
            }

            let probability =
                transmission_probability(&source, registry.get(target_id), distance, params, day);

            if rng.random::<f64>() < probability {
                let target = registry.get_mut(target_id);
                if target.status == HealthStatus::Susceptible {
                    target.status = HealthStatus::Infected;
                    target.infection_day = Some(day);
                    target.days_since_infection = 0;
                    newly_infected.insert(target_id);
                }
                let new_infections = new_infection_count(target, probability, params, day, rng);
                target.infected_count += new_infections;
                if new_infections > 0 {
                    debug!(
                        "day {day}: {} new infections in {} (p = {probability:.3})",
                        new_infections, target.name
                    );
                }
            }
        }
    }
}

/// Probability that `source` transmits to `target` at `distance` km, in
/// [0, 1]. Patient zero bypasses the general formula during its aggressive
/// seeding window; both branches pass through the intervention adjustment.
fn transmission_probability(
    source: &SourceCity,
    target: &City,
    distance: f64,
    params: &Params,
    day: u32,
) -> f64 {
    let max_distance = BASE_SPREAD_RADIUS_KM * params.mobility_factor;
    let distance_factor = geo::transmission_risk(distance, max_distance).max(MIN_DISTANCE_FACTOR);

    let base = if source.is_patient_zero
        && source.days_since_infection < PATIENT_ZERO_AGGRESSIVE_SEED_DAYS
    {
        (PATIENT_ZERO_SEED_PROBABILITY * distance_factor).min(1.0)
    } else {
        let density_factor = ((target.population as f64 / DENSITY_REFERENCE_POPULATION + 1.0)
            .ln()
            * params.population_density_factor)
            .min(1.0);
        let infected_ratio = source.infected_count as f64 / source.population as f64;

        let mut probability = (params.r_factor
            * distance_factor
            * density_factor
            * params.transmission_mode.factor()
            * infected_ratio
            * TRANSMISSION_BOOST)
            / TRANSMISSION_SCALE;
        probability = probability.max(PROBABILITY_FLOOR).min(1.0);

        if target.status == HealthStatus::Susceptible {
            probability = (probability * SUSCEPTIBLE_CITY_BOOST).min(1.0);
        }
        if day < EARLY_PHASE_DAYS {
            probability = (probability * EARLY_PHASE_BOOST).min(1.0);
        }
        probability
    };

    apply_intervention(base, params).clamp(0.0, 1.0)
}

/// Dampens a transmission probability according to the active intervention,
/// scaled by compliance. Lockdown at near-total compliance short-circuits to
/// a flat leakage multiplier.
fn apply_intervention(probability: f64, params: &Params) -> f64 {
    match params.intervention_type {
        InterventionType::None => probability,
        InterventionType::Lockdown if params.compliance_rate >= LOCKDOWN_FULL_COMPLIANCE => {
            probability * LOCKDOWN_LEAKAGE
        }
        kind => probability * (1.0 - kind.reduction() * params.compliance_rate),
    }
}

/// Number of new cases added to `target` once transmission has occurred.
/// SIR-style rate with random jitter, capped by a growth factor and by the
/// remaining susceptible count.
fn new_infection_count(
    target: &City,
    transmission_probability: f64,
    params: &Params,
    day: u32,
    rng: &mut impl Rng,
) -> u64 {
    let susceptible = target.susceptible();
    if susceptible == 0 {
        return 0;
    }

    // A city that just flipped to infected is seeded with exactly one case.
    if target.infected_count == 0 {
        return 1;
    }

    let contact_rate = params.r_factor / f64::from(params.infectious_period);
    let rate = contact_rate
        * target.infected_count as f64
        * (susceptible as f64 / target.population as f64)
        * transmission_probability;
    let jitter = rng.random_range(0.7..1.3);
    let new_infections = (rate * jitter).ceil() as u64;

    let growth_cap = if day < EARLY_PHASE_DAYS {
        EARLY_GROWTH_CAP
    } else {
        LATE_GROWTH_CAP
    };
    let max_new_infections = ((target.infected_count as f64 * growth_cap).ceil() as u64).max(1);

    new_infections.min(max_new_infections).min(susceptible)
}

/// Resolves recovery and mortality for a city whose days-since-infection has
/// reached the infectious period.
fn resolve_recovery_and_mortality(city: &mut City, params: &Params, day: u32, rng: &mut impl Rng) {
    if city.infected_count == 0 {
        city.status = if city.recovered_count > 0 {
            HealthStatus::Recovered
        } else {
            HealthStatus::Susceptible
        };
        city.recovery_day = Some(day);
        return;
    }

    // Patient zero recovers more slowly so the seed stays infectious long
    // enough to establish the outbreak.
    if city.is_patient_zero
        && city.days_since_infection < PATIENT_ZERO_SLOW_RECOVERY_DAYS
        && rng.random::<f64>() > PATIENT_ZERO_RECOVERY_CHANCE
    {
        return;
    }

    let mut effective_mortality = params.mortality_rate;
    let infected_fraction = city.infected_count as f64 / city.population as f64;
    if params.healthcare_capacity > 0.0 && infected_fraction > params.healthcare_capacity {
        let overload_factor = infected_fraction / params.healthcare_capacity;
        effective_mortality *= 1.0 + (overload_factor - 1.0).min(1.0);
    }

    let infected_before = city.infected_count;
    let deaths =
        ((infected_before as f64 * effective_mortality).round() as u64).min(infected_before);
    city.infected_count -= deaths;
    city.deceased_count += deaths;

    let remaining = city.infected_count;
    let mut recoveries = if remaining == 1 {
        // Lone cases clear out most of the time so cities don't get stuck
        // with one infection indefinitely.
        u64::from(rng.random::<f64>() < LONE_INFECTION_RECOVERY_CHANCE)
    } else if day < EARLY_PHASE_DAYS {
        (remaining as f64 * EARLY_RECOVERY_FRACTION).round() as u64
    } else {
        let gradual = (remaining as f64 / f64::from(params.recovery_period)).round() as u64;
        if remaining <= RECOVERY_FLOOR_THRESHOLD && gradual == 0 {
            1
        } else {
            gradual
        }
    };

    recoveries = recoveries.min(remaining);
    if deaths + recoveries > infected_before {
        error!(
            "recovery overflow in {}: {deaths} deaths + {recoveries} recoveries > {infected_before} infected",
            city.name
        );
        recoveries = infected_before - deaths;
    }
    city.recovered_count += recoveries;
    city.infected_count -= recoveries;

    if city.is_patient_zero
        && city.days_since_infection < PATIENT_ZERO_SURVIVAL_FLOOR_DAYS
        && city.infected_count == 0
    {
        city.infected_count = 1;
    } else if city.infected_count == 0 {
        city.status = if city.recovered_count > 0 {
            HealthStatus::Recovered
        } else {
            HealthStatus::Susceptible
        };
        city.recovery_day = Some(day);
    }
}

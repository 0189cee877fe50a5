//! The city registry: the mutable collection of geographic population
//! centers the epidemic is stepped across. Cities are loaded once at startup
//! from a GeoJSON dataset and addressed by [`CityId`] thereafter.

use std::fmt;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use log::trace;
use serde::{Deserialize, Serialize};

use crate::error::OutbreakError;
use crate::geo;

/// A handle to a city in the [`CityRegistry`]. Ids are assigned in dataset
/// order and remain stable for the life of the registry.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CityId(pub usize);

impl fmt::Debug for CityId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "City {}", self.0)
    }
}

impl fmt::Display for CityId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Aggregate epidemic status of a city.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HealthStatus {
    Susceptible,
    Infected,
    Recovered,
}

/// A point entity with fixed geography and mutable epidemic state.
///
/// Counts are unsigned so negative values are unrepresentable; every
/// subtraction site uses saturating arithmetic and logs if a clamp fires.
/// Invariant: `infected_count + deceased_count + recovered_count <=
/// population`.
#[derive(Clone, Debug)]
pub struct City {
    pub name: String,
    /// Region code (US state). Name + region is the unique key; multiple
    /// cities may share a name across regions.
    pub region: String,
    pub population: u64,
    pub latitude: f64,
    pub longitude: f64,

    pub status: HealthStatus,
    /// Day index the city became infected, or `None` while never infected.
    pub infection_day: Option<u32>,
    pub recovery_day: Option<u32>,
    pub days_since_infection: u32,
    pub infected_count: u64,
    pub deceased_count: u64,
    pub recovered_count: u64,
    pub is_patient_zero: bool,
}

impl City {
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        region: impl Into<String>,
        population: u64,
        latitude: f64,
        longitude: f64,
    ) -> City {
        City {
            name: name.into(),
            region: region.into(),
            population,
            latitude,
            longitude,
            status: HealthStatus::Susceptible,
            infection_day: None,
            recovery_day: None,
            days_since_infection: 0,
            infected_count: 0,
            deceased_count: 0,
            recovered_count: 0,
            is_patient_zero: false,
        }
    }

    /// Susceptible head count, derived and clamped to `>= 0`; never stored.
    #[must_use]
    pub fn susceptible(&self) -> u64 {
        self.population
            .saturating_sub(self.infected_count + self.deceased_count + self.recovered_count)
    }

    /// Returns the city to the all-susceptible startup state.
    pub fn reset(&mut self) {
        self.status = HealthStatus::Susceptible;
        self.infection_day = None;
        self.recovery_day = None;
        self.days_since_infection = 0;
        self.infected_count = 0;
        self.deceased_count = 0;
        self.recovered_count = 0;
        self.is_patient_zero = false;
    }
}

/// Aggregated head counts across the whole registry.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statistics {
    pub total_population: u64,
    pub infected: u64,
    pub deceased: u64,
    pub recovered: u64,
    pub susceptible: u64,
}

// The slice of a GeoJSON FeatureCollection the simulation cares about. The
// dataset is produced by the project's data pipeline: `properties` carries
// name/state/population and `geometry.coordinates` is `[longitude, latitude]`.
#[derive(Deserialize)]
struct FeatureCollection {
    features: Vec<Feature>,
}

#[derive(Deserialize)]
struct Feature {
    properties: FeatureProperties,
    geometry: FeatureGeometry,
}

#[derive(Deserialize)]
struct FeatureProperties {
    name: String,
    state: String,
    population: u64,
}

#[derive(Deserialize)]
struct FeatureGeometry {
    coordinates: [f64; 2],
}

/// Owns the ordered collection of cities and answers nearest-neighbor and
/// aggregation queries over it. Neighbor queries are a brute-force scan,
/// which is fine at the dozens-to-low-hundreds scale of the dataset.
#[derive(Clone, Debug, Default)]
pub struct CityRegistry {
    cities: Vec<City>,
}

impl CityRegistry {
    #[must_use]
    pub fn new(cities: Vec<City>) -> CityRegistry {
        CityRegistry { cities }
    }

    /// Loads the registry from a GeoJSON file on disk.
    ///
    /// # Errors
    ///
    /// Returns [`OutbreakError::DataLoad`] if the file is unreachable or
    /// malformed.
    pub fn from_path(path: impl AsRef<Path>) -> Result<CityRegistry, OutbreakError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            OutbreakError::DataLoad(format!("cannot open city dataset {}: {e}", path.display()))
        })?;
        Self::from_reader(BufReader::new(file))
    }

    /// Loads the registry from any GeoJSON source, initializing every city's
    /// mutable epidemic fields to susceptible/zero.
    ///
    /// # Errors
    ///
    /// Returns [`OutbreakError::DataLoad`] if the source is malformed, empty,
    /// or contains a city with zero population.
    pub fn from_reader(reader: impl Read) -> Result<CityRegistry, OutbreakError> {
        let collection: FeatureCollection = serde_json::from_reader(reader)
            .map_err(|e| OutbreakError::DataLoad(format!("malformed city dataset: {e}")))?;

        if collection.features.is_empty() {
            return Err(OutbreakError::DataLoad(
                "city dataset contains no cities".to_string(),
            ));
        }

        let mut cities = Vec::with_capacity(collection.features.len());
        for feature in collection.features {
            let [longitude, latitude] = feature.geometry.coordinates;
            if feature.properties.population == 0 {
                return Err(OutbreakError::DataLoad(format!(
                    "city {} ({}) has zero population",
                    feature.properties.name, feature.properties.state
                )));
            }
            cities.push(City::new(
                feature.properties.name,
                feature.properties.state,
                feature.properties.population,
                latitude,
                longitude,
            ));
        }
        trace!("loaded {} cities", cities.len());
        Ok(CityRegistry::new(cities))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.cities.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cities.is_empty()
    }

    #[must_use]
    pub fn get(&self, city_id: CityId) -> &City {
        &self.cities[city_id.0]
    }

    pub fn get_mut(&mut self, city_id: CityId) -> &mut City {
        &mut self.cities[city_id.0]
    }

    pub fn iter(&self) -> impl Iterator<Item = (CityId, &City)> {
        self.cities
            .iter()
            .enumerate()
            .map(|(index, city)| (CityId(index), city))
    }

    /// Finds a city by name, case-insensitively. Returns the first match in
    /// dataset order when several regions share a name.
    #[must_use]
    pub fn by_name(&self, name: &str) -> Option<CityId> {
        self.cities
            .iter()
            .position(|city| city.name.eq_ignore_ascii_case(name))
            .map(CityId)
    }

    /// All cities within `max_distance_km` of `city_id`, paired with their
    /// distance and sorted ascending, excluding the source city itself.
    #[must_use]
    pub fn nearest_to(&self, city_id: CityId, max_distance_km: f64) -> Vec<(CityId, f64)> {
        let source = self.get(city_id);
        let mut nearby: Vec<(CityId, f64)> = self
            .iter()
            .filter(|(other_id, _)| *other_id != city_id)
            .filter_map(|(other_id, other)| {
                let distance = geo::distance_km(
                    source.latitude,
                    source.longitude,
                    other.latitude,
                    other.longitude,
                );
                (distance <= max_distance_km).then_some((other_id, distance))
            })
            .collect();
        nearby.sort_by(|a, b| a.1.total_cmp(&b.1));
        nearby
    }

    /// Sets every city back to the susceptible state, zeroing all counters
    /// and flags. Idempotent.
    pub fn reset_all(&mut self) {
        for city in &mut self.cities {
            city.reset();
        }
    }

    /// Resets all cities, then marks the named city infected with exactly one
    /// case on day 0. The full reset guarantees there is exactly one patient
    /// zero at a time.
    ///
    /// # Errors
    ///
    /// Returns [`OutbreakError::CityNotFound`] if no city matches `name`.
    pub fn set_patient_zero(&mut self, name: &str) -> Result<CityId, OutbreakError> {
        let city_id = self
            .by_name(name)
            .ok_or_else(|| OutbreakError::CityNotFound(name.to_string()))?;

        self.reset_all();

        let city = self.get_mut(city_id);
        city.status = HealthStatus::Infected;
        city.infection_day = Some(0);
        city.days_since_infection = 0;
        city.infected_count = 1;
        city.is_patient_zero = true;
        Ok(city_id)
    }

    #[must_use]
    pub fn total_population(&self) -> u64 {
        self.cities.iter().map(|city| city.population).sum()
    }

    /// Sums per-city counts. Susceptible is derived per-city and then summed,
    /// never derived from the aggregate totals.
    #[must_use]
    pub fn statistics(&self) -> Statistics {
        let mut stats = Statistics::default();
        for city in &self.cities {
            stats.total_population += city.population;
            stats.infected += city.infected_count;
            stats.deceased += city.deceased_count;
            stats.recovered += city.recovered_count;
            stats.susceptible += city.susceptible();
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DATASET: &str = r#"{
        "type": "FeatureCollection",
        "features": [
            {
                "type": "Feature",
                "properties": { "name": "New York", "state": "New York", "population": 8804190 },
                "geometry": { "type": "Point", "coordinates": [-74.006, 40.7128] }
            },
            {
                "type": "Feature",
                "properties": { "name": "Newark", "state": "New Jersey", "population": 311549 },
                "geometry": { "type": "Point", "coordinates": [-74.1724, 40.7357] }
            },
            {
                "type": "Feature",
                "properties": { "name": "Los Angeles", "state": "California", "population": 3898747 },
                "geometry": { "type": "Point", "coordinates": [-118.2437, 34.0522] }
            }
        ]
    }"#;

    fn registry() -> CityRegistry {
        CityRegistry::from_reader(DATASET.as_bytes()).unwrap()
    }

    #[test]
    fn load_initializes_epidemic_fields() {
        let registry = registry();
        assert_eq!(registry.len(), 3);
        for (_, city) in registry.iter() {
            assert_eq!(city.status, HealthStatus::Susceptible);
            assert_eq!(city.infected_count, 0);
            assert_eq!(city.infection_day, None);
            assert!(!city.is_patient_zero);
        }
    }

    #[test]
    fn load_rejects_malformed_json() {
        let result = CityRegistry::from_reader("{ not geojson".as_bytes());
        assert!(matches!(result, Err(OutbreakError::DataLoad(_))));
    }

    #[test]
    fn load_rejects_empty_dataset() {
        let result =
            CityRegistry::from_reader(r#"{"type":"FeatureCollection","features":[]}"#.as_bytes());
        assert!(matches!(result, Err(OutbreakError::DataLoad(_))));
    }

    #[test]
    fn load_rejects_zero_population() {
        let dataset = r#"{
            "type": "FeatureCollection",
            "features": [{
                "type": "Feature",
                "properties": { "name": "Ghost Town", "state": "Nevada", "population": 0 },
                "geometry": { "type": "Point", "coordinates": [-117.0, 38.0] }
            }]
        }"#;
        let result = CityRegistry::from_reader(dataset.as_bytes());
        assert!(matches!(result, Err(OutbreakError::DataLoad(_))));
    }

    #[test]
    fn missing_file_is_a_data_load_error() {
        let result = CityRegistry::from_path("/nonexistent/us-cities.json");
        assert!(matches!(result, Err(OutbreakError::DataLoad(_))));
    }

    #[test]
    fn by_name_is_case_insensitive() {
        let registry = registry();
        assert_eq!(registry.by_name("new york"), Some(CityId(0)));
        assert_eq!(registry.by_name("NEWARK"), Some(CityId(1)));
        assert_eq!(registry.by_name("Springfield"), None);
    }

    #[test]
    fn nearest_to_excludes_source_and_sorts_ascending() {
        let registry = registry();
        let new_york = registry.by_name("New York").unwrap();

        let nearby = registry.nearest_to(new_york, 300.0);
        assert_eq!(nearby.len(), 1);
        assert_eq!(nearby[0].0, registry.by_name("Newark").unwrap());
        assert!(nearby[0].1 < 20.0);

        let nationwide = registry.nearest_to(new_york, 10_000.0);
        assert_eq!(nationwide.len(), 2);
        assert!(nationwide[0].1 <= nationwide[1].1);
        assert!(!nationwide.iter().any(|(id, _)| *id == new_york));
    }

    #[test]
    fn set_patient_zero_infects_exactly_one_city() {
        let mut registry = registry();
        let city_id = registry.set_patient_zero("Newark").unwrap();

        let newark = registry.get(city_id);
        assert_eq!(newark.status, HealthStatus::Infected);
        assert_eq!(newark.infected_count, 1);
        assert_eq!(newark.infection_day, Some(0));
        assert_eq!(newark.days_since_infection, 0);
        assert!(newark.is_patient_zero);

        for (other_id, city) in registry.iter() {
            if other_id != city_id {
                assert_eq!(city.status, HealthStatus::Susceptible);
                assert_eq!(city.infected_count, 0);
                assert!(!city.is_patient_zero);
            }
        }
    }

    #[test]
    fn set_patient_zero_moves_the_flag() {
        let mut registry = registry();
        let first = registry.set_patient_zero("Newark").unwrap();
        let second = registry.set_patient_zero("Los Angeles").unwrap();

        assert!(!registry.get(first).is_patient_zero);
        assert_eq!(registry.get(first).status, HealthStatus::Susceptible);
        assert!(registry.get(second).is_patient_zero);
    }

    #[test]
    fn set_patient_zero_unknown_city() {
        let mut registry = registry();
        let result = registry.set_patient_zero("Atlantis");
        assert!(matches!(result, Err(OutbreakError::CityNotFound(_))));
    }

    #[test]
    fn reset_all_is_idempotent() {
        let mut registry = registry();
        registry.set_patient_zero("New York").unwrap();
        registry.get_mut(CityId(1)).infected_count = 500;
        registry.get_mut(CityId(1)).status = HealthStatus::Infected;

        registry.reset_all();
        let once = registry.clone();
        registry.reset_all();

        for ((_, a), (_, b)) in once.iter().zip(registry.iter()) {
            assert_eq!(a.status, b.status);
            assert_eq!(a.infected_count, b.infected_count);
            assert_eq!(a.status, HealthStatus::Susceptible);
        }
        assert_eq!(registry.statistics().infected, 0);
    }

    #[test]
    fn statistics_sums_and_derives_susceptible_per_city() {
        let mut registry = registry();
        {
            let newark = registry.get_mut(CityId(1));
            newark.status = HealthStatus::Infected;
            newark.infected_count = 100;
            newark.deceased_count = 10;
            newark.recovered_count = 40;
        }

        let stats = registry.statistics();
        assert_eq!(stats.total_population, 8_804_190 + 311_549 + 3_898_747);
        assert_eq!(stats.infected, 100);
        assert_eq!(stats.deceased, 10);
        assert_eq!(stats.recovered, 40);
        assert_eq!(stats.susceptible, stats.total_population - 150);
    }

    #[test]
    fn susceptible_clamps_at_zero() {
        let mut city = City::new("Tiny", "Texas", 10, 30.0, -97.0);
        city.infected_count = 8;
        city.recovered_count = 5;
        assert_eq!(city.susceptible(), 0);
    }
}

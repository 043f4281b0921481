//! Static garage catalog.
//!
//! The registry fixes every garage's identity, location and capacity for the
//! lifetime of a run. It is built once at startup (from the built-in campus
//! seed or a JSON seed file) and shared read-only afterwards.

use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

use crate::error::RegistryError;
use crate::model::Garage;

/// Capacity assumed when a seed entry does not name one.
pub const DEFAULT_CAPACITY: u32 = 100;

fn default_capacity() -> u32 {
    DEFAULT_CAPACITY
}

fn default_open() -> bool {
    true
}

/// One catalog entry as it appears in a seed file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct GarageSeed {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default = "default_capacity")]
    pub capacity: u32,
    #[serde(default)]
    pub current_count: u32,
    #[serde(default = "default_open")]
    pub is_open: bool,
}

impl GarageSeed {
    pub fn new(name: impl Into<String>, latitude: f64, longitude: f64, capacity: u32) -> Self {
        Self {
            name: name.into(),
            latitude,
            longitude,
            capacity,
            current_count: 0,
            is_open: true,
        }
    }

    /// Initial garage value for the store.
    pub fn to_garage(&self) -> Garage {
        Garage {
            name: self.name.clone(),
            latitude: self.latitude,
            longitude: self.longitude,
            current_count: self.current_count,
            capacity: self.capacity,
            is_open: self.is_open,
            revision: 0,
        }
    }

    fn validate(&self) -> Result<(), RegistryError> {
        if self.name.trim().is_empty() {
            return Err(RegistryError::EmptyName);
        }
        let lat_ok = self.latitude.is_finite() && (-90.0..=90.0).contains(&self.latitude);
        let lon_ok = self.longitude.is_finite() && (-180.0..=180.0).contains(&self.longitude);
        if !lat_ok || !lon_ok {
            return Err(RegistryError::InvalidLocation {
                name: self.name.clone(),
                latitude: self.latitude,
                longitude: self.longitude,
            });
        }
        if self.current_count > self.capacity {
            return Err(RegistryError::OverCapacity {
                name: self.name.clone(),
                count: self.current_count,
                capacity: self.capacity,
            });
        }
        Ok(())
    }
}

/// Validated, ordered, immutable garage catalog.
#[derive(Debug, Clone)]
pub struct GarageRegistry {
    seeds: Vec<GarageSeed>,
    index: HashMap<String, usize>,
}

impl GarageRegistry {
    /// Build a registry, rejecting duplicates and seeds that break the invariant.
    pub fn new(seeds: Vec<GarageSeed>) -> Result<Self, RegistryError> {
        let mut index = HashMap::with_capacity(seeds.len());
        for (i, seed) in seeds.iter().enumerate() {
            seed.validate()?;
            if index.insert(seed.name.clone(), i).is_some() {
                return Err(RegistryError::DuplicateName(seed.name.clone()));
            }
        }
        Ok(Self { seeds, index })
    }

    /// The three University of Florida garages the app ships with.
    pub fn campus_default() -> Self {
        let seeds = vec![
            GarageSeed::new("Rawlings", 29.645255, -82.342954, 12),
            GarageSeed::new("Reitz Garage", 29.645568, -82.348437, 12),
            GarageSeed::new("McCarty", 29.645974, -82.344066, 12),
        ];
        let index = seeds
            .iter()
            .enumerate()
            .map(|(i, s)| (s.name.clone(), i))
            .collect();
        Self { seeds, index }
    }

    /// Parse a JSON array of seed entries.
    pub fn from_json_str(json: &str) -> Result<Self, RegistryError> {
        let seeds: Vec<GarageSeed> = serde_json::from_str(json)?;
        Self::new(seeds)
    }

    /// Load a JSON seed file from disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, RegistryError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| RegistryError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let registry = Self::from_json_str(&json)?;
        log::info!(
            "Loaded {} garages from seed file {}",
            registry.len(),
            path.display()
        );
        Ok(registry)
    }

    pub fn get(&self, name: &str) -> Option<&GarageSeed> {
        self.index.get(name).map(|&i| &self.seeds[i])
    }

    /// Garage names in catalog order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.seeds.iter().map(|s| s.name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &GarageSeed> {
        self.seeds.iter()
    }

    pub fn len(&self) -> usize {
        self.seeds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seeds.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_campus_default() {
        let registry = GarageRegistry::campus_default();
        assert_eq!(registry.len(), 3);
        let names: Vec<&str> = registry.names().collect();
        assert_eq!(names, vec!["Rawlings", "Reitz Garage", "McCarty"]);
        let reitz = registry.get("Reitz Garage").unwrap();
        assert_eq!(reitz.capacity, 12);
        assert_eq!(reitz.current_count, 0);
    }

    #[test]
    fn test_duplicate_rejected() {
        let seeds = vec![
            GarageSeed::new("A", 0.0, 0.0, 1),
            GarageSeed::new("A", 1.0, 1.0, 2),
        ];
        assert!(matches!(
            GarageRegistry::new(seeds),
            Err(RegistryError::DuplicateName(name)) if name == "A"
        ));
    }

    #[test]
    fn test_over_capacity_seed_rejected() {
        let mut seed = GarageSeed::new("A", 0.0, 0.0, 2);
        seed.current_count = 3;
        assert!(matches!(
            GarageRegistry::new(vec![seed]),
            Err(RegistryError::OverCapacity { count: 3, capacity: 2, .. })
        ));
    }

    #[test]
    fn test_invalid_location_rejected() {
        let seed = GarageSeed::new("A", 91.0, 0.0, 2);
        assert!(matches!(
            GarageRegistry::new(vec![seed]),
            Err(RegistryError::InvalidLocation { .. })
        ));
    }

    #[test]
    fn test_json_defaults() {
        let registry = GarageRegistry::from_json_str(
            r#"[{"name":"Garage A","latitude":29.649,"longitude":-82.341}]"#,
        )
        .unwrap();
        let seed = registry.get("Garage A").unwrap();
        assert_eq!(seed.capacity, DEFAULT_CAPACITY);
        assert_eq!(seed.current_count, 0);
        assert!(seed.is_open);
    }

    #[test]
    fn test_json_unknown_field_rejected() {
        let res = GarageRegistry::from_json_str(
            r#"[{"name":"A","latitude":0,"longitude":0,"busy":true}]"#,
        );
        assert!(matches!(res, Err(RegistryError::Parse(_))));
    }
}

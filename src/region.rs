//! Region-of-interest configuration.
//!
//! A region is the static description of one ARTCC: the airports whose traffic we care about,
//! the callsign prefixes of its control positions, the neighboring centers, and the boundary
//! polygon used for aircraft that are not departing or arriving locally. It is loaded once at
//! startup (built-in default or a TOML file) and shared read-only afterwards.

use anyhow::{Context, Result, bail};
use geo::{LineString, Polygon};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Region configuration (TOML file layer)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegionConfig {
    /// Facility identifier, used as the region tag on stored PIREPs
    pub name: String,
    /// ICAO codes of the airports inside the region
    pub airports: Vec<String>,
    /// First three characters of the region's control position callsigns
    pub controller_prefixes: Vec<String>,
    /// Callsigns that match a prefix but are not region positions
    #[serde(default)]
    pub excluded_callsigns: Vec<String>,
    /// Facility identifiers of the adjacent centers
    #[serde(default)]
    pub neighbor_centers: Vec<String>,
    /// Boundary vertices as `[latitude, longitude]` pairs
    pub boundary: Vec<[f64; 2]>,
}

impl Default for RegionConfig {
    /// Albuquerque Center (ZAB)
    fn default() -> Self {
        let airports = [
            "KPHX", "KABQ", "KTUS", "KAMA", "KROW", "KELP", "KSDL", "KCHD", "KFFZ", "KIWA", "KDVT",
            "KGEU", "KGYR", "KLUF", "KRYN", "KDMA", "KFLG", "KPRC", "KAEG", "KBIF", "KHMN", "KSAF",
            "KFHU",
        ];
        let neighbors = ["LAX", "DEN", "KC", "FTW", "HOU", "MMTY", "MMTZ"];

        Self {
            name: "ZAB".to_string(),
            controller_prefixes: airports.iter().map(|a| a[1..].to_string()).collect(),
            airports: airports.iter().map(|a| a.to_string()).collect(),
            excluded_callsigns: vec!["PRC_FSS".to_string()],
            neighbor_centers: neighbors.iter().map(|n| n.to_string()).collect(),
            boundary: vec![
                [37.00, -114.00],
                [37.30, -109.00],
                [37.00, -104.00],
                [36.50, -100.50],
                [34.00, -100.50],
                [32.00, -103.00],
                [31.00, -104.50],
                [31.30, -108.20],
                [31.33, -111.00],
                [32.50, -114.80],
                [34.30, -114.50],
                [37.00, -114.00],
            ],
        }
    }
}

impl RegionConfig {
    /// Load region config from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let contents =
            std::fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?;
        let config: RegionConfig =
            toml::from_str(&contents).with_context(|| format!("Failed to parse {:?}", path))?;
        Ok(config)
    }

    /// Validate the config
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            bail!("Region name is required");
        }
        if self.airports.is_empty() {
            bail!("At least one airport is required");
        }
        if let Some(airport) = self.airports.iter().find(|a| a.len() != 4) {
            bail!("Airport code {:?} must be 4 characters", airport);
        }
        if let Some(prefix) = self.controller_prefixes.iter().find(|p| p.len() != 3) {
            bail!("Controller prefix {:?} must be 3 characters", prefix);
        }

        let distinct: HashSet<(u64, u64)> = self
            .boundary
            .iter()
            .map(|[lat, lon]| (lat.to_bits(), lon.to_bits()))
            .collect();
        if distinct.len() < 3 {
            bail!("Boundary needs at least 3 distinct vertices");
        }
        for (i, [lat, lon]) in self.boundary.iter().enumerate() {
            if !(-90.0..=90.0).contains(lat) {
                bail!("Boundary vertex {}: latitude must be between -90 and 90", i + 1);
            }
            if !(-180.0..=180.0).contains(lon) {
                bail!("Boundary vertex {}: longitude must be between -180 and 180", i + 1);
            }
        }
        Ok(())
    }
}

/// Immutable region data used by the geofence classifier
#[derive(Debug, Clone)]
pub struct Region {
    name: String,
    airports: Vec<String>,
    airport_set: HashSet<String>,
    controller_prefixes: HashSet<String>,
    excluded_callsigns: HashSet<String>,
    neighbor_centers: HashSet<String>,
    boundary: Polygon<f64>,
}

impl Region {
    /// Build a region from validated config
    pub fn from_config(config: RegionConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: RegionConfig) -> Self {
        // geo works in (x, y) = (longitude, latitude)
        let ring: LineString<f64> = config
            .boundary
            .iter()
            .map(|[lat, lon]| (*lon, *lat))
            .collect::<Vec<_>>()
            .into();

        Self {
            airport_set: config.airports.iter().cloned().collect(),
            airports: config.airports,
            controller_prefixes: config.controller_prefixes.into_iter().collect(),
            excluded_callsigns: config.excluded_callsigns.into_iter().collect(),
            neighbor_centers: config.neighbor_centers.into_iter().collect(),
            boundary: Polygon::new(ring, vec![]),
            name: config.name,
        }
    }

    /// Load the region from `path`, or fall back to the built-in default
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => RegionConfig::load(path)?,
            None => RegionConfig::default(),
        };
        Self::from_config(config)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whitelisted airports in configuration order
    pub fn airports(&self) -> &[String] {
        &self.airports
    }

    pub fn has_airport(&self, icao: &str) -> bool {
        self.airport_set.contains(icao)
    }

    pub fn has_controller_prefix(&self, prefix: &str) -> bool {
        self.controller_prefixes.contains(prefix)
    }

    pub fn is_excluded_callsign(&self, callsign: &str) -> bool {
        self.excluded_callsigns.contains(callsign)
    }

    pub fn has_neighbor_center(&self, facility: &str) -> bool {
        self.neighbor_centers.contains(facility)
    }

    pub fn boundary(&self) -> &Polygon<f64> {
        &self.boundary
    }
}

impl Default for Region {
    fn default() -> Self {
        Self::build(RegionConfig::default())
    }
}

/// Resolve the region file path.
///
/// Priority:
/// 1. explicit path (CLI flag / `REGION_FILE`)
/// 2. `./region.toml` if present
/// 3. none (built-in default)
pub fn region_file_path(explicit: Option<PathBuf>) -> Option<PathBuf> {
    if explicit.is_some() {
        return explicit;
    }
    let local = PathBuf::from("./region.toml");
    local.exists().then_some(local)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_region_is_valid() {
        let config = RegionConfig::default();
        config.validate().unwrap();

        let region = Region::from_config(config).unwrap();
        assert_eq!(region.name(), "ZAB");
        assert!(region.has_airport("KPHX"));
        assert!(region.has_controller_prefix("PHX"));
        assert!(region.is_excluded_callsign("PRC_FSS"));
        assert!(region.has_neighbor_center("LAX"));
        assert_eq!(region.airports().len(), 23);
    }

    #[test]
    fn test_region_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("region.toml");
        std::fs::write(
            &path,
            r#"
name = "TST"
airports = ["KAAA", "KBBB"]
controller_prefixes = ["AAA"]
neighbor_centers = ["XYZ"]
boundary = [[0.0, 0.0], [0.0, 10.0], [10.0, 10.0], [10.0, 0.0], [0.0, 0.0]]
"#,
        )
        .unwrap();

        let region = Region::load(Some(&path)).unwrap();
        assert_eq!(region.name(), "TST");
        assert_eq!(region.airports(), &["KAAA".to_string(), "KBBB".to_string()]);
        assert!(!region.is_excluded_callsign("PRC_FSS"));
    }

    #[test]
    fn test_validate_rejects_degenerate_boundary() {
        let config = RegionConfig {
            boundary: vec![[1.0, 1.0], [2.0, 2.0], [1.0, 1.0]],
            ..RegionConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_airport_code() {
        let mut config = RegionConfig::default();
        config.airports.push("PHX".to_string());
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("PHX"));
    }

    #[test]
    fn test_validate_rejects_out_of_range_vertex() {
        let mut config = RegionConfig::default();
        config.boundary[2] = [95.0, -104.0];
        assert!(config.validate().is_err());
    }
}

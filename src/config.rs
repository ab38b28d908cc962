use std::error::Error;
use std::fmt;
use std::path::Path;
use std::path::PathBuf;

use yaml_rust::Yaml;
use yaml_rust::YamlLoader;

use super::config_utils;
use super::geometry::Point2d;
use super::pipeline::PipelineOrchestrator;
use super::reprojection::CoordinateTransform;
use super::reprojection::IdentityTransform;
use super::reprojection::LocalTangentPlane;
use super::zones::SyntheticGrid;

const DEFAULT_MASTER_SEED: u64 = 42;
const DEFAULT_SCALING_TOLERANCE: f64 = 0.05;


#[derive(PartialEq, Debug, Clone)]
pub struct ConfigError {
    pub key: String,
    pub reason: String,
}

impl ConfigError {
    fn new(key: &str, reason: &str) -> ConfigError {
        ConfigError {
            key: String::from(key),
            reason: String::from(reason),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "config key {}: {}", self.key, self.reason)
    }
}

impl Error for ConfigError {}

/// How raw real-time coordinates are brought into the projected frame.
#[derive(PartialEq, Debug, Clone)]
pub enum ReprojectionConfig {
    Identity,
    LocalTangentPlane(LocalTangentPlane),
}

impl ReprojectionConfig {
    pub fn transform(&self) -> Box<dyn CoordinateTransform> {
        match self {
            ReprojectionConfig::Identity => Box::new(IdentityTransform),
            ReprojectionConfig::LocalTangentPlane(ltp) => Box::new(ltp.clone()),
        }
    }

    fn from_yaml(yaml_cfg: &Yaml) -> Result<ReprojectionConfig, ConfigError> {
        if yaml_cfg.is_badvalue() {
            return Ok(ReprojectionConfig::Identity);
        }
        match yaml_cfg["kind"].as_str() {
            None | Some("identity") => Ok(ReprojectionConfig::Identity),
            Some("local_tangent_plane") => {
                let ltp = LocalTangentPlane::new(
                    required_f64(yaml_cfg, "origin_lon", "reprojection.origin_lon")?,
                    required_f64(yaml_cfg, "origin_lat", "reprojection.origin_lat")?,
                    optional_f64(yaml_cfg, "false_easting", "reprojection.false_easting")?
                        .unwrap_or(0.),
                    optional_f64(yaml_cfg, "false_northing", "reprojection.false_northing")?
                        .unwrap_or(0.),
                );
                Ok(ReprojectionConfig::LocalTangentPlane(ltp))
            }
            Some(other) => Err(ConfigError::new("reprojection.kind",
                                                &format!("unknown kind {:?}", other))),
        }
    }
}

/// Everything a generation run reads from its YAML file. Relative paths are resolved against
/// the directory holding the file.
#[derive(PartialEq, Debug, Clone)]
pub struct GeneratorConfig {
    pub rules_dir: PathBuf,
    pub real_time_dir: PathBuf,
    pub output_dir: PathBuf,
    pub base_population_path: Option<PathBuf>,
    pub report_path: Option<PathBuf>,
    pub master_seed: u64,
    pub parallel: bool,
    pub scaling_tolerance: f64,
    pub patterns: Option<Vec<String>>,
    pub synthetic_grid: SyntheticGrid,
    pub reprojection: ReprojectionConfig,
    pub zone_radius_m: Option<f64>,
}

impl GeneratorConfig {
    pub fn from_file(config_path: &Path) -> Result<GeneratorConfig, Box<dyn Error>> {
        let contents = std::fs::read_to_string(config_path)
            .map_err(|err| format!("could not read config {}: {}", config_path.display(), err))?;
        let base_dir = config_path.parent().unwrap_or_else(|| Path::new("."));
        let cfg = GeneratorConfig::from_yaml_str(&contents, base_dir)?;
        log::info!("loaded config from {}", config_path.display());
        Ok(cfg)
    }

    pub fn from_yaml_str(contents: &str, base_dir: &Path)
                         -> Result<GeneratorConfig, Box<dyn Error>> {
        let docs = YamlLoader::load_from_str(contents)?;
        let yaml_cfg = docs.get(0).ok_or_else(|| ConfigError::new("<root>", "empty document"))?;
        Ok(GeneratorConfig::from_yaml(yaml_cfg, base_dir)?)
    }

    fn from_yaml(yaml_cfg: &Yaml, base_dir: &Path) -> Result<GeneratorConfig, ConfigError> {
        let path = |key: &str| -> Result<Option<PathBuf>, ConfigError> {
            match &yaml_cfg[key] {
                Yaml::BadValue | Yaml::Null => Ok(None),
                Yaml::String(ss) => Ok(Some(config_utils::str_to_absolute_path(ss, base_dir))),
                _ => Err(ConfigError::new(key, "expected a path string")),
            }
        };
        let required_path = |key: &str| -> Result<PathBuf, ConfigError> {
            path(key)?.ok_or_else(|| ConfigError::new(key, "missing"))
        };

        let master_seed = match &yaml_cfg["master_seed"] {
            Yaml::BadValue => DEFAULT_MASTER_SEED,
            Yaml::Integer(seed) if *seed >= 0 => *seed as u64,
            _ => return Err(ConfigError::new("master_seed", "expected a non-negative integer")),
        };
        let parallel = match &yaml_cfg["parallel"] {
            Yaml::BadValue => true,
            Yaml::Boolean(flag) => *flag,
            _ => return Err(ConfigError::new("parallel", "expected true or false")),
        };
        let scaling_tolerance = optional_f64(yaml_cfg, "scaling_tolerance", "scaling_tolerance")?
            .unwrap_or(DEFAULT_SCALING_TOLERANCE);

        let patterns = match &yaml_cfg["patterns"] {
            Yaml::BadValue | Yaml::Null => None,
            Yaml::Array(items) => {
                let names: Option<Vec<String>> = items.iter()
                    .map(|item| item.as_str().map(String::from))
                    .collect();
                Some(names.ok_or_else(|| ConfigError::new("patterns", "expected strings"))?)
            }
            _ => return Err(ConfigError::new("patterns", "expected a list of pattern ids")),
        };

        let grid_cfg = &yaml_cfg["synthetic_grid"];
        let default_grid = SyntheticGrid::default();
        let synthetic_grid = if grid_cfg.is_badvalue() {
            default_grid
        } else {
            let columns = match &grid_cfg["columns"] {
                Yaml::BadValue => default_grid.columns,
                Yaml::Integer(cols) if *cols > 0 => *cols as u32,
                _ => return Err(ConfigError::new("synthetic_grid.columns",
                                                 "expected a positive integer")),
            };
            SyntheticGrid {
                center: Point2d::new(
                    optional_f64(grid_cfg, "center_x", "synthetic_grid.center_x")?
                        .unwrap_or(default_grid.center.x_coord),
                    optional_f64(grid_cfg, "center_y", "synthetic_grid.center_y")?
                        .unwrap_or(default_grid.center.y_coord)),
                spacing_m: optional_f64(grid_cfg, "spacing_m", "synthetic_grid.spacing_m")?
                    .unwrap_or(default_grid.spacing_m),
                columns,
            }
        };

        Ok(GeneratorConfig {
            rules_dir: required_path("rules_dir")?,
            real_time_dir: required_path("real_time_dir")?,
            output_dir: required_path("output_dir")?,
            base_population_path: path("base_population_path")?,
            report_path: path("report_path")?,
            master_seed,
            parallel,
            scaling_tolerance,
            patterns,
            synthetic_grid,
            reprojection: ReprojectionConfig::from_yaml(&yaml_cfg["reprojection"])?,
            zone_radius_m: optional_f64(yaml_cfg, "zone_radius_m", "zone_radius_m")?,
        })
    }

    /// An orchestrator with default stage settings, overridden by this config.
    pub fn orchestrator(&self) -> PipelineOrchestrator {
        let mut orchestrator = PipelineOrchestrator::default();
        orchestrator.grid = self.synthetic_grid.clone();
        orchestrator.scaling_tolerance = self.scaling_tolerance;
        orchestrator.parallel = self.parallel;
        if let Some(radius) = self.zone_radius_m {
            orchestrator.reallocator.zone_radius_m = radius;
        }
        orchestrator
    }
}

/// yaml-rust keeps integers and reals apart; either is accepted as a number.
fn optional_f64(yaml_cfg: &Yaml, key: &str, full_key: &str) -> Result<Option<f64>, ConfigError> {
    match &yaml_cfg[key] {
        Yaml::BadValue => Ok(None),
        Yaml::Integer(ii) => Ok(Some(*ii as f64)),
        Yaml::Real(_) => Ok(yaml_cfg[key].as_f64()),
        _ => Err(ConfigError::new(full_key, "expected a number")),
    }
}

fn required_f64(yaml_cfg: &Yaml, key: &str, full_key: &str) -> Result<f64, ConfigError> {
    optional_f64(yaml_cfg, key, full_key)?
        .ok_or_else(|| ConfigError::new(full_key, "missing"))
}

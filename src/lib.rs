// standard library imports
use std::error::Error;

// imports of other modules from this crate
mod geometry;
pub use geometry::Point2d;

mod trip_chain;
pub use trip_chain::{Activity, ActivityType, ChainError, Leg, PlanElement, Population,
                     TripChainRecord};

mod sampling;
pub use sampling::{seeded_rng, SynthRng};

mod rules;
pub use rules::{PatternId, PatternIdError, PerturbationFamily, UncertaintyRule};

mod scenario;
pub use scenario::{ClusterTiming, Concentration, PeakShaping, ScenarioKind};

mod reprojection;
pub use reprojection::{CoordinateTransform, IdentityTransform, LocalTangentPlane};

mod demand;
pub use demand::{parse_od_table, parse_real_time_trips, DemandPattern, RealTimeTrip,
                 RulesDataSet, ZoneId};

mod zones;
pub use zones::{SyntheticGrid, ZoneRegistry, ZoneRole};

mod fitness;
pub use fitness::{hourly_departure_histogram, normalized_rmse_fitness};

mod scaling;
pub use scaling::{validate_scaled_population, PopulationScaler, ScalingMethod, ScalingResult,
                  ScalingSummary, ScalingValidation};

mod temporal;
pub use temporal::{TemporalAdjustmentResult, TemporalPatternAdjuster, TemporalSummary};

mod spatial;
pub use spatial::{SpatialReallocationResult, SpatialReallocator, SpatialSummary};

mod perturbation;
pub use perturbation::{PerturbationResult, PerturbationSummary, UncertaintyPerturbator};

mod pipeline;
pub use pipeline::{pattern_seed, BatchSummary, GenerationResult, PipelineOrchestrator,
                   StageSeeds};

mod population_io;
pub use population_io::{parse_population_xml, population_from_xml_path, write_population_xml,
                        write_report, write_report_csv, WriteOutcome, XmlPopulationWriter};

mod analysis;
pub use analysis::{zone_distribution_by_type, PopulationStatistics};

mod synthesis;
pub use synthesis::{default_base_population, population_from_pattern,
                    population_from_real_time};

mod config;
pub use config::{ConfigError, GeneratorConfig, ReprojectionConfig};

mod config_utils;

#[cfg(test)]
mod test_utils;


/// Receives the final population of each pattern. Called from batch worker threads.
pub trait PopulationWriter: Sync {
    fn write(&self, population: &[TripChainRecord], pattern: &DemandPattern)
             -> Result<WriteOutcome, Box<dyn Error>>;
}

use std::error::Error;
use std::time::Instant;

use rayon::prelude::*;

use super::demand::DemandPattern;
use super::demand::RealTimeTrip;
use super::demand::RulesDataSet;
use super::perturbation::PerturbationSummary;
use super::perturbation::UncertaintyPerturbator;
use super::population_io::WriteOutcome;
use super::rules::PatternId;
use super::sampling::seeded_rng;
use super::scaling::validate_scaled_population;
use super::scaling::PopulationScaler;
use super::scaling::ScalingSummary;
use super::scaling::ScalingValidation;
use super::spatial::SpatialReallocator;
use super::spatial::SpatialSummary;
use super::temporal::TemporalPatternAdjuster;
use super::temporal::TemporalSummary;
use super::trip_chain::Population;
use super::trip_chain::TripChainRecord;
use super::zones::SyntheticGrid;
use super::zones::ZoneRegistry;
use super::PopulationWriter;


/// One generator seed per stage, all derived from a pattern's master seed.
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub struct StageSeeds {
    pub scaling: u64,
    pub temporal: u64,
    pub spatial: u64,
    pub perturbation: u64,
}

impl StageSeeds {
    pub fn from_master(master_seed: u64) -> StageSeeds {
        StageSeeds {
            scaling: master_seed,
            temporal: master_seed.wrapping_add(1),
            spatial: master_seed.wrapping_add(2),
            perturbation: master_seed.wrapping_add(3),
        }
    }
}

/// Master seed for one pattern of a batch. Depends only on the batch seed, the rule's seed and
/// the scenario name, so a pattern gets the same seed however the batch is ordered or split.
pub fn pattern_seed(batch_seed: u64, pattern_id: &PatternId) -> u64 {
    // 64-bit FNV-1a
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    let bytes = batch_seed.to_le_bytes().iter()
        .chain(pattern_id.rule.seed().to_le_bytes().iter())
        .chain(pattern_id.scenario.as_bytes().iter())
        .cloned()
        .collect::<Vec<u8>>();
    for byte in bytes {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(0x0100_0000_01b3);
    }
    hash
}

/// Everything kept from one pattern's run. Intermediate populations are not kept.
#[derive(Debug, Clone)]
pub struct GenerationResult {
    pub pattern_id: PatternId,
    pub master_seed: u64,
    pub scaling: ScalingSummary,
    pub scaling_validation: ScalingValidation,
    pub temporal: TemporalSummary,
    pub spatial: SpatialSummary,
    pub perturbation: PerturbationSummary,
    pub num_synthetic_zones: usize,
    pub population: Population,
    pub output: WriteOutcome,
    pub elapsed_ms: u64,
}

#[derive(Debug)]
pub struct BatchSummary {
    pub results: Vec<GenerationResult>,
    // (pattern id, error message)
    pub failures: Vec<(String, String)>,
}

impl BatchSummary {
    pub fn num_succeeded(&self) -> usize {
        self.results.len()
    }

    pub fn num_failed(&self) -> usize {
        self.failures.len()
    }
}

/// Runs the four stages for one pattern or a whole batch of patterns.
#[derive(PartialEq, Debug, Clone)]
pub struct PipelineOrchestrator {
    pub scaler: PopulationScaler,
    pub adjuster: TemporalPatternAdjuster,
    pub reallocator: SpatialReallocator,
    pub perturbator: UncertaintyPerturbator,
    pub grid: SyntheticGrid,
    pub scaling_tolerance: f64,
    pub parallel: bool,
}

impl Default for PipelineOrchestrator {
    fn default() -> PipelineOrchestrator {
        PipelineOrchestrator {
            scaler: PopulationScaler::default(),
            adjuster: TemporalPatternAdjuster::new(),
            reallocator: SpatialReallocator::default(),
            perturbator: UncertaintyPerturbator::default(),
            grid: SyntheticGrid::default(),
            scaling_tolerance: 0.05,
            parallel: true,
        }
    }
}

impl PipelineOrchestrator {
    /// Scale, adjust, reallocate and perturb `base` for one pattern, then write the result.
    pub fn generate(&self, base: &[TripChainRecord], pattern: &DemandPattern,
                    real_time_trips: &[RealTimeTrip], writer: &dyn PopulationWriter,
                    master_seed: u64) -> Result<GenerationResult, Box<dyn Error>> {
        if base.is_empty() {
            return Err(format!("{}: base population is empty", pattern.id).into());
        }
        let start = Instant::now();
        let seeds = StageSeeds::from_master(master_seed);
        log::info!("generating {} from {} base travelers (seed {})", pattern.id, base.len(),
                   master_seed);

        let zones = ZoneRegistry::for_pattern(pattern, real_time_trips, &self.grid);
        if zones.num_synthetic() > 0 {
            log::debug!("{}: {} zones have no observed coordinates", pattern.id,
                        zones.num_synthetic());
        }

        let scaled = self.scaler.scale(base, pattern.id.multiplier(), &pattern.id.scenario,
                                       pattern.id.rule_number(),
                                       &mut seeded_rng(seeds.scaling));
        let scaling_validation = validate_scaled_population(base, &scaled.population,
                                                            self.scaling_tolerance);
        if !scaling_validation.passed {
            log::warn!("{}: scaled activity mix deviates from the base: {:?}", pattern.id,
                       scaling_validation.deviations);
        }

        let adjusted = self.adjuster.adjust(&scaled.population, pattern, real_time_trips,
                                            &mut seeded_rng(seeds.temporal));
        drop(scaled.population);

        let reallocated = self.reallocator.reallocate(&adjusted.population, pattern, &zones,
                                                      &mut seeded_rng(seeds.spatial));
        drop(adjusted.population);

        let perturbed = self.perturbator.perturb(&reallocated.population, pattern,
                                                 &mut seeded_rng(seeds.perturbation));
        drop(reallocated.population);

        let output = writer.write(&perturbed.population, pattern)?;
        let elapsed_ms = start.elapsed().as_millis() as u64;
        log::info!("{}: {} travelers, temporal fitness {:.3}, spatial fitness {:.3}, \
                    intensity {:.3}, {} ms", pattern.id, perturbed.population.len(),
                   adjusted.summary.temporal_fitness, reallocated.summary.spatial_fitness,
                   perturbed.summary.intensity, elapsed_ms);

        Ok(GenerationResult {
            pattern_id: pattern.id.clone(),
            master_seed,
            scaling: scaled.summary,
            scaling_validation,
            temporal: adjusted.summary,
            spatial: reallocated.summary,
            perturbation: perturbed.summary,
            num_synthetic_zones: zones.num_synthetic(),
            population: perturbed.population,
            output,
            elapsed_ms,
        })
    }

    /// Run every pattern in `dataset`, or only those named in `filter` (by pattern id or by
    /// scenario name). A failing pattern is logged and recorded; the others still run.
    pub fn run_batch(&self, base: &[TripChainRecord], dataset: &RulesDataSet,
                     writer: &dyn PopulationWriter, batch_seed: u64,
                     filter: Option<&[String]>) -> BatchSummary {
        let selected: Vec<&DemandPattern> = dataset.patterns()
            .filter(|pattern| match filter {
                Some(names) => {
                    let id = pattern.id.to_string();
                    names.iter().any(|nn| *nn == id || *nn == pattern.id.scenario)
                }
                None => true,
            })
            .collect();
        log::info!("running {} of {} patterns", selected.len(), dataset.num_patterns());

        let run_one = |pattern: &&DemandPattern| {
            let trips = dataset.real_time_trips(&pattern.id.scenario);
            let seed = pattern_seed(batch_seed, &pattern.id);
            let outcome = self.generate(base, pattern, trips, writer, seed)
                .map_err(|err| err.to_string());
            (pattern.id.to_string(), outcome)
        };
        let outcomes: Vec<(String, Result<GenerationResult, String>)> = if self.parallel {
            selected.par_iter().map(run_one).collect()
        } else {
            selected.iter().map(run_one).collect()
        };

        let mut results = vec![];
        let mut failures = vec![];
        for (id, outcome) in outcomes {
            match outcome {
                Ok(result) => results.push(result),
                Err(err) => {
                    log::error!("pattern {} failed: {}", id, err);
                    failures.push((id, err));
                }
            }
        }
        log::info!("batch finished: {} succeeded, {} failed", results.len(), failures.len());
        BatchSummary {
            results,
            failures,
        }
    }
}

use std::error::Error;
use std::path::PathBuf;
use std::process;

use env_logger;
use structopt::StructOpt;

use demand_uncertainty_synth::default_base_population;
use demand_uncertainty_synth::population_from_xml_path;
use demand_uncertainty_synth::write_report;
use demand_uncertainty_synth::GeneratorConfig;
use demand_uncertainty_synth::PopulationStatistics;
use demand_uncertainty_synth::RulesDataSet;
use demand_uncertainty_synth::XmlPopulationWriter;


#[derive(StructOpt, Debug)]
#[structopt(name = "demand-synth")]
struct Flags {
    /// YAML run configuration
    #[structopt(long = "config", parse(from_os_str))]
    pub config: PathBuf,

    /// Overrides the configured master seed
    #[structopt(long = "seed")]
    pub seed: Option<u64>,

    /// Only generate these patterns (pattern id or scenario name); may be repeated
    #[structopt(long = "pattern")]
    pub patterns: Vec<String>,

    /// Run patterns one after another instead of in parallel
    #[structopt(long = "sequential")]
    pub sequential: bool,
}

fn run(flags: &Flags) -> Result<usize, Box<dyn Error>> {
    let mut cfg = GeneratorConfig::from_file(&flags.config)?;
    if let Some(seed) = flags.seed {
        cfg.master_seed = seed;
    }
    if !flags.patterns.is_empty() {
        cfg.patterns = Some(flags.patterns.clone());
    }
    if flags.sequential {
        cfg.parallel = false;
    }

    let transform = cfg.reprojection.transform();
    let dataset = RulesDataSet::load(&cfg.rules_dir, &cfg.real_time_dir, transform.as_ref())?;
    if dataset.num_patterns() == 0 {
        return Err(format!("no demand patterns found in {}", cfg.rules_dir.display()).into());
    }

    let base = match &cfg.base_population_path {
        Some(path) => population_from_xml_path(path)?,
        None => default_base_population(&dataset, &cfg.synthetic_grid, cfg.master_seed)?,
    };
    PopulationStatistics::from_population(&base).log_summary("base population");

    let orchestrator = cfg.orchestrator();
    let writer = XmlPopulationWriter::new(&cfg.output_dir);
    let batch = orchestrator.run_batch(&base, &dataset, &writer, cfg.master_seed,
                                       cfg.patterns.as_deref());
    for result in &batch.results {
        PopulationStatistics::from_population(&result.population)
            .log_summary(&result.pattern_id.to_string());
    }
    if let Some(report_path) = &cfg.report_path {
        write_report(report_path, &batch)?;
    }

    println!("generated {} populations in {}, {} failed", batch.num_succeeded(),
             cfg.output_dir.display(), batch.num_failed());
    Ok(batch.num_failed())
}

fn main() {
    env_logger::init();
    let flags = Flags::from_args();
    match run(&flags) {
        Ok(0) => (),
        Ok(_) => process::exit(2),
        Err(err) => {
            log::error!("{}", err);
            eprintln!("error: {}", err);
            process::exit(1);
        }
    }
}

use std::path::PathBuf;

use clap::{Args, Command, FromArgMatches as _};
use log::info;

use crate::census::{read_census_csv, seeds_from_census};
use crate::context::Context;
use crate::error::GeospreadError;
use crate::execution_stats::ExecutionStatistics;
use crate::log::{apply_log_level_arg, parse_log_level_arg};
use crate::movement::BoundingBox;
use crate::parameters::{ContextParametersExt, Parameters};
use crate::population::ContextPopulationExt;
use crate::random::ContextRandomExt;
use crate::report::ContextReportExt;
use crate::simulation::{self, SeedingRng};

/// Margin in degrees added around the population when `--fit-bounds` derives a bounding box.
pub const FIT_BOUNDS_MARGIN: f64 = 0.01;

/// Default cli arguments for the geospread runner
#[derive(Args, Debug, Default)]
pub struct BaseArgs {
    /// Random seed
    #[arg(short, long, default_value = "0")]
    pub random_seed: u64,

    /// Optional path for a JSON parameters file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Directory for the step and transition reports. Reports are only written when set
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Log level (`info`) or comma separated `module=level` filters
    #[arg(short, long)]
    pub log_level: Option<String>,

    /// Census CSV to seed the population from
    #[arg(short, long)]
    pub population: Option<PathBuf>,

    /// Overrides `max_steps` from the parameters
    #[arg(short, long)]
    pub steps: Option<usize>,

    /// Derive the bounding box from the seeded population when the parameters have none
    #[arg(long)]
    pub fit_bounds: bool,

    /// Prefix for report file names
    #[arg(long, default_value = "")]
    pub prefix: String,

    /// Overwrite existing report files
    #[arg(short, long)]
    pub force_overwrite: bool,
}

fn create_geospread_cli() -> Command {
    let cli = Command::new("geospread").about("Spatial agent-based infection spread simulation");
    BaseArgs::augment_args(cli)
}

/// Runs a simulation configured from the command line.
///
/// `setup_fn` runs after parameters, random numbers, reports and the census population are
/// in place and before the first tick; it can add agents or adjust the context.
///
/// # Errors
///
/// Returns an error if the arguments are inconsistent, an input cannot be loaded, the setup
/// function fails, or a tick fails.
pub fn run_with_args<F>(setup_fn: F) -> Result<(Context, ExecutionStatistics), GeospreadError>
where
    F: FnOnce(&mut Context, &BaseArgs) -> Result<(), GeospreadError>,
{
    let matches = create_geospread_cli().get_matches();
    let args = BaseArgs::from_arg_matches(&matches).unwrap_or_else(|err| err.exit());
    run_with_args_internal(&args, setup_fn)
}

fn load_parameters(args: &BaseArgs) -> Result<Parameters, GeospreadError> {
    let mut parameters = match &args.config {
        Some(path) => {
            info!("Loading parameters from: {}", path.display());
            Parameters::from_json_file(path)?
        }
        None => Parameters::default(),
    };
    if let Some(steps) = args.steps {
        parameters.max_steps = steps;
    }
    Ok(parameters)
}

fn seed_from_census(
    context: &mut Context,
    args: &BaseArgs,
    parameters: &Parameters,
) -> Result<(), GeospreadError> {
    let Some(path) = &args.population else {
        return Ok(());
    };
    // Reject bad seeding options before reading a potentially large file.
    parameters.validate()?;
    let records = read_census_csv(path)?;
    let seeds = context.sample(SeedingRng, |rng| {
        seeds_from_census(
            &records,
            &parameters.seeding,
            parameters.infectious_speed_ratio,
            rng,
        )
    })?;
    context.seed_population(seeds)?;
    Ok(())
}

pub(crate) fn run_with_args_internal<F>(
    args: &BaseArgs,
    setup_fn: F,
) -> Result<(Context, ExecutionStatistics), GeospreadError>
where
    F: FnOnce(&mut Context, &BaseArgs) -> Result<(), GeospreadError>,
{
    if let Some(log_level) = &args.log_level {
        apply_log_level_arg(&parse_log_level_arg(log_level)?);
    }

    let mut context = Context::new();
    context.init_random(args.random_seed);

    let mut parameters = load_parameters(args)?;
    seed_from_census(&mut context, args, &parameters)?;
    if args.fit_bounds && parameters.bounding_box.is_none() {
        let positions: Vec<_> = context
            .population_mut()
            .iter()
            .map(|(_, agent)| agent.position())
            .collect();
        parameters.bounding_box = BoundingBox::enclosing(positions, FIT_BOUNDS_MARGIN);
        info!("fitted bounding box {:?}", parameters.bounding_box);
    }
    context.set_parameters(parameters)?;

    context
        .report_options()
        .file_prefix(args.prefix.clone())
        .overwrite(args.force_overwrite);
    if let Some(output_dir) = &args.output_dir {
        context.report_options().directory(output_dir.clone());
        simulation::add_reports(&mut context)?;
    }

    setup_fn(&mut context, args)?;

    let statistics = simulation::run(&mut context)?;
    Ok((context, statistics))
}

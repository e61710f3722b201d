//! House Pricer CLI
//!
//! Lists the form choices, prices a property and charts why.
use clap::{Args, Parser, Subcommand};
use house_pricer::builder::AMENITIES;
use house_pricer::render::{render_estimate, render_importance};
use house_pricer::utils::{format_price, precision_round, read_csv, read_json};
use house_pricer::{ContributionsMethod, FeatureSchema, PriceEstimate, PricerConfig, PricerError, PricingContext, RawInput};
use log::{error, info, warn};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(name = "house-pricer")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Price estimates for Balearic residential properties", long_about = None)]
struct Cli {
    /// JSON configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding columns.json, scaler.json and model.json
    #[arg(long, global = true)]
    artifacts: Option<PathBuf>,

    /// Attribution method: Shapley, Average or Weight
    #[arg(long, global = true)]
    method: Option<ContributionsMethod>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the zones
    Zones,
    /// List the cities, optionally of one zone
    Cities {
        #[arg(long)]
        zone: Option<String>,
    },
    /// List the house types
    Types,
    /// Price a single property
    Estimate(EstimateArgs),
    /// Price every row of a CSV file
    Batch {
        /// CSV file with a header row of input field names
        input: PathBuf,
        /// Print estimates as JSON
        #[arg(long)]
        json: bool,
    },
    /// Chart feature importance over a synthetic reference sample
    Importance {
        /// Number of reference submissions
        #[arg(long)]
        samples: Option<usize>,
        /// Seed of the reference sampler
        #[arg(long)]
        seed: Option<u64>,
        /// Number of features to chart
        #[arg(long, default_value = "15")]
        top: usize,
        /// Chart every indicator column instead of one entry per family
        #[arg(long)]
        ungrouped: bool,
    },
}

#[derive(Args, Debug)]
struct EstimateArgs {
    /// JSON file holding the input fields
    #[arg(short, long, conflicts_with_all = ["zone", "city", "house_type"])]
    input: Option<PathBuf>,

    #[arg(long, required_unless_present = "input")]
    zone: Option<String>,

    #[arg(long, required_unless_present = "input")]
    city: Option<String>,

    #[arg(long = "type", required_unless_present = "input")]
    house_type: Option<String>,

    /// Surface area in square meters
    #[arg(long, default_value = "0")]
    m2: f64,

    #[arg(long, default_value = "0")]
    rooms: u32,

    #[arg(long, default_value = "0")]
    baths: u32,

    /// Amenity present in the property, repeatable
    #[arg(long = "with", value_parser = clap::builder::PossibleValuesParser::new(AMENITIES))]
    amenities: Vec<String>,

    /// Number of attributions to chart
    #[arg(long, default_value = "10")]
    top: usize,

    /// Print the estimate as JSON
    #[arg(long)]
    json: bool,
}

impl EstimateArgs {
    fn raw_input(&self) -> Result<RawInput, PricerError> {
        if let Some(path) = &self.input {
            return read_json(path);
        }
        let mut raw = RawInput::new(
            self.zone.as_deref().unwrap_or_default(),
            self.city.as_deref().unwrap_or_default(),
            self.house_type.as_deref().unwrap_or_default(),
            self.m2,
            self.rooms as f64,
            self.baths as f64,
        );
        for amenity in &self.amenities {
            raw.set_amenity(amenity, true);
        }
        Ok(raw)
    }
}

fn load_config(cli: &Cli) -> Result<PricerConfig, PricerError> {
    let mut config = match &cli.config {
        Some(path) => PricerConfig::load_config(path)?,
        None => PricerConfig::default(),
    };
    if let Some(dir) = &cli.artifacts {
        config = config.set_artifact_dir(dir.clone());
    }
    if let Some(method) = cli.method {
        config = config.set_contributions_method(method);
    }
    Ok(config)
}

fn rounded(estimate: &PriceEstimate) -> PriceEstimate {
    PriceEstimate {
        price: precision_round(estimate.price, 2),
        explanation: estimate.explanation.clone(),
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, PricerError> {
    serde_json::to_string_pretty(value).map_err(|e| PricerError::UnableToWrite(e.to_string()))
}

fn run(cli: Cli) -> Result<(), PricerError> {
    let config = load_config(&cli)?;
    match &cli.command {
        Command::Zones => {
            let schema = FeatureSchema::balearic()?;
            schema.list_zones().iter().for_each(|z| println!("{}", z));
        }
        Command::Cities { zone } => {
            let schema = FeatureSchema::balearic()?;
            let cities = match zone {
                Some(zone) => schema.cities_for_zone(zone)?,
                None => schema.list_cities(),
            };
            cities.iter().for_each(|c| println!("{}", c));
        }
        Command::Types => {
            let schema = FeatureSchema::balearic()?;
            // Debug formatting keeps the leading space some labels carry.
            schema.list_house_types().iter().for_each(|t| println!("{:?}", t));
        }
        Command::Estimate(args) => {
            let context = PricingContext::load(&config)?;
            let raw = args.raw_input()?;
            context.schema().check_city_in_zone(&raw.zone, &raw.city)?;
            let estimate = context.estimate(&raw)?;
            if args.json {
                println!("{}", to_json(&rounded(&estimate))?);
            } else {
                print!("{}", render_estimate(&estimate, args.top));
            }
        }
        Command::Batch { input, json } => {
            let context = PricingContext::load(&config)?;
            let records: Vec<Result<RawInput, PricerError>> = read_csv::<RawInput>(input)?
                .into_iter()
                .map(|record| {
                    let raw = record?;
                    context.schema().check_city_in_zone(&raw.zone, &raw.city)?;
                    Ok(raw)
                })
                .collect();
            info!("Pricing {} rows from {}.", records.len(), input.display());
            let estimates = context.estimate_records(records)?;
            for (i, err) in estimates.iter().enumerate().filter_map(|(i, e)| e.as_ref().err().map(|err| (i, err))) {
                if err.is_model_error() {
                    error!("Row {}: {}", i + 1, err);
                }
            }
            let failed = estimates.iter().filter(|e| e.is_err()).count();
            if failed > 0 {
                warn!("{} of {} rows could not be priced.", failed, estimates.len());
            }
            if *json {
                let rows: Vec<serde_json::Value> = estimates
                    .iter()
                    .map(|e| match e {
                        Ok(estimate) => serde_json::json!({ "price": precision_round(estimate.price, 2) }),
                        Err(err) => serde_json::json!({ "error": err.user_message() }),
                    })
                    .collect();
                println!("{}", to_json(&rows)?);
            } else {
                for (i, estimate) in estimates.iter().enumerate() {
                    match estimate {
                        Ok(estimate) => println!("{}\t{}", i + 1, format_price(estimate.price)),
                        Err(err) => println!("{}\terror: {}", i + 1, err.user_message()),
                    }
                }
            }
        }
        Command::Importance {
            samples,
            seed,
            top,
            ungrouped,
        } => {
            let context = PricingContext::load(&config)?;
            let importance = context.reference_importance(
                samples.unwrap_or(config.reference_samples),
                seed.unwrap_or(config.seed),
            )?;
            print!("{}", render_importance(&importance, *top, !ungrouped));
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) if e.is_input_error() => {
            eprintln!("invalid input: {}", e);
            ExitCode::from(2)
        }
        Err(e) => {
            if e.is_model_error() {
                error!("{}", e);
            }
            eprintln!("error: {}", e.user_message());
            ExitCode::FAILURE
        }
    }
}

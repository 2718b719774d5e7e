//! posfun CLI

use anyhow::Result;
use clap::{Parser, Subcommand};
use pf_core::LogDensityModel;
use pf_inference::{MaximumLikelihoodEstimator, OptimizerConfig};
use pf_model::{PARAMETER_NAMES, PosfunData, PosfunModel};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "posfun")]
#[command(about = "posfun - Gaussian likelihood fits with a smooth positive variance guard")]
#[command(version)]
struct Cli {
    /// Log verbosity level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "warn")]
    log_level: tracing::Level,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Perform MLE fit
    Fit {
        /// Input data (JSON with `eps`, `x` and optional `parameters`)
        #[arg(short, long)]
        input: PathBuf,

        /// Output file for results (pretty JSON). Defaults to stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Maximum optimizer iterations
        #[arg(long, default_value_t = 1000)]
        max_iter: u64,

        /// Gradient-norm convergence tolerance
        #[arg(long, default_value_t = 1e-6)]
        tol: f64,

        /// Initial value for `p` (overrides the input file)
        #[arg(long, allow_negative_numbers = true)]
        p: Option<f64>,

        /// Initial value for `Dummy` (overrides the input file)
        #[arg(long, allow_negative_numbers = true)]
        dummy: Option<f64>,
    },

    /// Evaluate the objective and its gradient at one point
    Eval {
        /// Input data (JSON with `eps`, `x` and optional `parameters`)
        #[arg(short, long)]
        input: PathBuf,

        /// Value of `p` (overrides the input file)
        #[arg(long, allow_negative_numbers = true)]
        p: Option<f64>,

        /// Value of `Dummy` (overrides the input file)
        #[arg(long, allow_negative_numbers = true)]
        dummy: Option<f64>,

        /// Output file for results (pretty JSON). Defaults to stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print version information
    Version,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // stdout carries the JSON result.
    tracing_subscriber::fmt()
        .with_max_level(cli.log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Fit { input, output, max_iter, tol, p, dummy } => {
            cmd_fit(&input, output.as_ref(), max_iter, tol, p, dummy)
        }
        Commands::Eval { input, p, dummy, output } => cmd_eval(&input, p, dummy, output.as_ref()),
        Commands::Version => {
            println!("posfun {}", pf_core::VERSION);
            Ok(())
        }
    }
}

fn cmd_fit(
    input: &PathBuf,
    output: Option<&PathBuf>,
    max_iter: u64,
    tol: f64,
    p: Option<f64>,
    dummy: Option<f64>,
) -> Result<()> {
    let model = load_model(input, p, dummy)?;

    let config = OptimizerConfig { max_iter, tol, ..Default::default() };
    let mle = MaximumLikelihoodEstimator::with_config(config);
    let result = mle.fit(&model)?;
    tracing::info!(nll = result.nll, converged = result.converged, "fit complete");

    let at_best = model.evaluate(&result.parameters)?;

    let output_json = serde_json::json!({
        "parameter_names": PARAMETER_NAMES,
        "eps": model.eps(),
        "bestfit": result.parameters,
        "uncertainties": result.uncertainties,
        "covariance": result.covariance,
        "nll": result.nll,
        "converged": result.converged,
        "n_iter": result.n_iter,
        "n_fev": result.n_fev,
        "n_gev": result.n_gev,
        "message": result.message,
        "warnings": result.warnings,
        "penalty": at_best.penalty,
        "variance_raw": at_best.variance_raw,
        "variance": at_best.variance,
        "penalty_active": at_best.variance_raw < model.eps(),
    });

    write_json(output, output_json)
}

fn cmd_eval(
    input: &PathBuf,
    p: Option<f64>,
    dummy: Option<f64>,
    output: Option<&PathBuf>,
) -> Result<()> {
    let model = load_model(input, p, dummy)?;
    let params = model.parameter_init();

    let ev = model.evaluate(&params)?;
    let gradient = model.gradient_reverse(&params)?;
    if !ev.nll.is_finite() {
        tracing::warn!(nll = ev.nll, "objective is not finite");
    }

    let output_json = serde_json::json!({
        "parameter_names": PARAMETER_NAMES,
        "parameters": params,
        "nll": ev.nll,
        "penalty": ev.penalty,
        "variance_raw": ev.variance_raw,
        "variance": ev.variance,
        "penalty_active": ev.variance_raw < model.eps(),
        "gradient": gradient,
    });

    write_json(output, output_json)
}

fn load_model(input: &PathBuf, p: Option<f64>, dummy: Option<f64>) -> Result<PosfunModel> {
    tracing::info!(path = %input.display(), "loading data");
    let data = PosfunData::from_path(input)?;
    let init = data.init();
    let model = PosfunModel::from_data(&data)?
        .with_init(p.unwrap_or(init.p), dummy.unwrap_or(init.dummy));
    tracing::info!(observations = model.observations().len(), eps = model.eps(), "data loaded");
    Ok(model)
}

fn write_json(output: Option<&PathBuf>, value: serde_json::Value) -> Result<()> {
    if let Some(path) = output {
        std::fs::write(path, serde_json::to_string_pretty(&value)?)?;
    } else {
        println!("{}", serde_json::to_string_pretty(&value)?);
    }
    Ok(())
}

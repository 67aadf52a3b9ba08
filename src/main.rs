use clap::Parser;
use color_eyre::Result;
use env_logger::Env;
use kube_ipam::config::DualStackMode;
use kube_ipam::config_loader::{self, CliOverrides};
use kube_ipam::orchestrator;
use log::info;
use std::path::PathBuf;

/// Replay subnet and address declarations against the kube-ovn style IPAM engine
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the IPAM configuration YAML file
    #[arg(short, long)]
    config: PathBuf,

    /// Write the status report to this file instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Render the status report as JSON instead of YAML
    #[arg(long)]
    json: bool,

    /// Override general.log_level
    #[arg(long)]
    log_level: Option<String>,

    /// Override general.dual_stack_mode (independent or eui64)
    #[arg(long, value_parser = parse_dual_stack_mode)]
    dual_stack_mode: Option<DualStackMode>,
}

fn parse_dual_stack_mode(value: &str) -> std::result::Result<DualStackMode, String> {
    match value.to_ascii_lowercase().as_str() {
        "independent" => Ok(DualStackMode::Independent),
        "eui64" | "eui-64" => Ok(DualStackMode::Eui64),
        other => Err(format!("unknown dual-stack mode {:?}, expected independent or eui64", other)),
    }
}

fn main() -> Result<()> {
    // Initialize error handling
    color_eyre::install()?;

    let args = Args::parse();

    // The configuration picks the default log filter, so it is read before the logger exists
    let mut config = config_loader::load_config(&args.config)?;
    let overrides = CliOverrides {
        log_level: args.log_level.clone(),
        dual_stack_mode: args.dual_stack_mode,
    };
    config_loader::apply_overrides(&mut config, &overrides)?;

    let default_filter = config.general.log_level.clone().unwrap_or_else(|| "info".to_string());
    env_logger::Builder::from_env(Env::default().default_filter_or(default_filter)).init();

    info!("Starting kube-ipam");
    info!("Configuration file: {:?}", args.config);

    let report = orchestrator::run(&config)?;

    match &args.output {
        Some(path) => {
            orchestrator::write_report(&report, path, args.json)?;
            orchestrator::print_summary(&report);
        }
        None => print!("{}", orchestrator::render_report(&report, args.json)?),
    }

    info!("IPAM replay completed");
    Ok(())
}

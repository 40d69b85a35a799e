use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use color_eyre::eyre::WrapErr;
use color_eyre::Result;
use env_logger::Env;
use log::{info, warn};

use linkscope::inventory::{load_inventory, CollectionOverrides};
use linkscope::orchestrator::collect_all;
use linkscope::report::{write_report, DiscoveryReport, ReportFormat};
use linkscope::session::CollectionTarget;
use linkscope::topology::{fuse, validate_topology};
use linkscope::utils::parse_duration;

/// Discover the physical link topology of a lab network over SSH
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the host inventory YAML file
    #[arg(short, long, default_value = "inventory/hosts.yaml")]
    inventory: PathBuf,

    /// Write the report to this file instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Report format
    #[arg(short, long, value_enum, default_value_t = ReportFormat::Text)]
    format: ReportFormat,

    /// Only collect from these inventory hosts
    #[arg(long, num_args = 1..)]
    hosts: Vec<String>,

    /// Also run active probing (IPv6 all-nodes ping) on every interface
    #[arg(long)]
    probe: bool,

    /// Maximum number of hosts collected at once
    #[arg(long)]
    concurrency: Option<usize>,

    /// Time budget per host (e.g. "30s", "2m")
    #[arg(long, value_parser = parse_duration)]
    host_timeout: Option<Duration>,

    /// Time budget for the whole run
    #[arg(long, value_parser = parse_duration)]
    deadline: Option<Duration>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize error handling
    color_eyre::install()?;

    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(default_level)).init();

    info!("Inventory file: {:?}", args.inventory);

    let mut inventory = load_inventory(&args.inventory)
        .wrap_err_with(|| format!("Failed to load inventory '{}'", args.inventory.display()))?;

    let overrides = CollectionOverrides {
        concurrency: args.concurrency,
        host_timeout: args.host_timeout,
        run_deadline: args.deadline,
        probe: args.probe,
    };
    inventory.apply_overrides(&overrides).wrap_err("Invalid command-line settings")?;

    let targets: Vec<CollectionTarget> = inventory
        .targets(&args.hosts)?
        .into_iter()
        .map(|host| host.collection_target())
        .collect();

    let run = collect_all(targets, &inventory.orchestrator_config())
        .await
        .wrap_err("Collection run could not start")?;

    let topology = fuse(&run.hosts);
    let issues = validate_topology(&topology, &inventory.validation);
    let report = DiscoveryReport::new(&run, topology, issues, Some(&args.inventory));

    write_report(&report, args.format, args.output.as_deref())?;

    if run.nothing_reachable() {
        warn!("None of the {} host(s) could be collected", run.hosts.len());
    }
    info!("Discovery completed");
    Ok(())
}

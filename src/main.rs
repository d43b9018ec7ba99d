//! VinInvoice - VIN capture and invoice routing
//!
//! Reads a VIN off a camera feed with OCR, resolves the vehicle through the
//! invoicing backend and adds a line item to the customer's invoice for the
//! day, creating the invoice when there is none yet.

mod backend;
mod capture;
mod config;
mod error;
mod scan;
mod vision;
mod workflow;

#[cfg(test)]
mod testing;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::backend::{ApiClient, HttpCustomerDirectory, HttpInvoiceBackend, HttpVehicleLookup, VehicleLookup};
use crate::capture::{DirectoryCamera, Facing};
use crate::config::AppConfig;
use crate::scan::{ScanOutcome, ScanScheduler};
use crate::vision::{extract_vin, TesseractOcr};
use crate::workflow::models::{CatalogItem, CustomerSelection};
use crate::workflow::WorkflowCoordinator;

/// VinInvoice - VIN scan to invoice line
#[derive(Parser, Debug)]
#[command(name = "vin-invoice")]
#[command(about = "Scan a VIN, look up the vehicle and bill it on today's invoice")]
struct Args {
    /// Configuration file (defaults to the platform config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Find a VIN in a piece of text
    Extract {
        text: String,
    },

    /// Run one scan session over a directory of frames
    Scan {
        /// Directory of frame images
        #[arg(long)]
        frames: PathBuf,

        /// Facing reported by the frame directory
        #[arg(long, value_enum, default_value_t = Facing::Environment)]
        camera_facing: Facing,
    },

    /// Resolve a VIN through the backend
    Lookup {
        vin: String,
    },

    /// Search customers by name
    Customers {
        /// Part of the display name; lists the first customers when omitted
        query: Option<String>,

        #[arg(long, default_value_t = 25)]
        limit: u32,
    },

    /// Send a customer's invoice for today and end their session
    Complete {
        #[arg(long)]
        customer_id: String,

        /// Name used in messages; defaults to the id
        #[arg(long)]
        customer_name: Option<String>,
    },

    /// Select a customer, scan, look up and bill one line item
    Run {
        #[arg(long)]
        customer_id: String,

        #[arg(long)]
        customer_name: String,

        /// Directory of frame images
        #[arg(long)]
        frames: PathBuf,

        /// Catalog item name
        #[arg(long)]
        item_name: String,

        /// Catalog item id, if known
        #[arg(long)]
        item_id: Option<String>,

        /// Unit rate
        #[arg(long)]
        rate: Decimal,

        #[arg(long, default_value_t = 1)]
        qty: u32,

        /// Replace the generated line description
        #[arg(long)]
        description: Option<String>,
    },

    /// Show or initialize the configuration file
    Config {
        /// Print the effective configuration
        #[arg(long)]
        show: bool,

        /// Write the default configuration if no file exists
        #[arg(long)]
        init: bool,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging; RUST_LOG wins over --verbose
    let level = if args.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match args.command {
        Command::Extract { text } => {
            match extract_vin(&text) {
                Some(vin) => println!("{}", vin),
                None => println!("No VIN found"),
            }
            Ok(())
        }
        Command::Config { show, init } => run_config(&resolve_config_path(&args.config)?, show, init),
        Command::Scan { frames, camera_facing } => run_scan(&app_config(&args.config)?, frames, camera_facing).await,
        Command::Lookup { vin } => run_lookup(&app_config(&args.config)?, &vin).await,
        Command::Customers { query, limit } => {
            run_customers(&app_config(&args.config)?, query.as_deref().unwrap_or(""), limit).await
        }
        Command::Complete {
            customer_id,
            customer_name,
        } => {
            let name = customer_name.unwrap_or_else(|| customer_id.clone());
            run_complete(&app_config(&args.config)?, CustomerSelection::new(customer_id, name)).await
        }
        Command::Run {
            customer_id,
            customer_name,
            frames,
            item_name,
            item_id,
            rate,
            qty,
            description,
        } => {
            let customer = CustomerSelection::new(customer_id, customer_name);
            let item = CatalogItem::new(item_id, item_name);
            run_workflow(&app_config(&args.config)?, customer, frames, item, rate, qty, description).await
        }
    }
}

/// Configuration for commands that talk to the camera or the backend
fn app_config(explicit: &Option<PathBuf>) -> Result<AppConfig> {
    let path = resolve_config_path(explicit)?;
    load_or_default_config(&path, explicit.is_some())
}

fn resolve_config_path(explicit: &Option<PathBuf>) -> Result<PathBuf> {
    match explicit {
        Some(path) => Ok(path.clone()),
        None => config::default_config_path(),
    }
}

/// Load configuration, falling back to defaults when the default file is absent
fn load_or_default_config(path: &Path, explicit: bool) -> Result<AppConfig> {
    if path.exists() || explicit {
        let config = config::load_config(path)?;
        info!("Loaded configuration from {:?}", path);
        return Ok(config);
    }
    info!("Using default configuration");
    Ok(AppConfig::default())
}

fn run_config(path: &Path, show: bool, init: bool) -> Result<()> {
    if init {
        if path.exists() {
            warn!("{:?} already exists; leaving it unchanged", path);
        } else {
            config::save_config(&AppConfig::default(), path)?;
            println!("Wrote default configuration to {}", path.display());
        }
    }

    if show || !init {
        let config = load_or_default_config(path, false)?;
        println!("# {}", path.display());
        print!("{}", toml::to_string_pretty(&config)?);
    }
    Ok(())
}

fn build_scheduler(config: &AppConfig) -> Result<ScanScheduler> {
    let settings = config.scan.settings().context("Invalid [scan] settings")?;
    let ocr = Arc::new(TesseractOcr::new(&config.ocr));
    Ok(ScanScheduler::new(ocr, config.ocr.preprocessing.clone(), settings))
}

/// Cancellation token tripped by Ctrl-C
fn ctrl_c_token() -> CancellationToken {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C received, cancelling");
            trigger.cancel();
        }
    });
    cancel
}

async fn run_scan(config: &AppConfig, frames: PathBuf, facing: Facing) -> Result<()> {
    let scheduler = build_scheduler(config)?;
    info!("Scanning for up to {:?}", scheduler.settings().deadline);
    let mut camera = DirectoryCamera::new(frames, facing);
    let cancel = ctrl_c_token();

    let report = scheduler.run(&mut camera, &cancel).await;

    debug!("Scan {} ended in state {:?}", report.session_id, report.final_state);
    println!("Session:  {}", report.session_id);
    println!("Attempts: {}", report.attempts);
    if let Some(elapsed) = report.scanning_time {
        println!("Scanning: {:.1}s", elapsed.as_secs_f64());
    }
    if let Some(vin) = report.vin() {
        println!("VIN:      {}", vin);
        return Ok(());
    }
    match &report.outcome {
        ScanOutcome::Found(_) => {}
        ScanOutcome::TimedOut => println!("No VIN found"),
        ScanOutcome::Cancelled => println!("Scan cancelled"),
        ScanOutcome::Failed(e) => anyhow::bail!("Scan failed: {}", e),
    }
    Ok(())
}

async fn run_lookup(config: &AppConfig, vin: &str) -> Result<()> {
    let api = Arc::new(ApiClient::new(&config.api)?);
    info!("Backend: {}", api.base_url());
    let lookup = HttpVehicleLookup::new(api, config.api.vehicle_schema);

    let record = lookup.lookup(vin).await?;
    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}

async fn run_customers(config: &AppConfig, query: &str, limit: u32) -> Result<()> {
    let api = Arc::new(ApiClient::new(&config.api)?);
    info!("Backend: {}", api.base_url());
    let directory = HttpCustomerDirectory::new(api);

    let customers = directory.search(query, limit).await?;
    if customers.is_empty() {
        println!("No customers found");
    }
    for customer in &customers {
        println!("{}\t{}", customer.id(), customer.name());
    }
    Ok(())
}

async fn run_complete(config: &AppConfig, customer: CustomerSelection) -> Result<()> {
    let api = Arc::new(ApiClient::new(&config.api)?);
    info!("Backend: {}", api.base_url());
    let lookup = Arc::new(HttpVehicleLookup::new(api.clone(), config.api.vehicle_schema));
    let invoices = Arc::new(HttpInvoiceBackend::new(api));
    let mut workflow = WorkflowCoordinator::new(lookup, invoices);

    let name = customer.name().to_string();
    workflow.select_customer(customer).await?;
    let sent = workflow
        .complete_invoice()
        .await
        .with_context(|| format!("Could not complete the invoice for {}", name))?;

    println!(
        "Invoice {} sent to {}",
        sent.invoice_number.as_deref().unwrap_or(&sent.invoice_id),
        sent.customer.as_deref().unwrap_or(&name)
    );
    Ok(())
}

async fn run_workflow(
    config: &AppConfig,
    customer: CustomerSelection,
    frames: PathBuf,
    item: CatalogItem,
    rate: Decimal,
    qty: u32,
    description: Option<String>,
) -> Result<()> {
    let api = Arc::new(ApiClient::new(&config.api)?);
    info!("Backend: {}", api.base_url());
    let lookup = Arc::new(HttpVehicleLookup::new(api.clone(), config.api.vehicle_schema));
    let invoices = Arc::new(HttpInvoiceBackend::new(api));
    let mut workflow = WorkflowCoordinator::new(lookup, invoices);

    workflow.select_customer(customer).await?;
    let name = workflow.customer().map(|c| c.name().to_string()).unwrap_or_default();
    match &workflow.invoice().invoice_id {
        Some(id) => println!("{}: today's invoice is {}", name, id),
        None => println!("{}: no invoice yet today", name),
    }

    let scheduler = build_scheduler(config)?;
    let mut camera = DirectoryCamera::new(frames, config.scan.camera_facing);
    let cancel = ctrl_c_token();
    let vehicle = workflow.scan_vin(&scheduler, &mut camera, &cancel).await?;
    println!(
        "Vehicle: {} {} {} ({})",
        vehicle.year.map(|y| y.to_string()).unwrap_or_else(|| "Unknown".to_string()),
        vehicle.make.as_deref().unwrap_or("Unknown"),
        vehicle.model.as_deref().unwrap_or("Unknown"),
        vehicle.vin()
    );

    let mut draft = workflow.draft_line(item, rate, qty)?;
    if let Some(description) = description {
        draft = draft.with_description(description)?;
    }

    let action = workflow.submit(draft).await?;
    let invoice_id = workflow.invoice().invoice_id.as_deref().unwrap_or("?");
    match action {
        workflow::InvoiceAction::Create => println!("Created invoice {}", invoice_id),
        workflow::InvoiceAction::Append(_) => println!("Added line to invoice {}", invoice_id),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commands_parse() {
        let args = Args::try_parse_from(["vin-invoice", "customers", "lake", "--limit", "5"]).unwrap();
        assert!(matches!(args.command, Command::Customers { query: Some(ref q), limit: 5 } if q == "lake"));

        let args = Args::try_parse_from(["vin-invoice", "customers"]).unwrap();
        assert!(matches!(args.command, Command::Customers { query: None, limit: 25 }));

        let args = Args::try_parse_from(["vin-invoice", "complete", "--customer-id", "58"]).unwrap();
        assert!(matches!(args.command, Command::Complete { ref customer_id, customer_name: None } if customer_id == "58"));

        let args = Args::try_parse_from(["vin-invoice", "-c", "/tmp/vin.toml", "scan", "--frames", "plates"]).unwrap();
        assert_eq!(args.config.as_deref(), Some(Path::new("/tmp/vin.toml")));
        assert!(matches!(args.command, Command::Scan { camera_facing: Facing::Environment, .. }));

        assert!(Args::try_parse_from(["vin-invoice", "complete"]).is_err());
    }

    #[test]
    fn test_explicit_missing_config_is_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let missing = Some(dir.path().join("absent.toml"));
        assert!(app_config(&missing).is_err());
    }
}

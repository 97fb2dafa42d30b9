use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

use sales_outreach::app::dispatch_use_case::{render_message, DispatchOptions, DispatchUseCase};
use sales_outreach::app::outreach_use_case::{OutreachReport, OutreachRequest, OutreachUseCase};
use sales_outreach::config::{Config, SmsCredentials};
use sales_outreach::infra::{write_contacts_file, SmsHttpNotifier};
use sales_outreach::logging;
use sales_outreach::pipeline::processing::{outreach_list, MatchMode};
use sales_outreach::pipeline::TabularIngestor;

#[derive(Parser)]
#[command(name = "sales_outreach")]
#[command(about = "Build verified producer outreach lists from POS exports and a member directory")]
#[command(version = "0.1.0")]
struct Cli {
    /// Path to the TOML config file
    #[arg(long, global = true, default_value = "config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List producers found in a sales export
    Farmers {
        #[arg(long)]
        sales: PathBuf,
        /// Substring filter on producer names
        #[arg(long)]
        query: Option<String>,
    },
    /// Build the contact list for one or more producers
    Contacts {
        #[command(flatten)]
        inputs: ContactInputs,
        /// Write the contact list as CSV; with several producers the name is suffixed
        #[arg(long)]
        output: Option<PathBuf>,
        /// Number of contacts in the copy-paste list (defaults to dispatch.top_n)
        #[arg(long)]
        top: Option<usize>,
    },
    /// Send a templated SMS to every verified contact
    Notify {
        #[command(flatten)]
        inputs: ContactInputs,
        /// Message template; supports {name}, {farmer} and {count}
        #[arg(long)]
        message: String,
        /// Print rendered messages instead of sending
        #[arg(long)]
        dry_run: bool,
    },
}

#[derive(clap::Args)]
struct ContactInputs {
    #[arg(long)]
    sales: PathBuf,
    #[arg(long)]
    directory: Option<PathBuf>,
    /// Producer name; repeat for several producers
    #[arg(long = "farmer", required = true)]
    farmers: Vec<String>,
    #[arg(long)]
    item: Option<String>,
    #[arg(long, value_enum, default_value_t = MatchModeArg::Auto)]
    match_mode: MatchModeArg,
    /// Drop buyers without a directory-verified phone
    #[arg(long)]
    strict: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum MatchModeArg {
    Auto,
    Id,
    Name,
}

impl MatchModeArg {
    fn resolve(self) -> Option<MatchMode> {
        match self {
            MatchModeArg::Auto => None,
            MatchModeArg::Id => Some(MatchMode::ById),
            MatchModeArg::Name => Some(MatchMode::ByName),
        }
    }
}

struct LoadedInputs {
    sales: Vec<u8>,
    directory: Option<Vec<u8>>,
}

fn load_inputs(inputs: &ContactInputs) -> anyhow::Result<LoadedInputs> {
    let sales = std::fs::read(&inputs.sales)?;
    let directory = match &inputs.directory {
        Some(path) => Some(std::fs::read(path)?),
        None => None,
    };
    Ok(LoadedInputs { sales, directory })
}

fn requests(inputs: &ContactInputs) -> Vec<OutreachRequest> {
    inputs
        .farmers
        .iter()
        .map(|farmer| {
            let mut request = OutreachRequest::new(farmer.trim());
            request.item = inputs.item.clone();
            request.match_mode = inputs.match_mode.resolve();
            request.curation.strict = inputs.strict;
            request
        })
        .collect()
}

fn output_path(base: &Path, farmer: &str, several: bool) -> PathBuf {
    if !several {
        return base.to_path_buf();
    }
    let stem = base.file_stem().and_then(|s| s.to_str()).unwrap_or("contacts");
    let ext = base.extension().and_then(|s| s.to_str()).unwrap_or("csv");
    base.with_file_name(format!("{}_{}.{}", stem, farmer, ext))
}

fn print_report(report: &OutreachReport, top: usize) {
    println!("\n📋 {} ({} contacts)", report.farmer, report.contacts.len());
    if !report.sales_header_detected {
        println!("   ⚠️  sales header not detected; first row used as labels");
    }
    if report.directory_header_detected == Some(false) {
        println!("   ⚠️  directory header not detected; first row used as labels");
    }
    if let Some(join) = &report.join_report {
        println!(
            "   Join ({:?}): {} matched, {} unmatched, {} duplicate keys, {} name collisions",
            report.match_mode.unwrap_or(MatchMode::ByName),
            join.matched,
            join.unmatched,
            join.duplicate_keys,
            join.name_collisions
        );
    }
    if !report.top_items.is_empty() {
        let items: Vec<String> = report
            .top_items
            .iter()
            .map(|(item, count)| format!("{} ({})", item, count))
            .collect();
        println!("   Top items: {}", items.join(", "));
    }
    for contact in &report.contacts {
        println!("   {}\t{}\t{}", contact.display_name, contact.phone, contact.count);
    }
    println!("\n   Top {}: {}", top, outreach_list(&report.contacts, top));
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let _guard = logging::init_logging();

    let cli = Cli::parse();
    let config = Config::load(&cli.config)?;
    let ingestor = TabularIngestor::new().with_scan_rows(config.ingest.scan_rows);
    let mut use_case = OutreachUseCase::new(ingestor);

    match cli.command {
        Commands::Farmers { sales, query } => {
            let bytes = std::fs::read(&sales)?;
            let farmers = use_case.farmers(&bytes, query.as_deref())?;
            info!("found {} producers in {}", farmers.len(), sales.display());
            for farmer in farmers {
                println!("{}", farmer);
            }
        }
        Commands::Contacts { inputs, output, top } => {
            let loaded = load_inputs(&inputs)?;
            let requests = requests(&inputs);
            let several = requests.len() > 1;
            let top = top.unwrap_or(config.dispatch.top_n);

            for request in &requests {
                let report = use_case.run(&loaded.sales, loaded.directory.as_deref(), request)?;
                print_report(&report, top);
                if let Some(base) = &output {
                    let path = output_path(base, &report.farmer, several);
                    write_contacts_file(&path, &report.contacts)?;
                    println!("   Output file: {}", path.display());
                }
            }
        }
        Commands::Notify {
            inputs,
            message,
            dry_run,
        } => {
            let loaded = load_inputs(&inputs)?;
            let dispatcher = if dry_run {
                None
            } else {
                let credentials = SmsCredentials::from_env()?;
                let notifier = SmsHttpNotifier::new(
                    config.dispatch.endpoint.clone(),
                    credentials,
                    config.dispatch.timeout(),
                )?;
                Some(DispatchUseCase::new(
                    Arc::new(notifier),
                    DispatchOptions::from(&config.dispatch),
                ))
            };

            for request in requests(&inputs) {
                let report = use_case.run(&loaded.sales, loaded.directory.as_deref(), &request)?;
                match &dispatcher {
                    None => {
                        for contact in report.contacts.iter().filter(|c| c.phone.is_canonical()) {
                            println!(
                                "{}\t{}",
                                contact.phone,
                                render_message(&message, &report.farmer, contact)
                            );
                        }
                    }
                    Some(dispatcher) => {
                        let result = dispatcher
                            .dispatch(&report.contacts, &report.farmer, &message)
                            .await;
                        println!(
                            "\n📨 {}: {} sent, {} failed, {} skipped",
                            report.farmer, result.sent, result.failed, result.skipped
                        );
                        for failure in &result.failures {
                            warn!("send to {} failed: {}", failure.phone, failure.error);
                        }
                        if result.cancelled {
                            error!("dispatch for {} cancelled after repeated failures", report.farmer);
                            anyhow::bail!("too many failed sends");
                        }
                    }
                }
            }
        }
    }

    Ok(())
}

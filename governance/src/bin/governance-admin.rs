//! Governance ledger administration CLI
//!
//! Usage:
//!   governance-admin balance                       - Show the current balance
//!   governance-admin adjust --target 1000          - Set the balance
//!   governance-admin adjust --delta -25            - Move the balance
//!   governance-admin export --format csv           - Export the audit trail
//!   governance-admin verify                        - Check hashes and conservation
//!   governance-admin summary                       - Totals derived from the trail

use anyhow::{bail, Context};
use chrono::{DateTime, FixedOffset};
use clap::{Parser, Subcommand};
use governance::{AdjustmentRequest, BudgetAdministrator, Config};
use ledger_core::{AuditFilter, AuditStatus, ExportFormat, Ledger, RequestType};
use rust_decimal::Decimal;
use std::io::Write;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Governance ledger administration
#[derive(Parser, Debug)]
#[command(name = "governance-admin")]
#[command(version)]
#[command(about = "Inspect and adjust the governance budget ledger")]
struct Cli {
    /// TOML configuration file (env: GOVERNANCE_CONFIG)
    #[arg(short, long, env = "GOVERNANCE_CONFIG")]
    config: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
enum Commands {
    /// Show the current balance
    Balance,

    /// Set or move the balance; always writes an audit record
    Adjust {
        /// Set the balance to this value
        #[arg(long, conflicts_with = "delta", required_unless_present = "delta")]
        target: Option<Decimal>,

        /// Add this amount (negative removes funds)
        #[arg(long, allow_hyphen_values = true)]
        delta: Option<Decimal>,

        /// Administrator id recorded on the adjustment
        #[arg(long, env = "GOVERNANCE_ADMIN_ID")]
        admin: String,

        /// Justification recorded on the adjustment
        #[arg(long, default_value = "")]
        note: String,
    },

    /// Export audit records, newest first
    Export {
        /// Output format
        #[arg(short, long, value_enum, default_value = "jsonl")]
        format: Format,

        /// Only records with this status
        #[arg(long, value_enum)]
        status: Option<Status>,

        /// Only records of this kind
        #[arg(long, value_enum)]
        request_type: Option<Kind>,

        /// Only records from this requester
        #[arg(long)]
        requester: Option<String>,

        /// Earliest timestamp (RFC 3339)
        #[arg(long)]
        since: Option<DateTime<FixedOffset>>,

        /// Latest timestamp (RFC 3339)
        #[arg(long)]
        until: Option<DateTime<FixedOffset>>,

        /// Maximum number of records
        #[arg(long)]
        limit: Option<usize>,

        /// Oldest first
        #[arg(long)]
        ascending: bool,

        /// Output file; stdout when absent
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Check record hashes, id sequence and balance conservation
    Verify,

    /// Record counts and totals derived from the stored trail
    Summary {
        /// Only records from this requester
        #[arg(long)]
        requester: Option<String>,

        /// Earliest timestamp (RFC 3339)
        #[arg(long)]
        since: Option<DateTime<FixedOffset>>,

        /// Latest timestamp (RFC 3339)
        #[arg(long)]
        until: Option<DateTime<FixedOffset>>,
    },
}

/// Export format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum Format {
    /// One JSON record per line
    Jsonl,
    /// CSV with header
    Csv,
}

impl From<Format> for ExportFormat {
    fn from(format: Format) -> Self {
        match format {
            Format::Jsonl => ExportFormat::Jsonl,
            Format::Csv => ExportFormat::Csv,
        }
    }
}

/// Record status options
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum Status {
    Success,
    Blocked,
    Error,
}

impl From<Status> for AuditStatus {
    fn from(status: Status) -> Self {
        match status {
            Status::Success => AuditStatus::Success,
            Status::Blocked => AuditStatus::Blocked,
            Status::Error => AuditStatus::Error,
        }
    }
}

/// Record kind options
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum Kind {
    ExternalCall,
    AdminAdjustment,
}

impl From<Kind> for RequestType {
    fn from(kind: Kind) -> Self {
        match kind {
            Kind::ExternalCall => RequestType::ExternalCall,
            Kind::AdminAdjustment => RequestType::AdminAdjustment,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.json_logs);

    let config = match &cli.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => Config::from_env().context("loading configuration from environment")?,
    };

    let ledger = Ledger::open(config.ledger.clone())
        .await
        .with_context(|| format!("opening ledger at {}", config.ledger.data_dir.display()))?;
    let admin = BudgetAdministrator::new(ledger.clone());

    let outcome = run(cli.command, &admin).await;
    ledger.shutdown().await?;
    outcome
}

async fn run(command: Commands, admin: &BudgetAdministrator) -> anyhow::Result<()> {
    match command {
        Commands::Balance => {
            let balance = admin.balance()?;
            println!("{}", serde_json::to_string_pretty(&balance)?);
        }

        Commands::Adjust {
            target,
            delta,
            admin: admin_id,
            note,
        } => {
            let request = AdjustmentRequest {
                target_balance: target,
                delta,
                admin_id,
                note,
            };
            let receipt = admin.adjust(request).await?;
            println!("{}", serde_json::to_string_pretty(&receipt)?);
        }

        Commands::Export {
            format,
            status,
            request_type,
            requester,
            since,
            until,
            limit,
            ascending,
            output,
        } => {
            let mut filter = AuditFilter::all();
            if let Some(status) = status {
                filter = filter.with_status(status.into());
            }
            if let Some(request_type) = request_type {
                filter = filter.with_request_type(request_type.into());
            }
            if let Some(requester) = requester {
                filter = filter.with_requester(requester);
            }
            filter = filter.between(since, until);
            if let Some(limit) = limit {
                filter = filter.with_limit(limit);
            }
            if ascending {
                filter = filter.ascending();
            }

            let count = match output {
                Some(path) => {
                    let file = std::fs::File::create(&path)
                        .with_context(|| format!("creating {}", path.display()))?;
                    admin.export(file, format.into(), &filter)?
                }
                None => {
                    let stdout = std::io::stdout();
                    let mut lock = stdout.lock();
                    let count = admin.export(&mut lock, format.into(), &filter)?;
                    lock.flush()?;
                    count
                }
            };
            tracing::info!(records = count, "Export finished");
        }

        Commands::Verify => {
            let report = admin.verify()?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if !report.is_clean() {
                bail!(
                    "audit trail verification failed: {} hash mismatches, {} id gaps, {} balance mismatches",
                    report.hash_mismatches.len(),
                    report.id_gaps.len(),
                    report.balance_mismatches.len()
                );
            }
        }

        Commands::Summary {
            requester,
            since,
            until,
        } => {
            let mut filter = AuditFilter::all().between(since, until);
            if let Some(requester) = requester {
                filter = filter.with_requester(requester);
            }
            let summary = admin.summary(&filter)?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
    }

    Ok(())
}

/// Initialize logging with tracing; logs go to stderr so exports stay clean
fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("governance=info,ledger_core=info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

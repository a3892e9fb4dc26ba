//! Command-line surface.

use std::path::{Path, PathBuf};

use anyhow::Context;
use bytes::Bytes;
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use serde::de::DeserializeOwned;
use uuid::Uuid;

use crm_records::records::{RecordFilter, RecordKind};
use crm_records::service::{DocumentDetails, Upload};
use crm_records::settings::DEFAULT_SETTINGS_PATH;
use crm_records::{CrmServices, Outcome, RecordService};

#[derive(Parser, Debug)]
#[command(
    name = "crm-records",
    version,
    about = "Manage CRM leads, deals and documents"
)]
pub struct Cli {
    /// Settings file; missing files fall back to defaults.
    #[arg(long, env = "CRM_CONFIG", default_value = DEFAULT_SETTINGS_PATH)]
    pub config: PathBuf,

    /// Act as this user (overrides CRM_USER_ID).
    #[arg(long)]
    pub user: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Lead operations.
    Leads {
        #[command(subcommand)]
        action: RecordAction,
    },
    /// Deal operations.
    Deals {
        #[command(subcommand)]
        action: RecordAction,
    },
    /// Document operations, including file upload.
    Documents {
        #[command(subcommand)]
        action: DocumentAction,
    },
    /// Create the remote tables if they are missing.
    InitSchema,
}

#[derive(Subcommand, Debug)]
pub enum RecordAction {
    /// List records, newest first.
    List {
        /// Free-text search term.
        #[arg(long)]
        search: Option<String>,
        /// Filter as JSON, e.g. '{"stage":"proposal","minAmount":1000}'.
        #[arg(long)]
        filter: Option<String>,
    },
    /// Show one record.
    Get { id: Uuid },
    /// Create a record from JSON.
    Create {
        #[arg(long)]
        data: String,
    },
    /// Apply a partial JSON update.
    Update {
        id: Uuid,
        #[arg(long)]
        data: String,
    },
    /// Delete a record.
    Delete { id: Uuid },
    /// Aggregate statistics.
    Stats,
}

#[derive(Subcommand, Debug)]
pub enum DocumentAction {
    #[command(flatten)]
    Record(RecordAction),
    /// Upload a file and create its document record.
    Upload(UploadArgs),
    /// Print a signed download URL.
    Url {
        id: Uuid,
        /// URL lifetime in seconds.
        #[arg(long)]
        ttl: Option<u64>,
    },
}

#[derive(Args, Debug)]
pub struct UploadArgs {
    pub file: PathBuf,
    /// MIME type; guessed from the file name when omitted.
    #[arg(long)]
    pub content_type: Option<String>,
    /// Document fields as JSON (name, category, tags, related_to_type, ...).
    #[arg(long)]
    pub data: Option<String>,
}

fn parse_json<T: DeserializeOwned>(raw: &str, what: &str) -> anyhow::Result<T> {
    serde_json::from_str(raw).with_context(|| format!("invalid {what} JSON"))
}

fn envelope<T: Serialize>(outcome: Outcome<T>) -> anyhow::Result<serde_json::Value> {
    Ok(serde_json::to_value(outcome.into_envelope())?)
}

async fn run_record<K: RecordKind>(
    service: &RecordService<K>,
    action: RecordAction,
) -> anyhow::Result<serde_json::Value> {
    match action {
        RecordAction::List { search, filter } => {
            let mut filter: RecordFilter = match filter {
                Some(raw) => parse_json(&raw, "filter")?,
                None => RecordFilter::default(),
            };
            if search.is_some() {
                filter.search = search;
            }
            envelope(service.list(&filter).await)
        }
        RecordAction::Get { id } => envelope(service.get(id).await),
        RecordAction::Create { data } => {
            let draft: K::Draft = parse_json(&data, "record")?;
            envelope(service.create(draft).await)
        }
        RecordAction::Update { id, data } => {
            let patch: K::Patch = parse_json(&data, "update")?;
            envelope(service.update(id, &patch).await)
        }
        RecordAction::Delete { id } => envelope(service.delete(id).await),
        RecordAction::Stats => envelope(service.stats().await),
    }
}

fn file_name_of(path: &Path) -> anyhow::Result<String> {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(str::to_string)
        .with_context(|| format!("{} has no usable file name", path.display()))
}

/// Run one entity command and return its JSON envelope.
pub async fn execute(
    services: &CrmServices,
    command: Command,
) -> anyhow::Result<serde_json::Value> {
    match command {
        Command::Leads { action } => run_record(&services.leads, action).await,
        Command::Deals { action } => run_record(&services.deals, action).await,
        Command::Documents { action } => match action {
            DocumentAction::Record(RecordAction::Delete { id }) => {
                envelope(services.documents.delete(id).await)
            }
            DocumentAction::Record(action) => {
                run_record(services.documents.records(), action).await
            }
            DocumentAction::Upload(args) => {
                let bytes = tokio::fs::read(&args.file)
                    .await
                    .with_context(|| format!("failed to read {}", args.file.display()))?;
                let details: DocumentDetails = match args.data {
                    Some(raw) => parse_json(&raw, "document")?,
                    None => DocumentDetails::default(),
                };
                let upload = Upload {
                    file_name: file_name_of(&args.file)?,
                    content_type: args.content_type,
                    bytes: Bytes::from(bytes),
                };
                envelope(services.documents.upload(upload, details).await)
            }
            DocumentAction::Url { id, ttl } => {
                let ttl = ttl.map(std::time::Duration::from_secs);
                envelope(
                    services
                        .documents
                        .download_url(id, ttl)
                        .await
                        .map(|url| url.to_string()),
                )
            }
        },
        Command::InitSchema => anyhow::bail!("init-schema is handled before services start"),
    }
}

//! eCloud Administration CLI

mod args;
mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use ecloud_core::{CompoundDataSetId, VersionId};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "ecloud-admin")]
#[command(author = "eCloud Contributors")]
#[command(version = "0.1.0")]
#[command(about = "eCloud metadata and content store administration")]
struct Cli {
    /// Store directory
    #[arg(short, long, default_value = "./data/ecloud")]
    store: PathBuf,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create the store directory and its config file
    Init,

    /// Manage data providers
    #[command(subcommand)]
    Provider(ProviderCommand),

    /// Manage representations and their versions
    #[command(subcommand)]
    Representation(RepresentationCommand),

    /// Upload, download and delete files
    #[command(subcommand)]
    File(FileCommand),

    /// Tag versions with revisions and look them up
    #[command(subcommand)]
    Revision(RevisionCommand),

    /// Show or delete whole records
    #[command(subcommand)]
    Record(RecordCommand),

    /// Manage data sets and assignments
    #[command(subcommand)]
    Dataset(DatasetCommand),

    /// Search representation versions
    Search {
        #[arg(long)]
        provider: Option<String>,
        /// Data set as <provider>/<data set>
        #[arg(long, value_parser = args::parse_data_set_id)]
        data_set: Option<CompoundDataSetId>,
        #[arg(long)]
        name: Option<String>,
        /// RFC 3339 lower bound on the creation date
        #[arg(long)]
        from: Option<chrono::DateTime<chrono::Utc>>,
        /// RFC 3339 upper bound on the creation date
        #[arg(long)]
        to: Option<chrono::DateTime<chrono::Utc>>,
        #[arg(long)]
        persistent: Option<bool>,
        #[arg(long)]
        start_from: Option<String>,
        #[arg(long)]
        limit: Option<usize>,
    },
}

#[derive(Subcommand, Debug)]
enum ProviderCommand {
    Create {
        id: String,
        #[arg(long)]
        organisation_name: Option<String>,
        #[arg(long)]
        contact_person: Option<String>,
        #[arg(long)]
        remarks: Option<String>,
    },
    Show {
        id: String,
    },
    List {
        #[arg(long)]
        start_from: Option<String>,
        #[arg(long, default_value_t = 100)]
        limit: usize,
    },
    Delete {
        id: String,
    },
}

#[derive(Subcommand, Debug)]
enum RepresentationCommand {
    /// Create a new draft
    Create {
        cloud_id: String,
        name: String,
        provider: String,
    },
    /// Show one version, the latest by default
    Show {
        cloud_id: String,
        name: String,
        #[arg(long)]
        version: Option<VersionId>,
    },
    /// List all versions, most recent first
    Versions {
        cloud_id: String,
        name: String,
    },
    Persist {
        cloud_id: String,
        name: String,
        version: VersionId,
    },
    /// Copy a version into a new draft
    Copy {
        cloud_id: String,
        name: String,
        version: VersionId,
    },
    /// Delete one draft, or every version when no version is given
    Delete {
        cloud_id: String,
        name: String,
        #[arg(long)]
        version: Option<VersionId>,
    },
}

#[derive(Subcommand, Debug)]
enum FileCommand {
    Upload {
        cloud_id: String,
        name: String,
        version: VersionId,
        /// Local file to upload
        path: PathBuf,
        /// Defaults to the local file name
        #[arg(long)]
        file_name: Option<String>,
        #[arg(long, default_value = "application/octet-stream")]
        mime_type: String,
        /// Expected MD5 of the content
        #[arg(long)]
        md5: Option<String>,
        /// Keep the bytes in the database backend
        #[arg(long)]
        database: bool,
    },
    Download {
        cloud_id: String,
        name: String,
        version: VersionId,
        file_name: String,
        /// Write here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Range header, e.g. bytes=0-99
        #[arg(long)]
        range: Option<String>,
    },
    Delete {
        cloud_id: String,
        name: String,
        version: VersionId,
        file_name: String,
    },
}

#[derive(Subcommand, Debug)]
enum RevisionCommand {
    Add {
        cloud_id: String,
        name: String,
        version: VersionId,
        revision_provider: String,
        revision_name: String,
        /// Mark the revision as deleted
        #[arg(long)]
        deleted: bool,
    },
    /// Show a revision by its <provider>_<name> key
    Show {
        cloud_id: String,
        name: String,
        version: VersionId,
        revision_key: String,
    },
    Delete {
        cloud_id: String,
        name: String,
        version: VersionId,
        revision_provider: String,
        revision_name: String,
        /// RFC 3339 creation timestamp of the revision
        timestamp: chrono::DateTime<chrono::Utc>,
    },
    /// Find the version carrying a revision, the most recent one by default
    Find {
        cloud_id: String,
        name: String,
        revision_provider: String,
        revision_name: String,
        #[arg(long)]
        timestamp: Option<chrono::DateTime<chrono::Utc>>,
    },
}

#[derive(Subcommand, Debug)]
enum RecordCommand {
    Show { cloud_id: String },
    Delete { cloud_id: String },
}

#[derive(Subcommand, Debug)]
enum DatasetCommand {
    Create {
        provider: String,
        id: String,
        #[arg(long)]
        description: Option<String>,
    },
    /// Point a data set at a representation version (latest when omitted)
    Assign {
        provider: String,
        id: String,
        cloud_id: String,
        name: String,
        #[arg(long)]
        version: Option<VersionId>,
    },
    Unassign {
        provider: String,
        id: String,
        cloud_id: String,
        name: String,
    },
    /// List the representations a data set points at
    List {
        provider: String,
        id: String,
        #[arg(long)]
        start_from: Option<String>,
        #[arg(long)]
        limit: Option<usize>,
    },
    Delete {
        provider: String,
        id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let env_filter = if cli.debug {
        tracing_subscriber::EnvFilter::new("debug")
    } else {
        tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into())
    };
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(env_filter)
        .init();

    commands::run(&cli.store, cli.command).await
}

//! Larder CLI - Operate on a larder store from the command line

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use larder_storage::namespace::Namespace;
use larder_storage::{
    index, CancellationToken, QueryOptions, RedbStorage, Repository, StorageConfig, StorageError,
};

#[derive(Parser)]
#[command(name = "larder")]
#[command(about = "Bucket-namespaced key-value store", long_about = None)]
struct Cli {
    /// Store file (overrides the config file)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// JSON configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Register a content type (repeatable)
    #[arg(long = "content-type", global = true)]
    content_types: Vec<String>,

    /// Provision an extra bucket (repeatable)
    #[arg(long = "bucket", global = true)]
    buckets: Vec<String>,

    /// Log filter, used when RUST_LOG is unset
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a new store file from a snapshot
    Restore { snapshot: PathBuf, target: PathBuf },
    #[command(flatten)]
    Store(StoreCommand),
}

/// Commands that run against an open, provisioned store
#[derive(Subcommand)]
enum StoreCommand {
    /// Create the store and provision the schema
    Init,
    /// Print the value stored under a key
    Get { bucket: String, key: String },
    /// Store a value, creating the bucket if needed
    Put {
        bucket: String,
        key: String,
        value: String,
    },
    /// Remove a key
    Delete { bucket: String, key: String },
    /// Remove a whole bucket
    DropBucket { bucket: String },
    /// List buckets
    Buckets,
    /// Print one page of a bucket
    Query {
        bucket: String,
        /// Page size; negative means everything
        #[arg(short, long, default_value_t = -1, allow_hyphen_values = true)]
        count: i64,
        /// Page number
        #[arg(short, long, default_value_t = 0, allow_hyphen_values = true)]
        offset: i64,
        /// "asc" or "desc"; anything else is treated as "desc"
        #[arg(long, default_value = "desc")]
        order: String,
    },
    /// Allocate the next id from a bucket's sequence
    NextSeq { bucket: String },
    /// Write a snapshot of the whole store (Ctrl-C cancels)
    Backup {
        /// Output file; defaults to the suggested snapshot name
        output: Option<PathBuf>,
    },
    /// Work with index namespaces
    #[command(subcommand)]
    Index(IndexCommand),
}

#[derive(Subcommand)]
enum IndexCommand {
    Get { namespace: String, key: String },
    /// Store a JSON value
    Set {
        namespace: String,
        key: String,
        value: String,
    },
    Delete { namespace: String, key: String },
    Drop { namespace: String },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .with(filter)
        .init();
}

fn load_config(cli: &Cli) -> Result<StorageConfig> {
    let mut config = match &cli.config {
        Some(path) => StorageConfig::from_json_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => StorageConfig::default(),
    };

    if let Some(db) = &cli.db {
        config.path = db.clone();
    }
    config.schema.content_types.extend(cli.content_types.iter().cloned());
    config.schema.buckets.extend(cli.buckets.iter().cloned());
    Ok(config)
}

async fn run(cli: Cli) -> Result<()> {
    let config = load_config(&cli)?;

    let command = match cli.command {
        Commands::Restore { snapshot, target } => return cmd_restore(&snapshot, &target),
        Commands::Store(command) => command,
    };

    let storage: Box<dyn Repository> = Box::new(
        RedbStorage::open(&config.path)
            .with_context(|| format!("Failed to open store {}", config.path.display()))?,
    );

    // no point serving anything on a half-provisioned store
    storage
        .init_schema(&config.schema)
        .context("Couldn't initialize store with buckets")?;

    let result = execute(storage.as_ref(), command).await;
    storage.close().context("Failed to close store")?;
    result
}

async fn execute(storage: &dyn Repository, command: StoreCommand) -> Result<()> {
    match command {
        StoreCommand::Init => {
            info!(buckets = storage.buckets()?.len(), "store ready");
        }
        StoreCommand::Get { bucket, key } => match storage.get(&bucket, key.as_bytes())? {
            Some(value) => println!("{}", String::from_utf8_lossy(&value)),
            None => warn!(bucket = %bucket, key = %key, "no value"),
        },
        StoreCommand::Put { bucket, key, value } => {
            storage.update(&bucket, key.as_bytes(), value.as_bytes())?;
        }
        StoreCommand::Delete { bucket, key } => storage.delete(&bucket, key.as_bytes())?,
        StoreCommand::DropBucket { bucket } => storage.delete_bucket(&bucket)?,
        StoreCommand::Buckets => {
            for name in storage.buckets()? {
                println!("{:<8} {}", Namespace::classify(&name).kind(), name);
            }
        }
        StoreCommand::Query {
            bucket,
            count,
            offset,
            order,
        } => {
            let opts = QueryOptions::page(count, offset).order(order.as_str());
            let page = storage.query(&bucket, &opts)?;
            println!("total: {}", page.total);
            for item in page.items {
                println!("{}", String::from_utf8_lossy(&item));
            }
        }
        StoreCommand::NextSeq { bucket } => println!("{}", storage.next_sequence(&bucket)?),
        StoreCommand::Backup { output } => cmd_backup(storage, output).await?,
        StoreCommand::Index(cmd) => cmd_index(storage, cmd)?,
    }
    Ok(())
}

async fn cmd_backup(storage: &dyn Repository, output: Option<PathBuf>) -> Result<()> {
    let output = output.unwrap_or_else(|| {
        PathBuf::from(format!("system-{}.db.bak", chrono::Utc::now().timestamp()))
    });
    let file = fs::File::create(&output)
        .with_context(|| format!("Failed to create {}", output.display()))?;

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    let signal_task = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_signal.cancel();
        }
    });

    let result = storage.backup(&cancel, Box::new(file)).await;
    signal_task.abort();

    match result {
        Ok(()) => {
            info!(path = %output.display(), "backup written");
            Ok(())
        }
        Err(StorageError::Cancelled) => {
            // whatever made it to disk is truncated
            let _ = fs::remove_file(&output);
            warn!(path = %output.display(), "backup cancelled, partial file removed");
            Err(StorageError::Cancelled.into())
        }
        Err(e) => {
            let _ = fs::remove_file(&output);
            Err(e).context("Backup failed")
        }
    }
}

fn cmd_restore(snapshot: &Path, target: &Path) -> Result<()> {
    let reader = fs::File::open(snapshot)
        .with_context(|| format!("Failed to open {}", snapshot.display()))?;
    let restored = RedbStorage::restore(target, std::io::BufReader::new(reader))
        .with_context(|| format!("Failed to restore into {}", target.display()))?;

    let buckets = restored.buckets()?;
    info!(buckets = buckets.len(), path = %target.display(), "store restored");
    Box::new(restored).close()?;
    Ok(())
}

fn cmd_index(storage: &dyn Repository, cmd: IndexCommand) -> Result<()> {
    match cmd {
        IndexCommand::Get { namespace, key } => {
            match index::get_index(storage, &namespace, &key)? {
                Some(value) => println!("{}", String::from_utf8_lossy(&value)),
                None => warn!(namespace = %namespace, key = %key, "no index entry"),
            }
        }
        IndexCommand::Set {
            namespace,
            key,
            value,
        } => {
            let value: serde_json::Value =
                serde_json::from_str(&value).context("Index value must be valid JSON")?;
            index::set_index(storage, &namespace, &key, &value)?;
        }
        IndexCommand::Delete { namespace, key } => index::delete_index(storage, &namespace, &key)?,
        IndexCommand::Drop { namespace } => index::drop_index(storage, &namespace)?,
    }
    Ok(())
}

//! Locker - store, copy, and move uploads across storage backends

use anyhow::{Context, Result, anyhow};
use clap::{Args as ClapArgs, Parser, Subcommand};
use futures::StreamExt;
use locker_core::{
    Locator, MetadataResultExt, Storage, StorageOptions, StorageRegistry, Upload, canonical_name,
    copy,
};
use locker_storage::register_all;
use locker_upload::{FileUpload, UriUpload};
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod config;

use config::Config;

/// Locker - file attachment storage
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "config/locker.toml")]
    config: String,

    /// Log level or EnvFilter directive (RUST_LOG takes precedence)
    #[arg(long, env = "LOCKER_LOG")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List configured storages
    Storages,
    /// Store a local file
    Put {
        file: PathBuf,
        #[command(flatten)]
        target: TargetArgs,
        /// Content type recorded with the object (guessed if omitted)
        #[arg(long)]
        content_type: Option<String>,
    },
    /// Fetch a URL and store the response body
    Fetch {
        url: String,
        #[command(flatten)]
        target: TargetArgs,
        /// Fetch timeout in seconds
        #[arg(long, default_value_t = 30)]
        timeout: u64,
    },
    /// Write an object's contents to stdout
    Cat { locator: String },
    /// Copy an object into another storage
    Copy {
        locator: String,
        #[command(flatten)]
        target: TargetArgs,
    },
    /// Copy an object into another storage, then delete the source
    Mv {
        locator: String,
        #[command(flatten)]
        target: TargetArgs,
    },
    /// Delete an object
    Rm { locator: String },
    /// Print an object's URL
    Url { locator: String },
    /// Print an object's local filesystem path
    Path { locator: String },
}

#[derive(ClapArgs, Debug)]
struct TargetArgs {
    /// Destination storage name
    #[arg(short, long = "to", visible_alias = "storage", default_value = "Disk")]
    storage: String,
    /// Key prefix
    #[arg(long)]
    prefix: Option<String>,
    /// Name used instead of the source name when deriving the key
    #[arg(long)]
    name: Option<String>,
    /// Overwrite an existing object
    #[arg(long)]
    force: bool,
}

impl TargetArgs {
    fn options(&self) -> StorageOptions {
        StorageOptions {
            prefix: self.prefix.clone(),
            name: self.name.clone(),
            force: self.force,
            ..Default::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = Config::load(&args.config)?;

    let level = args.log_level.as_deref().unwrap_or(&config.logging.level);
    init_logging(level, &config.logging.format);

    debug!("Starting Locker v{}", env!("CARGO_PKG_VERSION"));

    let registry = StorageRegistry::global();
    register_all(&config.storages, registry)
        .await
        .context("Failed to initialize storages")?;

    run(args.command, registry).await
}

async fn run(command: Command, registry: &StorageRegistry) -> Result<()> {
    match command {
        Command::Storages => {
            for name in registry.names() {
                println!("{}", name);
            }
        }
        Command::Put {
            file,
            target,
            content_type,
        } => {
            let content_type = content_type.or_else(|| {
                mime_guess::from_path(&file)
                    .first()
                    .map(|mime| mime.to_string())
            });
            let mut upload = FileUpload::from_path(&file);
            let mut options = target.options();
            if let Some(content_type) = &content_type {
                upload = upload.with_content_type(content_type);
                options = options.with_extra("content_type", content_type.as_str());
            }

            let mut locator = store(registry, &upload, &target.storage, &options).await?;
            if let Some(content_type) = content_type {
                locator = locator.add_metadata("content_type", content_type);
            }
            print_locator(&locator)?;
        }
        Command::Fetch {
            url,
            target,
            timeout,
        } => {
            let upload = UriUpload::new(&url)?.with_timeout(Duration::from_secs(timeout));
            let locator = store(registry, &upload, &target.storage, &target.options())
                .await
                .add_metadata("source_url", url)?;
            print_locator(&locator)?;
        }
        Command::Cat { locator } => {
            let locator = parse_locator(&locator)?;
            let mut stream = locator.stream().await?;
            let mut stdout = tokio::io::stdout();
            while let Some(chunk) = stream.next().await {
                stdout.write_all(&chunk?).await?;
            }
            stdout.flush().await?;
        }
        Command::Copy { locator, target } => {
            let locator = parse_locator(&locator)?;
            let copied = transfer(registry, &locator, &target).await?;
            print_locator(&copied)?;
        }
        Command::Mv { locator, target } => {
            let locator = parse_locator(&locator)?;
            let moved = transfer(registry, &locator, &target).await?;
            locator.delete(&StorageOptions::default()).await?;
            info!("Moved {} to {}", locator.id(), moved.storage().identity());
            print_locator(&moved)?;
        }
        Command::Rm { locator } => {
            let locator = parse_locator(&locator)?;
            locator.delete(&StorageOptions::default()).await?;
            info!("Deleted {} from {}", locator.id(), locator.storage().identity());
        }
        Command::Url { locator } => {
            let locator = parse_locator(&locator)?;
            let url = locator
                .url(&StorageOptions::default())
                .ok_or_else(|| anyhow!("{} has no URL", locator.storage().identity()))?;
            println!("{}", url);
        }
        Command::Path { locator } => {
            let locator = parse_locator(&locator)?;
            let path = locator
                .path()
                .ok_or_else(|| anyhow!("{} has no local path", locator.storage().identity()))?;
            println!("{}", path.display());
        }
    }
    Ok(())
}

/// Put `upload` into the named storage and record its name
async fn store(
    registry: &StorageRegistry,
    upload: &dyn Upload,
    storage: &str,
    options: &StorageOptions,
) -> Result<Locator, locker_core::StorageError> {
    let storage = registry.get(storage)?;
    let id = storage.put(upload, options).await?;
    info!("Stored {} as {} in {}", upload.name(), id, storage.name());
    Ok(Locator::new(id, storage)?.add_metadata("name", upload.name()))
}

/// Copy across storages, or duplicate within one
async fn transfer(
    registry: &StorageRegistry,
    locator: &Locator,
    target: &TargetArgs,
) -> Result<Locator> {
    let options = target.options();
    if locator.storage().identity() != canonical_name(&target.storage) {
        return Ok(copy(locator, target.storage.as_str(), &options).await?);
    }

    let storage = registry.get(&target.storage)?;
    let id = storage.duplicate(locator.id(), &options).await?;
    Ok(Locator::new(id, storage)?.merge_metadata(locator.metadata().clone()))
}

fn parse_locator(input: &str) -> Result<Locator> {
    serde_json::from_str(input).with_context(|| format!("Invalid locator: {}", input))
}

fn print_locator(locator: &Locator) -> Result<()> {
    println!("{}", serde_json::to_string(locator)?);
    Ok(())
}

/// Initialize logging on stderr; stdout carries command output
fn init_logging(level: &str, format: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let registry = tracing_subscriber::registry().with(filter);
    if format == "json" {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry.with(fmt::layer().with_writer(std::io::stderr)).init();
    }
}

use anyhow::{Context, Result};
use cardvault::{
    ArchiveConfig, ArchiveRecord, ArchiveService, CollectionKey, ItemType, PolicyResolver,
    SnapshotManager, SystemClock, archive::archive_store,
};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{Level, event};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "cardvault")]
#[command(about = "Inspect and maintain the card collection archive")]
struct Cli {
    /// Archive store snapshot file, created on first mutation
    #[arg(long)]
    store: PathBuf,
    /// JSON archive configuration
    #[arg(long)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List archive records, newest first
    List {
        #[arg(long)]
        collection: CollectionKey,
        #[arg(long)]
        item_type: Option<ItemType>,
    },
    /// Run retention GC
    Gc {
        #[arg(long)]
        item_type: Option<ItemType>,
    },
    /// Permanently delete records
    Purge {
        #[arg(long)]
        collection: CollectionKey,
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Mark records as favorites, exempting them from GC
    Favorite {
        #[arg(long)]
        collection: CollectionKey,
        #[arg(long)]
        unset: bool,
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Show the resolved retention policy
    Policy {
        #[arg(long)]
        collection: CollectionKey,
        #[arg(long)]
        item_type: ItemType,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => ArchiveConfig::from_path(path)
            .with_context(|| format!("Failed to load config '{}'", path.display()))?,
        None => ArchiveConfig::default(),
    };

    let snapshots = SnapshotManager::new(&cli.store);
    let store = Arc::new(archive_store());
    if let Some(snapshot) = snapshots
        .load::<ArchiveRecord>()
        .with_context(|| format!("Failed to read store '{}'", cli.store.display()))?
    {
        store.restore(snapshot).await;
        for key in CollectionKey::ALL {
            if !store.collection_exists(key.as_str()).await {
                store.create_collection(key.as_str()).await?;
            }
        }
    }

    let service = ArchiveService::new(
        store.clone(),
        Arc::new(PolicyResolver::from_config(&config)),
        Arc::new(SystemClock),
    );

    let mutated = run(&service, cli.command).await?;
    if mutated {
        snapshots
            .save(&store.snapshot().await)
            .with_context(|| format!("Failed to write store '{}'", cli.store.display()))?;
        event!(Level::DEBUG, path = %cli.store.display(), "store saved");
    }
    Ok(())
}

/// Returns whether the store changed.
async fn run(service: &ArchiveService, command: Command) -> Result<bool> {
    match command {
        Command::List {
            collection,
            item_type,
        } => {
            let mut records = service.fetch_all_metadata(collection).await?;
            records.retain(|meta| item_type.is_none_or(|wanted| meta.item_type == wanted));
            records.sort_by(|a, b| b.archived_at.cmp(&a.archived_at));
            for meta in &records {
                println!(
                    "{}  {:<5} {:<24} {}{}{}",
                    meta.archive_id,
                    meta.item_type,
                    meta.item_id,
                    meta.archived_at.to_rfc3339(),
                    if meta.is_favorite { "  [fav]" } else { "" },
                    if meta.is_manual { "  [manual]" } else { "" },
                );
            }
            println!("{} record(s)", records.len());
            Ok(false)
        }
        Command::Gc { item_type } => {
            let reports = match item_type {
                Some(item_type) => vec![service.run_garbage_collection(item_type).await?],
                None => service.run_garbage_collection_all().await?,
            };
            let mut purged = 0;
            for report in &reports {
                println!(
                    "{}: trash expired={} overflow={}, history expired={} overflow={}",
                    report.item_type,
                    report.trash.expired,
                    report.trash.overflow,
                    report.history.expired,
                    report.history.overflow
                );
                purged += report.total();
            }
            Ok(purged > 0)
        }
        Command::Purge { collection, ids } => {
            let purged = service.delete_by_ids(&ids, collection).await?;
            println!("purged {} record(s)", purged);
            Ok(purged > 0)
        }
        Command::Favorite {
            collection,
            unset,
            ids,
        } => {
            let updated = service.set_favorite(&ids, collection, !unset).await?;
            println!("updated {} record(s)", updated);
            Ok(updated > 0)
        }
        Command::Policy {
            collection,
            item_type,
        } => {
            let policy = service.policies().policy_for(collection, item_type)?;
            println!(
                "{}/{}: timeLimit={} days, maxSize={}",
                collection, item_type, policy.time_limit_days, policy.max_size
            );
            Ok(false)
        }
    }
}

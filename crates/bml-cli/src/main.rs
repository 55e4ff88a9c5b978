use anyhow::Result;
use bml_core::{ItemId, PriorityKey, WorkflowStage};
use bml_ordering::{Command, OrderingEngine};
use bml_storage::FileTagStore;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing::debug;
use tracing_subscriber::EnvFilter;

mod backlog;
mod config;
mod lock;

use backlog::{read_slot_map, Backlog};
use config::BmlContext;
use lock::CollectionLock;

#[derive(Parser, Debug)]
#[command(name = "bml")]
#[command(about = "Tree-priority backlog ordering over a tag store", long_about = None)]
struct Cli {
    /// Collection (repository) to operate on
    #[arg(long, global = true)]
    collection: Option<String>,
    /// Path of the JSON tag store
    #[arg(long, global = true)]
    store: Option<PathBuf>,
    #[arg(long, global = true)]
    json: bool,
    #[arg(long, global = true)]
    debug: bool,
    #[command(subcommand)]
    command: BmlCommand,
}

#[derive(Subcommand, Debug)]
#[command(rename_all = "kebab-case")]
enum BmlCommand {
    /// List items in backlog order
    List(ListArgs),
    Show(ShowArgs),
    Item {
        #[command(subcommand)]
        action: ItemCommand,
    },
    Priority {
        #[command(subcommand)]
        action: PriorityCommand,
    },
    #[command(alias = "stage")]
    Status {
        #[command(subcommand)]
        action: StatusCommand,
    },
    Move {
        #[command(subcommand)]
        action: MoveCommand,
    },
    /// Copy the parent item's status onto an item
    Propagate(ShowArgs),
    /// Push statuses down a subtree, parents first
    SyncTree(SyncTreeArgs),
    /// Rewrite every priority and status from a board slot map
    Resync(ResyncArgs),
}

#[derive(Subcommand, Debug)]
enum ItemCommand {
    Add(ItemAddArgs),
}

#[derive(Subcommand, Debug)]
enum PriorityCommand {
    Set(PrioritySetArgs),
}

#[derive(Subcommand, Debug)]
enum StatusCommand {
    Set(StatusSetArgs),
    /// Move to the next workflow status
    Advance(ShowArgs),
}

#[derive(Subcommand, Debug)]
enum MoveCommand {
    Above(MoveTargetArgs),
    Below(MoveTargetArgs),
    Between(MoveBetweenArgs),
}

#[derive(Args, Debug)]
struct ListArgs {
    /// Group by workflow stage
    #[arg(long)]
    lanes: bool,
}

#[derive(Args, Debug)]
struct ShowArgs {
    item: ItemId,
}

#[derive(Args, Debug)]
struct ItemAddArgs {
    #[arg(required = true)]
    items: Vec<ItemId>,
}

#[derive(Args, Debug)]
struct PrioritySetArgs {
    item: ItemId,
    key: PriorityKey,
    /// Inherit the status of the item holding the parent key
    #[arg(long)]
    inherit: bool,
}

#[derive(Args, Debug)]
struct StatusSetArgs {
    item: ItemId,
    stage: WorkflowStage,
}

#[derive(Args, Debug)]
struct MoveTargetArgs {
    item: ItemId,
    target: ItemId,
}

#[derive(Args, Debug)]
struct MoveBetweenArgs {
    item: ItemId,
    above: ItemId,
    below: ItemId,
}

#[derive(Args, Debug)]
struct SyncTreeArgs {
    root: PriorityKey,
}

#[derive(Args, Debug)]
struct ResyncArgs {
    /// Slot map JSON file, or `-` for stdin
    #[arg(long)]
    slot_map: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.debug);

    let ctx = BmlContext::new(std::env::current_dir()?);
    let collection = ctx.resolve_collection(cli.collection.as_deref());
    let store_path = ctx.resolve_store_path(cli.store.as_deref());
    debug!(
        event = "cli_context",
        collection = %collection,
        store = %store_path.display()
    );

    let backlog = Backlog {
        engine: OrderingEngine::new(FileTagStore::open(store_path), ctx.engine_config()),
        collection,
        json: cli.json,
    };

    let command = match cli.command {
        BmlCommand::List(args) => return backlog.list(args.lanes).await,
        BmlCommand::Show(args) => return backlog.show(&args.item).await,
        BmlCommand::Item {
            action: ItemCommand::Add(args),
        } => {
            let _lock = lock_collection(&ctx, &backlog.collection)?;
            return finish(backlog.add_items(args.items).await?);
        }
        BmlCommand::Priority {
            action: PriorityCommand::Set(args),
        } => Command::SetPriority {
            item: args.item,
            key: args.key,
            inherit: args.inherit,
        },
        BmlCommand::Status { action } => match action {
            StatusCommand::Set(args) => Command::SetStage {
                item: args.item,
                stage: args.stage,
            },
            StatusCommand::Advance(args) => Command::AdvanceStage { item: args.item },
        },
        BmlCommand::Move { action } => match action {
            MoveCommand::Above(args) => Command::MoveAbove {
                item: args.item,
                target: args.target,
            },
            MoveCommand::Below(args) => Command::MoveBelow {
                item: args.item,
                target: args.target,
            },
            MoveCommand::Between(args) => Command::MoveBetween {
                item: args.item,
                above: args.above,
                below: args.below,
            },
        },
        BmlCommand::Propagate(args) => Command::Propagate { item: args.item },
        BmlCommand::SyncTree(args) => Command::SyncSubtree { root: args.root },
        BmlCommand::Resync(args) => Command::Resync {
            slot_map: read_slot_map(&args.slot_map)?,
        },
    };

    let _lock = lock_collection(&ctx, &backlog.collection)?;
    finish(backlog.run(command).await?)
}

fn lock_collection(ctx: &BmlContext, collection: &str) -> Result<CollectionLock> {
    let lock = CollectionLock::acquire(&ctx.paths.locks_dir, collection)?;
    debug!(event = "collection_locked", path = %lock.path().display());
    Ok(lock)
}

fn finish(success: bool) -> Result<()> {
    if !success {
        std::process::exit(1);
    }
    Ok(())
}

fn init_logging(debug: bool) {
    let level = if let Ok(level) = std::env::var("BML_LOG_LEVEL") {
        level
    } else if debug {
        "debug".to_string()
    } else {
        "warn".to_string()
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

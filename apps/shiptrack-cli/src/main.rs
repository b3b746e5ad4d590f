use clap::{Args, Parser, Subcommand};
use shiptrack_common::{AssetFields, TxId};
use shiptrack_persist::StateStore;
use shiptrack_registry::{AssetRegistry, RegistryError, TxContext};
use shiptrack_state::MemoryWorldState;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "shiptrack-cli", about = "Run shiptrack registry transactions against a local store")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Directory holding the persisted world state
    #[arg(short, long, default_value = "./shiptrack_data")]
    data_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the genesis shipment records
    Init,
    /// Register a new shipment
    Create {
        id: String,
        #[command(flatten)]
        fields: FieldArgs,
    },
    /// Print one shipment record
    Read { id: String },
    /// Replace the sensor readings of a shipment
    Update {
        id: String,
        #[command(flatten)]
        fields: FieldArgs,
    },
    /// Remove a shipment
    Delete { id: String },
    /// Report whether a shipment exists
    Exists { id: String },
    /// Hand a shipment to a new owner
    Transfer { id: String, new_owner: String },
    /// Print every shipment, optionally limited to a key range
    List {
        /// Inclusive lower key bound
        #[arg(long, default_value = "")]
        start: String,
        /// Exclusive upper key bound
        #[arg(long, default_value = "")]
        end: String,
    },
    /// Compact the mutation log into a snapshot
    Snapshot,
    /// Check the integrity manifest against the files on disk
    Verify,
}

#[derive(Args)]
struct FieldArgs {
    #[arg(long, allow_negative_numbers = true)]
    temperature: i64,
    #[arg(long, allow_negative_numbers = true)]
    humidity: i64,
    #[arg(long, allow_negative_numbers = true)]
    vibration: i64,
    /// Record a shock event
    #[arg(long)]
    shock: bool,
    #[arg(long, allow_negative_numbers = true)]
    location: f64,
}

impl From<FieldArgs> for AssetFields {
    fn from(args: FieldArgs) -> Self {
        Self {
            temperature: args.temperature,
            humidity: args.humidity,
            vibration: args.vibration,
            shock: args.shock,
            location: args.location,
        }
    }
}

/// Run `op` as one transaction: load the state, apply the operation, and
/// persist its mutations only if it succeeded.
fn run_tx<T>(
    store: &mut StateStore,
    op: impl FnOnce(&AssetRegistry, &mut TxContext<'_, MemoryWorldState>) -> Result<T, RegistryError>,
) -> anyhow::Result<T> {
    let mut state = store.load_latest()?;
    let tx_id = TxId::new();
    let result = {
        let mut ctx = TxContext::with_tx_id(tx_id, &mut state);
        op(&AssetRegistry::new(), &mut ctx)
    };
    match result {
        Ok(value) => {
            store.append_events(&state.drain_events())?;
            Ok(value)
        }
        Err(e) => {
            tracing::warn!(%tx_id, error = %e, "transaction aborted");
            Err(e.into())
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    let mut store = StateStore::open(&cli.data_dir)?;

    match cli.command {
        Commands::Init => {
            run_tx(&mut store, |r, ctx| r.init_ledger(ctx))?;
            println!("ledger initialized");
        }
        Commands::Create { id, fields } => {
            run_tx(&mut store, |r, ctx| r.create_asset(ctx, &id, fields.into()))?;
            println!("created {id}");
        }
        Commands::Read { id } => {
            let asset = run_tx(&mut store, |r, ctx| r.read_asset(ctx, &id))?;
            println!("{}", serde_json::to_string_pretty(&asset)?);
        }
        Commands::Update { id, fields } => {
            run_tx(&mut store, |r, ctx| r.update_asset(ctx, &id, fields.into()))?;
            println!("updated {id}");
        }
        Commands::Delete { id } => {
            run_tx(&mut store, |r, ctx| r.delete_asset(ctx, &id))?;
            println!("deleted {id}");
        }
        Commands::Exists { id } => {
            let exists = run_tx(&mut store, |r, ctx| r.asset_exists(ctx, &id))?;
            println!("{exists}");
        }
        Commands::Transfer { id, new_owner } => {
            run_tx(&mut store, |r, ctx| r.transfer_asset(ctx, &id, &new_owner))?;
            println!("transferred {id} to {new_owner}");
        }
        Commands::List { start, end } => {
            let assets = run_tx(&mut store, |r, ctx| r.get_assets_by_range(ctx, &start, &end))?;
            println!("{}", serde_json::to_string_pretty(&assets)?);
        }
        Commands::Snapshot => {
            let state = store.load_latest()?;
            store.take_snapshot(&state)?;
            println!(
                "snapshot {} written: keys={}, hash={:#x}",
                store.meta().snapshot_count,
                state.len(),
                state.state_hash()
            );
        }
        Commands::Verify => {
            store.verify_integrity()?;
            println!(
                "integrity OK: snapshots={}, segments={}",
                store.meta().snapshot_count,
                store.meta().event_segment_count
            );
        }
    }

    Ok(())
}

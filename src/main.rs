use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use clipsync::clipboard::{self, ClipboardBackend, ClipboardWatcher};
use clipsync::logging;
use clipsync::models::{ClipItem, find_by_id_prefix};
use clipsync::relay::Relay;
use clipsync::storage::{
    ClipStore, Config, ConfigStorage, LocalStore, TomlConfigStorage, ensure_directories,
};
use clipsync::sync::SyncConsumer;

#[derive(Parser)]
#[command(name = "clipsync")]
#[command(about = "Mirror clipboard text into a clip list", long_about = None)]
struct Cli {
    /// Config file (default: $XDG_CONFIG_HOME/clipsync/clipsync.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch the clipboard and record new text (default)
    Watch {
        /// Override watcher.poll_interval_ms
        #[arg(long)]
        interval_ms: Option<u64>,

        /// Print every clipboard change to stdout
        #[arg(long)]
        print: bool,

        /// Only watch; do not record anything in the clip list
        #[arg(long)]
        no_sync: bool,
    },

    /// Show recorded clips, newest first
    List {
        /// Number of entries to show (default: 10)
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// Copy a recorded clip back to the clipboard
    Copy {
        /// Clip id or unique id prefix, as shown by `list`
        id: String,
    },

    /// Delete a recorded clip
    Delete {
        /// Clip id or unique id prefix, as shown by `list`
        id: String,
    },

    /// Show clip list statistics
    Stats,
}

/// Configuration and paths shared by every command
struct Session {
    config: Config,
    data_dir: PathBuf,
}

impl Session {
    fn load(config_path: Option<PathBuf>) -> Result<Self> {
        let (data_dir, config_dir) = ensure_directories()?;
        let config_path = config_path.unwrap_or_else(|| config_dir.join("clipsync.toml"));
        let created = !config_path.exists();
        let config = TomlConfigStorage::new(config_path.clone()).load()?;

        logging::init(
            &data_dir.join("clipsync.log"),
            &config.logging.file_level,
            &config.logging.stderr_level,
        );

        // Config is loaded before the logger exists
        if created {
            log::info!("Created default configuration at {:?}", config_path);
        }
        log::info!("Using configuration {:?}: {}", config_path, config);
        log::debug!("Data directory: {:?}", data_dir);

        Ok(Session { config, data_dir })
    }

    fn owner_id(&self) -> &str {
        &self.config.account.owner_id
    }

    fn store_path(&self) -> PathBuf {
        self.data_dir.join("clips.bin")
    }

    fn open_store(&self) -> Result<LocalStore> {
        if !self.config.store.persist {
            log::warn!("store.persist is disabled; clips are not kept between runs");
            return Ok(LocalStore::in_memory());
        }

        let path = self.store_path();
        LocalStore::open(path.clone()).with_context(|| format!("Failed to open clip list {:?}", path))
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let session = Session::load(cli.config)?;

    let command = cli.command.unwrap_or(Commands::Watch {
        interval_ms: None,
        print: false,
        no_sync: false,
    });

    match command {
        Commands::Watch {
            interval_ms,
            print,
            no_sync,
        } => cmd_watch(&session, interval_ms, print, no_sync),
        Commands::List { limit } => cmd_list(&session, limit),
        Commands::Copy { id } => cmd_copy(&session, &id),
        Commands::Delete { id } => cmd_delete(&session, &id),
        Commands::Stats => cmd_stats(&session),
    }
}

/// Poll the clipboard until the process is terminated
fn cmd_watch(session: &Session, interval_ms: Option<u64>, print: bool, no_sync: bool) -> Result<()> {
    let interval = match interval_ms {
        Some(0) => bail!("--interval-ms must be greater than zero"),
        Some(ms) => Duration::from_millis(ms),
        None => session.config.watcher.poll_interval(),
    };

    let backend = clipboard::create_backend(session.config.watcher.backend)?;
    let relay = Relay::new();
    let bridge = relay.bridge();

    let consumer = if no_sync {
        None
    } else {
        let store: Arc<dyn ClipStore> = Arc::new(session.open_store()?);
        let consumer = SyncConsumer::attach(&bridge, store, session.owner_id())
            .context("Failed to open clip list")?;
        Some(consumer)
    };

    let printer = print.then(|| bridge.subscribe(|event| println!("{}", event.text())));

    let watcher = ClipboardWatcher::new(backend, relay);
    println!(
        "Watching clipboard via {} every {}ms. Press Ctrl-C to stop.",
        watcher.backend_name(),
        interval.as_millis()
    );

    let handle = watcher.start(interval)?;
    let watcher = handle.join()?;
    log::debug!("Final clipboard snapshot: {} bytes", watcher.snapshot().len());

    if let Some(printer) = printer {
        printer.unsubscribe();
    }
    if let Some(consumer) = consumer {
        consumer.detach();
    }

    Ok(())
}

/// Show the owner's clips
fn cmd_list(session: &Session, limit: usize) -> Result<()> {
    let store = session.open_store()?;
    let items = store.items(session.owner_id())?;

    println!(
        "Clips for '{}' (showing up to {}):",
        session.owner_id(),
        limit
    );
    println!("{}", "=".repeat(60));

    for (i, item) in items.iter().take(limit).enumerate() {
        println!(
            "{:3}. {}  {}  {}",
            i + 1,
            item.id.short(),
            format_time(item.created_at),
            item.preview(50)
        );
    }

    if items.is_empty() {
        println!("(empty - nothing copied yet)");
    }

    Ok(())
}

/// Write a stored clip back to the clipboard
fn cmd_copy(session: &Session, query: &str) -> Result<()> {
    let store = session.open_store()?;
    let item = resolve(&store.items(session.owner_id())?, query)?;

    let backend = clipboard::create_backend(session.config.watcher.backend)?;
    backend
        .write_text(&item.text)
        .with_context(|| format!("Failed to copy clip {} via {}", item.id.short(), backend.name()))?;

    log::info!("Copied clip {} to clipboard", item.id);
    println!("Copied: {}", item.preview(50));
    Ok(())
}

/// Remove a stored clip
fn cmd_delete(session: &Session, query: &str) -> Result<()> {
    let store = session.open_store()?;
    let item = resolve(&store.items(session.owner_id())?, query)?;

    if !store.remove(&item.id)? {
        bail!("Clip {} was already deleted", item.id.short());
    }

    log::info!("Deleted clip {}", item.id);
    println!("Deleted: {}", item.preview(50));
    Ok(())
}

/// Show clip list statistics
fn cmd_stats(session: &Session) -> Result<()> {
    let store = session.open_store()?;
    let items = store.items(session.owner_id())?;
    let total_bytes: usize = items.iter().map(|item| item.text.len()).sum();

    println!("Clip List Statistics");
    println!("====================");
    println!("Owner: {}", session.owner_id());
    println!("Clips: {}", items.len());
    println!("  Text size: {} bytes", total_bytes);
    if let (Some(newest), Some(oldest)) = (items.first(), items.last()) {
        println!("  Newest: {}", format_time(newest.created_at));
        println!("  Oldest: {}", format_time(oldest.created_at));
    }
    println!("Clips (all owners): {}", store.len());
    if session.config.store.persist {
        println!("Store: {:?}", session.store_path());
    } else {
        println!("Store: in memory (store.persist = false)");
    }
    println!(
        "Poll interval: {}ms",
        session.config.watcher.poll_interval_ms
    );

    Ok(())
}

/// Find the single clip whose id starts with `query`
fn resolve(items: &[ClipItem], query: &str) -> Result<ClipItem> {
    Ok(find_by_id_prefix(items, query)?.clone())
}

fn format_time(time: SystemTime) -> String {
    chrono::DateTime::<chrono::Local>::from(time)
        .format("%Y-%m-%d %H:%M:%S")
        .to_string()
}

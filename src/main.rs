use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tunedex::dupes::{DuplicateResolver, ProposedAction, ResolutionPolicy};
use tunedex::export::ExportSource;
use tunedex::model::AnalysisStatus;
use tunedex::store::human_size;
use tunedex::{CancelToken, LibraryConfig, MetadataStore, Reconciler};

#[derive(Parser, Debug)]
#[command(name = "tunedex")]
#[command(about = "Analyze a music collection and keep its metadata consistent", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Verbose logging
    #[arg(short = 'v', long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Walk the library roots, fingerprint and analyze changed files
    Scan {
        /// Root directory to walk (can be specified multiple times)
        #[arg(short = 'r', long = "root", required = true)]
        roots: Vec<String>,

        /// Store snapshot location
        #[arg(short = 's', long, default_value = "~/.local/share/tunedex/store.json")]
        store: String,

        /// Worker threads (0 = all cores)
        #[arg(long, default_value = "0")]
        threads: usize,

        /// Re-analyze everything, overwriting existing results
        #[arg(long)]
        force: bool,

        /// Minimum BPM for tempo detection (default: 70)
        #[arg(long, default_value = "70")]
        min_bpm: f32,

        /// Maximum BPM for tempo detection (default: 170)
        #[arg(long, default_value = "170")]
        max_bpm: f32,

        /// Seconds a track with no remaining paths is kept before removal
        #[arg(long, default_value = "3600")]
        grace_secs: u64,
    },

    /// Print library statistics
    Status {
        #[arg(short = 's', long, default_value = "~/.local/share/tunedex/store.json")]
        store: String,
    },

    /// Group near-duplicate tracks and propose resolutions
    Dupes {
        #[arg(short = 's', long, default_value = "~/.local/share/tunedex/store.json")]
        store: String,

        /// Resolution policy: keep-all, keep-highest-quality or keep-newest
        #[arg(long, default_value = "keep-all")]
        policy: String,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    match args.command {
        Command::Scan {
            roots,
            store,
            threads,
            force,
            min_bpm,
            max_bpm,
            grace_secs,
        } => scan(roots, &store, threads, force, min_bpm, max_bpm, grace_secs),
        Command::Status { store } => status(&store),
        Command::Dupes { store, policy } => dupes(&store, &policy),
    }
}

fn scan(
    roots: Vec<String>,
    store_path: &str,
    threads: usize,
    force: bool,
    min_bpm: f32,
    max_bpm: f32,
    grace_secs: u64,
) -> Result<()> {
    let roots: Vec<PathBuf> = roots
        .iter()
        .map(|root| PathBuf::from(shellexpand::tilde(root).as_ref()))
        .collect();
    let store_path = expand(store_path);

    let mut config = LibraryConfig::new(roots)
        .with_store_path(store_path.clone())
        .with_worker_threads(threads);
    config.analysis.min_bpm = min_bpm;
    config.analysis.max_bpm = max_bpm;
    config.tombstone_grace_secs = grace_secs;

    if let Some(parent) = store_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("cannot create store directory {:?}", parent))?;
    }

    let store = MetadataStore::load(&store_path)?;

    let reconciler = Reconciler::new(&store, &config).with_force(force);
    let summary = reconciler.walk(&CancelToken::new())?;

    store.save(&store_path)?;

    println!("Scan finished: {}", summary);
    if !summary.failed.is_empty() {
        println!("Failures:");
        for failure in &summary.failed {
            println!("  {:?}: {}", failure.path, failure.reason);
        }
    }

    Ok(())
}

fn status(store_path: &str) -> Result<()> {
    let store = MetadataStore::load(&expand(store_path))?;
    let stats = store.stats();

    println!("Tracks:     {}", stats.total_tracks);
    println!(
        "  analyzed {}, pending {}, failed {}, tombstoned {}",
        stats.analyzed, stats.pending, stats.failed, stats.tombstoned
    );
    println!("Paths:      {}", stats.total_paths);
    println!("Size:       {}", human_size(stats.total_bytes));
    if !stats.by_extension.is_empty() {
        println!("Formats:");
        for (extension, count) in &stats.by_extension {
            println!("  .{extension}: {count}");
        }
    }
    if !stats.tag_keys.is_empty() {
        println!("Tag keys:");
        for (key, count) in &stats.tag_keys {
            println!("  {key}: {count}");
        }
    }

    Ok(())
}

fn dupes(store_path: &str, policy: &str) -> Result<()> {
    let policy: ResolutionPolicy = policy
        .parse()
        .map_err(|reason: String| anyhow::anyhow!(reason))?;

    let store = MetadataStore::load(&expand(store_path))?;

    let mut config = tunedex::config::DuplicateConfig::default();
    config.policy = policy;

    let tracks = store.list_tracks();
    let resolver = DuplicateResolver::new(&config);
    let groups = resolver.find_groups(&tracks);

    if groups.is_empty() {
        println!("No duplicate groups found.");
        return Ok(());
    }

    println!("{} duplicate group(s), policy {}:", groups.len(), policy);
    for group in &groups {
        println!("Group ({} members):", group.members.len());
        for action in resolver.propose(group, &tracks) {
            match action {
                ProposedAction::Keep { fingerprint } => {
                    let label = store
                        .get_track(&fingerprint)
                        .and_then(|record| record.earliest_path().cloned())
                        .map(|path| format!("{:?}", path))
                        .unwrap_or_else(|| fingerprint.to_string());
                    println!("  keep   {label}");
                }
                ProposedAction::Remove { fingerprint, paths } => {
                    println!("  remove {fingerprint}");
                    for path in paths {
                        println!("         {:?}", path);
                    }
                }
            }
        }
    }

    // Surface any records a user may want to look at alongside duplicates
    let failed: Vec<_> = tracks
        .iter()
        .filter(|record| matches!(record.status, AnalysisStatus::Failed(_)))
        .collect();
    if !failed.is_empty() {
        println!("{} track(s) could not be analyzed; run scan -v for details", failed.len());
    }

    Ok(())
}

fn expand(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).as_ref())
}

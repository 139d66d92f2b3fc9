use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand, ValueEnum};

use arbor::cancel::CancelFlag;
use arbor::config::Config;
use arbor::create::WorktreeCreator;
use arbor::error::{self, ArborError};
use arbor::repair::{RepairEngine, RepairEntry};
use arbor::sync::{SyncOutcome, Synchronizer};
use arbor::workspace::Workspace;

#[derive(Parser)]
#[command(name = "arb")]
#[command(about = "Bare-repository worktree orchestration", long_about = None)]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Workspace directory (default: search upward from the current directory)
    #[arg(long, global = true, value_name = "PATH")]
    dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a worktree, creating its branch first if needed
    Create {
        /// Branch to check out; also names the worktree directory
        branch: String,

        /// Base to fork a new branch from (default: the default branch)
        #[arg(short, long)]
        base: Option<String>,

        /// Issue reference to record with the branch
        #[arg(long, value_name = "REF")]
        issue: Option<String>,
    },

    /// Detect and fix divergences between worktrees and the registry
    Repair {
        /// Worktree id or branch (default: sweep all worktrees)
        id: Option<String>,
    },

    /// Fetch once, then fast-forward every worktree from its remote branch
    Sync,

    /// List registered worktrees
    List {
        /// Output format
        #[arg(long, value_enum, default_value = "human")]
        format: ListFormat,
    },

    /// Print a worktree's path, for `cd "$(arb switch <id>)"` wrappers
    Switch {
        /// Worktree id or branch
        id: String,
    },

    /// Remove a worktree and its registry entry
    Remove {
        /// Worktree id or branch
        id: String,

        /// Remove even with uncommitted changes
        #[arg(long)]
        force: bool,
    },

    /// Endpoints called by installed hook scripts
    #[command(subcommand)]
    Hook(HookCommand),
}

#[derive(Subcommand)]
enum HookCommand {
    /// Reconcile this worktree's hooks after a checkout-equivalent event
    PostCheckout,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ListFormat {
    Human,
    Json,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .format_timestamp(None)
        .init();

    let cli = Cli::parse();

    let cancel = CancelFlag::new();
    #[cfg(unix)]
    {
        let _ = signal_hook::flag::register(signal_hook::consts::SIGINT, cancel.as_atomic());
        let _ = signal_hook::flag::register(signal_hook::consts::SIGTERM, cancel.as_atomic());
    }

    if let Err(e) = run(cli, &cancel) {
        eprintln!("Error: {e:#}");
        process::exit(error::exit_code(&e));
    }
}

fn run(cli: Cli, cancel: &CancelFlag) -> anyhow::Result<()> {
    let config = Config::load()?;
    let ws = match &cli.dir {
        Some(dir) => Workspace::open(dir, config)?,
        None => Workspace::discover(&std::env::current_dir()?, config)?,
    };

    match cli.command {
        Commands::Create {
            branch,
            base,
            issue,
        } => handle_create(&ws, &branch, base.as_deref(), issue.as_deref()),
        Commands::Repair { id } => handle_repair(&ws, id.as_deref(), cancel),
        Commands::Sync => handle_sync(&ws, cancel),
        Commands::List { format } => handle_list(&ws, format),
        Commands::Switch { id } => handle_switch(&ws, &id),
        Commands::Remove { id, force } => handle_remove(&ws, &id, force),
        Commands::Hook(HookCommand::PostCheckout) => handle_post_checkout(&ws),
    }
}

fn handle_create(
    ws: &Workspace,
    branch: &str,
    base: Option<&str>,
    issue: Option<&str>,
) -> anyhow::Result<()> {
    let worktree = WorktreeCreator::new(ws).create(branch, base, issue)?;
    println!("Created worktree '{}'", worktree.id);
    println!("Path: {}", worktree.path.display());
    Ok(())
}

fn handle_repair(ws: &Workspace, id: Option<&str>, cancel: &CancelFlag) -> anyhow::Result<()> {
    let engine = RepairEngine::new(ws);
    match id {
        Some(id) => {
            let worktree = ws.registry().find(id)?;
            let entry = engine.repair_worktree(&worktree)?;
            print_repair_entry(&entry);
            if entry.fixed.is_empty() {
                println!("'{}' is consistent", entry.worktree_id);
            }
        }
        None => {
            let mut report = engine.repair_all(cancel)?;
            for entry in &report.entries {
                print_repair_entry(entry);
            }
            if report.cancelled {
                println!("Cancelled; remaining worktrees untouched");
            } else if report.entries.is_empty() {
                println!("All worktrees consistent");
            }
            if let Some(e) = report.first_error() {
                return Err(e);
            }
        }
    }
    Ok(())
}

fn print_repair_entry(entry: &RepairEntry) {
    for divergence in &entry.fixed {
        println!("{}: fixed {}", entry.worktree_id, divergence);
    }
    if let Some(e) = &entry.error {
        println!("{}: FAILED: {e:#}", entry.worktree_id);
    }
}

fn handle_sync(ws: &Workspace, cancel: &CancelFlag) -> anyhow::Result<()> {
    let report = Synchronizer::new(ws).sync_all(cancel)?;

    for (worktree, outcome) in &report.results {
        match outcome {
            SyncOutcome::Conflict { reason } => {
                println!("{}: conflict ({reason})", worktree.id);
            }
            outcome => println!("{}: {}", worktree.id, outcome),
        }
    }
    if report.cancelled {
        println!("Cancelled; remaining worktrees untouched");
    }
    println!(
        "{} updated, {} conflicts, {} without remote branch, {} detached",
        report.count(|o| matches!(o, SyncOutcome::Updated)),
        report.count(|o| matches!(o, SyncOutcome::Conflict { .. })),
        report.count(|o| matches!(o, SyncOutcome::NoRemoteTracking)),
        report.count(|o| matches!(o, SyncOutcome::SkippedDetached)),
    );

    // A conflict leaves the run best-effort complete but the workspace not
    // fully synchronized; the exit code says so.
    let first_conflict = report
        .results
        .into_iter()
        .find_map(|(wt, outcome)| match outcome {
            SyncOutcome::Conflict { reason } => Some((wt.id, reason)),
            _ => None,
        });
    match first_conflict {
        Some((id, reason)) => Err(ArborError::SyncConflict { id, reason }.into()),
        None => Ok(()),
    }
}

fn handle_list(ws: &Workspace, format: ListFormat) -> anyhow::Result<()> {
    let worktrees = ws.registry().list()?;

    if format == ListFormat::Json {
        println!("{}", serde_json::to_string_pretty(&worktrees)?);
        return Ok(());
    }

    for wt in worktrees {
        println!("{}", wt.id);
        println!("  path: {}", wt.path.display());
        match &wt.branch {
            Some(branch) => println!("  branch: {branch}"),
            None => println!("  (detached at {})", &wt.head[..8.min(wt.head.len())]),
        }
        if let Some(reason) = &wt.locked {
            if reason.is_empty() {
                println!("  (locked)");
            } else {
                println!("  (locked: {reason})");
            }
        }
        if let Some(reason) = &wt.prunable {
            if reason.is_empty() {
                println!("  (prunable)");
            } else {
                println!("  (prunable: {reason})");
            }
        }
        println!();
    }
    Ok(())
}

fn handle_switch(ws: &Workspace, id: &str) -> anyhow::Result<()> {
    let worktree = ws.registry().find(id)?;
    println!("{}", worktree.path.display());
    Ok(())
}

fn handle_remove(ws: &Workspace, id: &str, force: bool) -> anyhow::Result<()> {
    let worktree = arbor::create::remove(ws, id, force)?;
    println!("Removed worktree '{}'", worktree.id);
    Ok(())
}

/// Runs inside a worktree, via the installed post-checkout hook. Repair
/// covers hook reconciliation and makes sure link and config are sound
/// before hooks land.
fn handle_post_checkout(ws: &Workspace) -> anyhow::Result<()> {
    let cwd = dunce::canonicalize(std::env::current_dir()?)?;
    // Deepest enclosing path wins: one worktree's path can be a prefix of
    // another's.
    let worktree = ws
        .registry()
        .list()?
        .into_iter()
        .filter(|wt| cwd.starts_with(&wt.path))
        .max_by_key(|wt| wt.path.as_os_str().len())
        .ok_or_else(|| ArborError::WorktreeNotFound {
            id: cwd.display().to_string(),
        })?;

    let entry = RepairEngine::new(ws).repair_worktree(&worktree)?;
    print_repair_entry(&entry);
    Ok(())
}

//! Command-line interface for desktop-cleaner.
//!
//! Parses arguments with clap, wires the configuration, registry and git
//! runner together and renders results through [`OutputFormatter`].

use crate::config::CleanerConfig;
use crate::error::{Error, Result};
use crate::fs_ops;
use crate::git::{GitCli, GitRunner};
use crate::organize::{AutoConfirm, ConflictResolution, FilePathParams, OrganizeEngine, Prompter};
use crate::output::OutputFormatter;
use crate::paths::AppPaths;
use crate::spatial::SpatialIndex;
use crate::tree::DirectoryTree;
use crate::workspace::WorkspaceManager;
use clap::{Args, Parser, Subcommand};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(name = "desktop-cleaner", version, about = "Organize directories into rule-based folders")]
pub struct Cli {
    /// Configuration file (default: ./.desktop_cleaner.toml, then ~/.config/desktop_cleaner/.desktop_cleaner.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Organize files in a directory based on the configured rules
    #[command(visible_alias = "o")]
    Organize(OrganizeArgs),

    /// Manage registered workspaces
    #[command(subcommand)]
    Workspace(WorkspaceCommand),

    /// Save and restore directory tree snapshots
    #[command(subcommand)]
    Snapshot(SnapshotCommand),

    /// Rewind a git-tracked target to an earlier commit
    #[command(visible_alias = "rw")]
    Rewind {
        /// Number of commits back (0 = newest) or a full commit sha
        #[arg(default_value = "1")]
        steps_or_sha: String,
        /// Repository to rewind
        #[arg(long, default_value = ".")]
        repo: PathBuf,
    },

    /// List the files whose metadata is closest to a given file
    Similar {
        /// File or directory to compare against
        path: PathBuf,
        /// Directory to search in
        #[arg(long, default_value = ".")]
        root: PathBuf,
        /// Number of results
        #[arg(short = 'k', long, default_value_t = 5)]
        count: usize,
    },

    /// Move a file or directory into the trash directory
    Trash { path: PathBuf },
}

#[derive(Args, Debug)]
pub struct OrganizeArgs {
    /// Directory to organize (default: current directory)
    pub source: Option<PathBuf>,
    /// Destination directory (default: the source directory)
    #[arg(short = 'd', long = "destination", visible_alias = "target")]
    pub destination: Option<PathBuf>,
    /// Recursively organize files
    #[arg(long)]
    pub recursive: bool,
    /// Remove files after copying them
    #[arg(long)]
    pub remove: bool,
    /// Classify by file name only
    #[arg(long)]
    pub names_only: bool,
    /// Ignore .desktop-cleaner-ignore
    #[arg(long)]
    pub force_skip_ignore: bool,
    /// Maximum depth for recursion (-1 = unbounded)
    #[arg(long, default_value_t = -1, allow_negative_numbers = true)]
    pub max_depth: i64,
    /// Checkpoint the destination with git before and after organizing
    #[arg(long)]
    pub git_enabled: bool,
    /// Copy files instead of moving them
    #[arg(long)]
    pub copy: bool,
    /// Show what would happen without changing anything
    #[arg(long = "dryrun", visible_alias = "dry-run")]
    pub dry_run: bool,
    /// What to do when the destination already exists: overwrite, skip or rename
    #[arg(long, default_value = "rename")]
    pub conflict: ConflictResolution,
    /// Number of worker threads (default: available parallelism)
    #[arg(long)]
    pub workers: Option<usize>,
    /// Answer yes to every git prompt
    #[arg(short, long)]
    pub yes: bool,
    /// Record the run in this workspace's history (UUID or list index)
    #[arg(long)]
    pub workspace: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum WorkspaceCommand {
    /// Create a new workspace
    Create {
        /// Root path for the workspace (default: current directory)
        #[arg(long)]
        root_path: Option<PathBuf>,
        /// Configuration data for the workspace
        #[arg(long = "data", default_value = "")]
        data: String,
    },
    /// List all workspaces
    List,
    /// Show a workspace and its history
    Show { workspace: String },
    /// Update the configuration data of a workspace
    Update {
        workspace: String,
        #[arg(long = "data")]
        data: String,
    },
    /// Delete a workspace
    Delete { workspace: String },
    /// Store metadata for every file of a workspace
    Index { workspace: String },
}

#[derive(Subcommand, Debug)]
pub enum SnapshotCommand {
    /// Snapshot a directory tree
    Take {
        #[arg(default_value = ".")]
        path: PathBuf,
    },
    /// List snapshots
    List,
    /// Restore a snapshot and print its tree
    Restore { id: Uuid },
}

/// Asks on stdin; anything but `y`/`yes` is a no.
pub struct StdinPrompter;

impl Prompter for StdinPrompter {
    fn confirm(&self, question: &str) -> bool {
        print!("{question} [y/N] ");
        if io::stdout().flush().is_err() {
            return false;
        }
        let mut answer = String::new();
        if io::stdin().lock().read_line(&mut answer).is_err() {
            return false;
        }
        matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
    }
}

/// Runs a parsed command.
///
/// # Examples
///
/// ```no_run
/// use clap::Parser;
/// use desktop_cleaner::cli::{Cli, run};
/// use desktop_cleaner::config::CleanerConfig;
/// use desktop_cleaner::paths::AppPaths;
///
/// let cli = Cli::parse_from(["desktop-cleaner", "organize", "/home/user/Desktop", "--dryrun"]);
/// run(cli, &CleanerConfig::default(), &AppPaths::discover()).unwrap();
/// ```
pub fn run(cli: Cli, config: &CleanerConfig, paths: &AppPaths) -> Result<()> {
    match cli.command {
        Command::Organize(args) => organize(args, config, paths),
        Command::Workspace(cmd) => workspace(cmd, paths),
        Command::Snapshot(cmd) => snapshot(cmd, paths),
        Command::Rewind { steps_or_sha, repo } => {
            let target = GitCli::new().rewind(&repo, &steps_or_sha)?;
            OutputFormatter::success(&format!("Rewound {} to {}", repo.display(), target));
            Ok(())
        }
        Command::Similar { path, root, count } => similar(&path, &root, count),
        Command::Trash { path } => {
            let trashed = fs_ops::move_to_trash(&path, &paths.cache_dir)?;
            OutputFormatter::success(&format!("Moved to {}", trashed.display()));
            Ok(())
        }
    }
}

fn current_dir() -> Result<PathBuf> {
    std::env::current_dir()
        .map_err(|e| Error::Usage(format!("cannot determine current directory: {e}")))
}

fn organize(args: OrganizeArgs, config: &CleanerConfig, paths: &AppPaths) -> Result<()> {
    let source = match args.source {
        Some(source) => source,
        None => current_dir()?,
    };
    let target = args.destination.unwrap_or_else(|| source.clone());

    let mut params = FilePathParams::new(&source, &target);
    params.recursive = args.recursive;
    params.remove_after = args.remove;
    params.copy_files = args.copy;
    params.names_only = args.names_only;
    params.force_skip_ignore = args.force_skip_ignore;
    params.max_depth = usize::try_from(args.max_depth).ok();
    params.git_enabled = args.git_enabled;
    params.dry_run = args.dry_run;
    params.conflict_resolution = args.conflict;
    params.workers = args.workers;

    let git = GitCli::new();
    if params.git_enabled {
        if git.is_repo(&target) {
            match git.show_toplevel(&target) {
                Ok(top) => OutputFormatter::info(&format!(
                    "Git repository detected at {}.",
                    top.display()
                )),
                Err(_) => OutputFormatter::info("Git repository detected."),
            }
        } else {
            OutputFormatter::warning("Git repository not detected. One will be initialized.");
        }
    }
    if params.dry_run {
        OutputFormatter::dry_run_notice("No files will be moved.");
    }

    let prompter: Arc<dyn Prompter> = if args.yes {
        Arc::new(AutoConfirm(true))
    } else {
        Arc::new(StdinPrompter)
    };
    let progress = OutputFormatter::create_progress_bar(0);
    let engine = OrganizeEngine::new(config.file_type_tree())
        .with_git(Arc::new(git))
        .with_prompter(prompter)
        .with_progress(progress);

    OutputFormatter::info(&format!("Organizing contents of: {}", source.display()));
    let report = engine.organize(&params)?;
    OutputFormatter::organize_summary(&report);

    if let Some(selector) = args.workspace {
        let manager = WorkspaceManager::open(paths)?;
        let ws = manager.resolve_workspace(&selector)?;
        manager.record_organize(ws.id, &report)?;
    }

    OutputFormatter::success("Files organized successfully.");
    Ok(())
}

fn workspace(cmd: WorkspaceCommand, paths: &AppPaths) -> Result<()> {
    let manager = WorkspaceManager::open(paths)?;
    match cmd {
        WorkspaceCommand::Create { root_path, data } => {
            let root = match root_path {
                Some(root) => root,
                None => current_dir()?,
            };
            let id = manager.create_workspace(&root, &data)?;
            OutputFormatter::success(&format!("Workspace created with ID: {id}"));
        }
        WorkspaceCommand::List => {
            OutputFormatter::workspace_table(&manager.list_workspaces()?);
        }
        WorkspaceCommand::Show { workspace } => {
            let ws = manager.resolve_workspace(&workspace)?;
            OutputFormatter::header(&ws.root_path.display().to_string());
            OutputFormatter::plain(&format!("id:      {}", ws.id));
            OutputFormatter::plain(&format!("created: {}", ws.created_at));
            OutputFormatter::plain(&format!("config:  {}", ws.config));
            for event in manager.history(ws.id)? {
                OutputFormatter::plain(&format!(
                    "  {}  {}",
                    event.recorded_at.format("%Y-%m-%d %H:%M:%S"),
                    event.event_type
                ));
            }
        }
        WorkspaceCommand::Update { workspace, data } => {
            let ws = manager.resolve_workspace(&workspace)?;
            manager.update_workspace(ws.id, &data)?;
            OutputFormatter::success(&format!("Workspace {} updated", ws.id));
        }
        WorkspaceCommand::Delete { workspace } => {
            let ws = manager.resolve_workspace(&workspace)?;
            manager.delete_workspace(ws.id)?;
            OutputFormatter::success(&format!("Workspace {} deleted", ws.id));
        }
        WorkspaceCommand::Index { workspace } => {
            let ws = manager.resolve_workspace(&workspace)?;
            let mut tree = DirectoryTree::new(&ws.root_path)?;
            tree.build(true, None)?;
            tree.add_relationships();
            let count = manager.index_workspace(ws.id, &tree)?;
            OutputFormatter::success(&format!("Indexed {count} entries"));
        }
    }
    Ok(())
}

fn snapshot(cmd: SnapshotCommand, paths: &AppPaths) -> Result<()> {
    let manager = WorkspaceManager::open(paths)?;
    match cmd {
        SnapshotCommand::Take { path } => {
            let mut tree = DirectoryTree::new(&path)?;
            tree.build(true, None)?;
            let id = manager.take_snapshot(&tree)?;
            OutputFormatter::success(&format!("Snapshot {id} taken"));
        }
        SnapshotCommand::List => {
            OutputFormatter::snapshot_table(&manager.get_snapshots()?);
        }
        SnapshotCommand::Restore { id } => {
            let tree = manager.load_snapshot(id)?;
            OutputFormatter::header(&format!("Snapshot {id}"));
            for path in tree.flatten() {
                OutputFormatter::plain(&path.display().to_string());
            }
        }
    }
    Ok(())
}

fn similar(path: &Path, root: &Path, count: usize) -> Result<()> {
    let mut tree = DirectoryTree::new(root)?;
    tree.build(true, None)?;
    let index = SpatialIndex::from_tree(&tree);

    let wanted = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    let query = index
        .points()
        .iter()
        .find(|p| std::fs::canonicalize(&p.path).is_ok_and(|c| c == wanted))
        .ok_or_else(|| {
            Error::Usage(format!("{} is not below {}", path.display(), root.display()))
        })?;

    OutputFormatter::header(&format!("Closest to {}", path.display()));
    for point in index
        .nearest_neighbors(&query.coords, count + 1)
        .into_iter()
        .filter(|p| p.path != query.path)
        .take(count)
    {
        OutputFormatter::plain(&point.path.display().to_string());
    }
    Ok(())
}

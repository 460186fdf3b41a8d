//! Concurrent, rule-driven organization of a directory tree.
//!
//! [`OrganizeEngine::organize`] builds a [`DirectoryTree`] of the source
//! directory, classifies every file with a [`FileTypeTree`] and moves or copies
//! it below the target directory. File tasks run on a bounded pool of scoped
//! worker threads. The first failing task cancels the run: tasks that have not
//! started yet are dropped, tasks already running finish their current
//! syscall, and moves that already completed stay in place.
//!
//! # Examples
//!
//! ```no_run
//! use desktop_cleaner::file_types::FileTypeTree;
//! use desktop_cleaner::organize::{FilePathParams, OrganizeEngine};
//!
//! let mut rules = FileTypeTree::new();
//! rules.populate_file_types([("docs/Reports", [".docx"])]);
//!
//! let params = FilePathParams::new("/home/user/Desktop", "/home/user/Sorted");
//! let report = OrganizeEngine::new(rules).organize(&params).unwrap();
//! println!("{} files organized", report.completed());
//! ```

use crate::file_types::FileTypeTree;
use crate::fs_ops::{self, FsError};
use crate::git::{GitCli, GitError, GitRunner};
use crate::ignore::{IgnoreError, IgnoreMatcher};
use crate::tree::{DirectoryTree, NodeId, TreeError, sniffed_extension};
use indicatif::ProgressBar;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::sync_channel;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use tracing::{debug, info, warn};

/// Directories never descended into, whatever the ignore file says.
const ALWAYS_SKIPPED_DIRS: &[&str] = &[".git", ".desktop_cleaner"];

const STASH_MESSAGE: &str = "Auto-stash before organizing";

/// What to do when a file's destination already exists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictResolution {
    /// Replace the existing file.
    Overwrite,
    /// Leave both files where they are.
    Skip,
    /// Append `_1`, `_2`, ... to the file stem until the name is free.
    #[default]
    #[serde(rename = "rename")]
    RenameSuffix,
}

impl FromStr for ConflictResolution {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "overwrite" => Ok(Self::Overwrite),
            "skip" => Ok(Self::Skip),
            "rename" | "rename-suffix" => Ok(Self::RenameSuffix),
            other => Err(format!(
                "unknown conflict resolution '{other}' (expected overwrite, skip or rename)"
            )),
        }
    }
}

impl fmt::Display for ConflictResolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Overwrite => "overwrite",
            Self::Skip => "skip",
            Self::RenameSuffix => "rename",
        })
    }
}

/// Options for a single organize run.
#[derive(Debug, Clone)]
pub struct FilePathParams {
    pub source_dir: PathBuf,
    pub target_dir: PathBuf,
    /// Descend into sub-directories of the source.
    pub recursive: bool,
    /// Delete the source after a successful copy.
    pub remove_after: bool,
    /// Copy instead of move.
    pub copy_files: bool,
    /// Deepest directory level to read; `None` reads everything.
    pub max_depth: Option<usize>,
    pub git_enabled: bool,
    /// Log what would happen without touching the filesystem or git.
    pub dry_run: bool,
    /// Classify by file name only, never by sniffing content.
    pub names_only: bool,
    /// Ignore `.desktop-cleaner-ignore`.
    pub force_skip_ignore: bool,
    pub conflict_resolution: ConflictResolution,
    /// Worker threads; `None` uses the available parallelism.
    pub workers: Option<usize>,
}

impl FilePathParams {
    pub fn new(source_dir: impl Into<PathBuf>, target_dir: impl Into<PathBuf>) -> Self {
        Self {
            source_dir: source_dir.into(),
            target_dir: target_dir.into(),
            recursive: true,
            remove_after: false,
            copy_files: false,
            max_depth: None,
            git_enabled: false,
            dry_run: false,
            names_only: false,
            force_skip_ignore: false,
            conflict_resolution: ConflictResolution::default(),
            workers: None,
        }
    }

    fn worker_count(&self) -> usize {
        self.workers
            .or_else(|| thread::available_parallelism().ok().map(|n| n.get()))
            .unwrap_or(1)
            .max(1)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum OrganizeError {
    #[error("invalid {role} directory {}: {reason}", .path.display())]
    InvalidDirectory {
        role: &'static str,
        path: PathBuf,
        reason: &'static str,
    },
    #[error("failed to calculate max depth: {0}")]
    Depth(#[source] FsError),
    #[error("failed to build directory tree: {0}")]
    Tree(#[from] TreeError),
    #[error(transparent)]
    Ignore(#[from] IgnoreError),
    #[error("{context}: {source}")]
    Git {
        context: &'static str,
        #[source]
        source: GitError,
    },
    #[error("file operation failed: {0}")]
    File(#[from] FsError),
    #[error("operation canceled due to: {source}")]
    Canceled {
        #[source]
        source: Box<OrganizeError>,
    },
}

pub type OrganizeResult<T> = Result<T, OrganizeError>;

fn git_err(context: &'static str) -> impl FnOnce(GitError) -> OrganizeError {
    move |source| OrganizeError::Git { context, source }
}

/// A single completed (or, in a dry run, planned) move or copy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    pub original_path: PathBuf,
    pub new_path: PathBuf,
    /// Target folder, relative to the target directory.
    pub category: String,
}

/// Result of an organize run.
#[derive(Debug)]
pub struct OrganizeReport {
    /// Completed operations, or planned ones for a dry run.
    pub operations: Vec<Operation>,
    pub skipped_conflicts: usize,
    pub unmatched: usize,
    pub ignored: usize,
    pub already_in_place: usize,
    pub dry_run: bool,
    /// The source tree as it was before any file moved.
    pub tree: DirectoryTree,
}

impl OrganizeReport {
    pub fn completed(&self) -> usize {
        self.operations.len()
    }
}

/// Asks the user to confirm a destructive git step.
pub trait Prompter: Send + Sync {
    fn confirm(&self, question: &str) -> bool;
}

/// A [`Prompter`] that answers every question the same way.
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoConfirm(pub bool);

impl Prompter for AutoConfirm {
    fn confirm(&self, question: &str) -> bool {
        debug!("Auto-answering '{}' with {}", question, self.0);
        self.0
    }
}

#[derive(Debug)]
struct FileTask {
    path: PathBuf,
    name: String,
    extension: String,
}

enum Outcome {
    Done(Operation),
    Skipped,
    Unmatched,
    InPlace,
}

/// State shared by the workers of one run.
struct RunState {
    claimed: Mutex<HashSet<PathBuf>>,
    operations: Mutex<Vec<Operation>>,
    skipped: AtomicUsize,
    unmatched: AtomicUsize,
    in_place: AtomicUsize,
}

pub struct OrganizeEngine {
    file_types: FileTypeTree,
    git: Arc<dyn GitRunner>,
    prompter: Arc<dyn Prompter>,
    progress: Option<ProgressBar>,
}

impl OrganizeEngine {
    /// Creates an engine using the `git` binary and declining every prompt.
    pub fn new(file_types: FileTypeTree) -> Self {
        Self {
            file_types,
            git: Arc::new(GitCli::new()),
            prompter: Arc::new(AutoConfirm(false)),
            progress: None,
        }
    }

    pub fn with_git(mut self, git: Arc<dyn GitRunner>) -> Self {
        self.git = git;
        self
    }

    pub fn with_prompter(mut self, prompter: Arc<dyn Prompter>) -> Self {
        self.prompter = prompter;
        self
    }

    /// Ticks `progress` once per file task.
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn file_types(&self) -> &FileTypeTree {
        &self.file_types
    }

    /// Runs one organize pass.
    ///
    /// # Errors
    ///
    /// Fails before touching any file if the source or target directory is
    /// missing, or if the tree cannot be built. A failing file task cancels the
    /// run and is returned as [`OrganizeError::Canceled`].
    pub fn organize(&self, params: &FilePathParams) -> OrganizeResult<OrganizeReport> {
        // Resolved once so differently spelled aliases of one directory compare equal.
        let resolved = FilePathParams {
            source_dir: validate_dir("source", &params.source_dir)?,
            target_dir: validate_dir("target", &params.target_dir)?,
            ..params.clone()
        };
        let repo = resolved.target_dir.as_path();

        let stashed = if resolved.git_enabled && !resolved.dry_run {
            self.prepare_git(repo)?
        } else {
            if resolved.git_enabled {
                info!("Dry run: skipping git checkpoint");
            }
            false
        };

        let report = match self.run_tasks(&resolved) {
            Ok(report) => report,
            Err(e) => {
                if stashed {
                    self.restore_stash(repo);
                }
                return Err(e);
            }
        };

        if resolved.git_enabled && !resolved.dry_run {
            let message = format!("Organized files for {}", params.source_dir.display());
            if let Err(e) = self.git.add_and_commit(repo, &message) {
                if stashed {
                    self.restore_stash(repo);
                }
                return Err(git_err("failed to commit to git")(e));
            }

            if stashed {
                self.git
                    .pop_stash(repo, true)
                    .map_err(git_err("error popping git stash after organizing"))?;
            }
        }

        Ok(report)
    }

    /// Best-effort pop of this run's stash after a failure; conflicts are left for the user.
    fn restore_stash(&self, repo: &Path) {
        if let Err(e) = self.git.pop_stash(repo, false) {
            warn!("Could not restore stash after failed organize: {}", e);
        }
    }

    /// Makes sure the target is a repository and optionally clears or stashes
    /// pending changes. Returns whether a stash was created.
    fn prepare_git(&self, repo: &Path) -> OrganizeResult<bool> {
        self.git
            .ensure_repo(repo)
            .map_err(git_err("failed to initialize git repository"))?;

        if self
            .prompter
            .confirm("Would you like to clear all uncommitted changes before organizing?")
        {
            self.git
                .clear_uncommitted_changes(repo)
                .map_err(git_err("failed to clear changes"))?;
            info!("All uncommitted changes have been cleared");
        }

        let dirty = self
            .git
            .has_uncommitted_changes(repo)
            .map_err(git_err("failed to handle uncommitted changes"))?;

        if dirty
            && self
                .prompter
                .confirm("There are uncommitted changes. Would you like to stash them?")
        {
            self.git
                .stash_push(repo, STASH_MESSAGE)
                .map_err(git_err("error creating git stash"))?;
            info!("Changes stashed successfully");
            return Ok(true);
        }

        Ok(false)
    }

    fn run_tasks(&self, params: &FilePathParams) -> OrganizeResult<OrganizeReport> {
        let depth = fs_ops::calculate_max_depth(&params.source_dir).map_err(OrganizeError::Depth)?;
        let max_depth = params.max_depth.map_or(depth, |max| max.min(depth));

        let mut tree = DirectoryTree::new(&params.source_dir)?;
        tree.build(params.recursive, Some(max_depth))?;

        let ignore = if params.force_skip_ignore {
            IgnoreMatcher::default()
        } else {
            IgnoreMatcher::load(&params.source_dir)?
        };

        let mut tasks = Vec::with_capacity(tree.file_count());
        let mut ignored = 0;
        collect_tasks(
            &tree,
            tree.root_id(),
            params,
            &ignore,
            &mut tasks,
            &mut ignored,
        );
        debug!(
            "{} file tasks, {} ignored, max depth {}",
            tasks.len(),
            ignored,
            max_depth
        );

        if let Some(progress) = &self.progress {
            progress.set_length(tasks.len() as u64);
        }

        let state = RunState {
            claimed: Mutex::new(HashSet::new()),
            operations: Mutex::new(Vec::with_capacity(tasks.len())),
            skipped: AtomicUsize::new(0),
            unmatched: AtomicUsize::new(0),
            in_place: AtomicUsize::new(0),
        };
        let queue = Mutex::new(tasks.into_iter());
        let canceled = AtomicBool::new(false);
        let (err_tx, err_rx) = sync_channel::<OrganizeError>(1);

        thread::scope(|scope| {
            for _ in 0..params.worker_count() {
                scope.spawn(|| {
                    loop {
                        let next = queue.lock().unwrap_or_else(PoisonError::into_inner).next();
                        let Some(task) = next else { break };

                        if canceled.load(Ordering::SeqCst) {
                            debug!("Canceled before start: {}", task.path.display());
                            continue;
                        }

                        match self.process_file(&task, params, &state) {
                            Ok(Outcome::Done(op)) => lock(&state.operations).push(op),
                            Ok(Outcome::Skipped) => {
                                state.skipped.fetch_add(1, Ordering::Relaxed);
                            }
                            Ok(Outcome::Unmatched) => {
                                state.unmatched.fetch_add(1, Ordering::Relaxed);
                            }
                            Ok(Outcome::InPlace) => {
                                state.in_place.fetch_add(1, Ordering::Relaxed);
                            }
                            Err(e) => {
                                warn!("File task for {} failed: {}", task.path.display(), e);
                                let _ = err_tx.try_send(e);
                                canceled.store(true, Ordering::SeqCst);
                            }
                        }

                        if let Some(progress) = &self.progress {
                            progress.inc(1);
                        }
                    }
                });
            }
        });

        drop(err_tx);
        if let Some(progress) = &self.progress {
            progress.finish();
        }
        if let Ok(first) = err_rx.try_recv() {
            return Err(OrganizeError::Canceled {
                source: Box::new(first),
            });
        }

        let mut operations = state
            .operations
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner);
        operations.sort_by(|a, b| a.original_path.cmp(&b.original_path));

        Ok(OrganizeReport {
            operations,
            skipped_conflicts: state.skipped.into_inner(),
            unmatched: state.unmatched.into_inner(),
            ignored,
            already_in_place: state.in_place.into_inner(),
            dry_run: params.dry_run,
            tree,
        })
    }

    fn classify(&self, task: &FileTask, names_only: bool) -> Option<PathBuf> {
        if let Some(folder) = self.file_types.determine_target_folder(&task.extension) {
            return Some(folder);
        }
        if names_only {
            return None;
        }
        let sniffed = sniffed_extension(&task.path)?;
        debug!("Sniffed {} as {}", task.name, sniffed);
        self.file_types.determine_target_folder(&sniffed)
    }

    fn process_file(
        &self,
        task: &FileTask,
        params: &FilePathParams,
        state: &RunState,
    ) -> OrganizeResult<Outcome> {
        let Some(folder) = self.classify(task, params.names_only) else {
            info!("Skipping file {} as no target path found", task.name);
            return Ok(Outcome::Unmatched);
        };

        let dest_dir = params.target_dir.join(&folder);
        let mut dest = dest_dir.join(&task.name);

        if dest == task.path {
            debug!("{} is already in place", task.path.display());
            return Ok(Outcome::InPlace);
        }

        {
            let mut claimed = lock(&state.claimed);
            if dest.exists() || claimed.contains(&dest) {
                match params.conflict_resolution {
                    ConflictResolution::Overwrite => {
                        info!("Overwriting existing file: {}", dest.display());
                    }
                    ConflictResolution::Skip => {
                        info!("Skipping file to avoid conflict: {}", dest.display());
                        return Ok(Outcome::Skipped);
                    }
                    ConflictResolution::RenameSuffix => {
                        dest = fs_ops::generate_unique_filename_with(&dest, |candidate| {
                            candidate.exists() || claimed.contains(candidate)
                        });
                        info!("Renaming file to avoid conflict: {}", dest.display());
                    }
                }
            }
            claimed.insert(dest.clone());
        }

        let operation = Operation {
            original_path: task.path.clone(),
            new_path: dest.clone(),
            category: folder.to_string_lossy().to_string(),
        };

        let verb = if params.copy_files { "Copying" } else { "Moving" };
        if params.dry_run {
            info!(
                "Dry run: {} {} to {}",
                verb.to_lowercase(),
                task.path.display(),
                dest.display()
            );
            return Ok(Outcome::Done(operation));
        }

        info!("{} file {} to {}", verb, task.path.display(), dest.display());
        fs_ops::ensure_dir(&dest_dir)?;

        if params.copy_files {
            fs_ops::copy_file(&task.path, &dest)?;
            if params.remove_after {
                fs_ops::remove_path(&task.path)?;
            }
        } else {
            fs_ops::move_path(&task.path, &dest)?;
        }

        Ok(Outcome::Done(operation))
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Checks that `path` is an existing directory and returns its canonical form.
fn validate_dir(role: &'static str, path: &Path) -> OrganizeResult<PathBuf> {
    let reason = if path.as_os_str().is_empty() {
        "path is empty"
    } else if !path.exists() {
        "directory does not exist"
    } else if !path.is_dir() {
        "not a directory"
    } else {
        match path.canonicalize() {
            Ok(canonical) => return Ok(canonical),
            Err(_) => "path cannot be resolved",
        }
    };
    Err(OrganizeError::InvalidDirectory {
        role,
        path: path.to_path_buf(),
        reason,
    })
}

/// Collects file tasks in tree order: a directory's files, then its children.
fn collect_tasks(
    tree: &DirectoryTree,
    id: NodeId,
    params: &FilePathParams,
    ignore: &IgnoreMatcher,
    tasks: &mut Vec<FileTask>,
    ignored: &mut usize,
) {
    let node = tree.node(id);
    let relative = |path: &Path| path.strip_prefix(&params.source_dir).unwrap_or(path).to_path_buf();

    for file in node.files() {
        if ignore.is_ignored(&relative(&file.path), false) {
            debug!("Ignoring {}", file.path.display());
            *ignored += 1;
            continue;
        }
        tasks.push(FileTask {
            path: file.path.clone(),
            name: file.name.clone(),
            extension: file.extension.clone(),
        });
    }

    if !params.recursive {
        return;
    }

    for &child in node.children() {
        let child_path = tree.node(child).path();
        let skipped = child_path
            .file_name()
            .is_some_and(|name| ALWAYS_SKIPPED_DIRS.iter().any(|dir| name == *dir));
        if skipped || ignore.is_ignored(&relative(child_path), true) {
            debug!("Ignoring directory {}", child_path.display());
            *ignored += 1;
            continue;
        }
        collect_tasks(tree, child, params, ignore, tasks, ignored);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::fake::FakeGit;
    use std::fs;
    use tempfile::TempDir;

    struct Dirs {
        _temp: TempDir,
        source: PathBuf,
        target: PathBuf,
    }

    fn dirs(files: &[&str]) -> Dirs {
        let temp = TempDir::new().expect("Failed to create temp directory");
        let root = temp.path().canonicalize().unwrap();
        let source = root.join("src");
        let target = root.join("dst");
        fs::create_dir_all(&source).unwrap();
        fs::create_dir_all(&target).unwrap();
        for file in files {
            let path = source.join(file);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(&path, file.as_bytes()).unwrap();
        }
        Dirs {
            _temp: temp,
            source,
            target,
        }
    }

    fn engine() -> OrganizeEngine {
        let mut rules = FileTypeTree::new();
        rules.populate_file_types([
            ("docs/Reports", vec![".docx", ".txt"]),
            ("pics/Photos", vec![".jpg", ".png"]),
        ]);
        OrganizeEngine::new(rules)
    }

    #[test]
    fn test_conflict_resolution_parsing() {
        let parse = |s: &str| s.parse::<ConflictResolution>();
        assert_eq!(parse("skip").unwrap(), ConflictResolution::Skip);
        assert_eq!(parse("Overwrite").unwrap(), ConflictResolution::Overwrite);
        assert_eq!(parse("rename").unwrap(), ConflictResolution::RenameSuffix);
        assert!("merge".parse::<ConflictResolution>().is_err());
        assert_eq!(ConflictResolution::default().to_string(), "rename");
    }

    #[test]
    fn test_missing_source_fails_fast() {
        let d = dirs(&[]);
        let params = FilePathParams::new(d.source.join("nope"), &d.target);
        let err = engine().organize(&params).unwrap_err();
        assert!(matches!(err, OrganizeError::InvalidDirectory { role: "source", .. }));
    }

    #[test]
    fn test_missing_target_fails_fast() {
        let d = dirs(&["a.txt"]);
        let params = FilePathParams::new(&d.source, d.target.join("nope"));
        assert!(matches!(
            engine().organize(&params),
            Err(OrganizeError::InvalidDirectory { role: "target", .. })
        ));
        assert!(d.source.join("a.txt").exists());
    }

    #[test]
    fn test_moves_into_rule_folders() {
        let d = dirs(&["a.txt", "nested/b.jpg", "c.unknown"]);
        let params = FilePathParams::new(&d.source, &d.target);

        let report = engine().organize(&params).unwrap();

        assert_eq!(report.completed(), 2);
        assert_eq!(report.unmatched, 1);
        assert!(d.target.join("docs/Reports/a.txt").exists());
        assert!(d.target.join("pics/Photos/b.jpg").exists());
        assert!(!d.source.join("a.txt").exists());
        assert!(d.source.join("c.unknown").exists());
    }

    #[test]
    fn test_non_recursive_leaves_subdirectories() {
        let d = dirs(&["a.txt", "nested/b.jpg"]);
        let mut params = FilePathParams::new(&d.source, &d.target);
        params.recursive = false;

        let report = engine().organize(&params).unwrap();
        assert_eq!(report.completed(), 1);
        assert!(d.source.join("nested/b.jpg").exists());
    }

    #[test]
    fn test_copy_keeps_source_unless_remove_after() {
        let d = dirs(&["a.txt", "b.png"]);
        let mut params = FilePathParams::new(&d.source, &d.target);
        params.copy_files = true;
        engine().organize(&params).unwrap();
        assert!(d.source.join("a.txt").exists());
        assert!(d.target.join("docs/Reports/a.txt").exists());

        let d = dirs(&["a.txt"]);
        let mut params = FilePathParams::new(&d.source, &d.target);
        params.copy_files = true;
        params.remove_after = true;
        engine().organize(&params).unwrap();
        assert!(!d.source.join("a.txt").exists());
        assert!(d.target.join("docs/Reports/a.txt").exists());
    }

    #[test]
    fn test_skip_leaves_existing_destination() {
        let d = dirs(&["a.txt"]);
        fs::create_dir_all(d.target.join("docs/Reports")).unwrap();
        fs::write(d.target.join("docs/Reports/a.txt"), "existing").unwrap();

        let mut params = FilePathParams::new(&d.source, &d.target);
        params.conflict_resolution = ConflictResolution::Skip;
        let report = engine().organize(&params).unwrap();

        assert_eq!(report.skipped_conflicts, 1);
        assert_eq!(
            fs::read_to_string(d.target.join("docs/Reports/a.txt")).unwrap(),
            "existing"
        );
        assert!(d.source.join("a.txt").exists());
    }

    #[test]
    fn test_overwrite_replaces_destination() {
        let d = dirs(&["a.txt"]);
        fs::create_dir_all(d.target.join("docs/Reports")).unwrap();
        fs::write(d.target.join("docs/Reports/a.txt"), "existing").unwrap();

        let mut params = FilePathParams::new(&d.source, &d.target);
        params.conflict_resolution = ConflictResolution::Overwrite;
        engine().organize(&params).unwrap();

        assert_eq!(
            fs::read_to_string(d.target.join("docs/Reports/a.txt")).unwrap(),
            "a.txt"
        );
    }

    #[test]
    fn test_rename_suffix_gives_each_file_its_own_name() {
        let files: Vec<String> = (0..8).map(|i| format!("dir{i}/same.txt")).collect();
        let refs: Vec<&str> = files.iter().map(String::as_str).collect();
        let d = dirs(&refs);
        fs::create_dir_all(d.target.join("docs/Reports")).unwrap();
        fs::write(d.target.join("docs/Reports/same.txt"), "original").unwrap();

        let mut params = FilePathParams::new(&d.source, &d.target);
        params.workers = Some(4);
        let report = engine().organize(&params).unwrap();

        let destinations: HashSet<PathBuf> =
            report.operations.iter().map(|op| op.new_path.clone()).collect();
        assert_eq!(destinations.len(), 8);
        assert!(!destinations.contains(&d.target.join("docs/Reports/same.txt")));
        assert_eq!(
            fs::read_to_string(d.target.join("docs/Reports/same.txt")).unwrap(),
            "original"
        );
        assert_eq!(fs::read_dir(d.target.join("docs/Reports")).unwrap().count(), 9);
    }

    #[test]
    fn test_aliased_target_is_recognised_as_in_place() {
        let d = dirs(&["report.docx"]);
        fs::create_dir_all(d.target.join("elsewhere")).unwrap();
        let alias = d.target.join("elsewhere/../../src");

        let engine = engine();
        let first = engine.organize(&FilePathParams::new(&d.source, &alias)).unwrap();
        let second = engine.organize(&FilePathParams::new(&d.source, &alias)).unwrap();

        assert_eq!(first.completed(), 1);
        assert_eq!(second.completed(), 0);
        assert_eq!(second.already_in_place, 1);
        let names: Vec<_> = fs::read_dir(d.source.join("docs/Reports"))
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(names, vec!["report.docx"]);
    }

    #[test]
    fn test_dry_run_touches_nothing() {
        let d = dirs(&["a.txt", "b.jpg"]);
        let mut params = FilePathParams::new(&d.source, &d.target);
        params.dry_run = true;
        params.git_enabled = true;
        let git = Arc::new(FakeGit::new());

        let report = engine().with_git(git.clone()).organize(&params).unwrap();

        assert!(report.dry_run);
        assert_eq!(report.completed(), 2);
        assert!(d.source.join("a.txt").exists());
        assert_eq!(fs::read_dir(&d.target).unwrap().count(), 0);
        assert!(git.calls().is_empty());
    }

    #[test]
    fn test_first_failure_cancels_remaining_tasks() {
        let mut files = vec!["a_fail.bad".to_string()];
        files.extend((0..20).map(|i| format!("file{i:02}.txt")));
        let refs: Vec<&str> = files.iter().map(String::as_str).collect();
        let d = dirs(&refs);
        // The rule folder for .bad is a regular file, so creating it fails.
        fs::write(d.target.join("blocked"), "").unwrap();

        let mut rules = FileTypeTree::new();
        rules.populate_file_types([("blocked", [".bad"]), ("docs", [".txt"])]);
        let mut params = FilePathParams::new(&d.source, &d.target);
        params.workers = Some(1);

        let err = OrganizeEngine::new(rules).organize(&params).unwrap_err();

        assert!(err.to_string().starts_with("operation canceled due to:"));
        assert!(matches!(err, OrganizeError::Canceled { .. }));
        let moved = fs::read_dir(d.target.join("docs"))
            .map(|entries| entries.count())
            .unwrap_or(0);
        assert!(moved < 20);
    }

    #[test]
    fn test_names_only_disables_content_sniffing() {
        let d = dirs(&[]);
        let png: &[u8] = &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];
        fs::write(d.source.join("picture"), png).unwrap();

        let mut params = FilePathParams::new(&d.source, &d.target);
        params.names_only = true;
        let report = engine().organize(&params).unwrap();
        assert_eq!(report.unmatched, 1);

        params.names_only = false;
        let report = engine().organize(&params).unwrap();
        assert_eq!(report.completed(), 1);
        assert!(d.target.join("pics/Photos/picture").exists());
    }

    #[test]
    fn test_ignore_file_is_honoured_unless_forced() {
        let d = dirs(&["keep.txt", "secret/plan.txt"]);
        fs::write(d.source.join(crate::ignore::IGNORE_FILE_NAME), "keep.txt\nsecret/\n").unwrap();

        let mut params = FilePathParams::new(&d.source, &d.target);
        params.copy_files = true;
        let report = engine().organize(&params).unwrap();
        assert_eq!(report.completed(), 0);
        assert_eq!(report.ignored, 2);

        params.force_skip_ignore = true;
        let report = engine().organize(&params).unwrap();
        assert_eq!(report.completed(), 2);
    }

    #[test]
    fn test_git_directory_is_never_organized() {
        let d = dirs(&[".git/notes.txt", "a.txt"]);
        let params = FilePathParams::new(&d.source, &d.target);
        let report = engine().organize(&params).unwrap();
        assert_eq!(report.completed(), 1);
        assert!(d.source.join(".git/notes.txt").exists());
    }

    #[test]
    fn test_organizing_in_place_is_idempotent() {
        let d = dirs(&["a.txt"]);
        let params = FilePathParams::new(&d.source, &d.source);
        engine().organize(&params).unwrap();
        let report = engine().organize(&params).unwrap();
        assert_eq!(report.completed(), 0);
        assert_eq!(report.already_in_place, 1);
        assert!(d.source.join("docs/Reports/a.txt").exists());
    }

    #[test]
    fn test_git_checkpoint_sequence() {
        let d = dirs(&["a.txt"]);
        let git = Arc::new(FakeGit::new());
        *git.dirty.lock().unwrap() = true;

        let mut params = FilePathParams::new(&d.source, &d.target);
        params.git_enabled = true;
        engine()
            .with_git(git.clone())
            .with_prompter(Arc::new(AutoConfirm(true)))
            .organize(&params)
            .unwrap();

        let calls = git.calls();
        assert_eq!(calls[0], "init");
        assert_eq!(&calls[1..3], &["reset --hard", "clean -d -f"]);
        assert!(calls.contains(&"stash push".to_string()));
        let commit = calls.iter().position(|c| c.starts_with("commit ")).unwrap();
        let pop = calls.iter().position(|c| c == "stash pop").unwrap();
        assert!(commit < pop);
    }

    #[test]
    fn test_git_without_stash_does_not_pop() {
        let d = dirs(&["a.txt"]);
        let git = Arc::new(FakeGit::new());
        *git.repo.lock().unwrap() = true;

        let mut params = FilePathParams::new(&d.source, &d.target);
        params.git_enabled = true;
        engine().with_git(git.clone()).organize(&params).unwrap();

        let commit = format!("commit Organized files for {}", d.source.display());
        assert_eq!(git.calls(), vec!["status", "add .", commit.as_str()]);
    }

    #[test]
    fn test_failed_commit_restores_stash() {
        let d = dirs(&["a.txt"]);
        let git = Arc::new(FakeGit::new());
        *git.repo.lock().unwrap() = true;
        *git.dirty.lock().unwrap() = true;
        *git.commit_failure.lock().unwrap() = true;

        let mut params = FilePathParams::new(&d.source, &d.target);
        params.git_enabled = true;
        let err = engine()
            .with_git(git.clone())
            .with_prompter(Arc::new(AutoConfirm(true)))
            .organize(&params)
            .unwrap_err();

        assert!(matches!(err, OrganizeError::Git { context: "failed to commit to git", .. }));
        let calls = git.calls();
        let commit = calls.iter().position(|c| c.starts_with("commit ")).unwrap();
        assert_eq!(calls.last().map(String::as_str), Some("stash pop"));
        assert!(commit < calls.len() - 1);
    }

    #[test]
    fn test_progress_bar_counts_tasks() {
        let d = dirs(&["a.txt", "b.jpg", "c.zzz"]);
        let bar = ProgressBar::hidden();
        let params = FilePathParams::new(&d.source, &d.target);
        engine().with_progress(bar.clone()).organize(&params).unwrap();
        assert_eq!(bar.position(), 3);
        assert_eq!(bar.length(), Some(3));
    }
}

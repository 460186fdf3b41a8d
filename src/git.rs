//! Git checkpoints around organize runs.
//!
//! [`GitRunner`] is the narrow surface the organize engine needs. [`GitCli`]
//! implements it by spawning the `git` binary; every invocation holds the
//! runner's mutex, so git commands issued through one runner never overlap.

use regex::Regex;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::{LazyLock, Mutex, PoisonError};
use tracing::{debug, info, warn};

/// Marker git prints when a stash pop would overwrite local changes.
pub const POP_STASH_CONFLICT_MSG: &str = "overwritten by merge";
/// Line that ends the list of conflicting files.
pub const CONFLICT_MSG_FILES_END: &str = "commit your changes";

static SHA_RE: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"^[a-f0-9]{40}$").ok());

#[derive(Debug, thiserror::Error)]
pub enum GitError {
    #[error("failed to run git: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("git {args} failed ({status}) | Output: {output}")]
    CommandFailed {
        args: String,
        status: String,
        output: String,
    },
    #[error("conflict encountered popping git stash: {output}")]
    StashConflict { files: Vec<String>, output: String },
    #[error("invalid target commit: {0}")]
    InvalidTarget(String),
}

pub type GitResult<T> = Result<T, GitError>;

/// Git operations used by the organize engine and the rewind command.
///
/// Only the primitive commands are required; the composite operations are
/// provided on top of them.
pub trait GitRunner: Send + Sync {
    fn init(&self, dir: &Path) -> GitResult<()>;
    fn is_repo(&self, dir: &Path) -> bool;
    fn show_toplevel(&self, dir: &Path) -> GitResult<PathBuf>;
    fn add(&self, repo: &Path, pathspec: &str) -> GitResult<()>;
    /// Commits with `--allow-empty`.
    fn commit(&self, repo: &Path, message: &str) -> GitResult<()>;
    /// `status --porcelain`, optionally restricted to `path`.
    fn status(&self, repo: &Path, path: Option<&Path>) -> GitResult<String>;
    /// Stashes tracked and untracked changes.
    fn stash_push(&self, repo: &Path, message: &str) -> GitResult<()>;
    /// Runs `stash pop` as is. See [`GitRunner::pop_stash`] for conflict handling.
    fn stash_pop(&self, repo: &Path) -> GitResult<()>;
    fn stash_drop(&self, repo: &Path) -> GitResult<()>;
    fn reset_hard(&self, repo: &Path) -> GitResult<()>;
    /// Removes untracked files and directories.
    fn clean(&self, repo: &Path) -> GitResult<()>;
    fn checkout(&self, repo: &Path, target: &str) -> GitResult<()>;
    /// Every commit reachable from any ref, newest first.
    fn rev_list(&self, repo: &Path) -> GitResult<Vec<String>>;

    /// Initializes `dir` unless it already is inside a work tree. Returns whether it ran `init`.
    fn ensure_repo(&self, dir: &Path) -> GitResult<bool> {
        if self.is_repo(dir) {
            return Ok(false);
        }
        self.init(dir)?;
        info!("Initialized new Git repository at {}", dir.display());
        Ok(true)
    }

    /// Stages everything and commits.
    fn add_and_commit(&self, repo: &Path, message: &str) -> GitResult<()> {
        self.add(repo, ".")?;
        self.commit(repo, message)?;
        info!("Committed changes to Git with message: {}", message);
        Ok(())
    }

    fn has_uncommitted_changes(&self, repo: &Path) -> GitResult<bool> {
        Ok(!self.status(repo, None)?.trim().is_empty())
    }

    fn file_has_uncommitted_changes(&self, repo: &Path, path: &Path) -> GitResult<bool> {
        Ok(!self.status(repo, Some(path))?.trim().is_empty())
    }

    /// Discards tracked changes and removes untracked files.
    fn clear_uncommitted_changes(&self, repo: &Path) -> GitResult<()> {
        self.reset_hard(repo)?;
        self.clean(repo)
    }

    /// Pops the latest stash.
    ///
    /// When the pop fails because it would overwrite local changes and
    /// `force_overwrite` is set, each conflicting file is checked out and the
    /// stash is dropped. Without `force_overwrite` the conflict is returned as
    /// [`GitError::StashConflict`].
    fn pop_stash(&self, repo: &Path, force_overwrite: bool) -> GitResult<()> {
        let output = match self.stash_pop(repo) {
            Ok(()) => return Ok(()),
            Err(GitError::CommandFailed { output, .. }) if output.contains(POP_STASH_CONFLICT_MSG) => {
                output
            }
            Err(e) => return Err(e),
        };

        warn!("Conflicts detected while popping stash");
        let files = parse_conflict_files(&output);
        if !force_overwrite {
            return Err(GitError::StashConflict { files, output });
        }

        for file in &files {
            self.checkout(repo, file)?;
        }
        self.stash_drop(repo)
    }

    /// Checks out a commit given as a full sha or as a step count into [`GitRunner::rev_list`].
    ///
    /// Returns the commit that was checked out.
    fn rewind(&self, repo: &Path, steps_or_sha: &str) -> GitResult<String> {
        let commits = self.rev_list(repo)?;
        let target = resolve_rewind_target(steps_or_sha, &commits)?;
        self.checkout(repo, &target)?;
        info!("Rewound {} to {}", repo.display(), target);
        Ok(target)
    }
}

/// Whether `input` is a full lower-case hex SHA-1.
pub fn is_sha(input: &str) -> bool {
    SHA_RE.as_ref().is_some_and(|re| re.is_match(input))
}

/// Resolves rewind input against `commits` (index 0 is the newest).
pub fn resolve_rewind_target(steps_or_sha: &str, commits: &[String]) -> GitResult<String> {
    let input = steps_or_sha.trim();
    if is_sha(input) {
        return Ok(input.to_string());
    }

    input
        .parse::<usize>()
        .ok()
        .and_then(|steps| commits.get(steps))
        .cloned()
        .ok_or_else(|| GitError::InvalidTarget(steps_or_sha.to_string()))
}

/// Extracts the file names git lists between the conflict marker and the
/// "commit your changes" line.
///
/// This matches git's English output and will find nothing under other locales.
pub fn parse_conflict_files(output: &str) -> Vec<String> {
    output
        .lines()
        .skip_while(|line| !line.contains(POP_STASH_CONFLICT_MSG))
        .skip(1)
        .take_while(|line| !line.contains(CONFLICT_MSG_FILES_END))
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// [`GitRunner`] backed by the `git` executable.
#[derive(Debug)]
pub struct GitCli {
    program: PathBuf,
    lock: Mutex<()>,
}

impl Default for GitCli {
    fn default() -> Self {
        Self::new()
    }
}

impl GitCli {
    pub fn new() -> Self {
        Self::with_program("git")
    }

    /// Uses a specific git executable.
    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            lock: Mutex::new(()),
        }
    }

    /// Runs `git -C <dir> <args>` and returns its combined stdout and stderr.
    fn run(&self, dir: &Path, args: &[&str]) -> GitResult<String> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        debug!("git -C {} {}", dir.display(), args.join(" "));

        let out = Command::new(&self.program)
            .arg("-C")
            .arg(dir)
            .args(args)
            .output()
            .map_err(GitError::Spawn)?;

        let mut output = String::from_utf8_lossy(&out.stdout).to_string();
        output.push_str(&String::from_utf8_lossy(&out.stderr));

        if out.status.success() {
            Ok(output)
        } else {
            Err(GitError::CommandFailed {
                args: args.join(" "),
                status: out.status.to_string(),
                output,
            })
        }
    }
}

impl GitRunner for GitCli {
    fn init(&self, dir: &Path) -> GitResult<()> {
        self.run(dir, &["init"]).map(drop)
    }

    fn is_repo(&self, dir: &Path) -> bool {
        self.run(dir, &["rev-parse", "--is-inside-work-tree"])
            .map(|out| out.trim() == "true")
            .unwrap_or(false)
    }

    fn show_toplevel(&self, dir: &Path) -> GitResult<PathBuf> {
        self.run(dir, &["rev-parse", "--show-toplevel"])
            .map(|out| PathBuf::from(out.trim()))
    }

    fn add(&self, repo: &Path, pathspec: &str) -> GitResult<()> {
        self.run(repo, &["add", pathspec]).map(drop)
    }

    fn commit(&self, repo: &Path, message: &str) -> GitResult<()> {
        self.run(repo, &["commit", "-m", message, "--allow-empty"])
            .map(drop)
    }

    fn status(&self, repo: &Path, path: Option<&Path>) -> GitResult<String> {
        match path {
            Some(path) => {
                let path = path.to_string_lossy();
                self.run(repo, &["status", "--porcelain", "--", &*path])
            }
            None => self.run(repo, &["status", "--porcelain"]),
        }
    }

    fn stash_push(&self, repo: &Path, message: &str) -> GitResult<()> {
        self.run(repo, &["stash", "push", "--include-untracked", "-m", message])
            .map(drop)
    }

    fn stash_pop(&self, repo: &Path) -> GitResult<()> {
        self.run(repo, &["stash", "pop"]).map(drop)
    }

    fn stash_drop(&self, repo: &Path) -> GitResult<()> {
        self.run(repo, &["stash", "drop"]).map(drop)
    }

    fn reset_hard(&self, repo: &Path) -> GitResult<()> {
        self.run(repo, &["reset", "--hard"]).map(drop)
    }

    fn clean(&self, repo: &Path) -> GitResult<()> {
        self.run(repo, &["clean", "-d", "-f"]).map(drop)
    }

    fn checkout(&self, repo: &Path, target: &str) -> GitResult<()> {
        self.run(repo, &["checkout", target]).map(drop)
    }

    fn rev_list(&self, repo: &Path) -> GitResult<Vec<String>> {
        let out = self.run(repo, &["rev-list", "--all"])?;
        Ok(out
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }
}

//! `.desktop-cleaner-ignore` support.
//!
//! The ignore file lives at the root of the directory being organized and uses
//! gitignore syntax:
//!
//! ```text
//! # comments and blank lines are skipped
//! *.tmp          # any file or directory named *.tmp, at any depth
//! /build         # only build at the root
//! cache/         # directories only
//! docs/**/*.md   # patterns containing a slash are anchored to the root
//! !keep.tmp      # negation re-includes a previously ignored path
//! ```
//!
//! Later lines take precedence over earlier ones.
//!
//! Not supported: backslash escapes (`\#`, `\!`, `\ `) and git's trailing
//! space rules. A line is trimmed on both sides before it is parsed, so a
//! pattern cannot begin with a literal `#` or `!` or end in a space.

use glob::{MatchOptions, Pattern};
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

pub const IGNORE_FILE_NAME: &str = ".desktop-cleaner-ignore";

/// Entries written into a freshly created workspace's ignore file.
pub const DEFAULT_IGNORE_ENTRIES: &[&str] = &[".git/", ".desktop_cleaner/"];

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

#[derive(Debug, thiserror::Error)]
pub enum IgnoreError {
    #[error("invalid ignore pattern on line {line}: {pattern}")]
    InvalidPattern { line: usize, pattern: String },
    #[error("error reading {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

pub type IgnoreResult<T> = Result<T, IgnoreError>;

#[derive(Debug, Clone)]
struct IgnoreRule {
    pattern: Pattern,
    negated: bool,
    dir_only: bool,
}

impl IgnoreRule {
    fn matches(&self, candidate: &str, is_dir: bool) -> bool {
        (!self.dir_only || is_dir) && self.pattern.matches_with(candidate, MATCH_OPTIONS)
    }
}

/// Compiled ignore rules, matched against paths relative to the ignore root.
#[derive(Debug, Clone, Default)]
pub struct IgnoreMatcher {
    rules: Vec<IgnoreRule>,
}

impl IgnoreMatcher {
    /// Reads `<root>/.desktop-cleaner-ignore`. A missing file yields an empty matcher.
    ///
    /// # Errors
    ///
    /// Fails if the file exists but cannot be read or holds an invalid pattern.
    pub fn load(root: &Path) -> IgnoreResult<Self> {
        let path = root.join(IGNORE_FILE_NAME);
        match fs::read_to_string(&path) {
            Ok(content) => Self::parse(&content),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Self::default()),
            Err(source) => Err(IgnoreError::Io { path, source }),
        }
    }

    /// Compiles gitignore-style `content`.
    pub fn parse(content: &str) -> IgnoreResult<Self> {
        let mut rules = Vec::new();

        for (i, raw) in content.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let (negated, line) = match line.strip_prefix('!') {
                Some(rest) => (true, rest),
                None => (false, line),
            };
            let (dir_only, line) = match line.strip_suffix('/') {
                Some(rest) => (true, rest),
                None => (false, line),
            };

            let anchored = line.contains('/');
            let body = line.trim_start_matches('/');
            if body.is_empty() {
                continue;
            }

            let glob = if anchored {
                body.to_string()
            } else {
                format!("**/{body}")
            };
            let pattern = Pattern::new(&glob).map_err(|_| IgnoreError::InvalidPattern {
                line: i + 1,
                pattern: raw.to_string(),
            })?;

            rules.push(IgnoreRule {
                pattern,
                negated,
                dir_only,
            });
        }

        Ok(Self { rules })
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Whether `relative` (a path below the ignore root) is ignored.
    ///
    /// A path is also ignored when any of its parent directories is.
    pub fn is_ignored(&self, relative: &Path, is_dir: bool) -> bool {
        if self.rules.is_empty() {
            return false;
        }

        let segments: Vec<String> = relative
            .components()
            .filter_map(|c| match c {
                Component::Normal(s) => Some(s.to_string_lossy().to_string()),
                _ => None,
            })
            .collect();

        let mut ignored = false;
        for rule in &self.rules {
            let mut prefix = String::new();
            let hit = segments.iter().enumerate().any(|(i, segment)| {
                if i > 0 {
                    prefix.push('/');
                }
                prefix.push_str(segment);
                let last = i + 1 == segments.len();
                rule.matches(&prefix, !last || is_dir)
            });
            if hit {
                ignored = !rule.negated;
            }
        }
        ignored
    }
}

/// Filesystem primitives used by the organize engine.
///
/// Moves try a plain `rename` first. When the source and destination live on
/// different filesystems the rename fails with a cross-device error, and the
/// move falls back to a recursive copy followed by removal of the source.
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Errors raised by filesystem operations.
#[derive(Debug, thiserror::Error)]
pub enum FsError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("failed to create directory {}: {source}", .path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to copy {} to {}: {source}", .from.display(), .to.display())]
    Copy {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to move {} to {}: {source}", .from.display(), .to.display())]
    Move {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to remove {}: {source}", .path.display())]
    Remove {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("error walking {}: {source}", .path.display())]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },
}

pub type FsResult<T> = Result<T, FsError>;

/// Whether `err` is the EXDEV error returned by a rename across devices.
pub fn is_cross_device(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::CrossesDevices
}

/// Creates `path` and any missing parents.
pub fn ensure_dir(path: &Path) -> FsResult<()> {
    fs::create_dir_all(path).map_err(|source| FsError::CreateDir {
        path: path.to_path_buf(),
        source,
    })
}

/// Copies a single file, replacing `dst` if it exists. Returns the bytes copied.
pub fn copy_file(src: &Path, dst: &Path) -> FsResult<u64> {
    fs::copy(src, dst).map_err(|source| FsError::Copy {
        from: src.to_path_buf(),
        to: dst.to_path_buf(),
        source,
    })
}

/// Copies a file, or a directory and everything below it, to `dst`.
pub fn copy_recursive(src: &Path, dst: &Path) -> FsResult<()> {
    if !src.is_dir() {
        copy_file(src, dst)?;
        return Ok(());
    }

    for entry in WalkDir::new(src).follow_links(false) {
        let entry = entry.map_err(|source| FsError::Walk {
            path: src.to_path_buf(),
            source,
        })?;

        let relative = entry.path().strip_prefix(src).unwrap_or(entry.path());
        let target = dst.join(relative);

        if entry.file_type().is_dir() {
            ensure_dir(&target)?;
        } else if entry.file_type().is_file() {
            copy_file(entry.path(), &target)?;
        } else {
            debug!("Not copying special entry {}", entry.path().display());
        }
    }
    Ok(())
}

/// Removes a file or a whole directory.
pub fn remove_path(path: &Path) -> FsResult<()> {
    let result = if path.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };
    result.map_err(|source| FsError::Remove {
        path: path.to_path_buf(),
        source,
    })
}

/// Moves `src` to `dst`, falling back to copy and delete across devices.
pub fn move_path(src: &Path, dst: &Path) -> FsResult<()> {
    move_with(src, dst, |from, to| fs::rename(from, to))
}

/// [`move_path`] with the rename step supplied by the caller.
pub fn move_with<F>(src: &Path, dst: &Path, rename: F) -> FsResult<()>
where
    F: FnOnce(&Path, &Path) -> io::Result<()>,
{
    match rename(src, dst) {
        Ok(()) => Ok(()),
        Err(e) if is_cross_device(&e) => {
            warn!(
                "Cross-device error detected: falling back to copy for {}",
                src.display()
            );
            copy_recursive(src, dst)?;
            remove_path(src)
        }
        Err(source) => Err(FsError::Move {
            from: src.to_path_buf(),
            to: dst.to_path_buf(),
            source,
        }),
    }
}

/// First `base_N.ext` (N = 1, 2, ...) next to `path` that does not exist.
pub fn generate_unique_filename(path: &Path) -> PathBuf {
    generate_unique_filename_with(path, |candidate| candidate.exists())
}

/// First `base_N.ext` next to `path` for which `taken` returns false.
///
/// ```
/// use desktop_cleaner::fs_ops::generate_unique_filename_with;
/// use std::path::{Path, PathBuf};
///
/// let taken = [PathBuf::from("/t/report_1.docx")];
/// let unique = generate_unique_filename_with(Path::new("/t/report.docx"), |p| taken.iter().any(|t| t == p));
/// assert_eq!(unique, PathBuf::from("/t/report_2.docx"));
/// ```
pub fn generate_unique_filename_with<F>(path: &Path, taken: F) -> PathBuf
where
    F: Fn(&Path) -> bool,
{
    let dir = path.parent().unwrap_or_else(|| Path::new(""));
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let ext = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    (1..)
        .map(|i| dir.join(format!("{stem}_{i}{ext}")))
        .find(|candidate| !taken(candidate))
        .unwrap_or_else(|| path.to_path_buf())
}

/// Depth of the deepest entry below `source_dir`; its direct entries have depth 1.
pub fn calculate_max_depth(source_dir: &Path) -> FsResult<usize> {
    if source_dir.as_os_str().is_empty() {
        return Err(FsError::InvalidArgument(
            "source directory path cannot be empty".to_string(),
        ));
    }

    let mut max_depth = 0;
    for entry in WalkDir::new(source_dir).min_depth(1) {
        let entry = entry.map_err(|source| FsError::Walk {
            path: source_dir.to_path_buf(),
            source,
        })?;
        max_depth = max_depth.max(entry.depth());
    }
    Ok(max_depth)
}

/// Moves `path` into `cache_dir`, renaming it if the trash already holds that name.
pub fn move_to_trash(path: &Path, cache_dir: &Path) -> FsResult<PathBuf> {
    let name = path
        .file_name()
        .ok_or_else(|| FsError::InvalidArgument(format!("{} has no file name", path.display())))?;

    ensure_dir(cache_dir)?;
    let mut dst = cache_dir.join(name);
    if dst.exists() {
        dst = generate_unique_filename(&dst);
    }

    move_path(path, &dst)?;
    debug!("Moved {} to trash at {}", path.display(), dst.display());
    Ok(dst)
}

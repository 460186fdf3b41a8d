//! Crate-level error for callers that drive several components.

use crate::config::ConfigError;
use crate::fs_ops::FsError;
use crate::git::GitError;
use crate::ignore::IgnoreError;
use crate::organize::OrganizeError;
use crate::registry::RegistryError;
use crate::tree::TreeError;
use crate::workspace::WorkspaceError;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Tree(#[from] TreeError),
    #[error(transparent)]
    Organize(#[from] OrganizeError),
    #[error("git error: {0}")]
    Git(#[from] GitError),
    #[error(transparent)]
    Workspace(#[from] WorkspaceError),
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Ignore(#[from] IgnoreError),
    #[error(transparent)]
    Fs(#[from] FsError),
    #[error("{0}")]
    Usage(String),
}

pub type Result<T> = std::result::Result<T, Error>;

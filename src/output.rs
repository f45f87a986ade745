//! Where an issued PEM bundle goes

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::info;

/// Target name meaning standard output
pub const STDOUT_TARGET: &str = "-";

#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    #[error("No domain given")]
    NoDomain,

    #[error("Expected one domain and at most one PEM file, got {0} arguments; use --directory for several domains")]
    TooManyTargets(usize),

    #[error("Failed to write {path}: {source}")]
    Write { path: PathBuf, source: io::Error },

    #[error("Failed to write to stdout: {0}")]
    Stdout(#[source] io::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    Stdout,
    File(PathBuf),
    /// `<dir>/<domain>.pem`
    Directory(PathBuf),
}

impl Destination {
    /// Resolved file path for `domain`, `None` for stdout
    pub fn path_for(&self, domain: &str) -> Option<PathBuf> {
        match self {
            Destination::Stdout => None,
            Destination::File(path) => Some(path.clone()),
            Destination::Directory(dir) => Some(dir.join(format!("{}.pem", domain))),
        }
    }
}

/// Pair each domain with its destination.
///
/// With a directory every positional argument is a domain. Without one the
/// arguments are a single domain and an optional PEM file, where a missing
/// file or `-` means stdout.
pub fn plan(targets: &[String], directory: Option<&Path>) -> Result<Vec<(String, Destination)>, OutputError> {
    if targets.is_empty() {
        return Err(OutputError::NoDomain);
    }

    if let Some(dir) = directory {
        return Ok(targets
            .iter()
            .map(|domain| (domain.clone(), Destination::Directory(dir.to_path_buf())))
            .collect());
    }

    let destination = match targets {
        [_] => Destination::Stdout,
        [_, file] if file == STDOUT_TARGET => Destination::Stdout,
        [_, file] => Destination::File(PathBuf::from(file)),
        _ => return Err(OutputError::TooManyTargets(targets.len())),
    };

    Ok(vec![(targets[0].clone(), destination)])
}

/// Write `pem` for `domain`. Files are truncated and replaced in place and the
/// directory must already exist.
pub fn deliver(pem: &str, domain: &str, destination: &Destination) -> Result<(), OutputError> {
    match destination.path_for(domain) {
        None => {
            let mut stdout = io::stdout().lock();
            stdout
                .write_all(pem.as_bytes())
                .and_then(|_| stdout.flush())
                .map_err(OutputError::Stdout)
        }
        Some(path) => {
            info!(domain = %domain, path = %path.display(), "Writing certificate");
            fs::write(&path, pem).map_err(|source| OutputError::Write { path, source })
        }
    }
}

mod key;

pub use key::{KeyAlgorithm, KeyError, KeyMaterial};

use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const ACCOUNT_SUFFIX: &str = "_account";
const CERTIFICATE_SUFFIX: &str = "_certificate";

/// Result type for key store operations
pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Key file name has no file stem: {0}")]
    InvalidKeyFile(PathBuf),

    #[error("Failed to read key file {path}: {source}")]
    Read { path: PathBuf, source: io::Error },

    #[error("Failed to parse key file {path}: {source}")]
    Parse { path: PathBuf, source: KeyError },

    #[error("Failed to write key file {path}: {source}")]
    Write { path: PathBuf, source: io::Error },

    #[error(transparent)]
    Key(#[from] KeyError),
}

/// The account key and certificate key used for one issuance attempt
#[derive(Debug, Clone)]
pub struct AccountCredentials {
    pub account_key: KeyMaterial,
    pub certificate_key: KeyMaterial,
    /// True when no sentinel was found and the keys were just generated
    pub new_account: bool,
}

/// Derived locations of the two key files
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPaths {
    pub sentinel: PathBuf,
    pub account_key: PathBuf,
    pub certificate_key: PathBuf,
}

impl KeyPaths {
    /// `dir/.lets_encrypt.pem` gives `dir/.lets_encrypt_account.pem` and
    /// `dir/.lets_encrypt_certificate.pem`
    pub fn derive(key_file: &Path) -> StoreResult<Self> {
        Ok(Self {
            sentinel: key_file.to_path_buf(),
            account_key: with_suffix(key_file, ACCOUNT_SUFFIX)?,
            certificate_key: with_suffix(key_file, CERTIFICATE_SUFFIX)?,
        })
    }
}

fn with_suffix(key_file: &Path, suffix: &str) -> StoreResult<PathBuf> {
    let stem = key_file
        .file_stem()
        .ok_or_else(|| StoreError::InvalidKeyFile(key_file.to_path_buf()))?;

    let mut name = OsString::from(stem);
    name.push(suffix);
    if let Some(extension) = key_file.extension() {
        name.push(".");
        name.push(extension);
    }

    Ok(key_file.with_file_name(name))
}

/// Loads and persists the account/certificate key pair for one key file name
#[derive(Debug, Clone)]
pub struct KeyStore {
    paths: KeyPaths,
    algorithm: KeyAlgorithm,
}

impl KeyStore {
    pub fn new(key_file: &Path, algorithm: KeyAlgorithm) -> StoreResult<Self> {
        Ok(Self {
            paths: KeyPaths::derive(key_file)?,
            algorithm,
        })
    }

    pub fn paths(&self) -> &KeyPaths {
        &self.paths
    }

    /// Load both keys when the sentinel exists, otherwise generate both.
    /// Generated keys are not written here; see [`KeyStore::persist`].
    pub fn load(&self) -> StoreResult<AccountCredentials> {
        if self.paths.sentinel.exists() {
            info!(
                account_key = %self.paths.account_key.display(),
                "Loading Let's Encrypt account keys"
            );

            let account_key = read_key(&self.paths.account_key)?;
            let certificate_key = read_key(&self.paths.certificate_key)?;

            Ok(AccountCredentials {
                account_key,
                certificate_key,
                new_account: false,
            })
        } else {
            info!(algorithm = %self.algorithm, "Creating Let's Encrypt account keys");

            Ok(AccountCredentials {
                account_key: KeyMaterial::generate(self.algorithm)?,
                certificate_key: KeyMaterial::generate(self.algorithm)?,
                new_account: true,
            })
        }
    }

    /// Write both keys to their derived paths. The sentinel is left alone.
    ///
    /// Both keys are staged next to their targets before either is renamed
    /// into place, so a failed write leaves the previous pair untouched.
    pub fn persist(&self, credentials: &AccountCredentials) -> StoreResult<()> {
        let account_temp = stage_key(&self.paths.account_key, &credentials.account_key)?;
        let certificate_temp =
            match stage_key(&self.paths.certificate_key, &credentials.certificate_key) {
                Ok(temp) => temp,
                Err(e) => {
                    let _ = fs::remove_file(&account_temp);
                    return Err(e);
                }
            };

        info!(path = %self.paths.account_key.display(), "Writing account credentials");
        commit_key(&account_temp, &self.paths.account_key)?;

        info!(path = %self.paths.certificate_key.display(), "Writing certificate key");
        commit_key(&certificate_temp, &self.paths.certificate_key)?;

        Ok(())
    }
}

fn read_key(path: &Path) -> StoreResult<KeyMaterial> {
    let pem = fs::read_to_string(path).map_err(|source| StoreError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    KeyMaterial::from_pem(&pem).map_err(|source| StoreError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn temp_path(path: &Path) -> PathBuf {
    let mut temp_name = path.as_os_str().to_os_string();
    temp_name.push(".tmp");
    PathBuf::from(temp_name)
}

/// Write `key` to the temp file beside `path` with owner-only permissions
fn stage_key(path: &Path, key: &KeyMaterial) -> StoreResult<PathBuf> {
    let temp_path = temp_path(path);
    let staged = fs::write(&temp_path, key.to_pem()).and_then(|_| restrict_permissions(&temp_path));

    if let Err(source) = staged {
        let _ = fs::remove_file(&temp_path);
        return Err(StoreError::Write {
            path: path.to_path_buf(),
            source,
        });
    }

    Ok(temp_path)
}

fn commit_key(temp_path: &Path, path: &Path) -> StoreResult<()> {
    fs::rename(temp_path, path).map_err(|source| StoreError::Write {
        path: path.to_path_buf(),
        source,
    })?;

    debug!(path = %path.display(), "Saved key file");
    Ok(())
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> io::Result<()> {
    Ok(())
}

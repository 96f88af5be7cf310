//! Atomic, permission-aware file output.
//!
//! Every write goes to a temporary file in the destination directory, gets its
//! permissions set while still empty, is filled and flushed to disk, and only
//! then is renamed over the final path. A crash at any point leaves either the
//! previous file or the complete new one, never a truncated mix.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::cert::Certificate;
use crate::encoding::{self, Format, KeyEncryption};
use crate::error::{LocalCaError, Result};
use crate::issuer::CertifiedKey;
use crate::key::KeyPair;

/// Unix permission bits for written files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilePermissions {
    /// `0o600`: private keys.
    OwnerOnly,
    /// `0o644`: certificates.
    Public,
}

impl FilePermissions {
    pub fn mode(&self) -> u32 {
        match self {
            FilePermissions::OwnerOnly => 0o600,
            FilePermissions::Public => 0o644,
        }
    }
}

/// A fully written temporary file waiting to be renamed into place.
///
/// Dropping a `StagedWrite` without committing removes the temporary file and
/// leaves the destination untouched.
#[derive(Debug)]
pub struct StagedWrite {
    temp: NamedTempFile,
    path: PathBuf,
    permissions: FilePermissions,
}

impl StagedWrite {
    /// Writes `bytes` to a temporary sibling of `path`.
    ///
    /// # Errors
    /// * `PathUnwritable` if the destination directory does not exist or
    ///   cannot be written.
    /// * `UnsafePermissions` if owner-only permissions cannot be enforced.
    pub fn stage(
        path: impl AsRef<Path>,
        bytes: &[u8],
        permissions: FilePermissions,
    ) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let dir = parent_dir(&path);

        let mut temp = tempfile::Builder::new()
            .prefix(".localca-")
            .suffix(".tmp")
            .tempfile_in(dir)
            .map_err(|e| unwritable(dir, e))?;

        restrict(&temp, &path, permissions)?;

        temp.write_all(bytes).map_err(|e| unwritable(&path, e))?;
        temp.as_file().sync_all().map_err(|e| unwritable(&path, e))?;

        Ok(Self {
            temp,
            path,
            permissions,
        })
    }

    /// Final destination of this write.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Renames the temporary file over the destination.
    pub fn commit(self) -> Result<PathBuf> {
        let Self {
            temp,
            path,
            permissions,
        } = self;

        temp.persist(&path).map_err(|e| unwritable(&path, e.error))?;
        sync_dir(parent_dir(&path));

        debug!(
            path = %path.display(),
            mode = %format!("{:o}", permissions.mode()),
            "wrote file"
        );
        Ok(path)
    }
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

#[cfg(unix)]
fn restrict(temp: &NamedTempFile, path: &Path, permissions: FilePermissions) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let file = temp.as_file();
    file.set_permissions(fs::Permissions::from_mode(permissions.mode()))
        .map_err(|e| unsafe_permissions(path, e.to_string()))?;

    let actual = file
        .metadata()
        .map_err(|e| unsafe_permissions(path, e.to_string()))?
        .permissions()
        .mode()
        & 0o777;
    if permissions == FilePermissions::OwnerOnly && actual & 0o077 != 0 {
        return Err(unsafe_permissions(
            path,
            format!("filesystem reports mode {actual:o} instead of 600"),
        ));
    }
    Ok(())
}

#[cfg(not(unix))]
fn restrict(_temp: &NamedTempFile, path: &Path, permissions: FilePermissions) -> Result<()> {
    match permissions {
        FilePermissions::OwnerOnly => Err(unsafe_permissions(
            path,
            "owner-only permissions are not supported on this platform".to_string(),
        )),
        FilePermissions::Public => Ok(()),
    }
}

// fsync the directory entry; the rename has already happened, errors are ignored.
#[cfg(unix)]
fn sync_dir(dir: &Path) {
    if let Ok(handle) = fs::File::open(dir) {
        let _ = handle.sync_all();
    }
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) {}

fn unwritable(path: &Path, err: std::io::Error) -> LocalCaError {
    LocalCaError::PathUnwritable {
        path: path.to_path_buf(),
        reason: err.to_string(),
    }
}

fn unsafe_permissions(path: &Path, reason: String) -> LocalCaError {
    LocalCaError::UnsafePermissions {
        path: path.to_path_buf(),
        reason,
    }
}

/// Atomically replaces `path` with `bytes`.
pub fn write_atomically(
    path: impl AsRef<Path>,
    bytes: &[u8],
    permissions: FilePermissions,
) -> Result<PathBuf> {
    StagedWrite::stage(path, bytes, permissions)?.commit()
}

/// Encodes and writes a private key with owner-only permissions, whether or
/// not it is encrypted.
pub fn write_private_key(
    path: impl AsRef<Path>,
    key: &KeyPair,
    format: Format,
    encryption: &KeyEncryption,
) -> Result<PathBuf> {
    let bytes = encoding::encode_private_key(key, format, encryption)?;
    write_atomically(path, &bytes, FilePermissions::OwnerOnly)
}

pub fn write_certificate(
    path: impl AsRef<Path>,
    certificate: &Certificate,
    format: Format,
) -> Result<PathBuf> {
    let bytes = encoding::encode_certificate(certificate, format)?;
    write_atomically(path, &bytes, FilePermissions::Public)
}

/// Paths produced by [`write_certified_key`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenFiles {
    pub key_path: PathBuf,
    pub certificate_path: PathBuf,
}

/// Writes `<dir>/<name>.key` and `<dir>/<name>.crt` (or their DER
/// counterparts).
///
/// Both files are staged before either is renamed, so an encoding or
/// permission failure leaves both destinations as they were. If the key is
/// renamed but the certificate rename fails, the previous key is put back (or
/// the new key removed when there was none), so the pair on disk always
/// matches.
pub fn write_certified_key(
    dir: impl AsRef<Path>,
    name: &str,
    certified: &CertifiedKey,
    format: Format,
    encryption: &KeyEncryption,
) -> Result<WrittenFiles> {
    let dir = dir.as_ref();
    let key_path = dir.join(format!("{name}.{}", format.key_extension()));
    let certificate_path = dir.join(format!("{name}.{}", format.certificate_extension()));

    let key_bytes = encoding::encode_private_key(certified.key(), format, encryption)?;
    let certificate_bytes = encoding::encode_certificate(certified.certificate(), format)?;

    let key = StagedWrite::stage(&key_path, &key_bytes, FilePermissions::OwnerOnly)?;
    let certificate =
        StagedWrite::stage(&certificate_path, &certificate_bytes, FilePermissions::Public)?;
    let previous_key = stage_previous(&key_path)?;

    let key_path = key.commit()?;
    let certificate_path = match certificate.commit() {
        Ok(path) => path,
        Err(err) => {
            restore_previous(&key_path, previous_key);
            return Err(err);
        }
    };

    Ok(WrittenFiles {
        key_path,
        certificate_path,
    })
}

/// Stages a copy of the file currently at `path`, if any.
fn stage_previous(path: &Path) -> Result<Option<StagedWrite>> {
    match fs::read(path) {
        Ok(previous) => Ok(Some(StagedWrite::stage(
            path,
            &previous,
            FilePermissions::OwnerOnly,
        )?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(unwritable(path, e)),
    }
}

// Best effort; the original error is what the caller sees.
fn restore_previous(path: &Path, previous: Option<StagedWrite>) {
    let restored = match previous {
        Some(previous) => previous.commit().map(|_| ()),
        None => fs::remove_file(path).map_err(|e| unwritable(path, e)),
    };
    if let Err(err) = restored {
        warn!(path = %path.display(), %err, "could not roll back key file");
    }
}

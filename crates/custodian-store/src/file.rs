//! Owner-only file primitives.
//!
//! Every file written through this module is created with mode `0600` and
//! every directory with mode `0700` on Unix. Other platforms fall back to
//! the default ACLs of the parent directory.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::Path;

use crate::error::{StoreError, StoreResult};

/// Create `dir` (and parents) and restrict it to the current user.
pub fn ensure_private_dir(dir: &Path) -> StoreResult<()> {
    fs::create_dir_all(dir).map_err(|e| StoreError::io(dir, e))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(dir, fs::Permissions::from_mode(0o700))
            .map_err(|e| StoreError::io(dir, e))?;
    }

    Ok(())
}

/// Restrict an existing file to owner read/write.
pub fn restrict_to_owner(path: &Path) -> StoreResult<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))
            .map_err(|e| StoreError::io(path, e))?;
    }

    #[cfg(not(unix))]
    let _ = path;

    Ok(())
}

fn private_options() -> OpenOptions {
    let mut options = OpenOptions::new();

    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    options
}

/// Replace the contents of `path` with `bytes` atomically.
///
/// The data is written to a hidden sibling file, flushed to disk, and
/// renamed over `path`, so readers observe either the old or the new
/// contents and never a partial write.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> StoreResult<()> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| StoreError::io(path, std::io::ErrorKind::InvalidInput.into()))?;
    let tmp = path.with_file_name(format!(".{file_name}.tmp"));

    {
        let mut file: File = private_options()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&tmp)
            .map_err(|e| StoreError::io(&tmp, e))?;
        file.write_all(bytes).map_err(|e| StoreError::io(&tmp, e))?;
        file.sync_all().map_err(|e| StoreError::io(&tmp, e))?;
    }

    restrict_to_owner(&tmp)?;
    fs::rename(&tmp, path).map_err(|e| StoreError::io(path, e))?;

    tracing::trace!(path = %path.display(), bytes = bytes.len(), "replaced file atomically");
    Ok(())
}

/// Append `line` plus a trailing newline to `path`, creating the file if
/// needed.
///
/// A write that fails partway is cut back to the previous length, so the
/// next append never lands on half a line.
///
/// Returns the file size after the append.
pub fn append_line(path: &Path, line: &str) -> StoreResult<u64> {
    let mut buf = Vec::with_capacity(line.len() + 1);
    buf.extend_from_slice(line.as_bytes());
    buf.push(b'\n');

    let mut file = private_options()
        .append(true)
        .create(true)
        .open(path)
        .map_err(|e| StoreError::io(path, e))?;
    let start = file.metadata().map_err(|e| StoreError::io(path, e))?.len();

    write_or_rollback(&mut file, &buf, |file| file.set_len(start))
        .map_err(|e| StoreError::io(path, e))?;

    Ok(start + buf.len() as u64)
}

/// Write all of `bytes`, running `rollback` if the write or flush fails.
///
/// The write error is returned either way; a failed rollback is logged.
fn write_or_rollback<W: Write>(
    writer: &mut W,
    bytes: &[u8],
    rollback: impl FnOnce(&mut W) -> std::io::Result<()>,
) -> std::io::Result<()> {
    let result = writer.write_all(bytes).and_then(|()| writer.flush());
    if let Err(e) = &result
        && let Err(rollback_err) = rollback(writer)
    {
        tracing::error!(
            error = %e,
            rollback_error = %rollback_err,
            "partial append could not be rolled back"
        );
    }
    result
}

/// Return the last non-empty line of `path`, or `None` if the file is empty.
pub fn read_last_line(path: &Path) -> StoreResult<Option<String>> {
    let content = fs::read_to_string(path).map_err(|e| StoreError::io(path, e))?;
    Ok(content
        .lines()
        .rev()
        .find(|l| !l.trim().is_empty())
        .map(str::to_string))
}

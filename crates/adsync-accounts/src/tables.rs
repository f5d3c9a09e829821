//! Colon-separated account tables (`passwd`, `shadow`, `group`)
//!
//! Parsing is lenient: blank lines, comments and lines with too few fields are
//! skipped when reading and preserved verbatim when a field is rewritten.

use std::io::ErrorKind;
use std::os::unix::fs::{fchown, MetadataExt, PermissionsExt};
use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument, warn};

use adsync_core::domain::AccountError;

/// Field index of the password in `passwd` and `shadow`
pub const PASSWORD_FIELD: usize = 1;
/// Field index of the comment (GECOS) in `passwd`
pub const GECOS_FIELD: usize = 4;

/// One `passwd` line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswdEntry {
    pub name: String,
    pub password: String,
    pub uid: u32,
    pub gid: u32,
    pub gecos: String,
    pub home: String,
    pub shell: String,
}

/// One `group` line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupEntry {
    pub name: String,
    pub gid: u32,
    /// Supplementary members; accounts with this as primary group are not listed
    pub members: Vec<String>,
}

fn records(content: &str) -> impl Iterator<Item = Vec<&str>> {
    content
        .lines()
        .filter(|line| !line.trim().is_empty() && !line.starts_with('#'))
        .map(|line| line.split(':').collect::<Vec<_>>())
}

/// Parses a `passwd` table
pub fn parse_passwd(content: &str) -> Vec<PasswdEntry> {
    records(content)
        .filter(|fields| fields.len() >= 7)
        .filter_map(|f| {
            Some(PasswdEntry {
                name: f[0].to_string(),
                password: f[1].to_string(),
                uid: f[2].parse().ok()?,
                gid: f[3].parse().ok()?,
                gecos: f[4].to_string(),
                home: f[5].to_string(),
                shell: f[6].to_string(),
            })
        })
        .collect()
}

/// Parses a `group` table
pub fn parse_group(content: &str) -> Vec<GroupEntry> {
    records(content)
        .filter(|fields| fields.len() >= 4)
        .filter_map(|f| {
            Some(GroupEntry {
                name: f[0].to_string(),
                gid: f[2].parse().ok()?,
                members: f[3]
                    .split(',')
                    .map(str::trim)
                    .filter(|m| !m.is_empty())
                    .map(str::to_string)
                    .collect(),
            })
        })
        .collect()
}

/// Replaces field `index` of the line keyed by `key`
///
/// # Returns
/// `Some(new_content)` when the line exists, `None` otherwise. The content is
/// returned unchanged (but `Some`) if the field already holds `value`.
pub fn set_field(content: &str, key: &str, index: usize, value: &str) -> Option<String> {
    let mut found = false;
    let mut out = String::with_capacity(content.len() + value.len());

    for line in content.split_inclusive('\n') {
        let (body, newline) = match line.strip_suffix('\n') {
            Some(body) => (body, "\n"),
            None => (line, ""),
        };
        let mut fields: Vec<&str> = body.split(':').collect();
        if !found && fields.first() == Some(&key) && fields.len() > index {
            found = true;
            fields[index] = value;
            out.push_str(&fields.join(":"));
            out.push_str(newline);
        } else {
            out.push_str(line);
        }
    }

    found.then_some(out)
}

/// Reads a whole table
pub async fn read_table(path: &Path) -> Result<String, AccountError> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|e| AccountError::io(path, e))
}

fn temp_path(target: &Path) -> PathBuf {
    let mut p = target.as_os_str().to_owned();
    p.push(".adsync-tmp");
    PathBuf::from(p)
}

/// Replaces a table atomically, keeping the original file's mode, owner
/// and group
///
/// The temporary file is created with the original mode and handed to the
/// original owner before any content is written to it.
#[instrument(skip(content), fields(path = %path.display(), bytes = content.len()))]
pub async fn write_table(path: &Path, content: &str) -> Result<(), AccountError> {
    let tmp_path = temp_path(path);
    let metadata = tokio::fs::metadata(path)
        .await
        .map_err(|e| AccountError::io(path, e))?;

    // A leftover from an interrupted write may carry other permissions
    match tokio::fs::remove_file(&tmp_path).await {
        Ok(()) => warn!(?tmp_path, "removed stale temporary file"),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => return Err(AccountError::io(&tmp_path, e)),
    }

    debug!(?tmp_path, "writing to temporary file");
    if let Err(e) = write_temp(&tmp_path, &metadata, content).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(AccountError::io(&tmp_path, e));
    }

    // Same directory, so the rename is atomic
    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| AccountError::io(path, e))?;

    debug!("write complete");
    Ok(())
}

async fn write_temp(
    tmp_path: &Path,
    original: &std::fs::Metadata,
    content: &str,
) -> std::io::Result<()> {
    let mut file = tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(original.permissions().mode() & 0o7777)
        .open(tmp_path)
        .await?;
    fchown(&file, Some(original.uid()), Some(original.gid()))?;
    // The umask may have cleared bits of the requested mode
    file.set_permissions(original.permissions()).await?;

    file.write_all(content.as_bytes()).await?;
    file.sync_all().await
}

use chrono::Local;
use serde::Serialize;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

#[derive(Debug, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct BackupOutcome {
    pub backup_path: Option<PathBuf>,
    pub final_path: PathBuf,
}

#[derive(Debug, thiserror::Error)]
pub enum BackupError {
    #[error("{0}")]
    Io(#[from] io::Error),
    #[error("could not create backup {}: {source}", path.display())]
    BackupCreate {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("target path {} has no parent directory", .0.display())]
    NoParent(PathBuf),
}

impl BackupError {
    pub fn into_io(self) -> io::Error {
        match self {
            Self::Io(err) | Self::BackupCreate { source: err, .. } => err,
            Self::NoParent(path) => io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} has no parent directory", path.display()),
            ),
        }
    }
}

/// Writes `contents` to a temporary sibling of `target` and renames it into
/// place. With `keep_backup`, an existing target is first copied to
/// `<name>.bak.<timestamp>`.
pub fn backup_and_swap(
    target: &Path,
    contents: &[u8],
    keep_backup: bool,
) -> Result<BackupOutcome, BackupError> {
    let parent = match target.parent() {
        Some(parent) if parent.as_os_str().is_empty() => Path::new("."),
        Some(parent) => parent,
        None => return Err(BackupError::NoParent(target.to_path_buf())),
    };
    fs::create_dir_all(parent)?;

    let backup_path = if keep_backup && target.exists() {
        let candidate = build_backup_path(target);
        fs::copy(target, &candidate).map_err(|source| BackupError::BackupCreate {
            path: candidate.clone(),
            source,
        })?;
        log::debug!("backed up {} to {}", target.display(), candidate.display());
        Some(candidate)
    } else {
        None
    };

    let temp_path = build_temp_path(target);
    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&temp_path)?;
    file.write_all(contents)?;
    file.sync_all()?;
    drop(file);

    #[cfg(target_os = "windows")]
    {
        use std::io::ErrorKind;
        if let Err(err) = fs::rename(&temp_path, target) {
            if err.kind() == ErrorKind::AlreadyExists {
                fs::remove_file(target)?;
                fs::rename(&temp_path, target)?;
            } else {
                let _ = fs::remove_file(&temp_path);
                return Err(BackupError::Io(err));
            }
        }
    }

    #[cfg(not(target_os = "windows"))]
    {
        if let Err(err) = fs::rename(&temp_path, target) {
            let _ = fs::remove_file(&temp_path);
            return Err(BackupError::Io(err));
        }
    }

    Ok(BackupOutcome {
        backup_path,
        final_path: target.to_path_buf(),
    })
}

fn build_backup_path(target: &Path) -> PathBuf {
    let timestamp = Local::now().format("%Y%m%d%H%M%S");
    append_to_file_name(target, &format!(".bak.{timestamp}"))
}

fn build_temp_path(target: &Path) -> PathBuf {
    let pid = std::process::id();
    append_to_file_name(target, &format!("__tmp__pid_{pid}"))
}

fn append_to_file_name(target: &Path, suffix: &str) -> PathBuf {
    let mut path = target.to_path_buf();
    match path.file_name() {
        Some(name) => {
            let mut os_string = name.to_os_string();
            os_string.push(suffix);
            path.set_file_name(os_string);
        }
        None => path.push(format!("catalog{suffix}")),
    }
    path
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn writes_backup_and_swaps() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("tiled_hi.ts");
        fs::write(&target, b"original").unwrap();

        let outcome = backup_and_swap(&target, b"merged", true).unwrap();
        let backup = outcome.backup_path.expect("backup created");
        assert!(backup
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("tiled_hi.ts.bak."));
        assert_eq!(fs::read_to_string(&backup).unwrap(), "original");
        assert_eq!(fs::read_to_string(&target).unwrap(), "merged");
    }

    #[test]
    fn skips_backup_when_disabled() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("tiled_hi.ts");
        fs::write(&target, b"original").unwrap();

        let outcome = backup_and_swap(&target, b"merged", false).unwrap();
        assert!(outcome.backup_path.is_none());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn creates_missing_directories() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("translations").join("tiled_hi.ts");

        let outcome = backup_and_swap(&target, b"<TS/>", true).unwrap();
        assert!(outcome.backup_path.is_none());
        assert_eq!(fs::read(&target).unwrap(), b"<TS/>");
    }
}

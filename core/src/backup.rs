use chrono::Local;
use serde::Serialize;
use std::fs;
use std::io;
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
    #[error("could not back up existing output: {0}")]
    BackupCreate(String),
}

/// Moves a finished temporary file onto `target`.
///
/// An existing file at `target` is first copied to `<name>.bak.<timestamp>`.
pub fn swap_into_place(temp_path: &Path, target: &Path) -> Result<BackupOutcome, BackupError> {
    let backup_path = if target.exists() {
        let candidate = backup_path_for(target, &Local::now().format("%Y%m%d%H%M%S").to_string());
        fs::copy(target, &candidate).map_err(|err| BackupError::BackupCreate(err.to_string()))?;
        Some(candidate)
    } else {
        None
    };

    #[cfg(target_os = "windows")]
    {
        use std::io::ErrorKind;
        if let Err(err) = fs::rename(temp_path, target) {
            if err.kind() == ErrorKind::AlreadyExists {
                fs::remove_file(target)?;
                fs::rename(temp_path, target)?;
            } else {
                return Err(BackupError::Io(err));
            }
        }
    }

    #[cfg(not(target_os = "windows"))]
    {
        fs::rename(temp_path, target)?;
    }

    Ok(BackupOutcome {
        backup_path,
        final_path: target.to_path_buf(),
    })
}

fn backup_path_for(target: &Path, timestamp: &str) -> PathBuf {
    let mut name = target
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_else(|| "output".into());
    name.push(format!(".bak.{timestamp}"));
    target.with_file_name(name)
}

/// Sibling path the archive is written to before [`swap_into_place`].
pub fn build_temp_path(target: &Path) -> PathBuf {
    let mut temp = target.to_path_buf();
    let pid = std::process::id();
    let suffix = format!("__tmp__pid_{}", pid);
    match temp.file_name() {
        Some(name) => {
            let mut os_string = name.to_os_string();
            os_string.push(suffix);
            temp.set_file_name(os_string);
        }
        None => {
            temp.push(format!("temp_{pid}"));
        }
    }
    temp
}

//! Append-only JSONL result file.

use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::warn;

use crate::models::result::ValidationResult;
use crate::{AppError, Result};

use super::{ResultSink, StoreFuture};

/// Result sink writing one JSON object per line.
///
/// Each [`append`](ResultSink::append) writes the whole batch with one
/// write and syncs it before returning; a failed write is rolled back to
/// the previous file length so a retried batch is not duplicated. A line
/// cut short by a crash is skipped when the file is read back, as is a
/// repeated result id.
pub struct JsonlResultWriter {
    path: PathBuf,
    file: Mutex<Option<File>>,
}

impl JsonlResultWriter {
    /// Open `path` for appending, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if the directory or file cannot be created.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| {
                AppError::Io(format!(
                    "failed to create results directory {}: {e}",
                    parent.display()
                ))
            })?;
        }
        let mut file = Self::open_file(&path)?;
        if ends_mid_line(&path)? {
            file.write_all(b"\n")
                .map_err(|e| AppError::Io(format!("failed to repair {}: {e}", path.display())))?;
        }
        Ok(Self {
            path,
            file: Mutex::new(Some(file)),
        })
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove all previously written results, used by `--fresh`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if the file cannot be truncated.
    pub fn truncate(&self) -> Result<()> {
        let mut guard = self
            .file
            .lock()
            .map_err(|_| AppError::Io("result writer mutex poisoned".to_owned()))?;
        *guard = None;
        File::create(&self.path).map_err(|e| {
            AppError::Io(format!("failed to truncate {}: {e}", self.path.display()))
        })?;
        *guard = Some(Self::open_file(&self.path)?);
        Ok(())
    }

    /// Read back every complete result line in the file, first occurrence
    /// of each result id only.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if the file cannot be read.
    pub fn read_all(&self) -> Result<Vec<ValidationResult>> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                return Err(AppError::Io(format!(
                    "failed to open {}: {err}",
                    self.path.display()
                )))
            }
        };

        let mut results = Vec::new();
        let mut seen = HashSet::new();
        for (line_no, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(|e| AppError::Io(format!("failed to read results: {e}")))?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<ValidationResult>(&line) {
                Ok(result) => {
                    if seen.insert(result.id.clone()) {
                        results.push(result);
                    }
                }
                Err(err) => warn!(
                    path = %self.path.display(),
                    line = line_no + 1,
                    %err,
                    "skipping unreadable result line"
                ),
            }
        }
        Ok(results)
    }

    fn open_file(path: &Path) -> Result<File> {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| AppError::Io(format!("failed to open {}: {e}", path.display())))
    }

    fn write_batch(&self, results: &[ValidationResult]) -> Result<()> {
        let mut batch = Vec::new();
        for result in results {
            serde_json::to_writer(&mut batch, result)?;
            batch.push(b'\n');
        }

        let mut guard = self
            .file
            .lock()
            .map_err(|_| AppError::Io("result writer mutex poisoned".to_owned()))?;
        let file = guard
            .as_mut()
            .ok_or_else(|| AppError::Io("result writer is closed".to_owned()))?;

        let before = file
            .metadata()
            .map_err(|e| AppError::Io(format!("failed to stat {}: {e}", self.path.display())))?
            .len();
        if let Err(err) = file.write_all(&batch) {
            if let Err(rollback) = file.set_len(before) {
                warn!(path = %self.path.display(), %rollback, "failed to roll back partial batch");
            }
            return Err(AppError::Io(format!("result write failed: {err}")));
        }
        file.sync_data()
            .map_err(|e| AppError::Io(format!("result sync failed: {e}")))
    }
}

/// Whether the last byte of `path` is something other than a newline.
fn ends_mid_line(path: &Path) -> Result<bool> {
    let io_err =
        |e: std::io::Error| AppError::Io(format!("failed to inspect {}: {e}", path.display()));
    let mut file = File::open(path).map_err(io_err)?;
    if file.metadata().map_err(io_err)?.len() == 0 {
        return Ok(false);
    }
    file.seek(SeekFrom::End(-1)).map_err(io_err)?;
    let mut last = [0_u8; 1];
    file.read_exact(&mut last).map_err(io_err)?;
    Ok(last[0] != b'\n')
}

impl ResultSink for JsonlResultWriter {
    fn append<'a>(&'a self, results: &'a [ValidationResult]) -> StoreFuture<'a, ()> {
        Box::pin(async move { self.write_batch(results) })
    }

    fn recorded_indices(&self) -> StoreFuture<'_, HashSet<usize>> {
        Box::pin(async move {
            Ok(self
                .read_all()?
                .into_iter()
                .map(|result| result.index)
                .collect())
        })
    }
}

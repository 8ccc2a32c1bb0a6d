use std::fs::{File, OpenOptions};
use std::path::PathBuf;

use chrono::{DateTime, Local};
use fs2::FileExt;
use tracing::warn;

pub const HEADER: [&str; 4] = ["timestamp", "user_input", "bot_response", "files"];
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One completed exchange.
#[derive(Debug, Clone)]
pub struct InteractionRecord {
    pub timestamp: DateTime<Local>,
    pub user_input: String,
    pub bot_response: String,
    pub file_paths: Vec<String>,
}

impl InteractionRecord {
    pub fn now(
        user_input: impl Into<String>,
        bot_response: impl Into<String>,
        file_paths: Vec<String>,
    ) -> Self {
        Self {
            timestamp: Local::now(),
            user_input: user_input.into(),
            bot_response: bot_response.into(),
            file_paths,
        }
    }

    /// Comma-joined paths. Paths containing commas are not escaped.
    pub fn files_field(&self) -> String {
        self.file_paths.join(",")
    }

    fn row(&self) -> [String; 4] {
        [
            self.timestamp.format(TIMESTAMP_FORMAT).to_string(),
            self.user_input.clone(),
            self.bot_response.clone(),
            self.files_field(),
        ]
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LogError {
    #[error("interaction log {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("interaction log csv error: {0}")]
    Csv(#[from] csv::Error),
}

/// Append-only CSV sink for completed exchanges.
///
/// Every append holds an exclusive advisory lock on the file while it checks
/// for the header and writes its row, so writers in other agents or processes
/// never interleave partial rows.
#[derive(Debug, Clone)]
pub struct InteractionLogger {
    path: PathBuf,
}

impl InteractionLogger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Create the log (and its header) up front.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, LogError> {
        let logger = Self::new(path);
        let file = logger.open_locked()?;
        let result = logger.ensure_header(&file);
        logger.unlock(&file);
        result?;
        Ok(logger)
    }

    pub fn record(&self, record: &InteractionRecord) -> Result<(), LogError> {
        let file = self.open_locked()?;
        let result = self
            .ensure_header(&file)
            .and_then(|()| self.append_row(&file, record));
        self.unlock(&file);
        result
    }

    pub fn record_exchange(
        &self,
        user_input: &str,
        bot_response: &str,
        file_paths: &[String],
    ) -> Result<(), LogError> {
        self.record(&InteractionRecord::now(
            user_input,
            bot_response,
            file_paths.to_vec(),
        ))
    }

    fn io_err(&self, source: std::io::Error) -> LogError {
        LogError::Io {
            path: self.path.clone(),
            source,
        }
    }

    fn open_locked(&self) -> Result<File, LogError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| self.io_err(e))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| self.io_err(e))?;
        file.lock_exclusive().map_err(|e| self.io_err(e))?;
        Ok(file)
    }

    /// Closing the file drops the lock as well, so a failed unlock is only logged.
    fn unlock(&self, file: &File) {
        if let Err(err) = FileExt::unlock(file) {
            warn!(path = %self.path.display(), error = %err, "failed to unlock interaction log");
        }
    }

    fn ensure_header(&self, file: &File) -> Result<(), LogError> {
        let len = file.metadata().map_err(|e| self.io_err(e))?.len();
        if len > 0 {
            return Ok(());
        }
        let mut writer = csv::WriterBuilder::new().from_writer(file);
        writer.write_record(HEADER)?;
        writer.flush().map_err(|e| self.io_err(e))
    }

    fn append_row(&self, file: &File, record: &InteractionRecord) -> Result<(), LogError> {
        let mut writer = csv::WriterBuilder::new().from_writer(file);
        writer.write_record(record.row())?;
        writer.flush().map_err(|e| self.io_err(e))
    }
}

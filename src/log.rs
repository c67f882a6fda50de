//! Alert history written to date-stamped log files.

use chrono::{DateTime, Local, NaiveDate};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::fleet::AlertRaised;

/// Appends one line per alert to `alerts-YYYYMMDD.log`, rolling over at midnight.
pub struct AlertLogger {
    log_dir: PathBuf,
    file: Option<File>,
    date: Option<NaiveDate>,
}

impl AlertLogger {
    /// Returns None if log_dir is None (alert logging disabled).
    /// Relative paths are resolved against the current working directory.
    pub fn new(log_dir: Option<&str>) -> Option<Self> {
        let log_path = PathBuf::from(log_dir?);
        let log_path = if log_path.is_absolute() {
            log_path
        } else {
            std::env::current_dir()
                .map(|cwd| cwd.join(&log_path))
                .unwrap_or(log_path)
        };

        if let Err(e) = fs::create_dir_all(&log_path) {
            warn!(
                "Failed to create log directory '{}': {}",
                log_path.display(),
                e
            );
            return None;
        }

        Some(Self {
            log_dir: log_path,
            file: None,
            date: None,
        })
    }

    pub fn log_file_path(log_dir: &Path, date: NaiveDate) -> PathBuf {
        log_dir.join(format!("alerts-{}.log", date.format("%Y%m%d")))
    }

    fn ensure_file(&mut self, today: NaiveDate) -> Option<&mut File> {
        if self.date != Some(today) {
            self.file = None;
            self.date = None;

            let path = Self::log_file_path(&self.log_dir, today);
            match OpenOptions::new().create(true).append(true).open(&path) {
                Ok(file) => {
                    self.file = Some(file);
                    self.date = Some(today);
                }
                Err(e) => {
                    warn!("Failed to open log file '{}': {}", path.display(), e);
                    return None;
                }
            }
        }
        self.file.as_mut()
    }

    pub fn log_alert(&mut self, alert: &AlertRaised) {
        self.log_alert_at(alert, Local::now());
    }

    fn log_alert_at(&mut self, alert: &AlertRaised, at: DateTime<Local>) {
        if let Some(file) = self.ensure_file(at.date_naive()) {
            let _ = writeln!(
                file,
                "{} unknown person on camera {} ({}), {} alert pixels",
                at.format("%H:%M:%S"),
                alert.camera,
                alert.name,
                alert.matches
            );
        }
    }
}

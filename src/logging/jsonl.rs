//! JSONL journal of keeper sessions, mode changes and simulated moves.

use anyhow::{Context, Result};
use chrono::{DateTime, Local, Utc};
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use tracing::{debug, info, warn};

use crate::keeper::{Cause, KeeperEvent};

/// One journal line.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum JournalEntry {
    SessionStart {
        timestamp: DateTime<Utc>,
        version: String,
    },
    SessionEnd {
        timestamp: DateTime<Utc>,
        moves: u64,
    },
    Paused {
        timestamp: DateTime<Utc>,
        cause: Cause,
    },
    Resumed {
        timestamp: DateTime<Utc>,
        cause: Cause,
    },
    Moved {
        timestamp: DateTime<Utc>,
        from_x: i32,
        from_y: i32,
        to_x: i32,
        to_y: i32,
    },
}

impl From<&KeeperEvent> for JournalEntry {
    fn from(event: &KeeperEvent) -> Self {
        let timestamp = Utc::now();
        match *event {
            KeeperEvent::ModeChanged { paused: true, cause } => Self::Paused { timestamp, cause },
            KeeperEvent::ModeChanged { paused: false, cause } => Self::Resumed { timestamp, cause },
            KeeperEvent::Moved { from, to } => Self::Moved {
                timestamp,
                from_x: from.x,
                from_y: from.y,
                to_x: to.x,
                to_y: to.y,
            },
        }
    }
}

/// Append-only journal with one file per local day.
pub struct JsonlLogger {
    logs_dir: PathBuf,
    current_file: Option<BufWriter<File>>,
    current_date: Option<String>,
}

impl JsonlLogger {
    /// Create a new journal writing into `logs_dir`.
    pub fn new(logs_dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&logs_dir)
            .with_context(|| format!("Failed to create logs directory: {:?}", logs_dir))?;

        Ok(Self {
            logs_dir,
            current_file: None,
            current_date: None,
        })
    }

    /// Open the journal and record the session start.
    ///
    /// Any failure is logged and yields `None`; the daemon runs without a
    /// journal rather than stopping.
    pub fn open_session(logs_dir: PathBuf, version: &str) -> Option<Self> {
        let mut journal = match Self::new(logs_dir) {
            Ok(journal) => journal,
            Err(e) => {
                warn!("Journal disabled: {:#}", e);
                return None;
            }
        };
        if let Err(e) = journal.log_session_start(version) {
            warn!("Journal disabled: {:#}", e);
            return None;
        }
        Some(journal)
    }

    /// Get or create the journal file for today.
    fn get_writer(&mut self) -> Result<&mut BufWriter<File>> {
        let today = Local::now().format("%Y-%m-%d").to_string();

        if self.current_date.as_ref() != Some(&today) {
            let log_path = self.logs_dir.join(format!("{}.jsonl", today));

            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&log_path)
                .with_context(|| format!("Failed to open journal file: {:?}", log_path))?;

            self.current_file = Some(BufWriter::new(file));
            self.current_date = Some(today);

            debug!("Opened journal file: {:?}", log_path);
        }

        self.current_file
            .as_mut()
            .ok_or_else(|| anyhow::anyhow!("No journal file available"))
    }

    fn write_line(&mut self, entry: &JournalEntry) -> Result<()> {
        let line = serde_json::to_string(entry)?;
        let writer = self.get_writer()?;
        writeln!(writer, "{}", line)?;
        writer.flush()?;
        Ok(())
    }

    pub fn log_session_start(&mut self, version: &str) -> Result<()> {
        info!("Session started");
        self.write_line(&JournalEntry::SessionStart {
            timestamp: Utc::now(),
            version: version.to_string(),
        })
    }

    pub fn log_session_end(&mut self, moves: u64) -> Result<()> {
        info!("Session ended, {} simulated moves", moves);
        self.write_line(&JournalEntry::SessionEnd {
            timestamp: Utc::now(),
            moves,
        })
    }

    pub fn log_event(&mut self, event: &KeeperEvent) -> Result<()> {
        self.write_line(&JournalEntry::from(event))
    }
}

impl Drop for JsonlLogger {
    fn drop(&mut self) {
        if let Some(ref mut writer) = self.current_file {
            let _ = writer.flush();
        }
    }
}

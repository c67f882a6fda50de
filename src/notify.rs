//! Operator notifications.

use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Local};
use tokio::time::Instant;
use tracing::{error, info, warn};

/// How long a notice stays on screen
pub const NOTICE_TTL: Duration = Duration::from_secs(5);

/// Notices kept on the board at once; older ones drop off
const MAX_NOTICES: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Info,
    Success,
    Warning,
    Error,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Level::Info => "info",
            Level::Success => "success",
            Level::Warning => "warning",
            Level::Error => "error",
        };
        f.write_str(name)
    }
}

/// Leveled free-text channel to the operator
pub trait Notifier {
    fn notify(&mut self, level: Level, message: String);
}

#[derive(Debug, Clone)]
pub struct Notice {
    pub level: Level,
    pub message: String,
    pub stamp: DateTime<Local>,
    shown_at: Instant,
}

/// Recent notices, each visible for `NOTICE_TTL`
pub struct NotificationBoard {
    notices: VecDeque<Notice>,
    ttl: Duration,
    /// Newest notices not yet handed out by `take_unseen`
    unseen: usize,
}

impl Default for NotificationBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationBoard {
    pub fn new() -> Self {
        Self {
            notices: VecDeque::with_capacity(MAX_NOTICES),
            ttl: NOTICE_TTL,
            unseen: 0,
        }
    }

    pub fn push(&mut self, level: Level, message: String) {
        if self.notices.len() == MAX_NOTICES {
            self.notices.pop_front();
        }
        self.notices.push_back(Notice {
            level,
            message,
            stamp: Local::now(),
            shown_at: Instant::now(),
        });
        self.unseen = (self.unseen + 1).min(self.notices.len());
    }

    /// Notices pushed since the last call, oldest first
    pub fn take_unseen(&mut self) -> Vec<Notice> {
        let skip = self.notices.len() - self.unseen;
        self.unseen = 0;
        self.notices.iter().skip(skip).cloned().collect()
    }

    /// Drop expired notices. Returns true if anything was removed.
    pub fn expire(&mut self, now: Instant) -> bool {
        let before = self.notices.len();
        let ttl = self.ttl;
        self.notices.retain(|n| now.saturating_duration_since(n.shown_at) < ttl);
        self.unseen = self.unseen.min(self.notices.len());
        self.notices.len() != before
    }

    pub fn visible(&self) -> impl Iterator<Item = &Notice> {
        self.notices.iter()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.notices.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.notices.is_empty()
    }
}

impl Notifier for NotificationBoard {
    fn notify(&mut self, level: Level, message: String) {
        match level {
            Level::Info | Level::Success => info!(%level, "{}", message),
            Level::Warning => warn!("{}", message),
            Level::Error => error!("{}", message),
        }
        self.push(level, message);
    }
}

//! Статусные сообщения: пишутся в лог и попадают на страницу дашборда.

use tracing::{error, info, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Level {
    Info,
    Success,
    Warning,
    Error,
}

impl Level {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Success => "ok",
            Self::Warning => "warn",
            Self::Error => "err",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StatusEntry {
    pub level: Level,
    pub message: String,
}

#[derive(Debug, Default)]
pub struct StatusLog {
    entries: Vec<StatusEntry>,
}

impl StatusLog {
    pub fn info(&mut self, message: impl Into<String>) {
        self.push(Level::Info, message.into());
    }

    pub fn success(&mut self, message: impl Into<String>) {
        self.push(Level::Success, message.into());
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.push(Level::Warning, message.into());
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.push(Level::Error, message.into());
    }

    pub fn entries(&self) -> &[StatusEntry] {
        &self.entries
    }

    pub fn has_errors(&self) -> bool {
        self.entries.iter().any(|entry| entry.level == Level::Error)
    }

    fn push(&mut self, level: Level, message: String) {
        let status = level.as_str();
        match level {
            Level::Info | Level::Success => info!(status, "{message}"),
            Level::Warning => warn!(status, "{message}"),
            Level::Error => error!(status, "{message}"),
        }
        self.entries.push(StatusEntry { level, message });
    }
}

use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    Info,
    Warning,
    Error,
}

/// A transient status-line message that disappears after its duration.
#[derive(Debug, Clone)]
pub struct Notification {
    pub message: String,
    pub level: NotificationLevel,
    pub expires_at: Instant,
}

impl Notification {
    pub fn new(message: impl Into<String>, level: NotificationLevel, duration: Duration) -> Self {
        Self {
            message: message.into(),
            level,
            expires_at: Instant::now() + duration,
        }
    }

    pub fn info(message: impl Into<String>, duration: Duration) -> Self {
        Self::new(message, NotificationLevel::Info, duration)
    }

    pub fn warning(message: impl Into<String>, duration: Duration) -> Self {
        Self::new(message, NotificationLevel::Warning, duration)
    }

    pub fn error(message: impl Into<String>, duration: Duration) -> Self {
        Self::new(message, NotificationLevel::Error, duration)
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

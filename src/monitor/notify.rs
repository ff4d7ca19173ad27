use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub message: String,
    pub severity: Severity,
    pub expires_at: Instant,
}

/// Single-slot status message. The latest `show` wins and restarts the expiry.
#[derive(Debug)]
pub struct NotificationSlot {
    ttl: Duration,
    current: Option<Notification>,
}

impl NotificationSlot {
    pub fn new(ttl: Duration) -> Self {
        Self { ttl, current: None }
    }

    pub fn show(&mut self, message: impl Into<String>, severity: Severity, now: Instant) {
        self.current = Some(Notification {
            message: message.into(),
            severity,
            expires_at: now + self.ttl,
        });
    }

    pub fn current(&self) -> Option<&Notification> {
        self.current.as_ref()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.current.as_ref().map(|n| n.expires_at)
    }

    /// Clear the slot if its deadline has passed. Returns true when cleared.
    pub fn expire(&mut self, now: Instant) -> bool {
        match &self.current {
            Some(n) if n.expires_at <= now => {
                self.current = None;
                true
            }
            _ => false,
        }
    }
}

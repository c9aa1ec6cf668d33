use tokio::sync::mpsc;
use tracing::warn;

use circles_types::CircleError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Success,
    Error,
}

/// A user-visible notification (a toast, in UI terms).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub title: String,
    pub description: String,
}

/// Sends notices to whoever renders them. Sending never fails; with no
/// receiver the notice is dropped.
#[derive(Clone)]
pub struct Notifier {
    tx: mpsc::UnboundedSender<Notice>,
}

impl Notifier {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Notice>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn success(&self, title: &str, description: &str) {
        self.send(NoticeLevel::Success, title, description);
    }

    pub fn error(&self, title: &str, description: &str) {
        self.send(NoticeLevel::Error, title, description);
    }

    /// Log `err`, show it as an error notice and hand it back for returning.
    pub fn fail(&self, err: CircleError, description: &str) -> CircleError {
        warn!("{}: {}", description, err);
        let title = match err {
            CircleError::NotSignedIn => "Authentication required",
            CircleError::PermissionDenied => "Permission Denied",
            _ => "Error",
        };
        self.error(title, description);
        err
    }

    fn send(&self, level: NoticeLevel, title: &str, description: &str) {
        let _ = self.tx.send(Notice {
            level,
            title: title.to_string(),
            description: description.to_string(),
        });
    }
}

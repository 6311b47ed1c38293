//! User-facing toasts.
//!
//! Notifications are fire-and-forget: sending never blocks and a missing
//! listener is not an error.

use std::fmt;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    Default,
    Success,
    Destructive,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub variant: Variant,
    pub title: String,
    pub description: String,
}

impl Notification {
    pub fn image_uploaded(file_name: &str) -> Self {
        Notification {
            variant: Variant::Success,
            title: "Image Uploaded".to_string(),
            description: format!("{file_name} uploaded successfully"),
        }
    }

    pub fn result_ready() -> Self {
        Notification {
            variant: Variant::Default,
            title: "Prediction & Cure fetched".to_string(),
            description: "Check the result below".to_string(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Notification {
            variant: Variant::Destructive,
            title: "Error".to_string(),
            description: message.into(),
        }
    }
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.title, self.description)
    }
}

#[derive(Debug, Clone)]
pub struct Notifier {
    tx: Option<UnboundedSender<Notification>>,
}

impl Notifier {
    pub fn channel() -> (Self, UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Notifier { tx: Some(tx) }, rx)
    }

    /// A notifier nobody listens to.
    pub fn silent() -> Self {
        Notifier { tx: None }
    }

    pub fn notify(&self, notification: Notification) {
        tracing::debug!(title = %notification.title, "notification");
        if let Some(tx) = &self.tx {
            let _ = tx.send(notification);
        }
    }
}

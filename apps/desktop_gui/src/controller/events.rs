//! UI/backend events and error modeling for desktop GUI controller.

use std::sync::Arc;

use vision_core::{Notice, ViewSnapshot};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewImage {
    pub width: usize,
    pub height: usize,
    pub rgba: Vec<u8>,
}

pub enum UiEvent {
    Snapshot(ViewSnapshot),
    Notice(Notice),
    PreviewDecoded {
        source: Arc<str>,
        image: PreviewImage,
    },
    PreviewFailed {
        source: Arc<str>,
        reason: String,
    },
    Error(UiError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiErrorCategory {
    Auth,
    Transport,
    Validation,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiErrorContext {
    BackendStartup,
    Login,
    SelectImage,
}

#[derive(Debug, Clone)]
pub struct UiError {
    category: UiErrorCategory,
    context: UiErrorContext,
    message: String,
}

impl UiError {
    pub fn from_message(context: UiErrorContext, message: impl Into<String>) -> Self {
        let message = message.into();
        let message_lower = message.to_ascii_lowercase();
        let category = if message_lower.contains("401")
            || message_lower.contains("403")
            || message_lower.contains("unauthorized")
            || message_lower.contains("forbidden")
            || message_lower.contains("not accepted")
            || message_lower.contains("access token")
        {
            UiErrorCategory::Auth
        } else if message_lower.contains("timeout")
            || message_lower.contains("timed out")
            || message_lower.contains("connection")
            || message_lower.contains("failed to reach")
            || message_lower.contains("network")
            || message_lower.contains("unavailable")
        {
            UiErrorCategory::Transport
        } else if message_lower.contains("invalid")
            || message_lower.contains("missing")
            || message_lower.contains("failed to read")
            || message_lower.contains("not an image")
        {
            UiErrorCategory::Validation
        } else {
            UiErrorCategory::Unknown
        };

        Self {
            category,
            context,
            message,
        }
    }

    pub fn requires_reauth(&self) -> bool {
        self.category == UiErrorCategory::Auth
    }

    pub fn context(&self) -> UiErrorContext {
        self.context
    }

    /// Short text shown in the status line.
    pub fn display_message(&self) -> String {
        match (self.context, self.category) {
            (UiErrorContext::BackendStartup, _) => format!(
                "Backend worker startup failure; check the configuration and restart. ({})",
                self.message
            ),
            (_, UiErrorCategory::Transport) => {
                "Server unreachable; check the backend URL and network.".to_string()
            }
            (UiErrorContext::Login, _) => self.message.clone(),
            (UiErrorContext::SelectImage, _) => format!("Could not open image: {}", self.message),
        }
    }
}

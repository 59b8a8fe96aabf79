//! Backend commands queued from UI to backend worker.

use std::path::PathBuf;

pub enum BackendCommand {
    /// `None` keeps the token the worker already has.
    Login {
        access_token: Option<String>,
    },
    Logout,
    SelectImage {
        path: PathBuf,
    },
    SetCustomQuestion {
        text: String,
    },
    Analyze,
    Clear,
    CopyResult,
}

impl BackendCommand {
    pub fn name(&self) -> &'static str {
        match self {
            BackendCommand::Login { .. } => "login",
            BackendCommand::Logout => "logout",
            BackendCommand::SelectImage { .. } => "select_image",
            BackendCommand::SetCustomQuestion { .. } => "set_custom_question",
            BackendCommand::Analyze => "analyze",
            BackendCommand::Clear => "clear",
            BackendCommand::CopyResult => "copy_result",
        }
    }
}

//! UI layer for desktop GUI: app shell and transient notifications.

pub mod app;
pub mod toasts;

pub use app::{StartupConfig, VisionDesktopApp};

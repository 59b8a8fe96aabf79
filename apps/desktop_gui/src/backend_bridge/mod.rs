//! Backend worker: owns the tokio runtime and the image analyzer.

mod clipboard;
pub mod commands;
pub mod runtime;

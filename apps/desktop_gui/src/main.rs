use std::path::PathBuf;

mod backend_bridge;
mod controller;
mod ui;

use clap::Parser;
use crossbeam_channel::bounded;
use eframe::egui;
use tracing_subscriber::EnvFilter;
use vision_core::config::{load_settings, Settings};

use backend_bridge::commands::BackendCommand;
use controller::events::{UiError, UiErrorContext, UiEvent};
use ui::{StartupConfig, VisionDesktopApp};

#[derive(Parser, Debug)]
#[command(name = "vision-desktop", about = "Desktop client for AI image analysis")]
struct Args {
    /// Settings file; defaults to ./vision.toml or the user config directory.
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    backend_url: Option<String>,
    #[arg(long)]
    token: Option<String>,
}

fn main() -> eframe::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    let args = Args::parse();

    let (cmd_tx, cmd_rx) = bounded::<BackendCommand>(256);
    let (ui_tx, ui_rx) = bounded::<UiEvent>(2048);

    let mut settings = match load_settings(args.config.as_deref()) {
        Ok(settings) => settings,
        Err(err) => {
            tracing::error!("failed to load settings: {err:#}");
            let _ = ui_tx.try_send(UiEvent::Error(UiError::from_message(
                UiErrorContext::BackendStartup,
                format!("invalid settings, using defaults: {err:#}"),
            )));
            Settings::default()
        }
    };
    if let Some(backend_url) = args.backend_url {
        settings.backend_url = backend_url;
    }
    if let Some(token) = args.token {
        settings.access_token = Some(token);
    }

    let startup = StartupConfig {
        backend_url: settings.backend_url.clone(),
        access_token: settings.access_token.clone(),
    };
    backend_bridge::runtime::launch(cmd_rx, ui_tx, settings);

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_title("AI Vision Pro")
            .with_inner_size([1100.0, 760.0])
            .with_min_inner_size([760.0, 560.0])
            .with_drag_and_drop(true),
        ..Default::default()
    };
    eframe::run_native(
        "AI Vision Pro",
        options,
        Box::new(|_cc| Ok(Box::new(VisionDesktopApp::new(cmd_tx, ui_rx, startup)))),
    )
}

//! Runtime bridge between UI command queue and backend event intake.

use std::{sync::Arc, thread};

use crossbeam_channel::{Receiver, Sender};
use tokio::sync::broadcast::error::RecvError;
use vision_core::{
    config::Settings, preview::decode_data_url, AnalyzerError, AnalyzerEvent, AnalyzerOptions,
    HttpBackend, ImageAnalyzer,
};

use crate::backend_bridge::{clipboard::ArboardClipboard, commands::BackendCommand};
use crate::controller::events::{PreviewImage, UiError, UiErrorContext, UiEvent};

const PREVIEW_MAX_EDGE: u32 = 1024;

pub fn launch(cmd_rx: Receiver<BackendCommand>, ui_tx: Sender<UiEvent>, settings: Settings) {
    thread::spawn(move || {
        let runtime = match tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
        {
            Ok(runtime) => runtime,
            Err(err) => {
                let _ = ui_tx.try_send(UiEvent::Error(UiError::from_message(
                    UiErrorContext::BackendStartup,
                    format!("backend worker startup failure: failed to build runtime: {err}"),
                )));
                tracing::error!("failed to build backend runtime: {err}");
                return;
            }
        };

        runtime.block_on(async move {
            let backend = match HttpBackend::from_settings(&settings) {
                Ok(backend) => Arc::new(backend),
                Err(err) => {
                    let _ = ui_tx.try_send(UiEvent::Error(UiError::from_message(
                        UiErrorContext::BackendStartup,
                        format!("backend worker startup failure: {err:#}"),
                    )));
                    tracing::error!("invalid backend settings: {err:#}");
                    return;
                }
            };
            let analyzer = ImageAnalyzer::new(
                backend.clone(),
                Arc::new(ArboardClipboard),
                AnalyzerOptions::from(&settings),
            );

            let event_task = tokio::spawn(forward_analyzer_events(analyzer.clone(), ui_tx.clone()));
            analyzer.mount().await;
            tracing::info!(backend_url = %settings.backend_url, "backend worker ready");
            analyzer.login().await;
            let _ = ui_tx.try_send(UiEvent::Snapshot(analyzer.snapshot().await));

            while let Ok(cmd) = cmd_rx.recv() {
                tracing::debug!(command = cmd.name(), "backend: handling command");
                match cmd {
                    BackendCommand::Login { access_token } => {
                        if access_token.is_some() {
                            backend.set_access_token(access_token).await;
                        }
                        analyzer.login().await;
                        if backend.current_session().user.is_none() {
                            let _ = ui_tx.try_send(UiEvent::Error(UiError::from_message(
                                UiErrorContext::Login,
                                "Sign-in failed: the access token was missing or not accepted.",
                            )));
                        }
                    }
                    BackendCommand::Logout => analyzer.logout().await,
                    BackendCommand::SelectImage { path } => {
                        let analyzer = analyzer.clone();
                        let ui_tx = ui_tx.clone();
                        tokio::spawn(async move {
                            match analyzer.select_path(&path).await {
                                Ok(()) => {}
                                Err(
                                    err @ (AnalyzerError::Unreadable(_)
                                    | AnalyzerError::NotAnImage(_)),
                                ) => {
                                    let _ = ui_tx.try_send(UiEvent::Error(UiError::from_message(
                                        UiErrorContext::SelectImage,
                                        err.to_string(),
                                    )));
                                }
                                Err(err) => {
                                    tracing::debug!("backend: select_image ended with {err}");
                                }
                            }
                        });
                    }
                    BackendCommand::SetCustomQuestion { text } => {
                        analyzer.set_custom_question(text).await;
                    }
                    BackendCommand::Analyze => {
                        let analyzer = analyzer.clone();
                        tokio::spawn(async move {
                            if let Err(err) = analyzer.analyze().await {
                                tracing::debug!("backend: analyze ended with {err}");
                            }
                        });
                    }
                    BackendCommand::Clear => analyzer.clear().await,
                    BackendCommand::CopyResult => {
                        analyzer.copy_result().await;
                    }
                }
            }

            tracing::info!("backend: command queue closed, shutting down");
            event_task.abort();
            analyzer.unmount().await;
        });
    });
}

async fn forward_analyzer_events(analyzer: Arc<ImageAnalyzer>, ui_tx: Sender<UiEvent>) {
    let mut events = analyzer.subscribe_events();
    let mut last_preview: Option<Arc<str>> = None;
    loop {
        let snapshot = match events.recv().await {
            Ok(AnalyzerEvent::Notice(notice)) => {
                let _ = ui_tx.try_send(UiEvent::Notice(notice));
                continue;
            }
            Ok(AnalyzerEvent::StateChanged(snapshot)) => snapshot,
            Ok(AnalyzerEvent::SessionChanged(_)) => analyzer.snapshot().await,
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "backend: analyzer events lagged");
                analyzer.snapshot().await
            }
            Err(RecvError::Closed) => break,
        };

        let preview_changed = match (&last_preview, &snapshot.preview) {
            (Some(previous), Some(current)) => !Arc::ptr_eq(previous, current),
            (None, None) => false,
            _ => true,
        };
        let decode_source = preview_changed.then(|| snapshot.preview.clone()).flatten();
        if preview_changed {
            last_preview = snapshot.preview.clone();
        }
        // The snapshot must be queued before its decoded preview.
        let _ = ui_tx.try_send(UiEvent::Snapshot(snapshot));
        if let Some(source) = decode_source {
            spawn_preview_decode(source, ui_tx.clone());
        }
    }
}

fn spawn_preview_decode(source: Arc<str>, ui_tx: Sender<UiEvent>) {
    tokio::task::spawn_blocking(move || {
        let event = match decode_preview(&source) {
            Ok(image) => UiEvent::PreviewDecoded { source, image },
            Err(reason) => {
                tracing::warn!("backend: preview decode failed: {reason}");
                UiEvent::PreviewFailed { source, reason }
            }
        };
        let _ = ui_tx.try_send(event);
    });
}

fn decode_preview(data_url: &str) -> Result<PreviewImage, String> {
    let (_, bytes) =
        decode_data_url(data_url).ok_or_else(|| "preview is not a base64 data url".to_string())?;
    let dynamic = image::load_from_memory(&bytes).map_err(|err| err.to_string())?;
    let resized = dynamic
        .thumbnail(PREVIEW_MAX_EDGE, PREVIEW_MAX_EDGE)
        .to_rgba8();
    Ok(PreviewImage {
        width: resized.width() as usize,
        height: resized.height() as usize,
        rgba: resized.into_raw(),
    })
}

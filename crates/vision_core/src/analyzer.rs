//! View-state controller for the upload/analyze screen.

use std::{path::Path, sync::Arc};

use chrono::Utc;
use shared::{
    domain::{AnalysisResult, AuthState, SessionUser, MAX_IMAGE_BYTES},
    protocol::{GenerateTextRequest, UploadOptions},
};
use thiserror::Error;
use tokio::sync::{broadcast, watch, Mutex};
use tracing::{debug, error, info, warn};

use crate::{
    config::Settings, preview::render_preview, AuthProvider, AuthSubscription, ClipboardWriter,
    ImageFile, InferenceProvider, ObjectStorage, DEFAULT_MODEL, DEFAULT_UPLOAD_PREFIX,
};

pub const DEFAULT_ANALYSIS_PROMPT: &str = "Analyze this image in detail. Describe what you see, identify objects, people, text, colors, composition, mood, and any interesting details. Be thorough and insightful.";
pub const DETAILED_ANALYSIS_SUFFIX: &str = "Analyze this image in detail.";

const EVENT_CHANNEL_CAPACITY: usize = 256;

const NOTICE_IMAGE_TOO_LARGE: &str = "Image must be smaller than 10MB";
const NOTICE_UPLOADED: &str = "Image uploaded!";
const NOTICE_UPLOAD_FAILED: &str = "Failed to upload image";
const NOTICE_ANALYZED: &str = "Image analyzed successfully!";
const NOTICE_ANALYSIS_FAILED: &str = "Failed to analyze image. Please try again.";
const NOTICE_COPIED: &str = "Analysis copied to clipboard!";

/// The one operation the screen may be running at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Activity {
    #[default]
    Idle,
    Uploading,
    Analyzing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkspacePhase {
    Idle,
    Uploading,
    Analyzing,
    HasResult,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewPhase {
    Initializing,
    Unauthenticated,
    Authenticated(WorkspacePhase),
}

#[derive(Debug, Error)]
pub enum AnalyzerError {
    #[error("image is {size} bytes, limit is {limit} bytes")]
    ImageTooLarge { size: u64, limit: u64 },
    #[error("another operation is in progress ({0:?})")]
    Busy(Activity),
    #[error("upload failed: {0:#}")]
    Upload(anyhow::Error),
    #[error("image analysis failed: {0:#}")]
    Inference(anyhow::Error),
    #[error("selection was cleared before the operation finished")]
    Superseded,
    #[error("{0:#}")]
    Unreadable(anyhow::Error),
    #[error("'{0}' is not an image")]
    NotAnImage(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

#[derive(Debug, Clone)]
pub enum AnalyzerEvent {
    SessionChanged(AuthState),
    StateChanged(ViewSnapshot),
    Notice(Notice),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedImage {
    pub file_name: String,
    pub content_type: String,
    pub size_bytes: u64,
}

impl From<&ImageFile> for SelectedImage {
    fn from(file: &ImageFile) -> Self {
        Self {
            file_name: file.name.clone(),
            content_type: file.content_type(),
            size_bytes: file.size(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewSnapshot {
    pub phase: ViewPhase,
    pub user: Option<SessionUser>,
    pub selected: Option<SelectedImage>,
    /// `data:` URL of the selected image.
    pub preview: Option<Arc<str>>,
    pub image_url: Option<String>,
    pub result: Option<AnalysisResult>,
    pub custom_question: String,
    pub activity: Activity,
}

impl ViewSnapshot {
    pub fn is_uploading(&self) -> bool {
        self.activity == Activity::Uploading
    }

    pub fn is_analyzing(&self) -> bool {
        self.activity == Activity::Analyzing
    }

    pub fn can_analyze(&self) -> bool {
        self.activity == Activity::Idle && self.image_url.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalyzerOptions {
    pub model: String,
    pub upload_prefix: String,
}

impl Default for AnalyzerOptions {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            upload_prefix: DEFAULT_UPLOAD_PREFIX.to_string(),
        }
    }
}

impl From<&Settings> for AnalyzerOptions {
    fn from(settings: &Settings) -> Self {
        Self {
            model: settings.model.clone(),
            upload_prefix: settings.upload_prefix.clone(),
        }
    }
}

#[derive(Default)]
struct AnalyzerState {
    activity: Activity,
    // Bumped by every selection and clear; completions from older generations are dropped.
    generation: u64,
    selected: Option<SelectedImage>,
    preview: Option<Arc<str>>,
    image_url: Option<String>,
    result: Option<AnalysisResult>,
    custom_question: String,
}

impl AnalyzerState {
    fn reset(&mut self) {
        self.generation += 1;
        self.activity = Activity::Idle;
        self.selected = None;
        self.preview = None;
        self.image_url = None;
        self.result = None;
        self.custom_question.clear();
    }
}

pub struct ImageAnalyzer {
    auth: Arc<dyn AuthProvider>,
    storage: Arc<dyn ObjectStorage>,
    inference: Arc<dyn InferenceProvider>,
    clipboard: Arc<dyn ClipboardWriter>,
    options: AnalyzerOptions,
    session: Arc<watch::Sender<AuthState>>,
    subscription: Mutex<Option<AuthSubscription>>,
    inner: Mutex<AnalyzerState>,
    events: broadcast::Sender<AnalyzerEvent>,
}

impl ImageAnalyzer {
    /// Builds a controller whose auth, storage and inference all come from one backend.
    pub fn new<B>(
        backend: Arc<B>,
        clipboard: Arc<dyn ClipboardWriter>,
        options: AnalyzerOptions,
    ) -> Arc<Self>
    where
        B: AuthProvider + ObjectStorage + InferenceProvider + 'static,
    {
        Self::new_with_dependencies(
            backend.clone(),
            backend.clone(),
            backend,
            clipboard,
            options,
        )
    }

    pub fn new_with_dependencies(
        auth: Arc<dyn AuthProvider>,
        storage: Arc<dyn ObjectStorage>,
        inference: Arc<dyn InferenceProvider>,
        clipboard: Arc<dyn ClipboardWriter>,
        options: AnalyzerOptions,
    ) -> Arc<Self> {
        let (session, _) = watch::channel(AuthState::loading());
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Arc::new(Self {
            auth,
            storage,
            inference,
            clipboard,
            options,
            session: Arc::new(session),
            subscription: Mutex::new(None),
            inner: Mutex::new(AnalyzerState::default()),
            events,
        })
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<AnalyzerEvent> {
        self.events.subscribe()
    }

    pub fn session(&self) -> AuthState {
        self.session.borrow().clone()
    }

    /// Starts observing the auth provider. Mounting again replaces the earlier registration.
    pub async fn mount(&self) {
        let session = self.session.clone();
        let events = self.events.clone();
        let subscription = self.auth.on_auth_state_changed(Box::new(move |state| {
            debug!(
                signed_in = state.user.is_some(),
                is_loading = state.is_loading,
                "auth state changed"
            );
            session.send_replace(state.clone());
            let _ = events.send(AnalyzerEvent::SessionChanged(state));
        }));
        if let Some(previous) = self.subscription.lock().await.replace(subscription) {
            previous.unsubscribe();
        }
    }

    pub async fn unmount(&self) {
        if let Some(subscription) = self.subscription.lock().await.take() {
            subscription.unsubscribe();
            debug!("auth subscription released");
        }
    }

    pub async fn is_mounted(&self) -> bool {
        self.subscription.lock().await.is_some()
    }

    pub async fn login(&self) {
        if let Err(err) = self.auth.login().await {
            warn!("login failed: {err:#}");
        }
    }

    pub async fn logout(&self) {
        self.clear().await;
        if let Err(err) = self.auth.logout().await {
            warn!("logout failed: {err:#}");
        }
    }

    /// Opens `path` and selects it. Oversized files are rejected before they are read.
    pub async fn select_path(&self, path: &Path) -> Result<(), AnalyzerError> {
        let file = match ImageFile::from_path(path).await {
            Ok(file) => file,
            Err(AnalyzerError::ImageTooLarge { size, .. }) => {
                return Err(self.reject_oversized(&path.display().to_string(), size));
            }
            Err(err) => {
                warn!(path = %path.display(), "image not opened: {err}");
                return Err(err);
            }
        };
        if !file.is_image() {
            return Err(AnalyzerError::NotAnImage(file.name));
        }
        self.select_image(file).await
    }

    pub async fn select_image(&self, file: ImageFile) -> Result<(), AnalyzerError> {
        let size_bytes = file.size();
        if size_bytes > MAX_IMAGE_BYTES {
            return Err(self.reject_oversized(&file.name, size_bytes));
        }

        let generation = {
            let mut guard = self.inner.lock().await;
            if guard.activity != Activity::Idle {
                return Err(AnalyzerError::Busy(guard.activity));
            }
            guard.generation += 1;
            guard.activity = Activity::Uploading;
            guard.selected = Some(SelectedImage::from(&file));
            guard.preview = None;
            guard.image_url = None;
            guard.result = None;
            guard.generation
        };
        self.publish_state().await;

        let destination = self.destination_path(&file.name);
        info!(
            file_name = %file.name,
            size_bytes,
            destination = %destination,
            "uploading image"
        );

        let preview = async {
            let Some(data_url) = render_preview(&file) else {
                debug!(file_name = %file.name, "no preview rendered");
                return;
            };
            let applied = {
                let mut guard = self.inner.lock().await;
                if guard.generation == generation {
                    guard.preview = Some(Arc::from(data_url));
                    true
                } else {
                    false
                }
            };
            if applied {
                self.publish_state().await;
            }
        };
        let upload = self
            .storage
            .upload(&file, &destination, UploadOptions { overwrite: true });
        let ((), outcome) = tokio::join!(preview, upload);

        let mut guard = self.inner.lock().await;
        if guard.generation != generation {
            debug!(file_name = %file.name, "discarding upload outcome for a cleared selection");
            return Err(AnalyzerError::Superseded);
        }
        guard.activity = Activity::Idle;
        match outcome {
            Ok(response) => {
                info!(public_url = %response.public_url, "image uploaded");
                guard.image_url = Some(response.public_url);
                drop(guard);
                self.notify(NoticeLevel::Success, NOTICE_UPLOADED);
                self.publish_state().await;
                Ok(())
            }
            Err(err) => {
                warn!(file_name = %file.name, "image upload failed: {err:#}");
                guard.preview = None;
                guard.selected = None;
                drop(guard);
                self.notify(NoticeLevel::Error, NOTICE_UPLOAD_FAILED);
                self.publish_state().await;
                Err(AnalyzerError::Upload(err))
            }
        }
    }

    pub async fn set_custom_question(&self, question: impl Into<String>) {
        self.inner.lock().await.custom_question = question.into();
        self.publish_state().await;
    }

    /// Returns `Ok(None)` without touching anything when no image has been uploaded.
    pub async fn analyze(&self) -> Result<Option<AnalysisResult>, AnalyzerError> {
        let (generation, request) = {
            let mut guard = self.inner.lock().await;
            let Some(image_url) = guard.image_url.clone() else {
                return Ok(None);
            };
            if guard.activity != Activity::Idle {
                return Err(AnalyzerError::Busy(guard.activity));
            }
            guard.activity = Activity::Analyzing;
            let prompt = build_prompt(&guard.custom_question);
            (
                guard.generation,
                GenerateTextRequest::describe_image(prompt, image_url, &self.options.model),
            )
        };
        self.publish_state().await;

        info!(model = %request.model, "requesting image analysis");
        let outcome = self.inference.generate_text(request).await;

        let mut guard = self.inner.lock().await;
        if guard.generation != generation {
            debug!("discarding analysis outcome for a cleared selection");
            return Err(AnalyzerError::Superseded);
        }
        guard.activity = Activity::Idle;
        match outcome {
            Ok(response) => {
                let result = AnalysisResult {
                    analysis: response.text,
                    timestamp: Utc::now(),
                };
                guard.result = Some(result.clone());
                drop(guard);
                info!(chars = result.analysis.len(), "image analysis completed");
                self.notify(NoticeLevel::Success, NOTICE_ANALYZED);
                self.publish_state().await;
                Ok(Some(result))
            }
            Err(err) => {
                drop(guard);
                error!("image analysis failed: {err:#}");
                self.notify(NoticeLevel::Error, NOTICE_ANALYSIS_FAILED);
                self.publish_state().await;
                Err(AnalyzerError::Inference(err))
            }
        }
    }

    pub async fn clear(&self) {
        self.inner.lock().await.reset();
        self.publish_state().await;
    }

    /// Returns `false` when there is no result to copy.
    pub async fn copy_result(&self) -> bool {
        let text = {
            let guard = self.inner.lock().await;
            guard.result.as_ref().map(|result| result.analysis.clone())
        };
        let Some(text) = text else {
            return false;
        };
        if let Err(err) = self.clipboard.write_text(&text) {
            warn!("clipboard write failed: {err:#}");
        }
        self.notify(NoticeLevel::Success, NOTICE_COPIED);
        true
    }

    pub async fn snapshot(&self) -> ViewSnapshot {
        let session = self.session.borrow().clone();
        let guard = self.inner.lock().await;
        ViewSnapshot {
            phase: view_phase(&session, &guard),
            user: session.user,
            selected: guard.selected.clone(),
            preview: guard.preview.clone(),
            image_url: guard.image_url.clone(),
            result: guard.result.clone(),
            custom_question: guard.custom_question.clone(),
            activity: guard.activity,
        }
    }

    pub(crate) fn destination_path(&self, file_name: &str) -> String {
        let prefix = self.options.upload_prefix.trim_matches('/');
        if prefix.is_empty() {
            file_name.to_string()
        } else {
            format!("{prefix}/{file_name}")
        }
    }

    fn reject_oversized(&self, file_name: &str, size_bytes: u64) -> AnalyzerError {
        warn!(file_name, size_bytes, "image rejected: over size limit");
        self.notify(NoticeLevel::Error, NOTICE_IMAGE_TOO_LARGE);
        AnalyzerError::ImageTooLarge {
            size: size_bytes,
            limit: MAX_IMAGE_BYTES,
        }
    }

    fn notify(&self, level: NoticeLevel, message: &str) {
        let _ = self.events.send(AnalyzerEvent::Notice(Notice {
            level,
            message: message.to_string(),
        }));
    }

    async fn publish_state(&self) {
        if self.events.receiver_count() == 0 {
            return;
        }
        let snapshot = self.snapshot().await;
        let _ = self.events.send(AnalyzerEvent::StateChanged(snapshot));
    }
}

pub fn build_prompt(custom_question: &str) -> String {
    if custom_question.trim().is_empty() {
        DEFAULT_ANALYSIS_PROMPT.to_string()
    } else {
        format!("{custom_question} {DETAILED_ANALYSIS_SUFFIX}")
    }
}

fn view_phase(session: &AuthState, state: &AnalyzerState) -> ViewPhase {
    if session.is_loading {
        return ViewPhase::Initializing;
    }
    if session.user.is_none() {
        return ViewPhase::Unauthenticated;
    }
    let workspace = match state.activity {
        Activity::Uploading => WorkspacePhase::Uploading,
        Activity::Analyzing => WorkspacePhase::Analyzing,
        Activity::Idle if state.result.is_some() => WorkspacePhase::HasResult,
        Activity::Idle => WorkspacePhase::Idle,
    };
    ViewPhase::Authenticated(workspace)
}

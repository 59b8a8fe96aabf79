//! reqwest implementation of the auth, storage and inference collaborators.

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{header::CONTENT_TYPE, Client, RequestBuilder, Response, StatusCode};
use shared::{
    domain::{AuthState, SessionUser},
    error::{ApiError, ApiException},
    protocol::{
        CurrentUserResponse, GenerateTextRequest, GenerateTextResponse, UploadOptions,
        UploadResponse,
    },
};
use tokio::sync::{watch, RwLock};
use tracing::{info, warn};
use url::Url;

use crate::{
    config::Settings, AuthCallback, AuthProvider, AuthSubscription, ImageFile, InferenceProvider,
    ObjectStorage,
};

const PROJECT_ID_HEADER: &str = "x-project-id";

pub struct HttpBackend {
    http: Client,
    base_url: Url,
    project_id: Option<String>,
    access_token: RwLock<Option<String>>,
    session: Arc<watch::Sender<AuthState>>,
}

impl HttpBackend {
    pub fn new(base_url: Url, project_id: Option<String>, access_token: Option<String>) -> Self {
        let (session, _) = watch::channel(AuthState::loading());
        Self {
            http: Client::new(),
            base_url: with_trailing_slash(base_url),
            project_id,
            access_token: RwLock::new(access_token),
            session: Arc::new(session),
        }
    }

    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Ok(Self::new(
            settings.backend_url()?,
            settings.project_id.clone(),
            settings.access_token.clone(),
        ))
    }

    pub async fn set_access_token(&self, token: Option<String>) {
        *self.access_token.write().await = token.filter(|t| !t.trim().is_empty());
    }

    pub fn current_session(&self) -> AuthState {
        self.session.borrow().clone()
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .with_context(|| format!("invalid endpoint path '{path}'"))
    }

    async fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        let mut builder = builder;
        if let Some(token) = self.access_token.read().await.as_deref() {
            builder = builder.bearer_auth(token);
        }
        if let Some(project_id) = self.project_id.as_deref() {
            builder = builder.header(PROJECT_ID_HEADER, project_id);
        }
        builder
    }

    async fn fetch_current_user(&self) -> Result<Option<SessionUser>> {
        let url = self.endpoint("api/auth/me")?;
        let response = self
            .authorized(self.http.get(url))
            .await
            .send()
            .await
            .context("failed to reach auth service")?;
        if response.status() == StatusCode::UNAUTHORIZED {
            return Ok(None);
        }
        let body: CurrentUserResponse = ensure_success(response, "session lookup")
            .await?
            .json()
            .await
            .context("invalid session lookup response")?;
        Ok(body.user)
    }
}

#[async_trait]
impl AuthProvider for HttpBackend {
    fn on_auth_state_changed(&self, callback: AuthCallback) -> AuthSubscription {
        let mut rx = self.session.subscribe();
        callback(rx.borrow_and_update().clone());
        let task = tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let state = rx.borrow_and_update().clone();
                callback(state);
            }
        });
        AuthSubscription::new(move || task.abort())
    }

    async fn login(&self) -> Result<()> {
        if self.access_token.read().await.is_none() {
            self.session.send_replace(AuthState::signed_out());
            return Err(anyhow!("no access token configured"));
        }
        match self.fetch_current_user().await {
            Ok(Some(user)) => {
                info!(user_id = %user.id.0, "auth: session established");
                self.session.send_replace(AuthState::signed_in(user));
                Ok(())
            }
            Ok(None) => {
                self.session.send_replace(AuthState::signed_out());
                Err(anyhow!("access token was not accepted"))
            }
            Err(err) => {
                self.session.send_replace(AuthState::signed_out());
                Err(err)
            }
        }
    }

    async fn logout(&self) -> Result<()> {
        *self.access_token.write().await = None;
        self.session.send_replace(AuthState::signed_out());
        info!("auth: signed out");
        Ok(())
    }
}

#[async_trait]
impl ObjectStorage for HttpBackend {
    async fn upload(
        &self,
        file: &ImageFile,
        destination_path: &str,
        options: UploadOptions,
    ) -> Result<UploadResponse> {
        let url = self.endpoint("api/storage/upload")?;
        let response = self
            .authorized(self.http.post(url))
            .await
            .query(&[
                ("path", destination_path),
                ("overwrite", if options.overwrite { "true" } else { "false" }),
            ])
            .header(CONTENT_TYPE, file.content_type())
            .body(file.bytes.clone())
            .send()
            .await
            .context("failed to reach storage service")?;
        let body: UploadResponse = ensure_success(response, "upload")
            .await?
            .json()
            .await
            .context("invalid upload response")?;
        if body.public_url.trim().is_empty() {
            return Err(anyhow!("storage returned an empty public url"));
        }
        Ok(body)
    }
}

#[async_trait]
impl InferenceProvider for HttpBackend {
    async fn generate_text(&self, request: GenerateTextRequest) -> Result<GenerateTextResponse> {
        let url = self.endpoint("api/ai/generate-text")?;
        let response = self
            .authorized(self.http.post(url))
            .await
            .json(&request)
            .send()
            .await
            .context("failed to reach inference service")?;
        ensure_success(response, "text generation")
            .await?
            .json()
            .await
            .context("invalid text generation response")
    }
}

async fn ensure_success(response: Response, action: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    match serde_json::from_str::<ApiError>(&body) {
        Ok(api_error) => {
            warn!(%status, code = ?api_error.code, "{action} rejected by backend");
            Err(anyhow::Error::new(ApiException::from(api_error))
                .context(format!("{action} failed with status {status}")))
        }
        Err(_) => Err(anyhow!("{action} failed with status {status}")),
    }
}

fn with_trailing_slash(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

#[cfg(test)]
#[path = "tests/http_backend_tests.rs"]
mod tests;

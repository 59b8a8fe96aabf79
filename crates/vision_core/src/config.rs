use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{anyhow, Context};
use serde::Deserialize;
use url::Url;

use crate::{DEFAULT_MODEL, DEFAULT_UPLOAD_PREFIX};

const SETTINGS_FILE_NAME: &str = "vision.toml";
const SETTINGS_DIR_NAME: &str = "vision_pro";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub backend_url: String,
    pub project_id: Option<String>,
    pub access_token: Option<String>,
    pub model: String,
    pub upload_prefix: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            backend_url: "http://127.0.0.1:8787".into(),
            project_id: None,
            access_token: None,
            model: DEFAULT_MODEL.into(),
            upload_prefix: DEFAULT_UPLOAD_PREFIX.into(),
        }
    }
}

impl Settings {
    pub fn backend_url(&self) -> anyhow::Result<Url> {
        let url = Url::parse(self.backend_url.trim())
            .with_context(|| format!("invalid backend url '{}'", self.backend_url))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(anyhow!(
                "backend url '{}' must use http or https",
                self.backend_url
            ));
        }
        Ok(url)
    }
}

/// Loads settings from the first settings file found, then applies environment overrides.
///
/// An explicit path must exist; the default locations are optional.
pub fn load_settings(explicit_path: Option<&Path>) -> anyhow::Result<Settings> {
    load_settings_with_env(explicit_path, |name| std::env::var(name).ok())
}

pub fn load_settings_with_env(
    explicit_path: Option<&Path>,
    lookup: impl Fn(&str) -> Option<String>,
) -> anyhow::Result<Settings> {
    let mut settings = match explicit_path {
        Some(path) => {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("failed to read settings file '{}'", path.display()))?;
            parse_settings(&raw)
                .with_context(|| format!("failed to parse settings file '{}'", path.display()))?
        }
        None => match default_settings_paths().into_iter().find(|path| path.is_file()) {
            Some(path) => {
                tracing::debug!(path = %path.display(), "loading settings file");
                let raw = fs::read_to_string(&path).with_context(|| {
                    format!("failed to read settings file '{}'", path.display())
                })?;
                parse_settings(&raw).with_context(|| {
                    format!("failed to parse settings file '{}'", path.display())
                })?
            }
            None => Settings::default(),
        },
    };

    apply_env_overrides(&mut settings, lookup);
    settings.backend_url()?;
    Ok(settings)
}

pub fn parse_settings(raw: &str) -> anyhow::Result<Settings> {
    Ok(toml::from_str::<Settings>(raw)?)
}

pub fn default_settings_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from(SETTINGS_FILE_NAME)];
    if let Some(config_dir) = dirs::config_dir() {
        paths.push(config_dir.join(SETTINGS_DIR_NAME).join(SETTINGS_FILE_NAME));
    }
    paths
}

/// `APP__` variables are applied after `VISION_` ones and win when both are set.
pub fn apply_env_overrides(settings: &mut Settings, lookup: impl Fn(&str) -> Option<String>) {
    let read = |names: [&str; 2]| -> Option<String> {
        names
            .iter()
            .rev()
            .find_map(|name| lookup(name))
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    };

    if let Some(v) = read(["VISION_BACKEND_URL", "APP__BACKEND_URL"]) {
        settings.backend_url = v;
    }
    if let Some(v) = read(["VISION_PROJECT_ID", "APP__PROJECT_ID"]) {
        settings.project_id = Some(v);
    }
    if let Some(v) = read(["VISION_ACCESS_TOKEN", "APP__ACCESS_TOKEN"]) {
        settings.access_token = Some(v);
    }
    if let Some(v) = read(["VISION_MODEL", "APP__MODEL"]) {
        settings.model = v;
    }
    if let Some(v) = read(["VISION_UPLOAD_PREFIX", "APP__UPLOAD_PREFIX"]) {
        settings.upload_prefix = v;
    }
}

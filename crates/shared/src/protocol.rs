use serde::{Deserialize, Serialize};

use crate::domain::SessionUser;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    Image { image: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: Vec<ContentPart>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerateTextRequest {
    pub messages: Vec<ChatMessage>,
    pub model: String,
}

impl GenerateTextRequest {
    /// Single user turn pairing a text prompt with an image reference.
    pub fn describe_image(
        prompt: impl Into<String>,
        image_url: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            messages: vec![ChatMessage {
                role: ChatRole::User,
                content: vec![
                    ContentPart::Text {
                        text: prompt.into(),
                    },
                    ContentPart::Image {
                        image: image_url.into(),
                    },
                ],
            }],
            model: model.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerateTextResponse {
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadOptions {
    pub overwrite: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub public_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentUserResponse {
    #[serde(default)]
    pub user: Option<SessionUser>,
}

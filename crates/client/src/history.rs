//! REST calls for history, read receipts and the user listing.

use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use taskhub_realtime::{ChatMessage, UserId, UserProfile};

use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

#[derive(Debug, Deserialize)]
struct Updated {
    updated: u64,
}

#[derive(Debug, Deserialize)]
struct UnreadCount {
    count: u64,
}

#[derive(Debug, Clone)]
pub struct HistoryClient {
    http: Client,
    config: ClientConfig,
    token: String,
}

impl HistoryClient {
    pub fn new(config: ClientConfig, token: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            config,
            token: token.into(),
        }
    }

    pub async fn conversation(&self, other: &UserId) -> ClientResult<Vec<ChatMessage>> {
        let url = self
            .config
            .api_url(&format!("api/chat/conversation/{other}"));
        self.send(self.http.get(url)).await
    }

    /// Marks everything `sender` sent us as read; returns how many changed.
    pub async fn mark_read(&self, sender: &UserId) -> ClientResult<u64> {
        let url = self.config.api_url("api/chat/read");
        let body = json!({ "senderId": sender });
        let updated: Updated = self.send(self.http.post(url).json(&body)).await?;
        Ok(updated.updated)
    }

    pub async fn unread_count(&self) -> ClientResult<u64> {
        let url = self.config.api_url("api/chat/unread-count");
        let unread: UnreadCount = self.send(self.http.get(url)).await?;
        Ok(unread.count)
    }

    pub async fn users(&self) -> ClientResult<Vec<UserProfile>> {
        let url = self.config.api_url("api/chat/users");
        self.send(self.http.get(url)).await
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> ClientResult<T> {
        let response = request.bearer_auth(&self.token).send().await?;
        let response = check_status(response).await?;
        Ok(response.json().await?)
    }
}

async fn check_status(response: Response) -> ClientResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let text = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&text)
        .map(|body| body.message)
        .unwrap_or(text);

    if status == StatusCode::UNAUTHORIZED {
        Err(ClientError::AuthRejected(message))
    } else {
        Err(ClientError::Status {
            status: status.as_u16(),
            message,
        })
    }
}

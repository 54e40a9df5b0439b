use std::sync::{Arc, RwLock};
use std::time::Duration;

use anyhow::{Result, bail};
use reqwest::{RequestBuilder, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::model::{Message, RoomSummary, UserSummary};

/// Failure of a single backend call
#[derive(Debug, Error)]
pub enum ApiError {
    /// 401 on a request that carried a credential
    #[error("session expired")]
    Unauthorized,
    #[error("server returned {status}: {}", .message.as_deref().unwrap_or("no message"))]
    Status {
        status: u16,
        message: Option<String>,
    },
    #[error("network error: {0}")]
    Transport(#[from] reqwest::Error),
}

impl ApiError {
    /// The `message` field of the error body, when the server sent one
    pub fn server_message(&self) -> Option<&str> {
        match self {
            ApiError::Status { message, .. } => message.as_deref(),
            _ => None,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ApiError::Unauthorized)
    }
}

/// The bearer token shared by every outgoing request.
///
/// Cloned into the client; mutated only by the session on login, logout and
/// 401 handling. A request reads it once, when it is issued.
#[derive(Debug, Clone, Default)]
pub struct Credential(Arc<RwLock<Option<String>>>);

impl Credential {
    pub fn get(&self) -> Option<String> {
        self.0.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn attach(&self, token: &str) {
        *self.0.write().unwrap_or_else(|e| e.into_inner()) = Some(token.to_string());
    }

    pub fn detach(&self) {
        *self.0.write().unwrap_or_else(|e| e.into_inner()) = None;
    }

    #[cfg(test)]
    pub(crate) fn is_attached(&self) -> bool {
        self.0.read().unwrap_or_else(|e| e.into_inner()).is_some()
    }
}

// --- Wire types ---

#[derive(Debug, Serialize)]
pub struct LoginRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoginResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub user: Option<UserSummary>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SignupRequest<'a> {
    pub firstname: &'a str,
    pub lastname: &'a str,
    pub email: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SignupResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRoomRequest {
    pub name: String,
    pub members: Vec<String>,
    pub is_group: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SendMessageRequest<'a> {
    room_id: &'a str,
    content: &'a str,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageMeta {
    #[serde(default)]
    total_pages: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct Listing<T> {
    #[serde(default = "Vec::new")]
    data: Vec<T>,
    #[serde(default)]
    meta: Option<PageMeta>,
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
struct MessageList {
    #[serde(default)]
    messages: Vec<Message>,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
}

/// One page of the room listing
#[derive(Debug, Clone, PartialEq)]
pub struct RoomPage {
    pub rooms: Vec<RoomSummary>,
    pub total_pages: u32,
}

/// Thin wrapper over `reqwest` for the chat backend
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: Url,
    credential: Credential,
    unauthorized_tx: Option<mpsc::UnboundedSender<()>>,
}

impl ApiClient {
    pub fn new(base_url: &str, timeout: Duration, credential: Credential) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        let base_url = Url::parse(base_url)?;
        if base_url.cannot_be_a_base() {
            bail!("api url {} cannot carry a path", base_url);
        }
        Ok(Self {
            http,
            base_url,
            credential,
            unauthorized_tx: None,
        })
    }

    /// Every 401 on an authenticated request is also signalled here
    pub fn with_unauthorized_signal(mut self, tx: mpsc::UnboundedSender<()>) -> Self {
        self.unauthorized_tx = Some(tx);
        self
    }

    /// Base url plus path segments, each percent-encoded
    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    pub async fn get<T: DeserializeOwned>(
        &self,
        path: &[&str],
        query: &[(&str, String)],
    ) -> Result<T, ApiError> {
        let request = self.http.get(self.url(path)).query(query);
        self.execute(request).await
    }

    pub async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &[&str],
        body: &B,
    ) -> Result<T, ApiError> {
        let request = self.http.post(self.url(path)).json(body);
        self.execute(request).await
    }

    async fn execute<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ApiError> {
        let token = self.credential.get();
        let request = match &token {
            Some(t) => request.bearer_auth(t),
            None => request,
        };

        let response = request.send().await?;
        let status = response.status();
        debug!("{} {}", status.as_u16(), response.url().path());

        if status == StatusCode::UNAUTHORIZED && token.is_some() {
            warn!("Request rejected with 401, credential no longer valid");
            if let Some(tx) = &self.unauthorized_tx {
                let _ = tx.send(());
            }
            return Err(ApiError::Unauthorized);
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorBody>(&body)
                .ok()
                .and_then(|b| b.message);
            return Err(ApiError::Status {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response.json::<T>().await?)
    }

    // --- Endpoints ---

    pub async fn login(&self, email: &str, password: &str) -> Result<LoginResponse, ApiError> {
        self.post(&["api", "auth", "login"], &LoginRequest { email, password })
            .await
    }

    pub async fn signup(&self, request: &SignupRequest<'_>) -> Result<SignupResponse, ApiError> {
        self.post(&["api", "auth", "signup"], request).await
    }

    pub async fn me(&self) -> Result<UserSummary, ApiError> {
        self.get(&["api", "user", "me"], &[]).await
    }

    pub async fn search_users(
        &self,
        search: &str,
        page: u32,
        limit: u32,
    ) -> Result<Vec<UserSummary>, ApiError> {
        let mut query = vec![("page", page.to_string()), ("limit", limit.to_string())];
        if !search.is_empty() {
            query.push(("search", search.to_string()));
        }
        let listing: Listing<UserSummary> = self.get(&["api", "user"], &query).await?;
        Ok(listing.data)
    }

    /// `room_type` is `None` for the unfiltered listing
    pub async fn list_rooms(
        &self,
        room_type: Option<&str>,
        page: u32,
        limit: u32,
    ) -> Result<RoomPage, ApiError> {
        let mut query = vec![("page", page.to_string()), ("limit", limit.to_string())];
        if let Some(t) = room_type {
            query.push(("type", t.to_string()));
        }
        let listing: Listing<RoomSummary> = self.get(&["api", "room"], &query).await?;
        let total_pages = listing
            .meta
            .and_then(|m| m.total_pages)
            .unwrap_or(1);
        Ok(RoomPage {
            rooms: listing.data,
            total_pages,
        })
    }

    pub async fn create_room(&self, request: &CreateRoomRequest) -> Result<RoomSummary, ApiError> {
        let envelope: Envelope<RoomSummary> = self.post(&["api", "room"], request).await?;
        Ok(envelope.data)
    }

    pub async fn messages(&self, room_id: &str) -> Result<Vec<Message>, ApiError> {
        let list: MessageList = self.get(&["api", "message", room_id], &[]).await?;
        Ok(list.messages)
    }

    pub async fn send_message(&self, room_id: &str, content: &str) -> Result<Message, ApiError> {
        self.post(&["api", "message"], &SendMessageRequest { room_id, content })
            .await
    }
}

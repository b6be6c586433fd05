//! HTTP client for the REST collaborators of the chat server.

use bubble_shared::{ApiError, Message, RosterEntry, RoomId, ServerSummary};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::config::Endpoint;

/// HTTP client for the account, room list, roster and history endpoints.
/// Authorized requests carry the session token as a bearer header.
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl Default for ApiClient {
    fn default() -> Self {
        Self::new()
    }
}

impl ApiClient {
    /// Create a new API client
    pub fn new() -> Self {
        Self {
            client: Client::new(),
            base_url: String::new(),
            token: None,
        }
    }

    pub fn for_endpoint(endpoint: &Endpoint) -> Self {
        Self::new().with_base_url(endpoint.http_base())
    }

    /// Set the base URL for API requests
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Authorize requests with a session token
    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token.filter(|t| !t.is_empty());
        self
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        if self.base_url.is_empty() {
            if path.starts_with('/') {
                path.to_string()
            } else {
                format!("/{path}")
            }
        } else {
            let base = self.base_url.trim_end_matches('/');
            let path = path.trim_start_matches('/');
            format!("{base}/{path}")
        }
    }

    fn authorize(&self, rb: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => rb.bearer_auth(token),
            None => rb,
        }
    }

    async fn read<TRes: DeserializeOwned>(resp: reqwest::Response) -> Result<TRes, ApiError> {
        let status = resp.status().as_u16();
        let is_success = resp.status().is_success();
        let text = resp
            .text()
            .await
            .map_err(|e| ApiError::Network(format!("failed to read body: {e}")))?;

        if !is_success {
            return Err(ApiError::Http { status, body: text });
        }

        if text.is_empty() {
            serde_json::from_str("null").map_err(|e| ApiError::Deserialize(e.to_string()))
        } else {
            serde_json::from_str(&text).map_err(|e| ApiError::Deserialize(e.to_string()))
        }
    }

    /// Make a GET request
    pub async fn get_json<TRes: DeserializeOwned>(&self, path: &str) -> Result<TRes, ApiError> {
        let rb = self.authorize(self.client.get(self.url(path)));
        let resp = rb.send().await.map_err(|e| ApiError::Network(e.to_string()))?;
        Self::read(resp).await
    }

    /// Make a POST request with JSON body
    pub async fn post_json<TReq: Serialize, TRes: DeserializeOwned>(
        &self,
        path: &str,
        body: &TReq,
    ) -> Result<TRes, ApiError> {
        let rb = self.authorize(self.client.post(self.url(path)));
        let resp = rb
            .json(body)
            .send()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;
        Self::read(resp).await
    }

    // --- Accounts ---

    /// Exchange credentials for a session token.
    pub async fn login(&self, username: &str, password: &str) -> Result<String, ApiError> {
        let body = serde_json::json!({ "username": username, "password": password });
        let resp: LoginResponse = self.post_json("api/login", &body).await?;
        Ok(resp.response.token)
    }

    pub async fn create_account(
        &self,
        username: &str,
        password: &str,
        display_name: &str,
    ) -> Result<(), ApiError> {
        let body = serde_json::json!({
            "username": username,
            "password": password,
            "displayName": display_name,
        });
        let _: serde_json::Value = self.post_json("api/create", &body).await?;
        Ok(())
    }

    /// Whether the configured token is still a valid session.
    pub async fn login_status(&self) -> Result<bool, ApiError> {
        let resp: LoginStatus = self.get_json("api/login_status").await?;
        Ok(resp.logged_in)
    }

    // --- Rooms ---

    /// Rooms the current user belongs to.
    pub async fn list_servers(&self) -> Result<Vec<ServerSummary>, ApiError> {
        let resp: ServersResponse = self.post_json("api/servers/get", &serde_json::json!({})).await?;
        Ok(resp.servers.server)
    }

    /// Full roster of `room`, used to seed presence.
    pub async fn fetch_roster(&self, room: &RoomId) -> Result<Vec<RosterEntry>, ApiError> {
        let body = serde_json::json!({ "serverID": room });
        let resp: RosterResponse = self.post_json("api/servers/userlist_get", &body).await?;
        Ok(resp.users.user_list)
    }

    /// Message history of `room`, oldest first.
    pub async fn fetch_messages(&self, room: &RoomId) -> Result<Vec<Message>, ApiError> {
        let body = serde_json::json!({ "sid": room });
        let resp: MessagesResponse = self.post_json("api/messages_get", &body).await?;
        Ok(resp.messages.messages)
    }
}

// --- Response envelopes ---

#[derive(Debug, Deserialize)]
struct LoginResponse {
    response: LoginToken,
}

#[derive(Debug, Deserialize)]
struct LoginToken {
    token: String,
}

#[derive(Debug, Deserialize)]
struct LoginStatus {
    #[serde(default)]
    logged_in: bool,
}

#[derive(Debug, Deserialize)]
struct ServersResponse {
    servers: ServerList,
}

#[derive(Debug, Deserialize)]
struct ServerList {
    #[serde(default)]
    server: Vec<ServerSummary>,
}

#[derive(Debug, Deserialize)]
struct RosterResponse {
    users: UserList,
}

#[derive(Debug, Deserialize)]
struct UserList {
    #[serde(default)]
    user_list: Vec<RosterEntry>,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    messages: MessageList,
}

#[derive(Debug, Deserialize)]
struct MessageList {
    #[serde(default)]
    messages: Vec<Message>,
}

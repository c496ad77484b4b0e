use serde::{Deserialize, Serialize};

// -- Auth --

/// Token pair returned by `/users/token` and `/users/refresh`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
}

#[derive(Debug, Serialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

/// Body of `/users/refresh` and `/users/logout`.
#[derive(Debug, Serialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

// -- Posts --

#[derive(Debug, Clone, Serialize)]
pub struct CreatePostRequest {
    pub title: Option<String>,
    pub content: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct UpdatePostRequest {
    pub title: Option<String>,
    pub content: Option<String>,
}

// -- Chat --

#[derive(Debug, Clone, Serialize)]
pub struct CreateChannelRequest {
    pub name: String,
    pub description: Option<String>,
    pub is_public: bool,
}

/// The only outbound gateway frame: `{"content": "..."}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundChat {
    pub content: String,
}

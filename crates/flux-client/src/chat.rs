use reqwest::Method;

use flux_types::api::{CreateChannelRequest, OutboundChat};
use flux_types::models::{Channel, ChannelDetail, ChatMessage};

use crate::client::{ApiClient, NO_BODY};
use crate::error::ApiError;

impl ApiClient {
    pub async fn list_channels(&self) -> Result<Vec<Channel>, ApiError> {
        self.send_authed(Method::GET, "/chat/channels", NO_BODY).await
    }

    pub async fn get_channel(&self, id: i64) -> Result<ChannelDetail, ApiError> {
        self.send_authed(Method::GET, &format!("/chat/channels/{id}"), NO_BODY)
            .await
    }

    pub async fn create_channel(
        &self,
        channel: &CreateChannelRequest,
    ) -> Result<Channel, ApiError> {
        self.send_authed(Method::POST, "/chat/channels", Some(channel))
            .await
    }

    /// REST fallback for posting a message; live sends go through the
    /// gateway connection.
    pub async fn send_channel_message(
        &self,
        channel_id: i64,
        content: &str,
    ) -> Result<ChatMessage, ApiError> {
        self.send_authed(
            Method::POST,
            &format!("/chat/channels/{channel_id}/messages"),
            Some(&OutboundChat {
                content: content.to_string(),
            }),
        )
        .await
    }

    pub async fn search_channels(&self, query: &str) -> Result<Vec<Channel>, ApiError> {
        self.get_authed_query("/chat/channels/search", &[("query", query)])
            .await
    }

    pub async fn join_channel(&self, id: i64) -> Result<(), ApiError> {
        self.send_authed_unit(Method::POST, &format!("/chat/channels/{id}/join"), NO_BODY)
            .await
    }

    pub async fn leave_channel(&self, id: i64) -> Result<(), ApiError> {
        self.send_authed_unit(
            Method::DELETE,
            &format!("/chat/channels/{id}/leave"),
            NO_BODY,
        )
        .await
    }
}

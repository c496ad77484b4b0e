use reqwest::Method;

use flux_types::api::{CreatePostRequest, UpdatePostRequest};
use flux_types::models::Post;

use crate::client::{ApiClient, NO_BODY};
use crate::error::ApiError;

impl ApiClient {
    pub async fn list_posts(&self) -> Result<Vec<Post>, ApiError> {
        self.send_public(Method::GET, "/posts", NO_BODY).await
    }

    pub async fn get_post(&self, id: i64) -> Result<Post, ApiError> {
        self.send_public(Method::GET, &format!("/posts/{id}"), NO_BODY)
            .await
    }

    pub async fn create_post(&self, post: &CreatePostRequest) -> Result<Post, ApiError> {
        self.send_authed(Method::POST, "/posts", Some(post)).await
    }

    pub async fn update_post(&self, id: i64, post: &UpdatePostRequest) -> Result<Post, ApiError> {
        self.send_authed(Method::PUT, &format!("/posts/{id}"), Some(post))
            .await
    }

    pub async fn delete_post(&self, id: i64) -> Result<(), ApiError> {
        self.send_authed_unit(Method::DELETE, &format!("/posts/{id}"), NO_BODY)
            .await
    }
}

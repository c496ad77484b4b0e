pub mod auth;
pub mod chat;
pub mod client;
pub mod config;
pub mod error;
pub mod posts;
pub mod refresh;
pub mod store;

pub use client::ApiClient;
pub use config::ClientConfig;
pub use error::ApiError;
pub use store::{CredentialStore, Credentials, FileCredentialStore, MemoryCredentialStore};

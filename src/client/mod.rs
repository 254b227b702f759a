use async_trait::async_trait;
use thiserror::Error;

use crate::types::Project;

pub mod gitlab;

pub use gitlab::GitLabClient;

/// Errors surfaced by the remote repository API.
///
/// Callers need to tell "the file isn't there" apart from "the request
/// failed": a missing target file is the normal miss case for detection
/// rules, while a transport failure during project listing aborts the run.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("API error: {status} for {url}")]
    Http {
        status: reqwest::StatusCode,
        url: String,
    },

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("authentication failed: {0}")]
    Auth(String),
}

/// Remote repository listing and raw-file access.
///
/// The production implementation talks to GitLab; tests substitute an
/// in-memory client.
#[async_trait]
pub trait RepoClient: Send + Sync {
    /// List every project in the configured group. Failure here is fatal
    /// to the run.
    async fn list_projects(&self) -> Result<Vec<Project>, ClientError>;

    /// Fetch one file's raw bytes at the project's scan ref.
    async fn get_raw_file(&self, project: &Project, path: &str) -> Result<Vec<u8>, ClientError>;

    /// List all blob paths in the project tree, recursively.
    async fn list_files(&self, project: &Project) -> Result<Vec<String>, ClientError>;
}

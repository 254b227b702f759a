use async_trait::async_trait;
use serde::Deserialize;

use super::{ClientError, RepoClient};
use crate::types::Project;

/// One entry of `GET /projects/:id/repository/tree`.
#[derive(Debug, Deserialize)]
struct TreeEntry {
    path: String,
    #[serde(rename = "type")]
    entry_type: String,
}

pub struct GitLabClient {
    client: reqwest::Client,
    base_url: String,
    group: String,
    ref_override: Option<String>,
}

impl GitLabClient {
    pub fn new(
        base_url: &str,
        group: &str,
        token: Option<&str>,
        ref_override: Option<String>,
    ) -> Result<Self, ClientError> {
        let mut headers = reqwest::header::HeaderMap::new();

        if let Some(token) = token {
            let value = reqwest::header::HeaderValue::from_str(token)
                .map_err(|_| ClientError::Auth("token contains invalid characters".to_string()))?;
            headers.insert("PRIVATE-TOKEN", value);
        }

        let client = reqwest::Client::builder()
            .user_agent("forgescan/0.1.0")
            .timeout(std::time::Duration::from_secs(30))
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            group: group.to_string(),
            ref_override,
        })
    }

    /// Percent-encode a value for use as a single URL path segment. GitLab
    /// addresses files by their full repository path, so '/' must become
    /// %2F rather than a path separator.
    fn encode_path_segment(path: &str) -> String {
        let mut out = String::with_capacity(path.len());
        for byte in path.bytes() {
            match byte {
                b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                    out.push(byte as char)
                }
                _ => out.push_str(&format!("%{:02X}", byte)),
            }
        }
        out
    }

    /// Fetch all pages of a listing endpoint, following the `x-next-page`
    /// header until the API reports no further page.
    async fn fetch_paginated<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        extra_query: &[(&str, &str)],
    ) -> Result<Vec<T>, ClientError> {
        let mut items = Vec::new();
        let mut page = String::from("1");

        loop {
            let response = self
                .client
                .get(url)
                .query(&[("per_page", "100"), ("page", page.as_str())])
                .query(extra_query)
                .send()
                .await?;

            let status = response.status();
            if status == reqwest::StatusCode::UNAUTHORIZED
                || status == reqwest::StatusCode::FORBIDDEN
            {
                return Err(ClientError::Auth(format!("{} for {}", status, url)));
            }
            if status == reqwest::StatusCode::NOT_FOUND {
                return Err(ClientError::NotFound(url.to_string()));
            }
            if !status.is_success() {
                return Err(ClientError::Http {
                    status,
                    url: url.to_string(),
                });
            }

            let next_page = response
                .headers()
                .get("x-next-page")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("")
                .to_string();

            let batch: Vec<T> = response.json().await?;
            items.extend(batch);

            if next_page.is_empty() {
                break;
            }
            page = next_page;
        }

        Ok(items)
    }
}

#[async_trait]
impl RepoClient for GitLabClient {
    async fn list_projects(&self) -> Result<Vec<Project>, ClientError> {
        let url = format!(
            "{}/api/v4/groups/{}/projects",
            self.base_url,
            Self::encode_path_segment(&self.group)
        );
        self.fetch_paginated(
            &url,
            &[
                ("include_subgroups", "true"),
                ("archived", "false"),
                ("order_by", "path"),
                ("sort", "asc"),
            ],
        )
        .await
    }

    async fn get_raw_file(&self, project: &Project, path: &str) -> Result<Vec<u8>, ClientError> {
        let url = format!(
            "{}/api/v4/projects/{}/repository/files/{}/raw",
            self.base_url,
            project.id,
            Self::encode_path_segment(path)
        );
        let git_ref = project.git_ref(self.ref_override.as_deref());

        let response = self
            .client
            .get(&url)
            .query(&[("ref", git_ref.as_str())])
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(ClientError::NotFound(format!(
                "{} in {}",
                path, project.path_with_namespace
            )));
        }
        if !status.is_success() {
            return Err(ClientError::Http { status, url });
        }

        Ok(response.bytes().await?.to_vec())
    }

    async fn list_files(&self, project: &Project) -> Result<Vec<String>, ClientError> {
        let url = format!(
            "{}/api/v4/projects/{}/repository/tree",
            self.base_url, project.id
        );
        let git_ref = project.git_ref(self.ref_override.as_deref());

        let entries: Vec<TreeEntry> = self
            .fetch_paginated(&url, &[("recursive", "true"), ("ref", git_ref.as_str())])
            .await?;

        Ok(entries
            .into_iter()
            .filter(|e| e.entry_type == "blob")
            .map(|e| e.path)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_path_segment() {
        assert_eq!(
            GitLabClient::encode_path_segment("src/app/main.py"),
            "src%2Fapp%2Fmain.py"
        );
        assert_eq!(
            GitLabClient::encode_path_segment(".python-version"),
            ".python-version"
        );
        assert_eq!(
            GitLabClient::encode_path_segment("docs/über.md"),
            "docs%2F%C3%BCber.md"
        );
    }

    #[test]
    fn test_base_url_trailing_slash_stripped() {
        let client =
            GitLabClient::new("https://gitlab.example.com/", "platform", None, None).unwrap();
        assert_eq!(client.base_url, "https://gitlab.example.com");
    }

    #[test]
    fn test_invalid_token_rejected() {
        let result = GitLabClient::new(
            "https://gitlab.example.com",
            "platform",
            Some("bad\ntoken"),
            None,
        );
        assert!(matches!(result, Err(ClientError::Auth(_))));
    }

    #[test]
    fn test_tree_entry_deserialization() {
        let json = r#"[
            {"id": "a1", "name": "main.py", "type": "blob", "path": "src/main.py", "mode": "100644"},
            {"id": "b2", "name": "src", "type": "tree", "path": "src", "mode": "040000"}
        ]"#;
        let entries: Vec<TreeEntry> = serde_json::from_str(json).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].path, "src/main.py");
        assert_eq!(entries[0].entry_type, "blob");
        assert_eq!(entries[1].entry_type, "tree");
    }
}

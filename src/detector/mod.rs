use std::sync::Arc;

use anyhow::Result;

use crate::client::{ClientError, RepoClient};
use crate::rules::RuleRegistry;
use crate::types::{Project, ProjectVersionResult};

/// Tries each enabled detection rule against one project, most
/// authoritative rule first, and stops at the first hit.
pub struct VersionDetector {
    registry: Arc<RuleRegistry>,
}

impl VersionDetector {
    /// Fails when no rules are enabled; an empty registry would silently
    /// report every project as "not detected".
    pub fn new(registry: Arc<RuleRegistry>) -> Result<Self> {
        if registry.is_empty() {
            anyhow::bail!("no detection rules are enabled");
        }
        Ok(Self { registry })
    }

    /// Detect the declared runtime version of one project.
    ///
    /// A missing target file or a parse miss means "try the next rule",
    /// and exhausting every rule is a valid outcome with no version and no
    /// error. Transport-level fetch failures also fall through, but if the
    /// whole project turns out to be unreachable (no rule detected
    /// anything and at least one fetch failed for a reason other than
    /// not-found), the last such failure is reported as the project's
    /// error so "nothing found" stays distinguishable from "something
    /// went wrong".
    pub async fn detect(
        &self,
        client: &dyn RepoClient,
        project: &Project,
        index: usize,
        total: usize,
    ) -> ProjectVersionResult {
        let mut result = ProjectVersionResult::new(project, index, total);
        let mut last_failure: Option<String> = None;

        for rule in self.registry.enabled() {
            let content = match client.get_raw_file(project, rule.target_file).await {
                Ok(content) => content,
                Err(ClientError::NotFound(_)) => continue,
                Err(e) => {
                    last_failure = Some(e.to_string());
                    continue;
                }
            };

            let outcome = rule.parse(&content);
            if outcome.found && !outcome.version.is_empty() {
                result.version = Some(outcome.version);
                result.detection_source = Some(rule.target_file.to_string());
                break;
            }
        }

        if result.version.is_none() {
            result.error = last_failure;
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ClientError;
    use crate::rules::{Rule, VersionParser};
    use async_trait::async_trait;
    use std::collections::HashMap;

    /// In-memory client serving a fixed file map for one project.
    struct FileMapClient {
        files: HashMap<String, Vec<u8>>,
        failing_files: Vec<String>,
    }

    impl FileMapClient {
        fn new(files: &[(&str, &str)]) -> Self {
            Self {
                files: files
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.as_bytes().to_vec()))
                    .collect(),
                failing_files: Vec::new(),
            }
        }
    }

    #[async_trait]
    impl RepoClient for FileMapClient {
        async fn list_projects(&self) -> Result<Vec<Project>, ClientError> {
            Ok(vec![])
        }

        async fn get_raw_file(
            &self,
            _project: &Project,
            path: &str,
        ) -> Result<Vec<u8>, ClientError> {
            if self.failing_files.iter().any(|f| f == path || f == "*") {
                return Err(ClientError::Http {
                    status: reqwest::StatusCode::INTERNAL_SERVER_ERROR,
                    url: path.to_string(),
                });
            }
            self.files
                .get(path)
                .cloned()
                .ok_or_else(|| ClientError::NotFound(path.to_string()))
        }

        async fn list_files(&self, _project: &Project) -> Result<Vec<String>, ClientError> {
            Ok(self.files.keys().cloned().collect())
        }
    }

    fn project() -> Project {
        Project {
            id: 1,
            name: "api".to_string(),
            path_with_namespace: "group/api".to_string(),
            default_branch: Some("main".to_string()),
        }
    }

    fn detector() -> VersionDetector {
        VersionDetector::new(Arc::new(RuleRegistry::default_rules())).unwrap()
    }

    #[tokio::test]
    async fn test_highest_priority_rule_wins() {
        let client = FileMapClient::new(&[
            (".python-version", "3.12.1\n"),
            ("runtime.txt", "python-3.8.0\n"),
            ("Dockerfile", "FROM python:3.7\n"),
        ]);

        let result = detector().detect(&client, &project(), 1, 1).await;
        assert_eq!(result.version.as_deref(), Some("3.12.1"));
        assert_eq!(result.detection_source.as_deref(), Some(".python-version"));
        assert!(result.error.is_none());
    }

    #[tokio::test]
    async fn test_falls_through_missing_files() {
        let client = FileMapClient::new(&[(
            "pyproject.toml",
            "[project]\nname = \"api\"\nrequires-python = \">=3.11.5\"\n",
        )]);

        let result = detector().detect(&client, &project(), 1, 1).await;
        assert_eq!(result.version.as_deref(), Some(">=3.11.5"));
        assert_eq!(result.detection_source.as_deref(), Some("pyproject.toml"));
    }

    #[tokio::test]
    async fn test_falls_through_parse_miss() {
        // .python-version exists but holds only comments, so the next
        // rule's file must be consulted.
        let client = FileMapClient::new(&[
            (".python-version", "# TODO pin this\n"),
            ("runtime.txt", "python-3.10.2\n"),
        ]);

        let result = detector().detect(&client, &project(), 1, 1).await;
        assert_eq!(result.version.as_deref(), Some("3.10.2"));
        assert_eq!(result.detection_source.as_deref(), Some("runtime.txt"));
    }

    #[tokio::test]
    async fn test_no_recognized_files_is_not_an_error() {
        let client = FileMapClient::new(&[("README.md", "# api\n")]);

        let result = detector().detect(&client, &project(), 2, 5).await;
        assert!(result.version.is_none());
        assert!(result.detection_source.is_none());
        assert!(result.error.is_none());
        assert_eq!(result.index, 2);
        assert_eq!(result.total, 5);
    }

    #[tokio::test]
    async fn test_detection_is_idempotent() {
        let client = FileMapClient::new(&[
            ("runtime.txt", "python-3.9.18\n"),
            ("Dockerfile", "FROM python:3.11\n"),
        ]);
        let detector = detector();

        let first = detector.detect(&client, &project(), 1, 1).await;
        let second = detector.detect(&client, &project(), 1, 1).await;
        assert_eq!(first, second);
        assert_eq!(first.detection_source.as_deref(), Some("runtime.txt"));
    }

    #[tokio::test]
    async fn test_unreachable_project_reports_error() {
        let mut client = FileMapClient::new(&[]);
        client.failing_files.push("*".to_string());

        let result = detector().detect(&client, &project(), 1, 1).await;
        assert!(result.version.is_none());
        assert!(result.error.is_some());
    }

    #[tokio::test]
    async fn test_transport_failure_on_one_file_still_falls_through() {
        let mut client =
            FileMapClient::new(&[("runtime.txt", "python-3.10.2\n")]);
        client.failing_files.push(".python-version".to_string());

        let result = detector().detect(&client, &project(), 1, 1).await;
        assert_eq!(result.version.as_deref(), Some("3.10.2"));
        assert!(result.error.is_none());
    }

    #[test]
    fn test_empty_registry_is_a_configuration_error() {
        let registry = Arc::new(RuleRegistry::new(vec![Rule {
            priority: 1,
            enabled: false,
            target_file: "runtime.txt",
            parser: VersionParser::RuntimeTxt,
        }]));
        assert!(VersionDetector::new(registry).is_err());
    }
}

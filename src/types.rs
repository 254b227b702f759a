use serde::{Deserialize, Serialize};

/// A project as reported by the remote group listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: u64,
    pub name: String,
    pub path_with_namespace: String,

    /// Branch used for raw-file fetches unless overridden by config.
    #[serde(default)]
    pub default_branch: Option<String>,
}

impl Project {
    pub fn git_ref(&self, override_ref: Option<&str>) -> String {
        if let Some(r) = override_ref {
            return r.to_string();
        }
        self.default_branch
            .clone()
            .unwrap_or_else(|| "HEAD".to_string())
    }
}

/// Outcome of running one rule's parser over fetched file content.
///
/// `found == false` always carries an empty version string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionOutcome {
    pub found: bool,
    pub version: String,
    pub source: String,
}

impl VersionOutcome {
    pub fn found(version: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            found: true,
            version: version.into(),
            source: source.into(),
        }
    }

    pub fn not_found(source: impl Into<String>) -> Self {
        Self {
            found: false,
            version: String::new(),
            source: source.into(),
        }
    }
}

/// One matching line in one file. A line with several occurrences of the
/// term still produces a single entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchEntry {
    pub file_path: String,
    /// 1-based.
    pub line_number: usize,
    pub line_content: String,
    pub matched_text: String,
}

/// Context window rendered around one match, built from content that was
/// already fetched for the scan. Lines carry their own 1-based numbers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchContext {
    pub file_path: String,
    pub line_number: usize,
    pub lines: Vec<(usize, String)>,
}

/// Result of version detection for a single project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectVersionResult {
    pub index: usize,
    pub total: usize,
    pub project_name: String,
    pub project_path: String,

    /// Detected version, if any rule hit.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// Filename whose content yielded the version.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detection_source: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProjectVersionResult {
    pub fn new(project: &Project, index: usize, total: usize) -> Self {
        Self {
            index,
            total,
            project_name: project.name.clone(),
            project_path: project.path_with_namespace.clone(),
            version: None,
            detection_source: None,
            error: None,
        }
    }

    pub fn detected(&self) -> bool {
        self.version.is_some()
    }
}

/// Result of a content search over a single project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectSearchResult {
    pub index: usize,
    pub total: usize,
    pub project_name: String,
    pub project_path: String,
    pub matches: Vec<MatchEntry>,

    /// Present only when the scan ran with a context window.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub contexts: Vec<MatchContext>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProjectSearchResult {
    pub fn new(project: &Project, index: usize, total: usize) -> Self {
        Self {
            index,
            total,
            project_name: project.name.clone(),
            project_path: project.path_with_namespace.clone(),
            matches: Vec::new(),
            contexts: Vec::new(),
            error: None,
        }
    }
}

use std::collections::HashMap;
use std::sync::Mutex;

use colored::*;

use crate::types::{ProjectSearchResult, ProjectVersionResult};

/// Version-mode counters. Created once per run, mutated once per completed
/// project behind the mutex, read once for the final summary.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ScanCounts {
    pub total: usize,
    pub detected: usize,
    pub not_detected: usize,
    pub errors: usize,
    pub by_version: HashMap<String, usize>,
    pub by_source: HashMap<String, usize>,
}

#[derive(Debug, Default)]
pub struct ScanStatistics {
    counts: Mutex<ScanCounts>,
}

impl ScanStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, result: &ProjectVersionResult) {
        let mut counts = self.counts.lock().unwrap();
        counts.total += 1;

        if result.error.is_some() {
            counts.errors += 1;
        } else if let Some(version) = &result.version {
            counts.detected += 1;
            *counts.by_version.entry(version.clone()).or_insert(0) += 1;
            if let Some(source) = &result.detection_source {
                *counts.by_source.entry(source.clone()).or_insert(0) += 1;
            }
        } else {
            counts.not_detected += 1;
        }
    }

    pub fn snapshot(&self) -> ScanCounts {
        self.counts.lock().unwrap().clone()
    }
}

impl ScanCounts {
    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!(
            "\n{} projects scanned: {} detected, {} not detected, {} errors\n",
            self.total.to_string().bold(),
            self.detected.to_string().green(),
            self.not_detected.to_string().yellow(),
            self.errors.to_string().red(),
        ));

        if !self.by_version.is_empty() {
            out.push_str("\nVersions:\n");
            let mut versions: Vec<(&String, &usize)> = self.by_version.iter().collect();
            versions.sort_by(|a, b| b.1.cmp(a.1).then(a.0.cmp(b.0)));
            for (version, count) in versions {
                out.push_str(&format!("  {:>4}  {}\n", count, version.cyan()));
            }
        }

        if !self.by_source.is_empty() {
            out.push_str("\nDetection sources:\n");
            let mut sources: Vec<(&String, &usize)> = self.by_source.iter().collect();
            sources.sort_by(|a, b| b.1.cmp(a.1).then(a.0.cmp(b.0)));
            for (source, count) in sources {
                out.push_str(&format!("  {:>4}  {}\n", count, source));
            }
        }

        out
    }
}

/// Search-mode counters, same locking discipline as [`ScanStatistics`].
#[derive(Debug, Default, Clone, PartialEq)]
pub struct SearchCounts {
    pub total: usize,
    pub with_matches: usize,
    pub no_matches: usize,
    pub errors: usize,
    pub total_match_lines: usize,
}

#[derive(Debug, Default)]
pub struct ContentScanStatistics {
    counts: Mutex<SearchCounts>,
}

impl ContentScanStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, result: &ProjectSearchResult) {
        let mut counts = self.counts.lock().unwrap();
        counts.total += 1;

        if result.error.is_some() {
            counts.errors += 1;
        } else if result.matches.is_empty() {
            counts.no_matches += 1;
        } else {
            counts.with_matches += 1;
            counts.total_match_lines += result.matches.len();
        }
    }

    pub fn snapshot(&self) -> SearchCounts {
        self.counts.lock().unwrap().clone()
    }
}

impl SearchCounts {
    pub fn render(&self) -> String {
        format!(
            "\n{} projects scanned: {} with matches ({} matching lines), {} without, {} errors\n",
            self.total.to_string().bold(),
            self.with_matches.to_string().green(),
            self.total_match_lines.to_string().bold(),
            self.no_matches.to_string().yellow(),
            self.errors.to_string().red(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{MatchEntry, Project};

    fn project() -> Project {
        Project {
            id: 1,
            name: "api".to_string(),
            path_with_namespace: "group/api".to_string(),
            default_branch: None,
        }
    }

    fn version_result(
        version: Option<&str>,
        source: Option<&str>,
        error: Option<&str>,
    ) -> ProjectVersionResult {
        let mut result = ProjectVersionResult::new(&project(), 1, 3);
        result.version = version.map(str::to_string);
        result.detection_source = source.map(str::to_string);
        result.error = error.map(str::to_string);
        result
    }

    #[test]
    fn test_scan_counts_distinguish_errors_from_not_detected() {
        let stats = ScanStatistics::new();
        stats.record(&version_result(Some("3.11.5"), Some("pyproject.toml"), None));
        stats.record(&version_result(None, None, None));
        stats.record(&version_result(None, None, Some("fetch failed")));

        let counts = stats.snapshot();
        assert_eq!(counts.total, 3);
        assert_eq!(counts.detected, 1);
        assert_eq!(counts.not_detected, 1);
        assert_eq!(counts.errors, 1);
        assert_eq!(counts.by_version["3.11.5"], 1);
        assert_eq!(counts.by_source["pyproject.toml"], 1);
    }

    #[test]
    fn test_scan_counts_tally_by_version() {
        let stats = ScanStatistics::new();
        for _ in 0..3 {
            stats.record(&version_result(Some("3.11"), Some(".python-version"), None));
        }
        stats.record(&version_result(Some("3.9"), Some("runtime.txt"), None));

        let counts = stats.snapshot();
        assert_eq!(counts.by_version["3.11"], 3);
        assert_eq!(counts.by_version["3.9"], 1);
        assert_eq!(counts.by_source[".python-version"], 3);
    }

    #[test]
    fn test_search_counts() {
        let stats = ContentScanStatistics::new();

        let mut with_matches = ProjectSearchResult::new(&project(), 1, 2);
        with_matches.matches.push(MatchEntry {
            file_path: "a.py".to_string(),
            line_number: 1,
            line_content: "password".to_string(),
            matched_text: "password".to_string(),
        });
        with_matches.matches.push(MatchEntry {
            file_path: "a.py".to_string(),
            line_number: 9,
            line_content: "password2".to_string(),
            matched_text: "password".to_string(),
        });
        stats.record(&with_matches);
        stats.record(&ProjectSearchResult::new(&project(), 2, 2));

        let counts = stats.snapshot();
        assert_eq!(counts.total, 2);
        assert_eq!(counts.with_matches, 1);
        assert_eq!(counts.no_matches, 1);
        assert_eq!(counts.total_match_lines, 2);
        assert_eq!(counts.errors, 0);
    }

    #[test]
    fn test_render_includes_all_counters() {
        colored::control::set_override(false);
        let counts = ScanCounts {
            total: 3,
            detected: 1,
            not_detected: 1,
            errors: 1,
            ..Default::default()
        };
        let rendered = counts.render();
        assert!(rendered.contains("3 projects scanned"));
        assert!(rendered.contains("1 detected"));
        assert!(rendered.contains("1 not detected"));
        assert!(rendered.contains("1 errors"));
    }
}

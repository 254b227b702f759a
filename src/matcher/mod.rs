use glob::Pattern;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::MatchEntry;

/// What to search for and where. Immutable once a scan begins; compiled
/// exactly once into a [`CompiledMatcher`] that is shared by every worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SearchSpec {
    pub term: String,

    #[serde(default)]
    pub is_regex: bool,

    #[serde(default = "default_case_sensitive")]
    pub case_sensitive: bool,

    /// Globs restricting which file paths are scanned. Empty means all.
    #[serde(default)]
    pub file_patterns: Vec<String>,

    /// Lines of surrounding context rendered around each match.
    #[serde(default)]
    pub context_lines: usize,
}

fn default_case_sensitive() -> bool {
    true
}

impl SearchSpec {
    pub fn literal(term: impl Into<String>) -> Self {
        Self {
            term: term.into(),
            is_regex: false,
            case_sensitive: true,
            file_patterns: Vec::new(),
            context_lines: 0,
        }
    }
}

#[derive(Debug, Error)]
pub enum MatcherError {
    #[error("invalid search pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    #[error("invalid file pattern {pattern:?}: {source}")]
    InvalidFilePattern {
        pattern: String,
        source: glob::PatternError,
    },

    #[error("search term is empty")]
    EmptyTerm,
}

enum MatcherKind {
    /// Literal term, plus its lowercase form for case-insensitive scans.
    Literal { term: String, lowered: String },
    Regex(Regex),
}

/// A search spec compiled once and reused across all projects and files.
pub struct CompiledMatcher {
    kind: MatcherKind,
    case_sensitive: bool,
    file_patterns: Vec<Pattern>,
}

impl CompiledMatcher {
    /// Compile the spec. Pattern errors surface here, before any project
    /// is touched.
    pub fn compile(spec: &SearchSpec) -> Result<Self, MatcherError> {
        if spec.term.is_empty() {
            return Err(MatcherError::EmptyTerm);
        }

        let kind = if spec.is_regex {
            let regex = RegexBuilder::new(&spec.term)
                .case_insensitive(!spec.case_sensitive)
                .build()?;
            MatcherKind::Regex(regex)
        } else {
            MatcherKind::Literal {
                term: spec.term.clone(),
                lowered: spec.term.to_lowercase(),
            }
        };

        let file_patterns = spec
            .file_patterns
            .iter()
            .map(|p| {
                Pattern::new(p).map_err(|source| MatcherError::InvalidFilePattern {
                    pattern: p.clone(),
                    source,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            kind,
            case_sensitive: spec.case_sensitive,
            file_patterns,
        })
    }

    /// True when the path should be scanned at all. Patterns are tried
    /// against the full path and against the basename, so `*.py` picks up
    /// `src/app.py`.
    pub fn matches_path(&self, path: &str) -> bool {
        if self.file_patterns.is_empty() {
            return true;
        }
        let basename = path.rsplit('/').next().unwrap_or(path);
        self.file_patterns
            .iter()
            .any(|p| p.matches(path) || p.matches(basename))
    }

    /// Scan one file's content, producing one entry per matching line.
    ///
    /// Content that does not decode as UTF-8 yields no matches; that is
    /// the per-file absorb policy, not an error.
    pub fn scan_file(&self, path: &str, content: &[u8]) -> Vec<MatchEntry> {
        if !self.matches_path(path) {
            return Vec::new();
        }
        let text = match std::str::from_utf8(content) {
            Ok(text) => text,
            Err(_) => return Vec::new(),
        };

        let mut entries = Vec::new();
        for (idx, line) in text.lines().enumerate() {
            if let Some(matched) = self.match_line(line) {
                entries.push(MatchEntry {
                    file_path: path.to_string(),
                    line_number: idx + 1,
                    line_content: line.to_string(),
                    matched_text: matched,
                });
            }
        }
        entries
    }

    /// The matched text for one line, or None. Literal mode reports the
    /// search term itself; regex mode reports the first match span.
    fn match_line(&self, line: &str) -> Option<String> {
        match &self.kind {
            MatcherKind::Literal { term, lowered } => {
                let hit = if self.case_sensitive {
                    line.contains(term.as_str())
                } else {
                    line.to_lowercase().contains(lowered.as_str())
                };
                hit.then(|| term.clone())
            }
            MatcherKind::Regex(regex) => regex.find(line).map(|m| m.as_str().to_string()),
        }
    }
}

/// Surrounding lines for a match at `line_number`, read from content that
/// was already fetched for the scan. Includes the matching line itself.
pub fn render_context(content: &str, line_number: usize, context_lines: usize) -> Vec<(usize, String)> {
    let lines: Vec<&str> = content.lines().collect();
    // Line numbers are 1-based; anything outside the content has no window.
    if line_number == 0 || line_number > lines.len() {
        return Vec::new();
    }
    let first = line_number.saturating_sub(context_lines + 1);
    let last = (line_number + context_lines).min(lines.len());

    lines[first..last]
        .iter()
        .enumerate()
        .map(|(offset, line)| (first + offset + 1, line.to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn compile(spec: SearchSpec) -> CompiledMatcher {
        CompiledMatcher::compile(&spec).unwrap()
    }

    #[test]
    fn test_literal_case_sensitive() {
        let matcher = compile(SearchSpec::literal("API_KEY"));
        assert!(matcher.scan_file("a.py", b"api_key = 1\n").is_empty());
        let entries = matcher.scan_file("a.py", b"API_KEY = 1\n");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].matched_text, "API_KEY");
    }

    #[test]
    fn test_literal_case_insensitive() {
        let spec = SearchSpec {
            case_sensitive: false,
            ..SearchSpec::literal("API_KEY")
        };
        let matcher = compile(spec);
        let entries = matcher.scan_file("a.py", b"api_key = 1\n");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].line_number, 1);
        assert_eq!(entries[0].line_content, "api_key = 1");
    }

    #[test]
    fn test_line_numbers_are_one_based() {
        let matcher = compile(SearchSpec::literal("needle"));
        let entries = matcher.scan_file("a.txt", b"one\ntwo\nneedle here\n");
        assert_eq!(entries[0].line_number, 3);
    }

    #[test]
    fn test_one_entry_per_line_with_multiple_occurrences() {
        let matcher = compile(SearchSpec::literal("x"));
        let entries = matcher.scan_file("a.txt", b"x x x\n");
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_regex_reports_first_match_span() {
        let spec = SearchSpec {
            term: r"passw\w+".to_string(),
            is_regex: true,
            case_sensitive: true,
            file_patterns: Vec::new(),
            context_lines: 0,
        };
        let matcher = compile(spec);
        let entries = matcher.scan_file("a.txt", b"password = passwd\n");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].matched_text, "password");
    }

    #[test]
    fn test_regex_case_insensitive_flag() {
        let spec = SearchSpec {
            term: "password".to_string(),
            is_regex: true,
            case_sensitive: false,
            file_patterns: Vec::new(),
            context_lines: 0,
        };
        let matcher = compile(spec);
        let entries = matcher.scan_file("conf.ini", b"Password = 'x'\n");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].matched_text, "Password");
    }

    #[test]
    fn test_invalid_regex_fails_at_compile() {
        let spec = SearchSpec {
            term: "[unclosed".to_string(),
            is_regex: true,
            case_sensitive: true,
            file_patterns: Vec::new(),
            context_lines: 0,
        };
        assert!(matches!(
            CompiledMatcher::compile(&spec),
            Err(MatcherError::InvalidPattern(_))
        ));
    }

    #[test]
    fn test_empty_term_rejected() {
        assert!(matches!(
            CompiledMatcher::compile(&SearchSpec::literal("")),
            Err(MatcherError::EmptyTerm)
        ));
    }

    #[test]
    fn test_file_pattern_skips_non_matching_path() {
        let spec = SearchSpec {
            file_patterns: vec!["*.py".to_string()],
            ..SearchSpec::literal("import")
        };
        let matcher = compile(spec);
        assert!(matcher.scan_file("README.md", b"import this\n").is_empty());
        assert_eq!(matcher.scan_file("src/app.py", b"import this\n").len(), 1);
    }

    #[test]
    fn test_empty_file_patterns_match_everything() {
        let matcher = compile(SearchSpec::literal("x"));
        assert!(matcher.matches_path("any/thing/at.all"));
    }

    #[test]
    fn test_invalid_file_pattern_fails_at_compile() {
        let spec = SearchSpec {
            file_patterns: vec!["[".to_string()],
            ..SearchSpec::literal("x")
        };
        assert!(matches!(
            CompiledMatcher::compile(&spec),
            Err(MatcherError::InvalidFilePattern { .. })
        ));
    }

    #[test]
    fn test_empty_content_yields_no_matches() {
        let matcher = compile(SearchSpec::literal("x"));
        assert!(matcher.scan_file("a.txt", b"").is_empty());
    }

    #[test]
    fn test_binary_content_yields_no_matches() {
        let matcher = compile(SearchSpec::literal("x"));
        assert!(matcher.scan_file("a.bin", &[0xff, 0x00, 0x78]).is_empty());
    }

    #[test]
    fn test_compile_is_idempotent() {
        let spec = SearchSpec {
            term: "token".to_string(),
            is_regex: true,
            case_sensitive: false,
            file_patterns: vec!["*.env".to_string()],
            context_lines: 2,
        };
        let content = b"TOKEN=abc\nother\ntoken=def\n";
        let first = CompiledMatcher::compile(&spec).unwrap().scan_file("a.env", content);
        let second = CompiledMatcher::compile(&spec).unwrap().scan_file("a.env", content);
        assert_eq!(first, second);
        assert_eq!(first.len(), 2);
    }

    #[test]
    fn test_render_context_window() {
        let content = "l1\nl2\nl3\nl4\nl5\n";
        let lines = render_context(content, 3, 1);
        assert_eq!(
            lines,
            vec![
                (2, "l2".to_string()),
                (3, "l3".to_string()),
                (4, "l4".to_string())
            ]
        );
    }

    #[test]
    fn test_render_context_clamps_at_edges() {
        let content = "l1\nl2\nl3\n";
        let start = render_context(content, 1, 2);
        assert_eq!(start.first().unwrap().0, 1);
        assert_eq!(start.len(), 3);

        let end = render_context(content, 3, 5);
        assert_eq!(end.last().unwrap().0, 3);
    }

    #[test]
    fn test_render_context_out_of_range_line_is_empty() {
        let content = "l1\nl2\nl3\n";
        assert!(render_context(content, 4, 1).is_empty());
        assert!(render_context(content, 100, 0).is_empty());
        assert!(render_context(content, 0, 2).is_empty());
        assert!(render_context("", 1, 2).is_empty());
    }
}

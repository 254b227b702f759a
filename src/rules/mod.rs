use regex::Regex;

use crate::types::VersionOutcome;

/// How to pull a version string out of one file format. A plain enum keeps
/// every parser unit-testable without trait objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionParser {
    /// pyenv-style `.python-version`: the version is the first real line.
    PythonVersionFile,
    /// Heroku-style `runtime.txt`: `python-3.11.5`.
    RuntimeTxt,
    /// asdf `.tool-versions`: `python 3.11.5` among other tools.
    ToolVersions,
    /// `pyproject.toml`: `project.requires-python`, or the Poetry
    /// dependency table's `python` entry.
    PyprojectToml,
    /// `Pipfile`: `[requires] python_version`.
    Pipfile,
    /// `setup.py`: the `python_requires=` keyword argument.
    SetupPy,
    /// `Dockerfile`: the tag of a `FROM python:<tag>` base image.
    Dockerfile,
}

/// One ordered detection condition: which file to fetch and how to parse it.
///
/// Rules are immutable once the registry is built; priorities are distinct
/// and higher means more authoritative.
#[derive(Debug, Clone)]
pub struct Rule {
    pub priority: u32,
    pub enabled: bool,
    pub target_file: &'static str,
    pub parser: VersionParser,
}

impl Rule {
    pub fn parse(&self, content: &[u8]) -> VersionOutcome {
        self.parser.parse(content, self.target_file)
    }
}

impl VersionParser {
    /// Extract a version from raw file bytes. Undecodable or unparseable
    /// content is a miss, never an error.
    pub fn parse(&self, content: &[u8], source: &str) -> VersionOutcome {
        let text = match std::str::from_utf8(content) {
            Ok(text) => text,
            Err(_) => return VersionOutcome::not_found(source),
        };

        let version = match self {
            VersionParser::PythonVersionFile => parse_python_version_file(text),
            VersionParser::RuntimeTxt => parse_runtime_txt(text),
            VersionParser::ToolVersions => parse_tool_versions(text),
            VersionParser::PyprojectToml => parse_pyproject(text),
            VersionParser::Pipfile => parse_pipfile(text),
            VersionParser::SetupPy => parse_setup_py(text),
            VersionParser::Dockerfile => parse_dockerfile(text),
        };

        match version {
            Some(v) if !v.is_empty() => VersionOutcome::found(v, source),
            _ => VersionOutcome::not_found(source),
        }
    }
}

fn parse_python_version_file(text: &str) -> Option<String> {
    text.lines()
        .map(str::trim)
        .find(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
}

fn parse_runtime_txt(text: &str) -> Option<String> {
    let line = text.lines().map(str::trim).find(|l| !l.is_empty())?;
    line.strip_prefix("python-").map(str::to_string)
}

fn parse_tool_versions(text: &str) -> Option<String> {
    for line in text.lines() {
        let line = line.trim();
        if line.starts_with('#') {
            continue;
        }
        let mut parts = line.split_whitespace();
        if parts.next() == Some("python") {
            return parts.next().map(str::to_string);
        }
    }
    None
}

fn parse_pyproject(text: &str) -> Option<String> {
    let doc: toml::Value = toml::from_str(text).ok()?;

    if let Some(requires) = doc
        .get("project")
        .and_then(|p| p.get("requires-python"))
        .and_then(|v| v.as_str())
    {
        return Some(requires.trim().to_string());
    }

    doc.get("tool")
        .and_then(|t| t.get("poetry"))
        .and_then(|p| p.get("dependencies"))
        .and_then(|d| d.get("python"))
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
}

fn parse_pipfile(text: &str) -> Option<String> {
    let doc: toml::Value = toml::from_str(text).ok()?;
    doc.get("requires")
        .and_then(|r| r.get("python_version"))
        .and_then(|v| v.as_str())
        .map(str::to_string)
}

fn parse_setup_py(text: &str) -> Option<String> {
    // python_requires=">=3.8" with either quote style
    let re = Regex::new(r#"python_requires\s*=\s*["']([^"']+)["']"#).ok()?;
    re.captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

fn parse_dockerfile(text: &str) -> Option<String> {
    let re = Regex::new(r"(?mi)^\s*FROM\s+(?:[\w.\-]+/)*python:([\w.\-]+)").ok()?;
    let tag = re.captures(text)?.get(1)?.as_str();
    // Strip image variant suffixes like -slim or -alpine3.19
    let version = tag.split('-').next().unwrap_or(tag);
    if version.chars().next().is_some_and(|c| c.is_ascii_digit()) {
        Some(version.to_string())
    } else {
        None
    }
}

/// The fixed, priority-ordered rule set. Built once at startup and shared
/// read-only across all worker tasks.
#[derive(Debug, Clone)]
pub struct RuleRegistry {
    rules: Vec<Rule>,
}

impl RuleRegistry {
    pub fn new(rules: Vec<Rule>) -> Self {
        Self { rules }
    }

    pub fn default_rules() -> Self {
        Self::new(vec![
            Rule {
                priority: 100,
                enabled: true,
                target_file: ".python-version",
                parser: VersionParser::PythonVersionFile,
            },
            Rule {
                priority: 90,
                enabled: true,
                target_file: "runtime.txt",
                parser: VersionParser::RuntimeTxt,
            },
            Rule {
                priority: 85,
                enabled: true,
                target_file: ".tool-versions",
                parser: VersionParser::ToolVersions,
            },
            Rule {
                priority: 80,
                enabled: true,
                target_file: "pyproject.toml",
                parser: VersionParser::PyprojectToml,
            },
            Rule {
                priority: 70,
                enabled: true,
                target_file: "Pipfile",
                parser: VersionParser::Pipfile,
            },
            Rule {
                priority: 60,
                enabled: true,
                target_file: "setup.py",
                parser: VersionParser::SetupPy,
            },
            Rule {
                priority: 50,
                enabled: true,
                target_file: "Dockerfile",
                parser: VersionParser::Dockerfile,
            },
        ])
    }

    /// Enabled rules, most authoritative first.
    pub fn enabled(&self) -> Vec<&Rule> {
        let mut rules: Vec<&Rule> = self.rules.iter().filter(|r| r.enabled).collect();
        rules.sort_by(|a, b| b.priority.cmp(&a.priority));
        rules
    }

    pub fn is_empty(&self) -> bool {
        self.rules.iter().all(|r| !r.enabled)
    }
}

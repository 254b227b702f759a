use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use chrono::Utc;
use colored::*;
use serde::Serialize;

use crate::types::{MatchEntry, ProjectSearchResult, ProjectVersionResult};

/// A consumer of completed per-project results. Called once per project,
/// in arrival order, possibly from many tasks at once; implementations
/// serialize their own writes.
pub trait ResultSink: Send + Sync {
    fn version_result(&self, result: &ProjectVersionResult);
    fn search_result(&self, result: &ProjectSearchResult);
}

/// Line-oriented console output, rendered immediately as results arrive.
/// Every line carries `[index/total]` so readers can place it even when
/// concurrent completion shuffles the order.
pub struct ConsoleStreamer {
    /// Suppress projects with nothing to report.
    quiet: bool,
    /// Show the matched text alongside each matching line.
    verbose: bool,
    out: Mutex<std::io::Stdout>,
}

impl ConsoleStreamer {
    pub fn new(quiet: bool, verbose: bool) -> Self {
        Self {
            quiet,
            verbose,
            out: Mutex::new(std::io::stdout()),
        }
    }

    fn write_block(&self, block: &str) {
        let mut out = self.out.lock().unwrap();
        // A single write keeps concurrent blocks from interleaving.
        let _ = out.write_all(block.as_bytes());
        let _ = out.flush();
    }

    /// The console block for one version result, or None when quiet mode
    /// drops it.
    fn render_version(&self, result: &ProjectVersionResult) -> Option<String> {
        let prefix = format!("[{}/{}]", result.index, result.total);

        let line = if let Some(error) = &result.error {
            format!(
                "{} {} {}: {}\n",
                prefix.dimmed(),
                result.project_path.cyan(),
                "error".red(),
                error
            )
        } else if let Some(version) = &result.version {
            let source = result.detection_source.as_deref().unwrap_or("?");
            format!(
                "{} {} {} ({})\n",
                prefix.dimmed(),
                result.project_path.cyan(),
                version.green(),
                source
            )
        } else {
            if self.quiet {
                return None;
            }
            format!(
                "{} {} {}\n",
                prefix.dimmed(),
                result.project_path.cyan(),
                "not detected".yellow()
            )
        };

        Some(line)
    }

    /// The console block for one search result, or None when quiet mode
    /// drops it.
    fn render_search(&self, result: &ProjectSearchResult) -> Option<String> {
        let prefix = format!("[{}/{}]", result.index, result.total);
        let mut block = String::new();

        if let Some(error) = &result.error {
            block.push_str(&format!(
                "{} {} {}: {}\n",
                prefix.dimmed(),
                result.project_path.cyan(),
                "error".red(),
                error
            ));
        } else if result.matches.is_empty() {
            if self.quiet {
                return None;
            }
            block.push_str(&format!(
                "{} {} no matches\n",
                prefix.dimmed(),
                result.project_path.cyan()
            ));
        } else {
            block.push_str(&format!(
                "{} {} {} matching lines\n",
                prefix.dimmed(),
                result.project_path.cyan(),
                result.matches.len().to_string().green()
            ));
            for entry in &result.matches {
                let detail = if self.verbose {
                    format!(" [{}]", entry.matched_text)
                } else {
                    String::new()
                };

                if let Some(context) = result
                    .contexts
                    .iter()
                    .find(|c| c.file_path == entry.file_path && c.line_number == entry.line_number)
                {
                    for (number, line) in &context.lines {
                        if *number == entry.line_number {
                            block.push_str(&format!(
                                "  {}:{}: {}{}\n",
                                entry.file_path,
                                number,
                                line.trim_end(),
                                detail
                            ));
                        } else {
                            block.push_str(&format!(
                                "  {}\n",
                                format!("{}:{}: {}", entry.file_path, number, line.trim_end())
                                    .dimmed()
                            ));
                        }
                    }
                } else {
                    block.push_str(&format!(
                        "  {}:{}: {}{}\n",
                        entry.file_path,
                        entry.line_number,
                        entry.line_content.trim_end(),
                        detail
                    ));
                }
            }
        }

        Some(block)
    }
}

impl ResultSink for ConsoleStreamer {
    fn version_result(&self, result: &ProjectVersionResult) {
        if let Some(block) = self.render_version(result) {
            self.write_block(&block);
        }
    }

    fn search_result(&self, result: &ProjectSearchResult) {
        if let Some(block) = self.render_search(result) {
            self.write_block(&block);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

/// One persisted log record. Fields are additive so log consumers can
/// ignore result kinds they do not know.
#[derive(Debug, Serialize)]
struct LogRecord<'a> {
    timestamp: String,
    project_name: &'a str,
    project_path: &'a str,
    index: usize,
    total: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    version: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    detection_source: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    matches: Option<&'a [MatchEntry]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a str>,
}

/// Append-only log file, one JSON object per line or one text block per
/// entry.
pub struct FileLogger {
    file: Mutex<File>,
    format: LogFormat,
}

impl FileLogger {
    pub fn open(path: &Path, format: LogFormat) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("cannot open log file {}", path.display()))?;
        Ok(Self {
            file: Mutex::new(file),
            format,
        })
    }

    fn append(&self, record: &LogRecord<'_>) {
        let rendered = match self.format {
            LogFormat::Json => match serde_json::to_string(record) {
                Ok(json) => format!("{}\n", json),
                Err(_) => return,
            },
            LogFormat::Text => {
                let mut block = format!(
                    "[{}] {} ({}/{})\n",
                    record.timestamp, record.project_path, record.index, record.total
                );
                if let Some(error) = record.error {
                    block.push_str(&format!("  error: {}\n", error));
                } else if let Some(version) = record.version {
                    block.push_str(&format!(
                        "  version: {} (from {})\n",
                        version,
                        record.detection_source.unwrap_or("?")
                    ));
                } else if let Some(matches) = record.matches {
                    if matches.is_empty() {
                        block.push_str("  no matches\n");
                    }
                    for entry in matches {
                        block.push_str(&format!(
                            "  {}:{}: {} [{}]\n",
                            entry.file_path,
                            entry.line_number,
                            entry.line_content.trim_end(),
                            entry.matched_text
                        ));
                    }
                } else {
                    block.push_str("  not detected\n");
                }
                block
            }
        };

        let mut file = self.file.lock().unwrap();
        let _ = file.write_all(rendered.as_bytes());
    }
}

impl ResultSink for FileLogger {
    fn version_result(&self, result: &ProjectVersionResult) {
        self.append(&LogRecord {
            timestamp: Utc::now().to_rfc3339(),
            project_name: &result.project_name,
            project_path: &result.project_path,
            index: result.index,
            total: result.total,
            version: result.version.as_deref(),
            detection_source: result.detection_source.as_deref(),
            matches: None,
            error: result.error.as_deref(),
        });
    }

    fn search_result(&self, result: &ProjectSearchResult) {
        self.append(&LogRecord {
            timestamp: Utc::now().to_rfc3339(),
            project_name: &result.project_name,
            project_path: &result.project_path,
            index: result.index,
            total: result.total,
            version: None,
            detection_source: None,
            matches: Some(&result.matches),
            error: result.error.as_deref(),
        });
    }
}

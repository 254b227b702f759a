use std::sync::Arc;

use crate::client::RepoClient;
use crate::matcher::{render_context, CompiledMatcher};
use crate::types::{MatchContext, Project, ProjectSearchResult};

/// Applies a compiled matcher to every candidate file of one project.
pub struct ContentScanner {
    matcher: Arc<CompiledMatcher>,
    context_lines: usize,
}

impl ContentScanner {
    pub fn new(matcher: Arc<CompiledMatcher>, context_lines: usize) -> Self {
        Self {
            matcher,
            context_lines,
        }
    }

    /// Scan one project. Matches come out in file-enumeration order, then
    /// line order within a file.
    ///
    /// A listing failure for the whole project sets `error` on the result;
    /// a fetch failure for a single file is absorbed as "no matches in
    /// that file".
    pub async fn scan_project(
        &self,
        client: &dyn RepoClient,
        project: &Project,
        index: usize,
        total: usize,
    ) -> ProjectSearchResult {
        let mut result = ProjectSearchResult::new(project, index, total);

        let files = match client.list_files(project).await {
            Ok(files) => files,
            Err(e) => {
                result.error = Some(e.to_string());
                return result;
            }
        };

        for path in files {
            // Filter on the path before spending a fetch on the file.
            if !self.matcher.matches_path(&path) {
                continue;
            }

            let content = match client.get_raw_file(project, &path).await {
                Ok(content) => content,
                Err(_) => continue,
            };

            let entries = self.matcher.scan_file(&path, &content);
            if entries.is_empty() {
                continue;
            }

            if self.context_lines > 0 {
                if let Ok(text) = std::str::from_utf8(&content) {
                    for entry in &entries {
                        result.contexts.push(MatchContext {
                            file_path: path.clone(),
                            line_number: entry.line_number,
                            lines: render_context(text, entry.line_number, self.context_lines),
                        });
                    }
                }
            }

            result.matches.extend(entries);
        }

        result
    }
}

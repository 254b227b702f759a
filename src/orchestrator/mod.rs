use std::sync::Arc;

use anyhow::Result;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;

use crate::client::RepoClient;
use crate::detector::VersionDetector;
use crate::output::ResultSink;
use crate::search::ContentScanner;
use crate::stats::{ContentScanStatistics, ScanCounts, ScanStatistics, SearchCounts};
use crate::types::{Project, ProjectSearchResult, ProjectVersionResult};

/// Drives detection or search across all projects with bounded
/// parallelism. One task per project, started up front; a semaphore of
/// width `concurrency` limits how many run at once. Results flow to the
/// statistics aggregate and to every sink as they complete, in arrival
/// order; each task is attempted exactly once.
pub struct Orchestrator {
    concurrency: usize,
    shutdown: watch::Receiver<bool>,
}

impl Orchestrator {
    pub fn new(concurrency: usize, shutdown: watch::Receiver<bool>) -> Self {
        Self {
            // Zero would deadlock on the first acquire.
            concurrency: concurrency.max(1),
            shutdown,
        }
    }

    pub async fn run_detect(
        &self,
        client: Arc<dyn RepoClient>,
        detector: Arc<VersionDetector>,
        projects: Vec<Project>,
        sinks: Vec<Arc<dyn ResultSink>>,
    ) -> Result<(ScanCounts, Vec<ProjectVersionResult>)> {
        let stats = Arc::new(ScanStatistics::new());
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let total = projects.len();
        let mut tasks = JoinSet::new();

        for (i, project) in projects.into_iter().enumerate() {
            let client = Arc::clone(&client);
            let detector = Arc::clone(&detector);
            let stats = Arc::clone(&stats);
            let sinks = sinks.clone();
            let semaphore = Arc::clone(&semaphore);
            let mut shutdown = self.shutdown.clone();
            let index = i + 1;

            tasks.spawn(async move {
                // Closed-semaphore errors cannot happen; the semaphore
                // outlives every task.
                let _permit = semaphore.acquire_owned().await.unwrap();

                let result = if *shutdown.borrow() {
                    cancelled_version_result(&project, index, total)
                } else {
                    tokio::select! {
                        result = detector.detect(client.as_ref(), &project, index, total) => result,
                        _ = shutdown.changed() => cancelled_version_result(&project, index, total),
                    }
                };

                stats.record(&result);
                for sink in &sinks {
                    sink.version_result(&result);
                }
                result
            });
        }

        let mut results = Vec::with_capacity(total);
        while let Some(joined) = tasks.join_next().await {
            results.push(joined?);
        }

        Ok((stats.snapshot(), results))
    }

    pub async fn run_search(
        &self,
        client: Arc<dyn RepoClient>,
        scanner: Arc<ContentScanner>,
        projects: Vec<Project>,
        sinks: Vec<Arc<dyn ResultSink>>,
    ) -> Result<(SearchCounts, Vec<ProjectSearchResult>)> {
        let stats = Arc::new(ContentScanStatistics::new());
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let total = projects.len();
        let mut tasks = JoinSet::new();

        for (i, project) in projects.into_iter().enumerate() {
            let client = Arc::clone(&client);
            let scanner = Arc::clone(&scanner);
            let stats = Arc::clone(&stats);
            let sinks = sinks.clone();
            let semaphore = Arc::clone(&semaphore);
            let mut shutdown = self.shutdown.clone();
            let index = i + 1;

            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await.unwrap();

                let result = if *shutdown.borrow() {
                    cancelled_search_result(&project, index, total)
                } else {
                    tokio::select! {
                        result = scanner.scan_project(client.as_ref(), &project, index, total) => result,
                        _ = shutdown.changed() => cancelled_search_result(&project, index, total),
                    }
                };

                stats.record(&result);
                for sink in &sinks {
                    sink.search_result(&result);
                }
                result
            });
        }

        let mut results = Vec::with_capacity(total);
        while let Some(joined) = tasks.join_next().await {
            results.push(joined?);
        }

        Ok((stats.snapshot(), results))
    }
}

fn cancelled_version_result(project: &Project, index: usize, total: usize) -> ProjectVersionResult {
    let mut result = ProjectVersionResult::new(project, index, total);
    result.error = Some("scan cancelled".to_string());
    result
}

fn cancelled_search_result(project: &Project, index: usize, total: usize) -> ProjectSearchResult {
    let mut result = ProjectSearchResult::new(project, index, total);
    result.error = Some("scan cancelled".to_string());
    result
}

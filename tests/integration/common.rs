//! Shared fixtures: a scripted data source, a flaky sink and a recording sleeper

use async_trait::async_trait;
use org_harvest::config::RunOptions;
use org_harvest::output::{CsvSink, RecordSink, SinkError, SinkResult};
use org_harvest::retry::Sleeper;
use org_harvest::source::{DataSource, PageInfo, RepositoryPage, RepositoryRecord, SourceError};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tempfile::TempDir;

/// Records requested sleeps instead of sleeping
#[derive(Default)]
pub struct RecordingSleeper {
    pub calls: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn calls(&self) -> Vec<Duration> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.calls.lock().unwrap().push(duration);
    }
}

/// Serves fixed pages per organization; pages can be made to fail
///
/// Page `n` of organization `org` ends with cursor `org-{n+1}`.
#[derive(Default)]
pub struct ScriptedSource {
    pages: HashMap<String, Vec<Vec<String>>>,
    /// (org, page index) -> remaining failures; `usize::MAX` fails forever
    failures: Mutex<HashMap<(String, usize), usize>>,
    pub requests: Mutex<Vec<(String, Option<String>)>>,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn org(mut self, org: &str, pages: &[&[&str]]) -> Self {
        let pages = pages
            .iter()
            .map(|page| page.iter().map(|name| name.to_string()).collect())
            .collect();
        self.pages.insert(org.to_string(), pages);
        self
    }

    pub fn fail_page(self, org: &str, page: usize, times: usize) -> Self {
        self.failures
            .lock()
            .unwrap()
            .insert((org.to_string(), page), times);
        self
    }

    pub fn always_fail(self, org: &str) -> Self {
        self.fail_page(org, 0, usize::MAX)
    }

    pub fn requests_for(&self, org: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|(o, _)| o == org)
            .count()
    }
}

pub fn record(org: &str, name: &str) -> RepositoryRecord {
    RepositoryRecord {
        owner: org.to_string(),
        name: name.to_string(),
        name_with_owner: format!("{}/{}", org, name),
        stars: name.len() as u64,
        ..RepositoryRecord::default()
    }
}

#[async_trait]
impl DataSource for ScriptedSource {
    async fn fetch_collection_page(
        &self,
        collection: &str,
        _page_size: u32,
        cursor: Option<&str>,
    ) -> Result<RepositoryPage, SourceError> {
        self.requests
            .lock()
            .unwrap()
            .push((collection.to_string(), cursor.map(str::to_string)));

        let pages = self
            .pages
            .get(collection)
            .ok_or_else(|| SourceError::NotFound(format!("organization {}", collection)))?;
        let index = match cursor {
            None => 0,
            Some(cursor) => cursor
                .rsplit('-')
                .next()
                .and_then(|n| n.parse::<usize>().ok())
                .ok_or_else(|| SourceError::Malformed(format!("cursor {}", cursor)))?,
        };

        {
            let mut failures = self.failures.lock().unwrap();
            if let Some(remaining) = failures.get_mut(&(collection.to_string(), index)) {
                if *remaining > 0 {
                    if *remaining != usize::MAX {
                        *remaining -= 1;
                    }
                    return Err(SourceError::Status {
                        status: 503,
                        body: "service unavailable".to_string(),
                    });
                }
            }
        }

        let names = pages.get(index).cloned().unwrap_or_default();
        Ok(RepositoryPage {
            items: names.iter().map(|name| record(collection, name)).collect(),
            page_info: PageInfo {
                end_cursor: Some(format!("{}-{}", collection, index + 1)),
                has_next_page: index + 1 < pages.len(),
            },
        })
    }

    async fn fetch_single_entity(&self, owner: &str, name: &str) -> Result<RepositoryRecord, SourceError> {
        Ok(record(owner, name))
    }
}

/// CSV sink whose `fail_on`-th append (1-based) fails once
pub struct FlakySink {
    inner: CsvSink,
    appends: AtomicUsize,
    fail_on: usize,
}

impl FlakySink {
    pub fn failing_on(fail_on: usize) -> Self {
        Self {
            inner: CsvSink::new(),
            appends: AtomicUsize::new(0),
            fail_on,
        }
    }
}

impl RecordSink for FlakySink {
    fn ensure_output_initialized(&self, path: &Path, header: &[&str]) -> SinkResult<()> {
        self.inner.ensure_output_initialized(path, header)
    }

    fn append_record(&self, path: &Path, values: &[String]) -> SinkResult<()> {
        let n = self.appends.fetch_add(1, Ordering::SeqCst) + 1;
        if n == self.fail_on {
            return Err(SinkError::Io {
                path: path.to_path_buf(),
                source: std::io::Error::new(std::io::ErrorKind::Other, "disk hiccup"),
            });
        }
        self.inner.append_record(path, values)
    }
}

/// CSV sink that replaces the state directory with a plain file when the
/// output of `org` is prepared, so every later state write fails
pub struct StateBreakingSink {
    inner: CsvSink,
    prefix: String,
    state_dir: PathBuf,
}

impl StateBreakingSink {
    pub fn new(org: &str, state_dir: &Path) -> Self {
        Self {
            inner: CsvSink::new(),
            prefix: format!("{}-", org),
            state_dir: state_dir.to_path_buf(),
        }
    }
}

impl RecordSink for StateBreakingSink {
    fn ensure_output_initialized(&self, path: &Path, header: &[&str]) -> SinkResult<()> {
        let hit = path
            .file_name()
            .is_some_and(|name| name.to_string_lossy().starts_with(&self.prefix));
        if hit && self.state_dir.is_dir() {
            std::fs::remove_dir_all(&self.state_dir).unwrap();
            std::fs::write(&self.state_dir, "not a directory").unwrap();
        }
        self.inner.ensure_output_initialized(path, header)
    }

    fn append_record(&self, path: &Path, values: &[String]) -> SinkResult<()> {
        self.inner.append_record(path, values)
    }
}

/// Options writing into a temporary directory with fast retries
pub fn options(dir: &TempDir, collections: &[&str]) -> RunOptions {
    let mut options = RunOptions {
        collections: collections.iter().map(|c| c.to_string()).collect(),
        output_dir: dir.path().join("out"),
        state_dir: dir.path().join("state"),
        delay_between_collections: Duration::from_secs(7),
        ..RunOptions::default()
    };
    options.retry.max_attempts = 2;
    options.retry.initial_delay_ms = 100;
    options
}

/// Repository names (`owner/name`) of every data row in a CSV file
pub fn csv_repositories(path: &Path) -> Vec<String> {
    std::fs::read_to_string(path)
        .unwrap()
        .lines()
        .skip(1)
        .map(|line| line.split(',').nth(2).unwrap().to_string())
        .collect()
}

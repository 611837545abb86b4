//! Fingerprint-keyed index of recorded responses used for replay.
//!
//! Each record is indexed under exactly one of three key variants, chosen by
//! the tri-state of its stored query:
//!
//! - query absent: the any-query key (`*` in the query slot)
//! - query empty: the empty-query key (empty query slot)
//! - query present: the exact-query key (canonical encoding in the query slot)
//!
//! Live matching tries the exact-query key built from the request's real
//! query string first and falls back to the any-query key.

use super::query::{encode_map, encode_values, parse_query};
use super::types::{Record, StubFile};
use crate::config::Targets;
use crate::error::{GatewayError, Result};
use hyper::Request;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Query slot value meaning "match regardless of query string".
pub const ANY_QUERY: &str = "*";

/// Build an opaque fingerprint key. `#` cannot appear unescaped in a request path.
pub fn fingerprint(host: &str, method: &str, path: &str, query: &str) -> String {
    format!("#{host}#{}#{path}#{query}#", method.to_uppercase())
}

/// Recorded responses for one key, replayed in order.
struct Sequence {
    records: Vec<Arc<Record>>,
    /// Matches served so far in this replay session.
    hits: AtomicUsize,
}

impl Sequence {
    /// Record at `min(hits, len - 1)`; once exhausted the last record keeps answering.
    fn next(&self) -> Arc<Record> {
        let hit = self.hits.fetch_add(1, Ordering::SeqCst);
        let index = hit.min(self.records.len() - 1);
        Arc::clone(&self.records[index])
    }
}

/// Replay index of one profile.
#[derive(Default)]
pub struct Matcher {
    sequences: HashMap<String, Sequence>,
}

impl Matcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct keys.
    pub fn len(&self) -> usize {
        self.sequences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequences.is_empty()
    }

    /// Index `record` under the key variant selected by its query state.
    ///
    /// Records stored without a host are attributed to the target their path routes to.
    pub fn add(&mut self, record: Record, targets: &Targets) -> Result<()> {
        let request = &record.request;
        let host = match request.host.as_deref() {
            Some(host) => host.to_string(),
            None => targets.select(&request.pathname).host().to_string(),
        };

        let query = match &request.query {
            None => ANY_QUERY.to_string(),
            Some(query) if query.is_empty() => String::new(),
            Some(query) => encode_map(query)?,
        };

        let key = fingerprint(&host, &request.method, &request.pathname, &query);
        self.sequences
            .entry(key)
            .or_insert_with(|| Sequence {
                records: Vec::new(),
                hits: AtomicUsize::new(0),
            })
            .records
            .push(Arc::new(record));
        Ok(())
    }

    /// Index every record of a stub file, collecting per-record failures.
    pub fn add_file(&mut self, file: StubFile, profile: &str, targets: &Targets) -> Result<()> {
        let mut causes = Vec::new();

        for mut record in file.records {
            record.profile = profile.to_string();
            if let Err(e) = self.add(record, targets) {
                causes.push(e.to_string());
            }
        }

        if causes.is_empty() {
            Ok(())
        } else {
            Err(GatewayError::ProfileLoad {
                profile: profile.to_string(),
                causes,
            })
        }
    }

    /// Build a fresh index from every stub file in `dir`, processed in file-name order.
    ///
    /// Any unreadable or malformed file fails the whole load; all causes are reported.
    pub fn load_profile(dir: &Path, profile: &str, targets: &Targets) -> Result<Self> {
        let load_error = |causes: Vec<String>| GatewayError::ProfileLoad {
            profile: profile.to_string(),
            causes,
        };

        let entries = fs::read_dir(dir).map_err(|e| {
            load_error(vec![format!(
                "failed to read directory {}: {e}",
                dir.display()
            )])
        })?;

        let mut causes = Vec::new();
        let paths = stub_file_paths(dir, entries.map(|entry| entry.map(|e| e.path())), &mut causes);
        let mut matcher = Matcher::new();

        for path in paths {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();

            let contents = match fs::read(&path) {
                Ok(contents) => contents,
                Err(e) => {
                    causes.push(format!("failed to read profile {name} : {e}"));
                    continue;
                }
            };

            let file: StubFile = match serde_json::from_slice(&contents) {
                Ok(file) => file,
                Err(e) => {
                    causes.push(format!("failed unmarshal stub file {name} : {e}"));
                    continue;
                }
            };

            if let Err(e) = matcher.add_file(file, profile, targets) {
                causes.push(format!("failed add file to matcher {name} : {e}"));
            }
        }

        if !causes.is_empty() {
            return Err(load_error(causes));
        }

        debug!(profile, stub.keys = matcher.len(), "profileLoaded");
        Ok(matcher)
    }

    /// Look up the next record for a live request: exact query first, then any query.
    pub fn lookup(
        &self,
        host: &str,
        method: &str,
        path: &str,
        raw_query: Option<&str>,
    ) -> Option<Arc<Record>> {
        let exact = encode_values(&parse_query(raw_query));
        self.next_for(&fingerprint(host, method, path, &exact))
            .or_else(|| self.next_for(&fingerprint(host, method, path, ANY_QUERY)))
    }

    /// [`Matcher::lookup`] for a request that has not been rewritten yet.
    pub fn match_request<B>(&self, req: &Request<B>, targets: &Targets) -> Option<Arc<Record>> {
        let path = req.uri().path();
        let host = targets.select(path).host();
        self.lookup(host, req.method().as_str(), path, req.uri().query())
    }

    fn next_for(&self, key: &str) -> Option<Arc<Record>> {
        self.sequences.get(key).map(Sequence::next)
    }
}

/// Regular files among `entries`, sorted by name. Entries that cannot be read are added to `causes`.
fn stub_file_paths<I>(dir: &Path, entries: I, causes: &mut Vec<String>) -> Vec<PathBuf>
where
    I: IntoIterator<Item = std::io::Result<PathBuf>>,
{
    let mut paths = Vec::new();
    for entry in entries {
        match entry {
            Ok(path) if path.is_file() => paths.push(path),
            Ok(_) => {}
            Err(e) => causes.push(format!("failed to read directory {}: {e}", dir.display())),
        }
    }
    paths.sort();
    paths
}

//! Fakes shared by the enrichment tests.

use std::cell::RefCell;
use std::collections::{HashSet, VecDeque};
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread::JoinHandle;

use serde_json::Map;

use super::error::EnrichmentError;
use crate::db::DatabaseError;
use super::traits::*;
use super::types::*;

/// HTTP server that answers exactly one request with a canned response.
pub struct OneShotServer {
    pub url: String,
    handle: JoinHandle<String>,
}

impl OneShotServer {
    pub fn start(status_line: &'static str, body: &'static str) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let request = read_request(&mut stream);
            let response = format!(
                "HTTP/1.1 {status_line}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            stream.write_all(response.as_bytes()).unwrap();
            stream.flush().unwrap();
            request
        });
        Self {
            url: format!("http://{addr}/predict"),
            handle,
        }
    }

    /// Wait for the server thread and return the raw request it received.
    pub fn request(self) -> String {
        self.handle.join().unwrap()
    }
}

fn read_request(stream: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = stream.read(&mut chunk).unwrap();
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            let head = String::from_utf8_lossy(&buf[..end]).to_string();
            let content_length = head
                .lines()
                .filter_map(|line| line.split_once(':'))
                .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
                .and_then(|(_, value)| value.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if buf.len() >= end + 4 + content_length {
                break;
            }
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

pub fn record(title: &str, th: i64, dh: i64) -> Record {
    Record {
        title: title.to_string(),
        description: format!("{title} description"),
        title_hash: th,
        description_hash: dh,
        date: chrono::NaiveDate::from_ymd_opt(2024, 5, 17)
            .unwrap()
            .and_hms_micro_opt(9, 30, 15, 250)
            .unwrap(),
        processed_flag: false,
        extra: Map::new(),
    }
}

/// In-memory input table. Fetch returns the first `limit` unprocessed records.
#[derive(Default)]
pub struct FakeSource {
    pub records: RefCell<Vec<Record>>,
    pub fetch_calls: RefCell<u32>,
    pub marked: RefCell<Vec<HashPair>>,
    /// When set, `count_unprocessed` returns these values in order (last one repeats).
    pub scripted_counts: RefCell<VecDeque<u64>>,
    pub count_calls: RefCell<u32>,
    /// Every count after the first one fails.
    pub fail_recount: bool,
    pub fail_fetch: bool,
}

fn store_failure() -> EnrichmentError {
    EnrichmentError::Database(DatabaseError::Sqlite(rusqlite::Error::InvalidQuery))
}

impl FakeSource {
    pub fn with_records(records: Vec<Record>) -> Self {
        Self {
            records: RefCell::new(records),
            ..Self::default()
        }
    }

    pub fn with_counts(mut self, counts: &[u64]) -> Self {
        self.scripted_counts = RefCell::new(counts.iter().copied().collect());
        self
    }

    pub fn is_processed(&self, pair: HashPair) -> bool {
        self.records
            .borrow()
            .iter()
            .filter(|r| r.hash_pair() == pair)
            .all(|r| r.processed_flag)
    }
}

impl SourceStore for FakeSource {
    fn count_unprocessed(&self) -> Result<u64, EnrichmentError> {
        *self.count_calls.borrow_mut() += 1;
        if self.fail_recount && *self.count_calls.borrow() > 1 {
            return Err(store_failure());
        }
        let mut scripted = self.scripted_counts.borrow_mut();
        if let Some(next) = scripted.front().copied() {
            if scripted.len() > 1 {
                scripted.pop_front();
            }
            return Ok(next);
        }
        Ok(self.records.borrow().iter().filter(|r| !r.processed_flag).count() as u64)
    }

    fn fetch_unprocessed(&self, limit: u32) -> Result<Vec<Record>, EnrichmentError> {
        *self.fetch_calls.borrow_mut() += 1;
        if self.fail_fetch {
            return Err(store_failure());
        }
        Ok(self
            .records
            .borrow()
            .iter()
            .filter(|r| !r.processed_flag)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    fn mark_processed(&self, pairs: &[HashPair]) -> Result<Vec<MarkFailure>, EnrichmentError> {
        for record in self.records.borrow_mut().iter_mut() {
            if pairs.contains(&record.hash_pair()) {
                record.processed_flag = true;
            }
        }
        self.marked.borrow_mut().extend_from_slice(pairs);
        Ok(vec![])
    }
}

/// In-memory output table. Rows whose title is listed in `reject_titles` fail;
/// `fail_insert` fails the whole call.
#[derive(Default)]
pub struct FakeOutput {
    pub existing: HashSet<HashPair>,
    pub rows: RefCell<Vec<EnrichedRow>>,
    pub reject_titles: Vec<String>,
    pub fail_insert: bool,
}

impl OutputStore for FakeOutput {
    fn distinct_hash_pairs(&self) -> Result<HashSet<HashPair>, EnrichmentError> {
        let mut pairs = self.existing.clone();
        pairs.extend(self.rows.borrow().iter().map(EnrichedRow::hash_pair));
        Ok(pairs)
    }

    fn insert_rows(&self, rows: &[EnrichedRow]) -> Result<Vec<InsertFailure>, EnrichmentError> {
        if self.fail_insert {
            return Err(store_failure());
        }
        let mut failures = Vec::new();
        for (index, row) in rows.iter().enumerate() {
            if self.reject_titles.contains(&row.title) {
                failures.push(InsertFailure {
                    index,
                    error: "no such field: bogus".into(),
                });
            } else {
                self.rows.borrow_mut().push(row.clone());
            }
        }
        Ok(failures)
    }
}

/// Tags every text's first word as a person, or fails with a fixed status.
/// `drop_last` answers with one prediction fewer than the texts sent.
#[derive(Default)]
pub struct FakeNer {
    pub batches: RefCell<Vec<Vec<String>>>,
    pub fail_status: Option<u16>,
    pub drop_last: bool,
}

impl FakeNer {
    pub fn failing(status: u16) -> Self {
        Self {
            fail_status: Some(status),
            ..Self::default()
        }
    }

    pub fn call_count(&self) -> usize {
        self.batches.borrow().len()
    }
}

impl NerClient for FakeNer {
    fn predict(&self, text: &str) -> Result<Vec<TaggedToken>, EnrichmentError> {
        Ok(self.predict_batch(&[text.to_string()])?.remove(0))
    }

    fn predict_batch(&self, texts: &[String]) -> Result<Vec<Vec<TaggedToken>>, EnrichmentError> {
        self.batches.borrow_mut().push(texts.to_vec());
        if let Some(status) = self.fail_status {
            return Err(super::ner_client::status_error(status, "fake failure".into()));
        }
        let mut predictions: Vec<Vec<TaggedToken>> = texts
            .iter()
            .map(|text| {
                text.split_whitespace()
                    .enumerate()
                    .map(|(i, word)| TaggedToken::new(word, if i == 0 { "B-per" } else { "O" }))
                    .collect()
            })
            .collect();
        if self.drop_last {
            predictions.pop();
        }
        Ok(predictions)
    }
}

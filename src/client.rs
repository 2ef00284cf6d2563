//! Record sources.
//!
//! A [`FlowClient`] executes an [`ObserveRequest`] and hands every selected
//! record to a [`RecordSink`]. [`ReaderClient`] serves requests from a
//! JSON-lines file or stdin.

use crate::error::{ObserveError, Result};
use crate::filter::FilterSet;
use crate::record::{EventKind, Record};
use crate::selector::{Direction, Mode, QueryDescriptor};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use tokio::fs::File;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};

/// Receives selected records in order.
pub trait RecordSink: Send {
    fn accept(&mut self, record: &Record) -> Result<()>;

    /// Called after a batch of records and when the source is done.
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

impl RecordSink for Vec<Record> {
    fn accept(&mut self, record: &Record) -> Result<()> {
        self.push(record.clone());
        Ok(())
    }
}

/// Everything a source needs to answer one invocation.
#[derive(Debug, Clone)]
pub struct ObserveRequest {
    pub kind: EventKind,
    pub query: QueryDescriptor,
    pub filters: FilterSet,
}

#[async_trait]
pub trait FlowClient: Send {
    async fn observe(&mut self, request: &ObserveRequest, sink: &mut dyn RecordSink) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputSource {
    Stdin,
    File(PathBuf),
}

impl From<&str> for InputSource {
    fn from(value: &str) -> Self {
        if value == "-" {
            InputSource::Stdin
        } else {
            InputSource::File(PathBuf::from(value))
        }
    }
}

impl fmt::Display for InputSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputSource::Stdin => write!(f, "stdin"),
            InputSource::File(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Reads records from a JSON-lines file or stdin.
///
/// A file's buffered records are the lines present when it is opened; in
/// follow mode the file is then polled for appended lines. Stdin keeps no
/// buffer, so with follow every record read from it is live.
pub struct ReaderClient {
    source: InputSource,
    silent_errors: bool,
    poll_interval: Duration,
}

impl ReaderClient {
    pub fn new(source: InputSource, silent_errors: bool) -> Self {
        Self {
            source,
            silent_errors,
            poll_interval: Duration::from_millis(250),
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    fn decode(&self, line: &str, line_no: u64, request: &ObserveRequest) -> Option<Record> {
        if line.trim().is_empty() {
            return None;
        }

        let record: Record = match serde_json::from_str(line) {
            Ok(record) => record,
            Err(e) => {
                if !self.silent_errors {
                    let err = ObserveError::InvalidRecord {
                        line: line_no,
                        reason: e.to_string(),
                    };
                    warn!("Skipping record from {}: {}", self.source, err);
                }
                return None;
            }
        };

        if record.kind() != Some(request.kind) {
            debug!("Skipping line {}: not one of the {}", line_no, request.kind);
            return None;
        }

        if request.query.in_range(&record.time) && request.filters.allows(&record) {
            Some(record)
        } else {
            None
        }
    }

    async fn drain<R>(
        &self,
        mut reader: R,
        live_only: bool,
        request: &ObserveRequest,
        sink: &mut dyn RecordSink,
    ) -> Result<()>
    where
        R: AsyncBufRead + Unpin + Send,
    {
        let query = &request.query;
        let mut pending = Vec::new();
        let mut line_no = 0u64;
        let mut emitted = 0u64;

        let first_limit = match query.mode {
            Mode::Bounded {
                count,
                direction: Direction::First,
            } => Some(count),
            _ => None,
        };

        let skip_buffer = query.follow && (live_only || query.mode == Mode::Unbounded);
        if !skip_buffer {
            let mut tail: VecDeque<Record> = VecDeque::new();
            loop {
                let line = match next_line(&mut reader, &mut pending).await? {
                    Some(line) => line,
                    // an unterminated last line is still being written
                    None if query.is_long_lived() => break,
                    None => match take_rest(&mut pending) {
                        Some(line) => line,
                        None => break,
                    },
                };
                line_no += 1;
                let Some(record) = self.decode(&line, line_no, request) else {
                    continue;
                };
                match query.mode {
                    Mode::Bounded {
                        count,
                        direction: Direction::Last,
                    } => {
                        tail.push_back(record);
                        if tail.len() as u64 > count {
                            tail.pop_front();
                        }
                    }
                    _ => {
                        sink.accept(&record)?;
                        emitted += 1;
                        if first_limit.map_or(false, |limit| emitted >= limit) {
                            return sink.flush();
                        }
                    }
                }
            }
            for record in tail.drain(..) {
                sink.accept(&record)?;
                emitted += 1;
            }
            debug!("Read {} buffered lines, emitted {} records", line_no, emitted);
        } else if !live_only {
            while next_line(&mut reader, &mut pending).await?.is_some() {
                line_no += 1;
            }
            debug!("Skipped {} buffered lines", line_no);
        }
        sink.flush()?;

        if !query.is_long_lived() {
            return Ok(());
        }

        info!("Following {} for new records", self.source);
        loop {
            let line = match next_line(&mut reader, &mut pending).await? {
                Some(line) => line,
                None if live_only => match take_rest(&mut pending) {
                    Some(line) => line,
                    None => {
                        debug!("{} closed after {} lines", self.source, line_no);
                        return Ok(());
                    }
                },
                None => {
                    tokio::time::sleep(self.poll_interval).await;
                    continue;
                }
            };
            line_no += 1;
            let Some(record) = self.decode(&line, line_no, request) else {
                continue;
            };
            sink.accept(&record)?;
            sink.flush()?;
            emitted += 1;
            if first_limit.map_or(false, |limit| emitted >= limit) {
                return Ok(());
            }
        }
    }
}

/// Next newline-terminated line. Text after the last newline stays in
/// `pending` until a later read completes it.
async fn next_line<R>(reader: &mut R, pending: &mut Vec<u8>) -> Result<Option<String>>
where
    R: AsyncBufRead + Unpin + Send,
{
    reader.read_until(b'\n', pending).await?;
    if pending.last() != Some(&b'\n') {
        return Ok(None);
    }
    Ok(take_rest(pending))
}

/// Drains `pending` as one line, if it holds anything.
fn take_rest(pending: &mut Vec<u8>) -> Option<String> {
    if pending.is_empty() {
        return None;
    }
    let bytes = std::mem::take(pending);
    let line = String::from_utf8_lossy(&bytes);
    Some(line.trim_end_matches(|c| c == '\n' || c == '\r').to_string())
}

#[async_trait]
impl FlowClient for ReaderClient {
    async fn observe(&mut self, request: &ObserveRequest, sink: &mut dyn RecordSink) -> Result<()> {
        debug!(kind = %request.kind, source = %self.source, "Observing");
        match &self.source {
            InputSource::Stdin => {
                let reader = BufReader::new(tokio::io::stdin());
                self.drain(reader, true, request, sink).await
            }
            InputSource::File(path) => {
                let file = File::open(path).await?;
                self.drain(BufReader::new(file), false, request, sink).await
            }
        }
    }
}

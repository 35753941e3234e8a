//! In-memory stand-ins for the HTTP, broker and index capabilities.

use crate::broker::{AckHandle, Acknowledge, BrokerError, Message, Publish, Subscription};
use crate::fetch::HttpClient;
use crate::geo::{GeoIndex, Geometry, IndexError, SetOptions};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{HashMap, HashSet, VecDeque};
use std::io;
use std::sync::{Arc, Mutex};
use tracing_subscriber::fmt::MakeWriter;

/// Ordered record of side effects shared between fakes.
#[derive(Debug, Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<String>>>);

impl EventLog {
    pub fn push(&self, event: String) {
        self.0.lock().unwrap().push(event);
    }

    pub fn events(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

/// Formatted log output of the current thread, captured while the guard
/// returned by [`CapturedLogs::install`] is alive.
#[derive(Clone, Default)]
pub struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    pub fn install(&self) -> tracing::subscriber::DefaultGuard {
        let subscriber = tracing_subscriber::fmt()
            .with_writer(self.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::DEBUG)
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    fn lines(&self) -> Vec<String> {
        String::from_utf8_lossy(&self.0.lock().unwrap())
            .lines()
            .map(str::to_string)
            .collect()
    }

    pub fn warnings(&self) -> usize {
        self.lines().iter().filter(|line| line.contains(" WARN ")).count()
    }

    pub fn count(&self, needle: &str) -> usize {
        self.lines().iter().filter(|line| line.contains(needle)).count()
    }
}

impl io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for CapturedLogs {
    type Writer = CapturedLogs;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Answers requests from a script of `(status, body)` pairs, then with 500s.
#[derive(Clone)]
pub struct ScriptedHttpClient {
    responses: Arc<Mutex<VecDeque<(u16, &'static str)>>>,
    requests: Arc<Mutex<Vec<String>>>,
}

impl ScriptedHttpClient {
    pub fn new(responses: Vec<(u16, &'static str)>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses.into())),
            requests: Arc::default(),
        }
    }

    /// URLs of every request seen so far.
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl HttpClient for ScriptedHttpClient {
    async fn execute(&self, req: reqwest::Request) -> reqwest::Result<reqwest::Response> {
        self.requests.lock().unwrap().push(req.url().to_string());
        let (status, body) = self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or((500, "script exhausted"));
        let response = http::Response::builder()
            .status(status)
            .body(body)
            .unwrap();
        Ok(reqwest::Response::from(response))
    }
}

pub struct RecordingPublisher {
    destination: String,
    published: Arc<Mutex<Vec<Vec<u8>>>>,
    failure: Option<BrokerError>,
}

impl RecordingPublisher {
    pub fn new(destination: &str) -> Self {
        Self {
            destination: destination.to_string(),
            published: Arc::default(),
            failure: None,
        }
    }

    pub fn failing(destination: &str, failure: BrokerError) -> Self {
        Self {
            failure: Some(failure),
            ..Self::new(destination)
        }
    }

    pub fn published(&self) -> Arc<Mutex<Vec<Vec<u8>>>> {
        self.published.clone()
    }
}

#[async_trait]
impl Publish for RecordingPublisher {
    async fn publish(&self, body: &[u8]) -> Result<(), BrokerError> {
        if let Some(failure) = &self.failure {
            return Err(failure.clone());
        }
        self.published.lock().unwrap().push(body.to_vec());
        Ok(())
    }

    fn destination(&self) -> &str {
        &self.destination
    }
}

enum Scripted {
    Message { tag: String, body: Vec<u8>, ack_fails: bool },
    Error(BrokerError),
}

/// Yields a fixed script of messages and errors, then ends.
pub struct ScriptedSubscription {
    log: EventLog,
    script: VecDeque<Scripted>,
}

impl ScriptedSubscription {
    pub fn new(log: EventLog) -> Self {
        Self {
            log,
            script: VecDeque::new(),
        }
    }

    pub fn message(mut self, tag: &str, body: &[u8]) -> Self {
        self.script.push_back(Scripted::Message {
            tag: tag.to_string(),
            body: body.to_vec(),
            ack_fails: false,
        });
        self
    }

    /// A message whose acknowledgement is rejected by the broker.
    pub fn failing_message(mut self, tag: &str, body: &[u8]) -> Self {
        self.script.push_back(Scripted::Message {
            tag: tag.to_string(),
            body: body.to_vec(),
            ack_fails: true,
        });
        self
    }

    pub fn error(mut self, err: BrokerError) -> Self {
        self.script.push_back(Scripted::Error(err));
        self
    }
}

#[async_trait]
impl Subscription for ScriptedSubscription {
    async fn next_message(&mut self) -> Option<Result<Message, BrokerError>> {
        match self.script.pop_front()? {
            Scripted::Message { tag, body, ack_fails } => Some(Ok(Message {
                body: Bytes::from(body),
                ack: AckHandle::new(ScriptedAck {
                    tag,
                    log: self.log.clone(),
                    fails: ack_fails,
                }),
            })),
            Scripted::Error(err) => Some(Err(err)),
        }
    }
}

struct ScriptedAck {
    tag: String,
    log: EventLog,
    fails: bool,
}

#[async_trait]
impl Acknowledge for ScriptedAck {
    async fn ack(self: Box<Self>) -> Result<(), BrokerError> {
        if self.fails {
            self.log.push(format!("ack-failed {}", self.tag));
            return Err(BrokerError::ChannelClosed);
        }
        self.log.push(format!("ack {}", self.tag));
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    pub geometry: Geometry,
    pub options: SetOptions,
}

/// Map-backed index with the same overwrite semantics as the real one.
#[derive(Default)]
pub struct MemoryIndex {
    entries: HashMap<(String, String), IndexEntry>,
    failing_keys: HashSet<String>,
    log: Option<EventLog>,
}

impl MemoryIndex {
    pub fn with_log(log: EventLog) -> Self {
        Self {
            log: Some(log),
            ..Self::default()
        }
    }

    /// Makes every upsert of `key` fail.
    pub fn fail_on(&mut self, key: &str) {
        self.failing_keys.insert(key.to_string());
    }

    pub fn get(&self, collection: &str, key: &str) -> Option<&IndexEntry> {
        self.entries.get(&(collection.to_string(), key.to_string()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn record(&self, event: String) {
        if let Some(log) = &self.log {
            log.push(event);
        }
    }
}

#[async_trait]
impl GeoIndex for MemoryIndex {
    async fn upsert(
        &mut self,
        collection: &str,
        key: &str,
        geometry: &Geometry,
        options: SetOptions,
    ) -> Result<(), IndexError> {
        if self.failing_keys.contains(key) {
            self.record(format!("upsert-failed {collection}/{key}"));
            return Err(IndexError::Command(format!("refused {key}")));
        }
        self.record(format!("upsert {collection}/{key}"));
        self.entries.insert(
            (collection.to_string(), key.to_string()),
            IndexEntry {
                geometry: geometry.clone(),
                options,
            },
        );
        Ok(())
    }
}

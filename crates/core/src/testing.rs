//! In-memory fakes for the core ports
//!
//! Used by this crate's tests and available to downstream crates that want
//! to exercise the façade or the fetch service without SQLite or a network.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tiercache_domain::{
    is_expired, CacheError, HttpRequest, HttpResponse, NetworkError, Partition, Result,
    StoredEntry,
};

use crate::ports::{ConnectivityProbe, HttpTransport, KeyValueStore};

/// `KeyValueStore` backed by a `HashMap`, with call counters and switchable
/// failures.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    rows: Mutex<HashMap<(Partition, String), StoredEntry>>,
    fail_open: AtomicBool,
    fail_puts: AtomicBool,
    fail_gets: AtomicBool,
    open_calls: AtomicUsize,
    put_calls: AtomicUsize,
    get_calls: AtomicUsize,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `open` fail while set.
    pub fn fail_open(&self, fail: bool) {
        self.fail_open.store(fail, Ordering::SeqCst);
    }

    /// Makes `put` fail while set.
    pub fn fail_puts(&self, fail: bool) {
        self.fail_puts.store(fail, Ordering::SeqCst);
    }

    /// Makes `get` fail while set.
    pub fn fail_gets(&self, fail: bool) {
        self.fail_gets.store(fail, Ordering::SeqCst);
    }

    pub fn open_calls(&self) -> usize {
        self.open_calls.load(Ordering::SeqCst)
    }

    pub fn put_calls(&self) -> usize {
        self.put_calls.load(Ordering::SeqCst)
    }

    pub fn get_calls(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }

    /// Rows across all partitions.
    pub fn len(&self) -> usize {
        self.rows.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.lock().is_empty()
    }

    /// Writes a row directly, bypassing counters.
    pub fn seed(&self, entry: StoredEntry) {
        self.rows.lock().insert((entry.partition, entry.key.clone()), entry);
    }

    pub fn peek(&self, partition: Partition, key: &str) -> Option<StoredEntry> {
        self.rows.lock().get(&(partition, key.to_string())).cloned()
    }
}

#[async_trait]
impl KeyValueStore for InMemoryStore {
    async fn open(&self) -> Result<()> {
        self.open_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_open.load(Ordering::SeqCst) {
            return Err(CacheError::persistence("storage disabled"));
        }
        Ok(())
    }

    async fn put(&self, entry: StoredEntry) -> Result<()> {
        self.put_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(CacheError::persistence("quota exceeded"));
        }
        self.seed(entry);
        Ok(())
    }

    async fn get(&self, partition: Partition, key: &str) -> Result<Option<StoredEntry>> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_gets.load(Ordering::SeqCst) {
            return Err(CacheError::persistence("read failed"));
        }
        Ok(self.peek(partition, key))
    }

    async fn delete(&self, partition: Partition, key: &str) -> Result<bool> {
        Ok(self.rows.lock().remove(&(partition, key.to_string())).is_some())
    }

    async fn delete_expired(
        &self,
        partition: Partition,
        now_ms: i64,
        version: u32,
    ) -> Result<usize> {
        let mut rows = self.rows.lock();
        let before = rows.len();
        rows.retain(|(p, _), entry| {
            *p != partition || (entry.version == version && !is_expired(entry, now_ms))
        });
        Ok(before - rows.len())
    }

    async fn entries(&self, partition: Partition) -> Result<Vec<StoredEntry>> {
        let rows = self.rows.lock();
        let mut entries: Vec<StoredEntry> =
            rows.values().filter(|entry| entry.partition == partition).cloned().collect();
        entries.sort_by_key(|entry| entry.stored_at_ms);
        Ok(entries)
    }

    async fn count(&self, partition: Partition) -> Result<usize> {
        Ok(self.rows.lock().keys().filter(|(p, _)| *p == partition).count())
    }

    async fn clear(&self, partition: Partition) -> Result<usize> {
        let mut rows = self.rows.lock();
        let before = rows.len();
        rows.retain(|(p, _), _| *p != partition);
        Ok(before - rows.len())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

type Outcome = std::result::Result<HttpResponse, NetworkError>;

/// `HttpTransport` that replays scripted outcomes.
///
/// Outcomes queued for a specific URL are used first, then the shared queue,
/// then the fallback (a connection error unless replaced).
#[derive(Debug)]
pub struct ScriptedTransport {
    by_url: Mutex<HashMap<String, VecDeque<Outcome>>>,
    queue: Mutex<VecDeque<Outcome>>,
    fallback: Mutex<Outcome>,
    delay: Mutex<Option<Duration>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl Default for ScriptedTransport {
    fn default() -> Self {
        Self {
            by_url: Mutex::new(HashMap::new()),
            queue: Mutex::new(VecDeque::new()),
            fallback: Mutex::new(Err(NetworkError::Connection("no scripted response".into()))),
            delay: Mutex::new(None),
            requests: Mutex::new(Vec::new()),
        }
    }
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every unscripted call returns `outcome`.
    pub fn always(outcome: Outcome) -> Self {
        let transport = Self::default();
        *transport.fallback.lock() = outcome;
        transport
    }

    /// Queues an outcome for the next call to any URL.
    pub fn push(&self, outcome: Outcome) -> &Self {
        self.queue.lock().push_back(outcome);
        self
    }

    /// Queues an outcome for the next call to `url`.
    pub fn push_for(&self, url: &str, outcome: Outcome) -> &Self {
        self.by_url.lock().entry(url.to_string()).or_default().push_back(outcome);
        self
    }

    pub fn set_fallback(&self, outcome: Outcome) {
        *self.fallback.lock() = outcome;
    }

    /// Each call sleeps for `delay` before answering.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().len()
    }

    pub fn calls_for(&self, url: &str) -> usize {
        self.requests.lock().iter().filter(|request| request.url == url).count()
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().clone()
    }

    fn next_outcome(&self, url: &str) -> Outcome {
        if let Some(outcome) = self.by_url.lock().get_mut(url).and_then(VecDeque::pop_front) {
            return outcome;
        }
        if let Some(outcome) = self.queue.lock().pop_front() {
            return outcome;
        }
        self.fallback.lock().clone()
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn send(&self, request: HttpRequest) -> Outcome {
        let url = request.url.clone();
        self.requests.lock().push(request);
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.next_outcome(&url)
    }
}

/// `ConnectivityProbe` whose answer the test sets.
#[derive(Debug)]
pub struct StaticConnectivity {
    online: AtomicBool,
}

impl StaticConnectivity {
    pub fn new(online: bool) -> Self {
        Self { online: AtomicBool::new(online) }
    }

    pub fn online() -> Self {
        Self::new(true)
    }

    pub fn offline() -> Self {
        Self::new(false)
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }
}

impl ConnectivityProbe for StaticConnectivity {
    fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }
}

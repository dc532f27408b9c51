//! Sessions and the per-session event bus.
//!
//! Each query gets one `Session`: an unguessable id, the pipeline's working
//! state, and a bounded event channel connecting the worker to at most one
//! stream subscriber. The bus is guarded by an explicit closed flag, so
//! publishing into a closed session is a silent no-op and closing twice is
//! harmless, even with publishers in flight.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, RwLock};
use wellspring_common::{Event, QueryPlan, SearchResult};

/// Pending events per session. Non-heartbeat publishes block when the queue
/// is full, so a slow subscriber throttles the worker instead of losing
/// results. Heartbeats never touch the queue (see `routes`).
pub const EVENT_QUEUE_CAPACITY: usize = 128;

/// One end-to-end query-to-answer execution.
///
/// Result fields are mutated only by the owning pipeline worker and the
/// sub-tasks it spawns; the bus is the only channel out.
pub struct Session {
    pub id: String,
    pub query: String,
    pub plan: RwLock<Option<QueryPlan>>,
    /// Raw search results, one slot per sub-query.
    pub results: Mutex<Vec<Vec<SearchResult>>>,
    /// Reranked results, one slot per sub-query. Failed sub-queries leave
    /// their slot empty.
    pub reranked: Mutex<Vec<Vec<SearchResult>>>,
    /// URL -> distilled page text.
    pub pages: Mutex<HashMap<String, String>>,
    bus: EventBus,
}

impl Session {
    fn new(query: &str) -> Self {
        Self {
            id: new_session_id(),
            query: query.to_string(),
            plan: RwLock::new(None),
            results: Mutex::new(Vec::new()),
            reranked: Mutex::new(Vec::new()),
            pages: Mutex::new(HashMap::new()),
            bus: EventBus::new(EVENT_QUEUE_CAPACITY),
        }
    }

    /// Publish an event onto the session's bus. Blocks while the queue is
    /// full; does nothing once the session is closed.
    pub async fn publish(&self, event: Event) {
        self.bus.publish(event).await;
    }

    /// Claim the consumer side of the bus. Succeeds at most once.
    pub async fn subscribe(&self) -> Option<mpsc::Receiver<Event>> {
        self.bus.subscribe().await
    }

    async fn close(&self) {
        self.bus.close().await;
    }
}

struct BusState {
    tx: Option<mpsc::Sender<Event>>,
    closed: bool,
}

/// Bounded FIFO event channel with a closed-flag guard.
struct EventBus {
    state: Mutex<BusState>,
    rx: Mutex<Option<mpsc::Receiver<Event>>>,
}

impl EventBus {
    fn new(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity);
        Self {
            state: Mutex::new(BusState {
                tx: Some(tx),
                closed: false,
            }),
            rx: Mutex::new(Some(rx)),
        }
    }

    async fn publish(&self, event: Event) {
        // Check the flag and clone the sender under the lock, then send
        // outside it so backpressure never holds the lock.
        let tx = {
            let state = self.state.lock().await;
            if state.closed {
                return;
            }
            state.tx.clone()
        };
        if let Some(tx) = tx {
            let _ = tx.send(event).await;
        }
    }

    /// Idempotent. Appends a terminal `SessionClosed` best-effort: if the
    /// queue is full the subscriber still observes end-of-stream when the
    /// sender drops.
    async fn close(&self) {
        let tx = {
            let mut state = self.state.lock().await;
            if state.closed {
                return;
            }
            state.closed = true;
            state.tx.take()
        };
        if let Some(tx) = tx {
            let _ = tx.try_send(Event::SessionClosed);
        }
    }

    async fn subscribe(&self) -> Option<mpsc::Receiver<Event>> {
        self.rx.lock().await.take()
    }
}

/// 32 random bytes, URL-safe base64 without padding.
fn new_session_id() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Process-wide session table. Explicit and injectable; entries are added on
/// creation, removed on close, never persisted.
pub struct SessionRegistry {
    sessions: Mutex<HashMap<String, Arc<Session>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub async fn create(&self, query: &str) -> Arc<Session> {
        let session = Arc::new(Session::new(query));
        self.sessions
            .lock()
            .await
            .insert(session.id.clone(), session.clone());
        session
    }

    pub async fn get(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions.lock().await.get(id).cloned()
    }

    /// Remove the session and close its bus. Safe to call more than once
    /// and concurrently with in-flight publishes. Does not interrupt
    /// collaborator calls already running for this session.
    pub async fn close(&self, id: &str) {
        let removed = self.sessions.lock().await.remove(id);
        if let Some(session) = removed {
            session.close().await;
        }
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

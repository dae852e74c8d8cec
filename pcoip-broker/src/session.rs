//! Session store: the keyed blob store plus the two ways a key is carried
//! between a client and the broker (cookie or header).
//!
//! The protocol handler never sees any of this — it only ever receives
//! `Option<ProtocolSession>` in and hands one back out. Everything here is
//! about turning that back into "what key, in what header, with what
//! store."
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use pcoip_proto::message::ProtocolSession;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::config::SessionBackend;

/// A keyed store for `ProtocolSession` blobs. The in-memory reference
/// implementation below is the only one shipped; spec explicitly allows a
/// file-backed one as an alternative without changing this contract.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn get(&self, key: &str) -> Option<ProtocolSession>;
    async fn set(&self, key: &str, value: Option<ProtocolSession>);
}

/// In-memory blob store, one `RwLock<HashMap<..>>` guarding the whole table.
/// Matches the at-most-once-at-a-time read-modify-write requirement per key
/// (the lock is coarser than per-key, but HTTP requests don't hold it across
/// await points other than the lock acquisition itself).
#[derive(Default)]
pub struct InMemoryBlobStore {
    sessions: RwLock<HashMap<String, ProtocolSession>>,
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn get(&self, key: &str) -> Option<ProtocolSession> {
        self.sessions.read().await.get(key).cloned()
    }

    async fn set(&self, key: &str, value: Option<ProtocolSession>) {
        let mut sessions = self.sessions.write().await;
        match value {
            Some(session) => {
                sessions.insert(key.to_string(), session);
            }
            None => {
                sessions.remove(key);
            }
        }
    }
}

/// Bridges a single request's session key (read from a cookie or a header,
/// depending on `backend`) to the blob store. `set()` assigns a fresh key on
/// first write for the cookie backend; the header backend relies entirely on
/// the client supplying `CLIENT-LOG-ID` and never invents one.
pub struct SessionContext {
    backend: SessionBackend,
    store: Arc<dyn BlobStore>,
    key: Option<String>,
}

impl SessionContext {
    pub fn new(backend: SessionBackend, store: Arc<dyn BlobStore>, key: Option<String>) -> Self {
        Self {
            backend,
            store,
            key,
        }
    }

    pub async fn get(&self) -> Option<ProtocolSession> {
        match &self.key {
            Some(key) => self.store.get(key).await,
            None => None,
        }
    }

    /// Persists (or deletes) the session, returning the key to send back as
    /// `Set-Cookie` when the backend is cookie-based and a session now
    /// exists. Returns `None` when there's nothing to tell the client (no
    /// session, or the header backend — the client already knows its own
    /// `CLIENT-LOG-ID`).
    pub async fn set(&mut self, session: Option<ProtocolSession>) -> Option<String> {
        match session {
            None => {
                if let Some(key) = self.key.take() {
                    self.store.set(&key, None).await;
                }
                None
            }
            Some(session) => {
                let key = match &self.key {
                    Some(key) => key.clone(),
                    None => match self.backend {
                        SessionBackend::Cookie => Uuid::new_v4().to_string(),
                        SessionBackend::Header => {
                            log::warn!(
                                "header session backend in use but client sent no CLIENT-LOG-ID; session will not persist"
                            );
                            return None;
                        }
                    },
                };
                self.store.set(&key, Some(session)).await;
                self.key = Some(key.clone());
                match self.backend {
                    SessionBackend::Cookie => Some(key),
                    SessionBackend::Header => None,
                }
            }
        }
    }
}

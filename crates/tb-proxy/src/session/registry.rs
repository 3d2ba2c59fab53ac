//! Session registry
//!
//! Tracks accepted browser connections and enforces the optional
//! concurrent session limit.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;

use tb_core::{RegistryError, SessionId};

/// Bookkeeping for one accepted browser connection
#[derive(Debug)]
struct SessionEntry {
    peer: SocketAddr,
    opened_at: Instant,
}

/// Registry of live sessions
pub struct SessionRegistry {
    /// Sessions indexed by session ID
    sessions: DashMap<SessionId, SessionEntry>,
    /// Next session ID to hand out
    next_id: AtomicU64,
    /// Admitted sessions, counted before the entry is inserted
    active: AtomicUsize,
    /// Admission limit (unbounded when `None`)
    max_sessions: Option<usize>,
}

impl SessionRegistry {
    /// Create a new registry
    pub fn new(max_sessions: Option<usize>) -> Self {
        Self {
            sessions: DashMap::new(),
            next_id: AtomicU64::new(1),
            active: AtomicUsize::new(0),
            max_sessions,
        }
    }

    /// Admit a new session, or refuse it if the limit is reached.
    ///
    /// The returned lease removes the entry when dropped.
    pub fn admit(self: &Arc<Self>, peer: SocketAddr) -> Result<SessionLease, RegistryError> {
        if let Some(max) = self.max_sessions {
            self.active
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                    (n < max).then_some(n + 1)
                })
                .map_err(|_| RegistryError::LimitReached { max })?;
        } else {
            self.active.fetch_add(1, Ordering::AcqRel);
        }

        let id = SessionId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.sessions.insert(
            id,
            SessionEntry {
                peer,
                opened_at: Instant::now(),
            },
        );

        tracing::debug!("Admitted {} from {} ({} active)", id, peer, self.len());

        Ok(SessionLease {
            id,
            registry: Arc::clone(self),
        })
    }

    /// Number of active sessions
    pub fn len(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn release(&self, id: SessionId) {
        if let Some((_, entry)) = self.sessions.remove(&id) {
            self.active.fetch_sub(1, Ordering::AcqRel);
            tracing::debug!(
                "Released {} from {} after {:?} ({} active)",
                id,
                entry.peer,
                entry.opened_at.elapsed(),
                self.len()
            );
        }
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new(None)
    }
}

/// Admission of one session; releases its slot on drop
pub struct SessionLease {
    id: SessionId,
    registry: Arc<SessionRegistry>,
}

impl SessionLease {
    /// ID assigned to the admitted session
    pub fn id(&self) -> SessionId {
        self.id
    }
}

impl Drop for SessionLease {
    fn drop(&mut self) {
        self.registry.release(self.id);
    }
}

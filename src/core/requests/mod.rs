//! Per-conversation request tracking. One active request per
//! (channel, user); each request sits behind its own lock so a conversation's
//! turns are handled one at a time while other conversations proceed.

pub mod types;

pub use types::{
    ConversationKey, ConversationTurn, DEFAULT_PRIORITY, LifecycleError, Request, RequestStatus,
    RequestSummary, can_transition,
};

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info};

use crate::core::bounded::BoundedLog;
use crate::core::scheduler::TaskResult;

pub const DEFAULT_TIMEOUT_MINUTES: i64 = 30;
pub const DEFAULT_ARCHIVE_CAPACITY: usize = 1000;

type Slot = Arc<Mutex<Request>>;

#[derive(Default)]
struct ActiveSet {
    by_key: HashMap<ConversationKey, Slot>,
    by_id: HashMap<String, ConversationKey>,
}

impl ActiveSet {
    /// Remove `slot` if it is still the registered entry for `key`.
    fn detach(&mut self, key: &ConversationKey, slot: &Slot, id: &str) -> bool {
        match self.by_key.get(key) {
            Some(current) if Arc::ptr_eq(current, slot) => {
                self.by_key.remove(key);
                self.by_id.remove(id);
                true
            }
            _ => false,
        }
    }
}

/// Exclusive access to one active request for the duration of a turn.
pub struct RequestTurn {
    slot: Slot,
    guard: OwnedMutexGuard<Request>,
    is_new: bool,
}

impl RequestTurn {
    /// True when this turn opened the request.
    pub fn is_new(&self) -> bool {
        self.is_new
    }
}

impl Deref for RequestTurn {
    type Target = Request;

    fn deref(&self) -> &Request {
        &self.guard
    }
}

impl DerefMut for RequestTurn {
    fn deref_mut(&mut self) -> &mut Request {
        &mut self.guard
    }
}

pub struct RequestTracker {
    active: Mutex<ActiveSet>,
    archive: Mutex<BoundedLog<Request>>,
    timeout: Duration,
}

impl Default for RequestTracker {
    fn default() -> Self {
        Self::new(
            Duration::minutes(DEFAULT_TIMEOUT_MINUTES),
            DEFAULT_ARCHIVE_CAPACITY,
        )
    }
}

impl RequestTracker {
    pub fn new(timeout: Duration, archive_capacity: usize) -> Self {
        Self {
            active: Mutex::new(ActiveSet::default()),
            archive: Mutex::new(BoundedLog::new(archive_capacity)),
            timeout,
        }
    }

    /// Open the active request for `(channel_id, user_id)`, or continue the
    /// existing one, and hold it until the turn is passed to [`finish`].
    ///
    /// [`finish`]: RequestTracker::finish
    pub async fn begin_turn(&self, channel_id: &str, user_id: &str, text: &str) -> RequestTurn {
        let key: ConversationKey = (channel_id.to_string(), user_id.to_string());
        loop {
            let (slot, is_new) = {
                let mut active = self.active.lock().await;
                match active.by_key.get(&key) {
                    Some(slot) => (Arc::clone(slot), false),
                    None => {
                        let request = Request::new(channel_id, user_id, text, Utc::now());
                        info!(
                            "Opened request {} for {}/{}",
                            request.id, channel_id, user_id
                        );
                        let id = request.id.clone();
                        let slot = Arc::new(Mutex::new(request));
                        active.by_id.insert(id, key.clone());
                        active.by_key.insert(key.clone(), Arc::clone(&slot));
                        (slot, true)
                    }
                }
            };

            let mut guard = Arc::clone(&slot).lock_owned().await;
            if guard.status.is_terminal() {
                // Finished while this turn waited for the lock.
                let id = guard.id.clone();
                drop(guard);
                self.active.lock().await.detach(&key, &slot, &id);
                continue;
            }
            guard.record_turn(text, true);
            return RequestTurn {
                slot,
                guard,
                is_new,
            };
        }
    }

    /// Release a turn. Terminal requests leave the active set and move to the
    /// archive.
    pub async fn finish(&self, turn: RequestTurn) -> RequestSummary {
        let RequestTurn { slot, guard, .. } = turn;
        let summary = guard.summary();
        if guard.status.is_terminal() {
            let key = guard.key();
            let detached = self.active.lock().await.detach(&key, &slot, &guard.id);
            if detached {
                info!("Archiving request {} as {}", guard.id, guard.status);
                self.archive.lock().await.push(Request::clone(&guard));
            }
        }
        summary
    }

    /// Resolve a `processing` request from its task's result.
    pub async fn record_task_result(
        &self,
        request_id: &str,
        result: &TaskResult,
    ) -> Result<RequestStatus, LifecycleError> {
        let slot = {
            let active = self.active.lock().await;
            active
                .by_id
                .get(request_id)
                .and_then(|key| active.by_key.get(key))
                .cloned()
        };
        let Some(slot) = slot else {
            return Err(LifecycleError::NotActive(request_id.to_string()));
        };
        let guard = Arc::clone(&slot).lock_owned().await;
        if guard.id != request_id {
            return Err(LifecycleError::NotActive(request_id.to_string()));
        }
        let mut turn = RequestTurn {
            slot,
            guard,
            is_new: false,
        };
        let next = if result.is_success() {
            RequestStatus::Completed
        } else {
            RequestStatus::Error
        };
        turn.finish_with(next, result.message())?;
        turn.record_turn(result.message(), false);
        self.finish(turn).await;
        Ok(next)
    }

    /// Time out idle `new`/`waiting_for_info` requests. Requests whose lock is
    /// held or that are `processing` are left alone. Returns the ids timed
    /// out.
    pub async fn sweep_expired_at(&self, now: DateTime<Utc>) -> Vec<String> {
        let mut expired: Vec<(ConversationKey, Slot, Request)> = Vec::new();
        let mut active = self.active.lock().await;
        for (key, slot) in active.by_key.iter() {
            let Ok(mut request) = slot.try_lock() else {
                debug!("Sweep skipping busy request for {}/{}", key.0, key.1);
                continue;
            };
            let idle = matches!(
                request.status,
                RequestStatus::New | RequestStatus::WaitingForInfo
            );
            if !idle || now - request.last_updated <= self.timeout {
                continue;
            }
            let minutes = self.timeout.num_minutes();
            if request
                .finish_with(
                    RequestStatus::Timeout,
                    format!("no activity for {} minutes", minutes),
                )
                .is_ok()
            {
                expired.push((key.clone(), Arc::clone(slot), request.clone()));
            }
        }

        let mut ids = Vec::with_capacity(expired.len());
        let mut archive = self.archive.lock().await;
        for (key, slot, request) in expired {
            active.detach(&key, &slot, &request.id);
            info!("Request {} timed out", request.id);
            ids.push(request.id.clone());
            archive.push(request);
        }
        ids
    }

    /// `(request_id, task_id)` for every idle `processing` request. Requests
    /// mid-turn are skipped.
    pub async fn processing_tasks(&self) -> Vec<(String, String)> {
        let active = self.active.lock().await;
        active
            .by_key
            .values()
            .filter_map(|slot| {
                let request = slot.try_lock().ok()?;
                if request.status != RequestStatus::Processing {
                    return None;
                }
                let task_id = request.task_id.clone()?;
                Some((request.id.clone(), task_id))
            })
            .collect()
    }

    pub async fn sweep_expired(&self) -> Vec<String> {
        self.sweep_expired_at(Utc::now()).await
    }

    pub async fn summary(&self, channel_id: &str, user_id: &str) -> Option<RequestSummary> {
        let key: ConversationKey = (channel_id.to_string(), user_id.to_string());
        let slot = self.active.lock().await.by_key.get(&key).cloned()?;
        let request = slot.lock().await;
        Some(request.summary())
    }

    /// The newest `limit` archived requests, oldest first.
    pub async fn archived(&self, limit: usize) -> Vec<Request> {
        self.archive.lock().await.tail(limit)
    }

    pub async fn active_count(&self) -> usize {
        self.active.lock().await.by_key.len()
    }
}

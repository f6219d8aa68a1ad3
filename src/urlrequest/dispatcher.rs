//! Admission control for calls.
//!
//! Enqueued calls wait in a FIFO queue and are promoted onto the runtime
//! while fewer than `max_running` of them run. Inline calls are only
//! tracked so that cancellation by tag reaches them. Membership changes take
//! short per-collection locks; promotion holds its own lock so that two
//! promotions never interleave and the running bound holds. Callbacks are
//! always invoked after every lock is released.

use crate::base::context::MutexExt;
use crate::base::neterror::NetError;
use crate::urlrequest::call::{AsyncCall, Call};
use std::collections::VecDeque;
use std::sync::Mutex;
use tokio::runtime::Handle;

pub struct Dispatcher {
    max_running: usize,
    runtime: Handle,
    waiting: Mutex<VecDeque<AsyncCall>>,
    running_async: Mutex<Vec<Call>>,
    running_sync: Mutex<Vec<Call>>,
    promote_lock: Mutex<()>,
}

impl Dispatcher {
    pub fn new(max_running: usize, runtime: Handle) -> Self {
        Self {
            max_running: max_running.max(1),
            runtime,
            waiting: Mutex::new(VecDeque::new()),
            running_async: Mutex::new(Vec::new()),
            running_sync: Mutex::new(Vec::new()),
            promote_lock: Mutex::new(()),
        }
    }

    pub fn max_running(&self) -> usize {
        self.max_running
    }

    pub fn waiting_count(&self) -> usize {
        self.waiting.locked().len()
    }

    pub fn running_count(&self) -> usize {
        self.running_async.locked().len()
    }

    pub fn running_sync_count(&self) -> usize {
        self.running_sync.locked().len()
    }

    /// Register an inline call. False when an equal call is already
    /// running inline.
    pub(crate) fn executed(&self, call: &Call) -> bool {
        let mut running = self.running_sync.locked();
        if running.iter().any(|c| c == call) {
            tracing::debug!(url = %call.request().url(), "Duplicate inline call");
            return false;
        }
        running.push(call.clone());
        true
    }

    pub(crate) fn finished_sync(&self, call: &Call) {
        self.running_sync.locked().retain(|c| !c.same(call));
    }

    /// Queue an enqueued call, or reject it when an equal call is already
    /// waiting or running.
    pub(crate) fn enqueue(&self, async_call: AsyncCall) {
        let rejected = {
            let mut waiting = self.waiting.locked();
            let call = async_call.call();
            let duplicate = waiting.iter().any(|w| w.call() == call)
                || self.running_async.locked().iter().any(|c| c == call);
            if duplicate {
                Some(async_call)
            } else {
                tracing::debug!(
                    url = %call.request().url(),
                    tag = %call.request().tag(),
                    waiting = waiting.len() + 1,
                    "Call queued"
                );
                waiting.push_back(async_call);
                None
            }
        };
        match rejected {
            Some(duplicate) => {
                tracing::debug!(url = %duplicate.call().request().url(), "Duplicate call rejected");
                duplicate.reject(NetError::DuplicateRequest);
            }
            None => self.promote(),
        }
    }

    /// Move waiting calls onto the runtime while below the bound.
    fn promote(&self) {
        let mut duplicates = Vec::new();
        {
            let _promoting = self.promote_lock.locked();
            loop {
                if self.running_async.locked().len() >= self.max_running {
                    break;
                }
                let Some(next) = self.waiting.locked().pop_front() else {
                    break;
                };
                {
                    let mut running = self.running_async.locked();
                    if running.iter().any(|c| c == next.call()) {
                        duplicates.push(next);
                        continue;
                    }
                    running.push(next.call().clone());
                }
                tracing::debug!(url = %next.call().request().url(), "Call promoted");
                self.runtime.spawn(next.run());
            }
        }
        for duplicate in duplicates {
            duplicate.reject(NetError::DuplicateRequest);
        }
    }

    pub(crate) fn finished_async(&self, call: &Call) {
        self.running_async.locked().retain(|c| !c.same(call));
        self.promote();
    }

    /// Remove waiting calls tagged `tag`. Each removed call is reported as
    /// canceled. Returns how many were removed.
    pub fn cancel_waiting(&self, tag: &str) -> usize {
        let removed = self.drain_waiting(|call| call.request().tag() == tag);
        let count = removed.len();
        Self::reject_canceled(removed);
        count
    }

    /// Cancel every call tagged `tag`, waiting or running.
    pub fn cancel_tagged(&self, tag: &str) {
        self.cancel_waiting(tag);
        for call in self.running_matching(|call| call.request().tag() == tag) {
            call.cancel();
        }
    }

    /// Cancel every waiting and running call.
    pub fn cancel_all(&self) {
        let removed = self.drain_waiting(|_| true);
        Self::reject_canceled(removed);
        for call in self.running_matching(|_| true) {
            call.cancel();
        }
    }

    fn drain_waiting(&self, matches: impl Fn(&Call) -> bool) -> Vec<AsyncCall> {
        let mut waiting = self.waiting.locked();
        let mut removed = Vec::new();
        let mut kept = VecDeque::with_capacity(waiting.len());
        for async_call in waiting.drain(..) {
            if matches(async_call.call()) {
                removed.push(async_call);
            } else {
                kept.push_back(async_call);
            }
        }
        *waiting = kept;
        removed
    }

    fn running_matching(&self, matches: impl Fn(&Call) -> bool) -> Vec<Call> {
        let mut calls: Vec<Call> = self
            .running_async
            .locked()
            .iter()
            .filter(|c| matches(c))
            .cloned()
            .collect();
        calls.extend(
            self.running_sync
                .locked()
                .iter()
                .filter(|c| matches(c))
                .cloned(),
        );
        calls
    }

    fn reject_canceled(removed: Vec<AsyncCall>) {
        for async_call in removed {
            async_call.call().cancel();
            async_call.reject(NetError::RequestCanceled);
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("max_running", &self.max_running)
            .field("waiting", &self.waiting_count())
            .field("running", &self.running_count())
            .field("running_sync", &self.running_sync_count())
            .finish()
    }
}

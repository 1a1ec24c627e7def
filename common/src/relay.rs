//! Single-slot frame hand-off between the camera's streaming thread and the
//! HTTP streaming consumers.
//!
//! The relay keeps only the most recently published [`Frame`]. Publishing
//! never waits on consumers: a slow consumer simply observes a later
//! generation on its next call and the frames in between are skipped.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use tokio::sync::Notify;
use tracing::debug;

use crate::frame::Frame;

/// Returned by every relay operation once [`FrameRelay::close`] has run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("frame relay closed")]
pub struct RelayClosed;

#[derive(Default)]
struct Slot {
    latest: Option<Frame>,
    generation: u64,
    closed: bool,
}

#[derive(Default)]
pub struct FrameRelay {
    slot: Mutex<Slot>,
    notify: Notify,
    subscribers: AtomicUsize,
}

impl FrameRelay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the current frame and wake every waiting consumer.
    ///
    /// Returns the generation assigned to the new frame. Safe to call from a
    /// plain OS thread; it only takes the slot lock for the swap.
    pub fn publish(&self, data: impl Into<Bytes>) -> Result<u64, RelayClosed> {
        let generation = {
            let mut slot = self.lock();
            if slot.closed {
                return Err(RelayClosed);
            }
            slot.generation += 1;
            let generation = slot.generation;
            slot.latest = Some(Frame::new(data.into(), generation));
            generation
        };
        self.notify.notify_waiters();
        Ok(generation)
    }

    /// Wait until a frame newer than `last_seen` is available and return it.
    ///
    /// Pass `0` to receive whatever is currently held. Dropping the returned
    /// future abandons the wait without affecting other consumers.
    pub async fn next(&self, last_seen: u64) -> Result<Frame, RelayClosed> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // Register before inspecting the slot so a concurrent publish
            // cannot slip between the check and the await.
            notified.as_mut().enable();

            if let Some(result) = self.poll_slot(last_seen) {
                return result;
            }
            notified.await;
        }
    }

    /// Close the relay. Blocked and future `next` calls return
    /// [`RelayClosed`]; later `publish` calls are rejected. Idempotent.
    pub fn close(&self) {
        let newly_closed = {
            let mut slot = self.lock();
            let was_closed = std::mem::replace(&mut slot.closed, true);
            slot.latest = None;
            !was_closed
        };
        self.notify.notify_waiters();
        if newly_closed {
            debug!(
                subscribers = self.subscriber_count(),
                "frame relay closed"
            );
        }
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Generation of the most recent publish, 0 if nothing was published.
    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    pub fn latest(&self) -> Option<Frame> {
        self.lock().latest.clone()
    }

    /// Number of live [`FrameSubscriber`] handles.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.load(Ordering::Relaxed)
    }

    /// Create a consumer handle that remembers the last generation it saw.
    pub fn subscribe(self: &Arc<Self>) -> FrameSubscriber {
        self.subscribers.fetch_add(1, Ordering::Relaxed);
        FrameSubscriber {
            relay: Arc::clone(self),
            last_seen: 0,
        }
    }

    fn poll_slot(&self, last_seen: u64) -> Option<Result<Frame, RelayClosed>> {
        let slot = self.lock();
        if slot.closed {
            return Some(Err(RelayClosed));
        }
        match &slot.latest {
            Some(frame) if frame.generation() > last_seen => Some(Ok(frame.clone())),
            _ => None,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Slot> {
        // The slot is always left consistent, so a panic elsewhere while
        // holding the lock does not invalidate it.
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A single streaming consumer of a [`FrameRelay`].
pub struct FrameSubscriber {
    relay: Arc<FrameRelay>,
    last_seen: u64,
}

impl FrameSubscriber {
    /// Wait for the next frame this subscriber has not seen yet.
    pub async fn recv(&mut self) -> Result<Frame, RelayClosed> {
        let frame = self.relay.next(self.last_seen).await?;
        self.last_seen = frame.generation();
        Ok(frame)
    }

    pub fn last_seen(&self) -> u64 {
        self.last_seen
    }
}

impl Drop for FrameSubscriber {
    fn drop(&mut self) {
        self.relay.subscribers.fetch_sub(1, Ordering::Relaxed);
    }
}

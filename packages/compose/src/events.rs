//! # Event Bus
//!
//! Typed publish/subscribe channel for cross-component notifications.
//!
//! Every subscriber gets its own unbounded queue. Subscriptions are removed
//! explicitly with [`Subscription::unsubscribe`] or implicitly when dropped;
//! publishers never block on slow subscribers.

use crate::editor::lock;
use crate::ledger::UserId;
use crate::rewrite::{Affordance, RewritePhase};
use crate::session::SessionStatus;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use tokio::sync::mpsc;
use uuid::Uuid;

pub type SubscriberId = u64;

struct Inner<E> {
    subscribers: Mutex<Vec<(SubscriberId, mpsc::UnboundedSender<E>)>>,
    next_id: AtomicU64,
}

impl<E> Inner<E> {
    fn remove(&self, id: SubscriberId) {
        lock(&self.subscribers).retain(|(sid, _)| *sid != id);
    }
}

/// Process-owned channel for one event type
pub struct EventBus<E> {
    inner: Arc<Inner<E>>,
}

impl<E> Clone for EventBus<E> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<E: Clone + Send + 'static> Default for EventBus<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Clone + Send + 'static> EventBus<E> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                subscribers: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    pub fn subscribe(&self) -> Subscription<E> {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        lock(&self.inner.subscribers).push((id, tx));

        Subscription {
            id,
            receiver: rx,
            bus: Arc::downgrade(&self.inner),
        }
    }

    /// Deliver `event` to every live subscriber and return how many got it
    pub fn publish(&self, event: E) -> usize {
        let mut subscribers = lock(&self.inner.subscribers);
        // Receivers dropped without unsubscribing are pruned here
        subscribers.retain(|(_, tx)| tx.send(event.clone()).is_ok());
        subscribers.len()
    }

    pub fn subscriber_count(&self) -> usize {
        lock(&self.inner.subscribers).len()
    }
}

/// Receiving end of an [`EventBus`]
pub struct Subscription<E> {
    id: SubscriberId,
    receiver: mpsc::UnboundedReceiver<E>,
    bus: Weak<Inner<E>>,
}

impl<E> Subscription<E> {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Wait for the next event; `None` once the bus is gone
    pub async fn recv(&mut self) -> Option<E> {
        self.receiver.recv().await
    }

    pub fn try_recv(&mut self) -> Option<E> {
        self.receiver.try_recv().ok()
    }

    /// Everything queued so far
    pub fn drain(&mut self) -> Vec<E> {
        let mut events = Vec::new();
        while let Ok(event) = self.receiver.try_recv() {
            events.push(event);
        }
        events
    }

    pub fn unsubscribe(self) {}
}

impl<E> Drop for Subscription<E> {
    fn drop(&mut self) {
        if let Some(inner) = self.bus.upgrade() {
            inner.remove(self.id);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Loading,
    Success,
    Warning,
    Error,
}

/// User-facing notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
    /// An undo action accompanies the notice
    pub undo_available: bool,
}

impl Notice {
    pub fn new(level: NoticeLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            undo_available: false,
        }
    }

    pub fn with_undo(mut self) -> Self {
        self.undo_available = true;
        self
    }
}

/// Events published by the composition engine
#[derive(Debug, Clone, PartialEq)]
pub enum ComposeEvent {
    SessionStatus {
        session_id: Uuid,
        status: SessionStatus,
    },
    ChunkApplied {
        session_id: Uuid,
        chars: usize,
        total_chars: usize,
    },
    RewritePhase(RewritePhase),
    Affordance(Option<Affordance>),
    CreditsChanged {
        user: UserId,
        balance: Option<i64>,
    },
    Notice(Notice),
}

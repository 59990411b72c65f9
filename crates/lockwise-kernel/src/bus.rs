//! Typed publish/subscribe bus.
//!
//! [`Bus`] is a thin wrapper around [`tokio::sync::broadcast`].  Events are
//! wrapped in [`Arc`] so that fanning out to many subscribers never clones
//! the payload.  Publishing never blocks and never fails: with no receivers
//! the event is dropped, which is normal during startup and shutdown.
//!
//! ```rust,no_run
//! # use lockwise_kernel::{ActionBus, Action, LifecycleEvent};
//! # async fn example() {
//! let bus = ActionBus::new(256);
//! let mut rx = bus.subscribe();
//!
//! bus.publish(Action::Lifecycle(LifecycleEvent::Background));
//!
//! let action = rx.recv().await.unwrap();
//! # }
//! ```

use std::sync::Arc;

use tokio::sync::broadcast;

use crate::action::Action;
use crate::error::{KernelError, Result};

/// Bus carrying [`Action`]s into the vault subsystems.
pub type ActionBus = Bus<Action>;

// ---------------------------------------------------------------------------
// Bus
// ---------------------------------------------------------------------------

/// Cheaply cloneable broadcast bus. Subscribers see events in publish order.
pub struct Bus<E> {
    inner: Arc<BusInner<E>>,
}

struct BusInner<E> {
    sender: broadcast::Sender<Arc<E>>,
}

impl<E> Clone for Bus<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<E: Send + Sync + 'static> Bus<E> {
    /// Create a new bus with the given channel capacity.
    ///
    /// A subscriber that falls more than `capacity` events behind gets
    /// [`KernelError::Lagged`] from its next `recv`.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            inner: Arc::new(BusInner { sender }),
        }
    }

    /// Publish an event and return how many receivers will observe it.
    pub fn publish(&self, event: E) -> usize {
        match self.inner.sender.send(Arc::new(event)) {
            Ok(n) => {
                tracing::trace!(receivers = n, "event published");
                n
            }
            Err(_) => {
                tracing::trace!("event published but no active receivers");
                0
            }
        }
    }

    /// Create a subscriber for all future events.
    ///
    /// Events published *before* this call are **not** replayed.
    pub fn subscribe(&self) -> BusReceiver<E> {
        BusReceiver {
            rx: self.inner.sender.subscribe(),
        }
    }

    /// Return the current number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.inner.sender.receiver_count()
    }
}

// ---------------------------------------------------------------------------
// Receiver
// ---------------------------------------------------------------------------

/// Subscriber handle returned by [`Bus::subscribe`].
pub struct BusReceiver<E> {
    rx: broadcast::Receiver<Arc<E>>,
}

impl<E: Send + Sync + 'static> BusReceiver<E> {
    /// Wait for the next event.
    pub async fn recv(&mut self) -> Result<Arc<E>> {
        self.rx.recv().await.map_err(|e| match e {
            broadcast::error::RecvError::Lagged(missed) => KernelError::Lagged { missed },
            broadcast::error::RecvError::Closed => KernelError::BusClosed,
        })
    }

    /// Return the next event if one is already queued.
    pub fn try_recv(&mut self) -> Option<Arc<E>> {
        self.rx.try_recv().ok()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! Replicated fields with change notification
//!
//! A [`ReplicatedField`] is a single value owned by the lobby authority. The
//! authority mutates it with [`ReplicatedField::set`]; every actual change runs
//! the local observer callbacks and queues a [`FieldUpdate`] on the shared
//! [`Outbox`] for transmission. Observers hold mirror fields that are only ever
//! written by [`ReplicatedField::receive`] as updates arrive, and never queue
//! anything themselves, so an update cannot echo back to the authority.
//!
//! Handles are cheap to clone and share their state. A callback may hold a
//! handle to the field it observes and register or remove observers while a
//! notification pass is running.
//!
//! A change made from inside a callback is published immediately but its own
//! notification pass is deferred until the running pass has reached every
//! observer. Observers therefore always see changes in the order they were
//! made, and the last `new` value they see is the field's current value.

use crate::error::LobbyError;
use crate::protocol::{FieldId, FieldUpdate, FieldValue, Update};
use log::warn;
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// Values that can travel in a [`FieldUpdate`]
pub trait Replicable: Clone + PartialEq + fmt::Debug + Send + Sync + 'static {
    fn to_value(&self) -> FieldValue;
    fn from_value(value: FieldValue) -> Option<Self>;
}

impl Replicable for bool {
    fn to_value(&self) -> FieldValue {
        FieldValue::Bool(*self)
    }

    fn from_value(value: FieldValue) -> Option<Self> {
        match value {
            FieldValue::Bool(b) => Some(b),
            _ => None,
        }
    }
}

impl Replicable for i32 {
    fn to_value(&self) -> FieldValue {
        FieldValue::Int(*self)
    }

    fn from_value(value: FieldValue) -> Option<Self> {
        match value {
            FieldValue::Int(i) => Some(i),
            _ => None,
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Ordered queue of replication updates awaiting transmission
///
/// Every authority field and the session registry share one outbox, so the
/// order updates are drained in is the order the authority produced them.
#[derive(Clone, Default)]
pub struct Outbox {
    queue: Arc<Mutex<Vec<Update>>>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, update: Update) {
        lock(&self.queue).push(update);
    }

    /// Takes every queued update in production order
    pub fn drain(&self) -> Vec<Update> {
        std::mem::take(&mut *lock(&self.queue))
    }

    pub fn len(&self) -> usize {
        lock(&self.queue).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.queue).is_empty()
    }
}

impl fmt::Debug for Outbox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Outbox").field("pending", &self.len()).finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Holds the canonical value
    Authority,
    /// Read-only projection fed by the replication stream
    Mirror,
}

/// Handle returned by [`ReplicatedField::on_change`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

type Callback<T> = Arc<dyn Fn(&T, &T) + Send + Sync>;

struct Registration<T> {
    id: ObserverId,
    /// Cleared on removal so a pass already holding this entry skips it
    active: AtomicBool,
    callback: Callback<T>,
}

/// Changes waiting for a notification pass
struct Dispatch<T> {
    /// `(old, new)` pairs in the order the changes were made
    queue: VecDeque<(T, T)>,
    /// Set while some caller is running passes for this field
    draining: bool,
}

struct FieldInner<T> {
    id: FieldId,
    value: Mutex<T>,
    observers: Mutex<Vec<Arc<Registration<T>>>>,
    dispatch: Mutex<Dispatch<T>>,
    next_observer: AtomicU64,
    /// Present only on the authority copy
    outbox: Option<Outbox>,
}

/// Releases the draining flag even if a callback panics
struct DrainGuard<'a, T> {
    dispatch: &'a Mutex<Dispatch<T>>,
}

impl<T> Drop for DrainGuard<'_, T> {
    fn drop(&mut self) {
        lock(self.dispatch).draining = false;
    }
}

pub struct ReplicatedField<T: Replicable> {
    inner: Arc<FieldInner<T>>,
}

impl<T: Replicable> Clone for ReplicatedField<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Replicable> ReplicatedField<T> {
    /// Creates the canonical copy of a field, publishing changes to `outbox`
    pub fn authority(id: FieldId, initial: T, outbox: Outbox) -> Self {
        Self::build(id, initial, Some(outbox))
    }

    /// Creates an observer-side mirror of a field
    pub fn mirror(id: FieldId, initial: T) -> Self {
        Self::build(id, initial, None)
    }

    fn build(id: FieldId, initial: T, outbox: Option<Outbox>) -> Self {
        Self {
            inner: Arc::new(FieldInner {
                id,
                value: Mutex::new(initial),
                observers: Mutex::new(Vec::new()),
                dispatch: Mutex::new(Dispatch {
                    queue: VecDeque::new(),
                    draining: false,
                }),
                next_observer: AtomicU64::new(1),
                outbox,
            }),
        }
    }

    /// Wire name of this field
    pub fn id(&self) -> FieldId {
        self.inner.id
    }

    /// Authority if this copy was built with an outbox
    pub fn role(&self) -> Role {
        if self.inner.outbox.is_some() {
            Role::Authority
        } else {
            Role::Mirror
        }
    }

    /// Current value, as last set or received
    pub fn get(&self) -> T {
        lock(&self.inner.value).clone()
    }

    /// Replaces the canonical value
    ///
    /// Returns `Ok(true)` if the value changed, `Ok(false)` if `new_value`
    /// equals the current value (no callbacks, nothing transmitted), and
    /// `Err(NotAuthorized)` on a mirror.
    pub fn set(&self, new_value: T) -> Result<bool, LobbyError> {
        let outbox = self.inner.outbox.as_ref().ok_or(LobbyError::NotAuthorized)?;

        let Some(old_value) = self.replace(&new_value) else {
            return Ok(false);
        };

        // Queued before callbacks run so a nested set from inside a callback
        // lands after this update in the stream.
        outbox.push(Update::Field(FieldUpdate {
            field: self.inner.id,
            value: new_value.to_value(),
        }));

        self.notify(old_value, new_value);
        Ok(true)
    }

    /// Applies an update received from the authority to this mirror
    ///
    /// Fires local callbacks on change and never transmits.
    pub fn receive(&self, new_value: T) -> Result<bool, LobbyError> {
        if self.inner.outbox.is_some() {
            return Err(LobbyError::NotAuthorized);
        }

        let Some(old_value) = self.replace(&new_value) else {
            return Ok(false);
        };

        self.notify(old_value, new_value);
        Ok(true)
    }

    /// Applies a raw wire value, ignoring values of the wrong type
    pub fn receive_value(&self, value: FieldValue) -> Result<bool, LobbyError> {
        match T::from_value(value) {
            Some(v) => self.receive(v),
            None => {
                warn!("Ignoring {:?} for field {:?}: type mismatch", value, self.inner.id);
                Ok(false)
            }
        }
    }

    /// Registers a callback invoked with `(old, new)` on every change
    pub fn on_change<F>(&self, callback: F) -> ObserverId
    where
        F: Fn(&T, &T) + Send + Sync + 'static,
    {
        let id = ObserverId(self.inner.next_observer.fetch_add(1, Ordering::Relaxed));
        lock(&self.inner.observers).push(Arc::new(Registration {
            id,
            active: AtomicBool::new(true),
            callback: Arc::new(callback),
        }));
        id
    }

    /// Deregisters a callback; returns false if it was not registered
    ///
    /// Safe to call from inside a callback. A callback removed mid-pass is not
    /// invoked for the rest of that pass.
    pub fn remove_on_change(&self, id: ObserverId) -> bool {
        let mut observers = lock(&self.inner.observers);
        match observers.iter().position(|r| r.id == id) {
            Some(pos) => {
                let registration = observers.remove(pos);
                registration.active.store(false, Ordering::Release);
                true
            }
            None => false,
        }
    }

    /// Deregisters every callback on this field
    pub fn clear_observers(&self) {
        let removed = std::mem::take(&mut *lock(&self.inner.observers));
        for registration in removed {
            registration.active.store(false, Ordering::Release);
        }
    }

    /// Number of callbacks currently registered
    pub fn observer_count(&self) -> usize {
        lock(&self.inner.observers).len()
    }

    /// Swaps in `new_value`, returning the previous value if it differed
    fn replace(&self, new_value: &T) -> Option<T> {
        let mut value = lock(&self.inner.value);
        if *value == *new_value {
            return None;
        }
        Some(std::mem::replace(&mut *value, new_value.clone()))
    }

    /// Queues a change and, unless a pass is already running, drains the queue
    fn notify(&self, old_value: T, new_value: T) {
        {
            let mut dispatch = lock(&self.inner.dispatch);
            dispatch.queue.push_back((old_value, new_value));
            if dispatch.draining {
                return;
            }
            dispatch.draining = true;
        }
        let _guard = DrainGuard {
            dispatch: &self.inner.dispatch,
        };

        loop {
            let Some((old_value, new_value)) = lock(&self.inner.dispatch).queue.pop_front() else {
                return;
            };

            // Snapshot so callbacks can (de)register without holding the lock
            let pass: Vec<Arc<Registration<T>>> = lock(&self.inner.observers).clone();
            for registration in pass {
                if registration.active.load(Ordering::Acquire) {
                    (registration.callback)(&old_value, &new_value);
                }
            }
        }
    }
}

impl<T: Replicable> fmt::Debug for ReplicatedField<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReplicatedField")
            .field("id", &self.inner.id)
            .field("role", &self.role())
            .field("value", &self.get())
            .field("observers", &self.observer_count())
            .finish()
    }
}

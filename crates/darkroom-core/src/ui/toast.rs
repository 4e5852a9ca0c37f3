use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::error::{DarkroomError, Result};

/// How long a non-pending toast stays visible.
pub const DEFAULT_TOAST_LIFETIME: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToastKind {
    Success,
    Info,
    Error,
    /// Stays until updated or removed.
    Pending,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Toast {
    pub kind: ToastKind,
    pub message: String,
}

impl Toast {
    pub fn new(kind: ToastKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ToastId(Uuid);

impl ToastId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for ToastId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

struct Timer {
    token: u64,
    handle: JoinHandle<()>,
}

struct ToastInner {
    toasts: watch::Sender<Vec<(ToastId, Toast)>>,
    timers: Mutex<HashMap<ToastId, Timer>>,
    next_token: Mutex<u64>,
    lifetime: Duration,
}

/// Visible notifications, in creation order.
///
/// Non-pending toasts remove themselves after the configured lifetime. The
/// timer is armed when the toast becomes non-pending and re-armed on every
/// update; removing a toast cancels its timer. Timers are only armed inside a
/// tokio runtime.
#[derive(Clone)]
pub struct ToastQueue {
    inner: Arc<ToastInner>,
}

impl Default for ToastQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl ToastQueue {
    pub fn new() -> Self {
        Self::with_lifetime(DEFAULT_TOAST_LIFETIME)
    }

    pub fn with_lifetime(lifetime: Duration) -> Self {
        let (toasts, _) = watch::channel(Vec::new());
        Self {
            inner: Arc::new(ToastInner {
                toasts,
                timers: Mutex::new(HashMap::new()),
                next_token: Mutex::new(0),
                lifetime,
            }),
        }
    }

    pub fn push(&self, kind: ToastKind, message: impl Into<String>) -> ToastId {
        let id = ToastId::new();
        let toast = Toast::new(kind, message);
        self.inner.toasts.send_modify(|toasts| toasts.push((id, toast)));
        self.rearm(id, kind);
        id
    }

    pub fn success(&self, message: impl Into<String>) -> ToastId {
        self.push(ToastKind::Success, message)
    }

    pub fn info(&self, message: impl Into<String>) -> ToastId {
        self.push(ToastKind::Info, message)
    }

    pub fn error(&self, message: impl Into<String>) -> ToastId {
        self.push(ToastKind::Error, message)
    }

    /// Show a toast that stays until it is updated or removed.
    pub fn make_pending(&self, message: impl Into<String>) -> ToastId {
        self.push(ToastKind::Pending, message)
    }

    /// Replace a toast in place. Other toasts are untouched.
    pub fn update(&self, id: ToastId, kind: ToastKind, message: impl Into<String>) -> Result<()> {
        let toast = Toast::new(kind, message);
        let found = self.inner.toasts.send_if_modified(|toasts| {
            match toasts.iter_mut().find(|(existing, _)| *existing == id) {
                Some((_, slot)) => {
                    *slot = toast;
                    true
                }
                None => false,
            }
        });
        if !found {
            return Err(DarkroomError::UnknownToast(id.to_string()));
        }
        self.rearm(id, kind);
        Ok(())
    }

    pub fn remove(&self, id: ToastId) -> Option<Toast> {
        self.cancel_timer(id);
        remove_toast(&self.inner, id)
    }

    pub fn get(&self, id: ToastId) -> Option<Toast> {
        self.inner
            .toasts
            .borrow()
            .iter()
            .find(|(existing, _)| *existing == id)
            .map(|(_, toast)| toast.clone())
    }

    pub fn list(&self) -> Vec<(ToastId, Toast)> {
        self.inner.toasts.borrow().clone()
    }

    pub fn len(&self) -> usize {
        self.inner.toasts.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.toasts.borrow().is_empty()
    }

    pub fn subscribe(&self) -> watch::Receiver<Vec<(ToastId, Toast)>> {
        self.inner.toasts.subscribe()
    }

    fn cancel_timer(&self, id: ToastId) {
        let timer = self
            .inner
            .timers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
        if let Some(timer) = timer {
            timer.handle.abort();
        }
    }

    fn rearm(&self, id: ToastId, kind: ToastKind) {
        self.cancel_timer(id);
        if kind == ToastKind::Pending {
            return;
        }

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::debug!(toast = %id, "No runtime, toast will not expire");
            return;
        };

        let token = {
            let mut next = self
                .inner
                .next_token
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            *next += 1;
            *next
        };
        let weak = Arc::downgrade(&self.inner);
        let lifetime = self.inner.lifetime;

        let mut timers = self
            .inner
            .timers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let handle = runtime.spawn(expire(weak, id, token, lifetime));
        timers.insert(id, Timer { token, handle });
    }
}

async fn expire(queue: Weak<ToastInner>, id: ToastId, token: u64, lifetime: Duration) {
    tokio::time::sleep(lifetime).await;
    let Some(inner) = queue.upgrade() else {
        return;
    };

    {
        let mut timers = inner.timers.lock().unwrap_or_else(PoisonError::into_inner);
        match timers.get(&id) {
            Some(timer) if timer.token == token => {
                timers.remove(&id);
            }
            _ => return,
        }
    }

    if remove_toast(&inner, id).is_some() {
        tracing::debug!(toast = %id, "Toast expired");
    }
}

fn remove_toast(inner: &ToastInner, id: ToastId) -> Option<Toast> {
    let mut removed = None;
    inner.toasts.send_if_modified(|toasts| {
        match toasts.iter().position(|(existing, _)| *existing == id) {
            Some(index) => {
                removed = Some(toasts.remove(index).1);
                true
            }
            None => false,
        }
    });
    removed
}

impl fmt::Debug for ToastQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToastQueue")
            .field("toasts", &*self.inner.toasts.borrow())
            .field("lifetime", &self.inner.lifetime)
            .finish()
    }
}

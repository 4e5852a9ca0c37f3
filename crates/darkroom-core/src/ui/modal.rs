use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value};
use tokio::sync::watch;

use crate::error::{DarkroomError, Result};

/// Callback run when a modal is closed by the user.
pub type ExitCallback = Arc<dyn Fn() + Send + Sync>;

/// One entry of the modal stack.
#[derive(Clone)]
pub struct Modal {
    pub key: String,
    /// Name of the component that renders this modal.
    pub component: String,
    pub props: Map<String, Value>,
    /// Whether an exit button is shown.
    pub exit_button: bool,
    pub on_exit: Option<ExitCallback>,
}

impl Modal {
    pub fn new(key: impl Into<String>, component: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            component: component.into(),
            props: Map::new(),
            exit_button: true,
            on_exit: None,
        }
    }

    pub fn with_prop(mut self, name: impl Into<String>, value: Value) -> Self {
        self.props.insert(name.into(), value);
        self
    }

    pub fn with_exit_button(mut self, exit_button: bool) -> Self {
        self.exit_button = exit_button;
        self
    }

    pub fn on_exit<F>(mut self, callback: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on_exit = Some(Arc::new(callback));
        self
    }
}

impl fmt::Debug for Modal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Modal")
            .field("key", &self.key)
            .field("component", &self.component)
            .field("props", &self.props)
            .field("exit_button", &self.exit_button)
            .field("on_exit", &self.on_exit.is_some())
            .finish()
    }
}

/// Snapshot of the modal stack.
#[derive(Debug, Clone, Default)]
pub struct ModalStack {
    order: Vec<String>,
    modals: HashMap<String, Modal>,
    version: u64,
    active_version: u64,
}

impl ModalStack {
    /// Keys in push order; the last one is active.
    pub fn keys(&self) -> &[String] {
        &self.order
    }

    pub fn get(&self, key: &str) -> Option<&Modal> {
        self.modals.get(key)
    }

    pub fn active(&self) -> Option<&Modal> {
        self.order.last().and_then(|key| self.modals.get(key))
    }

    pub fn active_key(&self) -> Option<&str> {
        self.order.last().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Bumped by every mutation.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Bumped only when the visible modal changes.
    pub fn active_version(&self) -> u64 {
        self.active_version
    }

    fn require(&self, key: &str) -> Result<()> {
        if self.modals.contains_key(key) {
            Ok(())
        } else {
            Err(DarkroomError::UnknownModal(key.to_string()))
        }
    }

    fn insert(&mut self, modal: Modal) {
        self.order.push(modal.key.clone());
        self.modals.insert(modal.key.clone(), modal);
    }

    fn remove(&mut self, key: &str) -> Option<Modal> {
        self.order.retain(|k| k != key);
        self.modals.remove(key)
    }

    fn check_new_keys<'a>(&self, keys: impl IntoIterator<Item = &'a str>) -> Result<()> {
        let mut seen = HashSet::new();
        for key in keys {
            if self.modals.contains_key(key) || !seen.insert(key) {
                return Err(DarkroomError::DuplicateModal(key.to_string()));
            }
        }
        Ok(())
    }
}

/// Stack of open modals. The last pushed modal is the active one.
///
/// Batch operations are all-or-nothing: when any key fails, nothing changes.
#[derive(Debug)]
pub struct ModalRegistry {
    state: watch::Sender<ModalStack>,
}

impl Default for ModalRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ModalRegistry {
    pub fn new() -> Self {
        let (state, _) = watch::channel(ModalStack::default());
        Self { state }
    }

    pub fn snapshot(&self) -> ModalStack {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ModalStack> {
        self.state.subscribe()
    }

    pub fn active(&self) -> Option<Modal> {
        self.state.borrow().active().cloned()
    }

    pub fn active_key(&self) -> Option<String> {
        self.state.borrow().active_key().map(str::to_string)
    }

    pub fn get(&self, key: &str) -> Option<Modal> {
        self.state.borrow().get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.state.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.borrow().is_empty()
    }

    pub fn version(&self) -> u64 {
        self.state.borrow().version
    }

    pub fn active_version(&self) -> u64 {
        self.state.borrow().active_version
    }

    /// Push modals in order. Fails if any key is already open or repeated.
    pub fn push(&self, modals: Vec<Modal>) -> Result<()> {
        self.mutate(|stack| {
            stack.check_new_keys(modals.iter().map(|m| m.key.as_str()))?;
            for modal in modals {
                stack.insert(modal);
            }
            Ok(())
        })
    }

    /// Remove modals by key. Fails if any key is not open.
    pub fn delete(&self, keys: &[&str]) -> Result<()> {
        self.mutate(|stack| {
            for key in keys {
                stack.require(key)?;
            }
            for key in keys {
                stack.remove(key);
            }
            Ok(())
        })
    }

    /// Shallow-merge prop patches into open modals. Fails if any key is not open.
    pub fn update(&self, patches: Vec<(String, Map<String, Value>)>) -> Result<()> {
        self.mutate(|stack| {
            for (key, _) in &patches {
                stack.require(key)?;
            }
            for (key, patch) in patches {
                if let Some(modal) = stack.modals.get_mut(&key) {
                    modal.props.extend(patch);
                }
            }
            Ok(())
        })
    }

    /// Push new modals and merge props into already open ones.
    pub fn upsert(&self, modals: Vec<Modal>) {
        let result = self.mutate(|stack| {
            for modal in modals {
                match stack.modals.get_mut(&modal.key) {
                    Some(existing) => existing.props.extend(modal.props),
                    None => stack.insert(modal),
                }
            }
            Ok(())
        });
        debug_assert!(result.is_ok());
    }

    /// Replace the active modal with `modal`, as a pop followed by a push.
    pub fn swap_active(&self, modal: Modal) -> Result<()> {
        self.mutate(|stack| {
            let active = stack.active_key().map(str::to_string);
            if active.as_deref() != Some(modal.key.as_str()) {
                stack.check_new_keys([modal.key.as_str()])?;
            }
            if let Some(key) = &active {
                stack.remove(key);
            }
            let same_key = active.as_deref() == Some(modal.key.as_str());
            stack.insert(modal);
            if same_key {
                stack.active_version += 1;
            }
            Ok(())
        })
    }

    /// Close the active modal and run its exit callback.
    pub fn close_active(&self) -> Option<Modal> {
        let mut closed = None;
        let result = self.mutate(|stack| {
            let key = stack
                .active_key()
                .map(str::to_string)
                .ok_or_else(|| DarkroomError::UnknownModal("<active>".to_string()))?;
            closed = stack.remove(&key);
            Ok(())
        });
        if result.is_err() {
            return None;
        }

        // Runs outside the state lock so the callback may use the registry.
        if let Some(callback) = closed.as_ref().and_then(|m| m.on_exit.clone()) {
            callback();
        }
        closed
    }

    fn mutate<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&mut ModalStack) -> Result<()>,
    {
        let mut outcome = Ok(());
        self.state.send_if_modified(|stack| {
            let before = stack.active_key().map(str::to_string);
            let active_version = stack.active_version;
            if let Err(e) = f(stack) {
                outcome = Err(e);
                return false;
            }
            stack.version += 1;
            if stack.active_version == active_version && stack.active_key() != before.as_deref() {
                stack.active_version += 1;
            }
            true
        });
        if let Err(e) = &outcome {
            tracing::debug!(error = %e, "Modal registry unchanged");
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn modal(key: &str) -> Modal {
        Modal::new(key, "Dialog")
    }

    #[test]
    fn test_push_duplicate_fails() {
        let registry = ModalRegistry::new();
        registry.push(vec![modal("m1")]).unwrap();
        crate::assert_err_variant!(registry.push(vec![modal("m1")]), DarkroomError::DuplicateModal(_));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_push_is_all_or_nothing() {
        let registry = ModalRegistry::new();
        registry.push(vec![modal("m1")]).unwrap();
        assert!(registry.push(vec![modal("m2"), modal("m1")]).is_err());
        assert!(registry.push(vec![modal("m3"), modal("m3")]).is_err());
        assert_eq!(registry.snapshot().keys(), ["m1".to_string()]);
    }

    #[test]
    fn test_delete_missing_fails() {
        let registry = ModalRegistry::new();
        registry.push(vec![modal("m1")]).unwrap();
        registry.delete(&["m1"]).unwrap();
        crate::assert_err_variant!(registry.delete(&["m1"]), DarkroomError::UnknownModal(_));
    }

    #[test]
    fn test_active_follows_push_and_delete() {
        let registry = ModalRegistry::new();
        assert_eq!(registry.active_key(), None);
        registry.push(vec![modal("m1")]).unwrap();
        registry.push(vec![modal("m2")]).unwrap();
        assert_eq!(registry.active_key().as_deref(), Some("m2"));

        registry.delete(&["m2"]).unwrap();
        assert_eq!(registry.active_key().as_deref(), Some("m1"));
    }

    #[test]
    fn test_update_merges_props() {
        let registry = ModalRegistry::new();
        registry
            .push(vec![modal("share").with_prop("gallery", json!("g1")).with_prop("mode", json!("view"))])
            .unwrap();

        let patch = json!({ "mode": "edit" }).as_object().cloned().unwrap();
        registry.update(vec![("share".to_string(), patch.clone())]).unwrap();
        let props = registry.get("share").unwrap().props;
        assert_eq!(props["gallery"], "g1");
        assert_eq!(props["mode"], "edit");

        crate::assert_err_variant!(
            registry.update(vec![("missing".to_string(), patch)]),
            DarkroomError::UnknownModal(_)
        );
    }

    #[test]
    fn test_upsert_never_fails() {
        let registry = ModalRegistry::new();
        registry.upsert(vec![modal("m1").with_prop("a", json!(1))]);
        registry.upsert(vec![modal("m1").with_prop("b", json!(2)), modal("m2")]);

        assert_eq!(registry.len(), 2);
        let props = registry.get("m1").unwrap().props;
        assert_eq!(props["a"], 1);
        assert_eq!(props["b"], 2);
    }

    #[test]
    fn test_versions_track_visible_modal() {
        let registry = ModalRegistry::new();
        registry.push(vec![modal("m1"), modal("m2")]).unwrap();
        let (version, active_version) = (registry.version(), registry.active_version());

        // Changing a modal below the top does not change what is visible.
        registry
            .update(vec![("m1".to_string(), Map::from_iter([("x".to_string(), json!(1))]))])
            .unwrap();
        assert_eq!(registry.version(), version + 1);
        assert_eq!(registry.active_version(), active_version);

        registry.delete(&["m2"]).unwrap();
        assert_eq!(registry.active_version(), active_version + 1);
    }

    #[test]
    fn test_swap_active() {
        let registry = ModalRegistry::new();
        registry.push(vec![modal("login"), modal("otp")]).unwrap();

        registry.swap_active(modal("reset")).unwrap();
        assert_eq!(registry.snapshot().keys(), ["login".to_string(), "reset".to_string()]);

        let before = registry.active_version();
        registry.swap_active(modal("reset").with_prop("step", json!(2))).unwrap();
        assert_eq!(registry.active_version(), before + 1);
        assert_eq!(registry.active().unwrap().props["step"], 2);

        // Swapping in a key that is open below the top fails and changes nothing.
        assert!(registry.swap_active(modal("login")).is_err());
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_close_active_runs_exit_callback() {
        let registry = ModalRegistry::new();
        let exits = Arc::new(AtomicUsize::new(0));
        let counter = exits.clone();
        registry
            .push(vec![modal("m1").on_exit(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            })])
            .unwrap();

        let closed = registry.close_active().unwrap();
        assert_eq!(closed.key, "m1");
        assert_eq!(exits.load(Ordering::SeqCst), 1);
        assert!(registry.close_active().is_none());
    }
}

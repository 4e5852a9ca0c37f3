use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::error::{DarkroomError, Result};

/// Message set when the availability predicate rejects a value.
pub const NOT_AVAILABLE: &str = "Not available";

/// Default delay between the last change and the availability check.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);

/// A value a [`ValidatedInput`] can hold.
///
/// Text rules apply to values with a text form, numeric rules to values with
/// a numeric form.
pub trait InputValue: Clone + PartialEq + Default + fmt::Debug + Send + Sync + 'static {
    fn as_text(&self) -> Option<&str> {
        None
    }

    fn as_number(&self) -> Option<f64> {
        None
    }
}

impl InputValue for String {
    fn as_text(&self) -> Option<&str> {
        Some(self)
    }
}

macro_rules! numeric_input_value {
    ($($ty:ty),*) => {
        $(
            impl InputValue for $ty {
                fn as_number(&self) -> Option<f64> {
                    Some(*self as f64)
                }
            }
        )*
    };
}

numeric_input_value!(i32, i64, u32, u64, usize, f32, f64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputStatus {
    Valid,
    Invalid,
    Loading,
}

/// Current value of an input and what is known about it.
#[derive(Debug, Clone, PartialEq)]
pub struct InputState<T> {
    pub value: T,
    pub status: InputStatus,
    /// Set only when `status` is `Invalid`.
    pub error: Option<String>,
}

/// Custom validity check, run after the built-in rules.
pub type Validator<T> = Arc<dyn Fn(&T) -> std::result::Result<(), String> + Send + Sync>;

/// Future returned by an availability check.
pub type AvailabilityFuture = Pin<Box<dyn Future<Output = bool> + Send>>;

/// Async predicate deciding whether a valid value is still available.
pub type AvailabilityCheck<T> = Arc<dyn Fn(T) -> AvailabilityFuture + Send + Sync>;

/// Synchronous validity rules. All configured rules must pass.
pub struct InputRules<T> {
    pub min_length: Option<usize>,
    pub max_length: Option<usize>,
    pub pattern: Option<Regex>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub validator: Option<Validator<T>>,
}

impl<T> Default for InputRules<T> {
    fn default() -> Self {
        Self {
            min_length: None,
            max_length: None,
            pattern: None,
            min: None,
            max: None,
            validator: None,
        }
    }
}

impl<T> Clone for InputRules<T> {
    fn clone(&self) -> Self {
        Self {
            min_length: self.min_length,
            max_length: self.max_length,
            pattern: self.pattern.clone(),
            min: self.min,
            max: self.max,
            validator: self.validator.clone(),
        }
    }
}

impl<T> fmt::Debug for InputRules<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InputRules")
            .field("min_length", &self.min_length)
            .field("max_length", &self.max_length)
            .field("pattern", &self.pattern.as_ref().map(Regex::as_str))
            .field("min", &self.min)
            .field("max", &self.max)
            .field("validator", &self.validator.is_some())
            .finish()
    }
}

impl<T: InputValue> InputRules<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// A one-time code of exactly `length` digits.
    pub fn otp(length: usize) -> Self {
        Self::new()
            .length(length, length)
            .digits_only()
    }

    pub fn username() -> Self {
        let rules = Self::new().length(3, 32);
        Self {
            pattern: Regex::new(r"^[A-Za-z0-9_.-]+$").ok(),
            ..rules
        }
    }

    pub fn password() -> Self {
        Self::new().length(8, 128)
    }

    pub fn length(mut self, min: usize, max: usize) -> Self {
        self.min_length = Some(min);
        self.max_length = Some(max);
        self
    }

    pub fn range(mut self, min: f64, max: f64) -> Self {
        self.min = Some(min);
        self.max = Some(max);
        self
    }

    /// Require the text form to match `pattern`.
    pub fn pattern(mut self, pattern: &str) -> Result<Self> {
        let regex = Regex::new(pattern).map_err(|e| {
            DarkroomError::InvalidArgument(format!("Invalid pattern '{}': {}", pattern, e))
        })?;
        self.pattern = Some(regex);
        Ok(self)
    }

    pub fn validator<F>(mut self, validator: F) -> Self
    where
        F: Fn(&T) -> std::result::Result<(), String> + Send + Sync + 'static,
    {
        self.validator = Some(Arc::new(validator));
        self
    }

    fn digits_only(self) -> Self {
        Self {
            pattern: Regex::new(r"^[0-9]*$").ok(),
            ..self
        }
    }

    /// Run the built-in rules, then the custom validator.
    pub fn validate(&self, value: &T) -> std::result::Result<(), String> {
        if let Some(text) = value.as_text() {
            let length = text.chars().count();
            if let Some(min) = self.min_length {
                if length < min {
                    return Err(format!("Must be at least {} characters", min));
                }
            }
            if let Some(max) = self.max_length {
                if length > max {
                    return Err(format!("Must be at most {} characters", max));
                }
            }
            if let Some(pattern) = &self.pattern {
                if !pattern.is_match(text) {
                    return Err("Invalid format".to_string());
                }
            }
        }

        if let Some(number) = value.as_number() {
            if let Some(min) = self.min {
                if number < min {
                    return Err(format!("Must be at least {}", min));
                }
            }
            if let Some(max) = self.max {
                if number > max {
                    return Err(format!("Must be at most {}", max));
                }
            }
        }

        match &self.validator {
            Some(validator) => validator(value),
            None => Ok(()),
        }
    }
}

/// Input field state machine: `Valid`, `Invalid` or `Loading`.
///
/// Each [`set_value`](Self::set_value) validates synchronously. A valid value
/// with an availability check configured moves to `Loading` and arms a
/// debounced check; only the last value of a burst is checked. Any newer
/// value, [`cancel`](Self::cancel) or drop invalidates the pending check so it
/// never writes state.
pub struct ValidatedInput<T: InputValue> {
    rules: InputRules<T>,
    availability: Option<AvailabilityCheck<T>>,
    debounce: Duration,
    state: Arc<watch::Sender<InputState<T>>>,
    generation: Arc<AtomicU64>,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl<T: InputValue> ValidatedInput<T> {
    /// An input without rules or availability check.
    pub fn new(initial: T) -> Self {
        Self::builder(initial).build()
    }

    pub fn builder(initial: T) -> ValidatedInputBuilder<T> {
        ValidatedInputBuilder {
            initial,
            rules: InputRules::default(),
            availability: None,
            debounce: DEFAULT_DEBOUNCE,
        }
    }

    pub fn state(&self) -> InputState<T> {
        self.state.borrow().clone()
    }

    pub fn value(&self) -> T {
        self.state.borrow().value.clone()
    }

    pub fn status(&self) -> InputStatus {
        self.state.borrow().status
    }

    pub fn subscribe(&self) -> watch::Receiver<InputState<T>> {
        self.state.subscribe()
    }

    pub fn rules(&self) -> &InputRules<T> {
        &self.rules
    }

    /// Change the value and run the transitions.
    ///
    /// # Panics
    ///
    /// Arming an availability check spawns a task. Panics when a valid value
    /// reaches an input with a check outside a tokio runtime.
    pub fn set_value(&self, value: T) {
        self.cancel();

        if let Err(message) = self.rules.validate(&value) {
            self.state.send_replace(InputState {
                value,
                status: InputStatus::Invalid,
                error: Some(message),
            });
            return;
        }

        let Some(check) = self.availability.clone() else {
            self.state.send_replace(InputState {
                value,
                status: InputStatus::Valid,
                error: None,
            });
            return;
        };

        self.state.send_replace(InputState {
            value: value.clone(),
            status: InputStatus::Loading,
            error: None,
        });
        self.arm(check, value);
    }

    /// Invalidate any pending availability check. The state is left as is.
    pub fn cancel(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        let pending = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = pending {
            handle.abort();
        }
    }

    fn arm(&self, check: AvailabilityCheck<T>, value: T) {
        let generation = self.generation.load(Ordering::SeqCst);
        let latest = self.generation.clone();
        let state = self.state.clone();
        let debounce = self.debounce;

        tracing::debug!(?value, debounce_ms = debounce.as_millis() as u64, "Availability check armed");
        let handle = tokio::spawn(async move {
            tokio::time::sleep(debounce).await;
            if latest.load(Ordering::SeqCst) != generation {
                return;
            }
            let available = check(value).await;
            state.send_if_modified(|current| {
                if latest.load(Ordering::SeqCst) != generation {
                    return false;
                }
                if available {
                    current.status = InputStatus::Valid;
                    current.error = None;
                } else {
                    current.status = InputStatus::Invalid;
                    current.error = Some(NOT_AVAILABLE.to_string());
                }
                true
            });
        });

        *self.pending.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
    }
}

impl<T: InputValue> Drop for ValidatedInput<T> {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl<T: InputValue> fmt::Debug for ValidatedInput<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidatedInput")
            .field("state", &*self.state.borrow())
            .field("rules", &self.rules)
            .field("availability", &self.availability.is_some())
            .field("debounce", &self.debounce)
            .finish()
    }
}

/// Builder for [`ValidatedInput`].
pub struct ValidatedInputBuilder<T: InputValue> {
    initial: T,
    rules: InputRules<T>,
    availability: Option<AvailabilityCheck<T>>,
    debounce: Duration,
}

impl<T: InputValue> ValidatedInputBuilder<T> {
    pub fn rules(mut self, rules: InputRules<T>) -> Self {
        self.rules = rules;
        self
    }

    /// Check availability of every valid value after the debounce interval.
    pub fn availability<F, Fut>(mut self, check: F) -> Self
    where
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = bool> + Send + 'static,
    {
        let check: AvailabilityCheck<T> =
            Arc::new(move |value: T| -> AvailabilityFuture { Box::pin(check(value)) });
        self.availability = Some(check);
        self
    }

    pub fn debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// The input starts `Valid` with the initial value.
    pub fn build(self) -> ValidatedInput<T> {
        let (state, _) = watch::channel(InputState {
            value: self.initial,
            status: InputStatus::Valid,
            error: None,
        });
        ValidatedInput {
            rules: self.rules,
            availability: self.availability,
            debounce: self.debounce,
            state: Arc::new(state),
            generation: Arc::new(AtomicU64::new(0)),
            pending: Mutex::new(None),
        }
    }
}

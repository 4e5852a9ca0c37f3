//! Form input validation.

mod validated;

pub use validated::{
    AvailabilityCheck, AvailabilityFuture, InputRules, InputState, InputStatus, InputValue,
    ValidatedInput, ValidatedInputBuilder, Validator, DEFAULT_DEBOUNCE, NOT_AVAILABLE,
};

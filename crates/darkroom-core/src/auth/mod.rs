//! Client-side session state.

mod session;
mod store;

pub use session::{AccessToken, AuthState, User};
pub use store::{AuthStore, SESSION_RESPONSE_KEY};

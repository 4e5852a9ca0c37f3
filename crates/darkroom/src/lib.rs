//! darkroom: client plumbing for the photo gallery.
//!
//! Loads the shared and frontend configuration, builds typed services from
//! OpenAPI documents, and keeps the session, modal and toast state that the
//! gallery screens observe.

mod app;

#[doc(hidden)]
pub use darkroom_core;

pub use darkroom_codegen as codegen;

// Assertion macros are `#[macro_export]`ed at the darkroom_core root.
#[cfg(feature = "testing")]
pub use darkroom_core::{assert_err, assert_err_variant, assert_ok};

pub use app::prelude;
pub use app::{Darkroom, DarkroomBuilder};

//! Test support for darkroom applications.
//!
//! - [`MockHttp`]: an [`HttpTransport`](crate::api::HttpTransport) answering
//!   from canned responses, with per-response delays for ordering tests.
//! - `assert_ok!`, `assert_err!` and `assert_err_variant!` macros plus JSON
//!   matching helpers.
//!
//! Enabled for this crate's own tests and, for downstream crates, through the
//! `testing` feature.

pub mod assertions;
pub mod mock_http;

pub use assertions::*;
pub use mock_http::{MockHttp, MockHttpBuilder, MockRequest, MockResponse};

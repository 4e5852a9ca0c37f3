//! Typed access to backend operations.
//!
//! [`ServiceFactory`] turns an OpenAPI operation into a [`Service`]; an
//! [`ApiCall`] wraps a service with loading state and stale-response
//! protection.

mod call;
mod client;
mod service;
mod transport;

pub use call::{ApiCall, CallSnapshot};
pub use client::{ApiClient, SessionHook};
pub use service::{ApiError, ApiResult, RequestInit, ResponseMeta, Service, ServiceFactory};
pub use transport::{
    HttpRequest, HttpResponse, HttpTransport, ReqwestTransport, TransportError, TransportFuture,
};

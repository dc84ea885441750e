//! Shared plumbing for the rauncher provisioning crates.
//!
//! `rc-auth` and `rc-download` never talk to `reqwest` directly. They depend on
//! the [`HttpSender`] trait defined here, so the transport can be swapped for a
//! scripted one in tests or for a differently configured client in production.
//!
//! JSON (de)serialization goes through serde: request bodies are encoded with
//! [`HttpRequest::json`] and responses decoded with [`HttpResponse::json`].

pub mod error;
pub mod http;
pub mod logging;
pub mod reqwest_sender;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use error::{HttpError, Result};
pub use http::{BodyStream, HttpRequest, HttpResponse, HttpSender, Method};
pub use reqwest_sender::{HttpConfig, ReqwestSender};

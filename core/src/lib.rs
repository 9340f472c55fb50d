//! Client for the RedForester mind-mapping REST API.
//!
//! # Overview
//! Authenticate with a [`Session`], then read and modify users, maps and
//! nodes through the repositories of a [`Client`]. Entities remember which
//! fields were assigned since they were fetched; updates send only those
//! fields, and several updates travel to the server as one `/api/batch` call.
//!
//! # Design
//! - `Request`, `Action` and `Sequence` build plain `HttpRequest` values;
//!   a [`Transport`] executes them. The default transport uses `reqwest`.
//! - Repository calls perform at most one HTTP exchange, and none at all
//!   when there is nothing to send.
//! - Every operation is `async`; [`blocking::Client`] drives the same
//!   operations on its own runtime for synchronous callers.
//! - Failures are typed ([`ApiError`]) and also logged through `tracing`.

pub mod action;
pub mod blocking;
pub mod client;
pub mod config;
pub mod entity;
pub mod error;
pub mod http;
pub mod logging;
pub mod maps;
pub mod nodes;
pub mod session;
pub mod transport;
pub mod types;
pub mod users;

pub use action::{Action, BatchStep, Request, Sequence};
pub use client::Client;
pub use config::{Environment, ServerConfig};
pub use entity::{Changes, Entity};
pub use error::{ApiError, ApiResult};
pub use http::{HttpMethod, HttpRequest, HttpResponse};
pub use session::{password_digest, Session};
pub use transport::{ReqwestTransport, Transport};
pub use types::{Map, Node, NodeDraft, Position, Properties, PropertyChanges, PropertyUpdate, User};

//! Data-access core for the clinic records API.
//!
//! UI code describes what it needs through [`bindings::Bindings`]; the
//! resulting descriptors are run by a cache engine such as
//! [`cache::QueryClient`]. Every network call goes through
//! [`client::ApiClient`], which attaches the session credential and tears the
//! session down on 401.

pub mod api;
pub mod app;
pub mod bindings;
pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod navigation;
pub mod params;
pub mod pipeline;
pub mod session;
pub mod storage;
pub mod transport;

pub use error::{ApiError, ApiResult};

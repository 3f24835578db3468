//! HTTP client for signed partner-service calls.
//!
//! Built on the pure protocol logic of the [`partnerlink`] crate, this crate
//! adds the I/O: a registry of service configs, the Api and call-descriptor
//! capabilities, event sinks, the instrumented request body, the lazy
//! result reader and the shared pooled transport.
//!
//! # Crate layout
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | [`ServiceConfig`], [`TransportConfig`] and their environment loaders |
//! | [`registry`] | [`ConfigRegistry`], the name-keyed config store |
//! | [`api`] | [`RestApi`], [`RestBuild`], [`CheckResult`], [`CallContext`], [`CallerInfo`] |
//! | [`event`] | [`RestEvent`] sinks and the fire-once [`EventHandle`] |
//! | [`body`] | [`RequestReader`], the instrumented outbound body |
//! | [`result`] | [`RestResult`], the lazy reader with a sticky error |
//! | [`app`] | [`AppCall`], the signed app-protocol descriptor |
//! | [`client`] | [`RestClientManager`], [`RestClient`] and [`CallHandle`] |
//! | [`logging`] | `tracing` subscriber bootstrap |
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::collections::HashMap;
//! use std::sync::Arc;
//!
//! use partnerlink::{CallKey, Error};
//! use partnerlink_client::{
//!     AppCall, CallContext, RestApi, RestBuild, RestClientManager, ServiceConfig,
//! };
//!
//! const DETAIL: CallKey = 1;
//!
//! struct Orders;
//!
//! impl RestApi for Orders {
//!     fn config_name(&self, _ctx: &CallContext) -> Result<String, Error> {
//!         Ok("orders".into())
//!     }
//!
//!     fn calls(&self, _ctx: &CallContext) -> Result<HashMap<CallKey, Arc<dyn RestBuild>>, Error> {
//!         let mut calls: HashMap<CallKey, Arc<dyn RestBuild>> = HashMap::new();
//!         calls.insert(DETAIL, Arc::new(AppCall::post("/router/rest", "order.detail")));
//!         Ok(calls)
//!     }
//! }
//!
//! # async fn run() -> Result<(), Error> {
//! let manager = RestClientManager::new()?;
//! manager.set_config(ServiceConfig::new("orders", "app-key", "app-secret", "https://partner.example.com"));
//!
//! let client = manager.api(Arc::new(Orders));
//! let mut result = client.call(&CallContext::new(), DETAIL, serde_json::json!({"id": "111"})).await;
//! let status = result.get_data("status").await?;
//! println!("order status: {status}");
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod app;
pub mod body;
pub mod client;
pub mod config;
pub mod event;
pub mod logging;
pub mod registry;
pub mod result;

pub use api::{CallContext, CallerInfo, CheckResult, EnvelopeCheck, Payload, RestApi, RestBuild};
pub use app::{AppCall, PreparedRequest};
pub use body::RequestReader;
pub use client::{CallHandle, RestClient, RestClientManager};
pub use config::{ConfigError, EventFactory, ServiceConfig, TransportConfig};
pub use event::{CallRecord, EventHandle, NoopEvent, RecordingEvent, RestEvent, TracingEvent};
pub use registry::ConfigRegistry;
pub use result::RestResult;

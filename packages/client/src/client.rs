//! Client manager, per-Api clients and the completion handle of a call.
//!
//! [`RestClientManager`] owns what every call shares: the config registry
//! and one pooled `reqwest::Client`. [`RestClientManager::api`] binds an
//! Api to those shared parts; [`RestClient::call`] starts one call on its
//! own task and returns a [`CallHandle`] that yields exactly one
//! [`RestResult`].

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use partnerlink::{CallKey, Error, ProtocolError};
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::api::{CallContext, CallerInfo, Payload, RestApi};
use crate::config::{ServiceConfig, TransportConfig};
use crate::event::EventHandle;
use crate::registry::ConfigRegistry;
use crate::result::RestResult;

// ---------------------------------------------------------------------------
// RestClientManager
// ---------------------------------------------------------------------------

/// Shared state of all partner calls in a process.
#[derive(Clone)]
pub struct RestClientManager {
    registry: ConfigRegistry,
    http: reqwest::Client,
    transport: TransportConfig,
}

impl fmt::Debug for RestClientManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RestClientManager")
            .field("registry", &self.registry.names())
            .field("transport", &self.transport)
            .finish()
    }
}

impl RestClientManager {
    /// A manager with the default transport settings.
    pub fn new() -> Result<Self, Error> {
        Self::with_transport(TransportConfig::default())
    }

    pub fn with_transport(transport: TransportConfig) -> Result<Self, Error> {
        let http = transport.build_client().map_err(Error::transport)?;
        Ok(Self {
            registry: ConfigRegistry::new(),
            http,
            transport,
        })
    }

    /// Register a service config under its name.
    pub fn set_config(&self, config: ServiceConfig) -> &Self {
        self.registry.register(config);
        self
    }

    pub fn registry(&self) -> &ConfigRegistry {
        &self.registry
    }

    pub fn transport(&self) -> &TransportConfig {
        &self.transport
    }

    /// Bind `api` to the shared registry and transport.
    pub fn api(&self, api: Arc<dyn RestApi>) -> RestClient {
        RestClient {
            api,
            registry: self.registry.clone(),
            http: self.http.clone(),
            response_header_timeout: self.transport.response_header_timeout,
        }
    }
}

// ---------------------------------------------------------------------------
// RestClient
// ---------------------------------------------------------------------------

/// One Api bound to the shared transport. Cheap to clone.
#[derive(Clone)]
pub struct RestClient {
    api: Arc<dyn RestApi>,
    registry: ConfigRegistry,
    http: reqwest::Client,
    response_header_timeout: Duration,
}

impl fmt::Debug for RestClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RestClient")
            .field("response_header_timeout", &self.response_header_timeout)
            .finish_non_exhaustive()
    }
}

impl RestClient {
    pub fn api(&self) -> &dyn RestApi {
        self.api.as_ref()
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// Deadline for response headers when the descriptor sets none.
    pub fn response_header_timeout(&self) -> Duration {
        self.response_header_timeout
    }

    /// Resolve the service config the Api names for `ctx`.
    pub fn config(&self, ctx: &CallContext) -> Result<Arc<ServiceConfig>, Error> {
        let name = self.api.config_name(ctx)?;
        Ok(self.registry.get(&name)?)
    }

    /// Start the call bound to `key`.
    ///
    /// An unknown key resolves the handle immediately, without any I/O.
    /// Otherwise the call runs on a new tokio task, so this must be called
    /// from within a runtime.
    #[track_caller]
    pub fn call<P>(&self, ctx: &CallContext, key: CallKey, payload: P) -> CallHandle
    where
        P: Serialize + Send + Sync + 'static,
    {
        let caller = CallerInfo::capture();
        let build = match self.api.calls(ctx).and_then(|calls| {
            calls
                .get(&key)
                .cloned()
                .ok_or_else(|| ProtocolError::CallNotFound(key).into())
        }) {
            Ok(build) => build,
            Err(err) => {
                warn!("partner call: key {key} from {caller}: {err}");
                return CallHandle::ready(RestResult::from_error(err, EventHandle::noop()));
            }
        };

        debug!("partner call: key {key} started from {caller}");
        let client = self.clone();
        let ctx = ctx.clone();
        let payload = Payload::new(payload);
        CallHandle::spawned(tokio::spawn(async move {
            build.build_request(&ctx, &client, &payload, &caller).await
        }))
    }
}

// ---------------------------------------------------------------------------
// CallHandle
// ---------------------------------------------------------------------------

enum HandleState {
    Ready(Option<RestResult>),
    Running(JoinHandle<RestResult>),
}

/// Completion handle of one call. Resolves to exactly one [`RestResult`].
///
/// Dropping the handle does not cancel the call; use the context's
/// cancellation token for that.
///
/// # Panics
///
/// Like any future, the handle must not be polled again after it has
/// resolved. Doing so panics.
pub struct CallHandle {
    state: HandleState,
}

impl CallHandle {
    fn ready(result: RestResult) -> Self {
        Self {
            state: HandleState::Ready(Some(result)),
        }
    }

    fn spawned(handle: JoinHandle<RestResult>) -> Self {
        Self {
            state: HandleState::Running(handle),
        }
    }
}

impl fmt::Debug for CallHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &self.state {
            HandleState::Ready(_) => "ready",
            HandleState::Running(_) => "running",
        };
        f.debug_struct("CallHandle").field("state", &state).finish()
    }
}

impl Future for CallHandle {
    type Output = RestResult;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<RestResult> {
        match &mut self.state {
            HandleState::Ready(result) => {
                Poll::Ready(result.take().expect("CallHandle polled after completion"))
            }
            HandleState::Running(handle) => match Pin::new(handle).poll(cx) {
                Poll::Pending => Poll::Pending,
                Poll::Ready(Ok(result)) => Poll::Ready(result),
                Poll::Ready(Err(join_err)) => {
                    warn!("partner call: task failed: {join_err}");
                    Poll::Ready(RestResult::from_error(
                        Error::transport(join_err),
                        EventHandle::noop(),
                    ))
                }
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

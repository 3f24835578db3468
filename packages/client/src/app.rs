//! [`AppCall`]: the signed app-protocol call descriptor.
//!
//! A call runs these stages, any of which can end it with an error result:
//!
//! 1. resolve the service config named by the Api;
//! 2. marshal the payload to JSON and fetch the optional token;
//! 3. build and sign the canonical parameter set;
//! 4. place the signed parameters in the URL (GET) or a form body;
//! 5. send, bounded by the per-call response-header deadline and the
//!    context's cancellation token.

use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use partnerlink::encoding::append_query;
use partnerlink::signing::timestamp_now;
use partnerlink::{AppParams, Error};
use reqwest::header::CONTENT_TYPE;
use reqwest::Method;
use tracing::{debug, field, info_span, warn, Instrument, Span};

use crate::api::{CallContext, CallerInfo, CheckResult, EnvelopeCheck, Payload, RestBuild};
use crate::body::RequestReader;
use crate::client::RestClient;
use crate::config::ServiceConfig;
use crate::event::EventHandle;
use crate::result::RestResult;

pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// JSON path of the payload inside an app-protocol response.
pub const DEFAULT_BASE_PATH: &str = "response";

/// Descriptor of one app-protocol operation.
#[derive(Debug, Clone)]
pub struct AppCall {
    /// Appended to the config's base URL.
    pub path: String,
    pub http_method: Method,
    /// How the signed parameters travel; defaults to `http_method`. `GET`
    /// puts them in the query string, anything else in a form body.
    pub param_method: Option<Method>,
    /// Logical method name, sent as the `method` parameter.
    pub method: String,
    /// Overrides the transport's response-header deadline for this call.
    pub timeout: Option<Duration>,
    /// Root of JSON extraction on the result.
    pub base_path: String,
    pub check_envelope: bool,
}

impl AppCall {
    pub fn new(http_method: Method, path: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            http_method,
            param_method: None,
            method: method.into(),
            timeout: None,
            base_path: DEFAULT_BASE_PATH.to_string(),
            check_envelope: true,
        }
    }

    pub fn get(path: impl Into<String>, method: impl Into<String>) -> Self {
        Self::new(Method::GET, path, method)
    }

    pub fn post(path: impl Into<String>, method: impl Into<String>) -> Self {
        Self::new(Method::POST, path, method)
    }

    pub fn param_method(mut self, method: Method) -> Self {
        self.param_method = Some(method);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn base_path(mut self, base_path: impl Into<String>) -> Self {
        self.base_path = base_path.into();
        self
    }

    pub fn without_envelope_check(mut self) -> Self {
        self.check_envelope = false;
        self
    }

    fn transmission(&self) -> &Method {
        self.param_method.as_ref().unwrap_or(&self.http_method)
    }

    /// Sign the parameters and lay out the request. Pure apart from its
    /// inputs, so the wire form can be checked without a clock.
    pub fn prepare(
        &self,
        config: &ServiceConfig,
        content: String,
        token: Option<String>,
        timestamp: String,
    ) -> PreparedRequest {
        let params = AppParams::new(
            config.app_key.as_str(),
            self.method.as_str(),
            timestamp,
            content,
            token,
        );
        let wire = params.canonical().signed_encoding(&config.app_secret);
        let url = format!("{}{}", config.base_url, self.path);
        if *self.transmission() == Method::GET {
            PreparedRequest {
                url: append_query(&url, &wire),
                body: None,
            }
        } else {
            PreparedRequest {
                url,
                body: Some(wire),
            }
        }
    }

    async fn execute(&self, ctx: &CallContext, client: &RestClient, payload: &Payload) -> RestResult {
        let config = match client.config(ctx) {
            Ok(config) => config,
            Err(err) => {
                warn!("partner call: {err}");
                return RestResult::from_error(err, EventHandle::noop());
            }
        };
        Span::current().record("config", config.name.as_str());
        let event = EventHandle::new(config.new_event(ctx));

        let prepared = match self.stage(ctx, client, &config, payload) {
            Ok(prepared) => prepared,
            Err(err) => {
                warn!("partner call: request not built: {err}");
                return RestResult::from_error(err, event);
            }
        };

        event.request_start(&self.http_method, &prepared.url);
        debug!("partner call: {} {}{}", self.http_method, config.base_url, self.path);

        let mut request = client.http().request(self.http_method.clone(), &prepared.url);
        if let Some(body) = prepared.body {
            let reader = RequestReader::new(Some(Cursor::new(body.into_bytes())), event.clone());
            request = request
                .header(CONTENT_TYPE, FORM_CONTENT_TYPE)
                .body(reader.into_body());
        }

        let deadline = self.timeout.unwrap_or(client.response_header_timeout());
        let sent = tokio::select! {
            _ = ctx.cancellation().cancelled() => Err(Error::transport_msg("partner call cancelled")),
            sent = tokio::time::timeout(deadline, request.send()) => match sent {
                Ok(Ok(response)) => Ok(response),
                Ok(Err(err)) => Err(Error::transport(err)),
                Err(_) => Err(Error::transport_msg(format!(
                    "timed out after {deadline:?} waiting for response headers"
                ))),
            },
        };

        match sent {
            Ok(response) => {
                debug!("partner call: response status {}", response.status());
                RestResult::from_response(response, self.base_path.as_str(), self.checker(), event)
            }
            Err(err) => {
                warn!("partner call: {err}");
                RestResult::from_error(err, event)
            }
        }
    }

    fn stage(
        &self,
        ctx: &CallContext,
        client: &RestClient,
        config: &ServiceConfig,
        payload: &Payload,
    ) -> Result<PreparedRequest, Error> {
        config.ensure_complete()?;
        let content = payload.to_json()?;
        let token = client.api().token(ctx)?;
        Ok(self.prepare(config, content, token, timestamp_now()))
    }
}

/// The wire form of a signed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedRequest {
    /// Full URL, carrying the signed query for GET transmission.
    pub url: String,
    /// Form-encoded parameters for non-GET transmission.
    pub body: Option<String>,
}

#[async_trait]
impl RestBuild for AppCall {
    async fn build_request(
        &self,
        ctx: &CallContext,
        client: &RestClient,
        payload: &Payload,
        caller: &CallerInfo,
    ) -> RestResult {
        let span = info_span!(
            "partner_call",
            config = field::Empty,
            method = %self.method,
            http_method = %self.http_method,
            caller = %caller,
        );
        self.execute(ctx, client, payload).instrument(span).await
    }

    fn checker(&self) -> Option<Arc<dyn CheckResult>> {
        if self.check_envelope {
            Some(Arc::new(EnvelopeCheck))
        } else {
            None
        }
    }
}

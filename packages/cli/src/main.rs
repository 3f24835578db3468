//! `plink`: command-line interface for the partner app protocol.
//!
//! Provides three subcommands:
//!
//! - **`sign`** prints the canonical parameter string and signature of a
//!   request, without any network access.
//! - **`extract`** reads a response body from a file or stdin and prints the
//!   value at a JSON path, optionally checked against a validation tag.
//! - **`call`** performs one signed call against a service configured
//!   through `PARTNERLINK_<NAME>_*` environment variables.
//!
//! Logging goes to stderr and is controlled by `RUST_LOG`.

use std::collections::HashMap;
use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use partnerlink::signing::{timestamp_now, SIGN};
use partnerlink::{AppParams, CallKey, Error, JsonKey, JsonResult};
use partnerlink_client::{
    logging, AppCall, CallContext, RestApi, RestBuild, RestClientManager, ServiceConfig,
    TracingEvent, TransportConfig,
};
use reqwest::Method;

/// plink: partner app protocol CLI
///
/// Sign requests, inspect response bodies and make signed calls.
#[derive(Parser)]
#[command(name = "plink", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the canonical parameter string, its signature and the on-wire
    /// form of a request.
    ///
    /// Examples:
    ///   plink sign -k hjx -s "$SECRET" -m detail -c '{"id":"111"}'
    ///   plink sign -k hjx -s "$SECRET" -m detail -c - --timestamp "2024-01-02 03:04:05"
    Sign {
        /// App key sent as `app_key`.
        #[arg(short = 'k', long, env = "PARTNERLINK_APP_KEY")]
        app_key: String,

        /// Shared signing secret.
        #[arg(short = 's', long, env = "PARTNERLINK_APP_SECRET", hide_env_values = true)]
        secret: String,

        /// Logical method name.
        #[arg(short = 'm', long)]
        method: String,

        /// JSON payload, or `-` for stdin.
        #[arg(short = 'c', long, default_value = "{}")]
        content: String,

        /// Timestamp to sign; defaults to the current local time.
        #[arg(long, value_name = "YYYY-MM-DD HH:MM:SS")]
        timestamp: Option<String>,

        /// Optional auth token.
        #[arg(long)]
        token: Option<String>,
    },

    /// Print the value at a JSON path of a response body.
    ///
    /// Exits 1 when the value fails its tag.
    ///
    /// Pass `-` as FILE to read from stdin.
    Extract {
        /// Path to a JSON file, or `-` for stdin.
        file: PathBuf,

        /// Dot-separated path; empty selects the whole body.
        #[arg(short = 'p', long, default_value = "")]
        path: String,

        /// Base path the path is joined to.
        #[arg(long, default_value = "")]
        base_path: String,

        /// Validation tag, e.g. "required,gte=0,lte=130".
        #[arg(short = 't', long)]
        tag: Option<String>,
    },

    /// Make one signed call and print the response.
    ///
    /// The service is read from PARTNERLINK_<SERVICE>_APP_KEY,
    /// PARTNERLINK_<SERVICE>_APP_SECRET and PARTNERLINK_<SERVICE>_BASE_URL.
    Call {
        /// Service config name.
        #[arg(long)]
        service: String,

        /// Path appended to the base URL.
        #[arg(long)]
        path: String,

        /// Logical method name.
        #[arg(short = 'm', long)]
        method: String,

        /// HTTP method.
        #[arg(long, default_value = "POST")]
        http_method: String,

        /// How parameters travel, if different from the HTTP method.
        #[arg(long)]
        param_method: Option<String>,

        /// JSON payload, or `-` for stdin.
        #[arg(short = 'c', long, default_value = "{}")]
        content: String,

        /// Optional auth token.
        #[arg(long)]
        token: Option<String>,

        /// Seconds to wait for response headers.
        #[arg(long)]
        timeout: Option<u64>,

        /// Root of JSON extraction.
        #[arg(long, default_value = "response")]
        base_path: String,

        /// Skip the result_response envelope check.
        #[arg(long)]
        no_envelope_check: bool,

        /// Print only the value at this path below the base path.
        #[arg(short = 'p', long)]
        get: Option<String>,
    },
}

const CLI_CALL: CallKey = 0;

/// A single-call Api assembled from command-line arguments.
struct CliApi {
    service: String,
    call: Arc<AppCall>,
    token: Option<String>,
}

impl RestApi for CliApi {
    fn config_name(&self, _ctx: &CallContext) -> Result<String, Error> {
        Ok(self.service.clone())
    }

    fn calls(&self, _ctx: &CallContext) -> Result<HashMap<CallKey, Arc<dyn RestBuild>>, Error> {
        let mut calls: HashMap<CallKey, Arc<dyn RestBuild>> = HashMap::new();
        calls.insert(CLI_CALL, self.call.clone());
        Ok(calls)
    }

    fn token(&self, _ctx: &CallContext) -> Result<Option<String>, Error> {
        Ok(self.token.clone())
    }
}

#[tokio::main]
async fn main() {
    logging::init();
    let cli = Cli::parse();

    match cli.command {
        Command::Sign {
            app_key,
            secret,
            method,
            content,
            timestamp,
            token,
        } => {
            let content = read_content(&content);
            let params = AppParams::new(
                app_key,
                method,
                timestamp.unwrap_or_else(timestamp_now),
                content,
                token,
            )
            .canonical();
            println!("canonical: {}", params.encode());
            println!("{SIGN}: {}", params.sign(&secret));
            println!("wire: {}", params.signed_encoding(&secret));
        }

        Command::Extract {
            file,
            path,
            base_path,
            tag,
        } => {
            let body = read_input(&file);
            let result = JsonResult::new(body, base_path);
            let mut key = JsonKey::new(path);
            if let Some(tag) = tag {
                key = key.tag(tag);
            }
            match result.get_data(key) {
                Ok(node) => println!("{node}"),
                Err(e) => {
                    eprintln!("error: {e}");
                    process::exit(1);
                }
            }
        }

        Command::Call {
            service,
            path,
            method,
            http_method,
            param_method,
            content,
            token,
            timeout,
            base_path,
            no_envelope_check,
            get,
        } => {
            let mut call = AppCall::new(parse_method(&http_method), path, method).base_path(base_path);
            if let Some(m) = param_method {
                call = call.param_method(parse_method(&m));
            }
            if let Some(secs) = timeout {
                call = call.timeout(Duration::from_secs(secs));
            }
            if no_envelope_check {
                call = call.without_envelope_check();
            }
            let payload: serde_json::Value = serde_json::from_str(&read_content(&content))
                .unwrap_or_else(|e| fatal(&format!("content is not valid JSON: {e}")));

            let config = ServiceConfig::from_env(&service)
                .unwrap_or_else(|e| fatal(&e.to_string()))
                .with_event_factory(TracingEvent::factory());
            let transport = TransportConfig::from_env().unwrap_or_else(|e| fatal(&e.to_string()));
            let manager = RestClientManager::with_transport(transport)
                .unwrap_or_else(|e| fatal(&format!("failed to build HTTP client: {e}")));
            manager.set_config(config);

            let client = manager.api(Arc::new(CliApi {
                service,
                call: Arc::new(call),
                token,
            }));
            let mut result = client.call(&CallContext::new(), CLI_CALL, payload).await;
            let outcome = match get {
                Some(p) => result.get_data(p.as_str()).await.map(|node| node.to_string()),
                None => result.read_all().await.map(|body| body.to_string()),
            };
            match outcome {
                Ok(text) => println!("{text}"),
                Err(e) => {
                    eprintln!("error [{}]: {e}", e.code());
                    process::exit(1);
                }
            }
        }
    }
}

fn parse_method(name: &str) -> Method {
    Method::from_bytes(name.to_ascii_uppercase().as_bytes())
        .unwrap_or_else(|_| fatal(&format!("invalid HTTP method: {name}")))
}

fn read_content(content: &str) -> String {
    if content == "-" {
        read_input(&PathBuf::from("-"))
    } else {
        content.to_string()
    }
}

fn read_input(path: &PathBuf) -> String {
    if path.to_str() == Some("-") {
        let mut buf = String::new();
        io::stdin()
            .read_to_string(&mut buf)
            .unwrap_or_else(|e| fatal(&format!("failed to read stdin: {e}")));
        buf
    } else {
        fs::read_to_string(path)
            .unwrap_or_else(|e| fatal(&format!("failed to read {}: {e}", path.display())))
    }
}

fn fatal(msg: &str) -> ! {
    eprintln!("plink: {msg}");
    process::exit(2);
}

//! Loopback Callback Listener
//!
//! One-shot HTTP listener on `127.0.0.1` that receives the provider's
//! redirect after the user answers the consent page.
//!
//! ## Lifecycle
//!
//! ```text
//! Idle -> Listening -> CodeReceived -> Destroying -> Closed
//!   \
//!    -> BindFailed
//! ```
//!
//! Each accepted connection is served by hyper's HTTP/1 server with a small
//! axum router. The first request to the callback path carrying `code` or
//! `error` is answered with an HTML page and, once the connection is done,
//! published to
//! [`wait_for_callback`](LoopbackCallbackServer::wait_for_callback). Any other
//! request (favicon, wrong path, missing parameters) gets a `404` and does
//! not end the wait.
//!
//! Every accepted connection is tracked so that
//! [`shutdown`](LoopbackCallbackServer::shutdown) can force-close them;
//! browsers keep idle keep-alive sockets open otherwise, and the port would
//! not be free for the next attempt.

use crate::config::OAuthConfig;
use crate::error::{AuthError, Result};
use crate::types::CallbackResult;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use hyper::server::conn::http1;
use hyper_util::rt::TokioIo;
use hyper_util::service::TowerToHyperService;
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{oneshot, watch, Mutex};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Upper bound on serving one connection, request read included.
pub const REQUEST_READ_TIMEOUT: Duration = Duration::from_secs(10);

/// How long `shutdown` waits for the accept loop before aborting it.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

const SUCCESS_HTML: &str = "<!DOCTYPE html><html><head><meta charset=\"utf-8\"><title>MailDesk</title></head>\
<body><h1>Authorization complete</h1><p>You can close this window and return to MailDesk.</p></body></html>";

const DENIED_HTML: &str = "<!DOCTYPE html><html><head><meta charset=\"utf-8\"><title>MailDesk</title></head>\
<body><h1>Authorization was not granted</h1><p>You can close this window and try again from MailDesk.</p></body></html>";

/// Observable listener state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    Idle,
    Listening,
    CodeReceived,
    Destroying,
    Closed,
    BindFailed,
}

impl ListenerState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ListenerState::Closed | ListenerState::BindFailed)
    }
}

type ResultSlot = Arc<Mutex<Option<oneshot::Sender<CallbackResult>>>>;

/// Ephemeral HTTP listener for the OAuth redirect.
pub struct LoopbackCallbackServer {
    host: String,
    port: u16,
    callback_path: String,
    local_addr: Option<SocketAddr>,
    state_tx: Arc<watch::Sender<ListenerState>>,
    result_rx: Option<oneshot::Receiver<CallbackResult>>,
    cancel: CancellationToken,
    accept_task: Option<JoinHandle<()>>,
}

impl LoopbackCallbackServer {
    pub fn new(host: impl Into<String>, port: u16, callback_path: impl Into<String>) -> Self {
        let (state_tx, _) = watch::channel(ListenerState::Idle);
        Self {
            host: host.into(),
            port,
            callback_path: callback_path.into(),
            local_addr: None,
            state_tx: Arc::new(state_tx),
            result_rx: None,
            cancel: CancellationToken::new(),
            accept_task: None,
        }
    }

    pub fn from_config(config: &OAuthConfig) -> Self {
        Self::new(
            config.loopback_host.clone(),
            config.loopback_port,
            config.callback_path.clone(),
        )
    }

    pub fn state(&self) -> ListenerState {
        *self.state_tx.borrow()
    }

    /// Subscribe to state transitions.
    pub fn subscribe_state(&self) -> watch::Receiver<ListenerState> {
        self.state_tx.subscribe()
    }

    /// Bound address, once listening.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Redirect URI pointing at the bound port.
    pub fn redirect_uri(&self) -> Option<String> {
        self.local_addr
            .map(|addr| format!("http://{}:{}{}", self.host, addr.port(), self.callback_path))
    }

    /// Bind the listener and start accepting connections.
    ///
    /// # Errors
    ///
    /// `AuthError::Bind` if the address is in use or otherwise unavailable.
    /// Calling `start` on a server that is not `Idle` is also a bind error.
    /// `AuthError::Config` if the callback path is not a literal absolute
    /// path.
    #[instrument(skip(self), fields(host = %self.host, port = self.port))]
    pub async fn start(&mut self) -> Result<SocketAddr> {
        let addr_label = format!("{}:{}", self.host, self.port);

        if self.state() != ListenerState::Idle {
            return Err(AuthError::Bind {
                addr: addr_label,
                reason: format!("listener is {:?}", self.state()),
            });
        }

        if !is_literal_route(&self.callback_path) {
            return Err(AuthError::Config(format!(
                "callback path {:?} must be a literal absolute path",
                self.callback_path
            )));
        }

        let listener = match TcpListener::bind((self.host.as_str(), self.port)).await {
            Ok(listener) => listener,
            Err(e) => {
                warn!(error = %e, "Failed to bind loopback listener");
                self.state_tx.send_replace(ListenerState::BindFailed);
                return Err(AuthError::Bind {
                    addr: addr_label,
                    reason: e.to_string(),
                });
            }
        };

        let local_addr = listener.local_addr().map_err(|e| {
            self.state_tx.send_replace(ListenerState::BindFailed);
            AuthError::Bind {
                addr: addr_label.clone(),
                reason: e.to_string(),
            }
        })?;

        let (result_tx, result_rx) = oneshot::channel();
        let slot: ResultSlot = Arc::new(Mutex::new(Some(result_tx)));

        self.local_addr = Some(local_addr);
        self.result_rx = Some(result_rx);
        self.state_tx.send_replace(ListenerState::Listening);

        self.accept_task = Some(tokio::spawn(accept_loop(
            listener,
            Arc::from(self.callback_path.as_str()),
            slot,
            Arc::clone(&self.state_tx),
            self.cancel.clone(),
        )));

        info!(addr = %local_addr, "Loopback listener started");

        Ok(local_addr)
    }

    /// Wait for the redirect, bounded by `timeout`.
    ///
    /// # Errors
    ///
    /// - `AuthError::CallbackTimeout` when nothing arrives in time
    /// - `AuthError::Cancelled` when the listener was shut down or never
    ///   started, or the result was already taken
    pub async fn wait_for_callback(&mut self, timeout: Duration) -> Result<CallbackResult> {
        let Some(result_rx) = self.result_rx.take() else {
            return Err(AuthError::Cancelled);
        };

        match tokio::time::timeout(timeout, result_rx).await {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(_)) => Err(AuthError::Cancelled),
            Err(_) => {
                warn!(timeout_secs = timeout.as_secs(), "Timed out waiting for callback");
                Err(AuthError::CallbackTimeout(timeout.as_secs()))
            }
        }
    }

    /// Stop accepting, force-close every open connection and release the
    /// port.
    ///
    /// Waits at most [`SHUTDOWN_GRACE`] for the accept loop before aborting
    /// it. Safe to call more than once.
    pub async fn shutdown(&mut self) {
        let Some(mut accept_task) = self.accept_task.take() else {
            if self.state() != ListenerState::BindFailed {
                self.state_tx.send_replace(ListenerState::Closed);
            }
            return;
        };

        self.state_tx.send_replace(ListenerState::Destroying);
        self.cancel.cancel();

        if tokio::time::timeout(SHUTDOWN_GRACE, &mut accept_task)
            .await
            .is_err()
        {
            warn!("Accept loop did not stop within grace window, aborting");
            accept_task.abort();
            let _ = accept_task.await;
        }

        self.result_rx = None;
        self.state_tx.send_replace(ListenerState::Closed);
        debug!("Loopback listener closed");
    }
}

impl Drop for LoopbackCallbackServer {
    fn drop(&mut self) {
        self.cancel.cancel();
        if let Some(accept_task) = self.accept_task.take() {
            accept_task.abort();
        }
    }
}

async fn accept_loop(
    listener: TcpListener,
    callback_path: Arc<str>,
    slot: ResultSlot,
    state_tx: Arc<watch::Sender<ListenerState>>,
    cancel: CancellationToken,
) {
    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    debug!(%peer, "Accepted callback connection");
                    connections.spawn(handle_connection(
                        stream,
                        Arc::clone(&callback_path),
                        Arc::clone(&slot),
                        Arc::clone(&state_tx),
                    ));
                }
                Err(e) => {
                    warn!(error = %e, "Failed to accept callback connection");
                }
            },
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
        }
    }

    connections.abort_all();
    while connections.join_next().await.is_some() {}
    drop(listener);
}

async fn handle_connection(
    stream: TcpStream,
    callback_path: Arc<str>,
    slot: ResultSlot,
    state_tx: Arc<watch::Sender<ListenerState>>,
) {
    let captured: Captured = Arc::default();
    let service = TowerToHyperService::new(callback_router(&callback_path, Arc::clone(&captured)));

    let connection = http1::Builder::new()
        .keep_alive(false)
        .title_case_headers(true)
        .serve_connection(TokioIo::new(stream), service);

    match tokio::time::timeout(REQUEST_READ_TIMEOUT, connection).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => debug!(error = %e, "Callback connection ended with an error"),
        Err(_) => debug!("Timed out serving callback connection"),
    }

    // The connection is finished here, so the page is already on the wire.
    let Some(result) = captured.lock().await.take() else {
        return;
    };

    let sender = slot.lock().await.take();
    match sender {
        Some(sender) => {
            state_tx.send_replace(ListenerState::CodeReceived);
            info!(approved = result.is_code(), "Authorization callback received");
            let _ = sender.send(result);
        }
        None => debug!("Callback already captured, ignoring duplicate"),
    }
}

/// Per-connection capture of the authorization response.
type Captured = Arc<Mutex<Option<CallbackResult>>>;

/// Query string of the provider redirect.
#[derive(Debug, Default, Deserialize)]
struct CallbackParams {
    code: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
    state: Option<String>,
}

impl CallbackParams {
    /// `error` wins over `code`; empty values count as absent.
    fn into_result(self) -> Option<CallbackResult> {
        let code = self.code.filter(|v| !v.is_empty());
        let error = self.error.filter(|v| !v.is_empty());

        match (code, error) {
            (_, Some(error)) => Some(CallbackResult::Denied {
                error,
                description: self.error_description,
                state: self.state,
            }),
            (Some(code), None) => Some(CallbackResult::Code {
                code,
                state: self.state,
            }),
            (None, None) => None,
        }
    }
}

fn callback_router(callback_path: &str, captured: Captured) -> Router {
    Router::new()
        .route(callback_path, get(receive_callback))
        .with_state(captured)
}

async fn receive_callback(
    State(captured): State<Captured>,
    Query(params): Query<CallbackParams>,
) -> Response {
    let Some(result) = params.into_result() else {
        debug!("Ignoring request without authorization response");
        return StatusCode::NOT_FOUND.into_response();
    };

    let page = if result.is_code() { SUCCESS_HTML } else { DENIED_HTML };
    *captured.lock().await = Some(result);
    Html(page).into_response()
}

/// Paths the router accepts as a literal route: absolute, no `{param}`
/// captures and no `:`/`*` segments.
fn is_literal_route(path: &str) -> bool {
    path.starts_with('/')
        && !path.contains(['{', '}'])
        && path
            .split('/')
            .all(|segment| !segment.starts_with([':', '*']))
}

//! In-memory language server for tests

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::io::duplex;
use tokio::sync::Notify;

use super::client::LspClient;
use super::manager::{LspManager, ServerLauncher};
use super::protocol::{Message, Notification, Request, Response, ResponseError};
use super::servers::{ServerLocator, ServerSpec};
use super::transport::{ReadOutcome, Transport, write_response};
use crate::error::LspError;
use crate::models::config::LspConfig;
use crate::models::symbol::Language;

pub type Handler = Arc<dyn Fn(&Request) -> Result<Value, ResponseError> + Send + Sync>;

/// Notifications the fake server received, in arrival order
#[derive(Clone, Default)]
pub struct Recorded {
    notes: Arc<Mutex<Vec<Notification>>>,
    arrived: Arc<Notify>,
}

impl Recorded {
    fn push(&self, notification: Notification) {
        self.notes.lock().unwrap().push(notification);
        self.arrived.notify_waiters();
    }

    pub fn methods(&self) -> Vec<String> {
        self.notes
            .lock()
            .unwrap()
            .iter()
            .map(|n| n.method.clone())
            .collect()
    }

    /// Wait until `method` has been received; false once `limit` passes without it
    pub async fn wait_for(&self, method: &str, limit: Duration) -> bool {
        let seen = async {
            loop {
                let notified = self.arrived.notified();
                tokio::pin!(notified);
                notified.as_mut().enable();
                if self.methods().iter().any(|m| m == method) {
                    return;
                }
                notified.await;
            }
        };
        tokio::time::timeout(limit, seen).await.is_ok()
    }
}

/// `initialize` result advertising the given providers
pub fn initialize_result(document_symbols: bool) -> Value {
    json!({
        "capabilities": {
            "documentSymbolProvider": document_symbols,
            "definitionProvider": true,
            "referencesProvider": true,
            "hoverProvider": true,
            "renameProvider": true
        },
        "serverInfo": { "name": "fake-ls" }
    })
}

/// Connect a client to a task that answers requests through `handler`.
///
/// `initialize` and `shutdown` are answered automatically unless the handler
/// returns something other than `MethodNotFound` for them.
pub fn fake_server(language: Language, root: &Path, handler: Handler) -> (Arc<LspClient>, Recorded) {
    let recorded = Recorded::default();
    let client = fake_server_recording(language, root, handler, recorded.clone());
    (client, recorded)
}

/// Like [`fake_server`], appending notifications to an existing record
pub fn fake_server_recording(
    language: Language,
    root: &Path,
    handler: Handler,
    recorded: Recorded,
) -> Arc<LspClient> {
    let (client_read, mut server_write) = duplex(1024 * 1024);
    let (server_read, client_write) = duplex(1024 * 1024);
    let client = LspClient::connect(
        language,
        root,
        client_read,
        client_write,
        Some(Duration::from_secs(5)),
    );

    let notes = recorded;
    tokio::spawn(async move {
        let mut inbound = Transport::new(server_read);
        while let Ok(outcome) = inbound.read_message().await {
            let message = match outcome {
                ReadOutcome::Message(message) => message,
                ReadOutcome::Malformed(_) => continue,
            };
            match message {
                Message::Request(request) => {
                    let response = match handler(&request) {
                        Ok(result) => Response::ok(request.id.clone(), result),
                        Err(e) if e.code == super::protocol::error_codes::METHOD_NOT_FOUND => {
                            match request.method.as_str() {
                                "initialize" => {
                                    Response::ok(request.id.clone(), initialize_result(true))
                                }
                                "shutdown" => Response::ok(request.id.clone(), Value::Null),
                                _ => Response::error(Some(request.id.clone()), e.code, e.message),
                            }
                        }
                        Err(e) => Response::error(Some(request.id.clone()), e.code, e.message),
                    };
                    if write_response(&mut server_write, &response).await.is_err() {
                        break;
                    }
                }
                Message::Notification(notification) => {
                    let exit = notification.method == "exit";
                    notes.push(notification);
                    if exit {
                        break;
                    }
                }
                Message::Response(_) => {}
            }
        }
    });

    client
}

pub fn method_not_found(request: &Request) -> ResponseError {
    ResponseError {
        code: super::protocol::error_codes::METHOD_NOT_FOUND,
        message: format!("unhandled {}", request.method),
        data: None,
    }
}

/// Launcher that connects every start to a fresh in-memory server sharing one handler
pub struct FakeLauncher {
    handler: Handler,
    delay: Duration,
    launches: AtomicUsize,
    recorded: Recorded,
}

impl FakeLauncher {
    pub fn new(handler: Handler) -> Arc<Self> {
        Self::with_delay(handler, Duration::ZERO)
    }

    pub fn with_delay(handler: Handler, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            handler,
            delay,
            launches: AtomicUsize::new(0),
            recorded: Recorded::default(),
        })
    }

    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    /// Notifications received across all launches
    pub fn recorded(&self) -> &Recorded {
        &self.recorded
    }
}

#[async_trait]
impl ServerLauncher for FakeLauncher {
    async fn launch(
        &self,
        language: Language,
        _spec: &ServerSpec,
        root: &Path,
    ) -> Result<Arc<LspClient>, LspError> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(fake_server_recording(
            language,
            root,
            Arc::clone(&self.handler),
            self.recorded.clone(),
        ))
    }
}

pub fn fake_manager(root: impl Into<PathBuf>, launcher: Arc<FakeLauncher>) -> LspManager {
    let locator = ServerLocator::new(&LspConfig::default());
    LspManager::with_launcher(root.into(), locator, launcher)
}

/// Counts how often `method` was requested through a handler
#[derive(Clone, Default)]
pub struct RequestCounter(Arc<Mutex<Vec<String>>>);

impl RequestCounter {
    pub fn record(&self, request: &Request) {
        self.0.lock().unwrap().push(request.method.clone());
    }

    pub fn count(&self, method: &str) -> usize {
        self.0.lock().unwrap().iter().filter(|m| *m == method).count()
    }
}

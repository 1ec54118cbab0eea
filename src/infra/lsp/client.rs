//! JSON-RPC client for one language server connection
//!
//! Requests are correlated by id through a pending table; a single background
//! reader task owns the inbound stream and resolves waiters in any order.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use futures::FutureExt;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{Mutex, RwLock, oneshot};
use tokio::time::timeout;

use super::protocol::{
    ClientCapabilities, ClientInfo, ConfigurationParams, DidChangeTextDocumentParams,
    DidCloseTextDocumentParams, DidOpenTextDocumentParams, DocumentSymbolParams,
    DocumentSymbolResponse, GotoDefinitionResponse, Hover, InitializeParams, InitializeResult,
    LogMessageParams, LspLocation, Message, MessageType, Notification, Position, ReferenceContext,
    ReferenceParams, RenameParams, Request, RequestId, Response,
    TextDocumentContentChangeEvent, TextDocumentIdentifier, TextDocumentItem,
    TextDocumentPositionParams, WorkspaceEdit, WorkspaceFolder, error_codes,
};
use super::transport::{ReadOutcome, Transport, write_notification, write_request, write_response};
use crate::error::LspError;
use crate::models::lsp::{VersionedTextDocumentIdentifier, path_to_uri};
use crate::models::symbol::Language;

type PendingRequest = oneshot::Sender<Response>;
type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

const SHUTDOWN_REQUEST_TIMEOUT: Duration = Duration::from_secs(2);
const PROCESS_EXIT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug)]
struct DocumentState {
    version: i32,
    content_hash: String,
}

impl DocumentState {
    fn new(content: &str) -> Self {
        Self {
            version: 1,
            content_hash: crate::infra::hash_content(content),
        }
    }

    fn needs_update(&self, new_content: &str) -> bool {
        crate::infra::hash_content(new_content) != self.content_hash
    }

    fn update(&mut self, new_content: &str) {
        self.version += 1;
        self.content_hash = crate::infra::hash_content(new_content);
    }
}

pub struct LspClient {
    language: Language,
    root: PathBuf,
    process: Mutex<Option<Child>>,
    writer: Mutex<Option<BoxedWriter>>,
    next_id: AtomicU64,
    pending: RwLock<HashMap<RequestId, PendingRequest>>,
    capabilities: RwLock<Option<InitializeResult>>,
    documents: Mutex<HashMap<String, DocumentState>>,
    shutdown: AtomicBool,
    terminated: AtomicBool,
    request_timeout: Option<Duration>,
}

impl std::fmt::Debug for LspClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LspClient")
            .field("language", &self.language)
            .field("root", &self.root)
            .field("terminated", &self.terminated.load(Ordering::Acquire))
            .finish_non_exhaustive()
    }
}

impl LspClient {
    /// Spawn a server process and attach a client to its stdio.
    ///
    /// The handshake is not performed; call [`LspClient::initialize`] next.
    pub async fn spawn(
        language: Language,
        root: &Path,
        command: &Path,
        args: &[String],
    ) -> Result<Arc<Self>, LspError> {
        tracing::info!(
            "Starting {} language server: {} {:?}",
            language,
            command.display(),
            args
        );

        let mut child = Command::new(command)
            .args(args)
            .current_dir(root)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| LspError::ServerStart(format!("{}: {}", command.display(), e)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| LspError::ServerStart("Failed to get stdin".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| LspError::ServerStart("Failed to get stdout".to_string()))?;

        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    tracing::debug!("{} stderr: {}", language, line);
                }
            });
        }

        let client = Self::connect(language, root, stdout, stdin, None);
        *client.process.lock().await = Some(child);
        Ok(client)
    }

    /// Attach a client to an arbitrary byte stream pair and start its reader.
    ///
    /// `request_timeout` overrides the configured per-method deadlines.
    pub fn connect<R, W>(
        language: Language,
        root: &Path,
        reader: R,
        writer: W,
        request_timeout: Option<Duration>,
    ) -> Arc<Self>
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let client = Arc::new(Self {
            language,
            root: root.to_path_buf(),
            process: Mutex::new(None),
            writer: Mutex::new(Some(Box::new(writer))),
            next_id: AtomicU64::new(1),
            pending: RwLock::new(HashMap::new()),
            capabilities: RwLock::new(None),
            documents: Mutex::new(HashMap::new()),
            shutdown: AtomicBool::new(false),
            terminated: AtomicBool::new(false),
            request_timeout,
        });

        let reader_client = Arc::clone(&client);
        tokio::spawn(async move {
            let reading = Arc::clone(&reader_client).read_responses(Transport::new(reader));
            let outcome = AssertUnwindSafe(reading).catch_unwind().await;
            if outcome.is_err() {
                tracing::error!("{} LSP reader panicked", reader_client.language);
                reader_client.cancel_pending_requests_terminated().await;
            }
        });

        client
    }

    /// `initialize` / `initialized` handshake
    pub async fn initialize(&self) -> Result<InitializeResult, LspError> {
        let root_uri = path_to_uri(&self.root);
        let folder_name = self
            .root
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "workspace".to_string());

        let params = InitializeParams {
            process_id: Some(std::process::id()),
            root_uri: Some(root_uri.clone()),
            capabilities: ClientCapabilities::symbol_navigation(),
            workspace_folders: Some(vec![WorkspaceFolder {
                uri: root_uri,
                name: folder_name,
            }]),
            client_info: Some(ClientInfo {
                name: "symlens".to_string(),
                version: Some(env!("CARGO_PKG_VERSION").to_string()),
            }),
            initialization_options: None,
        };

        let result: InitializeResult = self
            .request("initialize", Some(serde_json::to_value(params)?))
            .await?;

        *self.capabilities.write().await = Some(result.clone());

        self.notify("initialized", Some(serde_json::json!({})))
            .await?;

        tracing::debug!(
            "{} language server initialized ({})",
            self.language,
            result
                .server_info
                .as_ref()
                .map(|info| info.name.as_str())
                .unwrap_or("unknown server")
        );
        Ok(result)
    }

    /// Send a request and wait for its response
    pub async fn request<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> Result<T, LspError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();

        {
            // Checked under the table lock so a concurrent drain cannot miss us
            let mut pending = self.pending.write().await;
            if self.terminated.load(Ordering::Acquire) {
                return Err(LspError::ServerTerminated {
                    language: self.language,
                });
            }
            pending.insert(RequestId::Number(id), tx);
        }

        let request = Request::new(id, method, params);
        tracing::trace!("{} LSP request {}: {}", self.language, id, method);

        if let Err(e) = self.send_request(&request).await {
            self.pending.write().await.remove(&RequestId::Number(id));
            return Err(e);
        }

        let deadline = self
            .request_timeout
            .unwrap_or_else(|| crate::config::timeout_for(self.language, method));

        match timeout(deadline, rx).await {
            Ok(Ok(response)) => match response.into_result() {
                Ok(result) => {
                    serde_json::from_value(result).map_err(|e| LspError::Protocol(e.to_string()))
                }
                Err(err) if err.code == error_codes::SERVER_TERMINATED => {
                    Err(LspError::ServerTerminated {
                        language: self.language,
                    })
                }
                Err(err) if err.code == error_codes::REQUEST_CANCELLED => {
                    Err(LspError::RequestCancelled)
                }
                Err(err) => Err(err.into()),
            },
            Ok(Err(_)) => Err(LspError::RequestCancelled),
            Err(_) => {
                self.cancel_request(id).await;
                Err(LspError::Timeout(format!(
                    "{} '{}' timed out after {:?}. The language server may be busy or unresponsive",
                    self.language, method, deadline
                )))
            }
        }
    }

    async fn send_request(&self, request: &Request) -> Result<(), LspError> {
        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or(LspError::ServerTerminated {
            language: self.language,
        })?;
        write_request(writer, request).await?;
        Ok(())
    }

    /// Forget a pending request and tell the server to drop it
    pub async fn cancel_request(&self, id: u64) {
        self.pending.write().await.remove(&RequestId::Number(id));
        let _ = self
            .notify("$/cancelRequest", Some(serde_json::json!({ "id": id })))
            .await;
    }

    /// Send a notification (no response expected)
    pub async fn notify(&self, method: &str, params: Option<Value>) -> Result<(), LspError> {
        let notification = Notification::new(method, params);

        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or(LspError::ServerTerminated {
            language: self.language,
        })?;
        write_notification(writer, &notification).await?;
        Ok(())
    }

    async fn send_response(&self, response: Response) {
        let mut guard = self.writer.lock().await;
        if let Some(writer) = guard.as_mut()
            && let Err(e) = write_response(writer, &response).await
        {
            tracing::debug!("{} failed to answer server request: {}", self.language, e);
        }
    }

    /// Background task that reads and dispatches inbound messages
    async fn read_responses<R: AsyncRead + Unpin>(self: Arc<Self>, mut transport: Transport<R>) {
        loop {
            match transport.read_message().await {
                Ok(ReadOutcome::Message(message)) => {
                    Arc::clone(&self).handle_message(message).await;
                }
                Ok(ReadOutcome::Malformed(reason)) => {
                    tracing::warn!("{} LSP: skipping malformed frame: {}", self.language, reason);
                }
                Err(e) => {
                    if self.shutdown.load(Ordering::Acquire) {
                        tracing::debug!("{} LSP stream closed", self.language);
                    } else {
                        tracing::error!("{} LSP read error: {}", self.language, e);
                    }
                    self.cancel_pending_requests_terminated().await;
                    break;
                }
            }
        }
    }

    /// Fail every waiter; later requests fail fast.
    async fn cancel_pending_requests_terminated(&self) {
        let mut pending = self.pending.write().await;
        self.terminated.store(true, Ordering::Release);

        if !pending.is_empty() {
            tracing::debug!(
                "Cancelling {} pending requests: {} server terminated",
                pending.len(),
                self.language
            );
        }
        for (id, sender) in pending.drain() {
            let _ = sender.send(Response::error(
                Some(id),
                error_codes::SERVER_TERMINATED,
                format!("{} language server terminated unexpectedly", self.language),
            ));
        }
    }

    async fn cancel_pending_requests(&self, reason: &str) {
        let mut pending = self.pending.write().await;
        if !pending.is_empty() {
            tracing::debug!("Cancelling {} pending requests: {}", pending.len(), reason);
        }
        for (id, sender) in pending.drain() {
            let _ = sender.send(Response::error(
                Some(id),
                error_codes::REQUEST_CANCELLED,
                reason,
            ));
        }
    }

    async fn handle_message(self: Arc<Self>, message: Message) {
        match message {
            Message::Response(response) => {
                let Some(id) = response.id.clone() else {
                    tracing::debug!("{} LSP response without id dropped", self.language);
                    return;
                };
                let mut pending = self.pending.write().await;
                // Some servers echo numeric ids back as strings
                let sender = pending.remove(&id).or_else(|| match &id {
                    RequestId::String(s) => s
                        .parse::<u64>()
                        .ok()
                        .and_then(|n| pending.remove(&RequestId::Number(n))),
                    RequestId::Number(_) => None,
                });
                match sender {
                    Some(tx) => {
                        let _ = tx.send(response);
                    }
                    None => {
                        tracing::debug!(
                            "Received response for unknown request ID {} (may have timed out)",
                            id
                        );
                    }
                }
            }
            Message::Request(request) => {
                let response = self.server_request_response(&request);
                // Answered off the reader task so a busy writer never stalls reading
                tokio::spawn(async move {
                    self.send_response(response).await;
                });
            }
            Message::Notification(notification) => self.handle_notification(notification),
        }
    }

    fn server_request_response(&self, request: &Request) -> Response {
        tracing::trace!("{} server request: {}", self.language, request.method);
        match request.method.as_str() {
            "workspace/configuration" => {
                let items = request
                    .params
                    .clone()
                    .and_then(|p| serde_json::from_value::<ConfigurationParams>(p).ok())
                    .map(|p| p.items.len())
                    .unwrap_or(0);
                Response::ok(request.id.clone(), Value::Array(vec![Value::Null; items]))
            }
            "client/registerCapability"
            | "client/unregisterCapability"
            | "window/workDoneProgress/create" => Response::ok(request.id.clone(), Value::Null),
            method => Response::error(
                Some(request.id.clone()),
                error_codes::METHOD_NOT_FOUND,
                format!("Method not supported by client: {}", method),
            ),
        }
    }

    fn handle_notification(&self, notification: Notification) {
        match notification.method.as_str() {
            "window/logMessage" | "window/showMessage" => {
                let Some(params) = notification
                    .params
                    .and_then(|p| serde_json::from_value::<LogMessageParams>(p).ok())
                else {
                    return;
                };
                let (language, msg) = (self.language, params.message);
                match params.typ {
                    MessageType::Error => tracing::error!("LSP {}: {}", language, msg),
                    MessageType::Warning => tracing::warn!("LSP {}: {}", language, msg),
                    MessageType::Info => tracing::info!("LSP {}: {}", language, msg),
                    MessageType::Log | MessageType::Debug => {
                        tracing::debug!("LSP {}: {}", language, msg)
                    }
                }
            }
            method => tracing::trace!("Unhandled notification: {}", method),
        }
    }

    // ------------------------------------------------------------------
    // Document synchronization
    // ------------------------------------------------------------------

    pub async fn did_open(&self, uri: &str, content: &str) -> Result<(), LspError> {
        let state = DocumentState::new(content);
        let params = DidOpenTextDocumentParams {
            text_document: TextDocumentItem {
                uri: uri.to_string(),
                language_id: self.language.lsp_id().to_string(),
                version: state.version,
                text: content.to_string(),
            },
        };
        self.documents.lock().await.insert(uri.to_string(), state);
        self.notify("textDocument/didOpen", Some(serde_json::to_value(params)?))
            .await
    }

    /// Full-text change; opens the document if the server has not seen it.
    pub async fn did_change(&self, uri: &str, content: &str) -> Result<(), LspError> {
        let version = {
            let mut documents = self.documents.lock().await;
            match documents.get_mut(uri) {
                Some(state) if !state.needs_update(content) => return Ok(()),
                Some(state) => {
                    state.update(content);
                    Some(state.version)
                }
                None => None,
            }
        };
        let Some(version) = version else {
            return self.did_open(uri, content).await;
        };

        let params = DidChangeTextDocumentParams {
            text_document: VersionedTextDocumentIdentifier {
                uri: uri.to_string(),
                version: Some(version),
            },
            content_changes: vec![TextDocumentContentChangeEvent {
                text: content.to_string(),
            }],
        };
        self.notify("textDocument/didChange", Some(serde_json::to_value(params)?))
            .await
    }

    pub async fn did_close(&self, uri: &str) -> Result<(), LspError> {
        self.documents.lock().await.remove(uri);
        let params = DidCloseTextDocumentParams {
            text_document: TextDocumentIdentifier::new(uri),
        };
        self.notify("textDocument/didClose", Some(serde_json::to_value(params)?))
            .await
    }

    pub async fn document_version(&self, uri: &str) -> Option<i32> {
        self.documents.lock().await.get(uri).map(|s| s.version)
    }

    // ------------------------------------------------------------------
    // Typed requests
    // ------------------------------------------------------------------

    pub async fn document_symbols(&self, uri: &str) -> Result<DocumentSymbolResponse, LspError> {
        let params = DocumentSymbolParams {
            text_document: TextDocumentIdentifier::new(uri),
        };
        let result: Option<DocumentSymbolResponse> = self
            .request(
                "textDocument/documentSymbol",
                Some(serde_json::to_value(params)?),
            )
            .await?;
        Ok(result.unwrap_or(DocumentSymbolResponse::Nested(Vec::new())))
    }

    pub async fn definition(
        &self,
        uri: &str,
        position: Position,
    ) -> Result<Vec<LspLocation>, LspError> {
        let params = Self::position_params(uri, position);
        let result: Option<GotoDefinitionResponse> = self
            .request("textDocument/definition", Some(serde_json::to_value(params)?))
            .await?;
        Ok(result.map(GotoDefinitionResponse::into_locations).unwrap_or_default())
    }

    pub async fn references(
        &self,
        uri: &str,
        position: Position,
        include_declaration: bool,
    ) -> Result<Vec<LspLocation>, LspError> {
        let params = ReferenceParams {
            position: Self::position_params(uri, position),
            context: ReferenceContext {
                include_declaration,
            },
        };
        let result: Option<Vec<LspLocation>> = self
            .request("textDocument/references", Some(serde_json::to_value(params)?))
            .await?;
        Ok(result.unwrap_or_default())
    }

    pub async fn hover(&self, uri: &str, position: Position) -> Result<Option<Hover>, LspError> {
        let params = Self::position_params(uri, position);
        self.request("textDocument/hover", Some(serde_json::to_value(params)?))
            .await
    }

    pub async fn rename(
        &self,
        uri: &str,
        position: Position,
        new_name: &str,
    ) -> Result<Option<WorkspaceEdit>, LspError> {
        let params = RenameParams {
            position: Self::position_params(uri, position),
            new_name: new_name.to_string(),
        };
        self.request("textDocument/rename", Some(serde_json::to_value(params)?))
            .await
    }

    pub fn position_params(uri: &str, position: Position) -> TextDocumentPositionParams {
        TextDocumentPositionParams {
            text_document: TextDocumentIdentifier::new(uri),
            position,
        }
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Shut the server down with 3-stage graceful termination
    pub async fn shutdown(&self) -> Result<(), LspError> {
        if self.shutdown.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        // Stage 1: LSP shutdown request and exit notification
        if !self.terminated.load(Ordering::Acquire) {
            let stage_one = timeout(SHUTDOWN_REQUEST_TIMEOUT, async {
                if self.request::<Value>("shutdown", None).await.is_ok() {
                    let _ = self.notify("exit", None).await;
                }
            })
            .await;
            if stage_one.is_err() {
                tracing::debug!("{} LSP shutdown request timed out", self.language);
            }
        }

        // Closing the writer is EOF on the server's stdin
        self.writer.lock().await.take();

        // Stage 2 & 3: wait for exit, then force kill
        if let Some(mut child) = self.process.lock().await.take() {
            match timeout(PROCESS_EXIT_TIMEOUT, child.wait()).await {
                Ok(Ok(status)) => {
                    tracing::debug!("{} language server exited: {:?}", self.language, status);
                }
                Ok(Err(e)) => {
                    tracing::warn!("{} language server wait error: {}", self.language, e);
                }
                Err(_) => {
                    tracing::warn!(
                        "{} language server termination timed out, forcing kill",
                        self.language
                    );
                    let _ = child.kill().await;
                }
            }
        }

        self.cancel_pending_requests("Connection closed").await;
        tracing::info!("{} language server stopped", self.language);
        Ok(())
    }

    pub fn language(&self) -> Language {
        self.language
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub async fn capabilities(&self) -> Option<InitializeResult> {
        self.capabilities.read().await.clone()
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::Acquire)
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// True while the process (if any) runs and the stream is open
    pub async fn is_running(&self) -> bool {
        if self.is_terminated() || self.is_shut_down() {
            return false;
        }
        let mut process = self.process.lock().await;
        match process.as_mut() {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => true,
        }
    }
}

impl Drop for LspClient {
    fn drop(&mut self) {
        if let Ok(mut process_guard) = self.process.try_lock()
            && let Some(child) = process_guard.as_mut()
        {
            let _ = child.start_kill();
            tracing::debug!("LspClient for {} dropped, process killed", self.language);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncWriteExt, DuplexStream, duplex};

    /// The server half of an in-memory connection
    struct FakeServer {
        inbound: Transport<DuplexStream>,
        outbound: DuplexStream,
    }

    impl FakeServer {
        async fn next(&mut self) -> Message {
            match self.inbound.read_message().await.unwrap() {
                ReadOutcome::Message(message) => message,
                ReadOutcome::Malformed(reason) => panic!("client sent malformed frame: {reason}"),
            }
        }

        async fn next_request(&mut self) -> Request {
            loop {
                if let Message::Request(request) = self.next().await {
                    return request;
                }
            }
        }

        async fn reply(&mut self, id: RequestId, result: Value) {
            write_response(&mut self.outbound, &Response::ok(id, result))
                .await
                .unwrap();
        }
    }

    fn pair(request_timeout: Duration) -> (Arc<LspClient>, FakeServer) {
        let (client_read, server_write) = duplex(64 * 1024);
        let (server_read, client_write) = duplex(64 * 1024);
        let client = LspClient::connect(
            Language::Terraform,
            Path::new("/work/infra"),
            client_read,
            client_write,
            Some(request_timeout),
        );
        let server = FakeServer {
            inbound: Transport::new(server_read),
            outbound: server_write,
        };
        (client, server)
    }

    #[tokio::test]
    async fn test_out_of_order_responses_reach_their_callers() {
        let (client, mut server) = pair(Duration::from_secs(5));

        let server_task = tokio::spawn(async move {
            let first = server.next_request().await;
            let second = server.next_request().await;
            server
                .reply(second.id.clone(), Value::String(second.method.clone()))
                .await;
            server
                .reply(first.id.clone(), Value::String(first.method.clone()))
                .await;
            server
        });

        let (a, b) = tokio::join!(
            client.request::<String>("custom/alpha", None),
            client.request::<String>("custom/beta", None)
        );
        assert_eq!(a.unwrap(), "custom/alpha");
        assert_eq!(b.unwrap(), "custom/beta");
        drop(server_task.await.unwrap());
    }

    #[tokio::test]
    async fn test_string_id_is_matched_to_numeric_request() {
        let (client, mut server) = pair(Duration::from_secs(5));

        let server_task = tokio::spawn(async move {
            let request = server.next_request().await;
            let RequestId::Number(n) = request.id else {
                panic!("client ids are numeric");
            };
            server
                .reply(RequestId::String(n.to_string()), serde_json::json!(42))
                .await;
            server
        });

        assert_eq!(client.request::<u32>("custom/x", None).await.unwrap(), 42);
        drop(server_task.await.unwrap());
    }

    #[tokio::test]
    async fn test_crash_fails_every_pending_request() {
        let (client, mut server) = pair(Duration::from_secs(30));

        let mut calls = Vec::new();
        for i in 0..3 {
            let client = Arc::clone(&client);
            calls.push(tokio::spawn(async move {
                client.request::<Value>(&format!("custom/{i}"), None).await
            }));
        }

        for _ in 0..3 {
            server.next_request().await;
        }
        drop(server);

        for call in calls {
            let result = tokio::time::timeout(Duration::from_secs(2), call)
                .await
                .expect("pending call must resolve promptly")
                .unwrap();
            assert!(matches!(result, Err(LspError::ServerTerminated { .. })));
        }

        assert!(client.is_terminated());
        let after = client.request::<Value>("custom/after", None).await;
        assert!(matches!(after, Err(LspError::ServerTerminated { .. })));
    }

    #[tokio::test]
    async fn test_oversized_frame_fails_pending_requests_promptly() {
        let (client, mut server) = pair(Duration::from_secs(30));

        let pending = {
            let client = Arc::clone(&client);
            tokio::spawn(async move { client.request::<Value>("custom/slow", None).await })
        };
        server.next_request().await;
        server
            .outbound
            .write_all(format!("Content-Length: {}\r\n\r\n", u64::MAX).as_bytes())
            .await
            .unwrap();

        let result = tokio::time::timeout(Duration::from_secs(2), pending)
            .await
            .expect("pending call must resolve promptly")
            .unwrap();
        assert!(matches!(result, Err(LspError::ServerTerminated { .. })));
        assert!(client.is_terminated());
    }

    #[tokio::test]
    async fn test_malformed_frame_is_skipped() {
        let (client, mut server) = pair(Duration::from_secs(5));

        let server_task = tokio::spawn(async move {
            let request = server.next_request().await;
            server
                .outbound
                .write_all(b"Content-Length: 9\r\n\r\n{garbage}")
                .await
                .unwrap();
            server.reply(request.id, serde_json::json!("ok")).await;
            server
        });

        assert_eq!(client.request::<String>("custom/x", None).await.unwrap(), "ok");
        drop(server_task.await.unwrap());
    }

    #[tokio::test]
    async fn test_late_response_after_timeout_is_dropped() {
        let (client, mut server) = pair(Duration::from_millis(100));

        let slow = client.request::<Value>("custom/slow", None).await;
        assert!(matches!(slow, Err(LspError::Timeout(_))));

        let stale = server.next_request().await;
        // Client withdraws the timed-out request
        let Message::Notification(cancel) = server.next().await else {
            panic!("expected $/cancelRequest");
        };
        assert_eq!(cancel.method, "$/cancelRequest");
        server.reply(stale.id, serde_json::json!("late")).await;

        let server_task = tokio::spawn(async move {
            let request = server.next_request().await;
            server.reply(request.id, serde_json::json!("fresh")).await;
            server
        });

        let fresh = client.request::<String>("custom/fast", None).await.unwrap();
        assert_eq!(fresh, "fresh");
        drop(server_task.await.unwrap());
    }

    #[tokio::test]
    async fn test_server_requests_are_answered() {
        let (_client, mut server) = pair(Duration::from_secs(5));

        let config_request = Request::new(
            900,
            "workspace/configuration",
            Some(serde_json::json!({ "items": [{ "section": "a" }, { "section": "b" }] })),
        );
        write_request(&mut server.outbound, &config_request).await.unwrap();
        let register = Request::new(901, "client/registerCapability", Some(serde_json::json!({})));
        write_request(&mut server.outbound, &register).await.unwrap();
        let unknown = Request::new(902, "custom/unknown", None);
        write_request(&mut server.outbound, &unknown).await.unwrap();

        let mut replies = HashMap::new();
        for _ in 0..3 {
            let Message::Response(response) = server.next().await else {
                panic!("expected a response");
            };
            replies.insert(response.id.clone().unwrap(), response);
        }

        let config = replies.remove(&RequestId::Number(900)).unwrap();
        assert_eq!(config.into_result().unwrap(), serde_json::json!([null, null]));

        let register = replies.remove(&RequestId::Number(901)).unwrap();
        assert_eq!(register.into_result().unwrap(), Value::Null);

        let unknown = replies.remove(&RequestId::Number(902)).unwrap();
        assert_eq!(
            unknown.into_result().unwrap_err().code,
            error_codes::METHOD_NOT_FOUND
        );
    }

    #[tokio::test]
    async fn test_debug_names_language_and_root() {
        let (client, _server) = pair(Duration::from_secs(5));
        let text = format!("{:?}", client);
        assert!(text.contains("Terraform"));
        assert!(text.contains("/work/infra"));
    }

    #[tokio::test]
    async fn test_initialize_handshake() {
        let (client, mut server) = pair(Duration::from_secs(5));

        let server_task = tokio::spawn(async move {
            let request = server.next_request().await;
            assert_eq!(request.method, "initialize");
            let params = request.params.clone().unwrap();
            assert_eq!(params["rootUri"], "file:///work/infra");
            assert_eq!(
                params["capabilities"]["textDocument"]["documentSymbol"]
                    ["hierarchicalDocumentSymbolSupport"],
                true
            );
            server
                .reply(
                    request.id,
                    serde_json::json!({
                        "capabilities": { "documentSymbolProvider": true },
                        "serverInfo": { "name": "terraform-ls" }
                    }),
                )
                .await;

            let Message::Notification(initialized) = server.next().await else {
                panic!("expected initialized notification");
            };
            assert_eq!(initialized.method, "initialized");
            server
        });

        let result = client.initialize().await.unwrap();
        assert!(result.capabilities.supports("documentSymbolProvider"));
        assert!(client.capabilities().await.is_some());
        drop(server_task.await.unwrap());
    }

    #[tokio::test]
    async fn test_document_versions_increase_on_change() {
        let (client, mut server) = pair(Duration::from_secs(5));
        let uri = "file:///work/infra/main.tf";

        client.did_open(uri, "a").await.unwrap();
        client.did_change(uri, "a").await.unwrap();
        client.did_change(uri, "b").await.unwrap();
        assert_eq!(client.document_version(uri).await, Some(2));

        let Message::Notification(open) = server.next().await else {
            panic!("expected didOpen");
        };
        assert_eq!(open.method, "textDocument/didOpen");
        assert_eq!(open.params.unwrap()["textDocument"]["languageId"], "terraform");

        // Unchanged content sends nothing
        let Message::Notification(change) = server.next().await else {
            panic!("expected didChange");
        };
        assert_eq!(change.method, "textDocument/didChange");
        let params = change.params.unwrap();
        assert_eq!(params["textDocument"]["version"], 2);
        assert_eq!(params["contentChanges"][0]["text"], "b");

        client.did_close(uri).await.unwrap();
        assert_eq!(client.document_version(uri).await, None);
    }

    #[tokio::test]
    async fn test_shutdown_sends_shutdown_and_exit() {
        let (client, mut server) = pair(Duration::from_secs(5));

        let server_task = tokio::spawn(async move {
            let request = server.next_request().await;
            assert_eq!(request.method, "shutdown");
            server.reply(request.id, Value::Null).await;
            let Message::Notification(exit) = server.next().await else {
                panic!("expected exit");
            };
            assert_eq!(exit.method, "exit");
            server
        });

        client.shutdown().await.unwrap();
        assert!(client.is_shut_down());
        assert!(!client.is_running().await);
        drop(server_task.await.unwrap());

        let after = client.notify("custom/late", None).await;
        assert!(matches!(after, Err(LspError::ServerTerminated { .. })));
    }

    #[test]
    fn test_position_params() {
        let params = LspClient::position_params("file:///a.tf", Position::new(10, 5));
        assert_eq!(params.text_document.uri, "file:///a.tf");
        assert_eq!(params.position.line, 10);
        assert_eq!(params.position.character, 5);
    }
}

//! LSP Server Manager
//!
//! One initialized client per language, started on first use with race-safe access.

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::{Notify, RwLock};
use tokio::time::timeout;

use super::client::LspClient;
use super::servers::{self, ServerLocator, ServerSpec};
use crate::error::LspError;
use crate::models::config::LspConfig;
use crate::models::symbol::Language;

/// Produces a connected, not yet initialized client
#[async_trait]
pub trait ServerLauncher: Send + Sync {
    async fn launch(
        &self,
        language: Language,
        spec: &ServerSpec,
        root: &Path,
    ) -> Result<Arc<LspClient>, LspError>;
}

/// Locates the binary and spawns it as a child process
pub struct ProcessLauncher {
    locator: ServerLocator,
}

impl ProcessLauncher {
    pub fn new(locator: ServerLocator) -> Self {
        Self { locator }
    }
}

#[async_trait]
impl ServerLauncher for ProcessLauncher {
    async fn launch(
        &self,
        language: Language,
        spec: &ServerSpec,
        root: &Path,
    ) -> Result<Arc<LspClient>, LspError> {
        let resolved = self.locator.locate(language, spec).await?;
        LspClient::spawn(language, root, &resolved.command, &resolved.args).await
    }
}

/// Lifecycle of a language's server as seen by the manager
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    NotStarted,
    Starting,
    Initialized,
    ShuttingDown,
    Closed,
}

impl ServerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotStarted => "not_started",
            Self::Starting => "starting",
            Self::Initialized => "initialized",
            Self::ShuttingDown => "shutting_down",
            Self::Closed => "closed",
        }
    }
}

enum ClientState {
    Initializing(Arc<Notify>),
    Ready {
        client: Arc<LspClient>,
        last_used: Instant,
    },
}

impl ClientState {
    fn ready(client: Arc<LspClient>) -> Self {
        Self::Ready {
            client,
            last_used: Instant::now(),
        }
    }

    fn touch(&mut self) {
        if let Self::Ready { last_used, .. } = self {
            *last_used = Instant::now();
        }
    }

    fn idle_duration(&self) -> Duration {
        match self {
            Self::Ready { last_used, .. } => last_used.elapsed(),
            Self::Initializing(_) => Duration::ZERO,
        }
    }

    fn client(&self) -> Option<Arc<LspClient>> {
        match self {
            Self::Ready { client, .. } => Some(Arc::clone(client)),
            Self::Initializing(_) => None,
        }
    }
}

/// Releases a claimed `Initializing` slot when the starting caller is cancelled
struct StartSlot {
    clients: Arc<RwLock<HashMap<Language, ClientState>>>,
    language: Language,
    notify: Arc<Notify>,
    armed: bool,
}

impl Drop for StartSlot {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        tracing::debug!("{} language server start was cancelled", self.language);

        let language = self.language;
        let notify = Arc::clone(&self.notify);
        let release = move |clients: &mut HashMap<Language, ClientState>| {
            if matches!(
                clients.get(&language),
                Some(ClientState::Initializing(n)) if Arc::ptr_eq(n, &notify)
            ) {
                clients.remove(&language);
            }
            notify.notify_waiters();
        };

        if let Ok(mut clients) = self.clients.try_write() {
            release(&mut clients);
            return;
        }
        let clients = Arc::clone(&self.clients);
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                release(&mut *clients.write().await);
            });
        }
    }
}

pub struct LspManager {
    root: PathBuf,
    clients: Arc<RwLock<HashMap<Language, ClientState>>>,
    specs: HashMap<Language, ServerSpec>,
    locator: ServerLocator,
    launcher: Arc<dyn ServerLauncher>,
}

impl LspManager {
    pub fn new(root: PathBuf, config: &LspConfig) -> Self {
        let locator = ServerLocator::new(config);
        let launcher = Arc::new(ProcessLauncher::new(locator.clone()));
        Self::with_launcher(root, locator, launcher)
    }

    pub fn with_launcher(
        root: PathBuf,
        locator: ServerLocator,
        launcher: Arc<dyn ServerLauncher>,
    ) -> Self {
        Self {
            root,
            clients: Arc::new(RwLock::new(HashMap::new())),
            specs: servers::defaults(),
            locator,
            launcher,
        }
    }

    /// Get or start a client for a language (race-safe, deadlock-free)
    pub async fn get_client(&self, language: Language) -> Result<Arc<LspClient>, LspError> {
        loop {
            // Phase 1: snapshot under the read lock
            let (client_opt, notify_opt) = {
                let clients = self.clients.read().await;
                match clients.get(&language) {
                    Some(ClientState::Ready { client, .. }) => (Some(Arc::clone(client)), None),
                    Some(ClientState::Initializing(notify)) => (None, Some(Arc::clone(notify))),
                    None => (None, None),
                }
            };

            // Phase 2: liveness check outside the lock
            if let Some(client) = client_opt {
                let alive = client.is_running().await;
                let mut clients = self.clients.write().await;
                if alive {
                    if let Some(state) = clients.get_mut(&language) {
                        state.touch();
                    }
                    return Ok(client);
                }
                // Dead client: drop it unless someone already replaced it
                if let Some(current) = clients.get(&language).and_then(ClientState::client)
                    && Arc::ptr_eq(&current, &client)
                {
                    tracing::warn!("{} language server is gone, restarting", language);
                    clients.remove(&language);
                }
                continue;
            }

            // Phase 3: wait for a start in progress
            if let Some(notify) = notify_opt {
                let notified = notify.notified();
                // Re-check so a completion between snapshot and subscribe is not missed
                if matches!(
                    self.clients.read().await.get(&language),
                    Some(ClientState::Initializing(n)) if Arc::ptr_eq(n, &notify)
                ) {
                    notified.await;
                }
                continue;
            }

            // Phase 4: claim the slot and start
            let notify = Arc::new(Notify::new());
            {
                let mut clients = self.clients.write().await;
                if clients.contains_key(&language) {
                    continue;
                }
                clients.insert(language, ClientState::Initializing(Arc::clone(&notify)));
            }

            return self.start_client_internal(language, notify).await;
        }
    }

    async fn start_client_internal(
        &self,
        language: Language,
        notify: Arc<Notify>,
    ) -> Result<Arc<LspClient>, LspError> {
        let mut slot = StartSlot {
            clients: Arc::clone(&self.clients),
            language,
            notify: Arc::clone(&notify),
            armed: true,
        };

        let result = self.do_start_client(language).await;

        let mut clients = self.clients.write().await;
        match &result {
            Ok(client) => {
                clients.insert(language, ClientState::ready(Arc::clone(client)));
            }
            Err(e) => {
                tracing::debug!("{} language server failed to start: {}", language, e);
                clients.remove(&language);
            }
        }
        slot.armed = false;
        notify.notify_waiters();

        result
    }

    async fn do_start_client(&self, language: Language) -> Result<Arc<LspClient>, LspError> {
        let spec = self
            .specs
            .get(&language)
            .ok_or_else(|| LspError::UnsupportedLanguage(language.to_string()))?;

        let client = self.launcher.launch(language, spec, &self.root).await?;

        let init_timeout = spec.tier.init_timeout().mul_f64(crate::config::timeout_multiplier(language));
        let initialized = match timeout(init_timeout, client.initialize()).await {
            Ok(result) => result,
            Err(_) => Err(LspError::Timeout(format!(
                "{} ({}) did not finish initializing within {:?}",
                language, spec.name, init_timeout
            ))),
        };
        let result = match initialized {
            Ok(result) => result,
            Err(e) => {
                let _ = client.shutdown().await;
                return Err(e);
            }
        };

        if !result.capabilities.supports("documentSymbolProvider") {
            let server = result
                .server_info
                .as_ref()
                .map(|info| info.name.clone())
                .unwrap_or_else(|| spec.name.to_string());
            let _ = client.shutdown().await;
            return Err(LspError::feature_not_supported(
                language,
                &server,
                "documentSymbolProvider",
            ));
        }

        tracing::info!("{} language server started", language);
        Ok(client)
    }

    pub async fn shutdown_client(&self, language: Language) -> Result<(), LspError> {
        let client = {
            let mut clients = self.clients.write().await;
            clients.remove(&language).and_then(|s| s.client())
        };

        if let Some(client) = client {
            client.shutdown().await?;
            tracing::info!("{} language server stopped", language);
        }

        Ok(())
    }

    pub async fn restart_client(&self, language: Language) -> Result<Arc<LspClient>, LspError> {
        let _ = self.shutdown_client(language).await;
        tracing::info!("{} language server restarting", language);
        self.get_client(language).await
    }

    pub async fn shutdown_all(&self) {
        let clients_to_shutdown: Vec<(Language, Arc<LspClient>)> = {
            let mut clients = self.clients.write().await;
            clients
                .drain()
                .filter_map(|(lang, state)| state.client().map(|c| (lang, c)))
                .collect()
        };

        let results = futures::future::join_all(
            clients_to_shutdown
                .iter()
                .map(|(_, client)| client.shutdown()),
        )
        .await;

        for ((lang, _), result) in clients_to_shutdown.iter().zip(results) {
            match result {
                Ok(()) => tracing::info!("{} language server stopped", lang),
                Err(e) => tracing::warn!("Error shutting down {} server: {}", lang, e),
            }
        }
    }

    /// Stop clients unused for longer than `max_idle`; returns how many stopped.
    pub async fn cleanup_idle(&self, max_idle: Duration) -> usize {
        let idle_languages: Vec<Language> = {
            let clients = self.clients.read().await;
            clients
                .iter()
                .filter(|(_, state)| state.idle_duration() > max_idle)
                .filter_map(|(lang, state)| state.client().map(|_| *lang))
                .collect()
        };

        let mut stopped = 0;
        for lang in idle_languages {
            if self.shutdown_client(lang).await.is_ok() {
                tracing::info!("{} language server stopped (idle)", lang);
                stopped += 1;
            }
        }

        stopped
    }

    pub async fn server_state(&self, language: Language) -> ServerState {
        let client = {
            let clients = self.clients.read().await;
            match clients.get(&language) {
                None => return ServerState::NotStarted,
                Some(ClientState::Initializing(_)) => return ServerState::Starting,
                Some(ClientState::Ready { client, .. }) => Arc::clone(client),
            }
        };

        if client.is_terminated() {
            ServerState::Closed
        } else if client.is_shut_down() {
            ServerState::ShuttingDown
        } else {
            ServerState::Initialized
        }
    }

    pub async fn server_status(&self, language: Language) -> ServerStatus {
        let Some(spec) = self.specs.get(&language) else {
            return ServerStatus::NotSupported;
        };
        let name = spec.name.to_string();

        if self.server_state(language).await == ServerState::Initialized {
            return ServerStatus::Running { name };
        }

        match self.locator.locate_local(language, spec) {
            Some(resolved) => ServerStatus::Stopped {
                name,
                command: resolved.command,
            },
            None if spec.download.is_some() => ServerStatus::Downloadable { name },
            None => ServerStatus::NotInstalled {
                name,
                install_hint: spec.install_hint().to_string(),
            },
        }
    }

    pub async fn running_languages(&self) -> Vec<Language> {
        let clients = self.clients.read().await;
        let mut running: Vec<Language> = clients
            .iter()
            .filter_map(|(lang, state)| state.client().map(|c| (*lang, c)))
            .filter(|(_, client)| !client.is_terminated() && !client.is_shut_down())
            .map(|(lang, _)| lang)
            .collect();
        running.sort_by_key(|l| l.lsp_id());
        running
    }

    pub async fn idle_duration(&self, language: Language) -> Option<Duration> {
        let clients = self.clients.read().await;
        clients.get(&language).map(|state| state.idle_duration())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn spec(&self, language: Language) -> Option<&ServerSpec> {
        self.specs.get(&language)
    }

    pub fn locator(&self) -> &ServerLocator {
        &self.locator
    }

    /// Run `op` against the language's client, retrying transient failures.
    ///
    /// A server that died mid-call is restarted once when auto-restart is on.
    pub async fn execute_with_retry<F, T, Fut>(
        &self,
        language: Language,
        op: F,
    ) -> Result<T, LspError>
    where
        F: Fn(Arc<LspClient>) -> Fut,
        Fut: Future<Output = Result<T, LspError>>,
    {
        use crate::infra::retry::{RetryPolicy, with_retry};

        let restarted = AtomicBool::new(false);
        let policy = if crate::config::auto_restart() {
            RetryPolicy::for_language(language)
        } else {
            RetryPolicy::ONCE
        };

        with_retry(policy, || async {
            let client = self.get_client(language).await?;
            match op(Arc::clone(&client)).await {
                Err(e) if e.needs_restart() => {
                    if restarted.swap(true, Ordering::AcqRel) {
                        // Restarted once already; report instead of looping
                        return Err(LspError::ServerStart(e.to_string()));
                    }
                    tracing::warn!("{} server error, restarting: {}", language, e);
                    let _ = self.shutdown_client(language).await;
                    Err(e)
                }
                other => other,
            }
        })
        .await
    }
}

#[derive(Debug, Clone)]
pub enum ServerStatus {
    Running { name: String },
    Stopped { name: String, command: PathBuf },
    Downloadable { name: String },
    NotInstalled { name: String, install_hint: String },
    NotSupported,
}

impl std::fmt::Display for ServerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServerStatus::Running { name } => write!(f, "{} (running)", name),
            ServerStatus::Stopped { name, command } => {
                write!(f, "{} (stopped) {}", name, command.display())
            }
            ServerStatus::Downloadable { name } => {
                write!(f, "{} (downloaded on first use)", name)
            }
            ServerStatus::NotInstalled { name, install_hint } => {
                write!(f, "{} (not installed)\n  Install: {}", name, install_hint)
            }
            ServerStatus::NotSupported => write!(f, "Not supported"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::lsp::protocol::Request;
    use crate::infra::lsp::testing::{
        FakeLauncher, Handler, fake_manager, initialize_result, method_not_found,
    };
    use std::sync::atomic::AtomicUsize;

    fn launcher(document_symbols: bool) -> Arc<FakeLauncher> {
        let handler: Handler = Arc::new(move |request: &Request| match request.method.as_str() {
            "initialize" => Ok(initialize_result(document_symbols)),
            _ => Err(method_not_found(request)),
        });
        // Slow enough for concurrent callers to pile up
        FakeLauncher::with_delay(handler, Duration::from_millis(50))
    }

    fn manager(launcher: Arc<FakeLauncher>) -> LspManager {
        fake_manager("/work/infra", launcher)
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_start() {
        let launcher = launcher(true);
        let manager = Arc::new(manager(Arc::clone(&launcher)));

        let calls = (0..8).map(|_| {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move { manager.get_client(Language::Terraform).await })
        });
        let clients: Vec<_> = futures::future::join_all(calls)
            .await
            .into_iter()
            .map(|r| r.unwrap().unwrap())
            .collect();

        assert_eq!(launcher.launches(), 1);
        assert!(clients.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
        assert_eq!(
            manager.server_state(Language::Terraform).await,
            ServerState::Initialized
        );
    }

    #[tokio::test]
    async fn test_cancelled_start_releases_slot() {
        let launcher = launcher(true);
        let manager = manager(Arc::clone(&launcher));

        let starting = manager.get_client(Language::Terraform);
        assert!(tokio::time::timeout(Duration::from_millis(10), starting).await.is_err());
        assert_eq!(
            manager.server_state(Language::Terraform).await,
            ServerState::NotStarted
        );

        let retry = manager.get_client(Language::Terraform);
        let client = tokio::time::timeout(Duration::from_secs(2), retry)
            .await
            .expect("later callers must not wait on an abandoned start")
            .unwrap();
        assert!(!client.is_terminated());
        assert_eq!(launcher.launches(), 2);
    }

    #[tokio::test]
    async fn test_missing_document_symbol_support_is_rejected() {
        let launcher = launcher(false);
        let manager = manager(Arc::clone(&launcher));

        let err = manager.get_client(Language::Terraform).await.unwrap_err();
        assert!(matches!(
            err,
            LspError::FeatureNotSupported { ref server, ref feature, .. }
                if server == "fake-ls" && feature == "documentSymbolProvider"
        ));
        assert_eq!(
            manager.server_state(Language::Terraform).await,
            ServerState::NotStarted
        );
    }

    #[tokio::test]
    async fn test_shutdown_and_restart() {
        let launcher = launcher(true);
        let manager = manager(Arc::clone(&launcher));

        let first = manager.get_client(Language::Terraform).await.unwrap();
        manager.shutdown_client(Language::Terraform).await.unwrap();
        assert!(first.is_shut_down());
        assert_eq!(
            manager.server_state(Language::Terraform).await,
            ServerState::NotStarted
        );

        let second = manager.restart_client(Language::Terraform).await.unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(launcher.launches(), 2);

        manager.shutdown_all().await;
        assert!(second.is_shut_down());
        assert!(manager.running_languages().await.is_empty());
    }

    #[tokio::test]
    async fn test_cleanup_idle() {
        let manager = manager(launcher(true));
        manager.get_client(Language::Terraform).await.unwrap();

        assert_eq!(manager.cleanup_idle(Duration::from_secs(60)).await, 0);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(manager.cleanup_idle(Duration::from_millis(10)).await, 1);
        assert_eq!(
            manager.server_state(Language::Terraform).await,
            ServerState::NotStarted
        );
    }

    #[tokio::test]
    async fn test_execute_with_retry_restarts_dead_server_once() {
        let launcher = launcher(true);
        let manager = manager(Arc::clone(&launcher));
        let attempts = AtomicUsize::new(0);
        let attempts = &attempts;

        let result = manager
            .execute_with_retry(Language::Terraform, |_client| async move {
                if attempts.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(LspError::ServerTerminated {
                        language: Language::Terraform,
                    })
                } else {
                    Ok("done")
                }
            })
            .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(launcher.launches(), 2);
    }

    #[test]
    fn test_server_status_display() {
        let status = ServerStatus::NotInstalled {
            name: "pyright".to_string(),
            install_hint: "npm install -g pyright".to_string(),
        };
        let display = status.to_string();
        assert!(display.contains("not installed"));
        assert!(display.contains("npm"));
        assert_eq!(ServerState::ShuttingDown.as_str(), "shutting_down");
    }
}

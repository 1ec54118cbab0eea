//! Application container for symlens

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::cli::{OutputContext, OutputFormat};
use crate::config;
use crate::infra::lsp::LspManager;
use crate::models::config::SymlensConfig;
use crate::services::config::{ConfigService, DefaultConfigService};
use crate::services::project::{DefaultProjectService, ProjectService};
use crate::services::symbols::{
    FileSymbolCache, Navigator, NoopCache, SymbolCache, SymbolEditor, SymbolMatcher,
    SymbolNormalizer,
};

pub struct App {
    root: PathBuf,
    pub(crate) output: OutputContext,
    pub(crate) config: SymlensConfig,
    pub(crate) config_service: Arc<dyn ConfigService>,
    pub(crate) project: Arc<dyn ProjectService>,
    pub(crate) manager: Arc<LspManager>,
    pub(crate) cache: Arc<dyn SymbolCache>,
    pub(crate) normalizer: Arc<SymbolNormalizer>,
    pub(crate) matcher: SymbolMatcher,
    pub(crate) editor: SymbolEditor,
    pub(crate) navigator: Navigator,
}

impl App {
    /// Load configuration for `root` (the current directory when `None`) and wire services
    pub async fn new(root: Option<PathBuf>, format: Option<OutputFormat>) -> anyhow::Result<Self> {
        let root = match root {
            Some(root) => root,
            None => std::env::current_dir()?,
        };
        tracing::debug!("Initializing symlens at {:?}", root);

        let config_service = Arc::new(DefaultConfigService::new(&root));
        let config = config_service.load(false).await?;
        config::init(&config);

        let format = match format {
            Some(format) => format,
            None => config
                .output
                .format
                .parse()
                .map_err(|e: String| anyhow::anyhow!(e))?,
        };

        let project: Arc<dyn ProjectService> = Arc::new(DefaultProjectService::new(&root, &config)?);
        let root = project.root().to_path_buf();

        let manager = Arc::new(LspManager::new(root.clone(), &config.lsp));
        let cache: Arc<dyn SymbolCache> = if config.cache.enabled {
            Arc::new(FileSymbolCache::for_project(&root))
        } else {
            Arc::new(NoopCache)
        };
        let normalizer = Arc::new(SymbolNormalizer::new(
            Arc::clone(&project),
            Arc::clone(&manager),
            Arc::clone(&cache),
        ));

        tracing::info!(
            "symlens ready at {} (languages: {:?}, cache: {})",
            root.display(),
            project.languages(),
            if config.cache.enabled { "on" } else { "off" }
        );

        Ok(Self {
            root,
            output: OutputContext::new(format),
            config,
            config_service,
            project,
            manager,
            cache,
            matcher: SymbolMatcher::new(Arc::clone(&normalizer)),
            editor: SymbolEditor::new(Arc::clone(&normalizer)),
            navigator: Navigator::new(Arc::clone(&normalizer)),
            normalizer,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn output(&self) -> &OutputContext {
        &self.output
    }

    pub fn config(&self) -> &SymlensConfig {
        &self.config
    }

    /// Stop every language server started during this run
    pub async fn shutdown(&self) {
        self.manager.shutdown_all().await;
    }
}

//! References, definitions and hover for a symbol named by its name path

use std::future::Future;
use std::sync::Arc;

use serde::Serialize;

use super::matcher::SymbolMatcher;
use super::normalizer::SymbolNormalizer;
use super::{language_for, split_lines};
use crate::error::{LspError, SymlensResult};
use crate::infra::lsp::LspClient;
use crate::infra::lsp::protocol::LspLocation;
use crate::models::lsp::{HoverInfo, Range, path_to_uri, uri_to_path};
use crate::models::symbol::SymbolNode;

/// A location inside the project with the text of its first line
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReferenceLocation {
    pub relative_path: String,
    pub range: Range,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line_text: Option<String>,
}

pub struct Navigator {
    normalizer: Arc<SymbolNormalizer>,
    matcher: SymbolMatcher,
}

impl Navigator {
    pub fn new(normalizer: Arc<SymbolNormalizer>) -> Self {
        Self {
            matcher: SymbolMatcher::new(Arc::clone(&normalizer)),
            normalizer,
        }
    }

    pub async fn find_references(
        &self,
        name_path: &str,
        file: &str,
        include_declaration: bool,
    ) -> SymlensResult<Vec<ReferenceLocation>> {
        let locations = self
            .query(name_path, file, |client, uri, symbol| async move {
                client
                    .references(&uri, symbol.selection_range.start, include_declaration)
                    .await
            })
            .await?;
        Ok(self.to_project_locations(locations).await)
    }

    pub async fn find_definition(
        &self,
        name_path: &str,
        file: &str,
    ) -> SymlensResult<Vec<ReferenceLocation>> {
        let locations = self
            .query(name_path, file, |client, uri, symbol| async move {
                client.definition(&uri, symbol.selection_range.start).await
            })
            .await?;
        Ok(self.to_project_locations(locations).await)
    }

    /// Hover text at the symbol's identifier, `None` when the server has nothing
    pub async fn hover(&self, name_path: &str, file: &str) -> SymlensResult<Option<HoverInfo>> {
        let hover = self
            .query(name_path, file, |client, uri, symbol| async move {
                client.hover(&uri, symbol.selection_range.start).await
            })
            .await?;

        Ok(hover
            .map(|h| HoverInfo {
                content: h.contents.to_text(),
                range: h.range,
            })
            .filter(|info| !info.content.trim().is_empty()))
    }

    /// Resolve the symbol, then run `op` with the file open on its server
    async fn query<T, F, Fut>(&self, name_path: &str, file: &str, op: F) -> SymlensResult<T>
    where
        F: Fn(Arc<LspClient>, String, SymbolNode) -> Fut,
        Fut: Future<Output = Result<T, LspError>>,
    {
        let relative = self.normalizer.resolve(file)?;
        let symbol = self.matcher.find_unique(name_path, &relative).await?;
        let language = language_for(&relative)?;
        let content = self.normalizer.project().read_file(&relative).await?;
        let uri = path_to_uri(&self.normalizer.project().root().join(&relative));

        let result = self
            .normalizer
            .manager()
            .execute_with_retry(language, |client| {
                let (uri, content, symbol, op) = (&uri, &content, &symbol, &op);
                async move {
                    client.did_open(uri, content).await?;
                    let result = op(Arc::clone(&client), uri.clone(), symbol.clone()).await;
                    if let Err(e) = client.did_close(uri).await {
                        tracing::debug!("didClose failed for {}: {}", uri, e);
                    }
                    result
                }
            })
            .await?;
        Ok(result)
    }

    /// Project-relative locations with line text, dropping those outside the root
    async fn to_project_locations(&self, locations: Vec<LspLocation>) -> Vec<ReferenceLocation> {
        let project = self.normalizer.project();
        let mut results = Vec::with_capacity(locations.len());

        for location in locations {
            let path = uri_to_path(&location.uri);
            let Some(relative) = project.relative_path(&path) else {
                tracing::debug!("Dropping location outside project: {}", location.uri);
                continue;
            };
            let line_text = match project.read_file(&relative).await {
                Ok(content) => split_lines(&content)
                    .get(location.range.start.line as usize)
                    .map(|line| line.trim().to_string()),
                Err(_) => None,
            };
            results.push(ReferenceLocation {
                relative_path: relative,
                range: location.range,
                line_text,
            });
        }

        results.sort_by(|a, b| {
            a.relative_path
                .cmp(&b.relative_path)
                .then(a.range.start.cmp(&b.range.start))
        });
        results.dedup();
        results
    }
}

//! Document symbols in the unified model
//!
//! didOpen → documentSymbol → didClose, then conversion into [`SymbolNode`] trees with
//! name paths and body text. Results are gated by the file's content hash.

use std::sync::Arc;

use super::cache::SymbolCache;
use super::{byte_offset, language_for, split_lines};
use crate::error::{ProjectError, SymlensResult};
use crate::infra::hash_content;
use crate::infra::lsp::LspManager;
use crate::infra::lsp::protocol::{DocumentSymbol, DocumentSymbolResponse, SymbolInformation};
use crate::models::lsp::{Range, path_to_uri};
use crate::models::symbol::{SymbolKind, SymbolNode};
use crate::services::project::ProjectService;

pub struct SymbolNormalizer {
    project: Arc<dyn ProjectService>,
    manager: Arc<LspManager>,
    cache: Arc<dyn SymbolCache>,
}

impl SymbolNormalizer {
    pub fn new(
        project: Arc<dyn ProjectService>,
        manager: Arc<LspManager>,
        cache: Arc<dyn SymbolCache>,
    ) -> Self {
        Self {
            project,
            manager,
            cache,
        }
    }

    pub fn project(&self) -> &Arc<dyn ProjectService> {
        &self.project
    }

    pub fn manager(&self) -> &Arc<LspManager> {
        &self.manager
    }

    pub fn cache(&self) -> &Arc<dyn SymbolCache> {
        &self.cache
    }

    /// Validated, project-relative form of `path`
    pub fn resolve(&self, path: &str) -> SymlensResult<String> {
        let absolute = self.project.validate_path(path)?;
        self.project
            .relative_path(&absolute)
            .ok_or_else(|| ProjectError::OutsideRoot(path.to_string()).into())
    }

    /// Symbol forest of one file, from the cache when its content is unchanged
    pub async fn get_document_symbols(&self, path: &str) -> SymlensResult<Arc<Vec<SymbolNode>>> {
        let relative = self.resolve(path)?;
        let language = language_for(&relative)?;
        let content = self.project.read_file(&relative).await?;
        let hash = hash_content(&content);

        if let Some(symbols) = self.cache.get(language, &relative, &hash).await {
            return Ok(symbols);
        }

        let uri = path_to_uri(&self.project.root().join(&relative));
        let response = self
            .manager
            .execute_with_retry(language, |client| {
                let (uri, content) = (&uri, &content);
                async move {
                    client.did_open(uri, content).await?;
                    let result = client.document_symbols(uri).await;
                    if let Err(e) = client.did_close(uri).await {
                        tracing::debug!("didClose failed for {}: {}", uri, e);
                    }
                    result
                }
            })
            .await?;

        let lines = split_lines(&content);
        let symbols = Arc::new(normalize(response, &relative, &lines));
        tracing::debug!("Normalized {} top-level symbols in {}", symbols.len(), relative);

        if let Err(e) = self
            .cache
            .set(language, &relative, &hash, Arc::clone(&symbols))
            .await
        {
            tracing::warn!("Failed to cache symbols for {}: {}", relative, e);
        }

        Ok(symbols)
    }

    /// Top-level symbols of a file without bodies, children kept to `depth` levels
    pub async fn get_symbols_overview(
        &self,
        path: &str,
        depth: usize,
    ) -> SymlensResult<Vec<SymbolNode>> {
        let symbols = self.get_document_symbols(path).await?;
        Ok(symbols.iter().map(|s| s.outline(depth)).collect())
    }
}

/// Convert either documentSymbol result shape into a forest
pub fn normalize(
    response: DocumentSymbolResponse,
    relative_path: &str,
    lines: &[&str],
) -> Vec<SymbolNode> {
    match response {
        DocumentSymbolResponse::Nested(symbols) => symbols
            .iter()
            .map(|s| convert_nested(s, relative_path, None, lines))
            .collect(),
        DocumentSymbolResponse::Flat(infos) => convert_flat(&infos, relative_path, lines),
    }
}

fn convert_nested(
    symbol: &DocumentSymbol,
    relative_path: &str,
    parent_path: Option<&str>,
    lines: &[&str],
) -> SymbolNode {
    let mut node = SymbolNode::new(
        symbol.name.clone(),
        SymbolKind::from_lsp(symbol.kind),
        relative_path,
        symbol.range,
    )
    .with_selection_range(symbol.selection_range);

    node.detail = symbol.detail.clone();
    node.body = extract_body(&symbol.range, lines);
    if let Some(parent) = parent_path {
        node.name_path = format!("{}/{}", parent, symbol.name);
    }
    node.children = symbol
        .children
        .iter()
        .flatten()
        .map(|child| convert_nested(child, relative_path, Some(&node.name_path), lines))
        .collect();
    node
}

/// Rebuild a tree from `SymbolInformation[]` using `containerName`.
///
/// A container is the closest earlier symbol with that name whose range encloses
/// the child; failing that, the closest earlier one with that name.
fn convert_flat(
    infos: &[SymbolInformation],
    relative_path: &str,
    lines: &[&str],
) -> Vec<SymbolNode> {
    let mut nodes: Vec<Option<SymbolNode>> = Vec::with_capacity(infos.len());
    let mut parents: Vec<Option<usize>> = Vec::with_capacity(infos.len());

    for (i, info) in infos.iter().enumerate() {
        let range = info.location.range;
        let parent = info
            .container_name
            .as_deref()
            .filter(|c| !c.is_empty())
            .and_then(|container| {
                let candidates = || (0..i).rev().filter(|&j| infos[j].name == container);
                candidates()
                    .find(|&j| encloses(&infos[j].location.range, &range))
                    .or_else(|| candidates().next())
            });
        parents.push(parent);

        let mut node = SymbolNode::new(
            info.name.clone(),
            SymbolKind::from_lsp(info.kind),
            relative_path,
            range,
        );
        node.body = extract_body(&range, lines);
        nodes.push(Some(node));
    }

    // Parents always precede their children
    for i in (0..nodes.len()).rev() {
        if let Some(p) = parents[i]
            && let Some(child) = nodes[i].take()
            && let Some(parent) = nodes[p].as_mut()
        {
            parent.children.insert(0, child);
        }
    }

    nodes
        .into_iter()
        .flatten()
        .map(|mut root| {
            root.compute_paths(None);
            root
        })
        .collect()
}

fn encloses(outer: &Range, inner: &Range) -> bool {
    outer.start <= inner.start && inner.end <= outer.end
}

/// Text covered by `range`, or `""` when it starts or ends past the last line.
///
/// Character offsets clamp to the line length.
pub fn extract_body(range: &Range, lines: &[&str]) -> String {
    let start = range.start.line as usize;
    let end = range.end.line as usize;
    if start >= lines.len() || end >= lines.len() || end < start {
        return String::new();
    }

    if start == end {
        let line = lines[start];
        let from = byte_offset(line, range.start.character);
        let to = byte_offset(line, range.end.character);
        if from >= line.len() || to <= from {
            return String::new();
        }
        return line[from..to].to_string();
    }

    let mut parts: Vec<&str> = Vec::with_capacity(end - start + 1);
    let first = lines[start];
    let from = byte_offset(first, range.start.character);
    if from < first.len() {
        parts.push(&first[from..]);
    }
    parts.extend(&lines[start + 1..end]);
    let last = lines[end];
    parts.push(&last[..byte_offset(last, range.end.character)]);
    parts.join("\n")
}

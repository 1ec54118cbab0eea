//! Name-path lookup across files
//!
//! A pattern is a `/`-separated chain of symbol names. A leading `/` anchors it at
//! the top level of a file; otherwise it matches the tail of a symbol's name path.

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};

use super::normalizer::SymbolNormalizer;
use crate::error::{SymlensError, SymlensResult};
use crate::models::symbol::{SymbolKind, SymbolNode};

/// Files queried at once during a project-wide search
const SEARCH_CONCURRENCY: usize = 4;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FindOptions {
    /// File or directory to search, the whole project when `None`
    pub within: Option<String>,
    /// Let the last pattern segment match as a substring
    pub substring: bool,
    pub include_kinds: Vec<SymbolKind>,
    pub exclude_kinds: Vec<SymbolKind>,
}

impl FindOptions {
    pub fn within(path: impl Into<String>) -> Self {
        Self {
            within: Some(path.into()),
            ..Default::default()
        }
    }

    fn kind_allowed(&self, kind: SymbolKind) -> bool {
        !self.exclude_kinds.contains(&kind)
            && (self.include_kinds.is_empty() || self.include_kinds.contains(&kind))
    }
}

/// Whether `name_path` matches `pattern`.
///
/// Absolute patterns (`/a/b`) compare from the first segment and may stop short of
/// the full path; relative ones align with the last segments. Only the final
/// pattern segment is compared as a substring when `substring` is set.
pub fn name_path_matches(name_path: &str, pattern: &str, substring: bool) -> bool {
    let absolute = pattern.starts_with('/');
    let pattern = pattern.trim_matches('/');
    if pattern.is_empty() {
        return false;
    }

    let expected: Vec<&str> = pattern.split('/').collect();
    let actual: Vec<&str> = name_path.split('/').collect();
    if expected.len() > actual.len() {
        return false;
    }

    let offset = if absolute {
        0
    } else {
        actual.len() - expected.len()
    };
    let last = expected.len() - 1;

    expected.iter().enumerate().all(|(i, segment)| {
        let candidate = actual[offset + i];
        if i == last && substring {
            candidate.contains(segment)
        } else {
            candidate == *segment
        }
    })
}

/// Matching nodes of a forest in pre-order
pub fn search_forest(forest: &[SymbolNode], pattern: &str, options: &FindOptions) -> Vec<SymbolNode> {
    SymbolNode::walk_forest(forest)
        .filter(|node| options.kind_allowed(node.kind))
        .filter(|node| name_path_matches(&node.name_path, pattern, options.substring))
        .cloned()
        .collect()
}

pub struct SymbolMatcher {
    normalizer: Arc<SymbolNormalizer>,
}

impl SymbolMatcher {
    pub fn new(normalizer: Arc<SymbolNormalizer>) -> Self {
        Self { normalizer }
    }

    pub fn normalizer(&self) -> &Arc<SymbolNormalizer> {
        &self.normalizer
    }

    /// All symbols matching `pattern`, ordered by file then start line.
    ///
    /// Files whose symbols cannot be fetched are skipped with a warning.
    pub async fn find_symbols_by_name(
        &self,
        pattern: &str,
        options: &FindOptions,
    ) -> SymlensResult<Vec<SymbolNode>> {
        let files = self.files_in_scope(options.within.as_deref())?;
        tracing::debug!("Searching '{}' in {} files", pattern, files.len());

        let per_file: Vec<Vec<SymbolNode>> = stream::iter(files)
            .map(|file| async move {
                match self.normalizer.get_document_symbols(&file).await {
                    Ok(symbols) => search_forest(&symbols, pattern, options),
                    Err(e) => {
                        tracing::warn!("Skipping {}: {}", file, e);
                        Vec::new()
                    }
                }
            })
            .buffer_unordered(SEARCH_CONCURRENCY)
            .collect()
            .await;

        let mut results: Vec<SymbolNode> = per_file.into_iter().flatten().collect();
        results.sort_by(|a, b| {
            a.relative_path
                .cmp(&b.relative_path)
                .then(a.range.start.line.cmp(&b.range.start.line))
        });
        Ok(results)
    }

    /// The single symbol in `file` matching `name_path` without substring matching.
    ///
    /// An absolute pattern also matches descendants of its target, so for absolute
    /// patterns the symbol exactly as deep as the pattern takes precedence. A relative
    /// pattern matching several symbols is always ambiguous.
    pub async fn find_unique(&self, name_path: &str, file: &str) -> SymlensResult<SymbolNode> {
        let symbols = self.normalizer.get_document_symbols(file).await?;
        let mut matches = search_forest(&symbols, name_path, &FindOptions::default());

        if matches.len() > 1 && name_path.starts_with('/') {
            let depth = name_path.trim_matches('/').split('/').count();
            let exact: Vec<SymbolNode> = matches
                .iter()
                .filter(|s| s.name_path.split('/').count() == depth)
                .cloned()
                .collect();
            if exact.len() == 1 {
                matches = exact;
            }
        }

        match matches.len() {
            0 => Err(SymlensError::not_found(name_path, file)),
            1 => Ok(matches.remove(0)),
            count => Err(SymlensError::AmbiguousMatch {
                name_path: name_path.to_string(),
                file: file.to_string(),
                count,
            }),
        }
    }

    /// Relative paths to search: one file, or every source file below a directory
    fn files_in_scope(&self, within: Option<&str>) -> SymlensResult<Vec<String>> {
        let project = self.normalizer.project();

        if let Some(path) = within
            && project.validate_path(path)?.is_file()
        {
            return Ok(vec![self.normalizer.resolve(path)?]);
        }

        let mut files = Vec::new();
        for language in project.languages() {
            files.extend(project.list_source_files(*language, within)?);
        }
        files.sort();
        files.dedup();
        Ok(files)
    }
}

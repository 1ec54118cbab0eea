//! Symbol- and line-relative file edits
//!
//! Every operation resolves and validates its target before touching the file, so a
//! rejected edit leaves the file as it was. Renames go through the language server
//! and may span several files; those are written one by one without rollback.

use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;

use super::matcher::SymbolMatcher;
use super::normalizer::SymbolNormalizer;
use super::{byte_offset, language_for, split_lines};
use crate::error::{LspError, ProjectError, SymlensError, SymlensResult};
use crate::models::lsp::{FileChange, TextEdit, WorkspaceEdit, path_to_uri, uri_to_path};
use crate::models::symbol::SymbolNode;

#[derive(Debug, Clone, Serialize)]
pub struct RenameOutcome {
    pub symbol: SymbolNode,
    pub new_name: String,
    pub files: Vec<FileChange>,
}

pub struct SymbolEditor {
    normalizer: Arc<SymbolNormalizer>,
    matcher: SymbolMatcher,
}

impl SymbolEditor {
    pub fn new(normalizer: Arc<SymbolNormalizer>) -> Self {
        Self {
            matcher: SymbolMatcher::new(Arc::clone(&normalizer)),
            normalizer,
        }
    }

    /// Replace the whole lines spanned by the symbol's range with `body`
    pub async fn replace_symbol_body(
        &self,
        name_path: &str,
        file: &str,
        body: &str,
    ) -> SymlensResult<SymbolNode> {
        let (relative, symbol) = self.resolve_symbol(name_path, file).await?;
        let content = self.normalizer.project().read_file(&relative).await?;
        let lines = split_lines(&content);

        let start = symbol.range.start.line as usize;
        let end = symbol.range.end.line as usize;
        check_line_range(&relative, start, end, lines.len())?;

        let updated = splice(&lines, start, end + 1, &content_lines(body));
        self.write(&relative, &updated).await?;
        tracing::info!("Replaced body of {} in {}", symbol.name_path, relative);
        Ok(symbol.outline(0))
    }

    /// Insert `content` on the line after the symbol ends
    pub async fn insert_after_symbol(
        &self,
        name_path: &str,
        file: &str,
        content: &str,
    ) -> SymlensResult<SymbolNode> {
        let (relative, symbol) = self.resolve_symbol(name_path, file).await?;
        self.insert_at_line(&relative, symbol.range.end.line as usize + 1, content)
            .await?;
        Ok(symbol.outline(0))
    }

    /// Insert `content` on the symbol's first line, pushing the symbol down
    pub async fn insert_before_symbol(
        &self,
        name_path: &str,
        file: &str,
        content: &str,
    ) -> SymlensResult<SymbolNode> {
        let (relative, symbol) = self.resolve_symbol(name_path, file).await?;
        self.insert_at_line(&relative, symbol.range.start.line as usize, content)
            .await?;
        Ok(symbol.outline(0))
    }

    /// Insert before 0-based `line`; `line` may equal the line count to append
    pub async fn insert_at_line(&self, file: &str, line: usize, content: &str) -> SymlensResult<()> {
        let relative = self.normalizer.resolve(file)?;
        let current = self.normalizer.project().read_file(&relative).await?;
        let lines = split_lines(&current);

        if line > lines.len() {
            return Err(SymlensError::invalid_range(
                &relative,
                format!("line {} is past the end of the file ({} lines)", line, lines.len()),
            ));
        }

        let updated = splice(&lines, line, line, &content_lines(content));
        self.write(&relative, &updated).await?;
        Ok(())
    }

    /// Delete 0-based lines `start..=end`
    pub async fn delete_lines(&self, file: &str, start: usize, end: usize) -> SymlensResult<()> {
        let relative = self.normalizer.resolve(file)?;
        let current = self.normalizer.project().read_file(&relative).await?;
        let lines = split_lines(&current);
        check_line_range(&relative, start, end, lines.len())?;

        let updated = splice(&lines, start, end + 1, &[]);
        self.write(&relative, &updated).await?;
        Ok(())
    }

    /// Replace 0-based lines `start..=end` with `content`
    pub async fn replace_lines(
        &self,
        file: &str,
        start: usize,
        end: usize,
        content: &str,
    ) -> SymlensResult<()> {
        let relative = self.normalizer.resolve(file)?;
        let current = self.normalizer.project().read_file(&relative).await?;
        let lines = split_lines(&current);
        check_line_range(&relative, start, end, lines.len())?;

        let updated = splice(&lines, start, end + 1, &content_lines(content));
        self.write(&relative, &updated).await?;
        Ok(())
    }

    /// Rename through the language server, anchored at the symbol's identifier
    pub async fn rename_symbol(
        &self,
        name_path: &str,
        file: &str,
        new_name: &str,
    ) -> SymlensResult<RenameOutcome> {
        let (relative, symbol) = self.resolve_symbol(name_path, file).await?;
        let language = language_for(&relative)?;
        let content = self.normalizer.project().read_file(&relative).await?;
        let uri = path_to_uri(&self.normalizer.project().root().join(&relative));
        let position = symbol.selection_range.start;

        let edit = self
            .normalizer
            .manager()
            .execute_with_retry(language, |client| {
                let (uri, content) = (&uri, &content);
                async move {
                    client.did_open(uri, content).await?;
                    let result = client.rename(uri, position, new_name).await;
                    if let Err(e) = client.did_close(uri).await {
                        tracing::debug!("didClose failed for {}: {}", uri, e);
                    }
                    result
                }
            })
            .await?
            .ok_or_else(|| {
                LspError::Protocol(format!("rename of '{}' returned no edits", name_path))
            })?;

        let files = self.apply_workspace_edit(&edit).await?;
        tracing::info!(
            "Renamed {} to {} across {} files",
            symbol.name_path,
            new_name,
            files.len()
        );

        Ok(RenameOutcome {
            symbol: symbol.outline(0),
            new_name: new_name.to_string(),
            files,
        })
    }

    /// Apply a WorkspaceEdit, one write per file.
    ///
    /// All target files are validated and rewritten in memory first. Writes are not
    /// transactional: a failed write reports the files already written.
    pub async fn apply_workspace_edit(&self, edit: &WorkspaceEdit) -> SymlensResult<Vec<FileChange>> {
        let project = self.normalizer.project();

        let operations = edit.resource_operations();
        if !operations.is_empty() {
            return Err(SymlensError::UnsupportedEdit(format!(
                "file operations are not applied: {}",
                operations.join(", ")
            )));
        }

        let mut by_uri: Vec<(String, Vec<TextEdit>)> = edit.edits_by_uri().into_iter().collect();
        by_uri.sort_by(|a, b| a.0.cmp(&b.0));

        let mut pending = Vec::with_capacity(by_uri.len());
        for (uri, edits) in by_uri {
            if edits.is_empty() {
                continue;
            }
            let path = uri_to_path(&uri);
            let relative = project
                .relative_path(&path)
                .ok_or_else(|| ProjectError::OutsideRoot(path.display().to_string()))?;
            project.validate_path(&relative)?;
            let content = project.read_file(&relative).await?;
            let count = edits.len();
            pending.push((relative, apply_text_edits(&content, edits), count));
        }

        let mut written: Vec<String> = Vec::with_capacity(pending.len());
        let mut changes = Vec::with_capacity(pending.len());
        for (relative, updated, edit_count) in pending {
            if let Err(e) = self.write(&relative, &updated).await {
                tracing::error!("Edit stopped at {}: {}", relative, e);
                return Err(SymlensError::PartialEdit {
                    written,
                    source: Box::new(e),
                });
            }
            changes.push(FileChange {
                file: PathBuf::from(&relative),
                edit_count,
            });
            written.push(relative);
        }

        Ok(changes)
    }

    /// Write and drop the file's cached symbols
    async fn write(&self, relative: &str, content: &str) -> SymlensResult<()> {
        self.normalizer.project().write_file(relative, content).await?;
        if let Ok(language) = language_for(relative) {
            self.normalizer.cache().invalidate(language, relative).await;
        }
        Ok(())
    }

    async fn resolve_symbol(&self, name_path: &str, file: &str) -> SymlensResult<(String, SymbolNode)> {
        let relative = self.normalizer.resolve(file)?;
        let symbol = self.matcher.find_unique(name_path, &relative).await?;
        Ok((relative, symbol))
    }
}

/// Apply text edits to `content`, last position first.
///
/// Edits starting past the last line are skipped; characters clamp to the line.
/// Edits sharing a start position land in the order given.
pub fn apply_text_edits(content: &str, mut edits: Vec<TextEdit>) -> String {
    let mut lines: Vec<String> = content.split('\n').map(str::to_string).collect();
    edits.sort_by_key(|edit| edit.range.start);

    for edit in edits.iter().rev() {
        let start = edit.range.start.line as usize;
        if start >= lines.len() {
            tracing::warn!("Skipping edit past end of file at line {}", start);
            continue;
        }
        let end = (edit.range.end.line as usize).clamp(start, lines.len() - 1);

        let first = &lines[start];
        let from = byte_offset(first, edit.range.start.character);
        let last = &lines[end];
        let mut to = byte_offset(last, edit.range.end.character);
        if end == start {
            to = to.max(from);
        }

        let replaced = format!("{}{}{}", &first[..from], edit.new_text, &last[to..]);
        let pieces: Vec<String> = replaced.split('\n').map(str::to_string).collect();
        lines.splice(start..=end, pieces);
    }

    lines.join("\n")
}

/// Lines of inserted text, one trailing newline dropped
fn content_lines(content: &str) -> Vec<&str> {
    content.strip_suffix('\n').unwrap_or(content).split('\n').collect()
}

/// `lines[..from] + replacement + lines[to..]`, newline-joined
fn splice(lines: &[&str], from: usize, to: usize, replacement: &[&str]) -> String {
    lines[..from]
        .iter()
        .chain(replacement)
        .chain(&lines[to..])
        .copied()
        .collect::<Vec<_>>()
        .join("\n")
}

fn check_line_range(file: &str, start: usize, end: usize, line_count: usize) -> SymlensResult<()> {
    if start > end {
        return Err(SymlensError::invalid_range(
            file,
            format!("start line {} is after end line {}", start, end),
        ));
    }
    if end >= line_count {
        return Err(SymlensError::invalid_range(
            file,
            format!("line {} is past the end of the file ({} lines)", end, line_count),
        ));
    }
    Ok(())
}

//! Temporary projects wired to an in-memory language server

use std::path::Path;
use std::sync::Arc;

use serde_json::{Value, json};
use tempfile::TempDir;

use super::cache::FileSymbolCache;
use super::normalizer::SymbolNormalizer;
use crate::infra::lsp::protocol::Request;
use crate::infra::lsp::testing::{FakeLauncher, Handler, RequestCounter, fake_manager, method_not_found};
use crate::models::config::SymlensConfig;
use crate::models::lsp::path_to_uri;
use crate::services::project::{DefaultProjectService, ProjectService};

pub struct Fixture {
    pub temp: TempDir,
    pub project: Arc<dyn ProjectService>,
    pub launcher: Arc<FakeLauncher>,
    pub requests: RequestCounter,
    pub normalizer: Arc<SymbolNormalizer>,
}

impl Fixture {
    /// `symbols` answers documentSymbol per relative path; everything else is MethodNotFound
    pub fn new(files: &[(&str, &str)], symbols: Vec<(&'static str, Value)>) -> Self {
        Self::with_handler(files, symbols, |_| -> Handler {
            Arc::new(|r: &Request| Err::<Value, _>(method_not_found(r)))
        })
    }

    /// Requests not answered from `symbols` go to the handler built from the project root
    pub fn with_handler(
        files: &[(&str, &str)],
        symbols: Vec<(&'static str, Value)>,
        fallback: impl FnOnce(&Path) -> Handler,
    ) -> Self {
        let temp = TempDir::new().unwrap();
        for (path, content) in files {
            let full = temp.path().join(path);
            std::fs::create_dir_all(full.parent().unwrap()).unwrap();
            std::fs::write(full, content).unwrap();
        }

        let project: Arc<dyn ProjectService> =
            Arc::new(DefaultProjectService::new(temp.path(), &SymlensConfig::default()).unwrap());
        let root = project.root().to_path_buf();
        let fallback = fallback(&root);

        let requests = RequestCounter::default();
        let counter = requests.clone();
        let handler: Handler = Arc::new(move |request: &Request| {
            counter.record(request);
            if request.method == "textDocument/documentSymbol" {
                let uri = request
                    .params
                    .as_ref()
                    .and_then(|p| p["textDocument"]["uri"].as_str())
                    .unwrap_or_default();
                if let Some((_, value)) = symbols
                    .iter()
                    .find(|(path, _)| uri.ends_with(&format!("/{}", path)))
                {
                    return Ok(value.clone());
                }
            }
            fallback(request)
        });

        let launcher = FakeLauncher::new(handler);
        let manager = Arc::new(fake_manager(root.clone(), Arc::clone(&launcher)));
        let cache = Arc::new(FileSymbolCache::for_project(&root));
        let normalizer = Arc::new(SymbolNormalizer::new(Arc::clone(&project), manager, cache));

        Self {
            temp,
            project,
            launcher,
            requests,
            normalizer,
        }
    }

    pub fn read(&self, relative_path: &str) -> String {
        std::fs::read_to_string(self.project.root().join(relative_path)).unwrap()
    }

    pub fn write(&self, relative_path: &str, content: &str) {
        std::fs::write(self.project.root().join(relative_path), content).unwrap();
    }

    pub fn uri(&self, relative_path: &str) -> String {
        path_to_uri(&self.project.root().join(relative_path))
    }
}

/// A DocumentSymbol whose selection range covers the name on the start line
pub fn sym(name: &str, kind: u32, range: [u32; 4], children: Vec<Value>) -> Value {
    let [sl, sc, el, ec] = range;
    json!({
        "name": name,
        "kind": kind,
        "range": {"start": {"line": sl, "character": sc}, "end": {"line": el, "character": ec}},
        "selectionRange": {
            "start": {"line": sl, "character": sc},
            "end": {"line": sl, "character": sc + name.chars().count() as u32}
        },
        "children": children
    })
}

/// A single TextEdit in wire form
pub fn text_edit(range: [u32; 4], new_text: &str) -> Value {
    let [sl, sc, el, ec] = range;
    json!({
        "range": {"start": {"line": sl, "character": sc}, "end": {"line": el, "character": ec}},
        "newText": new_text
    })
}

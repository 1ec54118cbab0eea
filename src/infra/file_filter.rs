//! File filtering with .gitignore integration
//!
//! Uses the `ignore` crate (from ripgrep) for gitignore-style pattern matching,
//! layered with per-language artifact rules and `.symlens/ignore`.

use std::path::{Component, Path, PathBuf};

use ignore::WalkBuilder;
use ignore::gitignore::{Gitignore, GitignoreBuilder};

use crate::models::symbol::Language;

/// File filter configuration
#[derive(Debug, Clone)]
pub struct FileFilterConfig {
    /// Root directory for relative path resolution
    pub root: PathBuf,
    /// Use .gitignore files for filtering
    pub respect_gitignore: bool,
    /// Use .symlens/ignore file for filtering
    pub respect_local_ignore: bool,
    /// Additional ignore patterns (gitignore syntax), from `project.ignored_paths`
    pub ignore_patterns: Vec<String>,
    /// Languages whose build artifacts are skipped
    pub languages: Vec<Language>,
    /// Hidden files/directories (starting with .)
    pub include_hidden: bool,
}

impl Default for FileFilterConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::new(),
            respect_gitignore: true,
            respect_local_ignore: true,
            ignore_patterns: Vec::new(),
            languages: Vec::new(),
            include_hidden: false,
        }
    }
}

/// File filter with gitignore integration
pub struct FileFilter {
    config: FileFilterConfig,
    gitignore: Option<Gitignore>,
    local_ignore: Option<Gitignore>,
    patterns: Option<Gitignore>,
}

impl FileFilter {
    pub fn new(config: FileFilterConfig) -> Self {
        let gitignore = if config.respect_gitignore {
            Self::load_gitignore(&config.root)
        } else {
            None
        };

        let local_ignore = if config.respect_local_ignore {
            Self::load_local_ignore(&config.root)
        } else {
            None
        };

        let patterns = Self::build_patterns(&config);

        Self {
            config,
            gitignore,
            local_ignore,
            patterns,
        }
    }

    /// Filter that respects .gitignore and the given languages' artifacts
    pub fn for_project(root: impl AsRef<Path>, languages: &[Language]) -> Self {
        Self::new(FileFilterConfig {
            root: root.as_ref().to_path_buf(),
            languages: languages.to_vec(),
            ..Default::default()
        })
    }

    /// Load all .gitignore files under root
    fn load_gitignore(root: &Path) -> Option<Gitignore> {
        let mut builder = GitignoreBuilder::new(root);

        let gitignore_path = root.join(".gitignore");
        if gitignore_path.exists()
            && let Some(err) = builder.add(&gitignore_path)
        {
            tracing::warn!("Failed to parse .gitignore: {}", err);
        }

        // Walking with gitignore on keeps us out of already-ignored trees
        let walker = WalkBuilder::new(root)
            .hidden(false)
            .git_ignore(true)
            .git_global(true)
            .git_exclude(true)
            .max_depth(Some(10))
            .build();

        for entry in walker.filter_map(|e| e.ok()) {
            let path = entry.path();
            if path.file_name() == Some(std::ffi::OsStr::new(".gitignore"))
                && path != gitignore_path
                && let Some(err) = builder.add(path)
            {
                tracing::warn!("Failed to parse {:?}: {}", path, err);
            }
        }

        builder.build().ok()
    }

    fn load_local_ignore(root: &Path) -> Option<Gitignore> {
        let ignore_path = root.join(".symlens").join("ignore");
        if !ignore_path.exists() {
            return None;
        }

        let mut builder = GitignoreBuilder::new(root);
        if let Some(err) = builder.add(&ignore_path) {
            tracing::warn!("Failed to parse .symlens/ignore: {}", err);
        }

        builder.build().ok()
    }

    fn build_patterns(config: &FileFilterConfig) -> Option<Gitignore> {
        if config.ignore_patterns.is_empty() {
            return None;
        }

        let mut builder = GitignoreBuilder::new(&config.root);
        for pattern in &config.ignore_patterns {
            if let Err(e) = builder.add_line(None, pattern) {
                tracing::warn!("Invalid ignore pattern '{}': {}", pattern, e);
            }
        }

        builder.build().ok()
    }

    /// Check if a path should be ignored
    pub fn is_ignored(&self, path: &Path) -> bool {
        let relative = path.strip_prefix(&self.config.root).unwrap_or(path);
        let is_dir = path.is_dir();

        for component in relative.components() {
            let Component::Normal(name) = component else {
                continue;
            };
            let Some(name) = name.to_str() else {
                continue;
            };

            if DEFAULT_IGNORE_PATTERNS.contains(&name)
                || self
                    .config
                    .languages
                    .iter()
                    .any(|language| language.is_ignored_name(name))
            {
                return true;
            }

            if !self.config.include_hidden && name.starts_with('.') && name != ".symlens" {
                return true;
            }
        }

        for matcher in [&self.local_ignore, &self.patterns, &self.gitignore]
            .into_iter()
            .flatten()
        {
            match matcher.matched_path_or_any_parents(relative, is_dir) {
                ignore::Match::Ignore(_) => return true,
                ignore::Match::Whitelist(_) => return false,
                ignore::Match::None => {}
            }
        }

        false
    }

    pub fn should_include(&self, path: &Path) -> bool {
        !self.is_ignored(path)
    }

    /// Create a WalkBuilder configured with this filter
    pub fn walk_builder(&self, start: &Path) -> WalkBuilder {
        let mut builder = WalkBuilder::new(start);

        builder
            .hidden(!self.config.include_hidden)
            .git_ignore(self.config.respect_gitignore)
            .git_global(self.config.respect_gitignore)
            .git_exclude(self.config.respect_gitignore)
            .sort_by_file_path(|a, b| a.cmp(b));

        builder
    }

    /// Files under `start` (the root when `None`) with one of `extensions`
    pub fn discover_files(&self, start: Option<&Path>, extensions: &[&str]) -> Vec<PathBuf> {
        let start = start.unwrap_or(&self.config.root);
        let mut files = Vec::new();

        for entry in self.walk_builder(start).build().filter_map(|e| e.ok()) {
            let path = entry.path();

            if !entry.file_type().is_some_and(|t| t.is_file()) {
                continue;
            }

            if !extensions.is_empty() {
                let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
                if !extensions.contains(&ext) {
                    continue;
                }
            }

            if self.should_include(path) {
                files.push(path.to_path_buf());
            }
        }

        files
    }
}

/// Directory names never worth walking in a code project
pub const DEFAULT_IGNORE_PATTERNS: &[&str] = &[
    ".git",
    ".svn",
    ".hg",
    "node_modules",
    "__pycache__",
    ".venv",
    ".idea",
    ".vscode",
    ".cache",
];

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_gitignore_integration() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();

        fs::write(root.join(".gitignore"), "*.log\ngenerated/\n").unwrap();
        fs::write(root.join("main.tf"), "locals {}").unwrap();
        fs::write(root.join("debug.log"), "log content").unwrap();
        fs::create_dir(root.join("generated")).unwrap();
        fs::write(root.join("generated/out.tf"), "locals {}").unwrap();

        let filter = FileFilter::for_project(root, &[Language::Terraform]);

        assert!(filter.should_include(&root.join("main.tf")));
        assert!(!filter.should_include(&root.join("debug.log")));
        assert!(!filter.should_include(&root.join("generated")));
        assert!(!filter.should_include(&root.join("generated/out.tf")));
    }

    #[test]
    fn test_local_ignore_file() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();

        fs::create_dir(root.join(".symlens")).unwrap();
        fs::write(root.join(".symlens/ignore"), "*.auto.tf\n").unwrap();
        fs::write(root.join("main.tf"), "").unwrap();
        fs::write(root.join("vars.auto.tf"), "").unwrap();

        let filter = FileFilter::for_project(root, &[]);

        assert!(filter.should_include(&root.join("main.tf")));
        assert!(!filter.should_include(&root.join("vars.auto.tf")));
    }

    #[test]
    fn test_terraform_artifacts_are_ignored() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        fs::create_dir_all(root.join("terraform.tfstate.d/dev")).unwrap();
        fs::create_dir_all(root.join("modules/net")).unwrap();
        fs::write(root.join("modules/net/main.tf"), "").unwrap();
        fs::write(root.join("terraform.tfstate"), "{}").unwrap();
        fs::write(root.join("terraform.tfstate.backup"), "{}").unwrap();
        fs::write(root.join("terraform.tfstate.d/dev/state.tf"), "").unwrap();

        let filter = FileFilter::for_project(root, &[Language::Terraform]);

        assert!(filter.is_ignored(&root.join(".terraform/providers/x.tf")));
        assert!(filter.is_ignored(&root.join("terraform.tfstate")));
        assert!(filter.is_ignored(&root.join("terraform.tfstate.backup")));
        assert!(filter.is_ignored(&root.join("terraform.tfstate.d/dev/state.tf")));
        assert!(!filter.is_ignored(&root.join("modules/net/main.tf")));

        let files = filter.discover_files(None, &["tf"]);
        assert_eq!(files, vec![root.join("modules/net/main.tf")]);
    }

    #[test]
    fn test_configured_patterns() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        fs::create_dir_all(root.join("build")).unwrap();
        fs::write(root.join("build/x.tf"), "").unwrap();

        let filter = FileFilter::new(FileFilterConfig {
            root: root.to_path_buf(),
            ignore_patterns: vec!["build".to_string()],
            ..Default::default()
        });

        assert!(filter.is_ignored(&root.join("build/x.tf")));
        assert!(filter.discover_files(None, &[]).is_empty());
    }
}

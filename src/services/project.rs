//! Project service: root confinement, ignore rules and file access

use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;

use crate::error::ProjectError;
use crate::infra::file_filter::{FileFilter, FileFilterConfig};
use crate::models::config::{ProjectConfig, SymlensConfig};
use crate::models::symbol::Language;

/// Bytes inspected for NUL when deciding whether a file is binary
const BINARY_SNIFF_LEN: usize = 8192;

/// File access confined to one project root.
///
/// Paths are project-relative strings with `/` separators; absolute paths are
/// accepted as long as they resolve inside the root.
#[async_trait]
pub trait ProjectService: Send + Sync {
    fn root(&self) -> &Path;

    /// Initialize `.symlens/config.toml`
    async fn init(&self, name: Option<&str>, force: bool) -> Result<ProjectInfo, ProjectError>;

    async fn status(&self) -> Result<ProjectStatus, ProjectError>;

    fn is_initialized(&self) -> bool;

    /// Detect languages in project
    fn detect_languages(&self) -> Vec<Language>;

    /// Languages served: configured ones, or those detected at startup
    fn languages(&self) -> &[Language];

    /// Read a text file, rejecting oversized and binary files
    async fn read_file(&self, relative_path: &str) -> Result<String, ProjectError>;

    async fn write_file(&self, relative_path: &str, content: &str) -> Result<(), ProjectError>;

    fn path_exists(&self, relative_path: &str) -> bool;

    /// Resolve to an absolute path that exists, lies inside the root and is not ignored
    fn validate_path(&self, relative_path: &str) -> Result<PathBuf, ProjectError>;

    fn is_ignored_path(&self, relative_path: &str) -> bool;

    /// Project-relative form of `path`, `None` when it lies outside the root
    fn relative_path(&self, path: &Path) -> Option<String>;

    /// Source files of `language` under `dir` (the whole project when `None`), sorted
    fn list_source_files(
        &self,
        language: Language,
        dir: Option<&str>,
    ) -> Result<Vec<String>, ProjectError>;
}

/// Project information
#[derive(Debug, Clone)]
pub struct ProjectInfo {
    pub name: String,
    pub root: PathBuf,
    pub languages: Vec<Language>,
    pub config_path: PathBuf,
}

/// Project status
#[derive(Debug, Clone)]
pub struct ProjectStatus {
    pub initialized: bool,
    pub project: Option<ProjectInfo>,
}

pub struct DefaultProjectService {
    root: PathBuf,
    config: ProjectConfig,
    languages: Vec<Language>,
    filter: FileFilter,
    max_file_size: u64,
}

impl DefaultProjectService {
    /// Canonicalizes `root`; it must be an existing directory.
    pub fn new(root: &Path, config: &SymlensConfig) -> Result<Self, ProjectError> {
        let root = root
            .canonicalize()
            .map_err(|_| ProjectError::NotADirectory(root.to_path_buf()))?;
        if !root.is_dir() {
            return Err(ProjectError::NotADirectory(root));
        }

        let languages = if config.project.languages.is_empty() {
            detect_languages_in(&root)
        } else {
            config.project.languages.clone()
        };

        let filter = FileFilter::new(FileFilterConfig {
            root: root.clone(),
            ignore_patterns: config.project.ignored_paths.clone(),
            languages: languages.clone(),
            ..Default::default()
        });

        Ok(Self {
            root,
            config: config.project.clone(),
            languages,
            filter,
            max_file_size: config.editor.max_file_size_bytes(),
        })
    }

    fn symlens_dir(&self) -> PathBuf {
        self.root.join(".symlens")
    }

    fn config_path(&self) -> PathBuf {
        self.symlens_dir().join("config.toml")
    }

    fn project_name(&self, configured: Option<String>) -> String {
        configured
            .or_else(|| {
                self.root
                    .file_name()
                    .and_then(|n| n.to_str())
                    .map(|s| s.to_string())
            })
            .unwrap_or_else(|| "unnamed".to_string())
    }

    /// Absolute, lexically normalized form of `path` (no filesystem access)
    fn resolve(&self, path: &str) -> PathBuf {
        let path = Path::new(path);
        let joined = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        };
        normalize(&joined)
    }
}

#[async_trait]
impl ProjectService for DefaultProjectService {
    fn root(&self) -> &Path {
        &self.root
    }

    async fn init(&self, name: Option<&str>, force: bool) -> Result<ProjectInfo, ProjectError> {
        if self.is_initialized() && !force {
            return Err(ProjectError::AlreadyExists(self.root.clone()));
        }

        tokio::fs::create_dir_all(self.symlens_dir()).await?;

        let languages = self.detect_languages();
        let project_name = self.project_name(name.map(|n| n.to_string()));

        let config = SymlensConfig {
            project: ProjectConfig {
                name: Some(project_name.clone()),
                languages: languages.clone(),
                ..self.config.clone()
            },
            ..Default::default()
        };

        let content = toml::to_string_pretty(&config).map_err(std::io::Error::other)?;
        tokio::fs::write(self.config_path(), content).await?;

        tracing::info!("Initialized project '{}' at {}", project_name, self.root.display());

        Ok(ProjectInfo {
            name: project_name,
            root: self.root.clone(),
            languages,
            config_path: self.config_path(),
        })
    }

    async fn status(&self) -> Result<ProjectStatus, ProjectError> {
        if !self.is_initialized() {
            return Ok(ProjectStatus {
                initialized: false,
                project: None,
            });
        }

        let content = tokio::fs::read_to_string(self.config_path()).await?;
        let config: SymlensConfig = toml::from_str(&content).map_err(std::io::Error::other)?;

        let languages = if config.project.languages.is_empty() {
            self.languages.clone()
        } else {
            config.project.languages
        };

        Ok(ProjectStatus {
            initialized: true,
            project: Some(ProjectInfo {
                name: self.project_name(config.project.name),
                root: self.root.clone(),
                languages,
                config_path: self.config_path(),
            }),
        })
    }

    fn is_initialized(&self) -> bool {
        self.config_path().exists()
    }

    fn detect_languages(&self) -> Vec<Language> {
        detect_languages_in(&self.root)
    }

    fn languages(&self) -> &[Language] {
        &self.languages
    }

    async fn read_file(&self, relative_path: &str) -> Result<String, ProjectError> {
        let path = self.validate_path(relative_path)?;

        let size = tokio::fs::metadata(&path).await?.len();
        if size > self.max_file_size {
            return Err(ProjectError::FileTooLarge {
                path: relative_path.to_string(),
                size_kb: size / 1024,
                limit_kb: self.max_file_size / 1024,
            });
        }

        let bytes = tokio::fs::read(&path).await?;
        if bytes.iter().take(BINARY_SNIFF_LEN).any(|b| *b == 0) {
            return Err(ProjectError::BinaryFile(relative_path.to_string()));
        }
        String::from_utf8(bytes).map_err(|_| ProjectError::BinaryFile(relative_path.to_string()))
    }

    async fn write_file(&self, relative_path: &str, content: &str) -> Result<(), ProjectError> {
        let path = self.validate_path(relative_path)?;
        tokio::fs::write(&path, content).await?;
        tracing::debug!("Wrote {} ({} bytes)", relative_path, content.len());
        Ok(())
    }

    fn path_exists(&self, relative_path: &str) -> bool {
        let path = self.resolve(relative_path);
        path.starts_with(&self.root) && path.exists()
    }

    fn validate_path(&self, relative_path: &str) -> Result<PathBuf, ProjectError> {
        let path = self.resolve(relative_path);
        if !path.starts_with(&self.root) {
            return Err(ProjectError::OutsideRoot(relative_path.to_string()));
        }
        if !path.exists() {
            return Err(ProjectError::PathNotFound(relative_path.to_string()));
        }
        // Symlinks may still point outside
        if !path.canonicalize()?.starts_with(&self.root) {
            return Err(ProjectError::OutsideRoot(relative_path.to_string()));
        }
        if self.filter.is_ignored(&path) {
            return Err(ProjectError::Ignored(relative_path.to_string()));
        }
        Ok(path)
    }

    fn is_ignored_path(&self, relative_path: &str) -> bool {
        let path = self.resolve(relative_path);
        !path.starts_with(&self.root) || self.filter.is_ignored(&path)
    }

    fn relative_path(&self, path: &Path) -> Option<String> {
        if let Ok(relative) = normalize(path).strip_prefix(&self.root) {
            return Some(to_slash(relative));
        }
        // Servers may report the unresolved form of a symlinked root
        let canonical = path.canonicalize().ok()?;
        canonical.strip_prefix(&self.root).ok().map(to_slash)
    }

    fn list_source_files(
        &self,
        language: Language,
        dir: Option<&str>,
    ) -> Result<Vec<String>, ProjectError> {
        let start = match dir {
            Some(dir) => {
                let path = self.validate_path(dir)?;
                if path.is_file() {
                    return Ok(if language.matches_file(&path) {
                        vec![to_slash(path.strip_prefix(&self.root).unwrap_or(&path))]
                    } else {
                        Vec::new()
                    });
                }
                path
            }
            None => self.root.clone(),
        };

        let mut files: Vec<String> = self
            .filter
            .discover_files(Some(&start), language.extensions())
            .iter()
            .filter_map(|path| path.strip_prefix(&self.root).ok().map(to_slash))
            .collect();
        files.sort();
        Ok(files)
    }
}

fn detect_languages_in(root: &Path) -> Vec<Language> {
    let all = Language::all();
    let walker = walkdir::WalkDir::new(root)
        .max_depth(5)
        .into_iter()
        .filter_entry(|e| {
            if e.depth() == 0 {
                return true;
            }
            let name = e.file_name().to_string_lossy();
            !name.starts_with('.') && !all.iter().any(|lang| lang.is_ignored_name(&name))
        });

    let mut languages = HashSet::new();
    for entry in walker.filter_map(|e| e.ok()) {
        if entry.file_type().is_file() {
            let lang = Language::from_path(entry.path());
            if lang != Language::Unknown {
                languages.insert(lang);
            }
        }
    }

    let mut languages: Vec<Language> = languages.into_iter().collect();
    languages.sort_by_key(|l| l.lsp_id());
    languages
}

fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                out.pop();
            }
            Component::CurDir => {}
            other => out.push(other.as_os_str()),
        }
    }
    out
}

fn to_slash(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(name) => Some(name.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn project() -> (TempDir, DefaultProjectService) {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        fs::create_dir_all(root.join("modules/net")).unwrap();
        fs::create_dir_all(root.join(".terraform/modules")).unwrap();
        fs::write(root.join("main.tf"), "resource \"a\" \"b\" {}\n").unwrap();
        fs::write(root.join("modules/net/vpc.tf"), "module \"vpc\" {}\n").unwrap();
        fs::write(root.join("terraform.tfstate"), "{}").unwrap();
        fs::write(root.join(".terraform/modules/x.tf"), "").unwrap();
        let service = DefaultProjectService::new(root, &SymlensConfig::default()).unwrap();
        (temp, service)
    }

    #[tokio::test]
    async fn test_read_and_write_inside_root() {
        let (_temp, project) = project();
        let content = project.read_file("main.tf").await.unwrap();
        assert!(content.starts_with("resource"));

        project.write_file("main.tf", "locals {}\n").await.unwrap();
        assert_eq!(project.read_file("main.tf").await.unwrap(), "locals {}\n");
    }

    #[test]
    fn test_validate_path_rejects_escape() {
        let (_temp, project) = project();
        assert!(matches!(
            project.validate_path("../outside.tf"),
            Err(ProjectError::OutsideRoot(_))
        ));
        assert!(matches!(
            project.validate_path("/etc/passwd"),
            Err(ProjectError::OutsideRoot(_))
        ));
        assert!(matches!(
            project.validate_path("missing.tf"),
            Err(ProjectError::PathNotFound(_))
        ));
        assert!(project.validate_path("modules/../main.tf").is_ok());
    }

    #[test]
    fn test_terraform_artifacts_are_ignored() {
        let (_temp, project) = project();
        assert_eq!(project.detect_languages(), vec![Language::Terraform]);
        assert!(project.is_ignored_path("terraform.tfstate"));
        assert!(project.is_ignored_path(".terraform/modules/x.tf"));
        assert!(!project.is_ignored_path("main.tf"));
        assert!(matches!(
            project.validate_path("terraform.tfstate"),
            Err(ProjectError::Ignored(_))
        ));
    }

    #[tokio::test]
    async fn test_binary_and_oversized_files_rejected() {
        let (temp, _) = project();
        fs::write(temp.path().join("blob.tf"), [0u8, 1, 2]).unwrap();
        fs::write(temp.path().join("big.tf"), vec![b'a'; 2 * 1024 * 1024]).unwrap();

        let mut config = SymlensConfig::default();
        config.editor.max_file_size_mb = 1;
        let project = DefaultProjectService::new(temp.path(), &config).unwrap();

        assert!(matches!(
            project.read_file("blob.tf").await,
            Err(ProjectError::BinaryFile(_))
        ));
        assert!(matches!(
            project.read_file("big.tf").await,
            Err(ProjectError::FileTooLarge { limit_kb: 1024, .. })
        ));
    }

    #[test]
    fn test_list_source_files() {
        let (_temp, project) = project();
        assert_eq!(
            project.list_source_files(Language::Terraform, None).unwrap(),
            vec!["main.tf", "modules/net/vpc.tf"]
        );
        assert_eq!(
            project
                .list_source_files(Language::Terraform, Some("modules"))
                .unwrap(),
            vec!["modules/net/vpc.tf"]
        );
        assert_eq!(
            project
                .list_source_files(Language::Terraform, Some("main.tf"))
                .unwrap(),
            vec!["main.tf"]
        );
    }

    #[test]
    fn test_relative_path() {
        let (_temp, project) = project();
        let abs = project.root().join("modules/net/vpc.tf");
        assert_eq!(
            project.relative_path(&abs).as_deref(),
            Some("modules/net/vpc.tf")
        );
        assert_eq!(project.relative_path(Path::new("/elsewhere/x.tf")), None);
    }

    #[tokio::test]
    async fn test_init_writes_config() {
        let (_temp, project) = project();
        assert!(!project.is_initialized());

        let info = project.init(Some("infra"), false).await.unwrap();
        assert_eq!(info.name, "infra");
        assert!(project.is_initialized());
        assert!(matches!(
            project.init(None, false).await,
            Err(ProjectError::AlreadyExists(_))
        ));

        let status = project.status().await.unwrap();
        assert_eq!(status.project.unwrap().languages, vec![Language::Terraform]);
    }
}

//! Language Server Definitions
//!
//! Per-language launch specs with tiered timeout profiles, plus the locator
//! that resolves each spec to a runnable binary.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::LspError;
use crate::models::config::{LspConfig, ServerOverride};
use crate::models::symbol::Language;

// ============================================================================
// Server Performance Tiers
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerTier {
    /// Fast servers (< 15s init): rust-analyzer, clangd, gopls
    Fast,
    /// Standard servers (15-45s init): terraform-ls, ruby-lsp, lua-language-server
    Standard,
    /// Slow servers (45-120s init): pyright, typescript-language-server, jdtls
    Slow,
}

impl ServerTier {
    pub fn init_timeout(&self) -> Duration {
        match self {
            Self::Fast => Duration::from_secs(15),
            Self::Standard => Duration::from_secs(45),
            Self::Slow => Duration::from_secs(120),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fast => "fast",
            Self::Standard => "standard",
            Self::Slow => "slow",
        }
    }
}

// ============================================================================
// Platform Detection
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    MacOS,
    Linux,
    Windows,
    FreeBSD,
    OpenBSD,
}

impl Platform {
    pub fn current() -> Self {
        if cfg!(target_os = "macos") {
            Self::MacOS
        } else if cfg!(target_os = "windows") {
            Self::Windows
        } else if cfg!(target_os = "freebsd") {
            Self::FreeBSD
        } else if cfg!(target_os = "openbsd") {
            Self::OpenBSD
        } else {
            Self::Linux
        }
    }

    /// Name used in release archive file names
    pub fn release_name(&self) -> &'static str {
        match self {
            Self::MacOS => "darwin",
            Self::Linux => "linux",
            Self::Windows => "windows",
            Self::FreeBSD => "freebsd",
            Self::OpenBSD => "openbsd",
        }
    }

    pub fn executable_name(&self, base: &str) -> String {
        match self {
            Self::Windows => format!("{}.exe", base),
            _ => base.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arch {
    Amd64,
    Arm64,
    X86,
}

impl Arch {
    /// `None` on architectures no release archive is published for
    pub fn current() -> Option<Self> {
        Self::from_target(std::env::consts::ARCH)
    }

    pub fn from_target(arch: &str) -> Option<Self> {
        match arch {
            "x86_64" => Some(Self::Amd64),
            "aarch64" => Some(Self::Arm64),
            "x86" => Some(Self::X86),
            _ => None,
        }
    }

    pub fn release_name(&self) -> &'static str {
        match self {
            Self::Amd64 => "amd64",
            Self::Arm64 => "arm64",
            Self::X86 => "386",
        }
    }
}

// ============================================================================
// Downloadable Releases
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    Zip,
    TarGz,
}

/// Where to fetch a prebuilt server release
#[derive(Debug, Clone)]
pub struct BinaryDownload {
    pub version: &'static str,
    /// `{version}`, `{os}` and `{arch}` are substituted
    pub url_template: &'static str,
    pub archive: ArchiveKind,
}

impl BinaryDownload {
    pub fn url(&self, platform: Platform, arch: Arch) -> String {
        self.url_template
            .replace("{version}", self.version)
            .replace("{os}", platform.release_name())
            .replace("{arch}", arch.release_name())
    }

    pub fn url_for_current(&self, server: &str) -> Result<String, LspError> {
        let arch = Arch::current().ok_or_else(|| LspError::Download {
            server: server.to_string(),
            message: format!("unsupported architecture: {}", std::env::consts::ARCH),
        })?;
        Ok(self.url(Platform::current(), arch))
    }
}

const TERRAFORM_LS: BinaryDownload = BinaryDownload {
    version: "0.33.3",
    url_template: "https://releases.hashicorp.com/terraform-ls/{version}/terraform-ls_{version}_{os}_{arch}.zip",
    archive: ArchiveKind::Zip,
};

// ============================================================================
// Server Specs
// ============================================================================

#[derive(Debug, Clone)]
pub struct InstallInstructions {
    pub macos: &'static str,
    pub other: &'static str,
}

impl InstallInstructions {
    const fn same(command: &'static str) -> Self {
        Self {
            macos: command,
            other: command,
        }
    }

    pub fn current(&self) -> &'static str {
        match Platform::current() {
            Platform::MacOS => self.macos,
            _ => self.other,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerSpec {
    pub name: &'static str,
    pub command: &'static str,
    pub args: &'static [&'static str],
    pub install: InstallInstructions,
    pub tier: ServerTier,
    pub download: Option<BinaryDownload>,
}

impl ServerSpec {
    pub fn for_language(language: Language) -> Option<Self> {
        defaults().remove(&language)
    }

    /// Binary file name on this platform
    pub fn binary_name(&self) -> String {
        Platform::current().executable_name(self.command)
    }

    pub fn install_hint(&self) -> &'static str {
        self.install.current()
    }
}

fn spec(
    name: &'static str,
    command: &'static str,
    args: &'static [&'static str],
    install: InstallInstructions,
    tier: ServerTier,
) -> ServerSpec {
    ServerSpec {
        name,
        command,
        args,
        install,
        tier,
        download: None,
    }
}

/// Default server specs for all supported languages
pub fn defaults() -> HashMap<Language, ServerSpec> {
    use ServerTier::{Fast, Slow, Standard};

    let npm_ts = InstallInstructions::same("npm install -g typescript typescript-language-server");

    HashMap::from([
        (
            Language::Rust,
            spec(
                "rust-analyzer",
                "rust-analyzer",
                &[],
                InstallInstructions::same("rustup component add rust-analyzer"),
                Fast,
            ),
        ),
        (
            Language::Cpp,
            spec(
                "clangd",
                "clangd",
                &["--background-index"],
                InstallInstructions {
                    macos: "brew install llvm",
                    other: "apt install clangd",
                },
                Fast,
            ),
        ),
        (
            Language::Zig,
            spec(
                "zls",
                "zls",
                &[],
                InstallInstructions {
                    macos: "brew install zls",
                    other: "Download from https://github.com/zigtools/zls/releases",
                },
                Fast,
            ),
        ),
        (
            Language::Java,
            spec(
                "jdtls",
                "jdtls",
                &[],
                InstallInstructions {
                    macos: "brew install jdtls",
                    other: "Download from https://download.eclipse.org/jdtls/snapshots/",
                },
                Slow,
            ),
        ),
        (
            Language::Kotlin,
            spec(
                "kotlin-lsp",
                "kotlin-lsp",
                &["--stdio"],
                InstallInstructions {
                    macos: "brew install JetBrains/utils/kotlin-lsp",
                    other: "Download from https://github.com/JetBrains/kotlin-lsp/releases",
                },
                Slow,
            ),
        ),
        (
            Language::CSharp,
            spec(
                "csharp-ls",
                "csharp-ls",
                &[],
                InstallInstructions::same("dotnet tool install -g csharp-ls"),
                Standard,
            ),
        ),
        (
            Language::TypeScript,
            spec(
                "typescript-language-server",
                "typescript-language-server",
                &["--stdio"],
                npm_ts.clone(),
                Slow,
            ),
        ),
        (
            Language::JavaScript,
            spec(
                "typescript-language-server",
                "typescript-language-server",
                &["--stdio"],
                npm_ts,
                Slow,
            ),
        ),
        (
            Language::Python,
            spec(
                "pyright",
                "pyright-langserver",
                &["--stdio"],
                InstallInstructions::same("npm install -g pyright"),
                Slow,
            ),
        ),
        (
            Language::Ruby,
            spec(
                "ruby-lsp",
                "ruby-lsp",
                &[],
                InstallInstructions::same("gem install ruby-lsp"),
                Standard,
            ),
        ),
        (
            Language::PHP,
            spec(
                "intelephense",
                "intelephense",
                &["--stdio"],
                InstallInstructions::same("npm install -g intelephense"),
                Standard,
            ),
        ),
        (
            Language::Lua,
            spec(
                "lua-language-server",
                "lua-language-server",
                &[],
                InstallInstructions {
                    macos: "brew install lua-language-server",
                    other: "Download from https://github.com/LuaLS/lua-language-server/releases",
                },
                Standard,
            ),
        ),
        (
            Language::Bash,
            spec(
                "bash-language-server",
                "bash-language-server",
                &["start"],
                InstallInstructions::same("npm install -g bash-language-server"),
                Standard,
            ),
        ),
        (
            Language::Haskell,
            spec(
                "haskell-language-server",
                "haskell-language-server-wrapper",
                &["--lsp"],
                InstallInstructions::same("ghcup install hls"),
                Slow,
            ),
        ),
        (
            Language::Elixir,
            spec(
                "elixir-ls",
                "elixir-ls",
                &[],
                InstallInstructions {
                    macos: "brew install elixir-ls",
                    other: "Download from https://github.com/elixir-lsp/elixir-ls/releases",
                },
                Standard,
            ),
        ),
        (
            Language::Go,
            spec(
                "gopls",
                "gopls",
                &["serve"],
                InstallInstructions::same("go install golang.org/x/tools/gopls@latest"),
                Fast,
            ),
        ),
        (
            Language::Swift,
            spec(
                "sourcekit-lsp",
                "sourcekit-lsp",
                &[],
                InstallInstructions {
                    macos: "Included with Xcode",
                    other: "Download from https://swift.org/download/",
                },
                Standard,
            ),
        ),
        (
            Language::Dart,
            spec(
                "dart-language-server",
                "dart",
                &["language-server", "--protocol=lsp"],
                InstallInstructions {
                    macos: "brew install dart",
                    other: "Download from https://dart.dev/get-dart",
                },
                Standard,
            ),
        ),
        (
            Language::Terraform,
            ServerSpec {
                download: Some(TERRAFORM_LS),
                ..spec(
                    "terraform-ls",
                    "terraform-ls",
                    &["serve"],
                    InstallInstructions {
                        macos: "brew install hashicorp/tap/terraform-ls",
                        other: "Download from https://releases.hashicorp.com/terraform-ls/",
                    },
                    Standard,
                )
            },
        ),
        (
            Language::Yaml,
            spec(
                "yaml-language-server",
                "yaml-language-server",
                &["--stdio"],
                InstallInstructions::same("npm install -g yaml-language-server"),
                Standard,
            ),
        ),
        (
            Language::Nix,
            spec(
                "nil",
                "nil",
                &[],
                InstallInstructions::same("nix profile install nixpkgs#nil"),
                Standard,
            ),
        ),
    ])
}

// ============================================================================
// Binary Resolution
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerSource {
    Configured,
    Path,
    Installed,
    Downloaded,
}

/// A spec resolved to something that can be spawned
#[derive(Debug, Clone)]
pub struct ResolvedServer {
    pub command: PathBuf,
    pub args: Vec<String>,
    pub source: ServerSource,
}

/// Resolves a server binary: config override, `PATH`, install dir, then download.
#[derive(Debug, Clone)]
pub struct ServerLocator {
    overrides: HashMap<String, ServerOverride>,
    install_root: PathBuf,
    auto_install: bool,
}

impl ServerLocator {
    pub fn new(config: &LspConfig) -> Self {
        Self {
            overrides: config.servers.clone(),
            install_root: default_install_root(),
            auto_install: config.auto_install,
        }
    }

    pub fn with_install_root(mut self, install_root: impl Into<PathBuf>) -> Self {
        self.install_root = install_root.into();
        self
    }

    /// `<install_root>/<server>/`
    pub fn install_dir(&self, spec: &ServerSpec) -> PathBuf {
        self.install_root.join(spec.name)
    }

    pub fn installed_binary(&self, spec: &ServerSpec) -> PathBuf {
        self.install_dir(spec).join(spec.binary_name())
    }

    /// Resolution without network access
    pub fn locate_local(&self, language: Language, spec: &ServerSpec) -> Option<ResolvedServer> {
        let default_args = || spec.args.iter().map(|a| a.to_string()).collect::<Vec<_>>();

        if let Some(custom) = self.overrides.get(language.lsp_id()) {
            let args = if custom.args.is_empty() {
                default_args()
            } else {
                custom.args.clone()
            };
            return Some(ResolvedServer {
                command: PathBuf::from(&custom.command),
                args,
                source: ServerSource::Configured,
            });
        }

        if let Ok(path) = which::which(spec.command) {
            return Some(ResolvedServer {
                command: path,
                args: default_args(),
                source: ServerSource::Path,
            });
        }

        let installed = self.installed_binary(spec);
        if installed.is_file() {
            return Some(ResolvedServer {
                command: installed,
                args: default_args(),
                source: ServerSource::Installed,
            });
        }

        None
    }

    pub async fn locate(
        &self,
        language: Language,
        spec: &ServerSpec,
    ) -> Result<ResolvedServer, LspError> {
        if let Some(resolved) = self.locate_local(language, spec) {
            tracing::debug!(
                "{} server resolved ({:?}): {}",
                language,
                resolved.source,
                resolved.command.display()
            );
            return Ok(resolved);
        }

        let not_installed = || LspError::ServerNotInstalled {
            name: spec.name.to_string(),
            install_hint: spec.install_hint().to_string(),
        };

        let Some(download) = spec.download.as_ref() else {
            return Err(not_installed());
        };
        if !self.auto_install {
            tracing::debug!("{} auto-install disabled", spec.name);
            return Err(not_installed());
        }

        let command =
            super::installer::install(spec, download, &self.install_dir(spec)).await?;
        Ok(ResolvedServer {
            command,
            args: spec.args.iter().map(|a| a.to_string()).collect(),
            source: ServerSource::Downloaded,
        })
    }
}

/// `~/.symlens/ls_resources`
pub fn default_install_root() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".symlens")
        .join("ls_resources")
}

pub fn is_executable(path: &Path) -> bool {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        path.metadata()
            .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
            .unwrap_or(false)
    }
    #[cfg(not(unix))]
    {
        path.is_file()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_language_has_a_server() {
        let specs = defaults();
        for language in Language::all() {
            assert!(specs.contains_key(&language), "no server for {language}");
        }
    }

    #[test]
    fn test_terraform_download_url() {
        let spec = ServerSpec::for_language(Language::Terraform).unwrap();
        assert_eq!(spec.args, &["serve"]);
        let download = spec.download.unwrap();
        assert_eq!(
            download.url(Platform::Linux, Arch::Amd64),
            "https://releases.hashicorp.com/terraform-ls/0.33.3/terraform-ls_0.33.3_linux_amd64.zip"
        );
        assert_eq!(
            download.url(Platform::MacOS, Arch::Arm64),
            "https://releases.hashicorp.com/terraform-ls/0.33.3/terraform-ls_0.33.3_darwin_arm64.zip"
        );
        assert!(download.url(Platform::Windows, Arch::X86).ends_with("_windows_386.zip"));
    }

    #[test]
    fn test_arch_mapping() {
        assert_eq!(Arch::from_target("x86_64"), Some(Arch::Amd64));
        assert_eq!(Arch::from_target("aarch64"), Some(Arch::Arm64));
        assert_eq!(Arch::from_target("x86"), Some(Arch::X86));
        assert_eq!(Arch::from_target("riscv64"), None);
    }

    #[test]
    fn test_windows_executable_name() {
        assert_eq!(Platform::Windows.executable_name("terraform-ls"), "terraform-ls.exe");
        assert_eq!(Platform::Linux.executable_name("terraform-ls"), "terraform-ls");
    }

    #[test]
    fn test_configured_override_wins() {
        let mut config = LspConfig::default();
        config.servers.insert(
            "terraform".to_string(),
            ServerOverride {
                command: "/opt/tf/terraform-ls".to_string(),
                args: vec![],
            },
        );
        let locator = ServerLocator::new(&config);
        let spec = ServerSpec::for_language(Language::Terraform).unwrap();

        let resolved = locator.locate_local(Language::Terraform, &spec).unwrap();
        assert_eq!(resolved.source, ServerSource::Configured);
        assert_eq!(resolved.command, PathBuf::from("/opt/tf/terraform-ls"));
        // Empty override args fall back to the spec's
        assert_eq!(resolved.args, vec!["serve"]);
    }

    #[test]
    fn test_install_dir_is_consulted() {
        let dir = tempfile::tempdir().unwrap();
        let locator = ServerLocator::new(&LspConfig::default()).with_install_root(dir.path());
        let spec = ServerSpec {
            command: "symlens-test-no-such-server",
            ..ServerSpec::for_language(Language::Terraform).unwrap()
        };

        assert!(locator.locate_local(Language::Terraform, &spec).is_none());

        let binary = locator.installed_binary(&spec);
        std::fs::create_dir_all(binary.parent().unwrap()).unwrap();
        std::fs::write(&binary, b"").unwrap();

        let resolved = locator.locate_local(Language::Terraform, &spec).unwrap();
        assert_eq!(resolved.source, ServerSource::Installed);
        assert_eq!(resolved.command, binary);
        assert!(binary.starts_with(dir.path().join("terraform-ls")));
    }

    #[tokio::test]
    async fn test_missing_server_without_download_reports_hint() {
        let mut config = LspConfig::default();
        config.auto_install = false;
        let dir = tempfile::tempdir().unwrap();
        let locator = ServerLocator::new(&config).with_install_root(dir.path());
        let spec = ServerSpec {
            command: "symlens-test-no-such-server",
            ..ServerSpec::for_language(Language::Terraform).unwrap()
        };

        let err = locator.locate(Language::Terraform, &spec).await.unwrap_err();
        assert!(matches!(err, LspError::ServerNotInstalled { ref name, .. } if name == "terraform-ls"));
    }
}

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::lsp::Range;

/// A normalized document symbol.
///
/// The parent link exists only while the tree is built: each node carries the
/// slash-joined chain of its ancestors' names in `name_path` instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolNode {
    pub name: String,
    pub name_path: String,
    pub kind: SymbolKind,
    /// Project-relative file path with `/` separators
    pub relative_path: String,
    pub range: Range,
    pub selection_range: Range,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<SymbolNode>,
}

impl SymbolNode {
    pub fn new(
        name: impl Into<String>,
        kind: SymbolKind,
        relative_path: impl Into<String>,
        range: Range,
    ) -> Self {
        let name = name.into();
        Self {
            name_path: name.clone(),
            name,
            kind,
            relative_path: relative_path.into(),
            range,
            selection_range: range,
            body: String::new(),
            detail: None,
            children: Vec::new(),
        }
    }

    pub fn with_children(mut self, children: Vec<SymbolNode>) -> Self {
        self.children = children;
        self
    }

    pub fn with_selection_range(mut self, selection_range: Range) -> Self {
        self.selection_range = selection_range;
        self
    }

    /// Recompute `name_path` for this node and all descendants under `parent_path`.
    pub fn compute_paths(&mut self, parent_path: Option<&str>) {
        self.name_path = match parent_path {
            Some(parent) if !parent.is_empty() => format!("{}/{}", parent, self.name),
            _ => self.name.clone(),
        };
        let path = self.name_path.clone();
        for child in &mut self.children {
            child.compute_paths(Some(&path));
        }
    }

    /// Depth-first, pre-order traversal of this node and its descendants.
    pub fn walk(&self) -> SymbolWalk<'_> {
        SymbolWalk { stack: vec![self] }
    }

    /// Pre-order traversal over a whole forest.
    pub fn walk_forest(forest: &[SymbolNode]) -> SymbolWalk<'_> {
        SymbolWalk {
            stack: forest.iter().rev().collect(),
        }
    }

    /// Copy without body text, keeping children down to `depth` levels (0 = this node only).
    pub fn outline(&self, depth: usize) -> SymbolNode {
        SymbolNode {
            body: String::new(),
            children: if depth == 0 {
                Vec::new()
            } else {
                self.children.iter().map(|c| c.outline(depth - 1)).collect()
            },
            ..self.clone()
        }
    }

    /// 1-indexed location of the identifier
    pub fn location(&self) -> Location {
        Location::from_range(PathBuf::from(&self.relative_path), &self.selection_range)
    }
}

pub struct SymbolWalk<'a> {
    stack: Vec<&'a SymbolNode>,
}

impl<'a> Iterator for SymbolWalk<'a> {
    type Item = &'a SymbolNode;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        self.stack.extend(node.children.iter().rev());
        Some(node)
    }
}

/// Symbol classification (aligned with LSP SymbolKind)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SymbolKind {
    File,
    Module,
    Namespace,
    Package,
    Class,
    Method,
    Property,
    Field,
    Constructor,
    Enum,
    Interface,
    Function,
    Variable,
    Constant,
    String,
    Number,
    Boolean,
    Array,
    Object,
    Key,
    Null,
    EnumMember,
    Struct,
    Event,
    Operator,
    TypeParameter,
}

impl SymbolKind {
    const ALL: [SymbolKind; 26] = [
        Self::File,
        Self::Module,
        Self::Namespace,
        Self::Package,
        Self::Class,
        Self::Method,
        Self::Property,
        Self::Field,
        Self::Constructor,
        Self::Enum,
        Self::Interface,
        Self::Function,
        Self::Variable,
        Self::Constant,
        Self::String,
        Self::Number,
        Self::Boolean,
        Self::Array,
        Self::Object,
        Self::Key,
        Self::Null,
        Self::EnumMember,
        Self::Struct,
        Self::Event,
        Self::Operator,
        Self::TypeParameter,
    ];

    /// Convert from the LSP wire number, falling back to `Variable` for unknown values.
    pub fn from_lsp(kind: u32) -> Self {
        (kind as usize)
            .checked_sub(1)
            .and_then(|i| Self::ALL.get(i).copied())
            .unwrap_or(Self::Variable)
    }

    pub fn to_lsp(self) -> u32 {
        Self::ALL
            .iter()
            .position(|k| *k == self)
            .map_or(13, |i| i as u32 + 1)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Module => "module",
            Self::Namespace => "namespace",
            Self::Package => "package",
            Self::Class => "class",
            Self::Method => "method",
            Self::Property => "property",
            Self::Field => "field",
            Self::Constructor => "constructor",
            Self::Enum => "enum",
            Self::Interface => "interface",
            Self::Function => "function",
            Self::Variable => "variable",
            Self::Constant => "constant",
            Self::String => "string",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Array => "array",
            Self::Object => "object",
            Self::Key => "key",
            Self::Null => "null",
            Self::EnumMember => "enum_member",
            Self::Struct => "struct",
            Self::Event => "event",
            Self::Operator => "operator",
            Self::TypeParameter => "type_parameter",
        }
    }
}

impl fmt::Display for SymbolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SymbolKind {
    type Err = String;

    /// Accepts kind names (`class`, `enum_member`), `trait` as an alias of
    /// `interface`, and raw LSP numbers (`5`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        if let Ok(n) = lower.parse::<u32>() {
            return match n {
                1..=26 => Ok(Self::from_lsp(n)),
                _ => Err(format!("Unknown symbol kind number: {}", n)),
            };
        }
        match lower.as_str() {
            "trait" => Ok(Self::Interface),
            "enummember" => Ok(Self::EnumMember),
            "typeparameter" => Ok(Self::TypeParameter),
            other => Self::ALL
                .iter()
                .find(|k| k.as_str() == other)
                .copied()
                .ok_or_else(|| format!("Unknown symbol kind: {}", s)),
        }
    }
}

struct LanguageInfo {
    id: &'static str,
    extensions: &'static [&'static str],
    ignored_dirs: &'static [&'static str],
    /// Glob patterns for generated files that must never be read or edited
    ignored_files: &'static [&'static str],
}

/// Supported programming languages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Rust,
    Cpp,
    Zig,
    Java,
    Kotlin,
    CSharp,
    TypeScript,
    JavaScript,
    Python,
    Ruby,
    PHP,
    Lua,
    Bash,
    Haskell,
    Elixir,
    Go,
    Swift,
    Dart,
    Terraform,
    Yaml,
    Nix,
    #[default]
    Unknown,
}

impl Language {
    const ALL: [Language; 21] = [
        Self::Rust,
        Self::Cpp,
        Self::Zig,
        Self::Java,
        Self::Kotlin,
        Self::CSharp,
        Self::TypeScript,
        Self::JavaScript,
        Self::Python,
        Self::Ruby,
        Self::PHP,
        Self::Lua,
        Self::Bash,
        Self::Haskell,
        Self::Elixir,
        Self::Go,
        Self::Swift,
        Self::Dart,
        Self::Terraform,
        Self::Yaml,
        Self::Nix,
    ];

    fn info(&self) -> LanguageInfo {
        let (id, extensions, ignored_dirs, ignored_files): (
            &'static str,
            &'static [&'static str],
            &'static [&'static str],
            &'static [&'static str],
        ) = match self {
            Self::Rust => ("rust", &["rs"], &["target"], &[]),
            Self::Cpp => (
                "cpp",
                &["c", "cpp", "cc", "cxx", "h", "hpp", "hxx"],
                &["build", "cmake-build-debug", "cmake-build-release", "out"],
                &[],
            ),
            Self::Zig => ("zig", &["zig"], &["zig-out", "zig-cache", ".zig-cache"], &[]),
            Self::Java => (
                "java",
                &["java"],
                &["target", "build", "out", ".gradle"],
                &[],
            ),
            Self::Kotlin => ("kotlin", &["kt", "kts"], &["build", "out", ".gradle", ".kotlin"], &[]),
            Self::CSharp => ("csharp", &["cs"], &["bin", "obj", "packages", ".vs"], &[]),
            Self::TypeScript => (
                "typescript",
                &["ts", "tsx", "mts", "cts"],
                &["node_modules", "dist", "build", "coverage", ".next"],
                &["*.min.js"],
            ),
            Self::JavaScript => (
                "javascript",
                &["js", "jsx", "mjs", "cjs"],
                &["node_modules", "dist", "build", "coverage", ".next"],
                &["*.min.js"],
            ),
            Self::Python => (
                "python",
                &["py", "pyi"],
                &["__pycache__", ".venv", "venv", "build", "dist", ".mypy_cache", ".pytest_cache"],
                &["*.pyc"],
            ),
            Self::Ruby => ("ruby", &["rb", "rake", "gemspec"], &["vendor", ".bundle", "tmp", "log"], &[]),
            Self::PHP => ("php", &["php"], &["vendor", "node_modules", "cache"], &[]),
            Self::Lua => ("lua", &["lua"], &[".luarocks", "lua_modules"], &[]),
            Self::Bash => ("shellscript", &["sh", "bash", "zsh"], &[], &[]),
            Self::Haskell => ("haskell", &["hs", "lhs"], &["dist-newstyle", ".stack-work"], &[]),
            Self::Elixir => ("elixir", &["ex", "exs"], &["_build", "deps", ".elixir_ls"], &[]),
            Self::Go => ("go", &["go"], &["vendor"], &[]),
            Self::Swift => ("swift", &["swift"], &[".build", "DerivedData", ".swiftpm"], &[]),
            Self::Dart => ("dart", &["dart"], &[".dart_tool", "build"], &[]),
            Self::Terraform => (
                "terraform",
                &["tf", "tfvars"],
                &[".terraform", "terraform.tfstate.d"],
                &["*.tfstate", "*.tfstate.backup", ".terraform.*"],
            ),
            Self::Yaml => ("yaml", &["yaml", "yml"], &[], &[]),
            Self::Nix => ("nix", &["nix"], &["result", ".direnv"], &[]),
            Self::Unknown => ("plaintext", &[], &[], &[]),
        };
        LanguageInfo {
            id,
            extensions,
            ignored_dirs,
            ignored_files,
        }
    }

    pub fn from_extension(ext: &str) -> Self {
        let ext = ext.to_lowercase();
        Self::ALL
            .iter()
            .find(|lang| lang.extensions().contains(&ext.as_str()))
            .copied()
            .unwrap_or(Self::Unknown)
    }

    pub fn from_path(path: &Path) -> Self {
        path.extension()
            .and_then(|e| e.to_str())
            .map(Self::from_extension)
            .unwrap_or(Self::Unknown)
    }

    pub fn extensions(&self) -> &'static [&'static str] {
        self.info().extensions
    }

    pub fn matches_file(&self, path: &Path) -> bool {
        *self != Self::Unknown && Self::from_path(path) == *self
    }

    /// Build-artifact and cache directories skipped when walking a project
    pub fn ignored_directories(&self) -> &'static [&'static str] {
        self.info().ignored_dirs
    }

    /// Glob patterns (`*` wildcards only) for generated files
    pub fn ignored_file_patterns(&self) -> &'static [&'static str] {
        self.info().ignored_files
    }

    /// Whether a single path component is a build/VCS artifact for this language.
    pub fn is_ignored_name(&self, name: &str) -> bool {
        self.ignored_directories().contains(&name)
            || self
                .ignored_file_patterns()
                .iter()
                .any(|pattern| glob_match(pattern, name))
    }

    pub fn lsp_id(&self) -> &'static str {
        self.info().id
    }

    /// All supported languages (excluding Unknown)
    pub fn all() -> Vec<Self> {
        Self::ALL.to_vec()
    }
}

/// Minimal `*` glob over a single path component.
fn glob_match(pattern: &str, name: &str) -> bool {
    match pattern.split_once('*') {
        None => pattern == name,
        Some((prefix, rest)) => {
            let Some(tail) = name.strip_prefix(prefix) else {
                return false;
            };
            if rest.is_empty() {
                return true;
            }
            (0..=tail.len())
                .filter(|i| tail.is_char_boundary(*i))
                .any(|i| glob_match(rest, &tail[i..]))
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.lsp_id())
    }
}

impl FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_lowercase();
        let alias = match lower.as_str() {
            "rs" => Some(Self::Rust),
            "c" | "c++" => Some(Self::Cpp),
            "c#" | "cs" => Some(Self::CSharp),
            "ts" => Some(Self::TypeScript),
            "js" => Some(Self::JavaScript),
            "py" => Some(Self::Python),
            "rb" => Some(Self::Ruby),
            "bash" | "sh" | "shell" => Some(Self::Bash),
            "golang" => Some(Self::Go),
            "tf" | "hcl" => Some(Self::Terraform),
            "yml" => Some(Self::Yaml),
            _ => None,
        };
        alias
            .or_else(|| Self::ALL.iter().find(|l| l.lsp_id() == lower).copied())
            .ok_or_else(|| format!("Unknown language: {}", s))
    }
}

/// Source code location (1-indexed, for display)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Location {
    pub file: PathBuf,
    pub line: u32,
    pub column: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_line: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_column: Option<u32>,
}

impl Location {
    pub fn from_range(file: PathBuf, range: &Range) -> Self {
        let (line, column) = range.start.to_display();
        let (end_line, end_column) = range.end.to_display();
        Self {
            file,
            line,
            column,
            end_line: Some(end_line),
            end_column: Some(end_column),
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file.display(), self.line, self.column)
    }
}

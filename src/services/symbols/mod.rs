//! Symbol services: normalization, caching, name-path matching, editing and navigation

pub mod cache;
pub mod editor;
pub mod matcher;
pub mod navigation;
pub mod normalizer;
#[cfg(test)]
pub(crate) mod testing;

pub use cache::{CacheStats, FileSymbolCache, NoopCache, SymbolCache};
pub use editor::{RenameOutcome, SymbolEditor};
pub use matcher::{FindOptions, SymbolMatcher, name_path_matches};
pub use navigation::{Navigator, ReferenceLocation};
pub use normalizer::SymbolNormalizer;

use crate::error::{LspError, SymlensResult};
use crate::models::symbol::Language;

/// Lines as the server counts them: split on `\n`, `\r` kept, trailing empty line kept
pub(crate) fn split_lines(content: &str) -> Vec<&str> {
    content.split('\n').collect()
}

/// Byte index of the `character`-th char of `line`, clamped to its end
pub(crate) fn byte_offset(line: &str, character: u32) -> usize {
    line.char_indices()
        .nth(character as usize)
        .map_or(line.len(), |(i, _)| i)
}

pub(crate) fn language_for(relative_path: &str) -> SymlensResult<Language> {
    match Language::from_path(std::path::Path::new(relative_path)) {
        Language::Unknown => Err(LspError::UnsupportedLanguage(relative_path.to_string()).into()),
        language => Ok(language),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_lines_keeps_trailing_line() {
        assert_eq!(split_lines("a\nb\n"), vec!["a", "b", ""]);
        assert_eq!(split_lines(""), vec![""]);
    }

    #[test]
    fn test_byte_offset_clamps_to_char_boundaries() {
        assert_eq!(byte_offset("abc", 1), 1);
        assert_eq!(byte_offset("abc", 10), 3);
        assert_eq!(byte_offset("héllo", 2), 3);
    }

    #[test]
    fn test_language_for() {
        assert_eq!(language_for("modules/net/main.tf").unwrap(), Language::Terraform);
        assert!(language_for("README").is_err());
    }
}

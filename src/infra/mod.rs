//! Infrastructure layer for symlens
//!
//! Contains low-level implementations and external integrations.

pub mod file_filter;
pub mod lsp;
pub mod retry;

/// md5 hex digest, used for cache validity and cache file names
#[inline]
pub fn hash_content(content: &str) -> String {
    format!("{:x}", md5::compute(content.as_bytes()))
}

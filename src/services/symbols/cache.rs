//! Content-hash gated symbol cache with an in-memory LRU in front of disk
//!
//! Disk layout: `<root>/.symlens/cache/<language>/<md5(relative path)>.json`, each file
//! holding `{content_hash, symbols}`. A missing, stale or unreadable entry is a miss.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::infra::hash_content;
use crate::models::symbol::{Language, SymbolNode};

const DEFAULT_MAX_ENTRIES: usize = 1000;

#[async_trait]
pub trait SymbolCache: Send + Sync {
    /// Symbols for `relative_path`, only when they were computed from `content_hash`
    async fn get(
        &self,
        language: Language,
        relative_path: &str,
        content_hash: &str,
    ) -> Option<Arc<Vec<SymbolNode>>>;

    async fn set(
        &self,
        language: Language,
        relative_path: &str,
        content_hash: &str,
        symbols: Arc<Vec<SymbolNode>>,
    ) -> io::Result<()>;

    async fn invalidate(&self, language: Language, relative_path: &str);

    async fn clear(&self) -> io::Result<()>;

    async fn stats(&self) -> CacheStats;
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStats {
    pub memory_entries: usize,
    pub disk_entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
}

#[derive(Deserialize)]
struct StoredEntry {
    content_hash: String,
    symbols: Vec<SymbolNode>,
}

#[derive(Serialize)]
struct StoredEntryRef<'a> {
    content_hash: &'a str,
    symbols: &'a [SymbolNode],
}

struct CacheEntry {
    content_hash: String,
    symbols: Arc<Vec<SymbolNode>>,
    last_accessed: AtomicU64,
}

type CacheKey = (Language, String);

pub struct FileSymbolCache {
    dir: PathBuf,
    entries: RwLock<HashMap<CacheKey, CacheEntry>>,
    max_entries: usize,
    clock: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl FileSymbolCache {
    /// Cache stored under `<root>/.symlens/cache`
    pub fn for_project(root: &Path) -> Self {
        Self::new(root.join(".symlens").join("cache"), DEFAULT_MAX_ENTRIES)
    }

    pub fn new(dir: PathBuf, max_entries: usize) -> Self {
        Self {
            dir,
            entries: RwLock::new(HashMap::new()),
            max_entries: max_entries.max(1),
            clock: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, language: Language, relative_path: &str) -> PathBuf {
        self.dir
            .join(language.lsp_id())
            .join(format!("{}.json", hash_content(relative_path)))
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed)
    }

    async fn load_from_disk(&self, path: &Path) -> Option<StoredEntry> {
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::debug!("Unreadable cache entry {}: {}", path.display(), e);
                return None;
            }
        };
        match serde_json::from_slice(&bytes) {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::debug!("Corrupt cache entry {}: {}", path.display(), e);
                None
            }
        }
    }

    async fn remember(&self, key: CacheKey, content_hash: String, symbols: Arc<Vec<SymbolNode>>) {
        let mut entries = self.entries.write().await;
        if entries.len() >= self.max_entries && !entries.contains_key(&key) {
            evict_lru(&mut entries);
        }
        entries.insert(
            key,
            CacheEntry {
                content_hash,
                symbols,
                last_accessed: AtomicU64::new(self.tick()),
            },
        );
    }

    fn hit(&self, relative_path: &str, symbols: Arc<Vec<SymbolNode>>) -> Option<Arc<Vec<SymbolNode>>> {
        self.hits.fetch_add(1, Ordering::Relaxed);
        tracing::trace!("Symbol cache hit: {}", relative_path);
        Some(symbols)
    }
}

fn evict_lru(entries: &mut HashMap<CacheKey, CacheEntry>) {
    if let Some(oldest) = entries
        .iter()
        .min_by_key(|(_, e)| e.last_accessed.load(Ordering::Relaxed))
        .map(|(k, _)| k.clone())
    {
        tracing::trace!("Evicted cache entry: {}", oldest.1);
        entries.remove(&oldest);
    }
}

#[async_trait]
impl SymbolCache for FileSymbolCache {
    async fn get(
        &self,
        language: Language,
        relative_path: &str,
        content_hash: &str,
    ) -> Option<Arc<Vec<SymbolNode>>> {
        let key = (language, relative_path.to_string());

        {
            let entries = self.entries.read().await;
            if let Some(entry) = entries.get(&key)
                && entry.content_hash == content_hash
            {
                entry.last_accessed.store(self.tick(), Ordering::Relaxed);
                return self.hit(relative_path, Arc::clone(&entry.symbols));
            }
        }

        let path = self.entry_path(language, relative_path);
        if let Some(stored) = self.load_from_disk(&path).await
            && stored.content_hash == content_hash
        {
            let symbols = Arc::new(stored.symbols);
            self.remember(key, stored.content_hash, Arc::clone(&symbols))
                .await;
            return self.hit(relative_path, symbols);
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        tracing::trace!("Symbol cache miss: {}", relative_path);
        None
    }

    async fn set(
        &self,
        language: Language,
        relative_path: &str,
        content_hash: &str,
        symbols: Arc<Vec<SymbolNode>>,
    ) -> io::Result<()> {
        self.remember(
            (language, relative_path.to_string()),
            content_hash.to_string(),
            Arc::clone(&symbols),
        )
        .await;

        let path = self.entry_path(language, relative_path);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_vec(&StoredEntryRef {
            content_hash,
            symbols: &symbols,
        })?;

        // Readers never observe a half-written entry
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &path).await
    }

    async fn invalidate(&self, language: Language, relative_path: &str) {
        self.entries
            .write()
            .await
            .remove(&(language, relative_path.to_string()));

        let path = self.entry_path(language, relative_path);
        if let Err(e) = tokio::fs::remove_file(&path).await
            && e.kind() != io::ErrorKind::NotFound
        {
            tracing::warn!("Failed to remove cache entry {}: {}", path.display(), e);
        }
    }

    async fn clear(&self) -> io::Result<()> {
        self.entries.write().await.clear();
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);

        match tokio::fs::remove_dir_all(&self.dir).await {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }

    async fn stats(&self) -> CacheStats {
        let memory_entries = self.entries.read().await.len();
        let disk_entries = walkdir::WalkDir::new(&self.dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.file_type().is_file() && e.path().extension().is_some_and(|ext| ext == "json")
            })
            .count();
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);

        CacheStats {
            memory_entries,
            disk_entries,
            hits,
            misses,
            hit_rate: if hits + misses > 0 {
                hits as f64 / (hits + misses) as f64
            } else {
                0.0
            },
        }
    }
}

/// Cache that never stores anything (`cache.enabled = false`)
#[derive(Debug, Default)]
pub struct NoopCache;

#[async_trait]
impl SymbolCache for NoopCache {
    async fn get(&self, _: Language, _: &str, _: &str) -> Option<Arc<Vec<SymbolNode>>> {
        None
    }

    async fn set(&self, _: Language, _: &str, _: &str, _: Arc<Vec<SymbolNode>>) -> io::Result<()> {
        Ok(())
    }

    async fn invalidate(&self, _: Language, _: &str) {}

    async fn clear(&self) -> io::Result<()> {
        Ok(())
    }

    async fn stats(&self) -> CacheStats {
        CacheStats::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::lsp::Range;
    use crate::models::symbol::SymbolKind;
    use tempfile::TempDir;

    const TF: Language = Language::Terraform;

    fn symbols(name: &str) -> Arc<Vec<SymbolNode>> {
        Arc::new(vec![SymbolNode::new(
            name,
            SymbolKind::Class,
            "main.tf",
            Range::lines(0, 2),
        )])
    }

    #[tokio::test]
    async fn test_hit_requires_matching_hash() {
        let temp = TempDir::new().unwrap();
        let cache = FileSymbolCache::for_project(temp.path());

        assert!(cache.get(TF, "main.tf", "h1").await.is_none());
        cache.set(TF, "main.tf", "h1", symbols("a")).await.unwrap();

        let hit = cache.get(TF, "main.tf", "h1").await.unwrap();
        assert_eq!(hit[0].name, "a");
        assert!(cache.get(TF, "main.tf", "h2").await.is_none());

        let stats = cache.stats().await;
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 2);
        assert_eq!(stats.disk_entries, 1);
    }

    #[tokio::test]
    async fn test_disk_entries_survive_new_instance() {
        let temp = TempDir::new().unwrap();
        FileSymbolCache::for_project(temp.path())
            .set(TF, "main.tf", "h1", symbols("a"))
            .await
            .unwrap();

        let fresh = FileSymbolCache::for_project(temp.path());
        let expected = temp
            .path()
            .join(".symlens/cache/terraform")
            .join(format!("{}.json", hash_content("main.tf")));
        assert!(expected.is_file());
        assert_eq!(fresh.get(TF, "main.tf", "h1").await.unwrap()[0].name, "a");
        assert_eq!(fresh.stats().await.memory_entries, 1);
    }

    #[tokio::test]
    async fn test_corrupt_entry_is_a_miss() {
        let temp = TempDir::new().unwrap();
        let cache = FileSymbolCache::for_project(temp.path());
        let path = cache.entry_path(TF, "main.tf");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"{not json").unwrap();

        assert!(cache.get(TF, "main.tf", "h1").await.is_none());

        cache.set(TF, "main.tf", "h1", symbols("a")).await.unwrap();
        assert!(cache.get(TF, "main.tf", "h1").await.is_some());
    }

    #[tokio::test]
    async fn test_invalidate_and_clear() {
        let temp = TempDir::new().unwrap();
        let cache = FileSymbolCache::for_project(temp.path());
        cache.set(TF, "a.tf", "h", symbols("a")).await.unwrap();
        cache.set(TF, "b.tf", "h", symbols("b")).await.unwrap();

        cache.invalidate(TF, "a.tf").await;
        assert!(cache.get(TF, "a.tf", "h").await.is_none());
        assert!(cache.get(TF, "b.tf", "h").await.is_some());

        cache.clear().await.unwrap();
        assert!(!cache.dir().exists());
        assert!(cache.get(TF, "b.tf", "h").await.is_none());
    }

    #[tokio::test]
    async fn test_memory_layer_evicts_least_recent() {
        let temp = TempDir::new().unwrap();
        let cache = FileSymbolCache::new(temp.path().join("cache"), 2);
        cache.set(TF, "a.tf", "h", symbols("a")).await.unwrap();
        cache.set(TF, "b.tf", "h", symbols("b")).await.unwrap();
        cache.get(TF, "a.tf", "h").await.unwrap();
        cache.set(TF, "c.tf", "h", symbols("c")).await.unwrap();

        let entries = cache.entries.read().await;
        assert_eq!(entries.len(), 2);
        assert!(entries.contains_key(&(TF, "a.tf".to_string())));
        assert!(!entries.contains_key(&(TF, "b.tf".to_string())));
    }

    #[tokio::test]
    async fn test_noop_cache_never_hits() {
        let cache = NoopCache;
        cache.set(TF, "main.tf", "h", symbols("a")).await.unwrap();
        assert!(cache.get(TF, "main.tf", "h").await.is_none());
    }
}

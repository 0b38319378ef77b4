use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::Mutex;
use tracing::debug;

use super::types::{MessageIdentity, RepostRecord};
use crate::db::{DatabaseError, RepostStore};
use crate::web::Metrics;

struct RepostCache {
    /// `None` caches a confirmed absence.
    by_original: HashMap<MessageIdentity, Option<RepostRecord>>,
    board_to_original: HashMap<MessageIdentity, MessageIdentity>,
    reset_at: Instant,
}

impl RepostCache {
    fn new() -> Self {
        Self {
            by_original: HashMap::new(),
            board_to_original: HashMap::new(),
            reset_at: Instant::now(),
        }
    }

    fn clear(&mut self) {
        self.by_original.clear();
        self.board_to_original.clear();
        self.reset_at = Instant::now();
    }

    fn remember(&mut self, original: &MessageIdentity, record: Option<RepostRecord>) {
        if let Some(Some(previous)) = self.by_original.get(original) {
            self.board_to_original.remove(&previous.board);
        }
        if let Some(record) = &record {
            self.board_to_original
                .insert(record.board.clone(), record.original.clone());
        }
        self.by_original.insert(original.clone(), record);
    }
}

/// Repost store with an in-memory lookup cache in front of the database.
/// The cache is dropped wholesale every `ttl` so records changed outside this
/// process are eventually picked up. Writes and cache-filling reads are
/// serialized.
pub struct CachedRepostStore {
    inner: Arc<dyn RepostStore>,
    ttl: Duration,
    cache: RwLock<RepostCache>,
    write_lock: Mutex<()>,
}

impl CachedRepostStore {
    pub fn new(inner: Arc<dyn RepostStore>, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            cache: RwLock::new(RepostCache::new()),
            write_lock: Mutex::new(()),
        }
    }

    #[cfg(test)]
    pub fn invalidate_all(&self) {
        self.cache.write().clear();
    }

    #[cfg(test)]
    pub fn cached_len(&self) -> usize {
        self.cache.read().by_original.len()
    }

    fn expire_if_due(&self) {
        let due = self.cache.read().reset_at.elapsed() >= self.ttl;
        if due {
            let mut cache = self.cache.write();
            if cache.reset_at.elapsed() >= self.ttl {
                debug!(entries = cache.by_original.len(), "resetting repost cache");
                cache.clear();
            }
        }
    }

    fn lookup(&self, original: &MessageIdentity) -> Option<Option<RepostRecord>> {
        self.cache.read().by_original.get(original).cloned()
    }

    fn lookup_board(&self, board: &MessageIdentity) -> Option<RepostRecord> {
        let cache = self.cache.read();
        let original = cache.board_to_original.get(board)?;
        cache.by_original.get(original).cloned().flatten()
    }
}

#[async_trait]
impl RepostStore for CachedRepostStore {
    async fn get_repost(
        &self,
        original: &MessageIdentity,
    ) -> Result<Option<RepostRecord>, DatabaseError> {
        self.expire_if_due();
        if let Some(cached) = self.lookup(original) {
            Metrics::cache_hit();
            return Ok(cached);
        }

        // Reads that fill the cache queue behind writes, so a slow read can
        // never overwrite a newer delete or put.
        let _guard = self.write_lock.lock().await;
        if let Some(cached) = self.lookup(original) {
            Metrics::cache_hit();
            return Ok(cached);
        }

        Metrics::cache_miss();
        let record = self.inner.get_repost(original).await?;
        self.cache.write().remember(original, record.clone());
        Ok(record)
    }

    async fn get_repost_by_board(
        &self,
        board: &MessageIdentity,
    ) -> Result<Option<RepostRecord>, DatabaseError> {
        self.expire_if_due();
        if let Some(record) = self.lookup_board(board) {
            Metrics::cache_hit();
            return Ok(Some(record));
        }

        let _guard = self.write_lock.lock().await;
        if let Some(record) = self.lookup_board(board) {
            Metrics::cache_hit();
            return Ok(Some(record));
        }

        Metrics::cache_miss();
        let record = self.inner.get_repost_by_board(board).await?;
        if let Some(record) = &record {
            self.cache
                .write()
                .remember(&record.original, Some(record.clone()));
        }
        Ok(record)
    }

    async fn put_repost(&self, record: &RepostRecord) -> Result<(), DatabaseError> {
        let _guard = self.write_lock.lock().await;
        self.inner.put_repost(record).await?;
        self.cache
            .write()
            .remember(&record.original, Some(record.clone()));
        Ok(())
    }

    async fn delete_repost(&self, original: &MessageIdentity) -> Result<(), DatabaseError> {
        let _guard = self.write_lock.lock().await;
        self.inner.delete_repost(original).await?;
        self.cache.write().remember(original, None);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use parking_lot::Mutex;

    use super::CachedRepostStore;
    use crate::db::{DatabaseError, RepostStore};
    use crate::starboard::types::{MessageIdentity, RepostRecord};

    #[derive(Default)]
    struct CountingStore {
        records: Mutex<HashMap<MessageIdentity, RepostRecord>>,
        reads: AtomicUsize,
        read_delay: Option<Duration>,
    }

    #[async_trait]
    impl RepostStore for CountingStore {
        async fn get_repost(
            &self,
            original: &MessageIdentity,
        ) -> Result<Option<RepostRecord>, DatabaseError> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            let record = self.records.lock().get(original).cloned();
            if let Some(delay) = self.read_delay {
                tokio::time::sleep(delay).await;
            }
            Ok(record)
        }

        async fn get_repost_by_board(
            &self,
            board: &MessageIdentity,
        ) -> Result<Option<RepostRecord>, DatabaseError> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            Ok(self
                .records
                .lock()
                .values()
                .find(|r| &r.board == board)
                .cloned())
        }

        async fn put_repost(&self, record: &RepostRecord) -> Result<(), DatabaseError> {
            self.records
                .lock()
                .insert(record.original.clone(), record.clone());
            Ok(())
        }

        async fn delete_repost(&self, original: &MessageIdentity) -> Result<(), DatabaseError> {
            self.records.lock().remove(original);
            Ok(())
        }
    }

    fn record() -> RepostRecord {
        RepostRecord::new(
            MessageIdentity::new("100", "1"),
            MessageIdentity::new("900", "9"),
            "42",
        )
    }

    #[tokio::test]
    async fn repeated_lookups_hit_the_cache() {
        let inner = Arc::new(CountingStore::default());
        let store = CachedRepostStore::new(inner.clone(), Duration::from_secs(60));
        let original = MessageIdentity::new("100", "1");

        assert!(store.get_repost(&original).await.unwrap().is_none());
        assert!(store.get_repost(&original).await.unwrap().is_none());
        assert_eq!(inner.reads.load(Ordering::SeqCst), 1);

        store.put_repost(&record()).await.unwrap();
        let found = store.get_repost(&original).await.unwrap().unwrap();
        assert_eq!(found.board, MessageIdentity::new("900", "9"));
        let by_board = store
            .get_repost_by_board(&MessageIdentity::new("900", "9"))
            .await
            .unwrap();
        assert_eq!(by_board.map(|r| r.original), Some(original));
        assert_eq!(inner.reads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn delete_is_visible_through_both_lookups() {
        let inner = Arc::new(CountingStore::default());
        let store = CachedRepostStore::new(inner.clone(), Duration::from_secs(60));
        store.put_repost(&record()).await.unwrap();

        store
            .delete_repost(&MessageIdentity::new("100", "1"))
            .await
            .unwrap();

        assert!(
            store
                .get_repost(&MessageIdentity::new("100", "1"))
                .await
                .unwrap()
                .is_none()
        );
        assert!(
            store
                .get_repost_by_board(&MessageIdentity::new("900", "9"))
                .await
                .unwrap()
                .is_none()
        );
        assert!(inner.records.lock().is_empty());
    }

    #[tokio::test]
    async fn expired_cache_reads_through_again() {
        let inner = Arc::new(CountingStore::default());
        let store = CachedRepostStore::new(inner.clone(), Duration::from_millis(20));
        let original = MessageIdentity::new("100", "1");

        store.get_repost(&original).await.unwrap();
        inner.records.lock().insert(original.clone(), record());
        tokio::time::sleep(Duration::from_millis(40)).await;

        assert!(store.get_repost(&original).await.unwrap().is_some());
        assert_eq!(inner.reads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn invalidate_all_empties_the_cache() {
        let inner = Arc::new(CountingStore::default());
        let store = CachedRepostStore::new(inner, Duration::from_secs(60));
        store.put_repost(&record()).await.unwrap();
        assert_eq!(store.cached_len(), 1);

        store.invalidate_all();
        assert_eq!(store.cached_len(), 0);
    }

    #[tokio::test]
    async fn slow_read_does_not_resurrect_a_concurrent_delete() {
        let inner = Arc::new(CountingStore {
            read_delay: Some(Duration::from_millis(50)),
            ..CountingStore::default()
        });
        inner
            .records
            .lock()
            .insert(MessageIdentity::new("100", "1"), record());
        let store = CachedRepostStore::new(inner.clone(), Duration::from_secs(60));
        let original = MessageIdentity::new("100", "1");
        let board = MessageIdentity::new("900", "9");

        let slow_read = store.get_repost(&original);
        let board_delete = async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            store.get_repost_by_board(&board).await.unwrap();
            store.delete_repost(&original).await.unwrap();
        };
        let (read, ()) = tokio::join!(slow_read, board_delete);

        assert!(read.unwrap().is_some());
        assert!(inner.records.lock().is_empty());
        assert!(store.get_repost(&original).await.unwrap().is_none());
        assert!(store.get_repost_by_board(&board).await.unwrap().is_none());
    }
}

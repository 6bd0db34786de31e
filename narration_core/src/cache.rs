use std::{
    hash::{Hash, Hasher},
    num::NonZeroUsize,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use ahash::AHasher;
use async_trait::async_trait;
use lru::LruCache;
use tokio::sync::RwLock as TokioRwLock;
use tokio::time::{Duration, Instant};
use tracing::debug;

use crate::{SpeechSynthesizer, Voice};

#[derive(Clone)]
struct CachedClip {
    text: String,
    voice: Voice,
    audio: Vec<u8>,
    cached_at: Instant,
}

/// Response cache in front of a synthesis provider, keyed by `(text, voice)`.
///
/// Entries expire after `ttl`; failed calls are never cached.
pub struct CachedSynthesizer<S> {
    inner: S,
    cache: Arc<TokioRwLock<LruCache<u64, CachedClip>>>,
    ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<S: SpeechSynthesizer> CachedSynthesizer<S> {
    pub fn new(inner: S, capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner,
            cache: Arc::new(TokioRwLock::new(LruCache::new(capacity))),
            ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    fn cache_key(text: &str, voice: Voice) -> u64 {
        let mut hasher = AHasher::default();
        text.hash(&mut hasher);
        voice.hash(&mut hasher);
        hasher.finish()
    }
}

#[async_trait]
impl<S: SpeechSynthesizer> SpeechSynthesizer for CachedSynthesizer<S> {
    async fn synthesize(&self, text: &str, voice: Voice) -> anyhow::Result<Vec<u8>> {
        let key = Self::cache_key(text, voice);
        {
            let cache = self.cache.read().await;
            if let Some(clip) = cache.peek(&key) {
                if clip.text == text && clip.voice == voice && clip.cached_at.elapsed() < self.ttl {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    debug!("Synthesis cache hit ({} bytes)", clip.audio.len());
                    return Ok(clip.audio.clone());
                }
            }
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let audio = self.inner.synthesize(text, voice).await?;

        let mut cache = self.cache.write().await;
        cache.put(
            key,
            CachedClip {
                text: text.to_string(),
                voice,
                audio: audio.clone(),
                cached_at: Instant::now(),
            },
        );
        Ok(audio)
    }

    fn content_type(&self) -> &'static str {
        self.inner.content_type()
    }
}

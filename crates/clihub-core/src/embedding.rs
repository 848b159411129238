//! Embedding backends, the bounded embedding cache, and vector utilities.
//!
//! [`EmbeddingService`] is the single entry point the engine uses to turn
//! text into a fixed-length vector. It never fails:
//!
//! 1. Hash the text and return the cached vector if present.
//! 2. Otherwise ask the remote [`EmbeddingBackend`], if one is configured.
//! 3. On any remote failure (network, status, malformed payload, timeout,
//!    wrong dimensionality) fall back to [`LocalHashEmbedder`], which is pure
//!    and needs no network.
//! 4. Cache the result under the same key regardless of source.
//!
//! A remote failure also opens a cooldown window during which every miss goes
//! straight to the local embedder, so a dead provider costs one timeout per
//! window rather than one per entry.
//!
//! Concrete remote backends (OpenAI, Ollama) live in the `clihub` app crate.

use anyhow::Result;
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::tokenize::tokenize;

/// A remote embedding backend.
///
/// Implementations are expected to bound their own latency (HTTP client
/// timeout). Any error returned here is absorbed by [`EmbeddingService`].
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    /// Returns the model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;
    /// Returns the embedding vector dimensionality (e.g. `1536`).
    fn dims(&self) -> usize;
    /// Embed one text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// SHA-256 hex digest of `text`.
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

// ============ Local fallback ============

/// Deterministic feature-hashing embedder.
///
/// Each token, adjacent token pair, and character trigram is hashed into one
/// of `dims` buckets with a hash-derived sign. The result is L2-normalized.
/// Identical text always yields a bit-identical vector.
#[derive(Debug, Clone)]
pub struct LocalHashEmbedder {
    dims: usize,
}

impl LocalHashEmbedder {
    pub fn new(dims: usize) -> Self {
        Self { dims: dims.max(1) }
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    pub fn model_name(&self) -> &str {
        "local-hash-v1"
    }

    pub fn embed(&self, text: &str) -> Vec<f32> {
        let mut vec = vec![0.0f32; self.dims];
        let tokens = tokenize(text);
        if tokens.is_empty() {
            return vec;
        }

        for token in &tokens {
            self.add_feature(&mut vec, &format!("t:{}", token), 1.0);
        }
        for pair in tokens.windows(2) {
            self.add_feature(&mut vec, &format!("b:{}_{}", pair[0], pair[1]), 0.6);
        }
        for token in &tokens {
            let chars: Vec<char> = token.chars().collect();
            if chars.len() > 3 {
                for tri in chars.windows(3) {
                    let trigram: String = tri.iter().collect();
                    self.add_feature(&mut vec, &format!("c:{}", trigram), 0.2);
                }
            }
        }

        let norm: f32 = vec.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > f32::EPSILON {
            for v in &mut vec {
                *v /= norm;
            }
        }
        vec
    }

    fn add_feature(&self, vec: &mut [f32], feature: &str, weight: f32) {
        let digest = Sha256::digest(feature.as_bytes());
        let mut first = [0u8; 8];
        first.copy_from_slice(&digest[..8]);
        let idx = (u64::from_le_bytes(first) % self.dims as u64) as usize;
        let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
        vec[idx] += sign * weight;
    }
}

// ============ Cache ============

/// Counters exposed by [`EmbeddingCache::stats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

struct CacheInner {
    map: HashMap<String, Vec<f32>>,
    order: VecDeque<String>,
    hits: u64,
    misses: u64,
    evictions: u64,
}

/// Bounded, insertion-ordered embedding cache keyed by content hash.
///
/// When full, the oldest inserted key is evicted. Re-inserting an existing
/// key replaces its value without refreshing its position.
pub struct EmbeddingCache {
    capacity: usize,
    inner: Mutex<CacheInner>,
}

impl EmbeddingCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(CacheInner {
                map: HashMap::new(),
                order: VecDeque::new(),
                hits: 0,
                misses: 0,
                evictions: 0,
            }),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn get(&self, key: &str) -> Option<Vec<f32>> {
        let mut inner = self.lock();
        match inner.map.get(key).cloned() {
            Some(v) => {
                inner.hits += 1;
                Some(v)
            }
            None => {
                inner.misses += 1;
                None
            }
        }
    }

    pub fn insert(&self, key: String, vector: Vec<f32>) {
        let mut inner = self.lock();
        if inner.map.contains_key(&key) {
            inner.map.insert(key, vector);
            return;
        }
        inner.order.push_back(key.clone());
        inner.map.insert(key, vector);
        while inner.map.len() > self.capacity {
            match inner.order.pop_front() {
                Some(oldest) => {
                    inner.map.remove(&oldest);
                    inner.evictions += 1;
                }
                None => break,
            }
        }
    }

    pub fn len(&self) -> usize {
        self.lock().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.lock();
        CacheStats {
            entries: inner.map.len(),
            hits: inner.hits,
            misses: inner.misses,
            evictions: inner.evictions,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CacheInner> {
        // A poisoned cache only ever holds complete vectors; keep using it.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

// ============ Service ============

/// Default time the remote backend is skipped after a failure.
pub const DEFAULT_REMOTE_COOLDOWN: Duration = Duration::from_secs(30);

/// Cached text → vector conversion with remote-first, local-fallback policy.
pub struct EmbeddingService {
    remote: Option<Arc<dyn EmbeddingBackend>>,
    local: LocalHashEmbedder,
    cache: EmbeddingCache,
    remote_cooldown: Duration,
    remote_down_until: Mutex<Option<Instant>>,
}

impl EmbeddingService {
    /// A service that only uses the local embedder.
    pub fn local(dims: usize, cache_capacity: usize) -> Self {
        Self {
            remote: None,
            local: LocalHashEmbedder::new(dims),
            cache: EmbeddingCache::new(cache_capacity),
            remote_cooldown: DEFAULT_REMOTE_COOLDOWN,
            remote_down_until: Mutex::new(None),
        }
    }

    /// A service that tries `remote` first. Vectors are always `dims` long.
    pub fn with_remote(
        remote: Arc<dyn EmbeddingBackend>,
        dims: usize,
        cache_capacity: usize,
    ) -> Self {
        Self {
            remote: Some(remote),
            local: LocalHashEmbedder::new(dims),
            cache: EmbeddingCache::new(cache_capacity),
            remote_cooldown: DEFAULT_REMOTE_COOLDOWN,
            remote_down_until: Mutex::new(None),
        }
    }

    /// How long to skip the remote backend after it fails.
    pub fn with_remote_cooldown(mut self, cooldown: Duration) -> Self {
        self.remote_cooldown = cooldown;
        self
    }

    /// Whether the remote backend is currently being skipped.
    pub fn remote_cooling_down(&self) -> bool {
        match *self.down_until() {
            Some(until) => Instant::now() < until,
            None => false,
        }
    }

    fn mark_remote_failed(&self) {
        *self.down_until() = Some(Instant::now() + self.remote_cooldown);
    }

    fn down_until(&self) -> std::sync::MutexGuard<'_, Option<Instant>> {
        self.remote_down_until
            .lock()
            .unwrap_or_else(|e| e.into_inner())
    }

    pub fn dims(&self) -> usize {
        self.local.dims()
    }

    pub fn model_name(&self) -> &str {
        match &self.remote {
            Some(r) => r.model_name(),
            None => self.local.model_name(),
        }
    }

    pub fn cache(&self) -> &EmbeddingCache {
        &self.cache
    }

    /// Embed `text`. Never fails; worst case returns the local vector.
    pub async fn embed(&self, text: &str) -> Vec<f32> {
        let key = content_hash(text);
        if let Some(v) = self.cache.get(&key) {
            return v;
        }

        let remote = self.remote.as_ref().filter(|_| !self.remote_cooling_down());
        let vector = match remote {
            Some(remote) => match remote.embed(text).await {
                Ok(v) if v.len() == self.dims() && v.iter().all(|x| x.is_finite()) => v,
                Ok(v) => {
                    tracing::warn!(
                        model = remote.model_name(),
                        got = v.len(),
                        expected = self.dims(),
                        cooldown = ?self.remote_cooldown,
                        "remote embedding has wrong shape, using local fallback"
                    );
                    self.mark_remote_failed();
                    self.local.embed(text)
                }
                Err(e) => {
                    tracing::warn!(
                        model = remote.model_name(),
                        error = %e,
                        cooldown = ?self.remote_cooldown,
                        "remote embedding failed, using local fallback"
                    );
                    self.mark_remote_failed();
                    self.local.embed(text)
                }
            },
            None => self.local.embed(text),
        };

        self.cache.insert(key, vector.clone());
        vector
    }
}

// ============ Vector utilities ============

/// Encode a float vector as little-endian f32 bytes.
///
/// ```rust
/// use clihub_core::embedding::{vec_to_blob, blob_to_vec};
///
/// let v = vec![1.0f32, -2.5, 3.125];
/// let blob = vec_to_blob(&v);
/// assert_eq!(blob.len(), 12);
/// assert_eq!(blob_to_vec(&blob), v);
/// ```
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode little-endian f32 bytes back into a vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Cosine similarity in `[-1.0, 1.0]`.
///
/// Returns `0.0` for empty vectors, zero vectors, or vectors of different
/// lengths.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

//! Registry of download sources.
//!
//! Sources are compared by identity (the `Arc` they were registered with),
//! never by value. Each registration gets a fresh [`SourceId`] that the
//! failure bookkeeping uses instead of holding the source itself.

use std::fmt;
use std::sync::Arc;

use crate::source::DownloadSource;

/// Lower bound on a file's retry budget.
pub const MIN_MAX_ATTEMPTS: u32 = 3;

/// Upper bound on a file's retry budget.
pub const MAX_MAX_ATTEMPTS: u32 = 255;

/// Retry budget for a file given the registered source count.
///
/// `clamp(sources * attempts_per_source, 3, 255)`.
pub fn compute_max_attempts(source_count: usize, attempts_per_source: u32) -> u32 {
    let sources = u32::try_from(source_count).unwrap_or(u32::MAX);
    sources
        .saturating_mul(attempts_per_source)
        .clamp(MIN_MAX_ATTEMPTS, MAX_MAX_ATTEMPTS)
}

/// Identifier handed out when a source is registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceId(u64);

impl SourceId {
    pub(crate) const fn new(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "source-{}", self.0)
    }
}

/// A source together with its registration id.
#[derive(Clone)]
pub struct RegisteredSource {
    pub id: SourceId,
    pub source: Arc<dyn DownloadSource>,
}

impl fmt::Debug for RegisteredSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredSource")
            .field("id", &self.id)
            .field("name", &self.source.name())
            .finish()
    }
}

#[derive(Debug)]
pub struct SourceRegistry {
    sources: Vec<RegisteredSource>,
    next_id: u64,
    attempts_per_source: u32,
    max_attempts: u32,
}

impl SourceRegistry {
    pub fn new(attempts_per_source: u32) -> Self {
        Self {
            sources: Vec::new(),
            next_id: 1,
            attempts_per_source,
            max_attempts: compute_max_attempts(0, attempts_per_source),
        }
    }

    /// Register a source. Returns `None` if this exact source is already registered.
    pub fn add(&mut self, source: Arc<dyn DownloadSource>) -> Option<SourceId> {
        if self.position(&source).is_some() {
            return None;
        }

        let id = SourceId::new(self.next_id);
        self.next_id += 1;
        self.sources.push(RegisteredSource { id, source });
        self.recompute();
        Some(id)
    }

    /// Unregister a source. Returns `None` if it was not registered.
    pub fn remove(&mut self, source: &Arc<dyn DownloadSource>) -> Option<SourceId> {
        let index = self.position(source)?;
        let removed = self.sources.remove(index);
        self.recompute();
        Some(removed.id)
    }

    pub fn id_of(&self, source: &Arc<dyn DownloadSource>) -> Option<SourceId> {
        self.position(source).map(|i| self.sources[i].id)
    }

    pub fn contains(&self, id: SourceId) -> bool {
        self.sources.iter().any(|s| s.id == id)
    }

    /// Registered ids in registration order.
    pub fn ids(&self) -> Vec<SourceId> {
        self.sources.iter().map(|s| s.id).collect()
    }

    /// Clone of the registered sources in registration order.
    pub fn snapshot(&self) -> Vec<RegisteredSource> {
        self.sources.clone()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    fn position(&self, source: &Arc<dyn DownloadSource>) -> Option<usize> {
        self.sources
            .iter()
            .position(|s| Arc::ptr_eq(&s.source, source))
    }

    fn recompute(&mut self) {
        self.max_attempts = compute_max_attempts(self.sources.len(), self.attempts_per_source);
    }
}

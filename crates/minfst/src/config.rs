// Builder and traversal configuration.

use crate::format::Format;

/// Key buffer size used when a transducer carries no length metadata.
pub const DEFAULT_MAX_KEY_LENGTH: usize = 255;

/// Configuration for [`FstBuilder`](crate::builder::FstBuilder).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuilderConfig {
    /// Maximum number of entries in the frozen-node cache.
    ///
    /// `None` keeps every frozen state as a reuse candidate, which makes the
    /// result strictly minimal. With `Some(n)` the cache is dropped whenever
    /// it reaches `n` entries: memory stays bounded and the transducer stays
    /// correct, but equivalent suffixes frozen before the eviction are no
    /// longer merged with later ones.
    pub cache_size: Option<usize>,
    /// Record format used when the builder streams to storage.
    pub format: Format,
}

impl BuilderConfig {
    pub fn new(cache_size: Option<usize>, format: Format) -> Self {
        Self { cache_size, format }
    }

    pub fn with_cache_size(mut self, cache_size: usize) -> Self {
        self.cache_size = Some(cache_size);
        self
    }

    pub fn with_format(mut self, format: Format) -> Self {
        self.format = format;
        self
    }
}

/// Explicit depth-first stack for lock-step searches.
///
/// Holds one frame per descended symbol plus the root frame, and the key
/// built so far. `buffer_size` bounds the key length the search will build.
#[derive(Debug)]
pub struct SearchConfig<F> {
    pub buffer_size: usize,
    pub frames: Vec<F>,
    pub key: Vec<char>,
}

impl<F> SearchConfig<F> {
    pub fn new(buffer_size: usize) -> Self {
        Self {
            buffer_size,
            frames: Vec::with_capacity(buffer_size.saturating_add(1).min(1024)),
            key: Vec::with_capacity(buffer_size.min(1024)),
        }
    }

    /// Drop every frame and the partial key.
    #[inline]
    pub fn reset(&mut self) {
        self.frames.clear();
        self.key.clear();
    }

    #[inline]
    pub fn depth(&self) -> usize {
        self.key.len()
    }

    /// Whether another symbol fits in the key buffer.
    #[inline]
    pub fn can_descend(&self) -> bool {
        self.key.len() < self.buffer_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_config_defaults() {
        let config = BuilderConfig::default();
        assert_eq!(config.cache_size, None);
        assert_eq!(config.format, Format::Default);

        let config = config.with_cache_size(64).with_format(Format::Compressed);
        assert_eq!(config, BuilderConfig::new(Some(64), Format::Compressed));
    }

    #[test]
    fn search_config_bounds_depth() {
        let mut config: SearchConfig<u32> = SearchConfig::new(2);
        assert!(config.can_descend());
        config.key.push('a');
        config.key.push('b');
        assert_eq!(config.depth(), 2);
        assert!(!config.can_descend());

        config.frames.push(7);
        config.reset();
        assert_eq!(config.depth(), 0);
        assert!(config.frames.is_empty());
    }
}

//! Context configuration

/// Tuning knobs for a [`crate::Context`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextConfig {
    /// Number of heap cells reserved up front
    pub initial_heap_cells: usize,
    /// Bytes allocated since the last collection (including module side
    /// tables) that trigger the next one
    pub gc_threshold_bytes: usize,
    /// Whether [`crate::Context::maybe_collect`] runs a collection at all
    pub collect_on_threshold: bool,
}

impl ContextConfig {
    /// Smallest threshold accepted; lower values are clamped
    pub const MIN_GC_THRESHOLD: usize = 4096;

    /// Set the collection threshold, clamped to [`Self::MIN_GC_THRESHOLD`]
    pub fn with_gc_threshold(mut self, bytes: usize) -> Self {
        self.gc_threshold_bytes = bytes.max(Self::MIN_GC_THRESHOLD);
        self
    }

    /// Disable threshold-triggered collections (explicit ones still run)
    pub fn without_auto_collect(mut self) -> Self {
        self.collect_on_threshold = false;
        self
    }
}

impl Default for ContextConfig {
    fn default() -> Self {
        ContextConfig {
            initial_heap_cells: 256,
            gc_threshold_bytes: 1024 * 1024,
            collect_on_threshold: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = ContextConfig::default();
        assert_eq!(cfg.initial_heap_cells, 256);
        assert!(cfg.collect_on_threshold);
    }

    #[test]
    fn test_threshold_clamped() {
        let cfg = ContextConfig::default().with_gc_threshold(10);
        assert_eq!(cfg.gc_threshold_bytes, ContextConfig::MIN_GC_THRESHOLD);

        let cfg = ContextConfig::default().with_gc_threshold(1 << 20);
        assert_eq!(cfg.gc_threshold_bytes, 1 << 20);
        assert!(!cfg.without_auto_collect().collect_on_threshold);
    }
}

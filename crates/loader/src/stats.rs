//! Loader bookkeeping.

use serde::Serialize;

/// Running totals since the loader was created.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LoaderCounters {
    /// Load attempts made by the frame cycle or `cache_now`.
    pub loads_attempted: u64,
    pub textures_cached: u64,
    pub shaders_cached: u64,
    /// Requests answered from the cache without loading.
    pub touches: u64,
    pub load_errors: u64,
    pub graphic_errors: u64,
    pub destroyed: u64,
    pub reloads: u64,
    pub cycles: u64,
}

/// Point-in-time view of the loader.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoaderStats {
    pub cached_textures: usize,
    pub cached_shaders: usize,
    /// Distinct handles waiting to be loaded.
    pub pending: usize,
    pub queued_destroys: usize,
    pub render_targets: usize,
    pub depth_buffers: usize,
    /// Approximate VRAM held by cached textures.
    pub estimated_texture_bytes: u64,
    pub reload_requested: bool,
    pub counters: LoaderCounters,
}

impl LoaderStats {
    pub fn cached(&self) -> usize {
        self.cached_textures + self.cached_shaders
    }

    /// Fraction of load attempts that failed (0.0 to 1.0).
    pub fn failure_rate(&self) -> f64 {
        let attempts = self.counters.loads_attempted;
        if attempts == 0 {
            0.0
        } else {
            (self.counters.load_errors + self.counters.graphic_errors) as f64 / attempts as f64
        }
    }
}

/// What one call to `per_frame_cycle` did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    /// A full reload was started this cycle.
    pub reloaded: bool,
    pub destroyed: usize,
    /// Pending entries processed, duplicates included.
    pub attempted: usize,
    pub cached: usize,
    /// Entries that were already cached when their turn came.
    pub touched: usize,
    pub failed: usize,
}

impl CycleReport {
    pub fn is_idle(&self) -> bool {
        !self.reloaded && self.destroyed == 0 && self.attempted == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(counters: LoaderCounters) -> LoaderStats {
        LoaderStats {
            cached_textures: 2,
            cached_shaders: 1,
            pending: 0,
            queued_destroys: 0,
            render_targets: 0,
            depth_buffers: 0,
            estimated_texture_bytes: 0,
            reload_requested: false,
            counters,
        }
    }

    #[test]
    fn test_failure_rate() {
        assert_eq!(stats(LoaderCounters::default()).failure_rate(), 0.0);

        let counters =
            LoaderCounters { loads_attempted: 4, load_errors: 1, graphic_errors: 1, ..Default::default() };
        assert_eq!(stats(counters).failure_rate(), 0.5);
        assert_eq!(stats(counters).cached(), 3);
    }

    #[test]
    fn test_idle_cycle() {
        assert!(CycleReport::default().is_idle());
        assert!(!CycleReport { reloaded: true, ..Default::default() }.is_idle());
    }
}

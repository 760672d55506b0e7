//! Toggleable feature flags for simulations.

use std::sync::atomic::{AtomicBool, Ordering};
use txlock_types::FeatureFlags;

/// Feature switches that tests can flip mid-run.
pub struct SimFlags {
    directsend: AtomicBool,
    block_filtering: AtomicBool,
    lite: AtomicBool,
}

impl SimFlags {
    /// Everything enabled, full node.
    pub fn all_on() -> Self {
        Self {
            directsend: AtomicBool::new(true),
            block_filtering: AtomicBool::new(true),
            lite: AtomicBool::new(false),
        }
    }

    /// Switch the lock feature on or off.
    pub fn set_directsend(&self, enabled: bool) {
        self.directsend.store(enabled, Ordering::SeqCst);
    }

    /// Switch block filtering on or off.
    pub fn set_block_filtering(&self, enabled: bool) {
        self.block_filtering.store(enabled, Ordering::SeqCst);
    }

    /// Switch lite mode on or off.
    pub fn set_lite_mode(&self, enabled: bool) {
        self.lite.store(enabled, Ordering::SeqCst);
    }
}

impl FeatureFlags for SimFlags {
    fn directsend_enabled(&self) -> bool {
        self.directsend.load(Ordering::SeqCst)
    }

    fn block_filtering_enabled(&self) -> bool {
        self.block_filtering.load(Ordering::SeqCst)
    }

    fn lite_mode(&self) -> bool {
        self.lite.load(Ordering::SeqCst)
    }
}

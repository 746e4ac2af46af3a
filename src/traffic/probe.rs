//! Connectivity probes.
//!
//! The retry executor asks the probe before every attempt; an offline answer
//! fails the call with [`HuginnError::Offline`](crate::HuginnError::Offline)
//! without touching the network.

use std::sync::atomic::{AtomicBool, Ordering};

/// Reports whether the host believes the network is reachable.
pub trait ConnectivityProbe: Send + Sync {
    fn is_online(&self) -> bool;
}

/// Probe that never reports offline. The default.
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysOnline;

impl ConnectivityProbe for AlwaysOnline {
    fn is_online(&self) -> bool {
        true
    }
}

/// Probe whose state is set by the host (e.g. from a platform online/offline event).
#[derive(Debug)]
pub struct ManualProbe {
    online: AtomicBool,
}

impl ManualProbe {
    pub fn new(online: bool) -> Self {
        Self {
            online: AtomicBool::new(online),
        }
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::Release);
    }
}

impl Default for ManualProbe {
    fn default() -> Self {
        Self::new(true)
    }
}

impl ConnectivityProbe for ManualProbe {
    fn is_online(&self) -> bool {
        self.online.load(Ordering::Acquire)
    }
}

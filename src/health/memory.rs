use serde::Serialize;
use sysinfo::{ProcessExt, System, SystemExt};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MemoryUsage {
    pub total_bytes: u64,
    pub available_bytes: u64,
    /// Resident set size of this process, when the platform reports it.
    pub process_resident_bytes: Option<u64>,
}

impl MemoryUsage {
    pub fn used_bytes(&self) -> u64 {
        self.total_bytes.saturating_sub(self.available_bytes)
    }

    /// Used / total, in `[0, 1]`.
    pub fn ratio(&self) -> f64 {
        if self.total_bytes == 0 {
            return 0.0;
        }
        self.used_bytes() as f64 / self.total_bytes as f64
    }
}

/// Source of the memory-pressure signal.
pub trait MemoryGauge: Send + Sync {
    /// `None` when the reading is unavailable.
    fn sample(&self) -> Option<MemoryUsage>;
}

/// Host and process memory through `sysinfo`. Each sample refreshes a fresh
/// `System`, so nothing is cached between calls.
#[derive(Debug, Default, Clone, Copy)]
pub struct SysinfoGauge;

impl MemoryGauge for SysinfoGauge {
    fn sample(&self) -> Option<MemoryUsage> {
        let mut sys = System::new();
        sys.refresh_memory();
        let total_bytes = sys.total_memory();
        if total_bytes == 0 {
            warn!("sysinfo reported no total memory");
            return None;
        }

        let process_resident_bytes = match sysinfo::get_current_pid() {
            Ok(pid) => {
                sys.refresh_process(pid);
                sys.process(pid).map(|p| p.memory())
            }
            Err(e) => {
                warn!(error = e, "cannot resolve current pid");
                None
            }
        };

        Some(MemoryUsage {
            total_bytes,
            available_bytes: sys.available_memory().min(total_bytes),
            process_resident_bytes,
        })
    }
}

/// A constant reading.
#[derive(Debug, Clone, Copy)]
pub struct FixedGauge(pub Option<MemoryUsage>);

impl FixedGauge {
    /// A gauge reporting `percent` of a 1000-byte total as used.
    pub fn percent_used(percent: u64) -> Self {
        let percent = percent.min(100);
        Self(Some(MemoryUsage {
            total_bytes: 1000,
            available_bytes: 1000 - percent * 10,
            process_resident_bytes: None,
        }))
    }
}

impl MemoryGauge for FixedGauge {
    fn sample(&self) -> Option<MemoryUsage> {
        self.0
    }
}

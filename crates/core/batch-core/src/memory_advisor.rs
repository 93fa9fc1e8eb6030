//! C1 — MemoryAdvisor: heap-pressure reporting and batch-size recommendation.

use tracing::warn;

/// Qualitative heap-utilization level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pressure {
    /// Used/limit <= 0.6.
    Low,
    /// Used/limit <= 0.75.
    Elevated,
    /// Used/limit <= 0.9.
    High,
    /// Used/limit > 0.9.
    Critical,
}

impl Pressure {
    /// Classify a used/limit ratio into a [`Pressure`] level.
    pub fn from_ratio(ratio: f64) -> Self {
        if ratio <= 0.6 {
            Pressure::Low
        } else if ratio <= 0.75 {
            Pressure::Elevated
        } else if ratio <= 0.9 {
            Pressure::High
        } else {
            Pressure::Critical
        }
    }
}

/// Advisory input for adaptive batch sizing. Implementors must be cheap to
/// call repeatedly: `BatchOperationManager` consults this between batches.
pub trait MemoryAdvisor: Send + Sync {
    /// Current heap pressure. A failure to read metrics should be treated as `Low`
    /// by the caller (see [`MemoryAdvisor::current_pressure_or_low`]).
    fn current_pressure(&self) -> Result<Pressure, String>;

    /// Recommend a revised batch size given the current size, the size the
    /// operation started with, and the current pressure.
    fn recommend(&self, current_size: usize, initial_size: usize, pressure: Pressure) -> usize {
        match pressure {
            Pressure::Critical => (current_size / 2).max(10),
            Pressure::High => (((current_size as f64) * 0.75) as usize).max(10),
            Pressure::Low if current_size < initial_size => {
                (((current_size as f64) * 1.25) as usize).min(initial_size * 2)
            }
            _ => current_size,
        }
    }

    /// Best-effort hint that slack memory may be released. No correctness contract.
    fn request_reclaim(&self) {}

    /// [`MemoryAdvisor::current_pressure`], demoting read failures to `Low` and logging them.
    fn current_pressure_or_low(&self) -> Pressure {
        match self.current_pressure() {
            Ok(p) => p,
            Err(e) => {
                warn!("memory advisor unavailable, treating pressure as low: {e}");
                Pressure::Low
            }
        }
    }
}

/// Default [`MemoryAdvisor`] backed by system-wide memory stats via `sysinfo`.
pub struct SystemMemoryAdvisor {
    system: parking_lot::Mutex<sysinfo::System>,
    /// Soft heap-limit override; `None` means "use total system memory".
    limit_bytes: Option<u64>,
}

impl SystemMemoryAdvisor {
    /// Create an advisor that reports pressure relative to total system memory.
    pub fn new() -> Self {
        let mut system = sysinfo::System::new();
        system.refresh_memory();
        Self {
            system: parking_lot::Mutex::new(system),
            limit_bytes: None,
        }
    }

    /// Create an advisor that reports pressure relative to an explicit heap limit
    /// (useful when the process is confined by a cgroup or container memory cap).
    pub fn with_limit(limit_bytes: u64) -> Self {
        let mut advisor = Self::new();
        advisor.limit_bytes = Some(limit_bytes);
        advisor
    }
}

impl Default for SystemMemoryAdvisor {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryAdvisor for SystemMemoryAdvisor {
    fn current_pressure(&self) -> Result<Pressure, String> {
        let mut system = self.system.lock();
        system.refresh_memory();
        let total = self.limit_bytes.unwrap_or_else(|| system.total_memory());
        if total == 0 {
            return Err("reported total memory is zero".to_string());
        }
        let used = system.used_memory();
        Ok(Pressure::from_ratio(used as f64 / total as f64))
    }

    fn request_reclaim(&self) {
        self.system.lock().refresh_memory();
    }
}

/// Test double that replays a scripted sequence of [`Pressure`] values, one
/// per call to `current_pressure`, then repeats the last entry forever.
/// Used by property tests (e.g. the adaptive-shrink-under-pressure scenario)
/// that need deterministic pressure transitions without a live system read.
pub struct ScriptedMemoryAdvisor {
    script: parking_lot::Mutex<Vec<Pressure>>,
    cursor: std::sync::atomic::AtomicUsize,
}

impl ScriptedMemoryAdvisor {
    /// Build an advisor that yields `script[0]`, then `script[1]`, ..., then repeats `script.last()`.
    pub fn new(script: Vec<Pressure>) -> Self {
        assert!(!script.is_empty(), "scripted advisor needs at least one entry");
        Self {
            script: parking_lot::Mutex::new(script),
            cursor: std::sync::atomic::AtomicUsize::new(0),
        }
    }
}

impl MemoryAdvisor for ScriptedMemoryAdvisor {
    fn current_pressure(&self) -> Result<Pressure, String> {
        let script = self.script.lock();
        let idx = self
            .cursor
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst)
            .min(script.len() - 1);
        Ok(script[idx])
    }
}

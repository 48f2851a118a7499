//! Time source seam.
//!
//! Every operation reads `now` exactly once per attempt through this
//! trait, so tests can pin time and the sweep can replay windows
//! deterministically.

/// Unix-seconds time source.
pub trait Clock: Send + Sync {
    fn now(&self) -> u64;
}

/// Wall-clock time.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs()
    }
}

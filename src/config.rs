use anyhow::{ensure, Context, Result};
use serde::{Deserialize, Serialize};

use crate::kernel::Multiway;
use crate::scratchpad::SlowMemory;

/// Startup configuration for the worker pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CpuConfig {
    #[serde(default)]
    pub slow_memory: SlowMemory,
    pub threads: Vec<ThreadConfig>,
}

/// One worker: its kernel width and an optional CPU to pin to. An absent
/// `cpu_affinity` leaves the thread on OS-default placement.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ThreadConfig {
    pub multiway: Multiway,
    #[serde(default)]
    pub cpu_affinity: Option<u32>,
}

impl CpuConfig {
    pub fn from_json(text: &str) -> Result<Self> {
        let config: CpuConfig = serde_json::from_str(text).context("invalid cpu config")?;
        config.validate()?;
        Ok(config)
    }

    /// `threads` identical workers, unpinned.
    pub fn uniform(threads: usize, multiway: Multiway, slow_memory: SlowMemory) -> Self {
        Self {
            slow_memory,
            threads: vec![
                ThreadConfig {
                    multiway,
                    cpu_affinity: None,
                };
                threads
            ],
        }
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(
            !self.threads.is_empty(),
            "at least one worker thread must be configured"
        );
        Ok(())
    }

    pub fn thread_count(&self) -> usize {
        self.threads.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_config() {
        let config = CpuConfig::from_json(
            r#"{
                "slow_memory": "no_mlck",
                "threads": [
                    { "multiway": 2, "cpu_affinity": 0 },
                    { "multiway": 1 },
                    { "multiway": 6, "cpu_affinity": null }
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(config.slow_memory, SlowMemory::NoMlck);
        assert_eq!(config.thread_count(), 3);
        assert_eq!(config.threads[0].multiway, Multiway::Double);
        assert_eq!(config.threads[0].cpu_affinity, Some(0));
        assert_eq!(config.threads[1].cpu_affinity, None);
        assert_eq!(config.threads[2].multiway, Multiway::Hex);
    }

    #[test]
    fn slow_memory_defaults_to_warn() {
        let config = CpuConfig::from_json(r#"{ "threads": [ { "multiway": 1 } ] }"#).unwrap();
        assert_eq!(config.slow_memory, SlowMemory::Warn);
    }

    #[test]
    fn rejects_unknown_fields() {
        assert!(CpuConfig::from_json(
            r#"{ "threads": [ { "multiway": 1 } ], "gpu_threads": 4 }"#
        )
        .is_err());
    }

    #[test]
    fn rejects_empty_thread_list() {
        assert!(CpuConfig::from_json(r#"{ "threads": [] }"#).is_err());
    }

    #[test]
    fn rejects_unsupported_width() {
        assert!(CpuConfig::from_json(r#"{ "threads": [ { "multiway": 3 } ] }"#).is_err());
    }

    #[test]
    fn uniform_builds_unpinned_workers() {
        let config = CpuConfig::uniform(4, Multiway::Double, SlowMemory::Always);
        assert_eq!(config.thread_count(), 4);
        assert!(config.threads.iter().all(|t| t.cpu_affinity.is_none()));
        config.validate().unwrap();
    }
}

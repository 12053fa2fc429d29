//! Kernel configuration.

/// Configuration for the Kernel.
#[derive(Debug, Clone)]
pub struct KernelConfig {
    /// Whether audit events carry JSON before/after snapshots of the
    /// affected record. Disable to keep the trail to bare facts.
    pub audit_snapshots: bool,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            audit_snapshots: true,
        }
    }
}

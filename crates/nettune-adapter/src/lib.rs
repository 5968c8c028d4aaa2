//! nettune-adapter: Kernel Capability Layer
//!
//! Thin drivers over the external tools the engine mutates the system with:
//! - Sysctl driver (`sysctl` binary + /etc/sysctl.d persistence)
//! - Qdisc driver (`tc`, /proc/net/route, /sys/class/net)
//! - Systemd driver (`systemctl` + managed unit generation)
//!
//! Each driver is a trait so the apply engine can run against in-memory
//! fakes; the `Tc`/`ProcSysctl`/`Systemctl` types are the real
//! implementations.

pub mod command;
pub mod qdisc;
pub mod sysctl;
pub mod systemd;

use std::sync::Arc;

pub use qdisc::{QdiscDriver, Tc};
pub use sysctl::{ProcSysctl, SysctlDriver};
pub use systemd::{Systemctl, SystemdDriver};

/// Bundle of the three drivers the engine operates through.
#[derive(Clone)]
pub struct SystemAdapter {
    pub sysctl: Arc<dyn SysctlDriver>,
    pub qdisc: Arc<dyn QdiscDriver>,
    pub systemd: Arc<dyn SystemdDriver>,
}

impl SystemAdapter {
    /// Adapter backed by the real system tools.
    pub fn new() -> Self {
        Self {
            sysctl: Arc::new(ProcSysctl::new()),
            qdisc: Arc::new(Tc::new()),
            systemd: Arc::new(Systemctl::new()),
        }
    }
}

impl Default for SystemAdapter {
    fn default() -> Self {
        Self::new()
    }
}

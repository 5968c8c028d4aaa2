//! Active probes
//!
//! RTT, throughput and latency-under-load testers driving the server's
//! probe endpoints. Results feed the operator's tuning decisions; the apply
//! engine never sees them.

pub mod load;
pub mod rtt;
pub mod stats;
pub mod throughput;

pub use load::LatencyLoadTester;
pub use rtt::RttTester;
pub use throughput::ThroughputTester;

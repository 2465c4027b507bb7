//! Internal port allocation
//!
//! Finds a free TCP port by probing the loopback interface. The result is
//! advisory: a concurrent allocator may claim the port before the supervisor
//! binds it, so the caller retries the supervisor step on bind failure.

use std::time::Duration;

use tokio::net::TcpListener;
use tokio::time::timeout;
use tracing::debug;

use crate::errors::OrchestratorError;

/// Per-probe bind timeout
pub const PROBE_TIMEOUT: Duration = Duration::from_millis(250);

/// Closed range of candidate internal ports
#[derive(Debug, Clone, Copy)]
pub struct PortRange {
    pub start: u16,
    pub end: u16,
}

impl Default for PortRange {
    fn default() -> Self {
        Self {
            start: 4001,
            end: 4999,
        }
    }
}

/// Port allocator scanning a bounded range in ascending order.
#[derive(Debug, Clone, Copy)]
pub struct PortAllocator {
    range: PortRange,
}

impl PortAllocator {
    pub fn new(range: PortRange) -> Self {
        Self { range }
    }

    /// Return the first free port in the range.
    ///
    /// A port is declared free only when a listening socket binds and is
    /// closed again. Any bind error, permission error, or timeout marks the
    /// candidate busy.
    pub async fn allocate(&self) -> Result<u16, OrchestratorError> {
        for port in self.range.start..=self.range.end {
            match timeout(PROBE_TIMEOUT, TcpListener::bind(("127.0.0.1", port))).await {
                Ok(Ok(listener)) => {
                    drop(listener);
                    debug!("Allocated internal port {}", port);
                    return Ok(port);
                }
                Ok(Err(_)) | Err(_) => continue,
            }
        }

        Err(OrchestratorError::PortExhausted {
            start: self.range.start,
            end: self.range.end,
        })
    }
}

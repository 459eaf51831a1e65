//! Active discovery of RTSP hosts on the local subnet.

use crate::network::{self, NetworkError};
use camsync_types::{DiscoveredStream, DEFAULT_CONTROL_PORT};
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio::sync::Semaphore;
use tokio::time::timeout;
use tracing::{debug, info};

#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error(transparent)]
    Network(#[from] NetworkError),

    #[error("Scan worker failed: {0}")]
    Worker(String),
}

/// Scanner tuning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanConfig {
    /// Port dialed on every candidate host
    pub port: u16,
    /// Per-host connect timeout
    pub timeout: Duration,
    /// Maximum dials in flight
    pub concurrency: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_CONTROL_PORT,
            timeout: Duration::from_millis(200),
            concurrency: 50,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct NetworkScanner {
    config: ScanConfig,
}

impl NetworkScanner {
    pub fn new(config: ScanConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Scan the /24 of this machine's own IPv4 address.
    pub async fn scan(&self) -> Result<Vec<DiscoveredStream>, DiscoveryError> {
        let local = network::local_ipv4_network()?;
        self.scan_subnet(local.address).await
    }

    /// Dial `.1` through `.254` of `local`'s /24, skipping `local` itself.
    ///
    /// Hosts that refuse or time out are simply absent from the result,
    /// which is sorted by address. Nothing is persisted.
    pub async fn scan_subnet(&self, local: Ipv4Addr) -> Result<Vec<DiscoveredStream>, DiscoveryError> {
        let [a, b, c, _] = local.octets();
        let started = Instant::now();
        info!(
            subnet = %format!("{}.{}.{}.0/24", a, b, c),
            port = self.config.port,
            "Starting network discovery"
        );

        let semaphore = Arc::new(Semaphore::new(self.config.concurrency.max(1)));
        let mut handles = Vec::with_capacity(254);

        for host in 1..=254u8 {
            let target = Ipv4Addr::new(a, b, c, host);
            if target == local {
                continue;
            }

            let semaphore = semaphore.clone();
            let port = self.config.port;
            let dial_timeout = self.config.timeout;
            handles.push(tokio::spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return None;
                };
                let addr = SocketAddr::from((target, port));
                match timeout(dial_timeout, TcpStream::connect(addr)).await {
                    Ok(Ok(_)) => Some(target),
                    Ok(Err(_)) | Err(_) => None,
                }
            }));
        }

        let mut found = Vec::new();
        for handle in handles {
            match handle.await {
                Ok(Some(address)) => {
                    debug!(address = %address, "Host answered");
                    found.push(address);
                }
                Ok(None) => {}
                Err(e) => return Err(DiscoveryError::Worker(e.to_string())),
            }
        }
        found.sort();

        info!(
            "Discovery found {} hosts in {:?}",
            found.len(),
            started.elapsed()
        );

        Ok(found
            .into_iter()
            .map(|address| DiscoveredStream::new(address.to_string(), self.config.port))
            .collect())
    }
}

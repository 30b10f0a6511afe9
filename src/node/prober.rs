//! TCP connectivity prober for parsed nodes

use crate::node::models::{NodeDescriptor, ProbeError, ProbeResult};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::{lookup_host, TcpStream};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Default timeout for a single probe in milliseconds
pub const DEFAULT_TIMEOUT_MS: u64 = 3000;

/// Default number of concurrent probes
pub const DEFAULT_CONCURRENCY: usize = 200;

/// Configuration for the prober
#[derive(Debug, Clone)]
pub struct ProberConfig {
    /// Timeout for each probe, covering name resolution and connect
    pub timeout: Duration,
    /// Maximum number of probes in flight
    pub concurrency: usize,
}

impl Default for ProberConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            concurrency: DEFAULT_CONCURRENCY,
        }
    }
}

impl ProberConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }
}

/// The limiter was closed before a permit could be granted
#[derive(Debug, Clone, Copy, thiserror::Error)]
#[error("probe limiter is closed")]
pub struct LimiterClosed;

/// Bounds the number of probes in flight
#[derive(Debug, Clone)]
pub struct ProbeLimiter {
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

impl ProbeLimiter {
    /// Create a limiter; a capacity of zero is raised to one
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.clamp(1, Semaphore::MAX_PERMITS);
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Permits not currently held by a probe
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Wait for a free slot; the slot is released when the permit drops
    pub async fn acquire(&self) -> Result<OwnedSemaphorePermit, LimiterClosed> {
        Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| LimiterClosed)
    }

    /// Refuse all further acquisitions
    pub fn close(&self) {
        self.semaphore.close();
    }
}

/// Prober for measuring TCP connect latency
#[derive(Debug, Clone)]
pub struct NodeProber {
    config: ProberConfig,
    limiter: ProbeLimiter,
}

impl NodeProber {
    /// Create a new prober with default configuration
    pub fn new() -> Self {
        Self::with_config(ProberConfig::default())
    }

    /// Create a new prober with its own limiter sized from the configuration
    pub fn with_config(config: ProberConfig) -> Self {
        let limiter = ProbeLimiter::new(config.concurrency);
        Self { config, limiter }
    }

    /// Create a new prober sharing an existing limiter
    pub fn with_limiter(config: ProberConfig, limiter: ProbeLimiter) -> Self {
        Self { config, limiter }
    }

    pub fn config(&self) -> &ProberConfig {
        &self.config
    }

    pub fn limiter(&self) -> &ProbeLimiter {
        &self.limiter
    }

    /// Probe a single node
    ///
    /// The connection is dropped as soon as it is established; no data is
    /// exchanged. Every failure is reported as a dead result.
    pub async fn probe(&self, descriptor: NodeDescriptor) -> ProbeResult {
        self.probe_with(descriptor, |host, port| async move { connect(&host, port).await })
            .await
    }

    /// Time a dial attempt under the configured timeout
    async fn probe_with<F, Fut>(&self, descriptor: NodeDescriptor, dial: F) -> ProbeResult
    where
        F: FnOnce(String, u16) -> Fut,
        Fut: Future<Output = Result<TcpStream, ProbeError>>,
    {
        let start = Instant::now();

        let outcome = tokio::time::timeout(
            self.config.timeout,
            dial(descriptor.host.clone(), descriptor.port),
        )
        .await;

        match outcome {
            Ok(Ok(stream)) => {
                let latency_ms = start.elapsed().as_secs_f64() * 1000.0;
                drop(stream);
                log::debug!("{} alive in {:.1}ms", descriptor, latency_ms);
                ProbeResult::alive(descriptor, latency_ms)
            }
            Ok(Err(e)) => {
                log::debug!("{} dead: {}", descriptor, e);
                ProbeResult::dead(descriptor, e)
            }
            Err(_) => {
                log::debug!("{} timed out after {:?}", descriptor, self.config.timeout);
                ProbeResult::dead(descriptor, ProbeError::Timeout)
            }
        }
    }
}

impl Default for NodeProber {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolve and connect, trying each resolved address in order
async fn connect(host: &str, port: u16) -> Result<TcpStream, ProbeError> {
    let addrs: Vec<SocketAddr> = lookup_host((host, port))
        .await
        .map_err(|e| ProbeError::DnsFailure(e.to_string()))?
        .collect();

    let mut last_error = None;
    for addr in addrs {
        match TcpStream::connect(addr).await {
            Ok(stream) => return Ok(stream),
            Err(e) => last_error = Some(e),
        }
    }

    Err(match last_error {
        Some(e) => ProbeError::from(e),
        None => ProbeError::DnsFailure(format!("no addresses for {}", host)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::models::{ProbeStatus, Protocol};
    use tokio::net::TcpListener;

    fn node(host: &str, port: u16) -> NodeDescriptor {
        NodeDescriptor::new(
            format!("trojan://pw@{}:{}", host, port),
            Protocol::Trojan,
            host.to_string(),
            port,
        )
    }

    async fn closed_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        port
    }

    #[test]
    fn test_prober_config_default() {
        let config = ProberConfig::default();
        assert_eq!(config.timeout, Duration::from_millis(DEFAULT_TIMEOUT_MS));
        assert_eq!(config.concurrency, DEFAULT_CONCURRENCY);
    }

    #[test]
    fn test_prober_config_builder() {
        let config = ProberConfig::new()
            .with_timeout(Duration::from_secs(5))
            .with_concurrency(50);

        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.concurrency, 50);

        let prober = NodeProber::with_config(config);
        assert_eq!(prober.limiter().capacity(), 50);
    }

    #[test]
    fn test_limiter_zero_capacity_is_raised() {
        let limiter = ProbeLimiter::new(0);
        assert_eq!(limiter.capacity(), 1);
        assert_eq!(limiter.available(), 1);
    }

    #[tokio::test]
    async fn test_limiter_bounds_permits() {
        let limiter = ProbeLimiter::new(2);
        let first = limiter.acquire().await.unwrap();
        let _second = limiter.acquire().await.unwrap();
        assert_eq!(limiter.available(), 0);

        let blocked = tokio::time::timeout(Duration::from_millis(50), limiter.acquire()).await;
        assert!(blocked.is_err());

        drop(first);
        assert_eq!(limiter.available(), 1);
        assert!(limiter.acquire().await.is_ok());
    }

    #[tokio::test]
    async fn test_limiter_closed() {
        let limiter = ProbeLimiter::new(4);
        limiter.close();
        assert!(limiter.acquire().await.is_err());
    }

    #[tokio::test]
    async fn test_probe_open_port() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let prober = NodeProber::new();
        let result = prober.probe(node("127.0.0.1", port)).await;

        assert!(result.is_alive());
        let latency = result.latency_ms.unwrap();
        assert!(latency >= 0.0);
        assert!(latency < DEFAULT_TIMEOUT_MS as f64);
    }

    #[tokio::test]
    async fn test_probe_closed_port() {
        let port = closed_port().await;
        let timeout = Duration::from_millis(500);
        let prober = NodeProber::with_config(ProberConfig::new().with_timeout(timeout));

        let start = Instant::now();
        let result = prober.probe(node("127.0.0.1", port)).await;

        assert!(!result.is_alive());
        assert!(result.latency_ms.is_none());
        assert!(matches!(result.status, ProbeStatus::Dead(_)));
        assert!(start.elapsed() < timeout + Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_stalled_connect_times_out() {
        let timeout = Duration::from_millis(100);
        let prober = NodeProber::with_config(ProberConfig::new().with_timeout(timeout));

        let start = Instant::now();
        let result = prober
            .probe_with(node("10.255.255.1", 443), |_, _| {
                futures::future::pending::<Result<TcpStream, ProbeError>>()
            })
            .await;
        let elapsed = start.elapsed();

        assert_eq!(result.error(), Some(&ProbeError::Timeout));
        assert!(result.latency_ms.is_none());
        assert!(elapsed >= timeout);
        assert!(elapsed < timeout + Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_probe_unresolvable_host() {
        let prober = NodeProber::with_config(
            ProberConfig::new().with_timeout(Duration::from_millis(1500)),
        );
        let result = prober.probe(node("node.invalid", 443)).await;

        assert!(!result.is_alive());
        assert!(matches!(
            result.error(),
            Some(ProbeError::DnsFailure(_)) | Some(ProbeError::Timeout)
        ));
    }
}

//! TCP connect probe implementation.
//!
//! A probe only establishes the connection and closes it again; no
//! application data is exchanged.

use std::future::Future;
use std::io;
use std::net::{SocketAddr, TcpStream as StdTcpStream};
use std::time::{Duration, Instant};

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::TcpSocket;
use tokio_util::sync::CancellationToken;

use super::{NetworkMode, ProbeError};

/// Hook applied to every probe socket after creation, before connecting.
pub type SocketHook = fn(&Socket) -> io::Result<()>;

/// Establishes (and immediately drops) one connection.
pub trait Connector: Send + Sync + 'static {
    fn connect(
        &self,
        mode: NetworkMode,
        target: SocketAddr,
    ) -> impl Future<Output = io::Result<()>> + Send;
}

/// Connector using real sockets.
#[derive(Debug, Clone, Copy)]
pub struct TcpConnector {
    hook: SocketHook,
}

impl Default for TcpConnector {
    fn default() -> Self {
        Self::with_hook(disable_linger)
    }
}

impl TcpConnector {
    pub fn with_hook(hook: SocketHook) -> Self {
        Self { hook }
    }

    fn open_socket(&self, mode: NetworkMode, target: SocketAddr) -> io::Result<TcpSocket> {
        let domain = match mode {
            NetworkMode::Tcp4 => Domain::IPV4,
            NetworkMode::Tcp6 => Domain::IPV6,
            NetworkMode::Tcp => Domain::for_address(target),
        };

        let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))?;

        // Tuning failures are reported but never stop the probe.
        if let Err(e) = (self.hook)(&socket) {
            tracing::warn!("Failed to tune probe socket for {}: {}", target, e);
        }

        socket.set_nonblocking(true)?;
        Ok(TcpSocket::from_std_stream(StdTcpStream::from(socket)))
    }
}

impl Connector for TcpConnector {
    async fn connect(&self, mode: NetworkMode, target: SocketAddr) -> io::Result<()> {
        let socket = self.open_socket(mode, target)?;
        let stream = socket.connect(target).await?;
        drop(stream);
        Ok(())
    }
}

/// Turn lingering off so closing resets the connection instead of leaving
/// it in TIME_WAIT.
pub fn disable_linger(socket: &Socket) -> io::Result<()> {
    socket.set_linger(Some(Duration::ZERO))
}

/// Outcome of one probe attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeOutcome {
    /// Dial time, never above the timeout.
    pub latency: Duration,
    pub error: Option<ProbeError>,
}

impl ProbeOutcome {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    pub fn latency_ms(&self) -> f64 {
        as_millis(self.latency)
    }
}

/// Run one connect probe bounded by `timeout` and by `cancel`.
pub async fn execute_probe<C: Connector>(
    connector: &C,
    mode: NetworkMode,
    target: SocketAddr,
    timeout: Duration,
    cancel: &CancellationToken,
) -> ProbeOutcome {
    let start = Instant::now();

    let result = tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ProbeError::Cancelled),
        r = tokio::time::timeout(timeout, connector.connect(mode, target)) => match r {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(ProbeError::Network(e.to_string())),
            Err(_) => Err(ProbeError::Timeout(timeout)),
        },
    };

    let elapsed = start.elapsed();

    ProbeOutcome {
        latency: clamp_latency(elapsed, timeout, result.as_ref().err()),
        error: result.err(),
    }
}

/// Keep recorded latencies inside `[0, timeout]`.
pub fn clamp_latency(elapsed: Duration, timeout: Duration, error: Option<&ProbeError>) -> Duration {
    if matches!(error, Some(ProbeError::Timeout(_))) || elapsed >= timeout {
        timeout
    } else {
        elapsed
    }
}

/// Duration as fractional milliseconds.
pub fn as_millis(d: Duration) -> f64 {
    d.as_nanos() as f64 / 1_000_000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};
    use tokio::net::TcpListener;

    /// Connector that never completes.
    struct Blackhole;

    impl Connector for Blackhole {
        async fn connect(&self, _mode: NetworkMode, _target: SocketAddr) -> io::Result<()> {
            std::future::pending::<()>().await;
            Ok(())
        }
    }

    fn target(port: u16) -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port)
    }

    #[test]
    fn test_clamp_latency() {
        let timeout = Duration::from_millis(100);
        let timed_out = ProbeError::Timeout(timeout);
        assert_eq!(
            clamp_latency(Duration::from_millis(103), timeout, Some(&timed_out)),
            timeout
        );
        assert_eq!(clamp_latency(Duration::from_millis(40), timeout, Some(&timed_out)), timeout);
        assert_eq!(clamp_latency(Duration::from_millis(100), timeout, None), timeout);
        assert_eq!(
            clamp_latency(Duration::from_millis(40), timeout, None),
            Duration::from_millis(40)
        );
    }

    #[test]
    fn test_as_millis() {
        assert_eq!(as_millis(Duration::from_micros(1500)), 1.5);
        assert_eq!(as_millis(Duration::ZERO), 0.0);
    }

    #[test]
    fn test_disable_linger() {
        let socket = Socket::new(Domain::IPV4, Type::STREAM, Some(Protocol::TCP)).unwrap();
        disable_linger(&socket).unwrap();
        assert_eq!(socket.linger().unwrap(), Some(Duration::ZERO));
    }

    #[tokio::test]
    async fn test_probe_success() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            loop {
                if listener.accept().await.is_err() {
                    break;
                }
            }
        });

        let timeout = Duration::from_secs(2);
        let outcome = execute_probe(
            &TcpConnector::default(),
            NetworkMode::Tcp4,
            addr,
            timeout,
            &CancellationToken::new(),
        )
        .await;
        assert!(outcome.is_success(), "{:?}", outcome.error);
        assert!(outcome.latency < timeout);
    }

    #[tokio::test]
    async fn test_probe_refused() {
        // Grab a free port, then release it so nothing listens there.
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };

        let timeout = Duration::from_secs(2);
        let outcome = execute_probe(
            &TcpConnector::default(),
            NetworkMode::Tcp,
            target(port),
            timeout,
            &CancellationToken::new(),
        )
        .await;
        assert!(matches!(outcome.error, Some(ProbeError::Network(_))));
        assert!(outcome.latency <= timeout);
    }

    #[tokio::test]
    async fn test_probe_family_mismatch_fails() {
        let timeout = Duration::from_secs(1);
        let outcome = execute_probe(
            &TcpConnector::default(),
            NetworkMode::Tcp6,
            target(9),
            timeout,
            &CancellationToken::new(),
        )
        .await;
        assert!(!outcome.is_success());
    }

    #[tokio::test]
    async fn test_probe_timeout_clamps_latency() {
        let timeout = Duration::from_millis(100);
        let outcome = execute_probe(
            &Blackhole,
            NetworkMode::Tcp4,
            "203.0.113.5:9".parse().unwrap(),
            timeout,
            &CancellationToken::new(),
        )
        .await;
        assert_eq!(outcome.error, Some(ProbeError::Timeout(timeout)));
        assert_eq!(outcome.latency, timeout);
        assert_eq!(outcome.latency_ms(), 100.0);
    }

    #[tokio::test]
    async fn test_probe_cancelled() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let timeout = Duration::from_secs(5);
        let outcome =
            execute_probe(&Blackhole, NetworkMode::Tcp4, target(9), timeout, &cancel).await;
        assert_eq!(outcome.error, Some(ProbeError::Cancelled));
        assert!(outcome.latency < timeout);
    }

    #[test]
    fn test_tuning_failure_does_not_abort() {
        fn failing(_: &Socket) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::Other, "nope"))
        }
        let connector = TcpConnector::with_hook(failing);
        tokio_test::block_on(async {
            tokio_test::assert_ok!(connector.open_socket(NetworkMode::Tcp4, target(9)));
        });
    }
}

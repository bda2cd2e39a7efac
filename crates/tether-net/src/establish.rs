//! Turning "listen on a port" or "dial host:port" into a connected
//! [`Transport`] plus the peer's [`Identity`].
//!
//! The handshake is one line each way. The dialing side speaks first; the
//! accepting side reads, then answers.

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use tokio::net::TcpStream;
use tracing::{debug, info, warn};

use tether_shared::constants::{
    DEFAULT_CONNECT_ATTEMPTS, DEFAULT_HANDSHAKE_TIMEOUT, DEFAULT_RETRY_DELAY,
};
use tether_shared::Identity;

use crate::error::{EstablishError, TransportError};
use crate::transport::{Transport, TransportListener};

/// Fixed-delay dial policy. No backoff, no jitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
    /// Upper bound on a single connect attempt.
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_CONNECT_ATTEMPTS,
            delay: DEFAULT_RETRY_DELAY,
            attempt_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Establisher {
    pub handshake_timeout: Duration,
}

impl Default for Establisher {
    fn default() -> Self {
        Self {
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
        }
    }
}

impl Establisher {
    pub fn new(handshake_timeout: Duration) -> Self {
        Self { handshake_timeout }
    }

    /// Listen on `0.0.0.0:port`, accept one peer and run the responder side of
    /// the handshake.
    pub async fn accept_peer(
        &self,
        local: &Identity,
        port: u16,
        accept_timeout: Duration,
    ) -> Result<(Transport, Identity), EstablishError> {
        let addr: SocketAddr = (Ipv4Addr::UNSPECIFIED, port).into();
        let listener = TransportListener::bind(addr)
            .await
            .map_err(|e| match e {
                TransportError::Bind { source, .. } => EstablishError::Bind { port, source },
                other => EstablishError::Transport(other),
            })?;

        self.accept_peer_with(listener, local, accept_timeout).await
    }

    /// Same as [`accept_peer`](Self::accept_peer) on a listener the caller
    /// already bound.
    pub async fn accept_peer_with(
        &self,
        listener: TransportListener,
        local: &Identity,
        accept_timeout: Duration,
    ) -> Result<(Transport, Identity), EstablishError> {
        check_local_name(local)?;

        let transport = listener.accept(accept_timeout).await.map_err(|e| match e {
            TransportError::AcceptTimeout(d) => EstablishError::Timeout(d),
            other => EstablishError::Transport(other),
        })?;

        let peer_name = match self.respond(&transport, local).await {
            Ok(name) => name,
            Err(e) => {
                transport.close().await;
                return Err(e);
            }
        };

        let remote = transport.peer_addr();
        let peer = Identity::new(peer_name, remote.ip().to_string(), remote.port());

        info!(peer = %peer, "Peer connected");
        Ok((transport, peer))
    }

    /// Dial `host:port` under `policy`, then run the initiator side of the
    /// handshake.
    pub async fn connect_to_peer(
        &self,
        local: &Identity,
        host: &str,
        port: u16,
        policy: &RetryPolicy,
    ) -> Result<(Transport, Identity), EstablishError> {
        check_local_name(local)?;

        let stream = dial_with_retry(host, port, policy).await?;
        let transport = Transport::from_stream(stream)?;

        let peer_name = match self.initiate(&transport, local).await {
            Ok(name) => name,
            Err(e) => {
                transport.close().await;
                return Err(e);
            }
        };

        let peer = Identity::new(peer_name, host, port);

        info!(peer = %peer, "Connected to peer");
        Ok((transport, peer))
    }

    async fn respond(&self, transport: &Transport, local: &Identity) -> Result<String, EstablishError> {
        let peer_name = self.read_name(transport).await?;
        transport.send_line(local.name()).await?;
        Ok(peer_name)
    }

    async fn initiate(&self, transport: &Transport, local: &Identity) -> Result<String, EstablishError> {
        transport.send_line(local.name()).await?;
        self.read_name(transport).await
    }

    async fn read_name(&self, transport: &Transport) -> Result<String, EstablishError> {
        let line = tokio::time::timeout(self.handshake_timeout, transport.receive_line())
            .await
            .map_err(|_| {
                EstablishError::Handshake(format!(
                    "peer did not send a name within {:?}",
                    self.handshake_timeout
                ))
            })??;

        match line {
            None => Err(EstablishError::Handshake(
                "connection closed before the peer sent a name".to_string(),
            )),
            Some(name) if name.trim().is_empty() => {
                Err(EstablishError::Handshake("peer sent an empty name".to_string()))
            }
            Some(name) => Ok(name),
        }
    }
}

fn check_local_name(local: &Identity) -> Result<(), EstablishError> {
    if local.name().trim().is_empty() {
        return Err(EstablishError::Handshake(
            "local display name is empty".to_string(),
        ));
    }
    Ok(())
}

async fn dial_with_retry(
    host: &str,
    port: u16,
    policy: &RetryPolicy,
) -> Result<TcpStream, EstablishError> {
    let addr = format!("{host}:{port}");
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        debug!(addr = %addr, attempt, max_attempts, "Dialing peer");

        let err = match tokio::time::timeout(policy.attempt_timeout, TcpStream::connect((host, port))).await {
            Ok(Ok(stream)) => return Ok(stream),
            Ok(Err(e)) => e,
            Err(_) => std::io::Error::new(std::io::ErrorKind::TimedOut, "connect attempt timed out"),
        };

        if attempt >= max_attempts {
            warn!(addr = %addr, attempts = attempt, error = %err, "Giving up on peer");
            return Err(EstablishError::ConnectFailed {
                addr,
                attempts: attempt,
                source: err,
            });
        }

        warn!(addr = %addr, attempt, error = %err, retry_in = ?policy.delay, "Connect failed, retrying");
        tokio::time::sleep(policy.delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn quick_policy(max_attempts: u32, delay_ms: u64) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            delay: Duration::from_millis(delay_ms),
            attempt_timeout: Duration::from_secs(2),
        }
    }

    async fn bound_listener() -> (TransportListener, u16) {
        let listener = TransportListener::bind((Ipv4Addr::LOCALHOST, 0).into())
            .await
            .unwrap();
        let port = listener.local_addr().port();
        (listener, port)
    }

    /// A port that nothing listens on, at least for the moment.
    fn closed_port() -> u16 {
        let l = std::net::TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
        l.local_addr().unwrap().port()
    }

    #[tokio::test]
    async fn test_handshake_symmetry() {
        let (listener, port) = bound_listener().await;
        let alice = Identity::new("Alice", "127.0.0.1", port);
        let bob = Identity::new("Bob", "127.0.0.1", 0);
        let establisher = Establisher::default();

        let responder = tokio::spawn(async move {
            establisher
                .accept_peer_with(listener, &alice, Duration::from_secs(5))
                .await
        });
        let (_t_bob, seen_by_bob) = establisher
            .connect_to_peer(&bob, "127.0.0.1", port, &quick_policy(1, 0))
            .await
            .unwrap();
        let (_t_alice, seen_by_alice) = responder.await.unwrap().unwrap();

        assert_eq!(seen_by_bob.name(), "Alice");
        assert_eq!(seen_by_bob.port, port);
        assert_eq!(seen_by_alice.name(), "Bob");
        assert_eq!(seen_by_alice.address, "127.0.0.1");
    }

    #[tokio::test]
    async fn test_names_are_taken_verbatim() {
        let (listener, port) = bound_listener().await;
        let alice = Identity::new("  Alice  ", "127.0.0.1", port);
        let bob = Identity::new("Bob", "127.0.0.1", 0);
        let establisher = Establisher::default();

        let responder = tokio::spawn(async move {
            establisher
                .accept_peer_with(listener, &alice, Duration::from_secs(5))
                .await
        });
        let (_t, seen) = establisher
            .connect_to_peer(&bob, "127.0.0.1", port, &quick_policy(1, 0))
            .await
            .unwrap();
        responder.await.unwrap().unwrap();

        assert_eq!(seen.name(), "  Alice  ");
    }

    #[tokio::test]
    async fn test_empty_local_name_rejected_before_dialing() {
        let bob = Identity::new("   ", "127.0.0.1", 0);
        let err = Establisher::default()
            .connect_to_peer(&bob, "127.0.0.1", closed_port(), &quick_policy(3, 1000))
            .await
            .unwrap_err();
        assert!(matches!(err, EstablishError::Handshake(_)));
    }

    #[tokio::test]
    async fn test_peer_hangs_up_during_handshake() {
        let (listener, port) = bound_listener().await;
        let alice = Identity::new("Alice", "127.0.0.1", port);

        let responder = tokio::spawn(async move {
            Establisher::default()
                .accept_peer_with(listener, &alice, Duration::from_secs(5))
                .await
        });

        let raw = Transport::dial("127.0.0.1", port).await.unwrap();
        raw.close().await;

        let err = responder.await.unwrap().unwrap_err();
        assert!(matches!(err, EstablishError::Handshake(_)));
    }

    #[tokio::test]
    async fn test_empty_peer_name_rejected() {
        let (listener, port) = bound_listener().await;
        let bob = Identity::new("Bob", "127.0.0.1", 0);

        let fake_responder = tokio::spawn(async move {
            let t = listener.accept(Duration::from_secs(5)).await.unwrap();
            let _ = t.receive_line().await.unwrap();
            t.send_line("").await.unwrap();
            t
        });

        let err = Establisher::default()
            .connect_to_peer(&bob, "127.0.0.1", port, &quick_policy(1, 0))
            .await
            .unwrap_err();
        assert!(matches!(err, EstablishError::Handshake(_)));
        drop(fake_responder.await.unwrap());
    }

    #[tokio::test]
    async fn test_silent_peer_times_out() {
        let (listener, port) = bound_listener().await;
        let bob = Identity::new("Bob", "127.0.0.1", 0);

        let silent = tokio::spawn(async move {
            let t = listener.accept(Duration::from_secs(5)).await.unwrap();
            tokio::time::sleep(Duration::from_secs(2)).await;
            t
        });

        let start = Instant::now();
        let err = Establisher::new(Duration::from_millis(200))
            .connect_to_peer(&bob, "127.0.0.1", port, &quick_policy(1, 0))
            .await
            .unwrap_err();
        assert!(matches!(err, EstablishError::Handshake(_)));
        assert!(start.elapsed() < Duration::from_secs(2));
        silent.abort();
    }

    #[tokio::test]
    async fn test_accept_timeout() {
        let (listener, _port) = bound_listener().await;
        let alice = Identity::new("Alice", "127.0.0.1", 0);

        let err = Establisher::default()
            .accept_peer_with(listener, &alice, Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(matches!(err, EstablishError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_accept_peer_bind_conflict() {
        let held = std::net::TcpListener::bind((Ipv4Addr::UNSPECIFIED, 0)).unwrap();
        let port = held.local_addr().unwrap().port();
        let alice = Identity::new("Alice", "127.0.0.1", port);

        let err = Establisher::default()
            .accept_peer(&alice, port, Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(matches!(err, EstablishError::Bind { .. }));
    }

    #[tokio::test]
    async fn test_retry_gives_up_after_max_attempts() {
        let bob = Identity::new("Bob", "127.0.0.1", 0);
        let start = Instant::now();

        let err = Establisher::default()
            .connect_to_peer(&bob, "127.0.0.1", closed_port(), &quick_policy(3, 100))
            .await
            .unwrap_err();

        match err {
            EstablishError::ConnectFailed { attempts, .. } => assert_eq!(attempts, 3),
            other => panic!("unexpected error: {other:?}"),
        }
        // Two pauses between three attempts
        assert!(start.elapsed() >= Duration::from_millis(200));
    }

    #[tokio::test]
    async fn test_retry_succeeds_once_listener_appears() {
        let port = closed_port();
        let alice = Identity::new("Alice", "127.0.0.1", port);
        let bob = Identity::new("Bob", "127.0.0.1", 0);

        // Attempts land at roughly 0 ms, 400 ms and 800 ms; the listener shows
        // up in between the second and third.
        let responder = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(600)).await;
            let listener = TransportListener::bind((Ipv4Addr::LOCALHOST, port).into())
                .await
                .unwrap();
            Establisher::default()
                .accept_peer_with(listener, &alice, Duration::from_secs(5))
                .await
        });

        let (_t, peer) = Establisher::default()
            .connect_to_peer(&bob, "127.0.0.1", port, &quick_policy(3, 400))
            .await
            .unwrap();
        assert_eq!(peer.name(), "Alice");
        responder.await.unwrap().unwrap();
    }
}

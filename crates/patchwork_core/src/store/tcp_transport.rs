//! TCP transport backed by a tokio runtime.
//!
//! Frames travel as `[len: u32 BE][frame]`. A background task owns the socket
//! and reconnects after `reconnect_delay` whenever the connection drops, so a
//! peer that goes away only pauses replication. The store side talks to the
//! task through unbounded channels and never waits on the network.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::runtime::Runtime;
use tokio::sync::mpsc;

use super::transport::Transport;
use crate::error::{PatchworkError, Result};

/// Largest frame accepted from a peer.
const MAX_FRAME_LEN: usize = 64 * 1024 * 1024;

/// Which side of the connection this replica plays.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TcpEndpoint {
    /// Connect out to `host:port`.
    Dial(String),
    /// Accept one peer at a time on `host:port`.
    Listen(String),
}

/// Transport over a single TCP connection with automatic reconnect.
pub struct TcpTransport {
    endpoint: TcpEndpoint,
    reconnect_delay: Duration,
    runtime: Option<Runtime>,
    connected: Arc<AtomicBool>,
    outgoing: Option<mpsc::UnboundedSender<Vec<u8>>>,
    incoming: Mutex<Option<mpsc::UnboundedReceiver<Vec<u8>>>>,
}

enum ConnectionEnd {
    /// The transport was disconnected locally.
    Shutdown,
    /// The peer went away or the socket failed.
    Lost(String),
}

impl TcpTransport {
    /// Create a transport that dials `addr` once connected.
    pub fn dial(addr: impl Into<String>, reconnect_delay: Duration) -> Self {
        Self::new(TcpEndpoint::Dial(addr.into()), reconnect_delay)
    }

    /// Create a transport that waits for a peer on `addr`.
    pub fn listen(addr: impl Into<String>, reconnect_delay: Duration) -> Self {
        Self::new(TcpEndpoint::Listen(addr.into()), reconnect_delay)
    }

    fn new(endpoint: TcpEndpoint, reconnect_delay: Duration) -> Self {
        Self {
            endpoint,
            reconnect_delay,
            runtime: None,
            connected: Arc::new(AtomicBool::new(false)),
            outgoing: None,
            incoming: Mutex::new(None),
        }
    }

    /// The configured endpoint.
    pub fn endpoint(&self) -> &TcpEndpoint {
        &self.endpoint
    }

    /// Background task: establish a connection, pump it, retry.
    async fn connection_task(
        endpoint: TcpEndpoint,
        reconnect_delay: Duration,
        connected: Arc<AtomicBool>,
        mut outgoing: mpsc::UnboundedReceiver<Vec<u8>>,
        incoming: mpsc::UnboundedSender<Vec<u8>>,
    ) {
        let listener = match &endpoint {
            TcpEndpoint::Listen(addr) => match TcpListener::bind(addr.as_str()).await {
                Ok(listener) => {
                    log::info!("[tcp] Listening on {}", addr);
                    Some(listener)
                }
                Err(e) => {
                    log::error!("[tcp] Cannot listen on {}: {}", addr, e);
                    return;
                }
            },
            TcpEndpoint::Dial(_) => None,
        };

        loop {
            let stream = match (&endpoint, &listener) {
                (_, Some(listener)) => listener.accept().await.map(|(stream, peer)| {
                    log::info!("[tcp] Accepted peer {}", peer);
                    stream
                }),
                (TcpEndpoint::Dial(addr), None) => TcpStream::connect(addr.as_str()).await,
                (TcpEndpoint::Listen(_), None) => return,
            };

            match stream {
                Ok(stream) => {
                    let _ = stream.set_nodelay(true);
                    connected.store(true, Ordering::SeqCst);
                    let end = Self::pump(stream, &mut outgoing, &incoming).await;
                    connected.store(false, Ordering::SeqCst);
                    match end {
                        ConnectionEnd::Shutdown => {
                            log::info!("[tcp] Connection closed");
                            return;
                        }
                        ConnectionEnd::Lost(reason) => {
                            log::warn!("[tcp] Connection lost: {}", reason);
                        }
                    }
                }
                Err(e) => log::debug!("[tcp] Connect failed: {}", e),
            }

            // Frames queued while offline belong to a stale sync session
            loop {
                match outgoing.try_recv() {
                    Ok(_) => continue,
                    Err(mpsc::error::TryRecvError::Empty) => break,
                    Err(mpsc::error::TryRecvError::Disconnected) => return,
                }
            }
            tokio::time::sleep(reconnect_delay).await;
        }
    }

    async fn pump(
        stream: TcpStream,
        outgoing: &mut mpsc::UnboundedReceiver<Vec<u8>>,
        incoming: &mpsc::UnboundedSender<Vec<u8>>,
    ) -> ConnectionEnd {
        let (reader, mut writer) = stream.into_split();
        let incoming = incoming.clone();
        let mut read_task = tokio::spawn(Self::read_frames(reader, incoming));

        loop {
            tokio::select! {
                frame = outgoing.recv() => match frame {
                    Some(frame) => {
                        if let Err(e) = Self::write_frame(&mut writer, &frame).await {
                            read_task.abort();
                            return ConnectionEnd::Lost(e.to_string());
                        }
                    }
                    None => {
                        read_task.abort();
                        let _ = writer.shutdown().await;
                        return ConnectionEnd::Shutdown;
                    }
                },
                result = &mut read_task => {
                    return match result {
                        Ok(reason) => ConnectionEnd::Lost(reason),
                        Err(e) => ConnectionEnd::Lost(e.to_string()),
                    };
                }
            }
        }
    }

    async fn read_frames(
        mut reader: OwnedReadHalf,
        incoming: mpsc::UnboundedSender<Vec<u8>>,
    ) -> String {
        loop {
            let len = match reader.read_u32().await {
                Ok(len) => len as usize,
                Err(e) => return e.to_string(),
            };
            if len > MAX_FRAME_LEN {
                return format!("frame of {} bytes exceeds limit", len);
            }
            let mut frame = vec![0; len];
            if let Err(e) = reader.read_exact(&mut frame).await {
                return e.to_string();
            }
            if incoming.send(frame).is_err() {
                return "receiver dropped".to_string();
            }
        }
    }

    async fn write_frame(writer: &mut OwnedWriteHalf, frame: &[u8]) -> std::io::Result<()> {
        let len = u32::try_from(frame.len())
            .map_err(|_| std::io::Error::new(std::io::ErrorKind::InvalidInput, "frame too large"))?;
        writer.write_u32(len).await?;
        writer.write_all(frame).await?;
        writer.flush().await
    }
}

impl Transport for TcpTransport {
    fn connect(&mut self) -> Result<()> {
        if self.runtime.is_some() {
            return Ok(());
        }

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("patchwork-tcp")
            .enable_all()
            .build()
            .map_err(|e| PatchworkError::Transport(format!("Failed to create runtime: {}", e)))?;

        let (tx_send, rx_send) = mpsc::unbounded_channel();
        let (tx_recv, rx_recv) = mpsc::unbounded_channel();

        runtime.spawn(Self::connection_task(
            self.endpoint.clone(),
            self.reconnect_delay,
            Arc::clone(&self.connected),
            rx_send,
            tx_recv,
        ));

        self.outgoing = Some(tx_send);
        *self.incoming.lock().unwrap_or_else(PoisonError::into_inner) = Some(rx_recv);
        self.runtime = Some(runtime);
        Ok(())
    }

    fn disconnect(&mut self) -> Result<()> {
        // Dropping the sender tells the connection task to close the socket
        self.outgoing = None;
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
        self.connected.store(false, Ordering::SeqCst);
        *self.incoming.lock().unwrap_or_else(PoisonError::into_inner) = None;
        Ok(())
    }

    fn send(&self, frame: Vec<u8>) -> Result<()> {
        if !self.is_connected() {
            return Err(PatchworkError::Transport("Not connected".to_string()));
        }
        match &self.outgoing {
            Some(tx) => tx
                .send(frame)
                .map_err(|_| PatchworkError::Transport("Send channel closed".to_string())),
            None => Err(PatchworkError::Transport("Not connected".to_string())),
        }
    }

    fn receive(&self, max: usize) -> Result<Vec<Vec<u8>>> {
        let mut frames = Vec::new();
        let mut guard = self.incoming.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(rx) = guard.as_mut() {
            while frames.len() < max {
                match rx.try_recv() {
                    Ok(frame) => frames.push(frame),
                    Err(_) => break,
                }
            }
        }
        Ok(frames)
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

impl Drop for TcpTransport {
    fn drop(&mut self) {
        let _ = self.disconnect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::time::Instant;

    fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        false
    }

    #[test]
    fn test_frames_round_trip_with_std_peer() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let peer = std::thread::spawn(move || {
            let (mut socket, _) = listener.accept().unwrap();
            socket.write_all(&3u32.to_be_bytes()).unwrap();
            socket.write_all(b"abc").unwrap();

            let mut len = [0u8; 4];
            socket.read_exact(&mut len).unwrap();
            let mut frame = vec![0; u32::from_be_bytes(len) as usize];
            socket.read_exact(&mut frame).unwrap();
            frame
        });

        let mut transport = TcpTransport::dial(addr, Duration::from_millis(50));
        transport.connect().unwrap();
        assert!(wait_for(|| transport.is_connected()));

        let mut received = Vec::new();
        assert!(wait_for(|| {
            received.extend(transport.receive(10).unwrap());
            !received.is_empty()
        }));
        assert_eq!(received, vec![b"abc".to_vec()]);

        transport.send(b"xyz".to_vec()).unwrap();
        assert_eq!(peer.join().unwrap(), b"xyz".to_vec());

        transport.disconnect().unwrap();
        assert!(!transport.is_connected());
    }

    #[test]
    fn test_unreachable_peer_is_not_an_error() {
        // Port 9 (discard) is closed on test machines
        let mut transport = TcpTransport::dial("127.0.0.1:9", Duration::from_millis(20));
        transport.connect().unwrap();
        std::thread::sleep(Duration::from_millis(50));
        assert!(!transport.is_connected());
        assert!(transport.send(vec![1]).is_err());
        assert!(transport.receive(10).unwrap().is_empty());
    }
}

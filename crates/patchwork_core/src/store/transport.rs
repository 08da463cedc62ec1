//! Transport abstraction for replication.
//!
//! A [`Transport`] moves opaque frames (see [`super::frame`]) between this
//! replica and one peer, typically a relay server. The store never blocks on
//! it: `receive` must return whatever has already arrived.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

use crate::error::{PatchworkError, Result};

/// Platform-specific connection to a sync peer.
///
/// Implementations may run network I/O on background threads, but every
/// method here must return promptly.
pub trait Transport: Send {
    /// Begin connecting. May return before the connection is established;
    /// use [`Transport::is_connected`] to observe it.
    fn connect(&mut self) -> Result<()>;

    /// Close the connection and stop reconnecting.
    fn disconnect(&mut self) -> Result<()>;

    /// Queue a frame for delivery to the peer.
    fn send(&self, frame: Vec<u8>) -> Result<()>;

    /// Take at most `max` frames that have arrived since the last call.
    fn receive(&self, max: usize) -> Result<Vec<Vec<u8>>>;

    /// Whether frames can currently flow in both directions.
    fn is_connected(&self) -> bool;
}

// ==================== In-process transport ====================

#[derive(Debug, Default)]
struct Link {
    /// `queues[i]` holds frames waiting for endpoint `i`
    queues: [VecDeque<Vec<u8>>; 2],
    partitioned: bool,
}

/// One end of an in-process link between two stores.
///
/// Used by tests and for replicas that live in the same process. The link can
/// be partitioned to simulate the network going away; frames in flight at
/// that moment are lost.
#[derive(Debug)]
pub struct MemoryTransport {
    link: Arc<Mutex<Link>>,
    side: usize,
    connected: bool,
}

impl MemoryTransport {
    /// Create two connected endpoints.
    pub fn pair() -> (Self, Self) {
        let link = Arc::new(Mutex::new(Link::default()));
        (
            Self {
                link: Arc::clone(&link),
                side: 0,
                connected: false,
            },
            Self {
                link,
                side: 1,
                connected: false,
            },
        )
    }

    /// Cut the link in both directions and drop frames in flight.
    pub fn partition(&self) {
        self.control().partition();
    }

    /// Restore a partitioned link.
    pub fn heal(&self) {
        self.control().heal();
    }

    /// A handle that can partition the link after this endpoint has been
    /// handed to a store.
    pub fn control(&self) -> LinkControl {
        LinkControl {
            link: Arc::clone(&self.link),
        }
    }

    /// Frames waiting to be received by this endpoint.
    pub fn pending(&self) -> usize {
        self.lock().queues[self.side].len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Link> {
        self.link.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Partitions and heals a [`MemoryTransport`] link.
#[derive(Debug, Clone)]
pub struct LinkControl {
    link: Arc<Mutex<Link>>,
}

impl LinkControl {
    /// Cut the link in both directions and drop frames in flight.
    pub fn partition(&self) {
        let mut link = self.link.lock().unwrap_or_else(PoisonError::into_inner);
        link.partitioned = true;
        link.queues.iter_mut().for_each(VecDeque::clear);
    }

    /// Restore a partitioned link.
    pub fn heal(&self) {
        self.link
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .partitioned = false;
    }

    /// Whether the link is currently cut.
    pub fn is_partitioned(&self) -> bool {
        self.link
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .partitioned
    }
}

impl Transport for MemoryTransport {
    fn connect(&mut self) -> Result<()> {
        self.connected = true;
        Ok(())
    }

    fn disconnect(&mut self) -> Result<()> {
        self.connected = false;
        Ok(())
    }

    fn send(&self, frame: Vec<u8>) -> Result<()> {
        if !self.is_connected() {
            return Err(PatchworkError::Transport("Not connected".to_string()));
        }
        self.lock().queues[1 - self.side].push_back(frame);
        Ok(())
    }

    fn receive(&self, max: usize) -> Result<Vec<Vec<u8>>> {
        if !self.is_connected() {
            return Ok(Vec::new());
        }
        let mut link = self.lock();
        let queue = &mut link.queues[self.side];
        let take = max.min(queue.len());
        Ok(queue.drain(..take).collect())
    }

    fn is_connected(&self) -> bool {
        self.connected && !self.lock().partitioned
    }
}

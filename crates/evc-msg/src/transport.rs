//! ---
//! evc_section: "02-messaging-ipc-data-model"
//! evc_subsection: "module"
//! evc_type: "source"
//! evc_scope: "code"
//! evc_description: "Bus framing, identifier table and transport adapters."
//! evc_version: "v0.0.0-prealpha"
//! evc_owner: "tbd"
//! ---
use std::collections::VecDeque;
use std::io::ErrorKind;
use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use evc_common::config::{TransportConfig, TransportKind, UdpConfig};
use parking_lot::Mutex;
use tracing::{debug, info, trace, warn};

use crate::frame::{FrameError, WireMessage, MAX_DATAGRAM};

/// Default depth of each in-memory queue before the oldest frame is dropped.
pub const DEFAULT_QUEUE_DEPTH: usize = 64;

const UDP_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Failures reported by a transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Underlying socket or driver error.
    #[error("transport io error: {0}")]
    Io(#[from] std::io::Error),
    /// The bus refused the frame.
    #[error("transport rejected frame {id}: {reason}")]
    Rejected {
        /// Identifier of the refused frame, as shown on the bus.
        id: String,
        /// Driver-provided reason.
        reason: String,
    },
    /// A frame could not be encoded for this transport.
    #[error(transparent)]
    Frame(#[from] FrameError),
}

/// Frame transport capability consumed by the codec and the node.
///
/// Receive is polled: `receive_available` reports a pending frame and
/// `receive_next` hands it over. Any receive notification running in
/// another context only deposits raw frames (see [`RxMailbox`]).
pub trait Transport: Send + Sync {
    /// Transmit one frame.
    fn send(&self, message: &WireMessage) -> Result<(), TransportError>;
    /// Whether a received frame is waiting.
    fn receive_available(&self) -> bool;
    /// Take the next received frame, if any.
    fn receive_next(&self) -> Option<WireMessage>;
    /// Human-readable transport name for logging/metrics.
    fn name(&self) -> &'static str;
    /// Running total of received frames lost before they were taken.
    fn overruns(&self) -> u64 {
        0
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn send(&self, message: &WireMessage) -> Result<(), TransportError> {
        (**self).send(message)
    }

    fn receive_available(&self) -> bool {
        (**self).receive_available()
    }

    fn receive_next(&self) -> Option<WireMessage> {
        (**self).receive_next()
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn overruns(&self) -> u64 {
        (**self).overruns()
    }
}

/// Single-slot receive buffer shared with a notification context.
///
/// The notification side only copies the raw frame in and raises the
/// pending flag. A frame deposited before the previous one was taken
/// replaces it and is counted as an overrun.
#[derive(Debug, Default)]
pub struct RxMailbox {
    slot: Mutex<Option<WireMessage>>,
    pending: AtomicBool,
    overruns: AtomicU64,
}

impl RxMailbox {
    /// Empty mailbox.
    pub fn new() -> Self {
        Self::default()
    }

    /// Notification path: store the frame and flag it.
    pub fn deposit(&self, message: WireMessage) {
        let mut slot = self.slot.lock();
        if slot.replace(message).is_some() {
            self.overruns.fetch_add(1, Ordering::Relaxed);
        }
        self.pending.store(true, Ordering::Release);
    }

    /// Whether a frame is waiting.
    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }

    /// Control path: take the waiting frame and clear the flag.
    pub fn take(&self) -> Option<WireMessage> {
        let mut slot = self.slot.lock();
        self.pending.store(false, Ordering::Release);
        slot.take()
    }

    /// Frames lost because the slot was still occupied.
    pub fn overruns(&self) -> u64 {
        self.overruns.load(Ordering::Relaxed)
    }
}

#[derive(Debug)]
struct Queue {
    frames: Mutex<VecDeque<WireMessage>>,
    depth: usize,
}

impl Queue {
    fn new(depth: usize) -> Self {
        Self {
            frames: Mutex::new(VecDeque::with_capacity(depth)),
            depth,
        }
    }

    fn push(&self, message: WireMessage) {
        let mut frames = self.frames.lock();
        if frames.len() >= self.depth {
            frames.pop_front();
            trace!("in-memory queue full; dropped oldest frame");
        }
        frames.push_back(message);
    }
}

/// In-memory transport endpoint; see [`InMemoryTransport::pair`].
///
/// Frames sent on one endpoint are received on its peer endpoint. Each
/// direction is a bounded queue that drops its oldest frame when full.
#[derive(Debug, Clone)]
pub struct InMemoryTransport {
    outbox: Arc<Queue>,
    inbox: Arc<Queue>,
}

impl InMemoryTransport {
    /// Two connected endpoints with the default queue depth.
    pub fn pair() -> (Self, Self) {
        Self::pair_with_depth(DEFAULT_QUEUE_DEPTH)
    }

    /// Two connected endpoints holding at most `depth` frames per direction.
    pub fn pair_with_depth(depth: usize) -> (Self, Self) {
        let depth = depth.max(1);
        let a_to_b = Arc::new(Queue::new(depth));
        let b_to_a = Arc::new(Queue::new(depth));
        (
            Self {
                outbox: a_to_b.clone(),
                inbox: b_to_a.clone(),
            },
            Self {
                outbox: b_to_a,
                inbox: a_to_b,
            },
        )
    }

    /// Take every frame currently waiting on this endpoint.
    pub fn drain(&self) -> Vec<WireMessage> {
        self.inbox.frames.lock().drain(..).collect()
    }
}

impl Transport for InMemoryTransport {
    fn send(&self, message: &WireMessage) -> Result<(), TransportError> {
        self.outbox.push(*message);
        Ok(())
    }

    fn receive_available(&self) -> bool {
        !self.inbox.frames.lock().is_empty()
    }

    fn receive_next(&self) -> Option<WireMessage> {
        self.inbox.frames.lock().pop_front()
    }

    fn name(&self) -> &'static str {
        "in_memory"
    }
}

/// Frames tunnelled over UDP, one datagram per frame.
///
/// A background thread receives datagrams and deposits them into an
/// [`RxMailbox`]; nothing else runs off the control thread.
#[derive(Debug)]
pub struct UdpTransport {
    socket: UdpSocket,
    peer: SocketAddr,
    mailbox: Arc<RxMailbox>,
    shutdown: Arc<AtomicBool>,
    receiver: Option<JoinHandle<()>>,
}

impl UdpTransport {
    /// Bind the local socket and start the receive thread.
    pub fn bind(config: &UdpConfig) -> Result<Self, TransportError> {
        let socket = UdpSocket::bind(config.bind)?;
        let rx_socket = socket.try_clone()?;
        rx_socket.set_read_timeout(Some(UDP_POLL_INTERVAL))?;
        let mailbox = Arc::new(RxMailbox::new());
        let shutdown = Arc::new(AtomicBool::new(false));

        let receiver = {
            let mailbox = mailbox.clone();
            let shutdown = shutdown.clone();
            std::thread::Builder::new()
                .name("evc-udp-rx".into())
                .spawn(move || receive_loop(rx_socket, mailbox, shutdown))?
        };

        info!(bind = %config.bind, peer = %config.peer, "udp transport bound");
        Ok(Self {
            socket,
            peer: config.peer,
            mailbox,
            shutdown,
            receiver: Some(receiver),
        })
    }

    /// Local address the socket is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        Ok(self.socket.local_addr()?)
    }

}

fn receive_loop(socket: UdpSocket, mailbox: Arc<RxMailbox>, shutdown: Arc<AtomicBool>) {
    // oversized datagrams must arrive whole so the length check sees them
    let mut buf = [0u8; MAX_DATAGRAM * 8];
    while !shutdown.load(Ordering::Acquire) {
        match socket.recv_from(&mut buf) {
            Ok((len, from)) => match WireMessage::from_datagram(&buf[..len]) {
                Ok(message) => mailbox.deposit(message),
                Err(err) => trace!(%from, error = %err, "discarding malformed datagram"),
            },
            Err(err) if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {}
            Err(err) => {
                warn!(error = %err, "udp receive failed");
                std::thread::sleep(UDP_POLL_INTERVAL);
            }
        }
    }
    debug!("udp receive thread stopped");
}

impl Transport for UdpTransport {
    fn send(&self, message: &WireMessage) -> Result<(), TransportError> {
        let datagram = message.to_datagram();
        let sent = self.socket.send_to(&datagram, self.peer)?;
        if sent != datagram.len() {
            return Err(TransportError::Rejected {
                id: message.id().to_string(),
                reason: format!("short datagram write ({} of {} bytes)", sent, datagram.len()),
            });
        }
        Ok(())
    }

    fn receive_available(&self) -> bool {
        self.mailbox.is_pending()
    }

    fn receive_next(&self) -> Option<WireMessage> {
        self.mailbox.take()
    }

    fn name(&self) -> &'static str {
        "udp"
    }

    fn overruns(&self) -> u64 {
        self.mailbox.overruns()
    }
}

impl Drop for UdpTransport {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        if let Some(handle) = self.receiver.take() {
            let _ = handle.join();
        }
    }
}

/// Transport chosen from configuration, plus the far end of a loopback.
pub struct TransportEndpoints {
    /// Endpoint handed to the control node.
    pub node: Box<dyn Transport>,
    /// Peer side of the loopback, used by the simulator. `None` for real buses.
    pub bench: Option<InMemoryTransport>,
}

impl std::fmt::Debug for TransportEndpoints {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportEndpoints")
            .field("node", &self.node.name())
            .field("bench", &self.bench.is_some())
            .finish()
    }
}

/// Instantiate the transport backend selected in configuration.
pub fn build_transport(config: &TransportConfig) -> Result<TransportEndpoints, TransportError> {
    match config.kind {
        TransportKind::Loopback => {
            let (node, bench) = InMemoryTransport::pair();
            Ok(TransportEndpoints {
                node: Box::new(node),
                bench: Some(bench),
            })
        }
        TransportKind::Udp => {
            let udp = config.udp.as_ref().ok_or_else(|| TransportError::Rejected {
                id: "-".into(),
                reason: "udp transport selected without [transport.udp] settings".into(),
            })?;
            Ok(TransportEndpoints {
                node: Box::new(UdpTransport::bind(udp)?),
                bench: None,
            })
        }
    }
}

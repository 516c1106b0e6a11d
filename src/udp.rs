//! Connected datagram session with a background receive loop.
//!
//! `connect` resolves candidates IPv6-first and walks them with a fresh
//! socket per candidate; IPv6 sockets are opened dual-stack (IPV6_V6ONLY
//! cleared) so networks that only advertise IPv4 stay reachable under the
//! IPv6-first preference. On success exactly one receiver thread is spawned;
//! `disconnect` joins it before the socket handle is invalidated, so no
//! callback fires after `disconnect` returns and no descriptor leaks.
//!
//! # Example
//!
//! ```no_run
//! use dualstack_transport::udp::UdpSession;
//!
//! let mut session = UdpSession::new();
//! session.set_callback(|data| println!("got {} bytes", data.len()));
//! session.connect("telemetry.local", 9999)?;
//! session.send(b"ping")?;
//! session.disconnect();
//! # Ok::<(), dualstack_transport::TransportError>(())
//! ```

use crate::error::TransportError;
use crate::resolve::{self, AddressFamily, Candidate};
use log::{debug, error, info, warn};
use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

/// Receive buffer per delivery: one link-layer frame.
pub const RECV_BUFFER_LEN: usize = 1500;

/// How often the receive loop wakes to check for shutdown.
const RECV_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Callback invoked once per received datagram, in arrival order, from the
/// receiver thread's context.
pub type MessageCallback = Box<dyn FnMut(&[u8]) + Send + 'static>;

/// Connected datagram session.
///
/// At most one receiver thread exists per session, and only while the
/// session is connected. The session disconnects itself on drop.
pub struct UdpSession {
    socket: Option<Arc<UdpSocket>>,
    receiver: Option<JoinHandle<()>>,
    connected: Arc<AtomicBool>,
    stop: Arc<AtomicBool>,
    callback: Arc<Mutex<Option<MessageCallback>>>,
}

impl UdpSession {
    pub fn new() -> Self {
        Self {
            socket: None,
            receiver: None,
            connected: Arc::new(AtomicBool::new(false)),
            stop: Arc::new(AtomicBool::new(false)),
            callback: Arc::new(Mutex::new(None)),
        }
    }

    /// Register the message callback. Survives reconnects; the callback must
    /// be fast, slow handlers back datagrams up into the OS socket buffer.
    pub fn set_callback(&mut self, callback: impl FnMut(&[u8]) + Send + 'static) {
        if let Ok(mut slot) = self.callback.lock() {
            *slot = Some(Box::new(callback));
        }
    }

    /// Connect to a host, preferring IPv6 candidates.
    ///
    /// Each candidate gets a fresh socket; a failed socket is dropped
    /// (closed) before the next candidate is tried. On success the session
    /// is marked connected and the receive loop starts.
    pub fn connect(&mut self, host: &str, port: u16) -> Result<(), TransportError> {
        // A session holds at most one socket and one receiver.
        self.disconnect();

        let candidates = resolve::candidates(host, port)?;
        let socket = resolve::first_reachable(&candidates, connect_candidate)?;

        match socket.peer_addr() {
            Ok(peer) => info!("datagram session connected to {}", peer),
            Err(_) => info!("datagram session connected to {}:{}", host, port),
        }

        // The poll timeout is the shutdown mechanism for the blocking recv.
        socket
            .set_read_timeout(Some(RECV_POLL_INTERVAL))
            .map_err(TransportError::ConnectFailed)?;

        let socket = Arc::new(socket);
        self.stop.store(false, Ordering::SeqCst);
        self.connected.store(true, Ordering::SeqCst);

        let handle = std::thread::spawn({
            let socket = Arc::clone(&socket);
            let stop = Arc::clone(&self.stop);
            let connected = Arc::clone(&self.connected);
            let callback = Arc::clone(&self.callback);
            move || receive_loop(socket, stop, connected, callback)
        });

        self.socket = Some(socket);
        self.receiver = Some(handle);
        Ok(())
    }

    /// Tear the session down. Idempotent.
    ///
    /// Signals the receiver, joins it, and only then invalidates the socket
    /// handle. After this returns the callback will not be invoked again.
    pub fn disconnect(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        self.connected.store(false, Ordering::SeqCst);

        if let Some(handle) = self.receiver.take() {
            if handle.join().is_err() {
                error!("receive loop panicked");
            }
        }
        if self.socket.take().is_some() {
            debug!("datagram socket closed");
        }
    }

    /// Send one datagram to the connected peer.
    ///
    /// A failed send marks the session disconnected so subsequent sends
    /// short-circuit with [`TransportError::NotConnected`].
    pub fn send(&mut self, data: &[u8]) -> Result<usize, TransportError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(TransportError::NotConnected);
        }
        let socket = self.socket.as_ref().ok_or(TransportError::NotConnected)?;
        match socket.send(data) {
            Ok(n) => Ok(n),
            Err(e) => {
                error!("datagram send failed: {}", e);
                self.connected.store(false, Ordering::SeqCst);
                Err(TransportError::WriteFailed(e))
            }
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Local address of the connected socket.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.socket.as_ref()?.local_addr().ok()
    }
}

impl Default for UdpSession {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for UdpSession {
    fn drop(&mut self) {
        self.disconnect();
    }
}

/// Open a socket of the candidate's family and connect it.
fn connect_candidate(cand: &Candidate) -> Result<UdpSocket, TransportError> {
    use socket2::{Domain, Protocol, Socket, Type};

    let domain = match cand.family() {
        AddressFamily::V6 => Domain::IPV6,
        AddressFamily::V4 => Domain::IPV4,
    };
    let socket =
        Socket::new(domain, Type::DGRAM, Some(Protocol::UDP)).map_err(TransportError::ConnectFailed)?;

    if cand.family() == AddressFamily::V6 {
        // Dual-stack: the IPv6 socket must accept mapped IPv4 peers.
        if let Err(e) = socket.set_only_v6(false) {
            warn!("failed to clear IPV6_V6ONLY: {}", e);
        }
    }

    socket
        .connect(&cand.addr.into())
        .map_err(TransportError::from_connect_io)?;
    Ok(socket.into())
}

/// Blocking receive loop. Delivers datagrams to the callback in arrival
/// order; terminates on the stop signal, on a zero-length datagram, or on
/// any socket error other than the poll timeout. Never reconnects, that is
/// the caller's job via a fresh `connect`.
fn receive_loop(
    socket: Arc<UdpSocket>,
    stop: Arc<AtomicBool>,
    connected: Arc<AtomicBool>,
    callback: Arc<Mutex<Option<MessageCallback>>>,
) {
    let mut buf = [0u8; RECV_BUFFER_LEN];
    loop {
        if stop.load(Ordering::SeqCst) {
            break;
        }
        match socket.recv(&mut buf) {
            Ok(0) => {
                debug!("zero-length datagram, stopping receive loop");
                break;
            }
            Ok(n) => {
                if let Ok(mut slot) = callback.lock() {
                    if let Some(cb) = slot.as_mut() {
                        cb(&buf[..n]);
                    }
                }
            }
            Err(e)
                if e.kind() == io::ErrorKind::WouldBlock
                    || e.kind() == io::ErrorKind::TimedOut =>
            {
                // Poll tick; check the stop flag and block again.
                continue;
            }
            Err(e) => {
                if !stop.load(Ordering::SeqCst) {
                    warn!("datagram receive failed: {}", e);
                }
                break;
            }
        }
    }
    connected.store(false, Ordering::SeqCst);
    debug!("receive loop stopped");
}

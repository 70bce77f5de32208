//! TCP transport: one acceptor thread, one reader thread per peer, one
//! pinger thread. Peers are tracked as a set of `(host, port)` keys, each
//! mapped to its live socket.

use std::collections::HashMap;
use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{info, warn};

use super::message::Message;
use crate::error::P2pError;

pub type PeerAddr = (String, u16);

const SOCKET_TIMEOUT: Duration = Duration::from_secs(60);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const PING_INTERVAL: Duration = Duration::from_secs(30);

/// Callback invoked once per parsed message, with the address of the peer
/// it arrived from.
pub type MessageHandler = Arc<dyn Fn(PeerAddr, Message) + Send + Sync>;

struct Inner {
    connections: HashMap<PeerAddr, TcpStream>,
}

pub struct Transport {
    host: String,
    port: u16,
    running: Arc<AtomicBool>,
    inner: Arc<Mutex<Inner>>,
    handler: MessageHandler,
    threads: Mutex<Vec<JoinHandle<()>>>,
}

impl Transport {
    pub fn new(host: String, port: u16, handler: MessageHandler) -> Self {
        Transport {
            host,
            port,
            running: Arc::new(AtomicBool::new(false)),
            inner: Arc::new(Mutex::new(Inner { connections: HashMap::new() })),
            handler,
            threads: Mutex::new(Vec::new()),
        }
    }

    /// This transport's own `(host, port)`, as used as the key other
    /// peers connect to it under.
    pub fn local_addr(&self) -> PeerAddr {
        (self.host.clone(), self.port)
    }

    pub fn start(self: &Arc<Self>) -> std::io::Result<()> {
        let listener = TcpListener::bind((self.host.as_str(), self.port))?;
        self.running.store(true, Ordering::SeqCst);
        info!("p2p: listening on {}:{}", self.host, self.port);

        let acceptor = {
            let this = Arc::clone(self);
            thread::spawn(move || this.accept_loop(listener))
        };
        let pinger = {
            let this = Arc::clone(self);
            thread::spawn(move || this.ping_loop())
        };
        self.threads.lock().unwrap().extend([acceptor, pinger]);
        Ok(())
    }

    pub fn stop(&self) {
        info!("p2p: stopping");
        self.running.store(false, Ordering::SeqCst);
        // Connecting to ourselves unblocks `accept()`, mirroring closing
        // the listen socket without holding onto a separate handle to it.
        let _ = TcpStream::connect((self.host.as_str(), self.port));

        let addrs: Vec<PeerAddr> = self.inner.lock().unwrap().connections.keys().cloned().collect();
        for addr in addrs {
            self.remove_peer(&addr);
        }
    }

    fn accept_loop(self: &Arc<Self>, listener: TcpListener) {
        while self.running.load(Ordering::SeqCst) {
            match listener.accept() {
                Ok((stream, addr)) => {
                    if !self.running.load(Ordering::SeqCst) {
                        break;
                    }
                    let peer_addr = (addr.ip().to_string(), addr.port());
                    let _ = stream.set_read_timeout(Some(SOCKET_TIMEOUT));
                    let mut inner = self.inner.lock().unwrap();
                    if inner.connections.contains_key(&peer_addr) {
                        warn!("p2p: already connected to {:?}, dropping new socket", peer_addr);
                        continue;
                    }
                    let reader_stream = stream.try_clone().expect("clone accepted socket");
                    inner.connections.insert(peer_addr.clone(), stream);
                    drop(inner);
                    self.spawn_reader(peer_addr, reader_stream);
                }
                Err(e) => {
                    if self.running.load(Ordering::SeqCst) {
                        warn!("p2p: accept error: {}", e);
                    }
                }
            }
        }
    }

    fn spawn_reader(self: &Arc<Self>, peer_addr: PeerAddr, stream: TcpStream) {
        let this = Arc::clone(self);
        let handle = thread::spawn(move || this.read_loop(peer_addr, stream));
        self.threads.lock().unwrap().push(handle);
    }

    fn read_loop(&self, peer_addr: PeerAddr, stream: TcpStream) {
        let mut reader = BufReader::new(stream);
        let mut line = String::new();
        loop {
            if !self.running.load(Ordering::SeqCst) {
                break;
            }
            line.clear();
            match reader.read_line(&mut line) {
                Ok(0) => {
                    info!("p2p: peer {:?} closed connection", peer_addr);
                    break;
                }
                Ok(_) => match Message::parse(&line) {
                    Ok(message) => (self.handler)(peer_addr.clone(), message),
                    Err(e) => warn!("p2p: {:?} sent a {}", peer_addr, e),
                },
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock || e.kind() == std::io::ErrorKind::TimedOut => {
                    continue;
                }
                Err(e) => {
                    warn!("p2p: read from {:?} failed: {}", peer_addr, P2pError::Io(e));
                    break;
                }
            }
        }
        self.remove_peer(&peer_addr);
    }

    /// Connects to `(host, port)` unless it is our own address or we're
    /// already connected.
    pub fn connect_to_peer(self: &Arc<Self>, host: &str, port: u16) {
        if !self.running.load(Ordering::SeqCst) {
            return;
        }
        let peer_addr = (host.to_string(), port);
        if peer_addr == (self.host.clone(), self.port) {
            return;
        }
        if self.inner.lock().unwrap().connections.contains_key(&peer_addr) {
            return;
        }

        let stream = match TcpStream::connect_timeout(
            &format!("{}:{}", host, port).parse().expect("valid socket address"),
            CONNECT_TIMEOUT,
        ) {
            Ok(s) => s,
            Err(e) => {
                warn!("p2p: could not connect to {:?}: {}", peer_addr, P2pError::Io(e));
                return;
            }
        };
        let _ = stream.set_read_timeout(Some(SOCKET_TIMEOUT));
        info!("p2p: connected to {:?}", peer_addr);

        let reader_stream = stream.try_clone().expect("clone outgoing socket");
        self.inner.lock().unwrap().connections.insert(peer_addr.clone(), stream);
        self.spawn_reader(peer_addr, reader_stream);
    }

    /// Sends `message` to one peer. Returns whether the send succeeded;
    /// on failure the peer is removed. The peer map lock is only held
    /// long enough to clone the socket handle, so removal never happens
    /// while the lock from this call is still held (no reentrant locking
    /// is required).
    pub fn send(&self, peer_addr: &PeerAddr, message: &Message) -> bool {
        match self.try_send(peer_addr, message) {
            Ok(()) => true,
            Err(e) => {
                warn!("p2p: send to {:?} failed: {}", peer_addr, e);
                self.remove_peer(peer_addr);
                false
            }
        }
    }

    fn try_send(&self, peer_addr: &PeerAddr, message: &Message) -> Result<(), P2pError> {
        let stream = { self.inner.lock().unwrap().connections.get(peer_addr).and_then(|s| s.try_clone().ok()) };
        let mut stream = stream.ok_or_else(|| P2pError::NotConnected(format!("{:?}", peer_addr)))?;
        stream.write_all(message.to_line().as_bytes())?;
        Ok(())
    }

    /// Sends `message` to every connected peer except `exclude`, fanning the
    /// sends out across scoped threads so one slow/stuck peer can't hold up
    /// delivery to the rest.
    pub fn broadcast(&self, message: &Message, exclude: Option<&PeerAddr>) {
        let peers: Vec<PeerAddr> = self.inner.lock().unwrap().connections.keys().cloned().collect();
        crossbeam::scope(|scope| {
            for peer in &peers {
                if Some(peer) == exclude {
                    continue;
                }
                scope.spawn(move |_| {
                    self.send(peer, message);
                });
            }
        })
        .expect("broadcast worker thread panicked");
    }

    pub fn get_peer_list(&self) -> Vec<PeerAddr> {
        self.inner.lock().unwrap().connections.keys().cloned().collect()
    }

    fn remove_peer(&self, peer_addr: &PeerAddr) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(stream) = inner.connections.remove(peer_addr) {
            let _ = stream.shutdown(std::net::Shutdown::Both);
        }
    }

    fn ping_loop(&self) {
        while self.running.load(Ordering::SeqCst) {
            thread::sleep(PING_INTERVAL);
            if !self.running.load(Ordering::SeqCst) {
                break;
            }
            let ping = Message::ping();
            self.broadcast(&ping, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn free_port() -> u16 {
        TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap().port()
    }

    #[test]
    fn two_transports_exchange_a_ping() {
        let received = Arc::new(AtomicUsize::new(0));
        let received_clone = Arc::clone(&received);
        let handler: MessageHandler = Arc::new(move |_addr, _msg| {
            received_clone.fetch_add(1, Ordering::SeqCst);
        });

        let port_a = free_port();
        let port_b = free_port();
        let a = Arc::new(Transport::new("127.0.0.1".into(), port_a, Arc::new(|_, _| {})));
        let b = Arc::new(Transport::new("127.0.0.1".into(), port_b, handler));
        a.start().unwrap();
        b.start().unwrap();
        thread::sleep(Duration::from_millis(100));

        a.connect_to_peer("127.0.0.1", port_b);
        thread::sleep(Duration::from_millis(100));
        a.send(&("127.0.0.1".into(), port_b), &Message::ping());
        thread::sleep(Duration::from_millis(200));

        assert_eq!(received.load(Ordering::SeqCst), 1);
        a.stop();
        b.stop();
    }

    #[test]
    fn inbound_connection_is_tracked_in_peer_list() {
        let port = free_port();
        let transport = Arc::new(Transport::new("127.0.0.1".into(), port, Arc::new(|_, _| {})));
        transport.start().unwrap();
        thread::sleep(Duration::from_millis(100));

        let _s1 = TcpStream::connect(("127.0.0.1", port)).unwrap();
        thread::sleep(Duration::from_millis(100));
        assert_eq!(transport.get_peer_list().len(), 1);
        transport.stop();
    }
}

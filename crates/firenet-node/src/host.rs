//! Host-side peripherals for running nodes off the board.
//!
//! The modem's UART is reached through a TCP bridge (one connection, raw
//! bytes both ways) and the LoRa link is emulated with UDP datagrams, one
//! datagram per packet.

use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, TryRecvError, TrySendError};
use firenet_modem::{ModemError, ModemResult, ModemSession, ModemTransport};
use tracing::{debug, error, info, warn};

use crate::config::DeploymentConfig;
use crate::error::NodeResult;
use crate::gateway::GatewayNode;
use crate::mailbox::Mailbox;
use crate::radio::{Radio, RadioError, RadioEvent};
use crate::transmitter::TransmitterNode;

/// Largest datagram accepted by [`UdpRadio`].
pub const MAX_DATAGRAM: usize = 256;

const RECEIVE_POLL: Duration = Duration::from_millis(200);

// ============================================================================
// TCP Modem Transport
// ============================================================================

/// A modem UART exposed on a TCP port.
///
/// When the bridge goes away every exchange fails fast until the next
/// upload cycle reconnects.
pub struct TcpModemTransport {
    address: String,
    connect_timeout: Duration,
    stream: Option<TcpStream>,
    peer: SocketAddr,
}

impl TcpModemTransport {
    /// Connect to the bridge at `address`.
    pub fn connect(address: &str, timeout: Duration) -> ModemResult<Self> {
        let (stream, peer) = open_bridge(address, timeout)?;
        info!(%peer, "connected to modem bridge");
        Ok(TcpModemTransport {
            address: address.to_string(),
            connect_timeout: timeout,
            stream: Some(stream),
            peer,
        })
    }

    /// Address of the bridge.
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// True while the bridge connection is up.
    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    fn stream(&mut self) -> ModemResult<&mut TcpStream> {
        self.stream.as_mut().ok_or(ModemError::Disconnected)
    }

    fn lost(&mut self, reason: &dyn std::fmt::Display) {
        if self.stream.take().is_some() {
            error!(peer = %self.peer, %reason, "modem bridge connection lost");
        }
    }
}

fn open_bridge(address: &str, timeout: Duration) -> ModemResult<(TcpStream, SocketAddr)> {
    let peer = resolve(address)?;
    let stream = TcpStream::connect_timeout(&peer, timeout)?;
    stream.set_nodelay(true)?;
    Ok((stream, peer))
}

impl ModemTransport for TcpModemTransport {
    fn write_all(&mut self, data: &[u8]) -> ModemResult<()> {
        let stream = self.stream()?;
        let result = stream.write_all(data).and_then(|()| stream.flush());
        if let Err(e) = result {
            self.lost(&e);
            return Err(e.into());
        }
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> ModemResult<usize> {
        // A zero read timeout is rejected by the socket.
        let timeout = timeout.max(Duration::from_millis(1));
        let stream = self.stream()?;
        stream.set_read_timeout(Some(timeout))?;
        match stream.read(buf) {
            Ok(0) => {
                self.lost(&"closed by peer");
                Err(ModemError::Disconnected)
            }
            Ok(n) => Ok(n),
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                Ok(0)
            }
            Err(e) => {
                self.lost(&e);
                Err(e.into())
            }
        }
    }

    fn ensure_connected(&mut self) -> ModemResult<()> {
        if self.stream.is_some() {
            return Ok(());
        }
        let (stream, peer) = open_bridge(&self.address, self.connect_timeout)?;
        info!(%peer, "reconnected to modem bridge");
        self.stream = Some(stream);
        self.peer = peer;
        Ok(())
    }
}

fn resolve(address: &str) -> io::Result<SocketAddr> {
    address.to_socket_addrs()?.next().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("no address found for {}", address),
        )
    })
}

// ============================================================================
// UDP Radio
// ============================================================================

/// A packet radio emulated with UDP datagrams.
///
/// A background thread receives datagrams into a one-packet FIFO and posts
/// [`RadioEvent::PacketReceived`]. Datagrams arriving while the FIFO is
/// full are dropped, as a radio overwrites its buffer.
pub struct UdpRadio {
    socket: UdpSocket,
    peer: SocketAddr,
    mailbox: Arc<Mailbox<RadioEvent>>,
    fifo: Receiver<Vec<u8>>,
    stop: Arc<AtomicBool>,
    receiver: Option<JoinHandle<()>>,
}

impl UdpRadio {
    /// Bind to `bind`, send to `peer`, and start listening.
    pub fn open(
        bind: &str,
        peer: &str,
        mailbox: Arc<Mailbox<RadioEvent>>,
    ) -> Result<Self, RadioError> {
        let init = |e: io::Error| RadioError::Init(e.to_string());
        let socket = UdpSocket::bind(resolve(bind).map_err(init)?).map_err(init)?;
        let peer = resolve(peer).map_err(init)?;
        let listener = socket.try_clone().map_err(init)?;
        listener.set_read_timeout(Some(RECEIVE_POLL)).map_err(init)?;

        let (tx, fifo) = crossbeam_channel::bounded(1);
        let stop = Arc::new(AtomicBool::new(false));
        let receiver = {
            let mailbox = Arc::clone(&mailbox);
            let stop = Arc::clone(&stop);
            thread::Builder::new()
                .name("udp-radio".to_string())
                .spawn(move || receive_loop(listener, tx, mailbox, stop))
                .map_err(init)?
        };

        info!(local = ?socket.local_addr().ok(), %peer, "radio listening");
        Ok(UdpRadio {
            socket,
            peer,
            mailbox,
            fifo,
            stop,
            receiver: Some(receiver),
        })
    }

    /// Local socket address.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.socket.local_addr().ok()
    }
}

fn receive_loop(
    socket: UdpSocket,
    fifo: Sender<Vec<u8>>,
    mailbox: Arc<Mailbox<RadioEvent>>,
    stop: Arc<AtomicBool>,
) {
    let mut buf = [0u8; MAX_DATAGRAM];
    while !stop.load(Ordering::Relaxed) {
        match socket.recv_from(&mut buf) {
            Ok((len, from)) => match fifo.try_send(buf[..len].to_vec()) {
                Ok(()) => {
                    debug!(%from, len, "datagram received");
                    mailbox.post(RadioEvent::PacketReceived);
                }
                Err(TrySendError::Full(_)) => debug!(%from, "radio buffer busy, dropping datagram"),
                Err(TrySendError::Disconnected(_)) => break,
            },
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {}
            Err(e) => {
                warn!(error = %e, "radio receive failed");
                thread::sleep(RECEIVE_POLL);
            }
        }
    }
}

impl Radio for UdpRadio {
    fn start_transmit(&mut self, data: &[u8]) -> Result<(), RadioError> {
        self.socket.send_to(data, self.peer)?;
        self.mailbox.post(RadioEvent::TransmitDone);
        Ok(())
    }

    fn read_packet(&mut self, buf: &mut [u8]) -> Result<usize, RadioError> {
        match self.fifo.try_recv() {
            Ok(packet) => {
                let len = packet.len().min(buf.len());
                buf[..len].copy_from_slice(&packet[..len]);
                Ok(len)
            }
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => Err(RadioError::NoPacket),
        }
    }

    fn start_receive(&mut self) -> Result<(), RadioError> {
        if !self.fifo.is_empty() {
            self.mailbox.post(RadioEvent::PacketReceived);
        }
        Ok(())
    }
}

impl Drop for UdpRadio {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(receiver) = self.receiver.take() {
            let _ = receiver.join();
        }
    }
}

// ============================================================================
// Startup
// ============================================================================

/// Bring up a transmitter on the host radio.
pub fn start_transmitter(config: &DeploymentConfig) -> NodeResult<TransmitterNode<UdpRadio>> {
    let mailbox = Arc::new(Mailbox::new());
    let radio = UdpRadio::open(&config.radio.bind, &config.radio.peer, Arc::clone(&mailbox))?;
    Ok(TransmitterNode::new(radio, mailbox, config.node.clone()))
}

/// Bring up a gateway on the host radio and modem bridge.
pub fn start_gateway(
    config: &DeploymentConfig,
) -> NodeResult<GatewayNode<UdpRadio, TcpModemTransport>> {
    let mailbox = Arc::new(Mailbox::new());
    let radio = UdpRadio::open(&config.radio.bind, &config.radio.peer, Arc::clone(&mailbox))?;
    let transport =
        TcpModemTransport::connect(&config.modem.address, config.modem.connect_timeout())?;
    let session = ModemSession::new(transport, config.modem.session.clone());
    Ok(GatewayNode::new(
        radio,
        mailbox,
        session,
        config.node.clone(),
        config.upload.clone(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::time::Instant;

    fn wait_for_event(mailbox: &Mailbox<RadioEvent>) -> Option<RadioEvent> {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if let Some(event) = mailbox.take() {
                return Some(event);
            }
            thread::sleep(Duration::from_millis(5));
        }
        None
    }

    #[test]
    fn test_udp_radio_pair() {
        let rx_mailbox = Arc::new(Mailbox::new());
        let mut receiver = UdpRadio::open("127.0.0.1:0", "127.0.0.1:9", Arc::clone(&rx_mailbox)).unwrap();
        let rx_addr = receiver.local_addr().unwrap().to_string();

        let tx_mailbox = Arc::new(Mailbox::new());
        let mut sender = UdpRadio::open("127.0.0.1:0", &rx_addr, Arc::clone(&tx_mailbox)).unwrap();

        sender.start_transmit(&[0x11, 0x01, 0x11]).unwrap();
        assert_eq!(tx_mailbox.take(), Some(RadioEvent::TransmitDone));

        assert_eq!(wait_for_event(&rx_mailbox), Some(RadioEvent::PacketReceived));
        let mut buf = [0u8; 9];
        let len = receiver.read_packet(&mut buf).unwrap();
        assert_eq!(&buf[..len], [0x11, 0x01, 0x11]);
        assert!(matches!(receiver.read_packet(&mut buf), Err(RadioError::NoPacket)));
    }

    #[test]
    fn test_tcp_transport_round_trip() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let address = listener.local_addr().unwrap().to_string();
        let bridge = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut buf = [0u8; 16];
            let n = stream.read(&mut buf).unwrap();
            assert_eq!(&buf[..n], b"AT\r\n");
            stream.write_all(b"\r\nOK\r\n").unwrap();
        });

        let mut transport = TcpModemTransport::connect(&address, Duration::from_secs(1)).unwrap();
        transport.write_all(b"AT\r\n").unwrap();

        let mut received = Vec::new();
        let mut buf = [0u8; 16];
        let deadline = Instant::now() + Duration::from_secs(2);
        while !received.ends_with(b"OK\r\n") && Instant::now() < deadline {
            let n = transport.read(&mut buf, Duration::from_millis(20)).unwrap();
            received.extend_from_slice(&buf[..n]);
        }
        assert_eq!(received, b"\r\nOK\r\n");
        bridge.join().unwrap();
    }

    #[test]
    fn test_tcp_transport_reconnects_after_bridge_drop() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let address = listener.local_addr().unwrap().to_string();
        let mut transport = TcpModemTransport::connect(&address, Duration::from_secs(1)).unwrap();
        drop(listener.accept().unwrap());

        let mut buf = [0u8; 8];
        let deadline = Instant::now() + Duration::from_secs(2);
        while transport.is_connected() && Instant::now() < deadline {
            let _ = transport.read(&mut buf, Duration::from_millis(20));
        }
        assert!(!transport.is_connected());
        assert!(matches!(transport.write_all(b"AT\r\n"), Err(ModemError::Disconnected)));

        let bridge = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut buf = [0u8; 16];
            let n = stream.read(&mut buf).unwrap();
            assert_eq!(&buf[..n], b"AT\r\n");
        });
        transport.ensure_connected().unwrap();
        assert!(transport.is_connected());
        transport.write_all(b"AT\r\n").unwrap();
        bridge.join().unwrap();
    }

    #[test]
    fn test_tcp_transport_idle_read_is_zero() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let address = listener.local_addr().unwrap().to_string();
        let mut transport = TcpModemTransport::connect(&address, Duration::from_secs(1)).unwrap();
        let _accepted = listener.accept().unwrap();

        let mut buf = [0u8; 8];
        assert_eq!(transport.read(&mut buf, Duration::from_millis(10)).unwrap(), 0);
    }
}

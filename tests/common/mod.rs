//! Loopback peers and a recording observer shared by the integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use bytes::BytesMut;
use futures::SinkExt;
use linesock::{CloseReason, FramingStrategy, LineCodec, SocketError, SocketObserver, TextLineFraming};
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, UdpSocket};
use tokio::sync::mpsc;
use tokio::time::{timeout, Instant};
use tokio_stream::StreamExt;
use tokio_util::codec::{Framed, FramedRead};

/// How a test peer treats its connection.
#[derive(Debug, Clone)]
pub enum Peer {
    /// Echo every line; answer `ping` with `pong`.
    Echo,
    /// Read and record, never write.
    Silent,
    /// Write these raw bytes once, then read silently.
    Greet(Vec<u8>),
    /// Accept and hang up immediately.
    HangUp,
    /// Accept, then never read or write.
    Stalled,
    /// Write `tick` lines nonstop while recording what arrives.
    Chatter,
}

/// A peer bound to an ephemeral loopback port.
pub struct TestPeer {
    pub addr: SocketAddr,
    /// Lines the peer received, in order.
    pub lines: mpsc::UnboundedReceiver<String>,
}

impl TestPeer {
    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub async fn next_line(&mut self, within: Duration) -> String {
        timeout(within, self.lines.recv())
            .await
            .expect("peer received nothing in time")
            .expect("peer stopped")
    }

    /// Everything received so far.
    pub fn drain(&mut self) -> Vec<String> {
        let mut out = Vec::new();
        while let Ok(line) = self.lines.try_recv() {
            out.push(line);
        }
        out
    }
}

/// TCP peer that serves a single connection.
pub async fn tcp_peer(behavior: Peer) -> TestPeer {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind tcp peer");
    let addr = listener.local_addr().unwrap();
    let (tx, lines) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        let Ok((mut socket, _)) = listener.accept().await else {
            return;
        };
        match &behavior {
            Peer::HangUp => return,
            Peer::Stalled => {
                // Holds `socket` open without draining it.
                std::future::pending::<()>().await;
                return;
            }
            Peer::Chatter => {
                let (read_half, mut write_half) = socket.into_split();
                tokio::spawn(async move {
                    while write_half.write_all(b"tick\r\n").await.is_ok() {}
                });
                let mut framed = FramedRead::new(read_half, LineCodec::default());
                while let Some(Ok(line)) = framed.next().await {
                    let _ = tx.send(line);
                }
                return;
            }
            Peer::Greet(bytes) => {
                let _ = socket.write_all(bytes).await;
            }
            _ => {}
        }

        let mut framed = Framed::new(socket, LineCodec::default());
        while let Some(Ok(line)) = framed.next().await {
            let _ = tx.send(line.clone());
            if let Peer::Echo = behavior {
                let reply = if line == "ping" { "pong".to_string() } else { line };
                if framed.send(reply).await.is_err() {
                    break;
                }
            }
        }
    });

    TestPeer { addr, lines }
}

/// UDP peer that decodes every datagram it receives.
pub async fn udp_peer(behavior: Peer) -> TestPeer {
    let socket = UdpSocket::bind("127.0.0.1:0").await.expect("bind udp peer");
    let addr = socket.local_addr().unwrap();
    let (tx, lines) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        let framing = TextLineFraming::default();
        let mut buf = vec![0u8; 65_536];
        loop {
            let Ok((len, from)) = socket.recv_from(&mut buf).await else {
                return;
            };
            let mut datagram = BytesMut::from(&buf[..len]);
            while let Ok(Some(line)) = framing.decode(&mut datagram) {
                let _ = tx.send(line.clone());
                if let Peer::Echo = behavior {
                    let reply = if line == "ping" { "pong".to_string() } else { line };
                    let mut out = BytesMut::new();
                    framing.encode(&reply, &mut out).unwrap();
                    let _ = socket.send_to(&out, from).await;
                }
            }
        }
    });

    TestPeer { addr, lines }
}

/// A loopback port nothing listens on.
pub async fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

/// Observer callbacks, flattened for assertions.
#[derive(Debug, Clone, PartialEq)]
pub enum Seen {
    Connected,
    ConnectFailed(String),
    Message(String),
    Error(String),
    Idle,
    Closed(CloseReason),
}

pub struct Recorder {
    tx: mpsc::UnboundedSender<(Instant, Seen)>,
}

impl Recorder {
    fn record(&self, seen: Seen) {
        let _ = self.tx.send((Instant::now(), seen));
    }
}

impl SocketObserver for Recorder {
    fn on_connected(&self, _peer: SocketAddr) {
        self.record(Seen::Connected);
    }

    fn on_connect_failed(&self, error: &SocketError) {
        self.record(Seen::ConnectFailed(error.to_string()));
    }

    fn on_message(&self, message: &str) {
        self.record(Seen::Message(message.to_string()));
    }

    fn on_error(&self, error: &SocketError) {
        self.record(Seen::Error(error.to_string()));
    }

    fn on_idle(&self) {
        self.record(Seen::Idle);
    }

    fn on_closed(&self, reason: &CloseReason) {
        self.record(Seen::Closed(reason.clone()));
    }
}

pub struct Events {
    rx: mpsc::UnboundedReceiver<(Instant, Seen)>,
}

pub fn recorder() -> (Recorder, Events) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Recorder { tx }, Events { rx })
}

impl Events {
    /// Next event with its arrival time.
    pub async fn next_at(&mut self, within: Duration) -> (Instant, Seen) {
        timeout(within, self.rx.recv())
            .await
            .expect("no observer event in time")
            .expect("observer dropped")
    }

    pub async fn next(&mut self, within: Duration) -> Seen {
        self.next_at(within).await.1
    }

    /// Skip events until one matches.
    pub async fn until(&mut self, within: Duration, pred: impl Fn(&Seen) -> bool) -> (Instant, Seen) {
        let deadline = Instant::now() + within;
        loop {
            let left = deadline.saturating_duration_since(Instant::now());
            let event = self.next_at(left).await;
            if pred(&event.1) {
                return event;
            }
        }
    }

    /// Wait for the client to finish and return everything it still emitted.
    /// The channel closes once the client's dispatcher exits.
    pub async fn rest(mut self, within: Duration) -> Vec<Seen> {
        let mut out = Vec::new();
        let collect = async {
            while let Some((_, seen)) = self.rx.recv().await {
                out.push(seen);
            }
        };
        timeout(within, collect).await.expect("client never finished");
        out
    }
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

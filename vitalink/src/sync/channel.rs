//! Live subscription channel.
//!
//! Each subscription owns a websocket driven by a dedicated worker thread;
//! the owner receives inserts and status changes over a `crossbeam`
//! channel. There is no reconnection or backoff here: a dropped connection
//! surfaces as a status event and the channel ends.

use std::io;
use std::net::TcpStream;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam::channel;
use tungstenite::stream::MaybeTlsStream;
use tungstenite::{Message, WebSocket};

use crate::data::{Sample, SessionId};
use crate::sync::proto::{Frame, EVENT_REPLY};
use crate::sync::Error;

/// Bounded depth of the event channel; the worker drops events rather than
/// block the socket when the receiver stops draining.
const EVENT_CHANNEL_SIZE: usize = 256;

/// How long a blocking read waits before the worker checks for shutdown
/// and heartbeat deadlines.
const SOCKET_POLL: Duration = Duration::from_millis(250);

const HEARTBEAT_PERIOD: Duration = Duration::from_secs(25);

const JOIN_REF: u64 = 1;

#[derive(Debug, Clone, PartialEq)]
pub enum ChannelStatus {
    /// The backend acknowledged the channel join.
    Joined,
    /// The channel ended, either by unsubscribing or from the remote side.
    Closed,
    /// A frame arrived that could not be understood.
    ProtocolError(String),
    /// The websocket failed; the channel is dead.
    TransportError(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    Insert(Sample),
    Status(ChannelStatus),
}

type Socket = WebSocket<MaybeTlsStream<TcpStream>>;

/// Handle to an open live channel.
///
/// Closing is mandatory and happens exactly once: either explicitly via
/// [`Subscription::close`] or implicitly on drop, whichever comes first.
pub struct Subscription {
    session_id: SessionId,
    events: channel::Receiver<ChannelEvent>,
    shutdown: channel::Sender<()>,
    worker: Option<thread::JoinHandle<()>>,
}

impl Subscription {
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// The event channel, for use with `crossbeam::select!` or polling.
    pub fn events(&self) -> &channel::Receiver<ChannelEvent> {
        &self.events
    }

    pub fn try_recv(&self) -> Option<ChannelEvent> {
        self.events.try_recv().ok()
    }

    /// Leave the channel and stop the worker.
    pub fn close(mut self) {
        self.shutdown_worker();
    }

    fn shutdown_worker(&mut self) {
        if let Some(worker) = self.worker.take() {
            let _ = self.shutdown.send(());
            let _ = worker.join();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.shutdown_worker();
    }
}

/// Connect, join the session topic, and hand the socket to a worker thread.
pub(crate) fn open(ws_url: &str, token: &str, session_id: SessionId) -> Result<Subscription, Error> {
    let request = if token.is_empty() {
        ws_url.to_string()
    } else {
        format!("{}?token={}", ws_url, token)
    };
    let (mut socket, _response) =
        tungstenite::connect(&request).map_err(|e| Error::Connect(e.to_string()))?;
    set_read_timeout(&socket, SOCKET_POLL);

    let join = Frame::join(session_id, JOIN_REF)
        .encode()
        .map_err(|e| Error::Channel(e.to_string()))?;
    socket
        .send(Message::Text(join))
        .map_err(|e| Error::Channel(e.to_string()))?;

    let (event_tx, event_rx) = channel::bounded(EVENT_CHANNEL_SIZE);
    let (shutdown_tx, shutdown_rx) = channel::bounded(1);

    let worker = thread::spawn(move || {
        ChannelWorker {
            socket,
            session_id,
            events: event_tx,
            shutdown: shutdown_rx,
            next_ref: JOIN_REF + 1,
            joined: false,
            last_heartbeat: Instant::now(),
        }
        .run();
    });

    Ok(Subscription {
        session_id,
        events: event_rx,
        shutdown: shutdown_tx,
        worker: Some(worker),
    })
}

struct ChannelWorker {
    socket: Socket,
    session_id: SessionId,
    events: channel::Sender<ChannelEvent>,
    shutdown: channel::Receiver<()>,
    next_ref: u64,
    joined: bool,
    last_heartbeat: Instant,
}

impl ChannelWorker {
    fn run(mut self) {
        loop {
            if self.shutdown.try_recv().is_ok() {
                self.leave();
                return;
            }

            if self.last_heartbeat.elapsed() >= HEARTBEAT_PERIOD {
                if self.send_frame(&Frame::heartbeat(self.next_ref)).is_err() {
                    self.status(ChannelStatus::TransportError("heartbeat failed".to_string()));
                    return;
                }
                self.next_ref += 1;
                self.last_heartbeat = Instant::now();
            }

            match self.socket.read() {
                Ok(Message::Text(text)) => match Frame::decode(&text) {
                    Ok(frame) => self.handle_frame(frame),
                    Err(e) => self.status(ChannelStatus::ProtocolError(e.to_string())),
                },
                Ok(Message::Close(_)) => {
                    self.status(ChannelStatus::Closed);
                    return;
                }
                Ok(_) => {}
                Err(tungstenite::Error::Io(ref e)) if is_poll_timeout(e) => {}
                Err(tungstenite::Error::ConnectionClosed)
                | Err(tungstenite::Error::AlreadyClosed) => {
                    self.status(ChannelStatus::Closed);
                    return;
                }
                Err(e) => {
                    self.status(ChannelStatus::TransportError(e.to_string()));
                    return;
                }
            }
        }
    }

    fn handle_frame(&mut self, frame: Frame) {
        if frame.event == EVENT_REPLY {
            if !self.joined && frame.reference == Some(JOIN_REF) && frame.reply_ok() {
                self.joined = true;
                self.status(ChannelStatus::Joined);
            }
            return;
        }
        match frame.insert_row() {
            Ok(Some(sample)) => {
                let _ = self.events.try_send(ChannelEvent::Insert(sample));
            }
            Ok(None) => {}
            Err(e) => self.status(ChannelStatus::ProtocolError(e.to_string())),
        }
    }

    fn leave(&mut self) {
        let leave = Frame::leave(self.session_id, self.next_ref);
        let _ = self.send_frame(&leave);
        let _ = self.socket.close(None);
        // Drain the close handshake so the server sees a clean shutdown.
        let deadline = Instant::now() + Duration::from_secs(1);
        while Instant::now() < deadline {
            match self.socket.read() {
                Ok(_) => {}
                Err(tungstenite::Error::Io(ref e)) if is_poll_timeout(e) => {}
                Err(_) => break,
            }
        }
        self.status(ChannelStatus::Closed);
    }

    fn send_frame(&mut self, frame: &Frame) -> Result<(), Error> {
        let text = frame.encode().map_err(|e| Error::Channel(e.to_string()))?;
        self.socket
            .send(Message::Text(text))
            .map_err(|e| Error::Channel(e.to_string()))
    }

    fn status(&self, status: ChannelStatus) {
        let _ = self.events.try_send(ChannelEvent::Status(status));
    }
}

fn is_poll_timeout(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
    )
}

fn set_read_timeout(socket: &Socket, timeout: Duration) {
    let stream = match socket.get_ref() {
        MaybeTlsStream::Plain(s) => s,
        MaybeTlsStream::NativeTls(t) => t.get_ref(),
        _ => return,
    };
    let _ = stream.set_read_timeout(Some(timeout));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::proto::{self, Frame};
    use serde_json::json;
    use std::net::TcpListener;

    // Minimal in-process backend: accepts one websocket, acks the join,
    // pushes one insert, then records the leave.
    fn spawn_backend(inserts: Vec<serde_json::Value>) -> (String, channel::Receiver<Frame>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let (seen_tx, seen_rx) = channel::unbounded();

        thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut socket = tungstenite::accept(stream).unwrap();

            let join = loop {
                match socket.read().unwrap() {
                    Message::Text(text) => break Frame::decode(&text).unwrap(),
                    _ => continue,
                }
            };
            assert_eq!(join.event, proto::EVENT_JOIN);
            let topic = join.topic.clone();
            seen_tx.send(join.clone()).unwrap();

            let reply = Frame {
                topic: topic.clone(),
                event: proto::EVENT_REPLY.to_string(),
                payload: json!({"status": "ok"}),
                reference: join.reference,
            };
            socket
                .send(Message::Text(reply.encode().unwrap()))
                .unwrap();

            for payload in inserts {
                let insert = Frame {
                    topic: topic.clone(),
                    event: proto::EVENT_INSERT.to_string(),
                    payload,
                    reference: None,
                };
                socket
                    .send(Message::Text(insert.encode().unwrap()))
                    .unwrap();
            }

            loop {
                match socket.read() {
                    Ok(Message::Text(text)) => {
                        let frame = Frame::decode(&text).unwrap();
                        let is_leave = frame.event == proto::EVENT_LEAVE;
                        seen_tx.send(frame).unwrap();
                        if is_leave {
                            break;
                        }
                    }
                    Ok(Message::Close(_)) | Err(_) => break,
                    Ok(_) => {}
                }
            }
            // Finish the close handshake if the client started one.
            while socket.read().is_ok() {}
        });

        (format!("ws://{}/realtime/ws", addr), seen_rx)
    }

    #[test]
    fn joins_receives_inserts_and_leaves_once_on_close() {
        let insert = json!({"type": "INSERT", "new": {
            "timestamp": 105, "spo2": 96, "pulse": 75, "session_id": 5
        }});
        let (url, seen) = spawn_backend(vec![insert]);

        let subscription = open(&url, "secret", 5).unwrap();
        assert_eq!(subscription.session_id(), 5);

        let timeout = Duration::from_secs(5);
        let joined = subscription.events().recv_timeout(timeout).unwrap();
        assert_eq!(joined, ChannelEvent::Status(ChannelStatus::Joined));

        let event = subscription.events().recv_timeout(timeout).unwrap();
        match event {
            ChannelEvent::Insert(sample) => {
                assert_eq!(sample.timestamp, 105.0);
                assert_eq!(sample.pulse, 75.0);
            }
            other => panic!("expected insert, got {:?}", other),
        }

        let join = seen.recv_timeout(timeout).unwrap();
        assert_eq!(join.topic, "vitals:5");

        subscription.close();
        let leave = seen.recv_timeout(timeout).unwrap();
        assert_eq!(leave.event, proto::EVENT_LEAVE);
        assert_eq!(leave.topic, "vitals:5");
        assert!(seen.recv_timeout(Duration::from_millis(200)).is_err());
    }

    #[test]
    fn drop_also_leaves_the_channel() {
        let (url, seen) = spawn_backend(vec![]);
        let subscription = open(&url, "", 7).unwrap();
        let timeout = Duration::from_secs(5);
        assert_eq!(seen.recv_timeout(timeout).unwrap().topic, "vitals:7");

        drop(subscription);
        assert_eq!(seen.recv_timeout(timeout).unwrap().event, proto::EVENT_LEAVE);
    }

    #[test]
    fn malformed_frames_surface_as_protocol_errors() {
        let (url, _seen) = spawn_backend(vec![json!({"type": "INSERT"})]);
        let subscription = open(&url, "", 9).unwrap();
        let timeout = Duration::from_secs(5);

        let mut saw_protocol_error = false;
        for _ in 0..3 {
            match subscription.events().recv_timeout(timeout) {
                Ok(ChannelEvent::Status(ChannelStatus::ProtocolError(_))) => {
                    saw_protocol_error = true;
                    break;
                }
                Ok(_) => continue,
                Err(_) => break,
            }
        }
        assert!(saw_protocol_error);
        subscription.close();
    }
}

//! TCP session management.
//!
//! A session moves through `Idle → Connecting → Authenticating → Ready →
//! Closed`. Connecting sends a `Pa` packet straight away; the session is
//! ready once the server answers with `As`. A background reader owns the
//! read half for the whole session and dispatches every other server packet
//! to the registered [`PacketHandler`].

use crate::error::ClientError;
use crate::handler::{HandlerSlot, PacketHandler};
use layrz_protocol::packet::{Direction, PaPacket};
use layrz_protocol::{ClientPacket, Decoder, Encoder, ServerPacket, DEFAULT_PORT};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::{oneshot, watch, Mutex};
use tokio::task::JoinHandle;

/// Default read buffer size (4 KiB).
pub const DEFAULT_READ_BUFFER_SIZE: usize = 4 * 1024;

/// Minimum read buffer size (1 KiB).
pub const MIN_READ_BUFFER_SIZE: usize = 1024;

/// Maximum read buffer size (1 MiB).
pub const MAX_READ_BUFFER_SIZE: usize = 1024 * 1024;

/// Default time allowed for the server to acknowledge `Pa`.
pub const DEFAULT_AUTH_TIMEOUT: Duration = Duration::from_secs(60);

/// Default TCP connect timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Connection configuration.
#[derive(Clone)]
pub struct ConnectionConfig {
    /// Server host name or IP address.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Device identifier sent in `Pa`.
    pub ident: String,
    /// Device password sent in `Pa`.
    pub password: String,
    /// TCP connect timeout.
    pub connect_timeout: Duration,
    /// Time allowed between sending `Pa` and receiving `As`.
    pub auth_timeout: Duration,
    /// Read buffer size for socket reads.
    pub read_buffer_size: usize,
}

impl ConnectionConfig {
    pub fn new(
        host: impl Into<String>,
        ident: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_PORT,
            ident: ident.into(),
            password: password.into(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            auth_timeout: DEFAULT_AUTH_TIMEOUT,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_auth_timeout(mut self, timeout: Duration) -> Self {
        self.auth_timeout = timeout;
        self
    }

    pub fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size.clamp(MIN_READ_BUFFER_SIZE, MAX_READ_BUFFER_SIZE);
        self
    }

    /// Returns `host:port`.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("ident", &self.ident)
            .field("password", &"<redacted>")
            .field("connect_timeout", &self.connect_timeout)
            .field("auth_timeout", &self.auth_timeout)
            .field("read_buffer_size", &self.read_buffer_size)
            .finish()
    }
}

/// Lifecycle state of a [`Connection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Authenticating,
    Ready,
    Closed,
}

impl ConnectionState {
    fn is_active(&self) -> bool {
        matches!(
            self,
            ConnectionState::Connecting | ConnectionState::Authenticating | ConnectionState::Ready
        )
    }
}

/// State shared between the connection and its reader task.
struct Shared {
    state: watch::Sender<ConnectionState>,
    handler: HandlerSlot,
    authenticated: AtomicBool,
    auth_signal: parking_lot::Mutex<Option<oneshot::Sender<()>>>,
    disconnect_reason: parking_lot::Mutex<Option<String>>,
}

impl Shared {
    fn new() -> Self {
        let (state, _) = watch::channel(ConnectionState::Idle);
        Self {
            state,
            handler: parking_lot::RwLock::new(None),
            authenticated: AtomicBool::new(false),
            auth_signal: parking_lot::Mutex::new(None),
            disconnect_reason: parking_lot::Mutex::new(None),
        }
    }

    fn set_state(&self, next: ConnectionState) {
        let prev = self.state.send_replace(next);
        if prev != next {
            tracing::debug!("Connection state {:?} -> {:?}", prev, next);
        }
    }

    /// Moves from `from` to `to`; returns false if the state was elsewhere.
    fn advance(&self, from: ConnectionState, to: ConnectionState) -> bool {
        let moved = self.state.send_if_modified(|state| {
            if *state == from {
                *state = to;
                true
            } else {
                false
            }
        });
        if moved {
            tracing::debug!("Connection state {:?} -> {:?}", from, to);
        }
        moved
    }

    /// Marks the session closed, keeping the first recorded reason.
    fn close(&self, reason: impl Into<String>) {
        {
            let mut slot = self.disconnect_reason.lock();
            if slot.is_none() {
                *slot = Some(reason.into());
            }
        }
        self.authenticated.store(false, Ordering::SeqCst);
        // Wakes a pending connect() with a closed channel.
        self.auth_signal.lock().take();
        self.set_state(ConnectionState::Closed);
    }

    fn dispatch(&self, packet: ServerPacket) {
        match packet {
            ServerPacket::As(_) => {
                tracing::debug!("Authentication accepted");
                self.authenticated.store(true, Ordering::SeqCst);
                if let Some(signal) = self.auth_signal.lock().take() {
                    let _ = signal.send(());
                }
            }
            ServerPacket::Au(_) => {
                tracing::warn!("Received deprecated <Au> packet, ignoring");
            }
            packet => {
                let handler = self.handler.read().clone();
                match handler {
                    Some(handler) => handler.handle(packet),
                    None => tracing::debug!("No handler registered, dropping <{}>", packet.tag()),
                }
            }
        }
    }
}

/// A TCP session with a Layrz server.
pub struct Connection {
    config: ConnectionConfig,
    /// Write half of the stream, serialized across senders.
    writer: Mutex<Option<OwnedWriteHalf>>,
    /// Background reader task.
    reader: parking_lot::Mutex<Option<JoinHandle<()>>>,
    shared: Arc<Shared>,
}

impl Connection {
    /// Creates a new connection (not yet connected).
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            config,
            writer: Mutex::new(None),
            reader: parking_lot::Mutex::new(None),
            shared: Arc::new(Shared::new()),
        }
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Registers the handler for inbound server packets, replacing any
    /// previous one. May be called before or after connecting.
    pub fn set_handler(&self, handler: impl PacketHandler + 'static) {
        *self.shared.handler.write() = Some(Arc::new(handler));
    }

    /// Connects, authenticates and starts the background reader.
    ///
    /// Resolves once the server acknowledged the `Pa` packet with `As`, or
    /// fails with [`ClientError::AuthTimeout`] when no `As` arrives within
    /// the configured authentication timeout.
    pub async fn connect(&self) -> Result<(), ClientError> {
        if self.state().is_active() {
            return Err(ClientError::AlreadyConnected);
        }

        *self.shared.disconnect_reason.lock() = None;
        self.shared.authenticated.store(false, Ordering::SeqCst);
        self.shared.set_state(ConnectionState::Connecting);

        let addr = self.config.addr();
        tracing::debug!("Connecting to {}...", addr);

        let stream = match tokio::time::timeout(
            self.config.connect_timeout,
            TcpStream::connect(addr.as_str()),
        )
        .await
        {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                tracing::debug!("Connection failed: {}", e);
                self.shared.close(format!("connect failed: {e}"));
                return Err(ClientError::Io(e));
            }
            Err(_) => {
                tracing::debug!("Connection timeout");
                self.shared.close("connect timeout");
                return Err(ClientError::ConnectTimeout);
            }
        };

        stream.set_nodelay(true).ok();

        let (read_half, write_half) = stream.into_split();
        *self.writer.lock().await = Some(write_half);

        let (auth_tx, auth_rx) = oneshot::channel();
        *self.shared.auth_signal.lock() = Some(auth_tx);

        let shared = self.shared.clone();
        let buffer_size = self.config.read_buffer_size;
        let task = tokio::spawn(async move {
            read_loop(read_half, shared, buffer_size).await;
        });
        if let Some(previous) = self.reader.lock().replace(task) {
            previous.abort();
        }

        self.shared.set_state(ConnectionState::Authenticating);

        let hello = ClientPacket::Pa(PaPacket::new(
            self.config.ident.clone(),
            self.config.password.clone(),
        ));
        if let Err(e) = self.write_packet(&hello).await {
            self.teardown("failed to send authentication").await;
            return Err(e);
        }
        tracing::debug!("Sent <Pa> as {}, waiting for <As>", self.config.ident);

        match tokio::time::timeout(self.config.auth_timeout, auth_rx).await {
            Ok(Ok(()))
                if self
                    .shared
                    .advance(ConnectionState::Authenticating, ConnectionState::Ready) =>
            {
                tracing::info!("Connected to {} as {}", addr, self.config.ident);
                Ok(())
            }
            Ok(_) => {
                tracing::debug!("Connection closed during authentication");
                self.teardown("connection closed during authentication").await;
                Err(ClientError::ConnectionClosed)
            }
            Err(_) => {
                tracing::warn!(
                    "No <As> from {} within {:?}",
                    addr,
                    self.config.auth_timeout
                );
                self.teardown("authentication timeout").await;
                Err(ClientError::AuthTimeout {
                    waited: self.config.auth_timeout,
                })
            }
        }
    }

    /// Sends a device→server packet.
    ///
    /// Fails with [`ClientError::NotConnected`] unless the session is ready.
    /// Write errors are returned to the caller and not retried.
    pub async fn send(&self, packet: &ClientPacket) -> Result<(), ClientError> {
        if self.state() != ConnectionState::Ready {
            return Err(ClientError::NotConnected);
        }
        self.write_packet(packet).await?;
        tracing::debug!("Sent <{}>", packet.tag());
        Ok(())
    }

    async fn write_packet(&self, packet: &ClientPacket) -> Result<(), ClientError> {
        let encoded = Encoder::encode_client(packet);
        let mut writer_guard = self.writer.lock().await;
        let writer = writer_guard.as_mut().ok_or(ClientError::NotConnected)?;
        writer.write_all(&encoded).await?;
        writer.flush().await?;
        Ok(())
    }

    /// Returns the current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        *self.shared.state.borrow()
    }

    /// Returns whether the session is authenticated and ready to send.
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Ready
    }

    /// Returns whether the server has accepted the credentials.
    pub fn is_authenticated(&self) -> bool {
        self.shared.authenticated.load(Ordering::SeqCst)
    }

    /// Why the session ended, once it has.
    pub fn disconnect_reason(&self) -> Option<String> {
        self.shared.disconnect_reason.lock().clone()
    }

    /// Resolves when the session reaches [`ConnectionState::Closed`].
    ///
    /// A connection that was never opened has no session to wait on and
    /// resolves immediately.
    pub async fn closed(&self) {
        let mut rx = self.shared.state.subscribe();
        if *rx.borrow_and_update() == ConnectionState::Idle {
            return;
        }
        let _ = rx.wait_for(|state| *state == ConnectionState::Closed).await;
    }

    /// Closes the connection.
    ///
    /// Safe to call while a `send` is in flight: the write half is taken
    /// under the same lock that serializes writes. Closing a session that
    /// already ended only releases its stream.
    pub async fn close(&self) -> Result<(), ClientError> {
        if self.state() == ConnectionState::Idle {
            return Err(ClientError::NotConnected);
        }
        tracing::debug!("Closing connection...");
        self.teardown("closed by client").await;
        tracing::debug!("Connection closed");
        Ok(())
    }

    async fn teardown(&self, reason: &str) {
        self.shared.close(reason);

        if let Some(mut writer) = self.writer.lock().await.take() {
            let _ = writer.shutdown().await;
        }
        if let Some(task) = self.reader.lock().take() {
            task.abort();
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if let Some(task) = self.reader.lock().take() {
            task.abort();
        }
    }
}

/// Reads the stream until EOF or error, dispatching every decoded packet.
///
/// Envelopes that fail to decode are logged and skipped; later envelopes in
/// the same read are still processed. The session is marked closed when the
/// loop ends.
async fn read_loop<R>(mut reader: R, shared: Arc<Shared>, buffer_size: usize)
where
    R: AsyncRead + Unpin,
{
    tracing::debug!("read_loop started");
    let mut decoder = Decoder::new().for_direction(Direction::ServerToDevice);
    let mut buf = vec![0u8; buffer_size];

    let reason = loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) => {
                tracing::debug!("read_loop: connection closed by server");
                break "connection closed by server".to_string();
            }
            Ok(n) => n,
            Err(e) => {
                tracing::warn!("read_loop: read error: {}", e);
                break format!("read error: {e}");
            }
        };

        tracing::trace!("read_loop: received {} bytes", n);
        decoder.extend(&buf[..n]);

        loop {
            match decoder.decode_server_packet() {
                Ok(Some(packet)) => {
                    tracing::debug!("read_loop: received <{}>", packet.tag());
                    shared.dispatch(packet);
                }
                Ok(None) => break,
                Err(e) => tracing::warn!("read_loop: skipping envelope: {}", e),
            }
        }
    };

    shared.close(reason);
}

#[cfg(test)]
mod tests {
    use super::*;
    use layrz_protocol::packet::{AoPacket, ArPacket, AsPacket, PacketBody, PrPacket};
    use layrz_protocol::{Packet, Tag};
    use tokio::io::{AsyncBufReadExt, BufReader};
    use tokio::net::TcpListener;
    use tokio::sync::mpsc;

    const AS: &[u8] = b"<As>;7F28</As>\r\n";

    fn recording_handler(shared: &Shared) -> mpsc::UnboundedReceiver<ServerPacket> {
        let (tx, rx) = mpsc::unbounded_channel();
        *shared.handler.write() = Some(Arc::new(move |packet: ServerPacket| {
            let _ = tx.send(packet);
        }));
        rx
    }

    fn ar(reason: &str) -> String {
        ArPacket {
            reason: reason.to_string(),
        }
        .to_packet()
    }

    async fn listener() -> (TcpListener, u16) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        (listener, port)
    }

    fn test_config(port: u16) -> ConnectionConfig {
        ConnectionConfig::new("127.0.0.1", "device-1", "secret")
            .with_port(port)
            .with_auth_timeout(Duration::from_millis(300))
    }

    #[test]
    fn test_config_defaults() {
        let config = ConnectionConfig::new("layrz.example", "dev", "pw");
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.read_buffer_size, DEFAULT_READ_BUFFER_SIZE);
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.auth_timeout, Duration::from_secs(60));
        assert_eq!(config.addr(), "layrz.example:5000");
    }

    #[test]
    fn test_config_buffer_clamping() {
        let config = ConnectionConfig::new("h", "d", "p").with_read_buffer_size(100);
        assert_eq!(config.read_buffer_size, MIN_READ_BUFFER_SIZE);

        let config = ConnectionConfig::new("h", "d", "p").with_read_buffer_size(10 * 1024 * 1024);
        assert_eq!(config.read_buffer_size, MAX_READ_BUFFER_SIZE);
    }

    #[test]
    fn test_config_debug_redacts_password() {
        let config = ConnectionConfig::new("h", "d", "hunter2");
        let debug = format!("{:?}", config);
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("<redacted>"));
    }

    #[tokio::test]
    async fn test_send_before_connect() {
        let conn = Connection::new(ConnectionConfig::new("127.0.0.1", "d", "p"));
        assert_eq!(conn.state(), ConnectionState::Idle);
        assert!(matches!(
            conn.send(&ClientPacket::Pr(PrPacket)).await,
            Err(ClientError::NotConnected)
        ));
        assert!(matches!(conn.close().await, Err(ClientError::NotConnected)));
    }

    #[tokio::test]
    async fn test_read_loop_fragmented_and_coalesced() {
        let shared = Arc::new(Shared::new());
        let mut packets = recording_handler(&shared);
        let (mut server, client) = tokio::io::duplex(64);

        let task = tokio::spawn(read_loop(client, shared.clone(), MIN_READ_BUFFER_SIZE));

        let first = ar("first");
        let (head, tail) = first.split_at(3);
        server.write_all(head.as_bytes()).await.unwrap();
        server.flush().await.unwrap();
        tokio::task::yield_now().await;
        server.write_all(tail.as_bytes()).await.unwrap();

        let both = format!("\r\n{}\r\n{}\r\n", ar("second"), ar("third"));
        server.write_all(both.as_bytes()).await.unwrap();

        for expected in ["first", "second", "third"] {
            match packets.recv().await.unwrap() {
                ServerPacket::Ar(p) => assert_eq!(p.reason, expected),
                other => panic!("unexpected packet {:?}", other),
            }
        }

        drop(server);
        task.await.unwrap();
        assert_eq!(*shared.state.borrow(), ConnectionState::Closed);
        assert_eq!(
            shared.disconnect_reason.lock().as_deref(),
            Some("connection closed by server")
        );
    }

    #[tokio::test]
    async fn test_read_loop_skips_bad_envelope() {
        let shared = Arc::new(Shared::new());
        let mut packets = recording_handler(&shared);
        let (mut server, client) = tokio::io::duplex(1024);

        let task = tokio::spawn(read_loop(client, shared.clone(), MIN_READ_BUFFER_SIZE));

        let batch = format!("<Ar>oops;0000</Ar><Pr>;7F28</Pr>{}", ar("ok"));
        server.write_all(batch.as_bytes()).await.unwrap();

        match packets.recv().await.unwrap() {
            ServerPacket::Ar(p) => assert_eq!(p.reason, "ok"),
            other => panic!("unexpected packet {:?}", other),
        }

        drop(server);
        task.await.unwrap();
        assert!(packets.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_read_loop_consumes_auth_packets() {
        let shared = Arc::new(Shared::new());
        let mut packets = recording_handler(&shared);
        let (tx, rx) = oneshot::channel();
        *shared.auth_signal.lock() = Some(tx);

        let (mut server, client) = tokio::io::duplex(1024);
        let task = tokio::spawn(read_loop(client, shared.clone(), MIN_READ_BUFFER_SIZE));

        let batch = format!("<Au>;7F28</Au>{}", String::from_utf8_lossy(AS));
        server.write_all(batch.as_bytes()).await.unwrap();

        rx.await.unwrap();
        assert!(shared.authenticated.load(Ordering::SeqCst));

        drop(server);
        task.await.unwrap();
        assert!(packets.try_recv().is_err());
    }

    /// Accepts one client, checks its `Pa`, then replays `replies`.
    async fn fake_server(listener: TcpListener, replies: Vec<u8>) -> Vec<Packet> {
        let (socket, _) = listener.accept().await.unwrap();
        let (read_half, mut write_half) = socket.into_split();
        let mut lines = BufReader::new(read_half).lines();

        let hello = lines.next_line().await.unwrap().unwrap();
        let hello = Packet::decode(hello.trim_end()).unwrap();
        assert_eq!(hello.tag(), Tag::Pa);

        write_half.write_all(&replies).await.unwrap();

        let mut received = vec![hello];
        while let Ok(Some(line)) = lines.next_line().await {
            received.push(Packet::decode(line.trim_end()).unwrap());
        }
        received
    }

    #[tokio::test]
    async fn test_connect_handshake_and_send() {
        let (listener, port) = listener().await;
        let mut replies = AS.to_vec();
        replies.extend_from_slice(ar("welcome").as_bytes());
        let server = tokio::spawn(fake_server(listener, replies));

        let conn = Connection::new(test_config(port));
        let (tx, mut rx) = mpsc::unbounded_channel();
        conn.set_handler(move |packet: ServerPacket| {
            let _ = tx.send(packet);
        });

        tokio_test::assert_ok!(conn.connect().await);
        assert_eq!(conn.state(), ConnectionState::Ready);
        assert!(conn.is_authenticated());
        assert!(matches!(
            conn.connect().await,
            Err(ClientError::AlreadyConnected)
        ));

        assert_eq!(rx.recv().await.unwrap().tag(), Tag::Ar);

        conn.send(&ClientPacket::Pr(PrPacket)).await.unwrap();
        conn.close().await.unwrap();
        assert_eq!(conn.state(), ConnectionState::Closed);
        assert_eq!(conn.disconnect_reason().as_deref(), Some("closed by client"));

        let received = server.await.unwrap();
        let tags: Vec<Tag> = received.iter().map(Packet::tag).collect();
        assert_eq!(tags, vec![Tag::Pa, Tag::Pr]);
        match &received[0] {
            Packet::Client(ClientPacket::Pa(pa)) => {
                assert_eq!(pa.ident, "device-1");
                assert_eq!(pa.password, "secret");
            }
            other => panic!("unexpected packet {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_read_loop_resyncs_after_unterminated_tag() {
        let shared = Arc::new(Shared::new());
        let mut packets = recording_handler(&shared);
        let (mut server, client) = tokio::io::duplex(1024);

        let task = tokio::spawn(read_loop(client, shared.clone(), MIN_READ_BUFFER_SIZE));

        // A truncated Ar is cut off by the next packet.
        let batch = format!("<Ar>cut sho\r\n{}", ar("whole"));
        server.write_all(batch.as_bytes()).await.unwrap();

        match packets.recv().await.unwrap() {
            ServerPacket::Ar(p) => assert_eq!(p.reason, "whole"),
            other => panic!("unexpected packet {:?}", other),
        }

        drop(server);
        task.await.unwrap();
        assert!(packets.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_handshake_survives_stray_tag() {
        let (listener, port) = listener().await;
        let mut replies = b"<Hi>\r\n".to_vec();
        replies.extend_from_slice(AS);
        let server = tokio::spawn(fake_server(listener, replies));

        let conn = Connection::new(test_config(port));
        tokio_test::assert_ok!(conn.connect().await);
        assert_eq!(conn.state(), ConnectionState::Ready);

        conn.close().await.unwrap();
        let received = server.await.unwrap();
        assert_eq!(received.len(), 1);
    }

    #[tokio::test]
    async fn test_closed_resolves_when_never_opened() {
        let conn = Connection::new(ConnectionConfig::new("127.0.0.1", "d", "p"));
        tokio::time::timeout(Duration::from_secs(1), conn.closed())
            .await
            .unwrap();
        assert_eq!(conn.state(), ConnectionState::Idle);
    }

    #[tokio::test]
    async fn test_auth_timeout() {
        let (listener, port) = listener().await;
        // Server stays silent after the Pa, except for a deprecated Au.
        let server = tokio::spawn(fake_server(listener, b"<Au>;7F28</Au>\r\n".to_vec()));

        let conn = Connection::new(test_config(port));
        let err = conn.connect().await.unwrap_err();
        assert!(matches!(err, ClientError::AuthTimeout { waited } if waited == Duration::from_millis(300)));
        assert_eq!(conn.state(), ConnectionState::Closed);
        assert!(!conn.is_authenticated());
        assert_eq!(
            conn.disconnect_reason().as_deref(),
            Some("authentication timeout")
        );

        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_server_closes_during_auth() {
        let (listener, port) = listener().await;
        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            drop(socket);
        });

        let conn = Connection::new(test_config(port).with_auth_timeout(Duration::from_secs(5)));
        let err = conn.connect().await.unwrap_err();
        // Depending on timing the Pa write itself may fail.
        assert!(
            matches!(err, ClientError::ConnectionClosed | ClientError::Io(_)),
            "{:?}",
            err
        );
        assert_eq!(conn.state(), ConnectionState::Closed);
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_closed_resolves_on_server_disconnect() {
        let (listener, port) = listener().await;
        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let (read_half, mut write_half) = socket.into_split();
            let mut lines = BufReader::new(read_half).lines();

            lines.next_line().await.unwrap().unwrap();
            write_half.write_all(AS).await.unwrap();

            // Acknowledge the first packet, then hang up.
            lines.next_line().await.unwrap().unwrap();
            let ack = AoPacket {
                timestamp: chrono::DateTime::<chrono::Utc>::from_timestamp(1_735_689_600, 0)
                    .unwrap(),
            };
            write_half.write_all(ack.to_packet().as_bytes()).await.unwrap();
        });

        let conn = Connection::new(test_config(port));
        let (tx, mut rx) = mpsc::unbounded_channel();
        conn.set_handler(move |packet: ServerPacket| {
            let _ = tx.send(packet.tag());
        });
        conn.connect().await.unwrap();
        conn.send(&ClientPacket::Pr(PrPacket)).await.unwrap();
        server.await.unwrap();

        tokio::time::timeout(Duration::from_secs(5), conn.closed())
            .await
            .unwrap();
        assert_eq!(rx.recv().await, Some(Tag::Ao));
        assert_eq!(conn.state(), ConnectionState::Closed);
        assert_eq!(
            conn.disconnect_reason().as_deref(),
            Some("connection closed by server")
        );
        assert!(matches!(
            conn.send(&ClientPacket::Pr(PrPacket)).await,
            Err(ClientError::NotConnected)
        ));
        // Closing an already closed session is a no-op.
        assert!(conn.close().await.is_ok());
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let (listener, port) = listener().await;
        drop(listener);

        let conn = Connection::new(test_config(port));
        assert!(matches!(conn.connect().await, Err(ClientError::Io(_))));
        assert_eq!(conn.state(), ConnectionState::Closed);
    }

    #[test]
    fn test_dispatch_without_handler() {
        let shared = Shared::new();
        shared.dispatch(ServerPacket::Ar(ArPacket {
            reason: "nobody listening".to_string(),
        }));
        shared.dispatch(ServerPacket::As(AsPacket));
        assert!(shared.authenticated.load(Ordering::SeqCst));
    }
}

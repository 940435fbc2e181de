//! Client-side byte transport: plain TCP or TLS over TCP.
//!
//! Every operation is non-blocking. A socket `WouldBlock` surfaces as a
//! distinct status so the caller can clear its readiness flag and wait for
//! the next edge.

use std::io::{self, Read, Write};
use std::net::Shutdown;

use mio::net::TcpStream;
use rustls::ServerConnection;

/// Result of one handshake step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeStatus {
    /// Handshake finished and its final flight is flushed.
    Complete,
    /// Records were consumed without hitting `WouldBlock`; step again.
    Progress,
    /// The socket has nothing more to read.
    WantRead,
    /// The socket cannot accept more handshake output.
    WantWrite,
}

/// Result of one plaintext read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadStatus {
    Data(usize),
    /// Peer closed its side, cleanly or not.
    Closed,
    /// The socket returned `WouldBlock`.
    Blocked,
    /// Socket bytes were consumed but produced no plaintext yet.
    Pending,
}

/// Result of pushing buffered TLS records to the socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushStatus {
    Done,
    Blocked,
}

pub(crate) fn would_block(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::WouldBlock
}

fn tls_error(err: rustls::Error) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, err)
}

/// The client side of a proxied connection.
#[derive(Debug)]
pub struct ClientTransport {
    stream: TcpStream,
    tls: Option<ServerConnection>,
}

impl ClientTransport {
    pub fn plain(stream: TcpStream) -> Self {
        Self { stream, tls: None }
    }

    pub fn tls(stream: TcpStream, session: ServerConnection) -> Self {
        Self {
            stream,
            tls: Some(session),
        }
    }

    pub fn is_tls(&self) -> bool {
        self.tls.is_some()
    }

    /// Socket handle for multiplexer registration.
    pub fn source(&mut self) -> &mut TcpStream {
        &mut self.stream
    }

    pub fn is_handshaking(&self) -> bool {
        self.tls.as_ref().is_some_and(|tls| tls.is_handshaking())
    }

    /// TLS output is buffered and waiting for socket space.
    pub fn has_pending_output(&self) -> bool {
        self.tls.as_ref().is_some_and(|tls| tls.wants_write())
    }

    /// Negotiated protocol version and cipher suite, once known.
    pub fn session_description(&self) -> Option<(String, String)> {
        let tls = self.tls.as_ref()?;
        let version = tls.protocol_version()?;
        let suite = tls.negotiated_cipher_suite()?;
        Some((format!("{version:?}"), format!("{:?}", suite.suite())))
    }

    /// Advance the TLS handshake as far as the socket allows without
    /// blocking. Plain transports are always complete.
    pub fn handshake_step(&mut self) -> io::Result<HandshakeStatus> {
        let Some(tls) = self.tls.as_mut() else {
            return Ok(HandshakeStatus::Complete);
        };

        if flush_records(tls, &mut self.stream)? == FlushStatus::Blocked {
            return Ok(HandshakeStatus::WantWrite);
        }
        if !tls.is_handshaking() {
            return Ok(HandshakeStatus::Complete);
        }

        match tls.read_tls(&mut self.stream) {
            Ok(0) => {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "peer closed during TLS handshake",
                ))
            }
            Ok(_) => {}
            Err(e) if would_block(&e) => return Ok(HandshakeStatus::WantRead),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => return Ok(HandshakeStatus::Progress),
            Err(e) => return Err(e),
        }

        if let Err(e) = tls.process_new_packets() {
            // Best effort: deliver the alert before the caller closes.
            let _ = tls.write_tls(&mut self.stream);
            return Err(tls_error(e));
        }

        if flush_records(tls, &mut self.stream)? == FlushStatus::Blocked {
            return Ok(HandshakeStatus::WantWrite);
        }
        if tls.is_handshaking() {
            Ok(HandshakeStatus::Progress)
        } else {
            Ok(HandshakeStatus::Complete)
        }
    }

    /// Read decrypted application bytes into `buf`.
    pub fn read_plaintext(&mut self, buf: &mut [u8]) -> io::Result<ReadStatus> {
        let Some(tls) = self.tls.as_mut() else {
            return match self.stream.read(buf) {
                Ok(0) => Ok(ReadStatus::Closed),
                Ok(n) => Ok(ReadStatus::Data(n)),
                Err(e) if would_block(&e) => Ok(ReadStatus::Blocked),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => Ok(ReadStatus::Pending),
                Err(e) => Err(e),
            };
        };

        // Plaintext already decrypted by an earlier step.
        match tls.reader().read(buf) {
            Ok(0) => return Ok(ReadStatus::Closed),
            Ok(n) => return Ok(ReadStatus::Data(n)),
            Err(e) if would_block(&e) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(ReadStatus::Closed),
            Err(e) => return Err(e),
        }

        match tls.read_tls(&mut self.stream) {
            Ok(0) => return Ok(ReadStatus::Closed),
            Ok(_) => {}
            Err(e) if would_block(&e) => return Ok(ReadStatus::Blocked),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => return Ok(ReadStatus::Pending),
            Err(e) => return Err(e),
        }

        let state = match tls.process_new_packets() {
            Ok(state) => state,
            Err(e) => {
                let _ = tls.write_tls(&mut self.stream);
                return Err(tls_error(e));
            }
        };

        if state.plaintext_bytes_to_read() > 0 {
            let n = tls.reader().read(buf)?;
            Ok(ReadStatus::Data(n))
        } else if state.peer_has_closed() {
            Ok(ReadStatus::Closed)
        } else {
            Ok(ReadStatus::Pending)
        }
    }

    /// Hand application bytes to the transport.
    ///
    /// Plain transports write straight to the socket and report
    /// `WouldBlock` as an error. TLS transports encrypt into the session
    /// buffer, which may accept fewer bytes than offered, down to zero when
    /// full; [`ClientTransport::flush`] drains it.
    pub fn queue(&mut self, data: &[u8]) -> io::Result<usize> {
        match self.tls.as_mut() {
            None => self.stream.write(data),
            Some(tls) => tls.writer().write(data),
        }
    }

    /// Push buffered TLS records to the socket until done or blocked.
    pub fn flush(&mut self) -> io::Result<FlushStatus> {
        match self.tls.as_mut() {
            None => Ok(FlushStatus::Done),
            Some(tls) => flush_records(tls, &mut self.stream),
        }
    }

    /// Send close-notify if TLS, flush what the socket takes, and shut the
    /// socket down. Errors are ignored; the peer may already be gone.
    pub fn close(&mut self) {
        if let Some(tls) = self.tls.as_mut() {
            tls.send_close_notify();
            let _ = flush_records(tls, &mut self.stream);
        }
        let _ = self.stream.shutdown(Shutdown::Both);
    }
}

fn flush_records(tls: &mut ServerConnection, stream: &mut TcpStream) -> io::Result<FlushStatus> {
    while tls.wants_write() {
        match tls.write_tls(stream) {
            Ok(_) => {}
            Err(e) if would_block(&e) => return Ok(FlushStatus::Blocked),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(FlushStatus::Done)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn pair() -> (ClientTransport, std::net::TcpStream) {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let peer = std::net::TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let (accepted, _) = listener.accept().unwrap();
        accepted.set_nonblocking(true).unwrap();
        (ClientTransport::plain(TcpStream::from_std(accepted)), peer)
    }

    fn read_until_data(transport: &mut ClientTransport, buf: &mut [u8]) -> ReadStatus {
        for _ in 0..200 {
            match transport.read_plaintext(buf).unwrap() {
                ReadStatus::Blocked | ReadStatus::Pending => {
                    std::thread::sleep(Duration::from_millis(5))
                }
                status => return status,
            }
        }
        panic!("no data arrived");
    }

    #[test]
    fn test_plain_transport_has_no_handshake() {
        let (mut transport, _peer) = pair();
        assert!(!transport.is_tls());
        assert!(!transport.is_handshaking());
        assert_eq!(transport.handshake_step().unwrap(), HandshakeStatus::Complete);
        assert!(transport.session_description().is_none());
    }

    #[test]
    fn test_plain_read_reports_blocked_data_and_close() {
        let (mut transport, mut peer) = pair();
        let mut buf = [0u8; 64];
        assert_eq!(transport.read_plaintext(&mut buf).unwrap(), ReadStatus::Blocked);

        peer.write_all(b"hello").unwrap();
        assert_eq!(read_until_data(&mut transport, &mut buf), ReadStatus::Data(5));
        assert_eq!(&buf[..5], b"hello");

        drop(peer);
        assert_eq!(read_until_data(&mut transport, &mut buf), ReadStatus::Closed);
    }

    #[test]
    fn test_plain_queue_writes_through() {
        let (mut transport, mut peer) = pair();
        assert_eq!(transport.queue(b"pong").unwrap(), 4);
        assert_eq!(transport.flush().unwrap(), FlushStatus::Done);
        assert!(!transport.has_pending_output());

        let mut buf = [0u8; 4];
        peer.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"pong");
    }
}

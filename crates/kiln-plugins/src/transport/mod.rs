//! Message framing over a connected stream.
//!
//! The `jsonl` transport frames each message as one line terminated by `\n`.
//! Payloads are compact JSON, which never contains a raw newline, so no
//! escaping is needed. Transports are behind the [`Transport`] trait so the
//! RPC client does not depend on the socket type.

use std::io::{self, BufRead, BufReader, BufWriter, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::time::Duration;

use thiserror::Error;

use crate::handshake::{Endpoint, Network};

/// Transport-layer errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// I/O error during read or write.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The peer closed the connection.
    #[error("connection closed by peer")]
    Closed,

    /// A message to send contained a newline and cannot be framed.
    #[error("message contains a newline and cannot be framed")]
    EmbeddedNewline,
}

/// Sends and receives framed messages.
pub trait Transport: Send {
    /// Sends one message.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Io`] if writing fails.
    fn send(&mut self, message: &[u8]) -> Result<(), TransportError>;

    /// Receives one message, blocking until it is complete.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Closed`] at end of stream and
    /// [`TransportError::Io`] if reading fails.
    fn receive(&mut self) -> Result<Vec<u8>, TransportError>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn send(&mut self, message: &[u8]) -> Result<(), TransportError> {
        (**self).send(message)
    }

    fn receive(&mut self) -> Result<Vec<u8>, TransportError> {
        (**self).receive()
    }
}

/// Newline-delimited framing over any reader/writer pair.
pub struct LineTransport<R, W: Write> {
    reader: BufReader<R>,
    writer: BufWriter<W>,
}

impl<R: Read, W: Write> LineTransport<R, W> {
    /// Creates a transport.
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader: BufReader::new(reader),
            writer: BufWriter::new(writer),
        }
    }
}

impl<R: Read + Send, W: Write + Send> Transport for LineTransport<R, W> {
    fn send(&mut self, message: &[u8]) -> Result<(), TransportError> {
        if message.contains(&b'\n') {
            return Err(TransportError::EmbeddedNewline);
        }
        self.writer.write_all(message)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }

    fn receive(&mut self) -> Result<Vec<u8>, TransportError> {
        let mut line = Vec::new();
        let read = self.reader.read_until(b'\n', &mut line)?;
        if read == 0 {
            return Err(TransportError::Closed);
        }
        while line.last().is_some_and(|byte| matches!(byte, b'\n' | b'\r')) {
            line.pop();
        }
        Ok(line)
    }
}

/// Closes a connection from another thread, unblocking pending reads.
#[derive(Debug)]
pub enum ConnectionCloser {
    /// A TCP connection.
    Tcp(TcpStream),
    /// A unix domain socket connection.
    #[cfg(unix)]
    Unix(std::os::unix::net::UnixStream),
}

impl ConnectionCloser {
    /// Shuts the connection down in both directions. Errors are ignored; the
    /// connection may already be gone.
    pub fn close(&self) {
        let result = match self {
            Self::Tcp(stream) => stream.shutdown(Shutdown::Both),
            #[cfg(unix)]
            Self::Unix(stream) => stream.shutdown(Shutdown::Both),
        };
        drop(result);
    }
}

/// A boxed transport plus the means to close it.
pub type Connection = (Box<dyn Transport>, ConnectionCloser);

/// Connects to `endpoint` with the `jsonl` transport.
///
/// # Errors
///
/// Returns an I/O error when the address is invalid or the connection fails.
pub fn connect(endpoint: &Endpoint, timeout: Duration) -> io::Result<Connection> {
    match endpoint.network {
        Network::Tcp => {
            let address: SocketAddr = endpoint.address.parse().map_err(|_| {
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("invalid TCP address '{}'", endpoint.address),
                )
            })?;
            let stream = TcpStream::connect_timeout(&address, timeout)?;
            stream.set_nodelay(true)?;
            let reader = stream.try_clone()?;
            let closer = stream.try_clone()?;
            Ok((
                Box::new(LineTransport::new(reader, stream)),
                ConnectionCloser::Tcp(closer),
            ))
        }
        #[cfg(unix)]
        Network::Unix => {
            let stream = std::os::unix::net::UnixStream::connect(&endpoint.address)?;
            let reader = stream.try_clone()?;
            let closer = stream.try_clone()?;
            Ok((
                Box::new(LineTransport::new(reader, stream)),
                ConnectionCloser::Unix(closer),
            ))
        }
        #[cfg(not(unix))]
        Network::Unix => Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "unix sockets are not supported on this platform",
        )),
    }
}

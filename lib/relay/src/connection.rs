use crate::buffer::Buffer;
use crate::selector::Selector;
use crate::support::{ErrorType, NetworkError, NetworkResult};
use mio::net::TcpStream;
use slog::{debug, trace, Logger};
use std::io;
use std::net::{Shutdown, SocketAddr};

/// Frames below this length cannot even carry the length prefix and tag.
const MIN_FRAME_SIZE: usize = 8;
/// Upper bound on a single frame; anything larger is a protocol error.
const MAX_FRAME_SIZE: usize = 1 << 20;

/// A framed connection over one nonblocking stream socket.
///
/// Every frame starts with a `u32` byte length that includes the length
/// field itself, followed by an `i32` type tag and the body. The connection
/// buffers whole frames on the way in and drains the outbound buffer
/// opportunistically on the way out; `can_read` and `can_write` expose the
/// two states the session layer cares about.
pub struct Connection {
    stream: TcpStream,
    pub input: Buffer,
    pub output: Buffer,
    log: Logger,
}

impl Connection {
    #[inline]
    pub fn new(stream: TcpStream, log: Logger) -> Connection {
        Connection {
            stream,
            input: Buffer::new(),
            output: Buffer::new(),
            log,
        }
    }

    #[inline]
    pub fn peer_addr(&self) -> io::Result<SocketAddr> {
        self.stream.peer_addr()
    }

    /// True when at least one complete frame is buffered.
    #[inline]
    pub fn can_read(&self) -> bool {
        self.pending_frames() > 0
    }

    /// True when every queued byte has been flushed to the socket.
    #[inline]
    pub fn can_write(&self) -> bool {
        self.output.is_empty()
    }

    #[inline]
    pub fn has_egress(&self) -> bool {
        !self.output.is_empty()
    }

    /// Pull as many bytes as the socket will yield into the inbound buffer.
    /// A clean close by the remote end reports `NetworkError::Closed`.
    pub fn receive(&mut self) -> NetworkResult<usize> {
        match self.input.ingress(&self.stream) {
            Ok(0) => Err(NetworkError::Closed),
            Ok(count) => {
                trace!(self.log, "received"; "bytes" => count, "frames" => self.pending_frames());
                Ok(count)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Flush the outbound buffer until the socket reports would-block or
    /// the buffer is empty.
    pub fn send(&mut self) -> NetworkResult<usize> {
        if self.output.is_empty() {
            return Ok(0);
        }

        match self.output.egress(&self.stream) {
            Ok(count) => {
                trace!(self.log, "sent"; "bytes" => count);
                Ok(count)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Count of complete frames currently in the inbound buffer.
    pub fn pending_frames(&self) -> usize {
        let mut data = self.input.as_slice();
        let mut count = 0;

        while data.len() >= 4 {
            let len = frame_len(data);
            if len < MIN_FRAME_SIZE || len > MAX_FRAME_SIZE || data.len() < len {
                break;
            }
            count += 1;
            data = &data[len..];
        }

        count
    }

    /// Detach the next complete frame, length prefix included. `Ok(None)`
    /// means no complete frame has arrived yet.
    pub fn pop_frame(&mut self) -> NetworkResult<Option<Vec<u8>>> {
        let data = self.input.as_slice();

        if data.len() < 4 {
            return Ok(None);
        }

        let len = frame_len(data);

        if len < MIN_FRAME_SIZE || len > MAX_FRAME_SIZE {
            return Err(NetworkError::Fatal(ErrorType::FrameSize));
        }

        if data.len() < len {
            return Ok(None);
        }

        let frame = data[..len].to_vec();
        self.input.consume(len);

        Ok(Some(frame))
    }

    #[inline]
    pub fn register(&self, selector: &Selector, token: usize) -> io::Result<()> {
        selector.register(&self.stream, token, self.has_egress())
    }

    #[inline]
    pub fn reregister(&self, selector: &Selector, token: usize) -> io::Result<()> {
        selector.reregister(&self.stream, token, self.has_egress())
    }

    #[inline]
    pub fn deregister(&self, selector: &Selector) -> io::Result<()> {
        selector.deregister(&self.stream)
    }

    /// Shut the socket down both ways. Buffered data is discarded.
    pub fn close(&mut self) {
        debug!(self.log, "closing connection";
               "unread" => self.input.len(),
               "unsent" => self.output.len());

        self.input.clear();
        self.output.clear();
        let _ = self.stream.shutdown(Shutdown::Both);
    }
}

#[inline]
fn frame_len(data: &[u8]) -> usize {
    u32::from_le_bytes([data[0], data[1], data[2], data[3]]) as usize
}

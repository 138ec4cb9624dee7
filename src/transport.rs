//! Blocking TCP transport.
//!
//! Every exchange gets its own connection: open, send one request, read, close. A
//! [`Connection`] shuts its socket down when dropped, so no exit path leaks it and at
//! most one connection is open at a time.

use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};

use log::{debug, warn};

use crate::config::ClientConfig;
use crate::protocol::{Packet, Request, FRAME_LEN};
use crate::{Error, Result};

/// Where packets come from. [`Transport`] is the network implementation.
pub trait PacketSource {
    type Stream: Iterator<Item = Result<Packet>>;

    /// Starts a full replay. The returned iterator ends at end of stream and yields
    /// `Err` for frames or reads that fail. A complete frame that fails validation comes
    /// back as [`Error::CorruptFrame`] carrying its sequence field.
    fn stream_all(&self) -> Result<Self::Stream>;

    /// Fetches the packet for one sequence number.
    fn request_one(&self, sequence: i32) -> Result<Packet>;
}

#[derive(Debug, Clone)]
pub struct Transport {
    addr: SocketAddr,
    config: ClientConfig,
}

impl Transport {
    pub fn new(config: ClientConfig) -> Result<Self> {
        let addr = config.resolve()?;
        Ok(Self { addr, config })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Runs one request/response exchange on a fresh connection.
    fn exchange<T>(
        &self,
        request: Request,
        f: impl FnOnce(&mut Connection) -> Result<T>,
    ) -> Result<T> {
        let mut conn = Connection::open(self.addr, &self.config, request)?;
        f(&mut conn)
    }
}

impl PacketSource for Transport {
    type Stream = PacketStream;

    fn stream_all(&self) -> Result<PacketStream> {
        let conn = Connection::open(self.addr, &self.config, Request::StreamAll)?;
        Ok(PacketStream {
            conn: Some(conn),
            frames: 0,
        })
    }

    fn request_one(&self, sequence: i32) -> Result<Packet> {
        let request = Request::resume(sequence)?;
        self.exchange(request, |conn| match read_frame(conn)? {
            FrameRead::Frame(frame) => Packet::from_bytes(&frame),
            FrameRead::Eof => Err(Error::Connection(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("server closed without answering sequence {sequence}"),
            ))),
            FrameRead::Short(got) => Err(Error::MalformedFrame(format!(
                "truncated response for sequence {sequence}: {got} of {FRAME_LEN} bytes"
            ))),
        })
    }
}

/// Frames of a stream-all replay, read lazily off one connection.
///
/// The connection closes when the stream ends, fails, or is dropped.
#[derive(Debug)]
pub struct PacketStream {
    conn: Option<Connection>,
    frames: usize,
}

impl PacketStream {
    /// Complete frames read so far.
    pub fn frames(&self) -> usize {
        self.frames
    }
}

impl Iterator for PacketStream {
    type Item = Result<Packet>;

    fn next(&mut self) -> Option<Self::Item> {
        let conn = self.conn.as_mut()?;
        match read_frame(conn) {
            Ok(FrameRead::Frame(frame)) => {
                self.frames += 1;
                Some(Packet::from_bytes(&frame).map_err(|err| match err {
                    Error::MalformedFrame(reason) => Error::CorruptFrame {
                        sequence: Packet::peek_sequence(&frame),
                        reason,
                    },
                    other => other,
                }))
            }
            Ok(FrameRead::Eof) => {
                debug!("stream ended after {} frames", self.frames);
                self.conn = None;
                None
            }
            Ok(FrameRead::Short(got)) => {
                warn!(
                    "stream ended mid-frame after {} frames ({got} of {FRAME_LEN} bytes dropped)",
                    self.frames
                );
                self.conn = None;
                None
            }
            Err(err) => {
                self.conn = None;
                Some(Err(Error::Connection(err)))
            }
        }
    }
}

#[derive(Debug)]
pub(crate) struct Connection {
    stream: TcpStream,
    peer: SocketAddr,
}

impl Connection {
    fn open(addr: SocketAddr, config: &ClientConfig, request: Request) -> Result<Self> {
        let stream = TcpStream::connect_timeout(&addr, config.connect_timeout)?;
        stream.set_read_timeout(Some(config.read_timeout))?;
        stream.set_write_timeout(Some(config.write_timeout))?;
        stream.set_nodelay(true)?;
        let mut conn = Self { stream, peer: addr };
        conn.stream.write_all(&request.to_bytes())?;
        conn.stream.flush()?;
        debug!("sent {:?} request to {}", request.call_type(), conn.peer);
        Ok(conn)
    }
}

impl Read for Connection {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream.read(buf)
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        // The peer may already have closed; nothing to report then.
        let _ = self.stream.shutdown(Shutdown::Both);
        debug!("closed connection to {}", self.peer);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrameRead {
    Frame([u8; FRAME_LEN]),
    /// Clean end of stream on a frame boundary.
    Eof,
    /// End of stream after this many bytes of a frame.
    Short(usize),
}

/// Reads one frame, reassembling it across partial reads.
fn read_frame<R: Read>(reader: &mut R) -> io::Result<FrameRead> {
    let mut buf = [0u8; FRAME_LEN];
    let mut filled = 0;
    while filled < FRAME_LEN {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        }
    }
    Ok(match filled {
        0 => FrameRead::Eof,
        FRAME_LEN => FrameRead::Frame(buf),
        got => FrameRead::Short(got),
    })
}

//! Wire format of the replay protocol.
//!
//! Requests are two bytes: a call type and one argument byte. Every response frame is
//! exactly [`FRAME_LEN`] bytes with big-endian integers:
//!
//! ```text
//! 0..4   symbol    ASCII
//! 4      side      ASCII ('B' / 'S')
//! 5..9   quantity  i32
//! 9..13  price     i32
//! 13..17 sequence  i32
//! ```

use crate::{Error, Result};

pub const FRAME_LEN: usize = 17;
pub const REQUEST_LEN: usize = 2;

const SYMBOL_LEN: usize = 4;
const SIDE_OFFSET: usize = 4;
const QUANTITY_OFFSET: usize = 5;
const PRICE_OFFSET: usize = 9;
const SEQUENCE_OFFSET: usize = 13;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallType {
    /// Replay every packet the server holds, back to back on one connection.
    StreamAll = 1,
    /// Replay the single packet for one sequence number.
    Resume = 2,
}

impl CallType {
    #[inline]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Request {
    StreamAll,
    Resume(u8),
}

impl Request {
    /// Builds a resume request for `sequence`.
    ///
    /// The wire format has one byte for the target, so anything outside `0..=255` is
    /// rejected instead of being truncated onto an unrelated sequence.
    pub fn resume(sequence: i32) -> Result<Self> {
        u8::try_from(sequence)
            .map(Request::Resume)
            .map_err(|_| Error::UnsupportedSequence(sequence))
    }

    pub fn call_type(&self) -> CallType {
        match self {
            Request::StreamAll => CallType::StreamAll,
            Request::Resume(_) => CallType::Resume,
        }
    }

    pub fn to_bytes(&self) -> [u8; REQUEST_LEN] {
        match *self {
            Request::StreamAll => [CallType::StreamAll.as_u8(), 0],
            Request::Resume(seq) => [CallType::Resume.as_u8(), seq],
        }
    }
}

/// One market update as replayed by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Packet {
    symbol: [u8; SYMBOL_LEN],
    side: u8,
    quantity: i32,
    price: i32,
    sequence: i32,
}

impl Packet {
    pub fn new(
        symbol: [u8; SYMBOL_LEN],
        side: u8,
        quantity: i32,
        price: i32,
        sequence: i32,
    ) -> Result<Self> {
        if !symbol.is_ascii() {
            return Err(Error::MalformedFrame(format!(
                "symbol {symbol:02x?} is not ascii"
            )));
        }
        if !side.is_ascii() {
            return Err(Error::MalformedFrame(format!("side 0x{side:02x} is not ascii")));
        }
        Ok(Self {
            symbol,
            side,
            quantity,
            price,
            sequence,
        })
    }

    pub fn symbol(&self) -> String {
        self.symbol.iter().map(|&b| char::from(b)).collect()
    }

    pub fn symbol_bytes(&self) -> [u8; SYMBOL_LEN] {
        self.symbol
    }

    pub fn side(&self) -> char {
        char::from(self.side)
    }

    pub fn quantity(&self) -> i32 {
        self.quantity
    }

    pub fn price(&self) -> i32 {
        self.price
    }

    pub fn sequence(&self) -> i32 {
        self.sequence
    }

    pub fn to_bytes(&self) -> [u8; FRAME_LEN] {
        let mut buf = [0u8; FRAME_LEN];
        buf[0..SIDE_OFFSET].copy_from_slice(&self.symbol);
        buf[SIDE_OFFSET] = self.side;
        buf[QUANTITY_OFFSET..PRICE_OFFSET].copy_from_slice(&self.quantity.to_be_bytes());
        buf[PRICE_OFFSET..SEQUENCE_OFFSET].copy_from_slice(&self.price.to_be_bytes());
        buf[SEQUENCE_OFFSET..FRAME_LEN].copy_from_slice(&self.sequence.to_be_bytes());
        buf
    }

    /// Decodes one response frame. Anything but exactly [`FRAME_LEN`] bytes is rejected;
    /// a short buffer never yields a partial packet.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let frame: &[u8; FRAME_LEN] = bytes.try_into().map_err(|_| {
            Error::MalformedFrame(format!(
                "expected {FRAME_LEN} bytes, got {}",
                bytes.len()
            ))
        })?;
        let symbol = [frame[0], frame[1], frame[2], frame[3]];
        Self::new(
            symbol,
            frame[SIDE_OFFSET],
            be_i32(frame, QUANTITY_OFFSET),
            be_i32(frame, PRICE_OFFSET),
            be_i32(frame, SEQUENCE_OFFSET),
        )
    }

    /// Reads the sequence field without validating the rest of the frame.
    pub fn peek_sequence(frame: &[u8; FRAME_LEN]) -> i32 {
        be_i32(frame, SEQUENCE_OFFSET)
    }
}

#[inline]
fn be_i32(frame: &[u8; FRAME_LEN], offset: usize) -> i32 {
    i32::from_be_bytes([
        frame[offset],
        frame[offset + 1],
        frame[offset + 2],
        frame[offset + 3],
    ])
}

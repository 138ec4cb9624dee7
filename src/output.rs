//! JSON output of the reconstructed packet set.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::protocol::Packet;
use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PacketRecord {
    pub symbol: String,
    pub side: String,
    pub quantity: i32,
    pub price: i32,
    pub sequence: i32,
}

impl From<&Packet> for PacketRecord {
    fn from(packet: &Packet) -> Self {
        Self {
            symbol: packet.symbol(),
            side: packet.side().to_string(),
            quantity: packet.quantity(),
            price: packet.price(),
            sequence: packet.sequence(),
        }
    }
}

pub fn to_writer<W: Write>(writer: W, packets: &[Packet]) -> Result<()> {
    let records: Vec<PacketRecord> = packets.iter().map(PacketRecord::from).collect();
    serde_json::to_writer_pretty(writer, &records).map_err(|err| Error::Output(err.to_string()))
}

/// Writes `packets` as a JSON array, replacing `path` atomically.
pub fn write_json(path: &Path, packets: &[Packet]) -> Result<()> {
    let tmp = path.with_extension("json.tmp");
    let output_err = |err: std::io::Error| Error::Output(format!("{}: {err}", tmp.display()));

    let file = File::create(&tmp).map_err(output_err)?;
    let mut writer = BufWriter::new(file);
    to_writer(&mut writer, packets)?;
    writer.write_all(b"\n").map_err(output_err)?;
    let file = writer
        .into_inner()
        .map_err(|err| Error::Output(format!("{}: {}", tmp.display(), err.error())))?;
    file.sync_all().map_err(output_err)?;
    drop(file);

    fs::rename(&tmp, path)
        .map_err(|err| Error::Output(format!("rename to {}: {err}", path.display())))
}

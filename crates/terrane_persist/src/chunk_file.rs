use std::io::{self, Cursor};

use tracing::info;

use terrane_shared::chunk::ChunkStorage;
use terrane_shared::coords::ChunkCoord;

use crate::compression::{compress_lz4, compress_zstd, decompress_lz4, decompress_zstd, Compression};
use crate::versioning::{migrate_chunk_payload, ChunkDisk, ChunkDiskRef, CURRENT_CHUNK_FORMAT_VERSION};

pub const MAGIC: [u8; 4] = *b"TRCK";
pub const FILE_EXTENSION: &str = "chunk";

const WIRE_VERSION_UNCOMPRESSED: u8 = 1;
const WIRE_VERSION_ZSTD: u8 = 2;
const WIRE_VERSION_LZ4: u8 = 3;

/// What a chunk file says about itself before its voxels are decoded.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ChunkFileHeader {
    pub compression: Compression,
    pub format_version: u32,
    pub stored_len: usize,
    pub payload_len: usize,
}

pub fn file_name(coord: ChunkCoord) -> String {
    format!("c.{}.{}.{FILE_EXTENSION}", coord.x, coord.z)
}

pub fn parse_file_name(name: &str) -> Option<ChunkCoord> {
    let stem = name.strip_prefix("c.")?.strip_suffix(FILE_EXTENSION)?.strip_suffix('.')?;
    let (x, z) = stem.split_once('.')?;
    Some(ChunkCoord::new(x.parse().ok()?, z.parse().ok()?))
}

pub fn encode_chunk(chunk: &ChunkStorage, compression: Compression, zstd_level: i32) -> io::Result<Vec<u8>> {
    let encoded = bincode::serialize(&ChunkDiskRef {
        format_version: CURRENT_CHUNK_FORMAT_VERSION,
        chunk,
    })
    .map_err(|err| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("failed to encode chunk payload: {err}"),
        )
    })?;

    let (wire_version, body) = match compression {
        Compression::None => (WIRE_VERSION_UNCOMPRESSED, encoded),
        Compression::Zstd => (WIRE_VERSION_ZSTD, compress_zstd(&encoded, zstd_level)?),
        Compression::Lz4 => (WIRE_VERSION_LZ4, compress_lz4(&encoded)),
    };

    let mut bytes = Vec::with_capacity(MAGIC.len() + 1 + body.len());
    bytes.extend_from_slice(&MAGIC);
    bytes.push(wire_version);
    bytes.extend_from_slice(&body);
    Ok(bytes)
}

pub fn decode_chunk(bytes: &[u8]) -> io::Result<ChunkStorage> {
    let (_, payload) = unwrap_payload(bytes)?;
    let source_version = decode_format_version(&payload)?;
    let migrated = migrate_chunk_payload(source_version, payload).map_err(|err| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("failed to migrate chunk payload from format v{source_version}: {err}"),
        )
    })?;
    if source_version != CURRENT_CHUNK_FORMAT_VERSION {
        info!(
            "Migrated chunk payload format v{} -> v{}",
            source_version, CURRENT_CHUNK_FORMAT_VERSION
        );
    }

    let disk: ChunkDisk = bincode::deserialize(&migrated).map_err(|err| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("failed to decode chunk payload: {err}"),
        )
    })?;
    Ok(disk.chunk)
}

/// Reads the header and format version without decoding voxels.
pub fn read_header(bytes: &[u8]) -> io::Result<ChunkFileHeader> {
    let (compression, payload) = unwrap_payload(bytes)?;
    Ok(ChunkFileHeader {
        compression,
        format_version: decode_format_version(&payload)?,
        stored_len: bytes.len(),
        payload_len: payload.len(),
    })
}

fn unwrap_payload(bytes: &[u8]) -> io::Result<(Compression, Vec<u8>)> {
    if bytes.len() < MAGIC.len() || bytes[..MAGIC.len()] != MAGIC[..] {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "invalid chunk file magic; expected TRCK",
        ));
    }

    let (wire_version, body) = bytes[MAGIC.len()..].split_first().ok_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidData, "missing chunk wire format version")
    })?;

    match *wire_version {
        WIRE_VERSION_UNCOMPRESSED => Ok((Compression::None, body.to_vec())),
        WIRE_VERSION_ZSTD => {
            let payload = decompress_zstd(body).map_err(|err| {
                io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("failed to decompress chunk payload: {err}"),
                )
            })?;
            Ok((Compression::Zstd, payload))
        }
        WIRE_VERSION_LZ4 => {
            let payload = decompress_lz4(body).map_err(|err| {
                io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("failed to decompress chunk payload: {err}"),
                )
            })?;
            Ok((Compression::Lz4, payload))
        }
        other => Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("unsupported chunk wire format version {other}; expected 1, 2 or 3"),
        )),
    }
}

fn decode_format_version(payload: &[u8]) -> io::Result<u32> {
    let mut cursor = Cursor::new(payload);
    bincode::deserialize_from::<_, u32>(&mut cursor).map_err(|err| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("failed to decode chunk version prefix: {err}"),
        )
    })
}

use serde::{Deserialize, Serialize};
use tracing::info;

use terrane_shared::block::{BlockId, Orientation};
use terrane_shared::chunk::ChunkStorage;
use terrane_shared::coords::ChunkCoord;

/// v1 stored block ids only; v2 adds one orientation code per voxel.
pub const CURRENT_CHUNK_FORMAT_VERSION: u32 = 2;

#[derive(Serialize)]
pub(crate) struct ChunkDiskRef<'a> {
    pub format_version: u32,
    pub chunk: &'a ChunkStorage,
}

#[derive(Deserialize)]
pub(crate) struct ChunkDisk {
    pub format_version: u32,
    pub chunk: ChunkStorage,
}

#[derive(Serialize, Deserialize)]
struct ChunkDiskV1 {
    format_version: u32,
    chunk: ChunkRecordV1,
}

#[derive(Serialize, Deserialize)]
struct ChunkRecordV1 {
    coord: ChunkCoord,
    blocks: Vec<BlockId>,
}

pub fn migrate_chunk_payload(mut version: u32, mut payload: Vec<u8>) -> Result<Vec<u8>, String> {
    if version == CURRENT_CHUNK_FORMAT_VERSION {
        return Ok(payload);
    }

    if version == 0 || version > CURRENT_CHUNK_FORMAT_VERSION {
        return Err(format!(
            "unsupported chunk format version {version}; current version is {CURRENT_CHUNK_FORMAT_VERSION}"
        ));
    }

    while version < CURRENT_CHUNK_FORMAT_VERSION {
        let next_version = version + 1;
        info!("Migrating chunk payload format v{version} -> v{next_version}");
        payload = migrate_one_version(version, payload)?;
        version = next_version;
    }

    Ok(payload)
}

fn migrate_one_version(version: u32, payload: Vec<u8>) -> Result<Vec<u8>, String> {
    match version {
        1 => migrate_chunk_v1_to_v2(payload),
        other => Err(format!(
            "missing migration path for chunk format v{other} -> v{}",
            other + 1
        )),
    }
}

fn migrate_chunk_v1_to_v2(payload: Vec<u8>) -> Result<Vec<u8>, String> {
    let v1: ChunkDiskV1 = bincode::deserialize(&payload)
        .map_err(|err| format!("failed to decode v1 chunk payload: {err}"))?;

    let orientations = vec![Orientation::default().0; v1.chunk.blocks.len()];
    let chunk = ChunkStorage::from_parts(v1.chunk.coord, &v1.chunk.blocks, &orientations)
        .map_err(|err| format!("chunk {:?}: {err}", v1.chunk.coord))?;

    bincode::serialize(&ChunkDiskRef {
        format_version: CURRENT_CHUNK_FORMAT_VERSION,
        chunk: &chunk,
    })
    .map_err(|err| format!("failed to encode migrated v2 payload: {err}"))
}

#[cfg(test)]
pub(crate) fn encode_v1_for_tests(coord: ChunkCoord, blocks: Vec<BlockId>) -> Vec<u8> {
    bincode::serialize(&ChunkDiskV1 {
        format_version: 1,
        chunk: ChunkRecordV1 { coord, blocks },
    })
    .expect("serialize v1 payload")
}

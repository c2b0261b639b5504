use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use terrane_shared::chunk::ChunkStorage;
use terrane_shared::coords::ChunkCoord;

use crate::chunk_file::{decode_chunk, encode_chunk, file_name, parse_file_name};
use crate::compression::{Compression, DEFAULT_ZSTD_LEVEL};
use crate::world_meta::WorldMeta;

pub const CHUNKS_DIR_NAME: &str = "chunks";

/// On-disk layout of one world: `world.toml` plus one file per saved chunk
/// under `chunks/`.
#[derive(Debug, Clone)]
pub struct WorldStore {
    dir: PathBuf,
    chunks_dir: PathBuf,
    compression: Compression,
    zstd_level: i32,
}

impl WorldStore {
    pub fn open(dir: impl AsRef<Path>, compression: Compression) -> io::Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        let chunks_dir = dir.join(CHUNKS_DIR_NAME);
        fs::create_dir_all(&chunks_dir)?;

        Ok(Self {
            dir,
            chunks_dir,
            compression,
            zstd_level: DEFAULT_ZSTD_LEVEL,
        })
    }

    pub fn with_zstd_level(mut self, level: i32) -> Self {
        self.zstd_level = level;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn compression(&self) -> Compression {
        self.compression
    }

    pub fn load_meta(&self) -> io::Result<Option<WorldMeta>> {
        WorldMeta::load(&self.dir)
    }

    pub fn save_meta(&self, meta: &WorldMeta) -> io::Result<()> {
        meta.save(&self.dir)
    }

    pub fn chunk_path(&self, coord: ChunkCoord) -> PathBuf {
        self.chunks_dir.join(file_name(coord))
    }

    /// `Ok(None)` when the chunk was never saved.
    pub fn load_chunk(&self, coord: ChunkCoord) -> io::Result<Option<ChunkStorage>> {
        let path = self.chunk_path(coord);
        if !path.exists() {
            return Ok(None);
        }

        let bytes = fs::read(&path)?;
        let chunk = decode_chunk(&bytes)?;
        if chunk.coord() != coord {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("chunk file {:?} holds chunk {:?}", path, chunk.coord()),
            ));
        }

        debug!("Loaded chunk {:?} from {:?}", coord, path);
        Ok(Some(chunk))
    }

    pub fn save_chunk(&self, chunk: &ChunkStorage) -> io::Result<()> {
        let bytes = encode_chunk(chunk, self.compression, self.zstd_level)?;
        let path = self.chunk_path(chunk.coord());
        write_atomic(&path, &bytes)?;
        debug!("Saved chunk {:?} ({} bytes)", chunk.coord(), bytes.len());
        Ok(())
    }

    /// Coordinates of every chunk file on disk, sorted by (x, z).
    pub fn saved_chunks(&self) -> io::Result<Vec<ChunkCoord>> {
        let mut coords = Vec::new();
        for entry in fs::read_dir(&self.chunks_dir)? {
            let entry = entry?;
            let name = entry.file_name();
            match name.to_str().and_then(parse_file_name) {
                Some(coord) => coords.push(coord),
                None => warn!("Ignoring unexpected file {:?} in chunk directory", name),
            }
        }
        coords.sort_by_key(|coord| (coord.x, coord.z));
        Ok(coords)
    }
}

/// Writes `bytes` beside `path` and renames it into place, so readers see
/// either the old file or the new one.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut tmp_name = path.as_os_str().to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = PathBuf::from(tmp_name);

    fs::write(&tmp_path, bytes)?;
    fs::rename(&tmp_path, path)
}

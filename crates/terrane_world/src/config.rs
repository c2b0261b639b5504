use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use terrane_persist::Compression;
use terrane_shared::biome::BiomeCatalog;
use terrane_shared::coords::CHUNK_HEIGHT_I32;
use terrane_shared::mesh::{AtlasLayout, DEFAULT_ATLAS_TILES_PER_ROW};
use terrane_shared::worldgen::{
    TerrainSettings, DEFAULT_GROUND_OFFSET, DEFAULT_SEA_LEVEL, DEFAULT_WORLD_SIZE_IN_CHUNKS,
};

const MIN_WORLD_SIZE: i32 = 1;
const MAX_WORLD_SIZE: i32 = 4096;
const MIN_VIEW_DISTANCE: i32 = 1;
const MAX_VIEW_DISTANCE: i32 = 32;
const MAX_VIEW_MARGIN: i32 = 8;
const MIN_TICK_RATE: u32 = 1;
const MAX_TICK_RATE: u32 = 240;
const MIN_ZSTD_LEVEL: i32 = 1;
const MAX_ZSTD_LEVEL: i32 = 22;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub world: WorldConfig,
    pub streaming: StreamingConfig,
    pub generation: GenerationConfig,
    pub storage: StorageConfig,
    pub atlas: AtlasConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    pub name: String,
    /// Used only when the world has no saved metadata yet.
    pub seed: Option<u64>,
    pub size_in_chunks: i32,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            name: "world".to_string(),
            seed: None,
            size_in_chunks: DEFAULT_WORLD_SIZE_IN_CHUNKS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamingConfig {
    /// Radius, in chunks, of the circle of active chunks.
    pub view_distance: i32,
    /// Extra ring scanned beyond the view distance so chunks leaving range
    /// get deactivated.
    pub view_margin: i32,
    /// Drain chunk work on a background thread instead of inside `tick`.
    pub threaded: bool,
    pub behaviour_interval_ticks: u64,
    pub tick_rate: u32,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            view_distance: 8,
            view_margin: 2,
            threaded: true,
            behaviour_interval_ticks: 20,
            tick_rate: 20,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub ground_offset: i32,
    pub sea_level: i32,
    /// TOML biome catalog replacing the built-in one.
    pub biomes: Option<PathBuf>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            ground_offset: DEFAULT_GROUND_OFFSET,
            sea_level: DEFAULT_SEA_LEVEL,
            biomes: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub compression: Compression,
    pub zstd_level: i32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            compression: Compression::Zstd,
            zstd_level: terrane_persist::compression::DEFAULT_ZSTD_LEVEL,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AtlasConfig {
    pub tiles_per_row: u16,
}

impl Default for AtlasConfig {
    fn default() -> Self {
        Self {
            tiles_per_row: DEFAULT_ATLAS_TILES_PER_ROW,
        }
    }
}

impl EngineConfig {
    /// Reads `path`, falling back to defaults when the file does not exist.
    pub fn load(path: &Path) -> io::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)?;
        let mut parsed = toml::from_str::<Self>(&contents).map_err(|e| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("failed to deserialize engine config: {e}"),
            )
        })?;
        parsed.validate();
        Ok(parsed)
    }

    /// Clamps values the engine cannot run with, warning about each.
    pub fn validate(&mut self) {
        clamp_field(
            "world.size_in_chunks",
            &mut self.world.size_in_chunks,
            MIN_WORLD_SIZE,
            MAX_WORLD_SIZE,
        );
        clamp_field(
            "streaming.view_distance",
            &mut self.streaming.view_distance,
            MIN_VIEW_DISTANCE,
            MAX_VIEW_DISTANCE,
        );
        clamp_field(
            "streaming.view_margin",
            &mut self.streaming.view_margin,
            0,
            MAX_VIEW_MARGIN,
        );
        clamp_field(
            "streaming.tick_rate",
            &mut self.streaming.tick_rate,
            MIN_TICK_RATE,
            MAX_TICK_RATE,
        );
        clamp_field(
            "streaming.behaviour_interval_ticks",
            &mut self.streaming.behaviour_interval_ticks,
            1,
            u64::MAX,
        );
        clamp_field(
            "generation.ground_offset",
            &mut self.generation.ground_offset,
            1,
            CHUNK_HEIGHT_I32 - 1,
        );
        clamp_field(
            "generation.sea_level",
            &mut self.generation.sea_level,
            0,
            CHUNK_HEIGHT_I32 - 1,
        );
        clamp_field(
            "storage.zstd_level",
            &mut self.storage.zstd_level,
            MIN_ZSTD_LEVEL,
            MAX_ZSTD_LEVEL,
        );
        clamp_field(
            "atlas.tiles_per_row",
            &mut self.atlas.tiles_per_row,
            1,
            u16::MAX,
        );
    }

    pub fn terrain_settings(&self) -> TerrainSettings {
        TerrainSettings {
            world_size_in_chunks: self.world.size_in_chunks,
            ground_offset: self.generation.ground_offset,
            sea_level: self.generation.sea_level,
        }
    }

    pub fn atlas_layout(&self) -> AtlasLayout {
        AtlasLayout {
            tiles_per_row: self.atlas.tiles_per_row,
        }
    }

    /// The configured biome catalog, or the built-in one.
    pub fn load_catalog(&self) -> io::Result<BiomeCatalog> {
        let Some(path) = self.generation.biomes.as_deref() else {
            return Ok(BiomeCatalog::default_catalog());
        };

        let contents = fs::read_to_string(path)?;
        BiomeCatalog::from_toml_str(&contents).map_err(|e| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("failed to load biome catalog {}: {e}", path.display()),
            )
        })
    }
}

fn clamp_field<T>(name: &str, value: &mut T, min: T, max: T)
where
    T: Copy + PartialOrd + std::fmt::Display,
{
    let clamped = if *value < min {
        min
    } else if *value > max {
        max
    } else {
        *value
    };
    if clamped != *value {
        warn!("Config {} = {} is out of range; using {}", name, value, clamped);
        *value = clamped;
    }
}

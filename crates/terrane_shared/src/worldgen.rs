use glam::IVec3;
use serde::{Deserialize, Serialize};

use crate::biome::{Biome, BiomeCatalog};
use crate::block::{BlockId, Orientation};
use crate::coords::{CHUNK_HEIGHT_I32, CHUNK_WIDTH_I32};
use crate::noise_field::NoiseField;
use crate::structure::{queue_structure, StructureRequest};
use crate::voxel_mod::VoxelMod;

pub const DEFAULT_WORLD_SIZE_IN_CHUNKS: i32 = 100;
pub const DEFAULT_GROUND_OFFSET: i32 = 42;
pub const DEFAULT_SEA_LEVEL: i32 = 44;
const FLORA_NOISE_OFFSET: f32 = 123.0;
const SUBSURFACE_DEPTH: i32 = 4;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerrainSettings {
    pub world_size_in_chunks: i32,
    /// Added to the blended biome height.
    pub ground_offset: i32,
    /// Empty space at or below this height fills with water.
    pub sea_level: i32,
}

impl Default for TerrainSettings {
    fn default() -> Self {
        Self {
            world_size_in_chunks: DEFAULT_WORLD_SIZE_IN_CHUNKS,
            ground_offset: DEFAULT_GROUND_OFFSET,
            sea_level: DEFAULT_SEA_LEVEL,
        }
    }
}

impl TerrainSettings {
    pub fn world_size_in_voxels(&self) -> i32 {
        self.world_size_in_chunks * CHUNK_WIDTH_I32
    }

    pub fn contains_column(&self, x: i32, z: i32) -> bool {
        let size = self.world_size_in_voxels();
        (0..size).contains(&x) && (0..size).contains(&z)
    }
}

/// Column-level result of biome selection.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ColumnSample<'a> {
    pub biome: &'a Biome,
    pub biome_index: usize,
    pub terrain_height: i32,
}

/// Pure function from world position to block. Calls with the same seed,
/// catalog and settings always agree.
#[derive(Debug, Clone)]
pub struct TerrainGenerator {
    seed: u64,
    noise: NoiseField,
    catalog: BiomeCatalog,
    settings: TerrainSettings,
}

impl TerrainGenerator {
    pub fn new(seed: u64, catalog: BiomeCatalog, settings: TerrainSettings) -> Self {
        // Fold the full 64-bit seed into Perlin's 32-bit permutation seed.
        let folded = (seed ^ (seed >> 32)) as u32;
        Self {
            seed,
            noise: NoiseField::new(folded),
            catalog,
            settings,
        }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn settings(&self) -> &TerrainSettings {
        &self.settings
    }

    pub fn catalog(&self) -> &BiomeCatalog {
        &self.catalog
    }

    pub fn noise(&self) -> &NoiseField {
        &self.noise
    }

    /// Picks the dominant biome and blends terrain height across every biome
    /// that contributes a positive height.
    pub fn sample_column(&self, x: i32, z: i32) -> ColumnSample<'_> {
        let mut strongest_weight = 0.0f32;
        let mut strongest_index = 0usize;
        let mut sum_of_heights = 0.0f32;
        let mut count = 0u32;

        for (index, biome) in self.catalog.biomes.iter().enumerate() {
            let weight = self.noise.get_2d(x, z, biome.offset, biome.scale);
            if weight > strongest_weight {
                strongest_weight = weight;
                strongest_index = index;
            }

            let height =
                biome.terrain_height * self.noise.get_2d(x, z, 0.0, biome.terrain_scale) * weight;
            if height > 0.0 {
                sum_of_heights += height;
                count += 1;
            }
        }

        let blended = if count > 0 {
            sum_of_heights / count as f32
        } else {
            0.0
        };
        let terrain_height = (blended + self.settings.ground_offset as f32).floor() as i32;

        ColumnSample {
            biome: &self.catalog.biomes[strongest_index],
            biome_index: strongest_index,
            terrain_height,
        }
    }

    pub fn terrain_height(&self, x: i32, z: i32) -> i32 {
        self.sample_column(x, z).terrain_height
    }

    /// Block at `pos`. Multi-voxel structures rooted here are appended to
    /// `mods` instead of being written.
    pub fn generate(&self, pos: IVec3, mods: &mut Vec<VoxelMod>) -> (BlockId, Orientation) {
        let orientation = Orientation::default();

        if !self.settings.contains_column(pos.x, pos.z) || pos.y >= CHUNK_HEIGHT_I32 {
            return (BlockId::NOTHING, orientation);
        }
        if pos.y <= 0 {
            return (BlockId::BEDROCK, orientation);
        }

        let column = self.sample_column(pos.x, pos.z);
        let biome = column.biome;
        let terrain_height = column.terrain_height;

        let mut block = if pos.y == terrain_height {
            biome.surface_block
        } else if pos.y < terrain_height && pos.y > terrain_height - SUBSURFACE_DEPTH {
            biome.subsurface_block
        } else if pos.y > terrain_height {
            if pos.y > self.settings.sea_level {
                return (BlockId::NOTHING, orientation);
            }
            return (BlockId::WATER, orientation);
        } else {
            BlockId::STONE
        };

        if block == BlockId::STONE {
            for lode in &biome.lodes {
                if lode.spans(pos.y)
                    && self
                        .noise
                        .passes_3d(pos, lode.noise_offset, lode.scale, lode.threshold)
                {
                    block = lode.block;
                }
            }
        }

        if pos.y == terrain_height && pos.y > self.settings.sea_level {
            if let Some(flora) = biome.flora.as_ref() {
                let zone = self
                    .noise
                    .get_2d(pos.x, pos.z, FLORA_NOISE_OFFSET, flora.zone_scale);
                if zone > flora.zone_threshold {
                    block = flora.zone_surface_block;
                    let placement =
                        self.noise
                            .get_2d(pos.x, pos.z, FLORA_NOISE_OFFSET, flora.placement_scale);
                    if placement > flora.placement_threshold {
                        let request = StructureRequest {
                            kind: flora.structure,
                            base: pos,
                            min_height: flora.min_height,
                            max_height: flora.max_height,
                            head_size: flora.head_size,
                        };
                        queue_structure(&request, &self.noise, mods);
                    }
                }
            }
        }

        (block, orientation)
    }

    /// Block at `pos` with any structure requests discarded.
    pub fn block_at(&self, pos: IVec3) -> BlockId {
        let mut scratch = Vec::new();
        self.generate(pos, &mut scratch).0
    }
}

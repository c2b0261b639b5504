use glam::IVec3;
use serde::de;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::block::{BlockId, Orientation};
use crate::coords::{
    index_to_local, local_to_index, world_to_local, ChunkCoord, LocalPos, CHUNK_VOLUME,
};
use crate::voxel_mod::VoxelMod;
use crate::worldgen::TerrainGenerator;

pub const MAX_LIGHT: u8 = 15;

/// Per-voxel state. `light` is derived data and is never persisted.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct VoxelState {
    pub id: BlockId,
    pub orientation: Orientation,
    pub light: u8,
}

impl VoxelState {
    pub const NOTHING: Self = Self {
        id: BlockId::NOTHING,
        orientation: Orientation::FRONT,
        light: 0,
    };

    pub const fn new(id: BlockId, orientation: Orientation) -> Self {
        Self {
            id,
            orientation,
            light: 0,
        }
    }

    pub const fn with_light(mut self, light: u8) -> Self {
        self.light = light;
        self
    }
}

impl Default for VoxelState {
    fn default() -> Self {
        Self::NOTHING
    }
}

/// Dense voxel array for one chunk column.
#[derive(Clone, Debug)]
pub struct ChunkStorage {
    coord: ChunkCoord,
    voxels: Box<[VoxelState]>,
    populated: bool,
}

impl ChunkStorage {
    pub fn new(coord: ChunkCoord) -> Self {
        Self {
            coord,
            voxels: vec![VoxelState::NOTHING; CHUNK_VOLUME].into_boxed_slice(),
            populated: false,
        }
    }

    /// Generates a chunk in one step. Structure requests that the generator
    /// emits are appended to `mods`.
    pub fn generated(
        coord: ChunkCoord,
        generator: &TerrainGenerator,
        mods: &mut Vec<VoxelMod>,
    ) -> Self {
        let mut chunk = Self::new(coord);
        chunk.populate(generator, mods);
        chunk
    }

    pub fn coord(&self) -> ChunkCoord {
        self.coord
    }

    pub fn origin(&self) -> IVec3 {
        self.coord.origin()
    }

    pub fn is_populated(&self) -> bool {
        self.populated
    }

    pub fn get(&self, local: LocalPos) -> VoxelState {
        self.voxels[local_to_index(local)]
    }

    pub fn get_mut(&mut self, local: LocalPos) -> &mut VoxelState {
        &mut self.voxels[local_to_index(local)]
    }

    pub fn get_index(&self, index: usize) -> VoxelState {
        self.voxels[index]
    }

    /// Chunk-relative lookup that tolerates out-of-range coordinates.
    pub fn voxel_i32(&self, x: i32, y: i32, z: i32) -> Option<VoxelState> {
        LocalPos::from_i32(x, y, z).map(|local| self.get(local))
    }

    pub fn voxels(&self) -> &[VoxelState] {
        &self.voxels
    }

    pub fn voxels_mut(&mut self) -> &mut [VoxelState] {
        &mut self.voxels
    }

    /// Writes a block and orientation, leaving light untouched. Returns
    /// whether the voxel changed.
    pub fn set_block(&mut self, local: LocalPos, id: BlockId, orientation: Orientation) -> bool {
        let voxel = self.get_mut(local);
        if voxel.id == id && voxel.orientation == orientation {
            return false;
        }
        voxel.id = id;
        voxel.orientation = orientation;
        true
    }

    pub fn populate(&mut self, generator: &TerrainGenerator, mods: &mut Vec<VoxelMod>) {
        let origin = self.origin();
        for (index, voxel) in self.voxels.iter_mut().enumerate() {
            let world = origin + index_to_local(index).as_ivec3();
            let (id, orientation) = generator.generate(world, mods);
            *voxel = VoxelState::new(id, orientation);
        }
        self.populated = true;
    }

    /// Applies `edit` if its position lies in this chunk. Returns whether a
    /// voxel changed; an `Add` over a non-empty voxel is a no-op.
    pub fn apply_mod(&mut self, edit: &VoxelMod) -> bool {
        let Some((coord, local)) = world_to_local(edit.position()) else {
            return false;
        };
        if coord != self.coord {
            return false;
        }

        match *edit {
            VoxelMod::Add {
                block, orientation, ..
            } => {
                if !self.get(local).id.is_nothing() || block.is_nothing() {
                    return false;
                }
                self.set_block(local, block, orientation)
            }
            VoxelMod::Replace {
                block, orientation, ..
            } => self.set_block(local, block, orientation),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (LocalPos, VoxelState)> + '_ {
        self.voxels
            .iter()
            .enumerate()
            .map(|(index, voxel)| (index_to_local(index), *voxel))
    }
}

#[derive(Serialize, Deserialize)]
struct ChunkRecord {
    coord: ChunkCoord,
    blocks: Vec<BlockId>,
    orientations: Vec<u8>,
}

impl Serialize for ChunkStorage {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        ChunkRecord {
            coord: self.coord,
            blocks: self.voxels.iter().map(|voxel| voxel.id).collect(),
            orientations: self.voxels.iter().map(|voxel| voxel.orientation.0).collect(),
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ChunkStorage {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let record = ChunkRecord::deserialize(deserializer)?;
        ChunkStorage::from_parts(record.coord, &record.blocks, &record.orientations)
            .map_err(de::Error::custom)
    }
}

impl ChunkStorage {
    /// Rebuilds a populated chunk from stored ids and orientation codes.
    /// Light starts at zero and must be recomputed.
    pub fn from_parts(
        coord: ChunkCoord,
        blocks: &[BlockId],
        orientations: &[u8],
    ) -> Result<Self, String> {
        if blocks.len() != CHUNK_VOLUME {
            return Err(format!(
                "expected {CHUNK_VOLUME} blocks, got {}",
                blocks.len()
            ));
        }
        if orientations.len() != CHUNK_VOLUME {
            return Err(format!(
                "expected {CHUNK_VOLUME} orientations, got {}",
                orientations.len()
            ));
        }

        let voxels = blocks
            .iter()
            .zip(orientations)
            .map(|(&id, &code)| VoxelState::new(id, Orientation::from_code(code)))
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Ok(Self {
            coord,
            voxels,
            populated: true,
        })
    }
}

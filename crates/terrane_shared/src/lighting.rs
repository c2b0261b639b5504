use tracing::trace;

use crate::block::BlockRegistry;
use crate::chunk::{ChunkStorage, VoxelState, MAX_LIGHT};
use crate::coords::{
    index_to_local, local_to_index, Face, LocalPos, CHUNK_HEIGHT, CHUNK_HEIGHT_I32, CHUNK_VOLUME,
    CHUNK_WIDTH, CHUNK_WIDTH_I32,
};
use crate::worldgen::TerrainGenerator;

/// Upper bound on relaxation sweeps for one chunk.
pub const RELAX_ITERATIONS: usize = 18;

/// Read-only view of the chunks around the one being lit or meshed. Columns
/// with no resident chunk are answered by the terrain generator, without
/// light.
#[derive(Clone, Copy, Default)]
pub struct ChunkNeighbors<'a> {
    pub pos_x: Option<&'a ChunkStorage>,
    pub neg_x: Option<&'a ChunkStorage>,
    pub pos_z: Option<&'a ChunkStorage>,
    pub neg_z: Option<&'a ChunkStorage>,
    pub generator: Option<&'a TerrainGenerator>,
}

impl<'a> ChunkNeighbors<'a> {
    pub fn isolated(generator: Option<&'a TerrainGenerator>) -> Self {
        Self {
            generator,
            ..Self::default()
        }
    }

    /// Voxel at a position relative to `center`'s minimum corner.
    pub fn sample(&self, center: &ChunkStorage, x: i32, y: i32, z: i32) -> VoxelState {
        if y >= CHUNK_HEIGHT_I32 {
            return VoxelState::NOTHING.with_light(MAX_LIGHT);
        }
        if y < 0 {
            return VoxelState::NOTHING;
        }

        let chunk_dx = x.div_euclid(CHUNK_WIDTH_I32);
        let chunk_dz = z.div_euclid(CHUNK_WIDTH_I32);
        let owner = match (chunk_dx, chunk_dz) {
            (0, 0) => Some(center),
            (1, 0) => self.pos_x,
            (-1, 0) => self.neg_x,
            (0, 1) => self.pos_z,
            (0, -1) => self.neg_z,
            _ => None,
        };

        let local_x = x.rem_euclid(CHUNK_WIDTH_I32);
        let local_z = z.rem_euclid(CHUNK_WIDTH_I32);
        if let Some(chunk) = owner {
            if let Some(voxel) = chunk.voxel_i32(local_x, y, local_z) {
                return voxel;
            }
        }

        match self.generator {
            Some(generator) => {
                let world = center.origin() + glam::IVec3::new(x, y, z);
                let mut scratch = Vec::new();
                let (id, orientation) = generator.generate(world, &mut scratch);
                VoxelState::new(id, orientation)
            }
            None => VoxelState::NOTHING,
        }
    }
}

/// Purges light and casts sunlight straight down every column. The first
/// voxel with nonzero opacity is still lit; everything beneath it is dark.
pub fn cast_natural_light(chunk: &mut ChunkStorage, registry: &BlockRegistry) {
    for voxel in chunk.voxels_mut() {
        voxel.light = 0;
    }

    for z in 0..CHUNK_WIDTH {
        for x in 0..CHUNK_WIDTH {
            let mut obstructed = false;
            for y in (0..CHUNK_HEIGHT).rev() {
                let voxel = chunk.get_mut(LocalPos::new(x as u8, y as u8, z as u8));
                if obstructed {
                    voxel.light = 0;
                } else {
                    voxel.light = MAX_LIGHT;
                    obstructed = registry.get(voxel.id).opacity > 0;
                }
            }
        }
    }
}

/// Full relight of `chunk`: natural cast followed by relaxation against
/// neighbouring voxels, including those in adjacent chunks.
pub fn recalculate(chunk: &mut ChunkStorage, registry: &BlockRegistry, neighbors: &ChunkNeighbors) {
    cast_natural_light(chunk, registry);

    let mut updates: Vec<(usize, u8)> = Vec::new();
    for sweep in 0..RELAX_ITERATIONS {
        updates.clear();
        for index in 0..CHUNK_VOLUME {
            if chunk.get_index(index).light != 0 {
                continue;
            }
            let light = brightest_neighbor(chunk, registry, neighbors, index);
            if light > 0 {
                updates.push((index, light));
            }
        }

        if updates.is_empty() {
            break;
        }
        let voxels = chunk.voxels_mut();
        for &(index, light) in &updates {
            voxels[index].light = light;
        }
        if sweep + 1 == RELAX_ITERATIONS {
            trace!(
                "Light relaxation for chunk {:?} stopped after {} sweeps with {} voxels still brightening",
                chunk.coord(),
                RELAX_ITERATIONS,
                updates.len()
            );
        }
    }
}

fn brightest_neighbor(
    chunk: &ChunkStorage,
    registry: &BlockRegistry,
    neighbors: &ChunkNeighbors,
    index: usize,
) -> u8 {
    let pos = index_to_local(index).as_ivec3();
    let mut brightest = 0u8;
    for face in Face::ALL {
        let target = pos + face.offset();
        let neighbor = if let Some(local) = LocalPos::from_i32(target.x, target.y, target.z) {
            chunk.get_index(local_to_index(local))
        } else {
            neighbors.sample(chunk, target.x, target.y, target.z)
        };
        let contribution = if registry.get(neighbor.id).is_solid() {
            neighbor.light.saturating_sub(1)
        } else {
            neighbor.light
        };
        brightest = brightest.max(contribution);
    }
    brightest
}

#[cfg(test)]
mod tests {
    use super::{cast_natural_light, recalculate, ChunkNeighbors};
    use crate::block::{register_default_blocks, BlockId, Orientation};
    use crate::chunk::{ChunkStorage, MAX_LIGHT};
    use crate::coords::{ChunkCoord, LocalPos, CHUNK_HEIGHT, CHUNK_WIDTH};

    fn fill_layer(chunk: &mut ChunkStorage, y: u8, block: BlockId) {
        for z in 0..CHUNK_WIDTH as u8 {
            for x in 0..CHUNK_WIDTH as u8 {
                chunk.set_block(LocalPos::new(x, y, z), block, Orientation::FRONT);
            }
        }
    }

    #[test]
    fn cast_lights_down_to_first_opaque_block() {
        let registry = register_default_blocks();
        let mut chunk = ChunkStorage::new(ChunkCoord::new(0, 0));
        chunk.set_block(LocalPos::new(4, 50, 9), BlockId::STONE, Orientation::FRONT);

        cast_natural_light(&mut chunk, &registry);

        for y in 0..CHUNK_HEIGHT as u8 {
            let light = chunk.get(LocalPos::new(4, y, 9)).light;
            let expected = if y >= 50 { MAX_LIGHT } else { 0 };
            assert_eq!(light, expected, "y = {y}");
        }
        // Neighbouring columns are open to the sky.
        assert_eq!(chunk.get(LocalPos::new(5, 0, 9)).light, MAX_LIGHT);
    }

    #[test]
    fn see_through_blocks_with_zero_opacity_do_not_obstruct() {
        let registry = register_default_blocks();
        let mut chunk = ChunkStorage::new(ChunkCoord::new(0, 0));
        chunk.set_block(LocalPos::new(1, 30, 1), BlockId::GLASS, Orientation::FRONT);
        cast_natural_light(&mut chunk, &registry);
        assert_eq!(chunk.get(LocalPos::new(1, 10, 1)).light, MAX_LIGHT);
    }

    #[test]
    fn relaxation_spreads_light_under_an_overhang() {
        let registry = register_default_blocks();
        let mut chunk = ChunkStorage::new(ChunkCoord::new(0, 0));
        fill_layer(&mut chunk, 0, BlockId::BEDROCK);
        // Roof covering x in 0..8 at y = 10.
        for z in 0..CHUNK_WIDTH as u8 {
            for x in 0..8u8 {
                chunk.set_block(LocalPos::new(x, 10, z), BlockId::STONE, Orientation::FRONT);
            }
        }

        recalculate(&mut chunk, &registry, &ChunkNeighbors::default());

        // Directly beside the open column, air inherits full light unchanged.
        assert_eq!(chunk.get(LocalPos::new(7, 5, 4)).light, MAX_LIGHT);
        // Just under the roof the solid block above leaks one step dimmer.
        assert_eq!(chunk.get(LocalPos::new(0, 9, 4)).light, MAX_LIGHT - 1);
        for y in 1..10u8 {
            for x in 0..8u8 {
                assert!(chunk.get(LocalPos::new(x, y, 4)).light > 0, "x = {x}, y = {y}");
            }
        }
    }

    #[test]
    fn light_fades_with_depth_through_solid_mass() {
        let registry = register_default_blocks();
        let mut chunk = ChunkStorage::new(ChunkCoord::new(0, 0));
        for y in 0..100u8 {
            fill_layer(&mut chunk, y, BlockId::STONE);
        }

        recalculate(&mut chunk, &registry, &ChunkNeighbors::default());

        assert_eq!(chunk.get(LocalPos::new(8, 99, 8)).light, MAX_LIGHT);
        // Each solid hop costs one level, so deep stone stays unlit.
        assert_eq!(chunk.get(LocalPos::new(8, 98, 8)).light, MAX_LIGHT - 1);
        assert_eq!(chunk.get(LocalPos::new(8, 20, 8)).light, 0);
    }

    #[test]
    fn recalculate_is_idempotent() {
        let registry = register_default_blocks();
        let mut chunk = ChunkStorage::new(ChunkCoord::new(0, 0));
        fill_layer(&mut chunk, 0, BlockId::BEDROCK);
        fill_layer(&mut chunk, 40, BlockId::STONE);
        chunk.set_block(LocalPos::new(3, 40, 3), BlockId::NOTHING, Orientation::FRONT);

        let neighbors = ChunkNeighbors::default();
        recalculate(&mut chunk, &registry, &neighbors);
        let first: Vec<u8> = chunk.voxels().iter().map(|voxel| voxel.light).collect();
        recalculate(&mut chunk, &registry, &neighbors);
        let second: Vec<u8> = chunk.voxels().iter().map(|voxel| voxel.light).collect();

        assert_eq!(first, second);
    }

    #[test]
    fn light_crosses_into_a_resident_neighbor() {
        let registry = register_default_blocks();
        let mut chunk = ChunkStorage::new(ChunkCoord::new(0, 0));
        for y in 0..100u8 {
            fill_layer(&mut chunk, y, BlockId::STONE);
        }
        // Carve a pocket against the -X border at depth.
        chunk.set_block(LocalPos::new(0, 20, 5), BlockId::NOTHING, Orientation::FRONT);

        let mut lit_neighbor = ChunkStorage::new(ChunkCoord::new(-1, 0));
        cast_natural_light(&mut lit_neighbor, &registry);

        let neighbors = ChunkNeighbors {
            neg_x: Some(&lit_neighbor),
            ..ChunkNeighbors::default()
        };
        recalculate(&mut chunk, &registry, &neighbors);

        assert_eq!(chunk.get(LocalPos::new(0, 20, 5)).light, MAX_LIGHT);
    }

    #[test]
    fn sample_resolves_vertical_limits_and_missing_columns() {
        let chunk = ChunkStorage::new(ChunkCoord::new(0, 0));
        let neighbors = ChunkNeighbors::default();
        assert_eq!(neighbors.sample(&chunk, 0, CHUNK_HEIGHT as i32, 0).light, MAX_LIGHT);
        assert_eq!(neighbors.sample(&chunk, 0, -1, 0).id, BlockId::NOTHING);
        assert_eq!(neighbors.sample(&chunk, -1, 3, -1).id, BlockId::NOTHING);
    }
}

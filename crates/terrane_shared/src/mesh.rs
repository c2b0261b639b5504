use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};

use crate::block::BlockRegistry;
use crate::chunk::{ChunkStorage, MAX_LIGHT};
use crate::coords::{index_to_local, Face, LocalPos, CHUNK_VOLUME};
use crate::lighting::ChunkNeighbors;

pub const DEFAULT_ATLAS_TILES_PER_ROW: u16 = 16;

#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct MeshVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
    pub color: [f32; 4],
}
const _: [(); 48] = [(); std::mem::size_of::<MeshVertex>()];

/// Geometry for one chunk, in chunk-local space. `origin` is the chunk's
/// world-space minimum corner. Every triangle appears in exactly one of the
/// three index lists.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MeshBuffers {
    pub origin: [f32; 3],
    pub vertices: Vec<[f32; 3]>,
    pub normals: Vec<[f32; 3]>,
    pub uvs: Vec<[f32; 2]>,
    /// Light of the voxel each face looks onto, in the alpha channel.
    pub colors: Vec<[f32; 4]>,
    pub opaque: Vec<u32>,
    pub transparent: Vec<u32>,
    pub liquid: Vec<u32>,
}

impl MeshBuffers {
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    pub fn triangle_count(&self) -> usize {
        (self.opaque.len() + self.transparent.len() + self.liquid.len()) / 3
    }

    /// Packs the per-attribute arrays into one vertex stream for upload.
    pub fn interleaved(&self) -> Vec<MeshVertex> {
        (0..self.vertices.len())
            .map(|i| MeshVertex {
                position: self.vertices[i],
                normal: self.normals[i],
                uv: self.uvs[i],
                color: self.colors[i],
            })
            .collect()
    }
}

/// Square texture atlas of equally sized tiles, indexed row by row from the
/// top-left.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AtlasLayout {
    pub tiles_per_row: u16,
}

impl Default for AtlasLayout {
    fn default() -> Self {
        Self {
            tiles_per_row: DEFAULT_ATLAS_TILES_PER_ROW,
        }
    }
}

impl AtlasLayout {
    pub fn tile_size(&self) -> f32 {
        1.0 / f32::from(self.tiles_per_row.max(1))
    }

    pub fn uv_for(&self, texture: u16, local_uv: [f32; 2]) -> [f32; 2] {
        let per_row = self.tiles_per_row.max(1);
        let size = self.tile_size();
        let row = texture / per_row;
        let column = texture % per_row;

        let x = f32::from(column) * size;
        let y = 1.0 - f32::from(row) * size - size;
        [x + local_uv[0] * size, y + local_uv[1] * size]
    }
}

/// Builds fresh buffers for `chunk`. Only faces that look onto a see-through
/// voxel are emitted; neighbours outside the chunk come from `neighbors`.
pub fn rebuild(
    chunk: &ChunkStorage,
    registry: &BlockRegistry,
    neighbors: &ChunkNeighbors<'_>,
    atlas: AtlasLayout,
) -> MeshBuffers {
    let origin = chunk.origin();
    let mut mesh = MeshBuffers {
        origin: [origin.x as f32, origin.y as f32, origin.z as f32],
        ..MeshBuffers::default()
    };

    for index in 0..CHUNK_VOLUME {
        let voxel = chunk.get_index(index);
        let block = registry.get(voxel.id);
        if !block.is_solid() && !block.is_liquid() {
            continue;
        }

        let pos = index_to_local(index).as_ivec3();
        let template = registry.mesh_for(block);
        let orientation = voxel.orientation;

        for face in Face::ALL {
            let direction = orientation.remap(face);
            let target = pos + direction.offset();
            let neighbor = match LocalPos::from_i32(target.x, target.y, target.z) {
                Some(local) => chunk.get(local),
                None => neighbors.sample(chunk, target.x, target.y, target.z),
            };
            let neighbor_block = registry.get(neighbor.id);
            if !neighbor_block.is_see_through() {
                continue;
            }
            if block.is_liquid() && direction == Face::Top && neighbor_block.is_liquid() {
                continue;
            }

            let face_template = &template.faces[face.index()];
            let light = f32::from(neighbor.light.min(MAX_LIGHT)) / f32::from(MAX_LIGHT);
            let normal = orientation.rotate_normal(face_template.normal);
            let texture = block.texture(face);
            let base = mesh.vertices.len() as u32;

            for vertex in &face_template.vertices {
                let [x, y, z] = orientation.rotate_point(vertex.position);
                mesh.vertices.push([
                    x + pos.x as f32,
                    y + pos.y as f32,
                    z + pos.z as f32,
                ]);
                mesh.normals.push(normal);
                mesh.colors.push([0.0, 0.0, 0.0, light]);
                mesh.uvs.push(if block.is_liquid() {
                    vertex.uv
                } else {
                    atlas.uv_for(texture, vertex.uv)
                });
            }

            let indices = if block.is_liquid() {
                &mut mesh.liquid
            } else if block.is_see_through() {
                &mut mesh.transparent
            } else {
                &mut mesh.opaque
            };
            indices.extend(face_template.triangles.iter().map(|t| base + t));
        }
    }

    mesh
}

/// Latest published buffers for a chunk plus the dirty flag that gates
/// rebuilding. Readers always get a complete buffer set; publishing swaps
/// the shared pointer under a lock.
pub struct PublishedMesh {
    dirty: AtomicBool,
    version: AtomicU64,
    latest: RwLock<Arc<MeshBuffers>>,
}

impl PublishedMesh {
    pub fn new() -> Self {
        Self {
            dirty: AtomicBool::new(true),
            version: AtomicU64::new(0),
            latest: RwLock::new(Arc::new(MeshBuffers::default())),
        }
    }

    pub fn invalidate(&self) {
        self.dirty.store(true, Ordering::Release);
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    /// Number of publishes so far.
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    pub fn latest(&self) -> Arc<MeshBuffers> {
        Arc::clone(&self.latest.read().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn publish(&self, buffers: MeshBuffers) -> Arc<MeshBuffers> {
        let buffers = Arc::new(buffers);
        *self.latest.write().unwrap_or_else(PoisonError::into_inner) = Arc::clone(&buffers);
        self.version.fetch_add(1, Ordering::AcqRel);
        buffers
    }

    /// Runs `build` and publishes its result only when the mesh is stale.
    /// An invalidation that lands while `build` runs keeps the mesh dirty.
    pub fn rebuild_if_dirty<F>(&self, build: F) -> Option<Arc<MeshBuffers>>
    where
        F: FnOnce() -> MeshBuffers,
    {
        if !self.dirty.swap(false, Ordering::AcqRel) {
            return None;
        }
        Some(self.publish(build()))
    }
}

impl Default for PublishedMesh {
    fn default() -> Self {
        Self::new()
    }
}

use glam::IVec3;
use serde::{Deserialize, Serialize};

use crate::block::BlockId;
use crate::noise_field::NoiseField;
use crate::voxel_mod::VoxelMod;

const TREE_HEIGHT_NOISE_OFFSET: f32 = 250.0;
const TREE_HEIGHT_NOISE_SCALE: f32 = 3.0;
const CACTUS_HEIGHT_NOISE_OFFSET: f32 = 23456.0;
const CACTUS_HEIGHT_NOISE_SCALE: f32 = 2.0;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StructureKind {
    Tree,
    Cactus,
}

/// Parameters for one structure rooted at a surface voxel.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct StructureRequest {
    pub kind: StructureKind,
    pub base: IVec3,
    pub min_height: i32,
    pub max_height: i32,
    pub head_size: f32,
}

/// Appends the mods that build `request`. Nothing is written directly, so
/// the voxels land in whichever chunk eventually owns them.
pub fn queue_structure(request: &StructureRequest, noise: &NoiseField, mods: &mut Vec<VoxelMod>) {
    match request.kind {
        StructureKind::Tree => make_tree(request, noise, mods),
        StructureKind::Cactus => make_cactus(request, noise, mods),
    }
}

fn structure_height(request: &StructureRequest, noise: &NoiseField, offset: f32, scale: f32) -> i32 {
    let sample = noise.get_2d(request.base.x, request.base.z, offset, scale);
    let height = (request.max_height as f32 * sample) as i32;
    height.max(request.min_height).min(request.max_height)
}

fn make_tree(request: &StructureRequest, noise: &NoiseField, mods: &mut Vec<VoxelMod>) {
    let base = request.base;
    let height = structure_height(
        request,
        noise,
        TREE_HEIGHT_NOISE_OFFSET,
        TREE_HEIGHT_NOISE_SCALE,
    );

    for i in 0..height {
        mods.push(VoxelMod::replace(base + IVec3::Y * i, BlockId::OAK_LOG));
    }

    let radius = request.head_size.max(0.0);
    let reach = radius.ceil() as i32;
    let head = base + IVec3::Y * (height + radius.floor() as i32);
    let radius_sq = radius * radius;
    for dy in -reach..=reach {
        for dz in -reach..=reach {
            for dx in -reach..=reach {
                let distance_sq = (dx * dx + dy * dy + dz * dz) as f32;
                if distance_sq <= radius_sq {
                    mods.push(VoxelMod::add(head + IVec3::new(dx, dy, dz), BlockId::LEAVES));
                }
            }
        }
    }
}

fn make_cactus(request: &StructureRequest, noise: &NoiseField, mods: &mut Vec<VoxelMod>) {
    let base = request.base;
    let height = structure_height(
        request,
        noise,
        CACTUS_HEIGHT_NOISE_OFFSET,
        CACTUS_HEIGHT_NOISE_SCALE,
    );

    for i in 1..height {
        mods.push(VoxelMod::add(base + IVec3::Y * i, BlockId::CACTUS));
    }
    if height > 0 {
        mods.push(VoxelMod::add(base + IVec3::Y * height, BlockId::CACTUS_TOP));
    }
}

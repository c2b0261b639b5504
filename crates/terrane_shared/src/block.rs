use std::collections::HashMap;

use bitflags::bitflags;
use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};

use crate::coords::Face;

#[repr(transparent)]
#[derive(
    Copy,
    Clone,
    Debug,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Pod,
    Zeroable,
)]
pub struct BlockId(pub u8);

impl BlockId {
    pub const NOTHING: Self = Self(0);
    pub const BEDROCK: Self = Self(1);
    pub const STONE: Self = Self(2);
    pub const GRASS: Self = Self(3);
    pub const SAND: Self = Self(4);
    pub const DIRT: Self = Self(5);
    pub const OAK_LOG: Self = Self(6);
    pub const PLANKS: Self = Self(7);
    pub const BRICKS: Self = Self(8);
    pub const COBBLESTONE: Self = Self(9);
    pub const GLASS: Self = Self(10);
    pub const LEAVES: Self = Self(11);
    pub const CACTUS: Self = Self(12);
    pub const CACTUS_TOP: Self = Self(13);
    pub const WATER: Self = Self(14);
    pub const COAL_ORE: Self = Self(15);
    pub const IRON_ORE: Self = Self(16);
    pub const GRAVEL: Self = Self(17);
    pub const SNOW: Self = Self(18);
    pub const FURNACE: Self = Self(19);

    pub fn is_nothing(self) -> bool {
        self == Self::NOTHING
    }
}

/// Horizontal facing of a block, stored per voxel. Codes match [`Face`]
/// indices; `FRONT` is the unrotated default and the vertical codes behave
/// like it.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Orientation(pub u8);

impl Orientation {
    pub const BACK: Self = Self(0);
    pub const FRONT: Self = Self(1);
    pub const LEFT: Self = Self(4);
    pub const RIGHT: Self = Self(5);

    /// Codes past 5 are treated as the default facing.
    pub fn from_code(code: u8) -> Self {
        if code <= 5 {
            Self(code)
        } else {
            Self::FRONT
        }
    }

    pub fn yaw_degrees(self) -> f32 {
        match self {
            Self::BACK => 180.0,
            Self::RIGHT => 270.0,
            Self::LEFT => 90.0,
            _ => 0.0,
        }
    }

    /// Cosine and sine of the yaw, exact for the four quarter turns.
    pub fn yaw_basis(self) -> (f32, f32) {
        match self {
            Self::BACK => (-1.0, 0.0),
            Self::RIGHT => (0.0, -1.0),
            Self::LEFT => (0.0, 1.0),
            _ => (1.0, 0.0),
        }
    }

    /// Direction a template face actually points once the block is rotated.
    pub fn remap(self, face: Face) -> Face {
        use Face::*;

        match (self, face) {
            (_, Top | Bottom) => face,
            (Self::BACK, Back) => Front,
            (Self::BACK, Front) => Back,
            (Self::BACK, Left) => Right,
            (Self::BACK, Right) => Left,
            (Self::RIGHT, Back) => Right,
            (Self::RIGHT, Front) => Left,
            (Self::RIGHT, Left) => Back,
            (Self::RIGHT, Right) => Front,
            (Self::LEFT, Back) => Left,
            (Self::LEFT, Front) => Right,
            (Self::LEFT, Left) => Front,
            (Self::LEFT, Right) => Back,
            _ => face,
        }
    }

    /// Rotates a template position about the voxel centre.
    pub fn rotate_point(self, point: [f32; 3]) -> [f32; 3] {
        let (cos, sin) = self.yaw_basis();
        let dx = point[0] - 0.5;
        let dz = point[2] - 0.5;
        [
            dx * cos + dz * sin + 0.5,
            point[1],
            -dx * sin + dz * cos + 0.5,
        ]
    }

    pub fn rotate_normal(self, normal: [f32; 3]) -> [f32; 3] {
        let (cos, sin) = self.yaw_basis();
        [
            normal[0] * cos + normal[2] * sin,
            normal[1],
            -normal[0] * sin + normal[2] * cos,
        ]
    }
}

impl Default for Orientation {
    fn default() -> Self {
        Self::FRONT
    }
}

bitflags! {
    #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct BlockFlags: u8 {
        const SOLID = 1 << 0;
        const SEE_THROUGH = 1 << 1;
        const LIQUID = 1 << 2;
        const ACTIVE = 1 << 3;
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Behaviour {
    #[default]
    Inert,
    /// Turns into `decays_to` when covered and spreads onto neighbouring
    /// `spreads_onto` blocks that are open to the sky.
    Grass {
        decays_to: BlockId,
        spreads_onto: BlockId,
    },
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BlockType {
    pub name: String,
    pub flags: BlockFlags,
    pub opacity: u8,
    /// Atlas tile per face, in [`Face`] order.
    pub textures: [u16; 6],
    #[serde(default)]
    pub mesh: usize,
    #[serde(default)]
    pub behaviour: Behaviour,
}

impl BlockType {
    pub fn is_solid(&self) -> bool {
        self.flags.contains(BlockFlags::SOLID)
    }

    pub fn is_see_through(&self) -> bool {
        self.flags.contains(BlockFlags::SEE_THROUGH)
    }

    pub fn is_liquid(&self) -> bool {
        self.flags.contains(BlockFlags::LIQUID)
    }

    pub fn is_active(&self) -> bool {
        self.flags.contains(BlockFlags::ACTIVE)
    }

    pub fn texture(&self, face: Face) -> u16 {
        self.textures[face.index()]
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TemplateVertex {
    pub position: [f32; 3],
    pub uv: [f32; 2],
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FaceTemplate {
    pub vertices: Vec<TemplateVertex>,
    /// Indices into `vertices`.
    pub triangles: Vec<u32>,
    pub normal: [f32; 3],
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BlockMesh {
    pub faces: [FaceTemplate; 6],
}

const CUBE_VERTICES: [[f32; 3]; 8] = [
    [0.0, 0.0, 0.0],
    [1.0, 0.0, 0.0],
    [1.0, 1.0, 0.0],
    [0.0, 1.0, 0.0],
    [0.0, 0.0, 1.0],
    [1.0, 0.0, 1.0],
    [1.0, 1.0, 1.0],
    [0.0, 1.0, 1.0],
];

// Corner order per face; pairs with QUAD_UVS.
const CUBE_FACE_CORNERS: [[usize; 4]; 6] = [
    [0, 3, 1, 2],
    [5, 6, 4, 7],
    [3, 7, 2, 6],
    [1, 5, 0, 4],
    [4, 7, 0, 3],
    [1, 2, 5, 6],
];

const QUAD_UVS: [[f32; 2]; 4] = [[0.0, 0.0], [0.0, 1.0], [1.0, 0.0], [1.0, 1.0]];
const QUAD_TRIANGLES: [u32; 6] = [0, 1, 2, 2, 1, 3];

pub const CUBE_MESH: usize = 0;
pub const COLUMN_MESH: usize = 1;
const COLUMN_INSET: f32 = 1.0 / 16.0;

impl BlockMesh {
    pub fn cube() -> Self {
        Self::with_horizontal_inset(0.0)
    }

    /// Cube whose footprint is shrunk by `inset` on every side, used for
    /// cactus-like columns.
    pub fn with_horizontal_inset(inset: f32) -> Self {
        let build_face = |face: Face| {
            let corners = CUBE_FACE_CORNERS[face.index()];
            let vertices = corners
                .iter()
                .zip(QUAD_UVS)
                .map(|(&corner, uv)| {
                    let [x, y, z] = CUBE_VERTICES[corner];
                    TemplateVertex {
                        position: [
                            x.clamp(inset, 1.0 - inset),
                            y,
                            z.clamp(inset, 1.0 - inset),
                        ],
                        uv,
                    }
                })
                .collect();
            let offset = face.offset();
            FaceTemplate {
                vertices,
                triangles: QUAD_TRIANGLES.to_vec(),
                normal: [offset.x as f32, offset.y as f32, offset.z as f32],
            }
        };

        Self {
            faces: Face::ALL.map(build_face),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BlockRegistry {
    types: Vec<BlockType>,
    by_name: HashMap<String, BlockId>,
    meshes: Vec<BlockMesh>,
}

impl BlockRegistry {
    /// Registry holding only the "nothing" block and the built-in meshes.
    pub fn new() -> Self {
        let mut registry = Self {
            types: Vec::new(),
            by_name: HashMap::new(),
            meshes: vec![BlockMesh::cube(), BlockMesh::with_horizontal_inset(COLUMN_INSET)],
        };
        registry.register(BlockType {
            name: "nothing".to_string(),
            flags: BlockFlags::SEE_THROUGH,
            opacity: 0,
            textures: [0; 6],
            mesh: CUBE_MESH,
            behaviour: Behaviour::Inert,
        });
        registry
    }

    /// Registers `block`, returning the id of an existing entry with the same
    /// name. Returns `None` once every id is taken.
    pub fn register(&mut self, mut block: BlockType) -> Option<BlockId> {
        if let Some(existing) = self.by_name.get(block.name.as_str()) {
            return Some(*existing);
        }

        let id = BlockId(u8::try_from(self.types.len()).ok()?);
        if block.mesh >= self.meshes.len() {
            block.mesh = CUBE_MESH;
        }
        self.by_name.insert(block.name.clone(), id);
        self.types.push(block);
        Some(id)
    }

    pub fn register_mesh(&mut self, mesh: BlockMesh) -> usize {
        self.meshes.push(mesh);
        self.meshes.len() - 1
    }

    /// Unknown ids resolve to the "nothing" entry.
    pub fn get(&self, id: BlockId) -> &BlockType {
        self.types
            .get(usize::from(id.0))
            .unwrap_or(&self.types[usize::from(BlockId::NOTHING.0)])
    }

    pub fn get_by_name(&self, name: &str) -> Option<BlockId> {
        self.by_name.get(name).copied()
    }

    pub fn mesh_for(&self, block: &BlockType) -> &BlockMesh {
        self.meshes
            .get(block.mesh)
            .unwrap_or(&self.meshes[CUBE_MESH])
    }

    pub fn is_known(&self, id: BlockId) -> bool {
        usize::from(id.0) < self.types.len()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (BlockId, &BlockType)> {
        self.types
            .iter()
            .enumerate()
            .map(|(index, block)| (BlockId(index as u8), block))
    }
}

impl Default for BlockRegistry {
    fn default() -> Self {
        Self::new()
    }
}

pub fn register_default_blocks() -> BlockRegistry {
    fn block(name: &str, flags: BlockFlags, opacity: u8, textures: [u16; 6]) -> BlockType {
        BlockType {
            name: name.to_string(),
            flags,
            opacity,
            textures,
            mesh: CUBE_MESH,
            behaviour: Behaviour::Inert,
        }
    }

    fn all(tile: u16) -> [u16; 6] {
        [tile; 6]
    }

    // back, front, top, bottom, left, right
    fn sided(side: u16, top: u16, bottom: u16) -> [u16; 6] {
        [side, side, top, bottom, side, side]
    }

    let solid = BlockFlags::SOLID;
    let glassy = BlockFlags::SOLID | BlockFlags::SEE_THROUGH;

    let mut registry = BlockRegistry::new();

    let defaults = [
        block("bedrock", solid, 15, all(9)),
        block("stone", solid, 15, all(0)),
        BlockType {
            behaviour: Behaviour::Grass {
                decays_to: BlockId::DIRT,
                spreads_onto: BlockId::DIRT,
            },
            ..block("grass", solid | BlockFlags::ACTIVE, 15, sided(2, 7, 1))
        },
        block("sand", solid, 15, all(10)),
        block("dirt", solid, 15, all(1)),
        block("oak_log", solid, 15, sided(5, 6, 6)),
        block("planks", solid, 15, all(4)),
        block("bricks", solid, 15, all(11)),
        block("cobblestone", solid, 15, all(8)),
        block("glass", glassy, 0, all(3)),
        block("leaves", glassy, 3, all(16)),
        BlockType {
            mesh: COLUMN_MESH,
            ..block("cactus", glassy, 8, sided(18, 19, 19))
        },
        BlockType {
            mesh: COLUMN_MESH,
            ..block("cactus_top", glassy, 8, sided(18, 20, 19))
        },
        block(
            "water",
            BlockFlags::LIQUID | BlockFlags::SEE_THROUGH,
            2,
            all(14),
        ),
        block("coal_ore", solid, 15, all(17)),
        block("iron_ore", solid, 15, all(21)),
        block("gravel", solid, 15, all(22)),
        block("snow", solid, 15, sided(23, 24, 1)),
        // back, front, top, bottom, left, right
        block("furnace", solid, 15, [12, 13, 24, 24, 12, 12]),
    ];

    for block in defaults {
        registry.register(block);
    }

    registry
}

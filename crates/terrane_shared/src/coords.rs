use std::ops::{Add, AddAssign, Sub, SubAssign};

use glam::IVec3;
use serde::{Deserialize, Serialize};

pub const CHUNK_WIDTH: usize = 16;
pub const CHUNK_HEIGHT: usize = 128;
pub const CHUNK_VOLUME: usize = CHUNK_WIDTH * CHUNK_HEIGHT * CHUNK_WIDTH;

pub const CHUNK_WIDTH_I32: i32 = CHUNK_WIDTH as i32;
pub const CHUNK_HEIGHT_I32: i32 = CHUNK_HEIGHT as i32;

/// Grid coordinate of a chunk column. Chunks span the full world height, so
/// only x and z are needed.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChunkCoord {
    pub x: i32,
    pub z: i32,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LocalPos {
    pub x: u8,
    pub y: u8,
    pub z: u8,
}

impl ChunkCoord {
    pub const fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }

    /// World position of the chunk's minimum corner.
    pub fn origin(self) -> IVec3 {
        IVec3::new(self.x * CHUNK_WIDTH_I32, 0, self.z * CHUNK_WIDTH_I32)
    }

    pub fn distance_sq(self, other: ChunkCoord) -> i64 {
        let dx = i64::from(self.x - other.x);
        let dz = i64::from(self.z - other.z);
        dx * dx + dz * dz
    }
}

impl Add for ChunkCoord {
    type Output = ChunkCoord;

    fn add(self, rhs: Self) -> Self::Output {
        ChunkCoord {
            x: self.x + rhs.x,
            z: self.z + rhs.z,
        }
    }
}

impl AddAssign for ChunkCoord {
    fn add_assign(&mut self, rhs: Self) {
        self.x += rhs.x;
        self.z += rhs.z;
    }
}

impl Sub for ChunkCoord {
    type Output = ChunkCoord;

    fn sub(self, rhs: Self) -> Self::Output {
        ChunkCoord {
            x: self.x - rhs.x,
            z: self.z - rhs.z,
        }
    }
}

impl SubAssign for ChunkCoord {
    fn sub_assign(&mut self, rhs: Self) {
        self.x -= rhs.x;
        self.z -= rhs.z;
    }
}

impl LocalPos {
    pub const fn new(x: u8, y: u8, z: u8) -> Self {
        Self { x, y, z }
    }

    /// Converts chunk-relative integer coordinates, returning `None` when any
    /// axis falls outside the chunk.
    pub fn from_i32(x: i32, y: i32, z: i32) -> Option<Self> {
        if (0..CHUNK_WIDTH_I32).contains(&x)
            && (0..CHUNK_HEIGHT_I32).contains(&y)
            && (0..CHUNK_WIDTH_I32).contains(&z)
        {
            Some(Self {
                x: x as u8,
                y: y as u8,
                z: z as u8,
            })
        } else {
            None
        }
    }

    pub fn as_ivec3(self) -> IVec3 {
        IVec3::new(i32::from(self.x), i32::from(self.y), i32::from(self.z))
    }

    /// True when the voxel touches the chunk's x or z border.
    pub fn on_horizontal_edge(self) -> bool {
        let last = (CHUNK_WIDTH - 1) as u8;
        self.x == 0 || self.x == last || self.z == 0 || self.z == last
    }
}

/// The six faces of a voxel, in the order meshes, textures and face checks
/// are stored.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Face {
    Back,
    Front,
    Top,
    Bottom,
    Left,
    Right,
}

impl Face {
    pub const ALL: [Face; 6] = [
        Face::Back,
        Face::Front,
        Face::Top,
        Face::Bottom,
        Face::Left,
        Face::Right,
    ];

    /// Faces that lie in the horizontal plane.
    pub const PLANAR: [Face; 4] = [Face::Back, Face::Front, Face::Left, Face::Right];

    pub const fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Face> {
        Face::ALL.get(index).copied()
    }

    pub const fn offset(self) -> IVec3 {
        match self {
            Face::Back => IVec3::new(0, 0, -1),
            Face::Front => IVec3::new(0, 0, 1),
            Face::Top => IVec3::new(0, 1, 0),
            Face::Bottom => IVec3::new(0, -1, 0),
            Face::Left => IVec3::new(-1, 0, 0),
            Face::Right => IVec3::new(1, 0, 0),
        }
    }
}

fn div_rem_floor(value: i32, divisor: i32) -> (i32, i32) {
    let mut q = value / divisor;
    let mut r = value % divisor;
    if r < 0 {
        q -= 1;
        r += divisor;
    }
    (q, r)
}

pub fn chunk_coord_of(world_x: i32, world_z: i32) -> ChunkCoord {
    let (x, _) = div_rem_floor(world_x, CHUNK_WIDTH_I32);
    let (z, _) = div_rem_floor(world_z, CHUNK_WIDTH_I32);
    ChunkCoord { x, z }
}

/// Splits a world position into its chunk column and local position. Returns
/// `None` above or below the world's vertical extent.
pub fn world_to_local(world_pos: IVec3) -> Option<(ChunkCoord, LocalPos)> {
    if !(0..CHUNK_HEIGHT_I32).contains(&world_pos.y) {
        return None;
    }

    let (chunk_x, local_x) = div_rem_floor(world_pos.x, CHUNK_WIDTH_I32);
    let (chunk_z, local_z) = div_rem_floor(world_pos.z, CHUNK_WIDTH_I32);

    Some((
        ChunkCoord {
            x: chunk_x,
            z: chunk_z,
        },
        LocalPos {
            x: local_x as u8,
            y: world_pos.y as u8,
            z: local_z as u8,
        },
    ))
}

pub fn chunk_to_world(coord: ChunkCoord, local: LocalPos) -> IVec3 {
    coord.origin() + local.as_ivec3()
}

pub fn local_to_index(local: LocalPos) -> usize {
    usize::from(local.x)
        + usize::from(local.z) * CHUNK_WIDTH
        + usize::from(local.y) * CHUNK_WIDTH * CHUNK_WIDTH
}

pub fn index_to_local(index: usize) -> LocalPos {
    debug_assert!(index < CHUNK_VOLUME, "chunk index out of bounds: {index}");

    let y = index / (CHUNK_WIDTH * CHUNK_WIDTH);
    let rem = index % (CHUNK_WIDTH * CHUNK_WIDTH);
    let z = rem / CHUNK_WIDTH;
    let x = rem % CHUNK_WIDTH;

    LocalPos {
        x: x as u8,
        y: y as u8,
        z: z as u8,
    }
}

#[cfg(test)]
mod tests {
    use glam::IVec3;

    use super::{
        chunk_coord_of, chunk_to_world, index_to_local, local_to_index, world_to_local,
        ChunkCoord, Face, LocalPos, CHUNK_HEIGHT, CHUNK_VOLUME, CHUNK_WIDTH,
    };

    #[test]
    fn every_index_maps_back_to_itself() {
        for index in 0..CHUNK_VOLUME {
            assert_eq!(local_to_index(index_to_local(index)), index);
        }
    }

    #[test]
    fn chunk_coord_arithmetic_is_component_wise() {
        let a = ChunkCoord::new(10, 4);
        let b = ChunkCoord::new(-3, 1);

        assert_eq!(a + b, ChunkCoord::new(7, 5));
        assert_eq!(a - b, ChunkCoord::new(13, 3));

        let mut c = a;
        c += b;
        assert_eq!(c, ChunkCoord::new(7, 5));
        c -= b;
        assert_eq!(c, a);
        assert_eq!(a.distance_sq(b), 13 * 13 + 3 * 3);
    }

    #[test]
    fn world_to_local_floors_negative_coordinates() {
        let (chunk, local) = world_to_local(IVec3::new(-1, 5, -1)).expect("in vertical range");
        assert_eq!(chunk, ChunkCoord::new(-1, -1));
        assert_eq!(
            local,
            LocalPos::new((CHUNK_WIDTH - 1) as u8, 5, (CHUNK_WIDTH - 1) as u8)
        );

        let (chunk, local) = world_to_local(IVec3::new(16, 0, 33)).expect("in vertical range");
        assert_eq!(chunk, ChunkCoord::new(1, 2));
        assert_eq!(local, LocalPos::new(0, 0, 1));

        let world = IVec3::new(-33, 95, 66);
        let (chunk, local) = world_to_local(world).expect("in vertical range");
        assert_eq!(chunk_to_world(chunk, local), world);
        assert_eq!(chunk_coord_of(-33, 66), chunk);
    }

    #[test]
    fn world_to_local_rejects_out_of_range_heights() {
        assert!(world_to_local(IVec3::new(0, -1, 0)).is_none());
        assert!(world_to_local(IVec3::new(0, CHUNK_HEIGHT as i32, 0)).is_none());
        assert!(world_to_local(IVec3::new(i32::MIN, 3, i32::MAX)).is_some());
    }

    #[test]
    fn local_pos_from_i32_checks_bounds() {
        assert_eq!(LocalPos::from_i32(0, 127, 15), Some(LocalPos::new(0, 127, 15)));
        assert_eq!(LocalPos::from_i32(-1, 0, 0), None);
        assert_eq!(LocalPos::from_i32(0, 128, 0), None);
        assert!(LocalPos::new(0, 40, 7).on_horizontal_edge());
        assert!(!LocalPos::new(3, 40, 7).on_horizontal_edge());
    }

    #[test]
    fn face_offsets_are_opposed_in_pairs() {
        assert_eq!(Face::Back.offset() + Face::Front.offset(), IVec3::ZERO);
        assert_eq!(Face::Top.offset() + Face::Bottom.offset(), IVec3::ZERO);
        assert_eq!(Face::Left.offset() + Face::Right.offset(), IVec3::ZERO);
        for face in Face::ALL {
            assert_eq!(Face::from_index(face.index()), Some(face));
        }
    }
}

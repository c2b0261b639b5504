use glam::IVec3;
use serde::{Deserialize, Serialize};

use crate::block::{BlockId, Orientation};
use crate::coords::{chunk_coord_of, ChunkCoord};

/// A queued single-voxel edit. Mods are applied once by the chunk that owns
/// their position and then dropped.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VoxelMod {
    /// Only fills a voxel that currently holds nothing.
    Add {
        position: IVec3,
        block: BlockId,
        orientation: Orientation,
    },
    /// Overwrites whatever is there when the id differs.
    Replace {
        position: IVec3,
        block: BlockId,
        orientation: Orientation,
    },
}

impl VoxelMod {
    pub fn add(position: IVec3, block: BlockId) -> Self {
        Self::Add {
            position,
            block,
            orientation: Orientation::default(),
        }
    }

    pub fn replace(position: IVec3, block: BlockId) -> Self {
        Self::Replace {
            position,
            block,
            orientation: Orientation::default(),
        }
    }

    pub fn position(&self) -> IVec3 {
        match *self {
            Self::Add { position, .. } | Self::Replace { position, .. } => position,
        }
    }

    pub fn block(&self) -> BlockId {
        match *self {
            Self::Add { block, .. } | Self::Replace { block, .. } => block,
        }
    }

    pub fn orientation(&self) -> Orientation {
        match *self {
            Self::Add { orientation, .. } | Self::Replace { orientation, .. } => orientation,
        }
    }

    pub fn with_orientation(self, orientation: Orientation) -> Self {
        match self {
            Self::Add { position, block, .. } => Self::Add {
                position,
                block,
                orientation,
            },
            Self::Replace { position, block, .. } => Self::Replace {
                position,
                block,
                orientation,
            },
        }
    }

    pub fn chunk_coord(&self) -> ChunkCoord {
        let position = self.position();
        chunk_coord_of(position.x, position.z)
    }
}

#[cfg(test)]
mod tests {
    use glam::IVec3;

    use super::VoxelMod;
    use crate::block::{BlockId, Orientation};
    use crate::coords::ChunkCoord;

    #[test]
    fn accessors_see_through_both_variants() {
        let add = VoxelMod::add(IVec3::new(-1, 40, 17), BlockId::LEAVES);
        let replace = VoxelMod::replace(IVec3::new(3, 2, 1), BlockId::OAK_LOG)
            .with_orientation(Orientation::LEFT);

        assert_eq!(add.position(), IVec3::new(-1, 40, 17));
        assert_eq!(add.block(), BlockId::LEAVES);
        assert_eq!(add.chunk_coord(), ChunkCoord::new(-1, 1));
        assert_eq!(replace.orientation(), Orientation::LEFT);
        assert!(matches!(replace, VoxelMod::Replace { .. }));
    }

    #[test]
    fn add_and_replace_at_the_same_spot_are_distinct_work_items() {
        let position = IVec3::new(5, 5, 5);
        assert_ne!(
            VoxelMod::add(position, BlockId::STONE),
            VoxelMod::replace(position, BlockId::STONE)
        );
    }
}

use glam::IVec3;

use crate::block::{Behaviour, BlockId};
use crate::chunk::VoxelState;
use crate::coords::Face;
use crate::voxel_mod::VoxelMod;

/// World-space voxel reads used by behaviours. Positions outside any chunk
/// answer [`VoxelState::NOTHING`].
pub trait VoxelLookup {
    fn voxel(&self, pos: IVec3) -> VoxelState;
}

impl<F> VoxelLookup for F
where
    F: Fn(IVec3) -> VoxelState,
{
    fn voxel(&self, pos: IVec3) -> VoxelState {
        self(pos)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BehaviourDecision {
    /// The voxel is covered and reverts.
    Smother(VoxelMod),
    /// The voxel claims a neighbour.
    Spread(VoxelMod),
    Idle,
    /// The voxel no longer holds the tracked block, or the block has no
    /// behaviour; stop tracking it.
    Retire,
}

/// Whether `block` at `pos` can do something right now and should be
/// tracked.
pub fn is_active(block: BlockId, behaviour: Behaviour, pos: IVec3, lookup: &impl VoxelLookup) -> bool {
    if lookup.voxel(pos).id != block {
        return false;
    }

    match behaviour {
        Behaviour::Inert => false,
        Behaviour::Grass { spreads_onto, .. } => {
            let covered = !lookup.voxel(pos + Face::Top.offset()).id.is_nothing();
            covered
                || Face::PLANAR
                    .iter()
                    .any(|face| lookup.voxel(pos + face.offset()).id == spreads_onto)
        }
    }
}

pub fn decide(
    block: BlockId,
    behaviour: Behaviour,
    pos: IVec3,
    lookup: &impl VoxelLookup,
) -> BehaviourDecision {
    if lookup.voxel(pos).id != block {
        return BehaviourDecision::Retire;
    }

    match behaviour {
        Behaviour::Inert => BehaviourDecision::Retire,
        Behaviour::Grass {
            decays_to,
            spreads_onto,
        } => {
            if !lookup.voxel(pos + Face::Top.offset()).id.is_nothing() {
                return BehaviourDecision::Smother(VoxelMod::replace(pos, decays_to));
            }

            Face::PLANAR
                .iter()
                .map(|face| pos + face.offset())
                .find(|target| {
                    lookup.voxel(*target).id == spreads_onto
                        && lookup.voxel(*target + Face::Top.offset()).id.is_nothing()
                })
                .map_or(BehaviourDecision::Idle, |target| {
                    BehaviourDecision::Spread(VoxelMod::replace(target, block))
                })
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use glam::IVec3;

    use super::{decide, is_active, BehaviourDecision, VoxelLookup};
    use crate::block::{Behaviour, BlockId, Orientation};
    use crate::chunk::VoxelState;
    use crate::voxel_mod::VoxelMod;

    const GRASS: Behaviour = Behaviour::Grass {
        decays_to: BlockId::DIRT,
        spreads_onto: BlockId::DIRT,
    };

    struct Sparse(HashMap<IVec3, BlockId>);

    impl Sparse {
        fn with(entries: &[(IVec3, BlockId)]) -> Self {
            Self(entries.iter().copied().collect())
        }
    }

    impl VoxelLookup for Sparse {
        fn voxel(&self, pos: IVec3) -> VoxelState {
            let id = self.0.get(&pos).copied().unwrap_or(BlockId::NOTHING);
            VoxelState::new(id, Orientation::FRONT)
        }
    }

    #[test]
    fn covered_grass_smothers_into_dirt() {
        let pos = IVec3::new(3, 40, 3);
        let world = Sparse::with(&[
            (pos, BlockId::GRASS),
            (pos + IVec3::Y, BlockId::PLANKS),
        ]);

        assert!(is_active(BlockId::GRASS, GRASS, pos, &world));
        assert_eq!(
            decide(BlockId::GRASS, GRASS, pos, &world),
            BehaviourDecision::Smother(VoxelMod::replace(pos, BlockId::DIRT))
        );
    }

    #[test]
    fn open_grass_spreads_to_the_first_uncovered_dirt_neighbor() {
        let pos = IVec3::new(0, 40, 0);
        // Back neighbour is dirt but covered; the left one is open.
        let world = Sparse::with(&[
            (pos, BlockId::GRASS),
            (pos + IVec3::NEG_Z, BlockId::DIRT),
            (pos + IVec3::NEG_Z + IVec3::Y, BlockId::STONE),
            (pos + IVec3::NEG_X, BlockId::DIRT),
        ]);

        assert!(is_active(BlockId::GRASS, GRASS, pos, &world));
        let decision = decide(BlockId::GRASS, GRASS, pos, &world);
        assert_eq!(
            decision,
            BehaviourDecision::Spread(VoxelMod::replace(pos + IVec3::NEG_X, BlockId::GRASS))
        );
    }

    #[test]
    fn isolated_grass_is_idle_and_inactive() {
        let pos = IVec3::new(0, 40, 0);
        let world = Sparse::with(&[(pos, BlockId::GRASS), (pos + IVec3::X, BlockId::STONE)]);

        assert!(!is_active(BlockId::GRASS, GRASS, pos, &world));
        assert_eq!(decide(BlockId::GRASS, GRASS, pos, &world), BehaviourDecision::Idle);
    }

    #[test]
    fn replaced_or_inert_voxels_retire() {
        let pos = IVec3::new(0, 40, 0);
        let world = Sparse::with(&[(pos, BlockId::STONE)]);

        assert_eq!(decide(BlockId::GRASS, GRASS, pos, &world), BehaviourDecision::Retire);
        assert_eq!(
            decide(BlockId::STONE, Behaviour::Inert, pos, &world),
            BehaviourDecision::Retire
        );
        assert!(!is_active(BlockId::STONE, Behaviour::Inert, pos, &world));
    }

    #[test]
    fn closures_work_as_lookups() {
        let lookup = |pos: IVec3| {
            if pos.y < 10 {
                VoxelState::new(BlockId::DIRT, Orientation::FRONT)
            } else {
                VoxelState::NOTHING
            }
        };
        let pos = IVec3::new(0, 9, 0);
        // The closure says grass is dirt, so there is nothing to track.
        assert_eq!(decide(BlockId::GRASS, GRASS, pos, &lookup), BehaviourDecision::Retire);
        assert_eq!(lookup.voxel(pos).id, BlockId::DIRT);
    }
}

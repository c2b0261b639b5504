pub mod behaviour;
pub mod biome;
pub mod block;
pub mod chunk;
pub mod coords;
pub mod lighting;
pub mod mesh;
pub mod noise_field;
pub mod structure;
pub mod voxel_mod;
pub mod worldgen;

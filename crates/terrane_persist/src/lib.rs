pub mod chunk_file;
pub mod compression;
pub mod store;
pub mod versioning;
pub mod world_meta;

pub use compression::Compression;
pub use store::WorldStore;
pub use world_meta::WorldMeta;

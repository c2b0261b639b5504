use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::Path;

use terrane_persist::chunk_file::{self, MAGIC};
use terrane_shared::block::{register_default_blocks, BlockId};

fn main() {
    let paths: Vec<String> = env::args().skip(1).collect();
    if paths.is_empty() {
        eprintln!("Usage: chunk_inspector <path/to/c.X.Z.chunk>...");
        std::process::exit(2);
    }

    let mut failed = false;
    for path in &paths {
        if let Err(err) = run(Path::new(path)) {
            eprintln!("chunk_inspector error: {err}");
            failed = true;
        }
    }
    if failed {
        std::process::exit(1);
    }
}

fn run(path: &Path) -> Result<(), String> {
    let bytes =
        fs::read(path).map_err(|err| format!("failed to read {}: {err}", path.display()))?;
    let header = chunk_file::read_header(&bytes)
        .map_err(|err| format!("failed to read header of {}: {err}", path.display()))?;
    let chunk = chunk_file::decode_chunk(&bytes)
        .map_err(|err| format!("failed to decode {}: {err}", path.display()))?;

    let registry = register_default_blocks();
    let mut histogram: BTreeMap<u8, usize> = BTreeMap::new();
    let mut rotated = 0usize;
    for voxel in chunk.voxels() {
        *histogram.entry(voxel.id.0).or_default() += 1;
        if voxel.orientation != Default::default() {
            rotated += 1;
        }
    }

    println!("Chunk file: {}", path.display());
    println!("Magic: {:?}", MAGIC);
    println!("Coord: ({}, {})", chunk.coord().x, chunk.coord().z);
    if let Some(named) = path
        .file_name()
        .and_then(|name| name.to_str())
        .and_then(chunk_file::parse_file_name)
    {
        if named != chunk.coord() {
            println!("Warning: file name says ({}, {})", named.x, named.z);
        }
    }
    println!("Compression: {}", header.compression.name());
    println!("Format version: {}", header.format_version);
    println!(
        "Size: {} bytes on disk, {} bytes decoded",
        header.stored_len, header.payload_len
    );
    println!("Non-default orientations: {rotated}");
    println!("Blocks:");
    for (id, count) in histogram {
        let block = BlockId(id);
        let name = if registry.is_known(block) {
            registry.get(block).name.as_str()
        } else {
            "<unknown>"
        };
        println!("  {id:>3} {name:<12} {count}");
    }

    Ok(())
}

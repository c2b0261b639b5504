use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, warn};

use crate::world::World;

/// Longest the worker blocks on an empty update queue before it looks for
/// loads, save requests and the stop flag again.
const IDLE_WAIT: Duration = Duration::from_millis(16);

/// Background thread that owns chunk loading, updates and requested saves.
pub struct StreamingWorker {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl StreamingWorker {
    pub fn spawn(world: Arc<World>) -> io::Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);
        let handle = thread::Builder::new()
            .name("streaming".to_string())
            .spawn(move || {
                debug!("Streaming worker started");
                while !flag.load(Ordering::Acquire) {
                    if let Some(Err(err)) = world.service_save_request() {
                        warn!("Requested save failed: {}", err);
                    }
                    world.wait_update_one(IDLE_WAIT);
                }
                debug!("Streaming worker stopped");
            })?;

        Ok(Self {
            stop,
            handle: Some(handle),
        })
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    /// Signals the thread and waits for its current chunk update to finish.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("Streaming worker panicked");
            }
        }
    }
}

impl Drop for StreamingWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;
    use std::time::{Duration, Instant};

    use glam::{IVec3, Vec3};

    use super::StreamingWorker;
    use crate::world::tests::{small_config, small_world, temp_world_dir, world_with};
    use crate::world::{World, WorldEvent};
    use terrane_persist::{Compression, WorldStore};
    use terrane_shared::biome::BiomeCatalog;
    use terrane_shared::block::{register_default_blocks, BlockId};
    use terrane_shared::coords::ChunkCoord;
    use terrane_shared::voxel_mod::VoxelMod;

    fn wait_until(mut done: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(60);
        while Instant::now() < deadline {
            if done() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn worker_builds_meshes_that_tick_publishes() {
        let mut config = small_config();
        config.streaming.threaded = true;
        let world = Arc::new(
            World::new(
                config,
                register_default_blocks(),
                BiomeCatalog::default_catalog(),
                None,
            )
            .expect("create world"),
        );
        let mut worker = StreamingWorker::spawn(Arc::clone(&world)).expect("spawn worker");
        assert!(worker.is_running());

        let center = ChunkCoord::new(2, 2);
        world.update_viewpoint(Vec3::new(40.0, 70.0, 40.0));
        assert!(wait_until(|| world.mesh_for(center).is_some()));

        let edit = IVec3::new(40, 118, 40);
        world.handle_edit(VoxelMod::replace(edit, BlockId::BRICKS));
        assert!(wait_until(|| world.voxel_at(edit).id == BlockId::BRICKS));
        assert!(wait_until(|| world.stats().chunks_to_update == 0));

        world.tick(Duration::from_millis(50));
        let published = world
            .poll_events()
            .into_iter()
            .any(|event| matches!(event, WorldEvent::MeshReady { coord, .. } if coord == center));
        assert!(published);

        worker.stop();
        assert!(!worker.is_running());
    }

    #[test]
    fn requested_saves_run_on_the_worker() {
        let dir = temp_world_dir("worker-save");
        let store = WorldStore::open(&dir, Compression::Lz4).expect("open store");
        let mut config = small_config();
        config.streaming.threaded = true;
        let world = Arc::new(world_with(config, Some(store)));
        let mut worker = StreamingWorker::spawn(Arc::clone(&world)).expect("spawn worker");

        world.update_viewpoint(Vec3::new(40.0, 70.0, 40.0));
        let edit = IVec3::new(40, 117, 40);
        world.handle_edit(VoxelMod::replace(edit, BlockId::PLANKS));
        assert!(wait_until(|| world.voxel_at(edit).id == BlockId::PLANKS));

        world.request_save();
        let reader = WorldStore::open(&dir, Compression::Lz4).expect("reopen store");
        assert!(wait_until(|| reader
            .saved_chunks()
            .map_or(false, |saved| saved.contains(&ChunkCoord::new(2, 2)))));
        assert!(world.service_save_request().is_none());

        worker.stop();
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn dropping_the_worker_joins_its_thread() {
        let world = Arc::new(small_world(None));
        let worker = StreamingWorker::spawn(Arc::clone(&world)).expect("spawn worker");
        drop(worker);
        assert_eq!(Arc::strong_count(&world), 1);
    }
}

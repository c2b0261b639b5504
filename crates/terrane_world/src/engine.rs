use std::io::{self, BufRead};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::Arc;
use std::time::{Duration, Instant};

use glam::Vec3;
use tracing::{debug, info, warn};

use terrane_persist::WorldStore;
use terrane_shared::block::register_default_blocks;
use terrane_shared::coords::CHUNK_WIDTH_I32;
use terrane_shared::voxel_mod::VoxelMod;

use crate::commands::{self, resolve_block, Command};
use crate::config::EngineConfig;
use crate::worker::StreamingWorker;
use crate::world::{World, WorldEvent};

pub const AUTOSAVE_INTERVAL_TICKS: u64 = 600;

pub struct EngineOptions {
    pub world_path: PathBuf,
    pub config: EngineConfig,
}

pub struct Engine {
    world: Arc<World>,
    worker: Option<StreamingWorker>,
    running: Arc<AtomicBool>,
    command_rx: Receiver<Command>,
    tick: u64,
    tick_duration: Duration,
}

impl Engine {
    pub fn new(
        world: Arc<World>,
        worker: Option<StreamingWorker>,
        running: Arc<AtomicBool>,
        command_rx: Receiver<Command>,
    ) -> Self {
        let tick_rate = world.config().streaming.tick_rate.max(1);
        Self {
            world,
            worker,
            running,
            command_rx,
            tick: 0,
            tick_duration: Duration::from_secs(1) / tick_rate,
        }
    }

    pub fn world(&self) -> &Arc<World> {
        &self.world
    }

    pub fn run(&mut self) {
        info!(
            "Starting world '{}' (seed {}, {} ticks/s)",
            self.world.meta().name,
            self.world.seed(),
            self.world.config().streaming.tick_rate
        );

        while self.running.load(Ordering::SeqCst) {
            let tick_start = Instant::now();

            self.handle_console_commands();
            if !self.running.load(Ordering::SeqCst) {
                break;
            }

            self.world.tick(self.tick_duration);
            self.tick += 1;
            self.report_events();
            if self.tick % AUTOSAVE_INTERVAL_TICKS == 0 {
                // Runs on whichever thread drains chunk work.
                self.world.request_save();
            }

            let elapsed = tick_start.elapsed();
            if elapsed < self.tick_duration {
                std::thread::sleep(self.tick_duration - elapsed);
            }
        }

        if let Some(worker) = self.worker.as_mut() {
            worker.stop();
        }
        info!("Shutting down, saving world...");
        self.save();
        info!("World saved. Goodbye!");
    }

    fn save(&self) {
        match self.world.save() {
            Ok(saved) => debug!("Final save wrote {} chunks", saved),
            Err(err) => warn!("Failed to save world: {}", err),
        }
    }

    fn report_events(&self) {
        for event in self.world.poll_events() {
            match event {
                WorldEvent::ChunkActivated(coord) => debug!("Chunk {:?} activated", coord),
                WorldEvent::ChunkDeactivated(coord) => debug!("Chunk {:?} deactivated", coord),
                WorldEvent::MeshReady { coord, mesh } => debug!(
                    "Mesh for chunk {:?} ready: {} triangles",
                    coord,
                    mesh.triangle_count()
                ),
            }
        }
    }

    fn handle_console_commands(&mut self) {
        loop {
            match self.command_rx.try_recv() {
                Ok(command) => self.execute_console_command(command),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
    }

    pub fn execute_console_command(&mut self, command: Command) {
        match command {
            Command::Noop => {}
            Command::Stop => {
                info!("[CONSOLE] stopping");
                self.running.store(false, Ordering::SeqCst);
            }
            Command::Save => {
                self.world.request_save();
                info!("[CONSOLE] save requested");
            }
            Command::Stats => {
                let stats = self.world.stats();
                info!(
                    "[CONSOLE] {} resident, {} active, {} modified, {} stale chunks; {} queued edits, {} parked",
                    stats.resident_chunks,
                    stats.active_chunks,
                    stats.modified_chunks,
                    stats.stale_chunks,
                    stats.pending_modifications,
                    stats.parked_modifications
                );
                info!(
                    "[CONSOLE] {} chunks to load, {} to update, {} to draw, {} tracked voxels, tick {}",
                    stats.chunks_to_load,
                    stats.chunks_to_update,
                    stats.chunks_to_draw,
                    stats.tracked_voxels,
                    stats.ticks
                );
            }
            Command::Teleport { x, z } => {
                if self.world.update_viewpoint(Vec3::new(x, 0.0, z)) {
                    info!("[CONSOLE] viewpoint moved to [{x}, {z}]");
                } else {
                    info!("[CONSOLE] viewpoint already in that chunk");
                }
            }
            Command::Set {
                pos,
                block,
                orientation,
            } => match resolve_block(self.world.registry(), &block) {
                Some(id) => {
                    let edit = VoxelMod::replace(pos, id).with_orientation(orientation);
                    if self.world.handle_edit(edit) {
                        info!("[CONSOLE] queued {block} at {pos}");
                    } else {
                        warn!("[CONSOLE] /set rejected: {pos} is outside the world");
                    }
                }
                None => warn!("[CONSOLE] unknown block '{block}'"),
            },
            Command::Add {
                pos,
                block,
                orientation,
            } => match resolve_block(self.world.registry(), &block) {
                Some(id) => {
                    let edit = VoxelMod::add(pos, id).with_orientation(orientation);
                    if self.world.handle_edit(edit) {
                        info!("[CONSOLE] queued {block} at {pos} if empty");
                    } else {
                        warn!("[CONSOLE] /add rejected: {pos} is outside the world");
                    }
                }
                None => warn!("[CONSOLE] unknown block '{block}'"),
            },
            Command::Look(pos) => {
                let voxel = self.world.voxel_at(pos);
                info!(
                    "[CONSOLE] {pos}: {} (orientation {}, light {})",
                    self.world.registry().get(voxel.id).name,
                    voxel.orientation.0,
                    voxel.light
                );
            }
            Command::Help => log_help(),
            Command::InvalidUsage(message) => warn!("[CONSOLE] {message}"),
            Command::Unknown(input) => {
                warn!("[CONSOLE] unknown command '{input}' (try /help)")
            }
        }
    }
}

fn log_help() {
    info!("[CONSOLE] Available commands:");
    info!("[CONSOLE]   /help");
    info!("[CONSOLE]   /stats");
    info!("[CONSOLE]   /save");
    info!("[CONSOLE]   /tp <x> <z>");
    info!("[CONSOLE]   /set <x> <y> <z> <block> [front|back|left|right]");
    info!("[CONSOLE]   /add <x> <y> <z> <block> [front|back|left|right]");
    info!("[CONSOLE]   /look <x> <y> <z>");
    info!("[CONSOLE]   /stop");
}

/// Opens the world at `options.world_path`, streams around the world's
/// centre and runs until `running` is cleared.
pub fn run(options: EngineOptions, running: Arc<AtomicBool>) -> io::Result<()> {
    let EngineOptions { world_path, config } = options;

    let catalog = config.load_catalog()?;
    let store = WorldStore::open(&world_path, config.storage.compression)?
        .with_zstd_level(config.storage.zstd_level);
    let world = Arc::new(World::new(
        config,
        register_default_blocks(),
        catalog,
        Some(store),
    )?);

    let worker = if world.config().streaming.threaded {
        Some(StreamingWorker::spawn(Arc::clone(&world))?)
    } else {
        None
    };

    let centre = (world.config().world.size_in_chunks * CHUNK_WIDTH_I32) as f32 / 2.0;
    world.update_viewpoint(Vec3::new(centre, 0.0, centre));

    let (command_tx, command_rx) = mpsc::channel();
    spawn_console_command_thread(command_tx);

    let mut engine = Engine::new(world, worker, running, command_rx);
    engine.run();
    Ok(())
}

fn spawn_console_command_thread(command_tx: Sender<Command>) {
    std::thread::spawn(move || {
        let stdin = io::stdin();
        for line_result in stdin.lock().lines() {
            let line = match line_result {
                Ok(line) => line,
                Err(err) => {
                    warn!("Failed to read console input: {err}");
                    break;
                }
            };

            let command = commands::parse_command(&line);
            if command_tx.send(command).is_err() {
                break;
            }
        }
    });
}

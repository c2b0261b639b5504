use std::io;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use glam::{IVec3, Vec3};
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, info, trace, warn};

use terrane_core::events::{self, EventReceiver, EventSender};
use terrane_core::jobs::JobSystem;
use terrane_core::work_set::WorkSet;
use terrane_persist::{WorldMeta, WorldStore};
use terrane_shared::behaviour::{self, BehaviourDecision};
use terrane_shared::biome::BiomeCatalog;
use terrane_shared::block::{BlockId, BlockRegistry, BlockType};
use terrane_shared::chunk::{ChunkStorage, VoxelState};
use terrane_shared::coords::{
    chunk_coord_of, chunk_to_world, world_to_local, ChunkCoord, Face, LocalPos, CHUNK_HEIGHT,
    CHUNK_WIDTH,
};
use terrane_shared::lighting::{self, ChunkNeighbors};
use terrane_shared::mesh::{self, AtlasLayout, MeshBuffers, PublishedMesh};
use terrane_shared::voxel_mod::VoxelMod;
use terrane_shared::worldgen::TerrainGenerator;

use crate::config::EngineConfig;

/// Relights a slot accepts in a row because a neighbour's edge light changed.
/// Edges that keep feeding each other stop being requeued after this many.
const MAX_LIGHT_REQUEUES: u32 = 8;

#[derive(Clone, Debug)]
pub enum WorldEvent {
    ChunkActivated(ChunkCoord),
    ChunkDeactivated(ChunkCoord),
    /// Fresh buffers for an active chunk. Replaces whatever the consumer
    /// drew for `coord` before.
    MeshReady {
        coord: ChunkCoord,
        mesh: Arc<MeshBuffers>,
    },
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct WorldStats {
    pub resident_chunks: usize,
    pub active_chunks: usize,
    pub modified_chunks: usize,
    /// Resident chunks whose light and mesh wait for a rebuild.
    pub stale_chunks: usize,
    pub pending_modifications: usize,
    pub parked_modifications: usize,
    pub chunks_to_load: usize,
    pub chunks_to_update: usize,
    pub chunks_to_draw: usize,
    pub tracked_voxels: usize,
    pub ticks: u64,
    pub simulated: Duration,
}

/// One resident chunk. Slots are created once and never evicted.
pub struct ChunkSlot {
    coord: ChunkCoord,
    storage: RwLock<ChunkStorage>,
    pending: WorkSet<VoxelMod>,
    active: AtomicBool,
    /// Set when an applied edit changed a voxel since the last save.
    modified: AtomicBool,
    mesh: PublishedMesh,
    light_requeues: AtomicU32,
    tracked: Mutex<FxHashSet<(IVec3, BlockId)>>,
}

impl ChunkSlot {
    fn new(storage: ChunkStorage) -> Self {
        Self {
            coord: storage.coord(),
            storage: RwLock::new(storage),
            pending: WorkSet::new(),
            active: AtomicBool::new(false),
            modified: AtomicBool::new(false),
            mesh: PublishedMesh::new(),
            light_requeues: AtomicU32::new(0),
            tracked: Mutex::new(FxHashSet::default()),
        }
    }

    pub fn coord(&self) -> ChunkCoord {
        self.coord
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub fn is_modified(&self) -> bool {
        self.modified.load(Ordering::Acquire)
    }

    pub fn read(&self) -> RwLockReadGuard<'_, ChunkStorage> {
        self.storage.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, ChunkStorage> {
        self.storage.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn mesh(&self) -> &PublishedMesh {
        &self.mesh
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Owns every resident chunk and the queues that move edits through apply,
/// relight, remesh and publish. All methods take `&self` so the world can be
/// shared with a [`crate::worker::StreamingWorker`].
pub struct World {
    config: EngineConfig,
    registry: BlockRegistry,
    generator: TerrainGenerator,
    atlas: AtlasLayout,
    store: Option<WorldStore>,
    meta: WorldMeta,
    size: i32,
    slots: RwLock<Vec<Option<Arc<ChunkSlot>>>>,
    load_lock: Mutex<()>,
    update_lock: Mutex<()>,
    /// Edits aimed at chunks that are not resident yet.
    parked: Mutex<FxHashMap<ChunkCoord, Vec<VoxelMod>>>,
    modifications: WorkSet<VoxelMod>,
    /// In-world chunks the viewpoint wants that have no slot yet.
    chunks_to_load: WorkSet<ChunkCoord>,
    chunks_to_update: WorkSet<ChunkCoord>,
    chunks_to_draw: WorkSet<ChunkCoord>,
    jobs: JobSystem,
    events_tx: EventSender<WorldEvent>,
    events_rx: Mutex<EventReceiver<WorldEvent>>,
    viewpoint: Mutex<Option<ChunkCoord>>,
    save_requested: AtomicBool,
    ticks: AtomicU64,
    simulated_micros: AtomicU64,
}

impl World {
    /// Seed comes from saved metadata first, then the config, then the clock.
    pub fn new(
        mut config: EngineConfig,
        registry: BlockRegistry,
        catalog: BiomeCatalog,
        store: Option<WorldStore>,
    ) -> io::Result<Self> {
        config.validate();

        let saved = match &store {
            Some(store) => store.load_meta()?,
            None => None,
        };
        let meta = match saved {
            Some(meta) => {
                info!("Loaded world '{}' (seed {})", meta.name, meta.seed);
                meta
            }
            None => {
                let seed = config.world.seed.unwrap_or_else(time_seed);
                let meta = WorldMeta::new(config.world.name.clone(), seed);
                if let Some(store) = &store {
                    if let Err(err) = store.save_meta(&meta) {
                        warn!("Failed to write world metadata to {}: {}", store.dir().display(), err);
                    }
                }
                info!("Created world '{}' (seed {})", meta.name, meta.seed);
                meta
            }
        };

        let generator = TerrainGenerator::new(meta.seed, catalog, config.terrain_settings());
        let size = config.world.size_in_chunks;
        let slot_count = (size as usize) * (size as usize);
        let jobs = JobSystem::new(None, "chunk-gen").map_err(|err| {
            io::Error::new(
                io::ErrorKind::Other,
                format!("failed to start chunk job pool: {err}"),
            )
        })?;
        let (events_tx, events_rx) = events::channel();

        Ok(Self {
            atlas: config.atlas_layout(),
            config,
            registry,
            generator,
            store,
            meta,
            size,
            slots: RwLock::new(vec![None; slot_count]),
            load_lock: Mutex::new(()),
            update_lock: Mutex::new(()),
            parked: Mutex::new(FxHashMap::default()),
            modifications: WorkSet::new(),
            chunks_to_load: WorkSet::new(),
            chunks_to_update: WorkSet::new(),
            chunks_to_draw: WorkSet::new(),
            jobs,
            events_tx,
            events_rx: Mutex::new(events_rx),
            viewpoint: Mutex::new(None),
            save_requested: AtomicBool::new(false),
            ticks: AtomicU64::new(0),
            simulated_micros: AtomicU64::new(0),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &BlockRegistry {
        &self.registry
    }

    pub fn generator(&self) -> &TerrainGenerator {
        &self.generator
    }

    pub fn meta(&self) -> &WorldMeta {
        &self.meta
    }

    pub fn seed(&self) -> u64 {
        self.meta.seed
    }

    pub fn viewpoint(&self) -> Option<ChunkCoord> {
        *lock(&self.viewpoint)
    }

    pub fn in_world(&self, coord: ChunkCoord) -> bool {
        (0..self.size).contains(&coord.x) && (0..self.size).contains(&coord.z)
    }

    fn slot_index(&self, coord: ChunkCoord) -> Option<usize> {
        self.in_world(coord)
            .then(|| (coord.x as usize) * (self.size as usize) + coord.z as usize)
    }

    pub fn slot(&self, coord: ChunkCoord) -> Option<Arc<ChunkSlot>> {
        let index = self.slot_index(coord)?;
        let slots = self.slots.read().unwrap_or_else(PoisonError::into_inner);
        slots.get(index).and_then(Clone::clone)
    }

    fn resident_slots(&self) -> Vec<Arc<ChunkSlot>> {
        let slots = self.slots.read().unwrap_or_else(PoisonError::into_inner);
        slots.iter().flatten().cloned().collect()
    }

    /// Moves the viewpoint; streaming only runs when it enters another chunk.
    pub fn update_viewpoint(&self, position: Vec3) -> bool {
        let coord = chunk_coord_of(position.x.floor() as i32, position.z.floor() as i32);
        if self.viewpoint() == Some(coord) {
            return false;
        }
        self.check_view_distance(coord);
        true
    }

    /// Activates resident chunks within the view circle around `center`,
    /// queues the missing ones for loading and deactivates resident chunks in
    /// the surrounding margin. Never loads or generates on the calling thread.
    pub fn check_view_distance(&self, center: ChunkCoord) {
        *lock(&self.viewpoint) = Some(center);

        let view = self.config.streaming.view_distance;
        let reach = view + self.config.streaming.view_margin;
        let view_sq = i64::from(view) * i64::from(view);

        let mut show = Vec::new();
        let mut hide = Vec::new();
        for x in (center.x - reach)..=(center.x + reach) {
            for z in (center.z - reach)..=(center.z + reach) {
                let coord = ChunkCoord::new(x, z);
                if !self.in_world(coord) {
                    continue;
                }
                if coord.distance_sq(center) <= view_sq {
                    show.push(coord);
                } else if let Some(slot) = self.slot(coord) {
                    hide.push(slot);
                }
            }
        }

        for slot in hide {
            self.chunks_to_update.remove(&slot.coord);
            if slot.active.swap(false, Ordering::AcqRel) {
                self.events_tx.emit(WorldEvent::ChunkDeactivated(slot.coord));
            }
        }

        show.sort_by_key(|coord| coord.distance_sq(center));
        let mut requested = 0;
        for coord in show {
            match self.slot(coord) {
                Some(slot) => self.activate(&slot),
                None => {
                    if self.chunks_to_load.add(coord) {
                        requested += 1;
                    }
                }
            }
        }
        if requested > 0 {
            debug!("Queued {} chunks for loading around {:?}", requested, center);
        }
    }

    fn in_view(&self, coord: ChunkCoord) -> bool {
        let view = i64::from(self.config.streaming.view_distance);
        self.viewpoint()
            .map_or(false, |center| coord.distance_sq(center) <= view * view)
    }

    fn activate(&self, slot: &ChunkSlot) {
        if !slot.active.swap(true, Ordering::AcqRel) {
            self.chunks_to_update.add(slot.coord);
            self.events_tx.emit(WorldEvent::ChunkActivated(slot.coord));
        }
    }

    fn neighbor_slot(&self, coord: ChunkCoord, face: Face) -> Option<Arc<ChunkSlot>> {
        let offset = face.offset();
        self.slot(coord + ChunkCoord::new(offset.x, offset.z))
    }

    /// Forces a relight and remesh of `slot` on its next update.
    fn mark_stale(&self, slot: &ChunkSlot) {
        slot.light_requeues.store(0, Ordering::Release);
        slot.mesh.invalidate();
        self.chunks_to_update.add(slot.coord);
    }

    /// Like [`Self::mark_stale`], for a slot whose neighbour only changed the
    /// light along their shared edge.
    fn requeue_for_light(&self, slot: &ChunkSlot) {
        if slot.light_requeues.fetch_add(1, Ordering::AcqRel) >= MAX_LIGHT_REQUEUES {
            trace!("Not relighting chunk {:?} again for edge light", slot.coord);
            return;
        }
        slot.mesh.invalidate();
        self.chunks_to_update.add(slot.coord);
    }

    /// Queues an edit. Returns `false` when the position is outside the world
    /// or the same edit is already queued.
    pub fn handle_edit(&self, edit: VoxelMod) -> bool {
        let in_world = world_to_local(edit.position())
            .map_or(false, |(coord, _)| self.in_world(coord));
        if !in_world {
            debug!("Ignoring edit outside the world at {}", edit.position());
            return false;
        }
        self.modifications.add(edit)
    }

    /// Routes queued world edits to the chunks that own them.
    pub fn apply_modifications(&self) -> usize {
        let mut routed = 0;
        while let Some(edit) = self.modifications.take_any() {
            let coord = edit.chunk_coord();
            if !self.in_world(coord) {
                continue;
            }

            let mut parked = lock(&self.parked);
            match self.slot(coord) {
                Some(slot) => {
                    drop(parked);
                    slot.pending.add(edit);
                    self.chunks_to_update.add(coord);
                }
                None => parked.entry(coord).or_default().push(edit),
            }
            routed += 1;
        }
        routed
    }

    /// Loads requested chunks and routes pending edits, then applies,
    /// relights and remeshes one queued chunk. Returns `false` when there was
    /// nothing to update.
    pub fn update_chunks_one(&self) -> bool {
        let _guard = lock(&self.update_lock);

        self.load_requested();
        self.apply_modifications();
        let Some(coord) = self.chunks_to_update.take_any() else {
            return false;
        };
        self.update_coord(coord);
        true
    }

    /// [`Self::update_chunks_one`] for a dedicated worker: blocks for up to
    /// `timeout` until a chunk is queued for update.
    pub fn wait_update_one(&self, timeout: Duration) -> bool {
        {
            let _guard = lock(&self.update_lock);
            self.load_requested();
            self.apply_modifications();
        }

        let Some(coord) = self.chunks_to_update.wait_take(timeout) else {
            return false;
        };
        let _guard = lock(&self.update_lock);
        self.apply_modifications();
        self.update_coord(coord);
        true
    }

    /// Loads or generates every queued chunk the current viewpoint still
    /// wants, nearest first.
    fn load_requested(&self) -> usize {
        let mut wanted = Vec::new();
        while let Some(coord) = self.chunks_to_load.take_any() {
            if self.in_view(coord) {
                wanted.push(coord);
            }
        }
        if wanted.is_empty() {
            return 0;
        }
        if let Some(center) = self.viewpoint() {
            wanted.sort_by_key(|coord| coord.distance_sq(center));
        }
        self.create_slots(wanted)
    }

    fn update_coord(&self, coord: ChunkCoord) {
        if let Some(slot) = self.slot(coord) {
            self.update_chunk(&slot);
        }
    }

    fn update_chunk(&self, slot: &ChunkSlot) {
        let coord = slot.coord;
        let pos_x = self.neighbor_slot(coord, Face::Right);
        let neg_x = self.neighbor_slot(coord, Face::Left);
        let pos_z = self.neighbor_slot(coord, Face::Front);
        let neg_z = self.neighbor_slot(coord, Face::Back);

        let mut spilled = FxHashSet::default();
        let mut relit_edges = Vec::new();
        let rebuilt = {
            let mut storage = slot.write();

            let mut applied = 0usize;
            while let Some(edit) = slot.pending.take_any() {
                if !storage.apply_mod(&edit) {
                    continue;
                }
                applied += 1;
                for face in Face::PLANAR {
                    let beside = edit.position() + face.offset();
                    let owner = chunk_coord_of(beside.x, beside.z);
                    if owner != coord {
                        spilled.insert(owner);
                    }
                }
            }
            if applied > 0 {
                slot.modified.store(true, Ordering::Release);
                slot.light_requeues.store(0, Ordering::Release);
                slot.mesh.invalidate();
                debug!("Applied {} modifications to chunk {:?}", applied, coord);
            }

            let pos_x = pos_x.as_ref().map(|slot| slot.read());
            let neg_x = neg_x.as_ref().map(|slot| slot.read());
            let pos_z = pos_z.as_ref().map(|slot| slot.read());
            let neg_z = neg_z.as_ref().map(|slot| slot.read());
            let neighbors = ChunkNeighbors {
                pos_x: pos_x.as_deref(),
                neg_x: neg_x.as_deref(),
                pos_z: pos_z.as_deref(),
                neg_z: neg_z.as_deref(),
                generator: Some(&self.generator),
            };

            let published = slot.mesh.rebuild_if_dirty(|| {
                let before = Face::PLANAR.map(|face| edge_light(&storage, face));
                lighting::recalculate(&mut storage, &self.registry, &neighbors);
                for (face, before) in Face::PLANAR.into_iter().zip(before) {
                    if edge_light(&storage, face) != before {
                        relit_edges.push(face);
                    }
                }
                mesh::rebuild(&storage, &self.registry, &neighbors, self.atlas)
            });
            published.is_some()
        };

        for neighbor in spilled {
            if let Some(neighbor) = self.slot(neighbor) {
                self.mark_stale(&neighbor);
            }
        }

        if rebuilt {
            if relit_edges.is_empty() {
                slot.light_requeues.store(0, Ordering::Release);
            }
            for face in relit_edges {
                if let Some(neighbor) = self.neighbor_slot(coord, face) {
                    self.requeue_for_light(&neighbor);
                }
            }
            self.refresh_tracked(slot);
        }
        self.chunks_to_draw.add(coord);
    }

    fn refresh_tracked(&self, slot: &ChunkSlot) {
        let candidates: Vec<(IVec3, BlockId)> = {
            let storage = slot.read();
            storage
                .iter()
                .filter(|(_, voxel)| self.registry.get(voxel.id).is_active())
                .map(|(local, voxel)| (chunk_to_world(slot.coord, local), voxel.id))
                .collect()
        };

        let lookup = |pos: IVec3| self.voxel_at(pos);
        let tracked: FxHashSet<_> = candidates
            .into_iter()
            .filter(|&(pos, block)| {
                behaviour::is_active(block, self.registry.get(block).behaviour, pos, &lookup)
            })
            .collect();
        *lock(&slot.tracked) = tracked;
    }

    /// Publishes `MeshReady` for every chunk whose rebuild finished and that
    /// is not queued for another update.
    pub fn draw_chunks(&self) -> usize {
        for coord in self.chunks_to_update.snapshot() {
            self.chunks_to_draw.remove(&coord);
        }

        let mut published = 0;
        while let Some(coord) = self.chunks_to_draw.take_any() {
            let Some(slot) = self.slot(coord) else {
                continue;
            };
            if !slot.is_active() {
                continue;
            }
            // Waits out an update that has applied edits but not yet published.
            let mesh = {
                let _storage = slot.read();
                slot.mesh.latest()
            };
            self.events_tx.emit(WorldEvent::MeshReady { coord, mesh });
            published += 1;
        }
        published
    }

    /// One application tick: services saves and drains chunk work inline when
    /// no worker runs, steps block behaviours on their interval, then
    /// publishes meshes.
    pub fn tick(&self, dt: Duration) {
        let tick = self.ticks.fetch_add(1, Ordering::AcqRel) + 1;
        let micros = u64::try_from(dt.as_micros()).unwrap_or(u64::MAX);
        self.simulated_micros.fetch_add(micros, Ordering::AcqRel);

        if !self.config.streaming.threaded {
            if let Some(Err(err)) = self.service_save_request() {
                warn!("Requested save failed: {}", err);
            }
            while self.update_chunks_one() {}
        }

        if tick % self.config.streaming.behaviour_interval_ticks == 0 {
            let issued = self.tick_behaviours();
            if issued > 0 {
                debug!("Block behaviours issued {} edits", issued);
            }
        }

        self.draw_chunks();
    }

    /// Runs every tracked voxel in active chunks once. Decisions become
    /// ordinary queued edits.
    pub fn tick_behaviours(&self) -> usize {
        let lookup = |pos: IVec3| self.voxel_at(pos);
        let mut issued = 0;

        for slot in self.resident_slots() {
            if !slot.is_active() {
                continue;
            }

            let tracked: Vec<(IVec3, BlockId)> = lock(&slot.tracked).iter().copied().collect();
            let mut retired = Vec::new();
            for (pos, block) in tracked {
                let decision =
                    behaviour::decide(block, self.registry.get(block).behaviour, pos, &lookup);
                match decision {
                    BehaviourDecision::Smother(edit) => {
                        self.handle_edit(edit);
                        retired.push((pos, block));
                        issued += 1;
                    }
                    BehaviourDecision::Spread(edit) => {
                        self.handle_edit(edit);
                        issued += 1;
                    }
                    BehaviourDecision::Idle => {}
                    BehaviourDecision::Retire => retired.push((pos, block)),
                }
            }

            if !retired.is_empty() {
                let mut tracked = lock(&slot.tracked);
                for entry in &retired {
                    tracked.remove(entry);
                }
            }
        }

        issued
    }

    /// Voxel at a world position. Non-resident chunks answer with a generated
    /// value that is not kept; positions outside the world are nothing.
    pub fn voxel_at(&self, pos: IVec3) -> VoxelState {
        let Some((coord, local)) = world_to_local(pos) else {
            return VoxelState::NOTHING;
        };
        if !self.in_world(coord) {
            return VoxelState::NOTHING;
        }

        match self.slot(coord) {
            Some(slot) => slot.read().get(local),
            None => {
                let (id, orientation) = self.generator.generate(pos, &mut Vec::new());
                VoxelState::new(id, orientation)
            }
        }
    }

    pub fn block_type_at(&self, pos: IVec3) -> &BlockType {
        self.registry.get(self.voxel_at(pos).id)
    }

    /// Last published buffers, if the chunk has been meshed at least once.
    pub fn mesh_for(&self, coord: ChunkCoord) -> Option<Arc<MeshBuffers>> {
        self.slot(coord)
            .filter(|slot| slot.mesh.version() > 0)
            .map(|slot| slot.mesh.latest())
    }

    pub fn is_active(&self, coord: ChunkCoord) -> bool {
        self.slot(coord).map_or(false, |slot| slot.is_active())
    }

    pub fn poll_events(&self) -> Vec<WorldEvent> {
        lock(&self.events_rx).drain()
    }

    pub fn stats(&self) -> WorldStats {
        let slots = self.resident_slots();
        WorldStats {
            resident_chunks: slots.len(),
            active_chunks: slots.iter().filter(|slot| slot.is_active()).count(),
            modified_chunks: slots.iter().filter(|slot| slot.is_modified()).count(),
            stale_chunks: slots.iter().filter(|slot| slot.mesh.is_dirty()).count(),
            pending_modifications: self.modifications.len()
                + slots.iter().map(|slot| slot.pending.len()).sum::<usize>(),
            parked_modifications: lock(&self.parked).values().map(Vec::len).sum(),
            chunks_to_load: self.chunks_to_load.len(),
            chunks_to_update: self.chunks_to_update.len(),
            chunks_to_draw: self.chunks_to_draw.len(),
            tracked_voxels: slots.iter().map(|slot| lock(&slot.tracked).len()).sum(),
            ticks: self.ticks.load(Ordering::Acquire),
            simulated: Duration::from_micros(self.simulated_micros.load(Ordering::Acquire)),
        }
    }

    /// Settles outstanding edits and writes every modified chunk. Chunks that
    /// fail to save stay marked and the last error is returned.
    pub fn save(&self) -> io::Result<usize> {
        let Some(store) = &self.store else {
            return Ok(0);
        };

        self.settle();
        store.save_meta(&self.meta)?;

        let mut saved = 0;
        let mut last_err = None;
        for slot in self.resident_slots() {
            if !slot.modified.swap(false, Ordering::AcqRel) {
                continue;
            }

            let result = store.save_chunk(&slot.read());
            match result {
                Ok(()) => saved += 1,
                Err(err) => {
                    warn!("Failed to save chunk {:?}: {}", slot.coord, err);
                    slot.modified.store(true, Ordering::Release);
                    last_err = Some(err);
                }
            }
        }

        info!("Saved {} modified chunks to {}", saved, store.dir().display());
        match last_err {
            Some(err) => Err(err),
            None => Ok(saved),
        }
    }

    /// Asks whichever thread drains chunk work to save at its next
    /// opportunity. See [`Self::service_save_request`].
    pub fn request_save(&self) {
        self.save_requested.store(true, Ordering::Release);
    }

    /// Runs the save asked for by [`Self::request_save`], if there is one.
    pub fn service_save_request(&self) -> Option<io::Result<usize>> {
        if !self.save_requested.swap(false, Ordering::AcqRel) {
            return None;
        }
        Some(self.save())
    }

    /// Loads the targets of parked edits and applies everything pending so
    /// that a save captures every queued change.
    fn settle(&self) {
        let parked: Vec<ChunkCoord> = lock(&self.parked).keys().copied().collect();
        if !parked.is_empty() {
            debug!("Loading {} chunks with parked edits before saving", parked.len());
            self.create_slots(parked);
        }

        for slot in self.resident_slots() {
            if !slot.pending.is_empty() {
                self.chunks_to_update.add(slot.coord);
            }
        }
        while self.update_chunks_one() {}
    }

    /// Loads or generates every missing chunk in `coords` on the job pool and
    /// installs the results. Returns how many slots were created.
    fn create_slots(&self, coords: Vec<ChunkCoord>) -> usize {
        let _guard = lock(&self.load_lock);

        let missing: Vec<ChunkCoord> = coords
            .into_iter()
            .filter(|coord| self.in_world(*coord) && self.slot(*coord).is_none())
            .collect();
        if missing.is_empty() {
            return 0;
        }

        let built = self.jobs.map(missing, |coord| self.load_or_generate(coord));
        let created = built.len();

        for (chunk, structure_mods) in built {
            let coord = chunk.coord();
            let slot = Arc::new(ChunkSlot::new(chunk));

            let mut parked = lock(&self.parked);
            if let Some(index) = self.slot_index(coord) {
                let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
                slots[index] = Some(Arc::clone(&slot));
            }
            if let Some(edits) = parked.remove(&coord) {
                slot.pending.add_all(edits);
                self.chunks_to_update.add(coord);
            }
            drop(parked);

            // Meshes and light beside the new chunk were built against the
            // generator's unlit guess for it.
            for face in Face::PLANAR {
                if let Some(neighbor) = self.neighbor_slot(coord, face) {
                    self.mark_stale(&neighbor);
                }
            }
            if self.in_view(coord) {
                self.activate(&slot);
            }

            self.modifications.add_all(structure_mods);
        }

        debug!("Created {} chunk slots", created);
        created
    }

    fn load_or_generate(&self, coord: ChunkCoord) -> (ChunkStorage, Vec<VoxelMod>) {
        if let Some(store) = &self.store {
            match store.load_chunk(coord) {
                Ok(Some(chunk)) => return (chunk, Vec::new()),
                Ok(None) => {}
                Err(err) => {
                    warn!("Failed to load chunk {:?}: {}", coord, err);
                }
            }
        }

        let mut structure_mods = Vec::new();
        let chunk = ChunkStorage::generated(coord, &self.generator, &mut structure_mods);
        (chunk, structure_mods)
    }
}

/// Light along the side of `storage` that faces `face`, bottom row first.
fn edge_light(storage: &ChunkStorage, face: Face) -> Vec<u8> {
    let last = (CHUNK_WIDTH - 1) as u8;
    let mut light = Vec::with_capacity(CHUNK_WIDTH * CHUNK_HEIGHT);
    for y in 0..CHUNK_HEIGHT as u8 {
        for i in 0..CHUNK_WIDTH as u8 {
            let local = match face {
                Face::Back => LocalPos::new(i, y, 0),
                Face::Front => LocalPos::new(i, y, last),
                Face::Left => LocalPos::new(0, y, i),
                Face::Right => LocalPos::new(last, y, i),
                Face::Top | Face::Bottom => return Vec::new(),
            };
            light.push(storage.get(local).light);
        }
    }
    light
}

fn time_seed() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_nanos() as u64)
        .unwrap_or_default()
}

#[cfg(test)]
pub(crate) mod tests {
    use std::fs;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use glam::{IVec3, Vec3};

    use super::{World, WorldEvent};
    use crate::config::EngineConfig;
    use terrane_persist::{Compression, WorldStore};
    use terrane_shared::biome::BiomeCatalog;
    use terrane_shared::block::{register_default_blocks, BlockId, Orientation};
    use terrane_shared::chunk::VoxelState;
    use terrane_shared::coords::ChunkCoord;
    use terrane_shared::voxel_mod::VoxelMod;

    const STEP: Duration = Duration::from_millis(50);

    pub(crate) fn small_config() -> EngineConfig {
        let mut config = EngineConfig::default();
        config.world.seed = Some(42);
        config.world.size_in_chunks = 8;
        config.streaming.view_distance = 1;
        config.streaming.view_margin = 1;
        config.streaming.threaded = false;
        // Keeps natural grass from issuing edits unless a test asks for it.
        config.streaming.behaviour_interval_ticks = 1_000;
        config
    }

    pub(crate) fn small_world(store: Option<WorldStore>) -> World {
        world_with(small_config(), store)
    }

    pub(crate) fn world_with(config: EngineConfig, store: Option<WorldStore>) -> World {
        World::new(
            config,
            register_default_blocks(),
            BiomeCatalog::default_catalog(),
            store,
        )
        .expect("create world")
    }

    pub(crate) fn temp_world_dir(label: &str) -> PathBuf {
        static COUNTER: AtomicUsize = AtomicUsize::new(0);
        std::env::temp_dir().join(format!(
            "terrane-world-{label}-{}-{}",
            std::process::id(),
            COUNTER.fetch_add(1, Ordering::Relaxed)
        ))
    }

    fn meshes_for(events: &[WorldEvent]) -> Vec<ChunkCoord> {
        let mut coords: Vec<_> = events
            .iter()
            .filter_map(|event| match event {
                WorldEvent::MeshReady { coord, .. } => Some(*coord),
                _ => None,
            })
            .collect();
        coords.sort_by_key(|coord| (coord.x, coord.z));
        coords
    }

    // World position (40, _, 40) sits in chunk (2, 2).
    fn look_at_chunk_two_two(world: &World) {
        assert!(world.update_viewpoint(Vec3::new(40.5, 70.0, 40.5)));
        world.tick(STEP);
    }

    #[test]
    fn viewpoint_activates_the_view_circle_and_publishes_meshes() {
        let world = small_world(None);
        look_at_chunk_two_two(&world);

        let events = world.poll_events();
        let activated = events
            .iter()
            .filter(|event| matches!(event, WorldEvent::ChunkActivated(_)))
            .count();
        assert_eq!(activated, 5);
        assert_eq!(
            meshes_for(&events),
            vec![
                ChunkCoord::new(1, 2),
                ChunkCoord::new(2, 1),
                ChunkCoord::new(2, 2),
                ChunkCoord::new(2, 3),
                ChunkCoord::new(3, 2),
            ]
        );

        assert!(world.is_active(ChunkCoord::new(2, 2)));
        assert!(!world.is_active(ChunkCoord::new(3, 3)));
        let mesh = world.mesh_for(ChunkCoord::new(2, 2)).expect("center mesh");
        assert!(!mesh.is_empty());
        assert_eq!(mesh.origin, [32.0, 0.0, 32.0]);

        let stats = world.stats();
        assert_eq!(stats.active_chunks, 5);
        assert_eq!(stats.chunks_to_update, 0);
        assert_eq!(stats.pending_modifications, 0);

        // Staying inside the same chunk does not restream.
        assert!(!world.update_viewpoint(Vec3::new(45.0, 70.0, 33.0)));
    }

    #[test]
    fn moving_one_chunk_deactivates_the_trailing_edge_but_keeps_it_resident() {
        let world = small_world(None);
        look_at_chunk_two_two(&world);
        world.poll_events();

        assert!(world.update_viewpoint(Vec3::new(56.0, 70.0, 40.0)));
        world.tick(STEP);
        let events = world.poll_events();

        let mut deactivated: Vec<_> = events
            .iter()
            .filter_map(|event| match event {
                WorldEvent::ChunkDeactivated(coord) => Some(*coord),
                _ => None,
            })
            .collect();
        deactivated.sort_by_key(|coord| (coord.x, coord.z));
        assert_eq!(
            deactivated,
            vec![ChunkCoord::new(1, 2), ChunkCoord::new(2, 1), ChunkCoord::new(2, 3)]
        );
        assert!(!world.is_active(ChunkCoord::new(1, 2)));
        assert!(world.slot(ChunkCoord::new(1, 2)).is_some());
        assert!(world.is_active(ChunkCoord::new(4, 2)));
        assert_eq!(world.stats().active_chunks, 5);
    }

    #[test]
    fn viewpoint_changes_only_queue_loads() {
        let mut config = small_config();
        config.streaming.threaded = true;
        let world = world_with(config, None);
        let center = ChunkCoord::new(2, 2);

        assert!(world.update_viewpoint(Vec3::new(40.5, 70.0, 40.5)));
        assert!(world.slot(center).is_none());
        assert_eq!(world.stats().chunks_to_load, 5);
        assert!(world.poll_events().is_empty());

        // Chunk work belongs to the worker in threaded mode; drive it here.
        while world.update_chunks_one() {}
        assert!(world.is_active(center));
        assert_eq!(world.stats().resident_chunks, 5);
        assert_eq!(world.stats().chunks_to_load, 0);
    }

    #[test]
    fn leaving_before_a_queued_load_runs_cancels_it() {
        let world = small_world(None);
        world.update_viewpoint(Vec3::new(40.5, 70.0, 40.5));
        world.update_viewpoint(Vec3::new(120.0, 70.0, 120.0));
        world.tick(STEP);

        assert!(world.slot(ChunkCoord::new(2, 2)).is_none());
        assert!(world.is_active(ChunkCoord::new(7, 7)));
        assert_eq!(world.stats().resident_chunks, 3);
    }

    #[test]
    fn chunks_loaded_beside_a_meshed_chunk_refresh_it() {
        let world = small_world(None);
        look_at_chunk_two_two(&world);
        let edge = ChunkCoord::new(3, 2);
        let slot = world.slot(edge).expect("edge slot");
        let first_version = slot.mesh().version();

        // (4, 2) arrives beside the already meshed (3, 2).
        assert!(world.update_viewpoint(Vec3::new(56.0, 70.0, 40.0)));
        world.tick(STEP);
        assert!(world.slot(ChunkCoord::new(4, 2)).is_some());
        assert!(slot.mesh().version() > first_version);
        let streamed = world.mesh_for(edge).expect("streamed mesh");

        slot.mesh().invalidate();
        world.chunks_to_update.add(edge);
        world.tick(STEP);
        let rebuilt = world.mesh_for(edge).expect("rebuilt mesh");
        assert!(!Arc::ptr_eq(&streamed, &rebuilt));
        assert!(*streamed == *rebuilt, "edge mesh was stale after its neighbour loaded");
    }

    #[test]
    fn reactivating_an_untouched_chunk_reuses_its_mesh() {
        let world = small_world(None);
        let east = Vec3::new(56.0, 70.0, 40.0);
        let center = Vec3::new(40.5, 70.0, 40.5);
        let west = ChunkCoord::new(1, 2);

        // After this every chunk either viewpoint wants is resident.
        for position in [east, center, east] {
            world.update_viewpoint(position);
            world.tick(STEP);
        }
        assert!(!world.is_active(west));
        let version = world.slot(west).expect("west slot").mesh().version();
        assert!(version > 0);
        world.poll_events();

        assert_eq!(world.stats().stale_chunks, 0);
        world.update_viewpoint(center);
        world.tick(STEP);
        assert!(world.is_active(west));
        assert_eq!(world.slot(west).expect("west slot").mesh().version(), version);
        assert!(meshes_for(&world.poll_events()).contains(&west));
    }

    #[test]
    fn edits_apply_through_the_queue_and_remesh_edge_neighbours() {
        let world = small_world(None);
        look_at_chunk_two_two(&world);
        world.poll_events();

        // x = 32 is local x 0 of chunk (2, 2); its -X neighbour must remesh.
        let edge = IVec3::new(32, 110, 40);
        assert!(world.handle_edit(VoxelMod::replace(edge, BlockId::GLASS)));
        assert!(!world.handle_edit(VoxelMod::replace(edge, BlockId::GLASS)));
        assert_eq!(world.voxel_at(edge).id, BlockId::NOTHING);

        world.tick(STEP);
        assert_eq!(world.voxel_at(edge).id, BlockId::GLASS);
        assert_eq!(world.block_type_at(edge).name, "glass");
        assert_eq!(
            meshes_for(&world.poll_events()),
            vec![ChunkCoord::new(1, 2), ChunkCoord::new(2, 2)]
        );
        assert!(world
            .slot(ChunkCoord::new(2, 2))
            .expect("center slot")
            .is_modified());
    }

    #[test]
    fn add_does_not_overwrite_and_keeps_orientation_on_replace() {
        let world = small_world(None);
        look_at_chunk_two_two(&world);

        let floor = IVec3::new(40, 0, 40);
        assert_eq!(world.voxel_at(floor).id, BlockId::BEDROCK);
        world.handle_edit(VoxelMod::add(floor, BlockId::STONE));

        let furnace = IVec3::new(41, 120, 41);
        world.handle_edit(
            VoxelMod::replace(furnace, BlockId::FURNACE).with_orientation(Orientation::LEFT),
        );
        world.tick(STEP);

        assert_eq!(world.voxel_at(floor).id, BlockId::BEDROCK);
        let placed = world.voxel_at(furnace);
        assert_eq!(placed.id, BlockId::FURNACE);
        assert_eq!(placed.orientation, Orientation::LEFT);
    }

    #[test]
    fn lookups_outside_residency_generate_and_outside_the_world_are_nothing() {
        let world = small_world(None);
        let far = IVec3::new(120, 20, 120);
        assert!(world.slot(ChunkCoord::new(7, 7)).is_none());
        assert_eq!(world.voxel_at(far).id, world.generator().block_at(far));
        assert!(world.slot(ChunkCoord::new(7, 7)).is_none());

        assert_eq!(world.voxel_at(IVec3::new(-1, 20, 5)), VoxelState::NOTHING);
        assert_eq!(world.voxel_at(IVec3::new(5, 128, 5)), VoxelState::NOTHING);
        assert_eq!(world.voxel_at(IVec3::new(5, 0, 5)).id, BlockId::BEDROCK);
        assert!(!world.handle_edit(VoxelMod::replace(IVec3::new(-3, 10, 0), BlockId::STONE)));
    }

    #[test]
    fn edits_to_unloaded_chunks_wait_until_the_chunk_is_resident() {
        let world = small_world(None);
        let target = IVec3::new(100, 120, 100);
        assert!(world.handle_edit(VoxelMod::replace(target, BlockId::BRICKS)));
        world.tick(STEP);
        assert_eq!(world.stats().parked_modifications, 1);
        assert_eq!(world.voxel_at(target).id, BlockId::NOTHING);

        world.update_viewpoint(Vec3::new(100.0, 70.0, 100.0));
        world.tick(STEP);
        assert_eq!(world.voxel_at(target).id, BlockId::BRICKS);
    }

    #[test]
    fn covered_grass_smothers_and_open_grass_spreads() {
        let mut config = small_config();
        config.streaming.behaviour_interval_ticks = 1;
        let world = world_with(config, None);
        look_at_chunk_two_two(&world);

        let covered = IVec3::new(36, 110, 36);
        world.handle_edit(VoxelMod::replace(covered, BlockId::GRASS));
        world.handle_edit(VoxelMod::replace(covered + IVec3::Y, BlockId::PLANKS));

        let open = IVec3::new(44, 110, 44);
        let dirt = open + IVec3::X;
        world.handle_edit(VoxelMod::replace(open, BlockId::GRASS));
        world.handle_edit(VoxelMod::replace(dirt, BlockId::DIRT));

        // First tick applies the edits and queues behaviour edits; the second
        // applies those.
        world.tick(STEP);
        world.tick(STEP);

        assert_eq!(world.voxel_at(covered).id, BlockId::DIRT);
        assert_eq!(world.voxel_at(dirt).id, BlockId::GRASS);
        assert_eq!(world.voxel_at(open).id, BlockId::GRASS);
    }

    #[test]
    fn saved_edits_and_seed_come_back_after_restart() {
        let dir = temp_world_dir("restart");
        let edit = IVec3::new(40, 115, 40);
        {
            let store = WorldStore::open(&dir, Compression::Zstd).expect("open store");
            let world = small_world(Some(store));
            look_at_chunk_two_two(&world);
            world.handle_edit(VoxelMod::replace(edit, BlockId::COBBLESTONE));
            world.tick(STEP);

            let saved = world.save().expect("save world");
            assert!(saved >= 1);
            assert_eq!(world.stats().modified_chunks, 0);
        }

        let store = WorldStore::open(&dir, Compression::Zstd).expect("reopen store");
        assert!(store
            .saved_chunks()
            .expect("list chunks")
            .contains(&ChunkCoord::new(2, 2)));

        let mut config = small_config();
        config.world.seed = Some(7);
        let world = world_with(config, Some(store));
        assert_eq!(world.seed(), 42);

        look_at_chunk_two_two(&world);
        assert_eq!(world.voxel_at(edit).id, BlockId::COBBLESTONE);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn requested_saves_wait_for_the_draining_thread() {
        let dir = temp_world_dir("requested");
        let store = WorldStore::open(&dir, Compression::Lz4).expect("open store");
        let world = small_world(Some(store));
        look_at_chunk_two_two(&world);
        world.handle_edit(VoxelMod::replace(IVec3::new(40, 112, 40), BlockId::PLANKS));
        world.tick(STEP);

        assert!(world.service_save_request().is_none());
        world.request_save();
        assert!(world.stats().modified_chunks >= 1);

        world.tick(STEP);
        assert_eq!(world.stats().modified_chunks, 0);
        assert!(world.service_save_request().is_none());
        let reader = WorldStore::open(&dir, Compression::Lz4).expect("reopen store");
        assert!(reader
            .saved_chunks()
            .expect("list chunks")
            .contains(&ChunkCoord::new(2, 2)));

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn world_without_store_saves_nothing() {
        let world = small_world(None);
        look_at_chunk_two_two(&world);
        world.handle_edit(VoxelMod::replace(IVec3::new(40, 110, 40), BlockId::GLASS));
        world.tick(STEP);
        assert_eq!(world.save().expect("save without store"), 0);
        assert_eq!(world.stats().ticks, 2);
        assert_eq!(world.stats().simulated, STEP * 2);
    }
}

//! Tile Tasks
//!
//! Tasks of the raster graph: image decodes, tile rasters and the sentinels
//! signalling that a set of rasters is done. Tile tasks add origin-thread
//! hooks around the worker-side [`Task`]: buffers are acquired when a task is
//! first scheduled and released when the origin thread sees it complete.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use fos_tasks::{OriginTaskRunner, Task, TaskCategory, TaskGraph, TaskKey, TaskState};

use super::buffer::{RasterBuffer, RasterBufferProvider, ResourceId};
use crate::geometry::Rect;
use crate::image::PaintImageId;
use crate::image::decode_cache::DecodeSlot;
use crate::raster_source::{PlaybackSettings, RasterSource};
use crate::tiles::{TileId, TilingHandle};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Origin-thread lifecycle of a tile task
#[derive(Debug, Default)]
pub struct OriginState {
    scheduled: AtomicBool,
    completed: AtomicBool,
}

impl OriginState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_been_scheduled(&self) -> bool {
        self.scheduled.load(Ordering::Acquire)
    }

    pub fn has_completed(&self) -> bool {
        self.completed.load(Ordering::Acquire)
    }

    pub(crate) fn did_schedule(&self) {
        self.scheduled.store(true, Ordering::Release);
    }

    /// A canceled task goes back to unscheduled so a later graph can
    /// schedule it again.
    pub(crate) fn did_complete(&self, finished: bool) {
        self.scheduled.store(false, Ordering::Release);
        if finished {
            self.completed.store(true, Ordering::Release);
        }
    }
}

/// A [`Task`] with origin-thread hooks
pub trait TileTask: Task {
    fn origin_state(&self) -> &OriginState;

    /// Tasks that must finish before this one runs
    fn dependencies(&self) -> &[Arc<dyn TileTask>] {
        &[]
    }

    fn into_task(self: Arc<Self>) -> Arc<dyn Task>;

    /// Called once before the task first enters a graph.
    fn schedule_on_origin_thread(&self, _provider: &dyn RasterBufferProvider) {}

    /// Called once the runner reports the task finished or canceled.
    fn complete_on_origin_thread(&self, _provider: &dyn RasterBufferProvider, _finished: bool) {}

    fn as_raster_task(&self) -> Option<&RasterTask> {
        None
    }

    fn has_completed(&self) -> bool {
        self.origin_state().has_completed()
    }
}

/// A [`TaskGraph`] plus the tile tasks behind its nodes
#[derive(Default)]
pub struct TileTaskGraph {
    pub graph: TaskGraph,
    tasks: HashMap<TaskKey, Arc<dyn TileTask>>,
}

impl TileTaskGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.graph.len()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.is_empty()
    }

    pub fn contains(&self, task: &Arc<dyn TileTask>) -> bool {
        self.graph.contains(TaskKey::of(task))
    }

    pub fn tile_task(&self, key: TaskKey) -> Option<&Arc<dyn TileTask>> {
        self.tasks.get(&key)
    }

    pub fn into_parts(self) -> (TaskGraph, HashMap<TaskKey, Arc<dyn TileTask>>) {
        (self.graph, self.tasks)
    }
}

impl std::fmt::Debug for TileTaskGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TileTaskGraph")
            .field("nodes", &self.graph.nodes.len())
            .field("edges", &self.graph.edges.len())
            .finish()
    }
}

/// Insert a node for `task`. Returns false if it is already in the graph.
pub fn insert_node_for_task(
    graph: &mut TileTaskGraph,
    task: &Arc<dyn TileTask>,
    category: TaskCategory,
    priority: u32,
    dependencies: u32,
) -> bool {
    let key = TaskKey::of(task);
    if graph.graph.contains(key) {
        return false;
    }
    let inserted = graph.graph.insert_node(Arc::clone(task).into_task(), category, priority, dependencies);
    if inserted {
        graph.tasks.insert(key, Arc::clone(task));
    }
    inserted
}

/// Insert `raster_task` and its decode dependencies.
///
/// Decode nodes shared with other rasters are inserted once. Every decode
/// that has not completed gets exactly one edge to the raster and counts
/// as one of its dependencies; completed decodes add neither. Inserting the
/// same raster again changes nothing.
pub fn insert_nodes_for_raster_task(
    graph: &mut TileTaskGraph,
    raster_task: &Arc<dyn TileTask>,
    priority: u32,
    category: TaskCategory,
) {
    let raster_key = TaskKey::of(raster_task);
    // Its dependency count is fixed once inserted, so no new edges may target it.
    if graph.graph.contains(raster_key) {
        return;
    }
    let mut dependencies = 0u32;
    for decode_task in raster_task.dependencies() {
        let decode_key = TaskKey::of(decode_task);
        if !graph.graph.contains(decode_key) {
            insert_node_for_task(graph, decode_task, category, priority, 0);
        }
        if decode_task.has_completed() || decode_task.state().is_finished() {
            continue;
        }
        if graph.graph.add_edge(decode_key, raster_key) {
            dependencies += 1;
        }
    }
    insert_node_for_task(graph, raster_task, category, priority, dependencies);
}

fn schedule_task_on_origin_thread(provider: &dyn RasterBufferProvider, task: &Arc<dyn TileTask>) {
    for dependency in task.dependencies() {
        schedule_task_on_origin_thread(provider, dependency);
    }
    let origin = task.origin_state();
    if origin.has_been_scheduled() || origin.has_completed() {
        return;
    }
    task.schedule_on_origin_thread(provider);
    origin.did_schedule();
}

/// Run the origin-thread schedule hook of every task in `graph` not yet
/// scheduled, dependencies first.
pub fn schedule_tasks_on_origin_thread(provider: &dyn RasterBufferProvider, graph: &TileTaskGraph) {
    for node in &graph.graph.nodes {
        if let Some(task) = graph.tasks.get(&node.key()) {
            schedule_task_on_origin_thread(provider, task);
        }
    }
}

/// Groups of raster tasks with a completion signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskSet {
    RequiredForActivation,
    RequiredForDraw,
    All,
}

/// Callback receiving task-set completion on the origin thread
pub type TaskSetCallback = Arc<dyn Fn(TaskSet) + Send + Sync>;

/// Sentinel depending on every raster of a [`TaskSet`]. Running it posts
/// the notification to the origin thread.
pub struct TaskSetFinishedTask {
    state: TaskState,
    origin: OriginState,
    task_set: TaskSet,
    origin_runner: OriginTaskRunner,
    callback: TaskSetCallback,
}

impl TaskSetFinishedTask {
    pub fn new(task_set: TaskSet, origin_runner: OriginTaskRunner, callback: TaskSetCallback) -> Arc<Self> {
        Arc::new(Self { state: TaskState::new(), origin: OriginState::new(), task_set, origin_runner, callback })
    }

    pub fn task_set(&self) -> TaskSet {
        self.task_set
    }
}

impl Task for TaskSetFinishedTask {
    fn run_on_worker_thread(&self) {
        let callback = Arc::clone(&self.callback);
        let task_set = self.task_set;
        tracing::trace!(?task_set, "task set finished");
        self.origin_runner.post(move || callback(task_set));
    }

    fn state(&self) -> &TaskState {
        &self.state
    }

    fn name(&self) -> &'static str {
        "task_set_finished"
    }
}

impl TileTask for TaskSetFinishedTask {
    fn origin_state(&self) -> &OriginState {
        &self.origin
    }

    fn into_task(self: Arc<Self>) -> Arc<dyn Task> {
        self
    }
}

/// Decode of one image into the shared decode cache
pub struct ImageDecodeTask {
    state: TaskState,
    origin: OriginState,
    slot: Arc<DecodeSlot>,
}

impl ImageDecodeTask {
    pub(crate) fn new(slot: Arc<DecodeSlot>) -> Arc<Self> {
        Arc::new(Self { state: TaskState::new(), origin: OriginState::new(), slot })
    }

    pub fn image_id(&self) -> PaintImageId {
        self.slot.image().id()
    }
}

impl Task for ImageDecodeTask {
    fn run_on_worker_thread(&self) {
        if let Err(error) = self.slot.decode() {
            tracing::warn!(image = self.image_id(), %error, "image decode task failed");
        }
    }

    fn state(&self) -> &TaskState {
        &self.state
    }

    fn name(&self) -> &'static str {
        "image_decode"
    }
}

impl TileTask for ImageDecodeTask {
    fn origin_state(&self) -> &OriginState {
        &self.origin
    }

    fn into_task(self: Arc<Self>) -> Arc<dyn Task> {
        self
    }
}

impl std::fmt::Debug for ImageDecodeTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageDecodeTask")
            .field("image", &self.image_id())
            .field("state", &self.state)
            .finish()
    }
}

/// What a [`RasterTask`] rasters
#[derive(Clone)]
pub struct RasterTaskParams {
    pub tile_id: TileId,
    pub tiling: TilingHandle,
    pub raster_source: Arc<RasterSource>,
    /// Full tile rect in content space
    pub content_rect: Rect,
    /// Part of `content_rect` to play back when the previous content is
    /// reused
    pub invalidated_content_rect: Rect,
    pub contents_scale: f32,
    pub settings: PlaybackSettings,
    /// Tile whose published content a partial raster starts from
    pub previous_content_id: Option<TileId>,
}

/// Raster of one tile
pub struct RasterTask {
    state: TaskState,
    origin: OriginState,
    params: RasterTaskParams,
    dependencies: Vec<Arc<dyn TileTask>>,
    /// Images referenced in the decode cache for this raster
    locked_images: Vec<PaintImageId>,
    buffer: Mutex<Option<Box<dyn RasterBuffer>>>,
    resource: Mutex<Option<ResourceId>>,
}

impl RasterTask {
    pub fn new(
        params: RasterTaskParams,
        dependencies: Vec<Arc<dyn TileTask>>,
        locked_images: Vec<PaintImageId>,
    ) -> Arc<Self> {
        Arc::new(Self {
            state: TaskState::new(),
            origin: OriginState::new(),
            params,
            dependencies,
            locked_images,
            buffer: Mutex::new(None),
            resource: Mutex::new(None),
        })
    }

    pub fn tile_id(&self) -> TileId {
        self.params.tile_id
    }

    pub fn tiling(&self) -> TilingHandle {
        self.params.tiling
    }

    pub fn params(&self) -> &RasterTaskParams {
        &self.params
    }

    pub fn locked_images(&self) -> &[PaintImageId] {
        &self.locked_images
    }

    /// Published resource, once completed on the origin thread
    pub fn resource(&self) -> Option<ResourceId> {
        *lock(&self.resource)
    }
}

impl Task for RasterTask {
    fn run_on_worker_thread(&self) {
        let mut buffer = lock(&self.buffer);
        let Some(buffer) = buffer.as_mut() else {
            tracing::warn!(tile = self.params.tile_id, "raster task ran without a buffer");
            return;
        };
        let params = &self.params;
        let dirty = if params.previous_content_id.is_some() {
            params.invalidated_content_rect
        } else {
            params.content_rect
        };
        buffer.playback(
            &params.raster_source,
            &params.content_rect,
            &dirty,
            params.tile_id,
            params.contents_scale,
            &params.settings,
        );
    }

    fn state(&self) -> &TaskState {
        &self.state
    }

    fn name(&self) -> &'static str {
        "raster"
    }
}

impl TileTask for RasterTask {
    fn origin_state(&self) -> &OriginState {
        &self.origin
    }

    fn dependencies(&self) -> &[Arc<dyn TileTask>] {
        &self.dependencies
    }

    fn into_task(self: Arc<Self>) -> Arc<dyn Task> {
        self
    }

    fn schedule_on_origin_thread(&self, provider: &dyn RasterBufferProvider) {
        let buffer = provider.acquire_buffer_for_raster(
            self.params.content_rect.size(),
            self.params.tile_id,
            self.params.previous_content_id,
        );
        *lock(&self.buffer) = Some(buffer);
    }

    fn complete_on_origin_thread(&self, provider: &dyn RasterBufferProvider, finished: bool) {
        let Some(buffer) = lock(&self.buffer).take() else {
            return;
        };
        let resource = provider.release_buffer_for_raster(buffer, finished);
        *lock(&self.resource) = resource;
    }

    fn as_raster_task(&self) -> Option<&RasterTask> {
        Some(self)
    }
}

impl std::fmt::Debug for RasterTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RasterTask")
            .field("tile", &self.params.tile_id)
            .field("content_rect", &self.params.content_rect)
            .field("dependencies", &self.dependencies.len())
            .field("state", &self.state)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Color;
    use crate::geometry::Size;
    use crate::image::{ImageDecodeCache, PaintImage};
    use crate::raster::BitmapRasterBufferProvider;
    use crate::raster_source::tests::{TestPainter, record};
    use crate::tiles::GenIndex;

    fn raster_task(dependencies: Vec<Arc<dyn TileTask>>) -> Arc<RasterTask> {
        let size = Size::new(16, 16);
        let painter = TestPainter { rects: vec![(Rect::from_size(size), Color::RED)], images: vec![] };
        let params = RasterTaskParams {
            tile_id: 7,
            tiling: TilingHandle::new(1, GenIndex { index: 0, generation: 0 }),
            raster_source: record(&painter, size, false),
            content_rect: Rect::from_size(size),
            invalidated_content_rect: Rect::default(),
            contents_scale: 1.0,
            settings: PlaybackSettings::default(),
            previous_content_id: None,
        };
        RasterTask::new(params, dependencies, Vec::new())
    }

    fn decode_task(cache: &ImageDecodeCache) -> Arc<dyn TileTask> {
        cache.get_task_for_image(&PaintImage::solid(4, 4, Color::BLUE)).unwrap()
    }

    #[test]
    fn test_decode_node_inserted_once() {
        let cache = ImageDecodeCache::default();
        let decode = decode_task(&cache);
        let first: Arc<dyn TileTask> = raster_task(vec![Arc::clone(&decode)]);
        let second: Arc<dyn TileTask> = raster_task(vec![Arc::clone(&decode)]);

        let mut graph = TileTaskGraph::new();
        insert_nodes_for_raster_task(&mut graph, &first, 10, TaskCategory::Foreground);
        insert_nodes_for_raster_task(&mut graph, &second, 11, TaskCategory::Background);
        insert_nodes_for_raster_task(&mut graph, &first, 10, TaskCategory::Foreground);

        assert_eq!(graph.len(), 3);
        assert_eq!(graph.graph.edges.len(), 2);
        let first_node = graph.graph.find_node(TaskKey::of(&first)).unwrap();
        assert_eq!(graph.graph.nodes[first_node].dependencies, 1);
        assert!(graph.graph.validate());
    }

    #[test]
    fn test_existing_raster_node_gets_no_untracked_edges() {
        let cache = ImageDecodeCache::default();
        let decode = decode_task(&cache);
        let raster: Arc<dyn TileTask> = raster_task(vec![Arc::clone(&decode)]);

        let mut graph = TileTaskGraph::new();
        assert!(insert_node_for_task(&mut graph, &raster, TaskCategory::Foreground, 10, 0));
        insert_nodes_for_raster_task(&mut graph, &raster, 10, TaskCategory::Foreground);

        let node = graph.graph.find_node(TaskKey::of(&raster)).unwrap();
        let incoming = graph.graph.edges.iter().filter(|edge| edge.dependent == TaskKey::of(&raster)).count();
        assert_eq!(graph.graph.nodes[node].dependencies as usize, incoming);
        assert_eq!(graph.len(), 1);
    }

    #[test]
    fn test_completed_decode_adds_no_dependency() {
        let cache = ImageDecodeCache::default();
        let decode = decode_task(&cache);
        decode.run_on_worker_thread();
        decode.origin_state().did_complete(true);
        let raster: Arc<dyn TileTask> = raster_task(vec![Arc::clone(&decode)]);

        let mut graph = TileTaskGraph::new();
        insert_nodes_for_raster_task(&mut graph, &raster, 10, TaskCategory::Foreground);

        assert!(graph.graph.edges.is_empty());
        let node = graph.graph.find_node(TaskKey::of(&raster)).unwrap();
        assert_eq!(graph.graph.nodes[node].dependencies, 0);
    }

    #[test]
    fn test_origin_schedule_acquires_buffer_once() {
        let provider = BitmapRasterBufferProvider::new();
        let task = raster_task(Vec::new());
        let as_tile_task: Arc<dyn TileTask> = task.clone();
        let mut graph = TileTaskGraph::new();
        insert_node_for_task(&mut graph, &as_tile_task, TaskCategory::Foreground, 0, 0);

        schedule_tasks_on_origin_thread(&provider, &graph);
        schedule_tasks_on_origin_thread(&provider, &graph);
        assert!(task.origin_state().has_been_scheduled());
        assert_eq!(provider.stats().misses, 1);

        task.run_on_worker_thread();
        task.complete_on_origin_thread(&provider, true);
        task.origin_state().did_complete(true);
        let resource = provider.resource(task.resource().unwrap()).unwrap();
        assert_eq!(resource.pixel(3, 3), Some(Color::RED));
        assert!(task.has_completed());
    }

    #[test]
    fn test_canceled_task_can_be_rescheduled() {
        let provider = BitmapRasterBufferProvider::new();
        let task = raster_task(Vec::new());
        task.schedule_on_origin_thread(&provider);
        task.origin_state().did_schedule();

        task.complete_on_origin_thread(&provider, false);
        task.origin_state().did_complete(false);
        assert!(task.resource().is_none());
        assert!(!task.origin_state().has_been_scheduled());
        assert!(!task.has_completed());
        assert_eq!(provider.resource_count(), 0);
    }

    #[test]
    fn test_task_set_finished_posts_to_origin() {
        let origin = OriginTaskRunner::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let callback: TaskSetCallback = Arc::new(move |set: TaskSet| sink.lock().unwrap().push(set));
        let task = TaskSetFinishedTask::new(TaskSet::RequiredForDraw, origin.clone(), callback);

        task.run_on_worker_thread();
        assert!(seen.lock().unwrap().is_empty());
        assert_eq!(origin.run_pending_tasks(), 1);
        assert_eq!(*seen.lock().unwrap(), vec![TaskSet::RequiredForDraw]);
    }
}

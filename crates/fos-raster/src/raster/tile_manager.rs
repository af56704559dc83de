//! Tile Manager
//!
//! Origin-thread driver of the raster pipeline. `prepare_tiles` picks the
//! tiles that need raster across tiling sets, resolves solid-color tiles on
//! the spot and schedules a graph of decode and raster tasks with task-set
//! sentinels; `check_for_completed_tasks` hands finished rasters back to
//! their tiles.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use fos_tasks::{NamespaceToken, OriginTaskRunner, Task, TaskCategory, TaskError, TaskGraph, TaskGraphRunner, TaskKey};

use super::buffer::{RasterBufferProvider, ResourceId};
use super::tile_task::{
    RasterTask, RasterTaskParams, TaskSet, TaskSetCallback, TaskSetFinishedTask, TileTask, TileTaskGraph,
    insert_node_for_task, insert_nodes_for_raster_task, schedule_tasks_on_origin_thread,
};
use crate::config::{SchedulingPriorities, TilingSettings};
use crate::geometry::Rect;
use crate::image::ImageDecodeCache;
use crate::raster_source::{PlaybackSettings, RasterSource};
use crate::tiles::{PriorityBin, TileDrawInfo, TileId, TilePriority, TileResolution, TilingHandle, TilingSet};

/// A tile waiting for raster, with what is needed to build its task
struct PrioritizedTile {
    set: usize,
    tile_id: TileId,
    tiling: TilingHandle,
    priority: TilePriority,
    required_for_activation: bool,
    required_for_draw: bool,
    content_rect: Rect,
    layer_rect: Rect,
    contents_scale: f32,
    raster_source: Arc<RasterSource>,
    /// Damaged rect and the tile whose content it patches
    invalidation: Option<(Rect, TileId)>,
}

impl PrioritizedTile {
    fn is_required(&self) -> bool {
        self.required_for_activation || self.required_for_draw
    }
}

/// Bin first, required tiles ahead of others in the same bin, then
/// distance and resolution.
fn raster_order(a: &PrioritizedTile, b: &PrioritizedTile) -> Ordering {
    a.priority
        .priority_bin
        .cmp(&b.priority.priority_bin)
        .then_with(|| b.is_required().cmp(&a.is_required()))
        .then_with(|| a.priority.compare(&b.priority))
}

/// Schedules and completes tile rasters
pub struct TileManager {
    runner: Arc<dyn TaskGraphRunner>,
    namespace: NamespaceToken,
    provider: Arc<dyn RasterBufferProvider>,
    image_cache: Arc<ImageDecodeCache>,
    settings: TilingSettings,
    priorities: SchedulingPriorities,
    origin: OriginTaskRunner,
    notify: TaskSetCallback,
    /// Outstanding raster per tile, reused while the tile stays unready
    raster_tasks: HashMap<TileId, Arc<RasterTask>>,
    /// Every scheduled task not yet completed on the origin thread
    scheduled: HashMap<TaskKey, Arc<dyn TileTask>>,
    /// Published resource per tile
    resources: HashMap<TileId, ResourceId>,
}

impl TileManager {
    /// `notify` runs on the origin thread, from
    /// [`check_for_completed_tasks`](Self::check_for_completed_tasks), once
    /// every raster of a [`TaskSet`] has finished.
    pub fn new(
        runner: Arc<dyn TaskGraphRunner>,
        provider: Arc<dyn RasterBufferProvider>,
        image_cache: Arc<ImageDecodeCache>,
        settings: TilingSettings,
        priorities: SchedulingPriorities,
        origin: OriginTaskRunner,
        notify: TaskSetCallback,
    ) -> Self {
        let namespace = runner.generate_namespace_token();
        Self {
            runner,
            namespace,
            provider,
            image_cache,
            settings,
            priorities,
            origin,
            notify,
            raster_tasks: HashMap::new(),
            scheduled: HashMap::new(),
            resources: HashMap::new(),
        }
    }

    pub fn provider(&self) -> &Arc<dyn RasterBufferProvider> {
        &self.provider
    }

    pub fn image_cache(&self) -> &Arc<ImageDecodeCache> {
        &self.image_cache
    }

    /// Rasters scheduled and not yet completed
    pub fn num_pending_raster_tasks(&self) -> usize {
        self.raster_tasks.len()
    }

    pub fn has_scheduled_tasks(&self) -> bool {
        !self.scheduled.is_empty()
    }

    pub fn resource_for_tile(&self, tile_id: TileId) -> Option<ResourceId> {
        self.resources.get(&tile_id).copied()
    }

    /// Schedule raster for the most urgent unready tiles of `tiling_sets`,
    /// replacing the previous graph. Returns the number of rasters
    /// scheduled.
    ///
    /// `tiling_sets` must hold every set with tiles drawing resources of
    /// this manager; resources no tile refers to are released.
    pub fn prepare_tiles(&mut self, tiling_sets: &mut [&mut TilingSet]) -> Result<usize, TaskError> {
        let mut candidates = gather_tiles(tiling_sets);
        candidates.sort_by(raster_order);
        candidates.truncate(self.settings.max_tiles_for_interest_area);

        let capabilities = self.provider.capabilities();
        if capabilities.solid_color_analysis {
            let mut needs_raster = Vec::with_capacity(candidates.len());
            for candidate in candidates {
                let solid = candidate
                    .raster_source
                    .perform_solid_color_analysis(&candidate.content_rect, candidate.contents_scale);
                match solid {
                    Some(color) => {
                        if let Some(tile) = tiling_sets[candidate.set].tile_mut(candidate.tile_id) {
                            tile.set_draw_info(TileDrawInfo::SolidColor(color));
                            tile.clear_invalidation();
                        }
                    }
                    None => needs_raster.push(candidate),
                }
            }
            candidates = needs_raster;
        }
        if !capabilities.canvas_playback && !candidates.is_empty() {
            tracing::debug!(tiles = candidates.len(), "provider cannot play back; tiles stay pending");
            candidates.clear();
        }

        let activation_done: Arc<dyn TileTask> = self.task_set_finished(TaskSet::RequiredForActivation);
        let draw_done: Arc<dyn TileTask> = self.task_set_finished(TaskSet::RequiredForDraw);
        let all_done: Arc<dyn TileTask> = self.task_set_finished(TaskSet::All);
        let (activation_key, draw_key, all_key) =
            (TaskKey::of(&activation_done), TaskKey::of(&draw_done), TaskKey::of(&all_done));
        let (mut activation_count, mut draw_count, mut all_count) = (0u32, 0u32, 0u32);

        let mut graph = TileTaskGraph::new();
        let mut rasters = 0;
        for (rank, candidate) in candidates.iter().enumerate() {
            let raster = match self.raster_tasks.get(&candidate.tile_id) {
                // Done on a worker; the tile is updated once it is collected.
                Some(existing) if existing.state().is_finished() => continue,
                Some(existing) => Arc::clone(existing),
                None => {
                    let created = self.create_raster_task(candidate);
                    self.raster_tasks.insert(candidate.tile_id, Arc::clone(&created));
                    created
                }
            };
            let raster: Arc<dyn TileTask> = raster;
            let category = if candidate.is_required() || candidate.priority.priority_bin == PriorityBin::Now {
                TaskCategory::Foreground
            } else {
                TaskCategory::Background
            };
            let priority = self.priorities.raster_base.saturating_add(rank as u32);
            insert_nodes_for_raster_task(&mut graph, &raster, priority, category);
            rasters += 1;

            let raster_key = TaskKey::of(&raster);
            if candidate.required_for_activation && graph.graph.add_edge(raster_key, activation_key) {
                activation_count += 1;
            }
            if candidate.required_for_draw && graph.graph.add_edge(raster_key, draw_key) {
                draw_count += 1;
            }
            if graph.graph.add_edge(raster_key, all_key) {
                all_count += 1;
            }
        }

        let priorities = self.priorities;
        let foreground = TaskCategory::Foreground;
        insert_node_for_task(&mut graph, &activation_done, foreground, priorities.required_for_activation_done, activation_count);
        insert_node_for_task(&mut graph, &draw_done, foreground, priorities.required_for_draw_done, draw_count);
        insert_node_for_task(&mut graph, &all_done, foreground, priorities.all_done, all_count);

        schedule_tasks_on_origin_thread(self.provider.as_ref(), &graph);
        let (task_graph, tasks) = graph.into_parts();
        self.scheduled.extend(tasks);
        self.runner.schedule_tasks(self.namespace, task_graph)?;

        self.release_unused_resources(tiling_sets);
        tracing::debug!(
            rasters,
            required_for_activation = activation_count,
            required_for_draw = draw_count,
            "prepared tiles"
        );
        Ok(rasters)
    }

    fn task_set_finished(&self, task_set: TaskSet) -> Arc<TaskSetFinishedTask> {
        TaskSetFinishedTask::new(task_set, self.origin.clone(), Arc::clone(&self.notify))
    }

    fn create_raster_task(&self, candidate: &PrioritizedTile) -> Arc<RasterTask> {
        let mut dependencies: Vec<Arc<dyn TileTask>> = Vec::new();
        let mut locked_images = Vec::new();
        for positioned in candidate.raster_source.get_discardable_images_in_rect(&candidate.layer_rect) {
            let id = positioned.image.id();
            if locked_images.contains(&id) {
                continue;
            }
            locked_images.push(id);
            if let Some(decode) = self.image_cache.get_task_for_image(&positioned.image) {
                dependencies.push(decode);
            }
        }

        let (invalidated_content_rect, previous_content_id) = match candidate.invalidation {
            Some((rect, previous)) => (rect, Some(previous)),
            None => (candidate.content_rect, None),
        };
        let params = RasterTaskParams {
            tile_id: candidate.tile_id,
            tiling: candidate.tiling,
            raster_source: Arc::clone(&candidate.raster_source),
            content_rect: candidate.content_rect,
            invalidated_content_rect,
            contents_scale: candidate.contents_scale,
            settings: PlaybackSettings { skip_images: false, image_provider: Some(Arc::clone(&self.image_cache)) },
            previous_content_id,
        };
        tracing::trace!(tile = candidate.tile_id, decodes = dependencies.len(), "created raster task");
        RasterTask::new(params, dependencies, locked_images)
    }

    /// Complete finished and canceled tasks on the origin thread, give
    /// rastered tiles their resources and deliver task-set notifications.
    /// Returns the number of tiles that became ready.
    pub fn check_for_completed_tasks(&mut self, tiling_sets: &mut [&mut TilingSet]) -> usize {
        let mut ready = 0;
        for task in self.runner.collect_completed_tasks(self.namespace) {
            let Some(tile_task) = self.scheduled.remove(&TaskKey::of(&task)) else {
                continue;
            };
            let finished = task.state().is_finished();
            tile_task.complete_on_origin_thread(self.provider.as_ref(), finished);
            tile_task.origin_state().did_complete(finished);
            if let Some(raster) = tile_task.as_raster_task() {
                if self.on_raster_task_completed(raster, finished, tiling_sets) {
                    ready += 1;
                }
            }
        }
        self.origin.run_pending_tasks();
        ready
    }

    fn on_raster_task_completed(
        &mut self,
        raster: &RasterTask,
        finished: bool,
        tiling_sets: &mut [&mut TilingSet],
    ) -> bool {
        let tile_id = raster.tile_id();
        let is_current = self
            .raster_tasks
            .get(&tile_id)
            .map(|current| std::ptr::eq(Arc::as_ptr(current), raster))
            .unwrap_or(false);
        if is_current {
            self.raster_tasks.remove(&tile_id);
        }
        for image in raster.locked_images() {
            self.image_cache.unref_image(*image);
        }

        let Some(resource) = raster.resource().filter(|_| finished) else {
            return false;
        };
        let tile = tiling_sets.iter_mut().find_map(|set| set.tile_mut(tile_id));
        let Some(tile) = tile else {
            tracing::trace!(tile = tile_id, "rastered tile is gone");
            self.provider.delete_resource(resource);
            return false;
        };
        tile.set_draw_info(TileDrawInfo::Resource(resource));
        tile.clear_invalidation();
        if let Some(replaced) = self.resources.insert(tile_id, resource) {
            self.provider.delete_resource(replaced);
        }
        true
    }

    /// Delete resources of tiles that no longer exist and are not the base
    /// of a pending partial raster.
    fn release_unused_resources(&mut self, tiling_sets: &[&mut TilingSet]) {
        let live: HashSet<TileId> = tiling_sets
            .iter()
            .flat_map(|set| set.tiles())
            .flat_map(|tile| std::iter::once(tile.id()).chain(tile.invalidated_id()))
            .collect();
        let stale: Vec<TileId> = self.resources.keys().filter(|id| !live.contains(id)).copied().collect();
        for tile_id in stale {
            if let Some(resource) = self.resources.remove(&tile_id) {
                self.provider.delete_resource(resource);
            }
        }
    }

    /// Block until no scheduled task is running. With a synchronous runner
    /// this runs the whole graph.
    pub fn flush(&self) {
        self.runner.wait_for_tasks_to_finish_running(self.namespace);
    }

    /// Cancel everything not yet started and complete what is left.
    pub fn finish_tasks_and_clean_up(&mut self) {
        if let Err(error) = self.runner.schedule_tasks(self.namespace, TaskGraph::new()) {
            tracing::debug!(%error, "could not cancel raster tasks");
        }
        self.runner.wait_for_tasks_to_finish_running(self.namespace);
        for task in self.runner.collect_completed_tasks(self.namespace) {
            let Some(tile_task) = self.scheduled.remove(&TaskKey::of(&task)) else {
                continue;
            };
            let finished = task.state().is_finished();
            tile_task.complete_on_origin_thread(self.provider.as_ref(), finished);
            tile_task.origin_state().did_complete(finished);
            if let Some(raster) = tile_task.as_raster_task() {
                for image in raster.locked_images() {
                    self.image_cache.unref_image(*image);
                }
                if let Some(resource) = raster.resource() {
                    self.provider.delete_resource(resource);
                }
            }
        }
        self.raster_tasks.clear();
        self.scheduled.clear();
    }
}

impl Drop for TileManager {
    fn drop(&mut self) {
        self.finish_tasks_and_clean_up();
        for (_, resource) in self.resources.drain() {
            self.provider.delete_resource(resource);
        }
    }
}

impl std::fmt::Debug for TileManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TileManager")
            .field("namespace", &self.namespace)
            .field("raster_tasks", &self.raster_tasks.len())
            .field("scheduled", &self.scheduled.len())
            .field("resources", &self.resources.len())
            .finish()
    }
}

/// Unready tiles of high- and low-res tilings. Occluded tiles are skipped
/// unless something requires them.
fn gather_tiles(tiling_sets: &[&mut TilingSet]) -> Vec<PrioritizedTile> {
    let mut candidates = Vec::new();
    for (set_index, set) in tiling_sets.iter().enumerate() {
        for tiling in set.tilings() {
            if tiling.resolution() == TileResolution::NonIdeal {
                continue;
            }
            for tile in tiling.tiles() {
                let required = tile.required_for_activation() || tile.required_for_draw();
                if tile.is_ready_to_draw() || (tile.is_occluded() && !required) {
                    continue;
                }
                candidates.push(PrioritizedTile {
                    set: set_index,
                    tile_id: tile.id(),
                    tiling: tile.tiling(),
                    priority: *tile.priority(),
                    required_for_activation: tile.required_for_activation(),
                    required_for_draw: tile.required_for_draw(),
                    content_rect: tile.content_rect(),
                    layer_rect: tile.enclosing_layer_rect(),
                    contents_scale: tile.contents_scale(),
                    raster_source: Arc::clone(tiling.raster_source()),
                    invalidation: tile.invalidated_id().map(|id| (tile.invalidated_content_rect(), id)),
                });
            }
        }
    }
    candidates
}

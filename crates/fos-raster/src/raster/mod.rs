//! Raster
//!
//! Scheduling and execution of tile rasters: buffer providers, playback into
//! memory, the decode/raster/sentinel task graph and the tile manager that
//! drives it from the origin thread.

mod buffer;
mod playback;
mod tile_manager;
mod tile_task;

pub use buffer::{
    BitmapRasterBufferProvider, BitmapResource, BufferPoolStats, ProviderCapabilities, RasterBuffer,
    RasterBufferProvider, ResourceId,
};
pub use playback::{PixelFormat, playback_to_memory};
pub use tile_manager::TileManager;
pub use tile_task::{
    ImageDecodeTask, OriginState, RasterTask, RasterTaskParams, TaskSet, TaskSetCallback, TaskSetFinishedTask,
    TileTask, TileTaskGraph, insert_node_for_task, insert_nodes_for_raster_task, schedule_tasks_on_origin_thread,
};

//! Writer, bounds-checked reader and pool classifier for safety-critical
//! (`VK_PIPELINE_CACHE_HEADER_VERSION_SAFETY_CRITICAL_ONE`) pipeline cache blobs.
#![forbid(unsafe_code)]

pub mod format;
pub mod foundation;
pub mod manifest;
pub mod pool;
pub mod reader;
pub mod report;
pub mod writer;

pub use format::layout::{
    HEADER_SIZE, HEADER_VERSION_SAFETY_CRITICAL_ONE, HeaderVersionOne, PIPELINE_INDEX_ENTRY_SIZE,
    PipelineIndexEntry, STAGE_INDEX_ENTRY_SIZE, SafetyCriticalHeader, StageIndexEntry,
    VALIDATION_VERSION_SAFETY_CRITICAL_ONE,
};
pub use foundation::core::{HexId, UUID_SIZE, Uuid, parse_uuid_hex, uuid_to_hex};
pub use foundation::error::{PcError, PcResult};
pub use manifest::{CacheManifest, LoadedManifest, PipelineManifest, StageManifest};
pub use pool::{Classification, Pool, UnfitPipeline, classify, sort_pools};
pub use reader::CacheReader;
pub use report::{DetailMode, PoolReport, PoolSummary, write_cache_info};
pub use writer::entry::{PipelineEntry, StageEntry};
pub use writer::plan::{LayoutPlan, Region, RegionKind, Span};
pub use writer::{CacheWriter, LayoutConfig};

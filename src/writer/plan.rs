//! Single layout pass shared by size queries and writes.
//!
//! Every byte range the writer touches is decided here, once. Size queries read
//! the plan's end offset; writes copy bytes into the plan's spans. The two can
//! therefore never disagree about where anything lives.

use crate::format::cursor::strided_offset;
use crate::format::layout::{
    HEADER_SIZE, PIPELINE_INDEX_ENTRY_SIZE, PipelineIndexEntry, STAGE_INDEX_ENTRY_SIZE,
    SafetyCriticalHeader, StageIndexEntry,
};
use crate::foundation::error::{PcError, PcResult};
use crate::writer::entry::{PipelineEntry, reserved_vec};

/// A byte range `[offset, offset + size)` inside the blob.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Span {
    pub offset: u64,
    pub size: u64,
}

impl Span {
    /// One past the last byte.
    pub fn end(self) -> PcResult<u64> {
        self.offset
            .checked_add(self.size)
            .ok_or_else(|| PcError::overflow(format!("span at {} + {}", self.offset, self.size)))
    }
}

/// What a planned region holds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RegionKind {
    /// The fixed header at offset 0.
    Header,
    /// Vendor bytes between the header and the pipeline index.
    GlobalVendorData,
    /// A pipeline index row.
    PipelineIndexEntry { pipeline: u32 },
    /// Vendor bytes in a pipeline index stride gap.
    PipelineVendorData { pipeline: u32 },
    /// A pipeline's JSON payload.
    Json { pipeline: u32 },
    /// A stage index row.
    StageIndexEntry { pipeline: u32, stage: u32 },
    /// Vendor bytes in a stage index stride gap.
    StageVendorData { pipeline: u32, stage: u32 },
    /// A stage's code payload.
    Code { pipeline: u32, stage: u32 },
}

/// One entry of the flattened `(field, offset, size)` plan.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Region {
    pub kind: RegionKind,
    pub span: Span,
}

/// Placement of one stage.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StagePlan {
    /// Offset of the stage index row.
    pub entry_offset: u64,
    /// Code payload, absent for empty code.
    pub code: Option<Span>,
    pub vendor: Option<Span>,
}

impl StagePlan {
    /// The row this plan produces.
    pub fn index_row(&self) -> StageIndexEntry {
        match self.code {
            Some(span) => StageIndexEntry {
                code_size: span.size,
                code_offset: span.offset,
            },
            None => StageIndexEntry::default(),
        }
    }
}

/// Placement of one pipeline and everything it owns.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PipelinePlan {
    /// Offset of the pipeline index row.
    pub entry_offset: u64,
    pub vendor: Option<Span>,
    /// JSON payload, absent for empty JSON.
    pub json: Option<Span>,
    pub stage_index_stride: u32,
    /// Offset of the stage index, 0 when there are no stages.
    pub stage_index_offset: u64,
    pub stages: Vec<StagePlan>,
    /// First byte of this pipeline's payload area.
    pub extra_start: u64,
    /// One past the last byte of this pipeline's payload area.
    pub extra_end: u64,
}

impl PipelinePlan {
    /// The row this plan produces for `entry`.
    pub fn index_row(&self, entry: &PipelineEntry<'_>) -> PipelineIndexEntry {
        let (json_size, json_offset) = self.json.map_or((0, 0), |s| (s.size, s.offset));
        let has_stages = !self.stages.is_empty();
        PipelineIndexEntry {
            pipeline_identifier: *entry.identifier(),
            pipeline_memory_size: entry.memory_size(),
            json_size,
            json_offset,
            stage_index_count: self.stages.len() as u32,
            stage_index_stride: if has_stages {
                self.stage_index_stride
            } else {
                0
            },
            stage_index_offset: self.stage_index_offset,
        }
    }
}

/// Complete placement of a cache blob.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LayoutPlan {
    pub header: SafetyCriticalHeader,
    /// Global vendor bytes after the header.
    pub global_vendor: Option<Span>,
    /// Per-pipeline placements in ordinal order.
    pub pipelines: Vec<PipelinePlan>,
    pub index_end: u64,
    /// One past the last byte written.
    pub end: u64,
}

impl LayoutPlan {
    /// Bytes from the start of the pipeline index to the end of the blob.
    pub fn pipeline_index_size(&self) -> u64 {
        self.end - self.header.pipeline_index_offset
    }

    /// Flatten into `(kind, span)` records in write order.
    pub fn regions(&self) -> Vec<Region> {
        let mut out = vec![Region {
            kind: RegionKind::Header,
            span: Span {
                offset: 0,
                size: HEADER_SIZE,
            },
        }];
        if let Some(span) = self.global_vendor {
            out.push(Region {
                kind: RegionKind::GlobalVendorData,
                span,
            });
        }
        for (i, p) in self.pipelines.iter().enumerate() {
            let pipeline = i as u32;
            out.push(Region {
                kind: RegionKind::PipelineIndexEntry { pipeline },
                span: Span {
                    offset: p.entry_offset,
                    size: u64::from(PIPELINE_INDEX_ENTRY_SIZE),
                },
            });
            if let Some(span) = p.vendor {
                out.push(Region {
                    kind: RegionKind::PipelineVendorData { pipeline },
                    span,
                });
            }
        }
        for (i, p) in self.pipelines.iter().enumerate() {
            let pipeline = i as u32;
            if let Some(span) = p.json {
                out.push(Region {
                    kind: RegionKind::Json { pipeline },
                    span,
                });
            }
            for (j, s) in p.stages.iter().enumerate() {
                let stage = j as u32;
                out.push(Region {
                    kind: RegionKind::StageIndexEntry { pipeline, stage },
                    span: Span {
                        offset: s.entry_offset,
                        size: u64::from(STAGE_INDEX_ENTRY_SIZE),
                    },
                });
                if let Some(span) = s.vendor {
                    out.push(Region {
                        kind: RegionKind::StageVendorData { pipeline, stage },
                        span,
                    });
                }
            }
            for (j, s) in p.stages.iter().enumerate() {
                if let Some(span) = s.code {
                    out.push(Region {
                        kind: RegionKind::Code {
                            pipeline,
                            stage: j as u32,
                        },
                        span,
                    });
                }
            }
        }
        out
    }
}

/// Place `entry`'s row at `entry_offset` and its payloads from `extra_offset`.
///
/// Payload order: JSON, stage index, then each stage's code in stage order.
pub(crate) fn plan_pipeline(
    entry: &PipelineEntry<'_>,
    entry_offset: u64,
    extra_offset: u64,
    stage_stride: u32,
) -> PcResult<PipelinePlan> {
    let mut cursor = extra_offset;

    let json = match entry.json() {
        Some(bytes) if !bytes.is_empty() => {
            let span = Span {
                offset: cursor,
                size: bytes.len() as u64,
            };
            cursor = span.end()?;
            Some(span)
        }
        _ => None,
    };

    let stage_count = entry.stage_count();
    let mut stages = reserved_vec(stage_count as usize, "stage plans")?;
    let mut stage_index_offset = 0;
    if stage_count > 0 {
        if stage_stride < STAGE_INDEX_ENTRY_SIZE {
            return Err(PcError::layout(format!(
                "stage index stride {stage_stride} is below the row size {STAGE_INDEX_ENTRY_SIZE}"
            )));
        }
        let index_size = u64::from(stage_count)
            .checked_mul(u64::from(stage_stride))
            .ok_or_else(|| PcError::overflow("stage index size"))?;
        stage_index_offset = cursor;
        cursor = cursor
            .checked_add(index_size)
            .ok_or_else(|| PcError::overflow("stage index end"))?;

        let gap = u64::from(stage_stride.saturating_sub(STAGE_INDEX_ENTRY_SIZE));
        for (i, stage) in entry.stages().iter().enumerate() {
            let row = strided_offset(stage_index_offset, i as u32, stage_stride)
                .ok_or_else(|| PcError::overflow("stage index row offset"))?;

            let vendor = match stage.vendor_data() {
                Some(bytes) if !bytes.is_empty() => {
                    if bytes.len() as u64 > gap {
                        return Err(PcError::layout(format!(
                            "stage {i} vendor data is {} bytes but the stage stride leaves {gap}",
                            bytes.len()
                        )));
                    }
                    Some(Span {
                        offset: row + u64::from(STAGE_INDEX_ENTRY_SIZE),
                        size: bytes.len() as u64,
                    })
                }
                _ => None,
            };

            let code = match stage.shader_code() {
                Some(bytes) if !bytes.is_empty() => {
                    let span = Span {
                        offset: cursor,
                        size: bytes.len() as u64,
                    };
                    cursor = span.end()?;
                    Some(span)
                }
                _ => None,
            };

            stages.push(StagePlan {
                entry_offset: row,
                code,
                vendor,
            });
        }
    }

    Ok(PipelinePlan {
        entry_offset,
        vendor: None,
        json,
        stage_index_stride: stage_stride,
        stage_index_offset,
        stages,
        extra_start: extra_offset,
        extra_end: cursor,
    })
}

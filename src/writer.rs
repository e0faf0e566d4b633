//! Assembling pipeline cache blobs.

pub mod entry;
pub mod plan;

use crate::format::cursor::strided_offset;
use crate::format::layout::{
    HEADER_SIZE, HEADER_VERSION_SAFETY_CRITICAL_ONE, HeaderVersionOne, PIPELINE_INDEX_ENTRY_SIZE,
    STAGE_INDEX_ENTRY_SIZE, SafetyCriticalHeader, VALIDATION_VERSION_SAFETY_CRITICAL_ONE,
    WireRecord as _,
};
use crate::foundation::core::Uuid;
use crate::foundation::error::{PcError, PcResult};
use entry::{PipelineEntry, copy_into, filled_vec, reserved_vec};
use plan::{LayoutPlan, Span, plan_pipeline};

/// Optional overrides of the default index layout.
///
/// Unset fields keep the writer's current value.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    /// Stride between pipeline index rows (at least 56).
    pub pipeline_index_stride: Option<u32>,
    /// Offset of the pipeline index (greater than the header size).
    pub pipeline_index_offset: Option<u64>,
    /// Stride between stage index rows (at least 16).
    pub stage_index_stride: Option<u32>,
}

/// Collects pipeline entries and writes the header, pipeline index and all
/// payloads into a caller-supplied buffer.
///
/// Entries are borrowed: they and the byte ranges they reference must outlive
/// the writer. Every misuse that would corrupt the blob is reported as a
/// [`PcError`] rather than aborting.
#[derive(Clone, Debug)]
pub struct CacheWriter<'a> {
    vendor_id: u32,
    device_id: u32,
    pipeline_cache_uuid: Uuid,
    implementation_data: u32,

    pipeline_index_stride: u32,
    pipeline_index_offset: u64,
    pipeline_index_offset_set: bool,
    stage_index_stride: u32,

    global_vendor_data: Option<&'a [u8]>,
    pipeline_index: Option<Vec<Option<&'a PipelineEntry<'a>>>>,
}

impl Default for CacheWriter<'_> {
    fn default() -> Self {
        Self {
            vendor_id: 0,
            device_id: 0,
            pipeline_cache_uuid: [0; 16],
            implementation_data: 0,
            pipeline_index_stride: PIPELINE_INDEX_ENTRY_SIZE,
            pipeline_index_offset: HEADER_SIZE,
            pipeline_index_offset_set: false,
            stage_index_stride: STAGE_INDEX_ENTRY_SIZE,
            global_vendor_data: None,
            pipeline_index: None,
        }
    }
}

impl<'a> CacheWriter<'a> {
    /// Create a writer for the given device and cache UUID.
    pub fn new(vendor_id: u32, device_id: u32, pipeline_cache_uuid: Uuid) -> Self {
        Self {
            vendor_id,
            device_id,
            pipeline_cache_uuid,
            ..Self::default()
        }
    }

    /// Reserve `count` pipeline slots. Only the first call succeeds, so
    /// registered entries are never silently dropped.
    pub fn allocate_pipeline_index(&mut self, count: u32) -> PcResult<()> {
        if self.pipeline_index.is_some() {
            return Err(PcError::layout("pipeline index already allocated"));
        }
        self.pipeline_index = Some(filled_vec(count as usize, None, "pipeline slots")?);
        Ok(())
    }

    /// Register `entry` at ordinal `index`, which must be below the allocated count.
    pub fn set_pipeline_entry(&mut self, index: u32, entry: &'a PipelineEntry<'a>) -> PcResult<()> {
        let count = self.pipeline_index_count();
        let slot = self
            .pipeline_index
            .as_mut()
            .and_then(|slots| slots.get_mut(index as usize))
            .ok_or_else(|| {
                PcError::layout(format!(
                    "pipeline index {index} out of range for {count} allocated entries"
                ))
            })?;
        *slot = Some(entry);
        Ok(())
    }

    /// Set the pipeline index stride; the extra bytes per row hold vendor data.
    pub fn set_pipeline_index_stride(&mut self, stride: u32) -> PcResult<()> {
        if stride < PIPELINE_INDEX_ENTRY_SIZE {
            return Err(PcError::layout(format!(
                "pipeline index stride {stride} is smaller than an entry ({PIPELINE_INDEX_ENTRY_SIZE})"
            )));
        }
        self.pipeline_index_stride = stride;
        Ok(())
    }

    /// Move the pipeline index past the header to reserve room for global vendor data.
    pub fn set_pipeline_index_offset(&mut self, offset: u64) -> PcResult<()> {
        if offset <= HEADER_SIZE {
            return Err(PcError::layout(format!(
                "pipeline index offset {offset} must be past the {HEADER_SIZE}-byte header"
            )));
        }
        self.pipeline_index_offset = offset;
        self.pipeline_index_offset_set = true;
        Ok(())
    }

    /// Set the stage index stride; the extra bytes per row hold vendor data.
    pub fn set_stage_index_stride(&mut self, stride: u32) -> PcResult<()> {
        if stride < STAGE_INDEX_ENTRY_SIZE {
            return Err(PcError::layout(format!(
                "stage index stride {stride} is smaller than an entry ({STAGE_INDEX_ENTRY_SIZE})"
            )));
        }
        self.stage_index_stride = stride;
        Ok(())
    }

    /// Apply every override present in `config`.
    pub fn apply_layout(&mut self, config: &LayoutConfig) -> PcResult<()> {
        if let Some(stride) = config.pipeline_index_stride {
            self.set_pipeline_index_stride(stride)?;
        }
        if let Some(offset) = config.pipeline_index_offset {
            self.set_pipeline_index_offset(offset)?;
        }
        if let Some(stride) = config.stage_index_stride {
            self.set_stage_index_stride(stride)?;
        }
        Ok(())
    }

    /// Set the vendor id.
    pub fn set_vendor_id(&mut self, vendor_id: u32) {
        self.vendor_id = vendor_id;
    }

    /// Set the device id.
    pub fn set_device_id(&mut self, device_id: u32) {
        self.device_id = device_id;
    }

    /// Set the cache UUID.
    pub fn set_pipeline_cache_uuid(&mut self, uuid: Uuid) {
        self.pipeline_cache_uuid = uuid;
    }

    /// Set the opaque implementation data header field.
    pub fn set_implementation_data(&mut self, data: u32) {
        self.implementation_data = data;
    }

    /// Attach bytes stored between the header and the pipeline index.
    ///
    /// Unless an index offset was set explicitly, the index moves to directly
    /// after these bytes.
    pub fn set_global_vendor_data(&mut self, data: &'a [u8]) {
        self.global_vendor_data = Some(data);
        if !self.pipeline_index_offset_set {
            self.pipeline_index_offset = HEADER_SIZE + data.len() as u64;
        }
    }

    /// Number of allocated pipeline slots.
    pub fn pipeline_index_count(&self) -> u32 {
        self.pipeline_index.as_ref().map_or(0, |s| s.len() as u32)
    }

    /// Current pipeline index stride.
    pub fn pipeline_index_stride(&self) -> u32 {
        self.pipeline_index_stride
    }

    /// Current pipeline index offset.
    pub fn pipeline_index_offset(&self) -> u64 {
        self.pipeline_index_offset
    }

    /// Current stage index stride.
    pub fn stage_index_stride(&self) -> u32 {
        self.stage_index_stride
    }

    /// The header this writer produces.
    pub fn header(&self) -> SafetyCriticalHeader {
        SafetyCriticalHeader {
            version_one: HeaderVersionOne {
                header_size: HEADER_SIZE as u32,
                header_version: HEADER_VERSION_SAFETY_CRITICAL_ONE,
                vendor_id: self.vendor_id,
                device_id: self.device_id,
                pipeline_cache_uuid: self.pipeline_cache_uuid,
            },
            validation_version: VALIDATION_VERSION_SAFETY_CRITICAL_ONE,
            implementation_data: self.implementation_data,
            pipeline_index_count: self.pipeline_index_count(),
            pipeline_index_stride: self.pipeline_index_stride,
            pipeline_index_offset: self.pipeline_index_offset,
        }
    }

    fn global_vendor_span(&self) -> PcResult<Option<Span>> {
        let Some(bytes) = self.global_vendor_data.filter(|b| !b.is_empty()) else {
            return Ok(None);
        };
        let span = Span {
            offset: HEADER_SIZE,
            size: bytes.len() as u64,
        };
        if span.end()? > self.pipeline_index_offset {
            return Err(PcError::layout(format!(
                "global vendor data ({} bytes) overlaps the pipeline index at offset {}",
                bytes.len(),
                self.pipeline_index_offset
            )));
        }
        Ok(Some(span))
    }

    /// Decide where every row and payload goes without writing anything.
    #[tracing::instrument(skip(self), fields(pipelines = self.pipeline_index_count()))]
    pub fn plan(&self) -> PcResult<LayoutPlan> {
        let global_vendor = self.global_vendor_span()?;

        let count = self.pipeline_index_count();
        let stride = self.pipeline_index_stride;
        let index_size = u64::from(count)
            .checked_mul(u64::from(stride))
            .ok_or_else(|| PcError::overflow("pipeline index size"))?;
        let index_end = self
            .pipeline_index_offset
            .checked_add(index_size)
            .ok_or_else(|| PcError::overflow("pipeline index end"))?;

        let gap = u64::from(stride - PIPELINE_INDEX_ENTRY_SIZE);
        let slots = self.pipeline_index.as_deref().unwrap_or(&[]);
        let mut pipelines = reserved_vec(slots.len(), "pipeline plans")?;
        let mut cursor = index_end;
        for (i, slot) in slots.iter().enumerate() {
            let entry = slot.ok_or_else(|| {
                PcError::layout(format!("pipeline index slot {i} was never populated"))
            })?;
            let entry_offset = strided_offset(self.pipeline_index_offset, i as u32, stride)
                .ok_or_else(|| PcError::overflow("pipeline index row offset"))?;

            let mut planned = plan_pipeline(entry, entry_offset, cursor, self.stage_index_stride)?;
            if let Some(bytes) = entry.vendor_data().filter(|b| !b.is_empty()) {
                if bytes.len() as u64 > gap {
                    return Err(PcError::layout(format!(
                        "pipeline {i} vendor data is {} bytes but the index stride leaves {gap}",
                        bytes.len()
                    )));
                }
                planned.vendor = Some(Span {
                    offset: entry_offset + u64::from(PIPELINE_INDEX_ENTRY_SIZE),
                    size: bytes.len() as u64,
                });
            }
            cursor = planned.extra_end;
            pipelines.push(planned);
        }

        tracing::debug!(index_end, end = cursor, "planned pipeline cache layout");
        Ok(LayoutPlan {
            header: self.header(),
            global_vendor,
            pipelines,
            index_end,
            end: cursor,
        })
    }

    /// Bytes the pipeline index and all nested data occupy, excluding the header.
    pub fn pipeline_index_size(&self) -> PcResult<u64> {
        Ok(self.plan()?.pipeline_index_size())
    }

    /// Total blob size: header, global vendor data, index and payloads.
    pub fn required_size(&self) -> PcResult<u64> {
        Ok(self.plan()?.end)
    }

    /// Write the header (and global vendor data, if any) at the start of `buf`.
    pub fn write_header_safety_critical_one(&self, buf: &mut [u8]) -> PcResult<()> {
        let global_vendor = self.global_vendor_span()?;
        self.header().write_at(buf, 0)?;
        if let (Some(span), Some(bytes)) = (global_vendor, self.global_vendor_data) {
            copy_into(buf, span, bytes)?;
        }
        Ok(())
    }

    /// Write every pipeline row and its payloads; returns the first unused offset.
    ///
    /// Stride gaps without vendor data are left untouched.
    #[tracing::instrument(skip(self, buf), fields(buf_len = buf.len()))]
    pub fn write_pipeline_index(&self, buf: &mut [u8]) -> PcResult<u64> {
        let plan = self.plan()?;
        if plan.end > buf.len() as u64 {
            return Err(PcError::BufferTooSmall {
                needed: plan.end,
                available: buf.len() as u64,
            });
        }

        let slots = self.pipeline_index.as_deref().unwrap_or(&[]);
        for (slot, planned) in slots.iter().zip(&plan.pipelines) {
            if let Some(entry) = slot {
                entry.write_planned(buf, planned)?;
            }
        }
        Ok(plan.end)
    }

    /// Write the header and the index; returns the first unused offset.
    pub fn write(&self, buf: &mut [u8]) -> PcResult<u64> {
        self.write_header_safety_critical_one(buf)?;
        self.write_pipeline_index(buf)
    }

    /// Write into a freshly allocated buffer of exactly [`Self::required_size`] bytes.
    pub fn to_vec(&self) -> PcResult<Vec<u8>> {
        let size = usize::try_from(self.required_size()?)
            .map_err(|_| PcError::overflow("cache size exceeds host address space"))?;
        let mut buf = filled_vec(size, 0u8, "cache bytes")?;
        self.write(&mut buf)?;
        Ok(buf)
    }
}

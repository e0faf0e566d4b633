use crate::format::layout::PIPELINE_INDEX_ENTRY_SIZE;
use crate::foundation::core::Uuid;
use crate::foundation::error::{PcError, PcResult};
use crate::writer::plan::{PipelinePlan, Span, plan_pipeline};

/// Builder for one shader stage of a pipeline.
///
/// Code and vendor bytes are borrowed, never copied, until the cache is written.
#[derive(Clone, Debug, Default)]
pub struct StageEntry<'a> {
    code: Option<&'a [u8]>,
    vendor_data: Option<&'a [u8]>,
}

impl<'a> StageEntry<'a> {
    /// A stage with no code attached.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach the stage's code payload (typically SPIR-V).
    pub fn set_shader_code(&mut self, code: &'a [u8]) {
        self.code = Some(code);
    }

    /// Attach bytes stored in the stage index stride gap after this stage's row.
    pub fn set_vendor_data(&mut self, data: &'a [u8]) {
        self.vendor_data = Some(data);
    }

    /// Attached code, if any.
    pub fn shader_code(&self) -> Option<&'a [u8]> {
        self.code
    }

    /// Attached vendor bytes, if any.
    pub fn vendor_data(&self) -> Option<&'a [u8]> {
        self.vendor_data
    }

    /// Bytes this stage needs outside the stage index (its code).
    pub fn extra_size(&self) -> u64 {
        self.code.map_or(0, |c| c.len() as u64)
    }
}

/// Builder for one pipeline index entry and everything hanging off it.
///
/// Usage mirrors the cache writer one level down: allocate the stage slots
/// once, attach code per stage in declaration order, optionally attach JSON,
/// then let [`crate::CacheWriter`] lay it out.
#[derive(Clone, Debug)]
pub struct PipelineEntry<'a> {
    identifier: Uuid,
    memory_size: u64,
    json: Option<&'a [u8]>,
    vendor_data: Option<&'a [u8]>,
    stages: Option<Vec<StageEntry<'a>>>,
}

impl<'a> PipelineEntry<'a> {
    /// Create an entry with its identifier and memory-size hint.
    pub fn new(identifier: Uuid, memory_size: u64) -> Self {
        Self {
            identifier,
            memory_size,
            json: None,
            vendor_data: None,
            stages: None,
        }
    }

    /// Reserve `count` stage slots. Only the first call succeeds.
    pub fn allocate_stages(&mut self, count: u32) -> PcResult<()> {
        if self.stages.is_some() {
            return Err(PcError::layout("stages already allocated for pipeline"));
        }
        self.stages = Some(filled_vec(count as usize, StageEntry::new(), "stage slots")?);
        Ok(())
    }

    fn stage_mut(&mut self, stage: u32) -> PcResult<&mut StageEntry<'a>> {
        let count = self.stage_count();
        self.stages
            .as_mut()
            .and_then(|s| s.get_mut(stage as usize))
            .ok_or_else(|| {
                PcError::layout(format!(
                    "stage {stage} out of range for pipeline with {count} allocated stages"
                ))
            })
    }

    /// Attach code for `stage`, which must be below the allocated count.
    pub fn set_shader_stage_code(&mut self, stage: u32, code: &'a [u8]) -> PcResult<()> {
        self.stage_mut(stage)?.set_shader_code(code);
        Ok(())
    }

    /// Attach vendor bytes for `stage`, which must be below the allocated count.
    pub fn set_stage_vendor_data(&mut self, stage: u32, data: &'a [u8]) -> PcResult<()> {
        self.stage_mut(stage)?.set_vendor_data(data);
        Ok(())
    }

    /// Attach the pipeline's JSON description.
    pub fn set_json(&mut self, json: &'a [u8]) {
        self.json = Some(json);
    }

    /// Attach bytes stored in the pipeline index stride gap after this row.
    pub fn set_vendor_data(&mut self, data: &'a [u8]) {
        self.vendor_data = Some(data);
    }

    /// Pipeline identifier.
    pub fn identifier(&self) -> &Uuid {
        &self.identifier
    }

    /// Memory-size hint.
    pub fn memory_size(&self) -> u64 {
        self.memory_size
    }

    /// Attached JSON, if any.
    pub fn json(&self) -> Option<&'a [u8]> {
        self.json
    }

    /// Attached vendor bytes, if any.
    pub fn vendor_data(&self) -> Option<&'a [u8]> {
        self.vendor_data
    }

    /// Allocated stages in declaration order.
    pub fn stages(&self) -> &[StageEntry<'a>] {
        self.stages.as_deref().unwrap_or(&[])
    }

    /// Number of allocated stages.
    pub fn stage_count(&self) -> u32 {
        self.stages().len() as u32
    }

    /// Bytes needed past the pipeline index for JSON, stage index and code.
    pub fn extra_size(&self, stage_stride: u32) -> PcResult<u64> {
        let plan = plan_pipeline(self, 0, 0, stage_stride)?;
        Ok(plan.extra_end - plan.extra_start)
    }

    /// Write this entry's row at `entry_offset` and its payloads from `extra_offset`.
    ///
    /// Returns the first byte past the payloads. Per-pipeline vendor bytes are
    /// only written by [`crate::CacheWriter`], which knows the index stride.
    pub fn write_entry(
        &self,
        buf: &mut [u8],
        entry_offset: u64,
        extra_offset: u64,
        stage_stride: u32,
    ) -> PcResult<u64> {
        let plan = plan_pipeline(self, entry_offset, extra_offset, stage_stride)?;
        if plan.extra_end > plan.extra_start {
            if extra_offset == 0 {
                return Err(PcError::layout(
                    "payload offset 0 is reserved for absent data",
                ));
            }
            let row_end = entry_offset
                .checked_add(u64::from(PIPELINE_INDEX_ENTRY_SIZE))
                .ok_or_else(|| PcError::overflow("pipeline index row end"))?;
            if extra_offset < row_end && entry_offset < plan.extra_end {
                return Err(PcError::layout(format!(
                    "payloads at [{extra_offset}, {}) overlap the index row at {entry_offset}",
                    plan.extra_end
                )));
            }
        }
        self.write_planned(buf, &plan)?;
        Ok(plan.extra_end)
    }

    pub(crate) fn write_planned(&self, buf: &mut [u8], plan: &PipelinePlan) -> PcResult<()> {
        use crate::format::layout::WireRecord as _;

        plan.index_row(self).write_at(buf, plan.entry_offset)?;
        if let (Some(span), Some(bytes)) = (plan.vendor, self.vendor_data) {
            copy_into(buf, span, bytes)?;
        }
        if let (Some(span), Some(bytes)) = (plan.json, self.json) {
            copy_into(buf, span, bytes)?;
        }
        for (stage, stage_plan) in self.stages().iter().zip(&plan.stages) {
            stage_plan.index_row().write_at(buf, stage_plan.entry_offset)?;
            if let (Some(span), Some(bytes)) = (stage_plan.vendor, stage.vendor_data) {
                copy_into(buf, span, bytes)?;
            }
            if let (Some(span), Some(bytes)) = (stage_plan.code, stage.code) {
                copy_into(buf, span, bytes)?;
            }
        }
        Ok(())
    }
}

/// An empty vector with room for `count` items, or a layout error when the
/// allocator refuses.
pub(crate) fn reserved_vec<T>(count: usize, what: &str) -> PcResult<Vec<T>> {
    let mut out = Vec::new();
    out.try_reserve_exact(count)
        .map_err(|e| PcError::layout(format!("cannot allocate {count} {what}: {e}")))?;
    Ok(out)
}

pub(crate) fn filled_vec<T: Clone>(count: usize, fill: T, what: &str) -> PcResult<Vec<T>> {
    let mut out = reserved_vec(count, what)?;
    out.resize(count, fill);
    Ok(out)
}

pub(crate) fn copy_into(buf: &mut [u8], span: Span, bytes: &[u8]) -> PcResult<()> {
    let available = buf.len() as u64;
    let end = span.end()?;
    let range = crate::format::cursor::checked_range(span.offset, span.size, buf.len())
        .ok_or(PcError::BufferTooSmall {
            needed: end,
            available,
        })?;
    buf[range].copy_from_slice(bytes);
    Ok(())
}

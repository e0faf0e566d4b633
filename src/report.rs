//! Human-readable and JSON rendering of cache contents and pool assignments.

use std::io::Write;

use crate::foundation::core::HexId;
use crate::foundation::error::{PcError, PcResult};
use crate::pool::{Classification, Pool, UnfitPipeline};
use crate::reader::CacheReader;

/// How much of the cache to list. Each level includes the previous ones.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum DetailMode {
    /// No listing.
    #[default]
    None,
    /// One line per pipeline: ordinal, identifier, memory size.
    Basic,
    /// Header fields, then the basic listing.
    FirstHeader,
    /// Header fields and every pipeline and stage row.
    AllHeaders,
    /// Everything, including JSON text and code words.
    All,
}

/// List the cache at the requested level of detail.
///
/// Fails with [`PcError::InvalidCache`] on the first pipeline row that cannot be read.
pub fn write_cache_info(
    out: &mut impl Write,
    reader: &CacheReader<'_>,
    mode: DetailMode,
) -> PcResult<()> {
    if mode == DetailMode::None {
        return Ok(());
    }

    if mode >= DetailMode::FirstHeader {
        if let Some(h) = reader.header_version_one() {
            writeln!(out)?;
            writeln!(out, "headerSize:          {}", h.header_size)?;
            writeln!(out, "headerVersion:       {}", h.header_version)?;
            writeln!(out, "vendorID:            0x{:x}", h.vendor_id)?;
            writeln!(out, "deviceID:            0x{:x}", h.device_id)?;
            writeln!(out, "pipelineCacheUUID:   {}", HexId(&h.pipeline_cache_uuid))?;
        }
        writeln!(out, "validationVersion:   {}", reader.validation_version())?;
        writeln!(out, "implementationData:  {}", reader.implementation_data())?;
        writeln!(out, "pipelineIndexCount:  {}", reader.pipeline_index_count())?;
        writeln!(out, "pipelineIndexStride: {}", reader.pipeline_index_stride())?;
        writeln!(out, "pipelineIndexOffset: {}", reader.pipeline_index_offset())?;
        writeln!(out)?;
    }

    let mut sizes: Option<(u64, u64)> = None;
    for ordinal in 0..reader.pipeline_index_count() {
        let Some(pie) = reader.pipeline_index_entry(ordinal) else {
            writeln!(out, "pie {ordinal}: not found")?;
            return Err(PcError::invalid_cache("malformed pipeline cache!"));
        };

        if mode >= DetailMode::AllHeaders {
            writeln!(out, "pipeline {ordinal}:")?;
            writeln!(out, "  pipelineIdentifier: {}", HexId(&pie.pipeline_identifier))?;
            writeln!(out, "  pipelineMemorySize: {}", pie.pipeline_memory_size)?;
            writeln!(out, "  jsonSize:           {}", pie.json_size)?;
            writeln!(out, "  jsonOffset:         {}", pie.json_offset)?;
            writeln!(out, "  stageIndexCount:    {}", pie.stage_index_count)?;
            writeln!(out, "  stageIndexStride:   {}", pie.stage_index_stride)?;
            writeln!(out, "  stageIndexOffset:   {}", pie.stage_index_offset)?;
            for stage in 0..pie.stage_index_count {
                let Some(sie) = reader.stage_index_entry(&pie, stage) else {
                    continue;
                };
                writeln!(out, "  stage {stage}:")?;
                writeln!(out, "    codeSize:         {}", sie.code_size)?;
                writeln!(out, "    codeOffset:       {}", sie.code_offset)?;
                if mode >= DetailMode::All {
                    write_code_words(out, reader.spirv(&sie).unwrap_or(&[]))?;
                }
            }
            if mode >= DetailMode::All {
                let json = reader.json(&pie).unwrap_or(&[]);
                writeln!(out, "  json:")?;
                writeln!(out, "{}", String::from_utf8_lossy(json))?;
            }
            writeln!(out)?;
        } else {
            writeln!(
                out,
                "index: {ordinal:>3} id: {} pipelineMemorySize: {}",
                HexId(&pie.pipeline_identifier),
                pie.pipeline_memory_size
            )?;
        }
        let size = pie.pipeline_memory_size;
        sizes = Some(sizes.map_or((size, size), |(lo, hi)| (lo.min(size), hi.max(size))));
    }

    writeln!(
        out,
        "found {} pipelines, sizes [{}, {}]",
        reader.pipeline_index_count(),
        display_opt(sizes.map(|(lo, _)| lo)),
        display_opt(sizes.map(|(_, hi)| hi)),
    )?;
    Ok(())
}

fn write_code_words(out: &mut impl Write, code: &[u8]) -> PcResult<()> {
    write!(out, "    spirv:            ")?;
    for (k, word) in code.chunks_exact(4).enumerate() {
        let word = u32::from_ne_bytes([word[0], word[1], word[2], word[3]]);
        write!(out, "0x{word:08x},")?;
        if k % 8 == 7 {
            writeln!(out)?;
            write!(out, "                      ")?;
        }
    }
    writeln!(out)?;
    Ok(())
}

/// Serializable summary of one pool.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub struct PoolSummary {
    /// Capacity in bytes.
    pub size: u64,
    /// Number of members.
    pub count: usize,
    /// Smallest member size.
    pub min: Option<u64>,
    /// Largest member size.
    pub max: Option<u64>,
    /// Mean member size.
    pub average: Option<u64>,
    /// `size * count`.
    pub allocated: u64,
    /// `allocated - total`.
    pub wasted: u64,
    /// Member identifiers in hex.
    pub identifiers: Vec<String>,
}

/// Serializable pool classification report.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub struct PoolReport {
    /// Pools in ascending capacity order.
    pub pools: Vec<PoolSummary>,
    /// Pipelines that fit no pool.
    pub unfit: Vec<UnfitPipeline>,
}

impl PoolReport {
    /// Summarize classified `pools`, resolving member identifiers through `reader`.
    pub fn new(reader: &CacheReader<'_>, pools: &[Pool], result: &Classification) -> Self {
        let pools = pools
            .iter()
            .map(|pool| PoolSummary {
                size: pool.size,
                count: pool.len(),
                min: (!pool.is_empty()).then_some(pool.min),
                max: (!pool.is_empty()).then_some(pool.max),
                average: pool.average(),
                allocated: pool.allocated(),
                wasted: pool.wasted(),
                identifiers: pool
                    .entries
                    .iter()
                    .filter_map(|&i| reader.pipeline_index_entry(i))
                    .map(|e| HexId(&e.pipeline_identifier).to_string())
                    .collect(),
            })
            .collect();
        Self {
            pools,
            unfit: result.unfit.clone(),
        }
    }

    /// Write the report as pretty JSON.
    pub fn write_json(&self, out: &mut impl Write) -> PcResult<()> {
        serde_json::to_writer_pretty(&mut *out, self).map_err(|e| PcError::Other(e.into()))?;
        writeln!(out)?;
        Ok(())
    }

    /// Write the report as text.
    pub fn write_text(&self, out: &mut impl Write) -> PcResult<()> {
        for pool in &self.pools {
            writeln!(out, "======================================")?;
            writeln!(out, "pool size: {}, pool entries: {}", pool.size, pool.count)?;
            writeln!(out, "pool min size: {}", display_opt(pool.min))?;
            writeln!(out, "pool max size: {}", display_opt(pool.max))?;
            writeln!(out, "pool average size: {}", display_opt(pool.average))?;
            writeln!(out, "pool allocated space: {}", pool.allocated)?;
            writeln!(out, "pool wasted space: {}", pool.wasted)?;
            writeln!(out, "pool entry identifiers (hex):")?;
            for id in &pool.identifiers {
                writeln!(out, "    {id}")?;
            }
        }
        Ok(())
    }
}

fn display_opt(v: Option<u64>) -> String {
    v.map_or_else(|| "n/a".to_string(), |v| v.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::classify;
    use crate::writer::CacheWriter;
    use crate::writer::entry::PipelineEntry;

    fn sample_blob() -> Vec<u8> {
        let code: Vec<u8> = [0x0723_0203u32, 0x0001_0000]
            .iter()
            .flat_map(|w| w.to_ne_bytes())
            .collect();
        let mut p0 = PipelineEntry::new([0xA0; 16], 24);
        p0.set_json(b"{\"name\":\"p0\"}");
        p0.allocate_stages(1).unwrap();
        p0.set_shader_stage_code(0, &code).unwrap();
        let p1 = PipelineEntry::new([0xB1; 16], 100);

        let mut w = CacheWriter::new(0x10de, 0xabcd, [0x11; 16]);
        w.allocate_pipeline_index(2).unwrap();
        w.set_pipeline_entry(0, &p0).unwrap();
        w.set_pipeline_entry(1, &p1).unwrap();
        w.to_vec().unwrap()
    }

    fn render(blob: &[u8], mode: DetailMode) -> String {
        let mut out = Vec::new();
        write_cache_info(&mut out, &CacheReader::new(blob), mode).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn basic_listing_has_one_line_per_pipeline() {
        let text = render(&sample_blob(), DetailMode::Basic);
        assert!(text.contains(
            "index:   0 id: 0xA0A0A0A0A0A0A0A0A0A0A0A0A0A0A0A0 pipelineMemorySize: 24"
        ));
        assert!(text.contains("index:   1 id: 0xB1B1B1B1B1B1B1B1B1B1B1B1B1B1B1B1"));
        assert!(text.contains("found 2 pipelines, sizes [24, 100]"));
        assert!(!text.contains("headerSize"));
    }

    #[test]
    fn detail_levels_are_cumulative() {
        let blob = sample_blob();
        let first = render(&blob, DetailMode::FirstHeader);
        assert!(first.contains("vendorID:            0x10de"));
        assert!(first.contains("index:   0"));

        let all_headers = render(&blob, DetailMode::AllHeaders);
        assert!(all_headers.contains("  stageIndexCount:    1"));
        assert!(all_headers.contains("    codeSize:         8"));
        assert!(!all_headers.contains("spirv:"));

        let all = render(&blob, DetailMode::All);
        assert!(all.contains("0x07230203,0x00010000,"));
        assert!(all.contains("{\"name\":\"p0\"}"));
    }

    #[test]
    fn empty_cache_has_no_size_range() {
        let blob = CacheWriter::default().to_vec().unwrap();
        let text = render(&blob, DetailMode::Basic);
        assert_eq!(text, "found 0 pipelines, sizes [n/a, n/a]\n");
    }

    #[test]
    fn unreadable_row_is_reported() {
        let mut blob = sample_blob();
        blob.truncate(56 + 56 + 10);
        let mut out = Vec::new();
        let err = write_cache_info(&mut out, &CacheReader::new(&blob), DetailMode::Basic)
            .unwrap_err();
        assert!(matches!(err, PcError::InvalidCache(_)));
        assert!(String::from_utf8(out).unwrap().contains("pie 1: not found"));
    }

    #[test]
    fn pool_report_text_and_json() {
        let blob = sample_blob();
        let reader = CacheReader::new(&blob);
        let mut pools = vec![Pool::new(32), Pool::new(64)];
        let result = classify(&reader, &mut pools).unwrap();
        let report = PoolReport::new(&reader, &pools, &result);

        let mut text = Vec::new();
        report.write_text(&mut text).unwrap();
        let text = String::from_utf8(text).unwrap();
        assert!(text.contains("pool size: 32, pool entries: 1"));
        assert!(text.contains("pool wasted space: 8"));
        assert!(text.contains("pool average size: n/a"));

        let mut json = Vec::new();
        report.write_json(&mut json).unwrap();
        let v: serde_json::Value = serde_json::from_slice(&json).unwrap();
        assert_eq!(v["pools"][0]["identifiers"][0], "0xA0A0A0A0A0A0A0A0A0A0A0A0A0A0A0A0");
        assert_eq!(v["unfit"][0]["memory_size"], 100);
        assert_eq!(v["unfit"][0]["identifier"], "0xB1B1B1B1B1B1B1B1B1B1B1B1B1B1B1B1");
    }
}

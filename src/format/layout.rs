//! Wire descriptors of the safety-critical pipeline cache layout.
//!
//! ```text
//! 0                  56                 offset            offset + count * stride
//! | header (56 B)    | global vendor    | pipeline index rows ...| json / stage index / code ...
//! ```

use crate::format::cursor::{ByteReader, ByteWriter, checked_range};
use crate::foundation::core::{Uuid, uuid_hex};
use crate::foundation::error::{PcError, PcResult};

/// `headerVersion` tag of a safety-critical pipeline cache.
pub const HEADER_VERSION_SAFETY_CRITICAL_ONE: u32 = 1_000_298_000;

/// `validationVersion` tag of a safety-critical pipeline cache.
pub const VALIDATION_VERSION_SAFETY_CRITICAL_ONE: u32 = 1;

/// Byte size of the full header; also the required `headerSize` field value.
pub const HEADER_SIZE: u64 = SafetyCriticalHeader::SIZE as u64;

/// Byte size of one pipeline index row.
pub const PIPELINE_INDEX_ENTRY_SIZE: u32 = PipelineIndexEntry::SIZE as u32;

/// Byte size of one stage index row.
pub const STAGE_INDEX_ENTRY_SIZE: u32 = StageIndexEntry::SIZE as u32;

/// A fixed-size record with an explicit field-by-field wire encoding.
pub trait WireRecord: Sized {
    /// Encoded size in bytes.
    const SIZE: usize;

    /// Decode from the reader's current position.
    fn decode(r: &mut ByteReader<'_>) -> Option<Self>;

    /// Encode at the writer's current position.
    fn encode(&self, w: &mut ByteWriter<'_>) -> PcResult<()>;

    /// Decode the record at `offset`, or `None` if it does not fit in `data`.
    fn read_at(data: &[u8], offset: u64) -> Option<Self> {
        let range = checked_range(offset, Self::SIZE as u64, data.len())?;
        Self::decode(&mut ByteReader::new(&data[range]))
    }

    /// Encode the record at `offset` inside `buf`.
    fn write_at(&self, buf: &mut [u8], offset: u64) -> PcResult<()> {
        let available = buf.len() as u64;
        let range = checked_range(offset, Self::SIZE as u64, buf.len()).ok_or_else(|| {
            match offset.checked_add(Self::SIZE as u64) {
                Some(needed) => PcError::BufferTooSmall { needed, available },
                None => PcError::overflow(format!("record at offset {offset}")),
            }
        })?;
        self.encode(&mut ByteWriter::new(&mut buf[range]))
    }
}

/// The generic "version one" portion shared by every pipeline cache header.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
pub struct HeaderVersionOne {
    /// Must equal [`HEADER_SIZE`].
    pub header_size: u32,
    /// Must equal [`HEADER_VERSION_SAFETY_CRITICAL_ONE`].
    pub header_version: u32,
    pub vendor_id: u32,
    pub device_id: u32,
    #[serde(with = "uuid_hex")]
    pub pipeline_cache_uuid: Uuid,
}

impl WireRecord for HeaderVersionOne {
    const SIZE: usize = 32;

    fn decode(r: &mut ByteReader<'_>) -> Option<Self> {
        Some(Self {
            header_size: r.read_u32()?,
            header_version: r.read_u32()?,
            vendor_id: r.read_u32()?,
            device_id: r.read_u32()?,
            pipeline_cache_uuid: r.read_array()?,
        })
    }

    fn encode(&self, w: &mut ByteWriter<'_>) -> PcResult<()> {
        w.put_u32(self.header_size)?;
        w.put_u32(self.header_version)?;
        w.put_u32(self.vendor_id)?;
        w.put_u32(self.device_id)?;
        w.put_bytes(&self.pipeline_cache_uuid)
    }
}

/// Full header stored at offset 0 of every cache blob.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
pub struct SafetyCriticalHeader {
    /// Generic header prefix.
    pub version_one: HeaderVersionOne,
    /// Must equal [`VALIDATION_VERSION_SAFETY_CRITICAL_ONE`].
    pub validation_version: u32,
    /// Opaque implementation-defined value.
    pub implementation_data: u32,
    pub pipeline_index_count: u32,
    pub pipeline_index_stride: u32,
    /// Byte offset of the first pipeline index row.
    pub pipeline_index_offset: u64,
}

impl SafetyCriticalHeader {
    /// `true` when every tag field holds its required constant.
    pub fn has_valid_tags(&self) -> bool {
        u64::from(self.version_one.header_size) == HEADER_SIZE
            && self.version_one.header_version == HEADER_VERSION_SAFETY_CRITICAL_ONE
            && self.validation_version == VALIDATION_VERSION_SAFETY_CRITICAL_ONE
    }
}

impl WireRecord for SafetyCriticalHeader {
    const SIZE: usize = 56;

    fn decode(r: &mut ByteReader<'_>) -> Option<Self> {
        Some(Self {
            version_one: HeaderVersionOne::decode(r)?,
            validation_version: r.read_u32()?,
            implementation_data: r.read_u32()?,
            pipeline_index_count: r.read_u32()?,
            pipeline_index_stride: r.read_u32()?,
            pipeline_index_offset: r.read_u64()?,
        })
    }

    fn encode(&self, w: &mut ByteWriter<'_>) -> PcResult<()> {
        self.version_one.encode(w)?;
        w.put_u32(self.validation_version)?;
        w.put_u32(self.implementation_data)?;
        w.put_u32(self.pipeline_index_count)?;
        w.put_u32(self.pipeline_index_stride)?;
        w.put_u64(self.pipeline_index_offset)
    }
}

/// One row of the pipeline index.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize)]
pub struct PipelineIndexEntry {
    /// Caller-assigned identifier, not required to be unique.
    #[serde(with = "uuid_hex")]
    pub pipeline_identifier: Uuid,
    /// Memory-size hint, consumed by the pool classifier.
    pub pipeline_memory_size: u64,
    pub json_size: u64,
    /// Offset of the JSON payload; 0 when absent.
    pub json_offset: u64,
    pub stage_index_count: u32,
    pub stage_index_stride: u32,
    /// Offset of the first stage index row.
    pub stage_index_offset: u64,
}

impl WireRecord for PipelineIndexEntry {
    const SIZE: usize = 56;

    fn decode(r: &mut ByteReader<'_>) -> Option<Self> {
        Some(Self {
            pipeline_identifier: r.read_array()?,
            pipeline_memory_size: r.read_u64()?,
            json_size: r.read_u64()?,
            json_offset: r.read_u64()?,
            stage_index_count: r.read_u32()?,
            stage_index_stride: r.read_u32()?,
            stage_index_offset: r.read_u64()?,
        })
    }

    fn encode(&self, w: &mut ByteWriter<'_>) -> PcResult<()> {
        w.put_bytes(&self.pipeline_identifier)?;
        w.put_u64(self.pipeline_memory_size)?;
        w.put_u64(self.json_size)?;
        w.put_u64(self.json_offset)?;
        w.put_u32(self.stage_index_count)?;
        w.put_u32(self.stage_index_stride)?;
        w.put_u64(self.stage_index_offset)
    }
}

/// One row of a pipeline's stage index.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize)]
pub struct StageIndexEntry {
    pub code_size: u64,
    /// Offset of the code payload; 0 when absent.
    pub code_offset: u64,
}

impl WireRecord for StageIndexEntry {
    const SIZE: usize = 16;

    fn decode(r: &mut ByteReader<'_>) -> Option<Self> {
        Some(Self {
            code_size: r.read_u64()?,
            code_offset: r.read_u64()?,
        })
    }

    fn encode(&self, w: &mut ByteWriter<'_>) -> PcResult<()> {
        w.put_u64(self.code_size)?;
        w.put_u64(self.code_offset)
    }
}

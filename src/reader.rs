//! Bounds-checked random access into a pipeline cache blob.
//!
//! The blob is treated as untrusted. Every offset read from it is combined with
//! its size using checked arithmetic and compared against the blob length
//! before any byte is touched. Absent or out-of-range data is reported as
//! `None`, never as a panic or an error.

use crate::format::cursor::{checked_range, strided_offset};
use crate::format::layout::{
    HEADER_SIZE, HeaderVersionOne, PIPELINE_INDEX_ENTRY_SIZE, PipelineIndexEntry,
    STAGE_INDEX_ENTRY_SIZE, SafetyCriticalHeader, StageIndexEntry, WireRecord,
};
use crate::foundation::core::Uuid;

/// Read-only view over a pipeline cache blob.
///
/// The blob is borrowed and never modified, so any number of readers may share
/// one buffer.
#[derive(Clone, Copy, Debug)]
pub struct CacheReader<'a> {
    data: &'a [u8],
    header: Option<SafetyCriticalHeader>,
}

impl<'a> CacheReader<'a> {
    /// Wrap `data`. No validation happens until [`Self::is_valid`].
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            header: SafetyCriticalHeader::read_at(data, 0),
        }
    }

    /// The wrapped blob.
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// `true` when the blob starts with a complete header carrying the expected
    /// size, version and validation-version tags.
    ///
    /// Call this first; the other accessors stay bounds safe regardless, but
    /// their results are meaningless for an invalid blob.
    pub fn is_valid(&self) -> bool {
        self.header.is_some_and(|h| h.has_valid_tags())
    }

    /// The full header, if the blob is long enough to hold one.
    pub fn safety_critical_header(&self) -> Option<&SafetyCriticalHeader> {
        self.header.as_ref()
    }

    /// The generic header prefix, if the blob is long enough to hold one.
    pub fn header_version_one(&self) -> Option<&HeaderVersionOne> {
        self.header.as_ref().map(|h| &h.version_one)
    }

    /// `validationVersion` header field (0 for a truncated blob).
    pub fn validation_version(&self) -> u32 {
        self.header.map_or(0, |h| h.validation_version)
    }

    /// `implementationData` header field (0 for a truncated blob).
    pub fn implementation_data(&self) -> u32 {
        self.header.map_or(0, |h| h.implementation_data)
    }

    /// Number of pipeline index rows (0 for a truncated blob).
    pub fn pipeline_index_count(&self) -> u32 {
        self.header.map_or(0, |h| h.pipeline_index_count)
    }

    /// Pipeline index stride (0 for a truncated blob).
    pub fn pipeline_index_stride(&self) -> u32 {
        self.header.map_or(0, |h| h.pipeline_index_stride)
    }

    /// Pipeline index offset (0 for a truncated blob).
    pub fn pipeline_index_offset(&self) -> u64 {
        self.header.map_or(0, |h| h.pipeline_index_offset)
    }

    fn pipeline_entry_offset(&self, ordinal: u32) -> Option<u64> {
        let header = self.header?;
        if ordinal >= header.pipeline_index_count {
            return None;
        }
        let offset = strided_offset(
            header.pipeline_index_offset,
            ordinal,
            header.pipeline_index_stride,
        )?;
        checked_range(offset, u64::from(PIPELINE_INDEX_ENTRY_SIZE), self.data.len())?;
        Some(offset)
    }

    /// The pipeline index row at `ordinal`.
    ///
    /// `None` when `ordinal >= count`, when the row would extend past the blob,
    /// or when computing its offset would overflow.
    pub fn pipeline_index_entry(&self, ordinal: u32) -> Option<PipelineIndexEntry> {
        let offset = self.pipeline_entry_offset(ordinal)?;
        PipelineIndexEntry::read_at(self.data, offset)
    }

    /// Ordinal of the first row whose identifier equals `identifier`.
    ///
    /// The scan stops with `None` at the first row that cannot be read.
    pub fn position_of(&self, identifier: &Uuid) -> Option<u32> {
        for ordinal in 0..self.pipeline_index_count() {
            let entry = self.pipeline_index_entry(ordinal)?;
            if entry.pipeline_identifier == *identifier {
                return Some(ordinal);
            }
        }
        None
    }

    /// The first pipeline index row whose identifier equals `identifier`.
    ///
    /// This is a linear scan; duplicate identifiers resolve to the lowest ordinal.
    pub fn pipeline_index_entry_by_id(&self, identifier: &Uuid) -> Option<PipelineIndexEntry> {
        self.position_of(identifier)
            .and_then(|ordinal| self.pipeline_index_entry(ordinal))
    }

    /// All readable rows in ordinal order, stopping at the first unreadable one.
    pub fn pipeline_index_entries(&self) -> impl Iterator<Item = (u32, PipelineIndexEntry)> + '_ {
        (0..self.pipeline_index_count())
            .map_while(|ordinal| Some((ordinal, self.pipeline_index_entry(ordinal)?)))
    }

    fn payload(&self, offset: u64, size: u64) -> Option<&'a [u8]> {
        if offset == 0 {
            return None;
        }
        let range = checked_range(offset, size, self.data.len())?;
        Some(&self.data[range])
    }

    /// The JSON bytes of `entry`, borrowed from the blob.
    pub fn json(&self, entry: &PipelineIndexEntry) -> Option<&'a [u8]> {
        self.payload(entry.json_offset, entry.json_size)
    }

    fn stage_entry_offset(&self, entry: &PipelineIndexEntry, stage: u32) -> Option<u64> {
        if stage >= entry.stage_index_count {
            return None;
        }
        let offset = strided_offset(entry.stage_index_offset, stage, entry.stage_index_stride)?;
        checked_range(offset, u64::from(STAGE_INDEX_ENTRY_SIZE), self.data.len())?;
        Some(offset)
    }

    /// The stage index row `stage` of `entry`.
    pub fn stage_index_entry(&self, entry: &PipelineIndexEntry, stage: u32) -> Option<StageIndexEntry> {
        let offset = self.stage_entry_offset(entry, stage)?;
        StageIndexEntry::read_at(self.data, offset)
    }

    /// The code bytes of `stage`, borrowed from the blob.
    pub fn spirv(&self, stage: &StageIndexEntry) -> Option<&'a [u8]> {
        self.payload(stage.code_offset, stage.code_size)
    }

    /// Bytes between the header and the pipeline index.
    pub fn global_vendor_data(&self) -> Option<&'a [u8]> {
        let offset = self.pipeline_index_offset();
        if offset <= HEADER_SIZE {
            return None;
        }
        let range = checked_range(HEADER_SIZE, offset - HEADER_SIZE, self.data.len())?;
        Some(&self.data[range])
    }

    /// The stride gap following pipeline row `ordinal`.
    pub fn pipeline_vendor_data(&self, ordinal: u32) -> Option<&'a [u8]> {
        let offset = self.pipeline_entry_offset(ordinal)?;
        let gap = self
            .pipeline_index_stride()
            .checked_sub(PIPELINE_INDEX_ENTRY_SIZE)?;
        let start = offset + u64::from(PIPELINE_INDEX_ENTRY_SIZE);
        let range = checked_range(start, u64::from(gap), self.data.len())?;
        Some(&self.data[range])
    }

    /// The stride gap following stage row `stage` of `entry`.
    pub fn stage_vendor_data(&self, entry: &PipelineIndexEntry, stage: u32) -> Option<&'a [u8]> {
        let offset = self.stage_entry_offset(entry, stage)?;
        let gap = entry.stage_index_stride.checked_sub(STAGE_INDEX_ENTRY_SIZE)?;
        let start = offset + u64::from(STAGE_INDEX_ENTRY_SIZE);
        let range = checked_range(start, u64::from(gap), self.data.len())?;
        Some(&self.data[range])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::layout::{
        HEADER_VERSION_SAFETY_CRITICAL_ONE, VALIDATION_VERSION_SAFETY_CRITICAL_ONE,
    };

    fn header(count: u32, stride: u32, offset: u64) -> SafetyCriticalHeader {
        SafetyCriticalHeader {
            version_one: HeaderVersionOne {
                header_size: HEADER_SIZE as u32,
                header_version: HEADER_VERSION_SAFETY_CRITICAL_ONE,
                vendor_id: 0x10de,
                device_id: 0xabcd,
                pipeline_cache_uuid: [0; 16],
            },
            validation_version: VALIDATION_VERSION_SAFETY_CRITICAL_ONE,
            implementation_data: 0,
            pipeline_index_count: count,
            pipeline_index_stride: stride,
            pipeline_index_offset: offset,
        }
    }

    fn blob_with(h: SafetyCriticalHeader, len: usize) -> Vec<u8> {
        let mut buf = vec![0u8; len];
        h.write_at(&mut buf, 0).unwrap();
        buf
    }

    #[test]
    fn short_buffer_is_invalid_and_safe() {
        let buf = [0u8; 10];
        let r = CacheReader::new(&buf);
        assert!(!r.is_valid());
        assert_eq!(r.pipeline_index_count(), 0);
        assert_eq!(r.pipeline_index_entry(0), None);
        assert_eq!(r.header_version_one(), None);
    }

    #[test]
    fn wrong_tags_are_invalid() {
        let mut h = header(0, 56, 56);
        h.validation_version = 2;
        let buf = blob_with(h, 56);
        assert!(!CacheReader::new(&buf).is_valid());

        let mut h = header(0, 56, 56);
        h.version_one.header_size = 32;
        let buf = blob_with(h, 56);
        assert!(!CacheReader::new(&buf).is_valid());

        let mut h = header(0, 56, 56);
        h.version_one.header_version = 1;
        let buf = blob_with(h, 56);
        assert!(!CacheReader::new(&buf).is_valid());
    }

    #[test]
    fn validation_is_repeatable_and_read_only() {
        let buf = blob_with(header(0, 56, 56), 56);
        let before = buf.clone();
        let r = CacheReader::new(&buf);
        assert!(r.is_valid());
        assert!(r.is_valid());
        assert_eq!(buf, before);
    }

    #[test]
    fn truncated_index_row_is_absent() {
        // Claims two rows but only holds one and a half.
        let buf = blob_with(header(2, 56, 56), 56 + 56 + 28);
        let r = CacheReader::new(&buf);
        assert!(r.is_valid());
        assert!(r.pipeline_index_entry(0).is_some());
        assert_eq!(r.pipeline_index_entry(1), None);
        assert_eq!(r.pipeline_index_entries().count(), 1);
    }

    #[test]
    fn overflowing_index_offset_is_absent() {
        let buf = blob_with(header(3, u32::MAX, u64::MAX - 10), 256);
        let r = CacheReader::new(&buf);
        assert_eq!(r.pipeline_index_entry(0), None);
        assert_eq!(r.pipeline_index_entry(2), None);
        assert_eq!(r.position_of(&[0; 16]), None);
    }

    #[test]
    fn payload_bounds_are_checked() {
        let buf = blob_with(header(0, 56, 56), 128);
        let r = CacheReader::new(&buf);

        let mut entry = PipelineIndexEntry {
            json_offset: 100,
            json_size: 28,
            ..PipelineIndexEntry::default()
        };
        assert_eq!(r.json(&entry).map(<[u8]>::len), Some(28));
        entry.json_size = 29;
        assert_eq!(r.json(&entry), None);
        entry.json_offset = u64::MAX;
        entry.json_size = 2;
        assert_eq!(r.json(&entry), None);
        entry.json_offset = 0;
        entry.json_size = 4;
        assert_eq!(r.json(&entry), None);

        let stage = StageIndexEntry {
            code_size: u64::MAX,
            code_offset: 1,
        };
        assert_eq!(r.spirv(&stage), None);
    }

    #[test]
    fn stage_rows_are_bounds_checked() {
        let buf = blob_with(header(0, 56, 56), 128);
        let r = CacheReader::new(&buf);
        let entry = PipelineIndexEntry {
            stage_index_count: 3,
            stage_index_stride: 16,
            stage_index_offset: 80,
            ..PipelineIndexEntry::default()
        };
        assert!(r.stage_index_entry(&entry, 2).is_some());
        assert_eq!(r.stage_index_entry(&entry, 3), None);

        let far = PipelineIndexEntry {
            stage_index_offset: u64::MAX - 4,
            ..entry
        };
        assert_eq!(r.stage_index_entry(&far, 0), None);
    }
}

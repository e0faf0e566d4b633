//! First-fit classification of pipelines into size-bounded pools.

use crate::foundation::core::{Uuid, uuid_hex};
use crate::foundation::error::{PcError, PcResult};
use crate::reader::CacheReader;

/// A capacity bucket and the pipelines assigned to it.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub struct Pool {
    /// Capacity in bytes.
    pub size: u64,
    /// Smallest assigned memory size (`u64::MAX` while empty).
    pub min: u64,
    /// Largest assigned memory size.
    pub max: u64,
    /// Sum of assigned memory sizes.
    pub total: u64,
    /// Ordinals of the assigned pipelines, in assignment order.
    pub entries: Vec<u32>,
}

impl Pool {
    /// An empty pool with capacity `size`.
    pub fn new(size: u64) -> Self {
        Self {
            size,
            min: u64::MAX,
            max: 0,
            total: 0,
            entries: Vec::new(),
        }
    }

    fn add(&mut self, ordinal: u32, memory_size: u64) {
        self.entries.push(ordinal);
        self.min = self.min.min(memory_size);
        self.max = self.max.max(memory_size);
        self.total = self.total.saturating_add(memory_size);
    }

    /// Number of assigned pipelines.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `true` when nothing was assigned.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Mean assigned memory size, `None` for an empty pool.
    pub fn average(&self) -> Option<u64> {
        (!self.is_empty()).then(|| self.total / self.entries.len() as u64)
    }

    /// Bytes reserved if every member gets a full slot.
    pub fn allocated(&self) -> u64 {
        self.size.saturating_mul(self.entries.len() as u64)
    }

    /// Reserved bytes not covered by the members' declared sizes.
    pub fn wasted(&self) -> u64 {
        self.allocated().saturating_sub(self.total)
    }
}

/// Sort pools ascending by capacity, as [`classify`] requires.
pub fn sort_pools(pools: &mut [Pool]) {
    pools.sort_by_key(|p| p.size);
}

/// A pipeline larger than every pool.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub struct UnfitPipeline {
    /// Pipeline ordinal.
    pub ordinal: u32,
    /// Pipeline identifier.
    #[serde(with = "uuid_hex")]
    pub identifier: Uuid,
    /// Declared memory size.
    pub memory_size: u64,
}

/// Outcome of [`classify`].
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize)]
pub struct Classification {
    /// Pipelines that fit no pool, in ordinal order.
    pub unfit: Vec<UnfitPipeline>,
}

impl Classification {
    /// `true` when every pipeline was placed.
    pub fn all_placed(&self) -> bool {
        self.unfit.is_empty()
    }
}

/// Assign each pipeline to the smallest pool whose capacity covers its memory size.
///
/// `pools` must be sorted ascending by capacity (see [`sort_pools`]); an unsorted
/// list is rejected. Pipelines that fit no pool are logged and reported, and
/// classification continues with the rest. Every row is read before any pool is
/// touched, so an error leaves `pools` unchanged.
#[tracing::instrument(skip_all, fields(pools = pools.len(), pipelines = reader.pipeline_index_count()))]
pub fn classify(reader: &CacheReader<'_>, pools: &mut [Pool]) -> PcResult<Classification> {
    if pools.windows(2).any(|w| w[0].size > w[1].size) {
        return Err(PcError::UnsortedPools);
    }

    let rows = (0..reader.pipeline_index_count())
        .map(|ordinal| {
            reader.pipeline_index_entry(ordinal).ok_or_else(|| {
                PcError::invalid_cache(format!("pipeline index entry {ordinal} is out of bounds"))
            })
        })
        .collect::<PcResult<Vec<_>>>()?;

    let mut out = Classification::default();
    for (ordinal, entry) in (0u32..).zip(rows) {
        let memory_size = entry.pipeline_memory_size;

        match pools.iter_mut().find(|p| memory_size <= p.size) {
            Some(pool) => pool.add(ordinal, memory_size),
            None => {
                tracing::warn!(
                    ordinal,
                    id = %crate::foundation::core::HexId(&entry.pipeline_identifier),
                    memory_size,
                    "pipeline did not fit in any pool"
                );
                out.unfit.push(UnfitPipeline {
                    ordinal,
                    identifier: entry.pipeline_identifier,
                    memory_size,
                });
            }
        }
    }
    Ok(out)
}

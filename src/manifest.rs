//! JSON manifests describing a cache to assemble from files on disk.

use std::path::{Path, PathBuf};

use crate::foundation::core::{Uuid, uuid_hex};
use crate::foundation::error::{PcError, PcResult};
use crate::writer::entry::PipelineEntry;
use crate::writer::{CacheWriter, LayoutConfig};

/// Top-level manifest.
///
/// File paths are resolved relative to the directory passed to [`CacheManifest::load`].
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct CacheManifest {
    pub vendor_id: u32,
    pub device_id: u32,
    #[serde(with = "uuid_hex")]
    pub cache_uuid: Uuid,
    #[serde(default)]
    pub implementation_data: u32,
    #[serde(default)]
    pub layout: LayoutConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub global_vendor_data: Option<PathBuf>,
    #[serde(default)]
    pub pipelines: Vec<PipelineManifest>,
}

#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct PipelineManifest {
    #[serde(with = "uuid_hex")]
    pub identifier: Uuid,
    pub memory_size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vendor_data: Option<PathBuf>,
    #[serde(default)]
    pub stages: Vec<StageManifest>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct StageManifest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vendor_data: Option<PathBuf>,
}

impl CacheManifest {
    /// Parse a manifest from JSON text.
    pub fn from_json(text: &str) -> PcResult<Self> {
        serde_json::from_str(text).map_err(|e| PcError::manifest(format!("parse manifest: {e}")))
    }

    /// Read and parse a manifest file.
    pub fn from_path(path: &Path) -> PcResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Check what can be checked without touching the filesystem.
    pub fn validate(&self) -> PcResult<()> {
        for (i, p) in self.pipelines.iter().enumerate() {
            if let Some(j) = self.pipelines[..i]
                .iter()
                .position(|q| q.identifier == p.identifier)
            {
                tracing::warn!(
                    first = j,
                    duplicate = i,
                    "duplicate pipeline identifier; lookups resolve to the first"
                );
            }
        }
        u32::try_from(self.pipelines.len())
            .map_err(|_| PcError::manifest("too many pipelines"))?;
        for p in &self.pipelines {
            u32::try_from(p.stages.len())
                .map_err(|_| PcError::manifest("too many stages"))?;
        }
        Ok(())
    }

    /// Read every referenced file below `root`.
    pub fn load(self, root: &Path) -> PcResult<LoadedManifest> {
        self.validate()?;

        let read = |rel: &Option<PathBuf>| -> PcResult<Option<Vec<u8>>> {
            rel.as_ref()
                .map(|rel| {
                    let path = root.join(rel);
                    std::fs::read(&path).map_err(|e| {
                        PcError::manifest(format!("read '{}': {e}", path.display()))
                    })
                })
                .transpose()
        };

        let global_vendor_data = read(&self.global_vendor_data)?;
        let mut pipelines = Vec::with_capacity(self.pipelines.len());
        for p in &self.pipelines {
            let mut stages = Vec::with_capacity(p.stages.len());
            for s in &p.stages {
                stages.push(LoadedStage {
                    code: read(&s.code)?,
                    vendor_data: read(&s.vendor_data)?,
                });
            }
            pipelines.push(LoadedPipeline {
                json: read(&p.json)?,
                vendor_data: read(&p.vendor_data)?,
                stages,
            });
        }

        Ok(LoadedManifest {
            manifest: self,
            global_vendor_data,
            pipelines,
        })
    }
}

#[derive(Clone, Debug)]
struct LoadedStage {
    code: Option<Vec<u8>>,
    vendor_data: Option<Vec<u8>>,
}

#[derive(Clone, Debug)]
struct LoadedPipeline {
    json: Option<Vec<u8>>,
    vendor_data: Option<Vec<u8>>,
    stages: Vec<LoadedStage>,
}

/// A manifest with all referenced file contents in memory.
#[derive(Clone, Debug)]
pub struct LoadedManifest {
    manifest: CacheManifest,
    global_vendor_data: Option<Vec<u8>>,
    pipelines: Vec<LoadedPipeline>,
}

impl LoadedManifest {
    pub fn manifest(&self) -> &CacheManifest {
        &self.manifest
    }

    /// Assemble the cache blob.
    #[tracing::instrument(skip_all, fields(pipelines = self.pipelines.len()))]
    pub fn build(&self) -> PcResult<Vec<u8>> {
        let mut entries = Vec::with_capacity(self.pipelines.len());
        for (desc, data) in self.manifest.pipelines.iter().zip(&self.pipelines) {
            let mut entry = PipelineEntry::new(desc.identifier, desc.memory_size);
            if let Some(json) = &data.json {
                entry.set_json(json);
            }
            if let Some(vendor) = &data.vendor_data {
                entry.set_vendor_data(vendor);
            }
            if !data.stages.is_empty() {
                entry.allocate_stages(data.stages.len() as u32)?;
                for (s, stage) in data.stages.iter().enumerate() {
                    if let Some(code) = &stage.code {
                        entry.set_shader_stage_code(s as u32, code)?;
                    }
                    if let Some(vendor) = &stage.vendor_data {
                        entry.set_stage_vendor_data(s as u32, vendor)?;
                    }
                }
            }
            entries.push(entry);
        }

        let m = &self.manifest;
        let mut writer = CacheWriter::new(m.vendor_id, m.device_id, m.cache_uuid);
        writer.set_implementation_data(m.implementation_data);
        if let Some(data) = &self.global_vendor_data {
            writer.set_global_vendor_data(data);
        }
        writer.apply_layout(&m.layout)?;
        writer.allocate_pipeline_index(entries.len() as u32)?;
        for (i, entry) in entries.iter().enumerate() {
            writer.set_pipeline_entry(i as u32, entry)?;
        }
        writer.to_vec()
    }
}

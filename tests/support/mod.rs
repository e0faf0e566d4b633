#![allow(dead_code)]

use pcutil::{CacheReader, CacheWriter, LayoutConfig, PipelineEntry, Uuid};

pub const SAMPLE_PAYLOAD: [u8; 8] = [0xde, 0xad, 0xde, 0xad, 0xbe, 0xef, 0x7a, 0xc0];

pub fn pipeline_uuid(i: u32) -> Uuid {
    words_to_bytes(&[i, 0x5566_5566, 0xbeef_7ac0, 0xfeed_face])
        .try_into()
        .unwrap()
}

pub fn stage_code(i: u32) -> Vec<u8> {
    words_to_bytes(&[
        0x1111_1111,
        0x2222_2222,
        0x3333_3333,
        i,
        0x5566_5566,
        0x6666_6666,
        0x7788_7788,
        0x8899_8899,
    ])
}

pub fn words_to_bytes(words: &[u32]) -> Vec<u8> {
    words.iter().flat_map(|w| w.to_ne_bytes()).collect()
}

pub struct StageData {
    pub code: Vec<u8>,
    pub vendor_data: Vec<u8>,
}

pub struct PipelineData {
    pub uuid: Uuid,
    pub memory_size: u64,
    pub json: String,
    pub vendor_data: Vec<u8>,
    pub stages: Vec<StageData>,
}

/// Deterministic cache contents plus the expectations to check a blob against.
pub struct TestData {
    pub seed: u32,
    pub vendor_id: u32,
    pub device_id: u32,
    pub cache_uuid: Uuid,
    pub implementation_data: u32,
    pub pipelines: Vec<PipelineData>,
    pub global_vendor_data: Vec<u8>,
    pub pipeline_vendor_size: u32,
    pub stage_vendor_size: u32,
}

impl TestData {
    pub fn new(seed: u32) -> Self {
        Self {
            seed,
            vendor_id: 0x10de,
            device_id: 0xabcd,
            cache_uuid: [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 0xa, 0xb, 0xc, 0xd, 0xe, 0xf],
            implementation_data: 0xbeef_7ac0,
            pipelines: Vec::new(),
            global_vendor_data: Vec::new(),
            pipeline_vendor_size: 0,
            stage_vendor_size: 0,
        }
    }

    pub fn gen_pipelines(&mut self, count: u32, stage_count: u32) -> &mut Self {
        self.pipelines = (0..count)
            .map(|i| PipelineData {
                uuid: pipeline_uuid(i),
                memory_size: 32 + u64::from(i) * 11,
                json: String::new(),
                vendor_data: Vec::new(),
                stages: (0..stage_count)
                    .map(|s| StageData {
                        code: stage_code(s),
                        vendor_data: Vec::new(),
                    })
                    .collect(),
            })
            .collect();
        self
    }

    pub fn gen_json(&mut self) -> &mut Self {
        for (i, p) in self.pipelines.iter_mut().enumerate() {
            p.json = format!("{{ 'msg' : 'Simple json playload #{i}' }}");
        }
        self
    }

    pub fn gen_pipeline_vendor_data(&mut self, size: u32) -> &mut Self {
        self.pipeline_vendor_size = size;
        let seed = self.seed;
        for (i, p) in self.pipelines.iter_mut().enumerate() {
            let i = i as u32;
            p.vendor_data = (0..size)
                .map(|_| seeded(seed + i, SAMPLE_PAYLOAD[i as usize % SAMPLE_PAYLOAD.len()]))
                .collect();
        }
        self
    }

    pub fn gen_stage_vendor_data(&mut self, size: u32) -> &mut Self {
        self.stage_vendor_size = size;
        let seed = self.seed;
        for p in &mut self.pipelines {
            for (i, s) in p.stages.iter_mut().enumerate() {
                let i = i as u32;
                s.vendor_data = (0..size)
                    .map(|j| {
                        seeded(
                            seed + 17 * i + j,
                            SAMPLE_PAYLOAD[j as usize % SAMPLE_PAYLOAD.len()],
                        )
                    })
                    .collect();
            }
        }
        self
    }

    pub fn gen_global_vendor_data(&mut self, size: usize) -> &mut Self {
        let seed = self.seed;
        self.global_vendor_data = (0..size)
            .map(|i| seeded(seed, SAMPLE_PAYLOAD[i % SAMPLE_PAYLOAD.len()]))
            .collect();
        self
    }

    /// Borrowing writer entries for every generated pipeline.
    pub fn entries(&self) -> Vec<PipelineEntry<'_>> {
        self.pipelines
            .iter()
            .map(|p| {
                let mut e = PipelineEntry::new(p.uuid, p.memory_size);
                if !p.json.is_empty() {
                    e.set_json(p.json.as_bytes());
                }
                if !p.vendor_data.is_empty() {
                    e.set_vendor_data(&p.vendor_data);
                }
                if !p.stages.is_empty() {
                    e.allocate_stages(p.stages.len() as u32).unwrap();
                    for (s, stage) in p.stages.iter().enumerate() {
                        e.set_shader_stage_code(s as u32, &stage.code).unwrap();
                        if !stage.vendor_data.is_empty() {
                            e.set_stage_vendor_data(s as u32, &stage.vendor_data).unwrap();
                        }
                    }
                }
                e
            })
            .collect()
    }

    /// Layout with strides just large enough for the generated vendor data.
    pub fn natural_layout(&self) -> LayoutConfig {
        LayoutConfig {
            pipeline_index_stride: (self.pipeline_vendor_size > 0)
                .then(|| pcutil::PIPELINE_INDEX_ENTRY_SIZE + self.pipeline_vendor_size),
            pipeline_index_offset: None,
            stage_index_stride: (self.stage_vendor_size > 0)
                .then(|| pcutil::STAGE_INDEX_ENTRY_SIZE + self.stage_vendor_size),
        }
    }

    pub fn blob(&self) -> Vec<u8> {
        self.blob_with(&self.natural_layout())
    }

    pub fn blob_with(&self, layout: &LayoutConfig) -> Vec<u8> {
        let entries = self.entries();
        let mut w = CacheWriter::new(self.vendor_id, self.device_id, self.cache_uuid);
        w.set_implementation_data(self.implementation_data);
        if !self.global_vendor_data.is_empty() {
            w.set_global_vendor_data(&self.global_vendor_data);
        }
        w.apply_layout(layout).unwrap();
        w.allocate_pipeline_index(entries.len() as u32).unwrap();
        for (i, e) in entries.iter().enumerate() {
            w.set_pipeline_entry(i as u32, e).unwrap();
        }
        w.to_vec().unwrap()
    }

    /// Assert that `blob` reads back exactly as generated.
    pub fn verify(&self, blob: &[u8]) {
        let r = CacheReader::new(blob);
        assert!(r.is_valid());

        let h = r.header_version_one().unwrap();
        assert_eq!(h.header_size, pcutil::HEADER_SIZE as u32);
        assert_eq!(h.header_version, pcutil::HEADER_VERSION_SAFETY_CRITICAL_ONE);
        assert_eq!(h.vendor_id, self.vendor_id);
        assert_eq!(h.device_id, self.device_id);
        assert_eq!(h.pipeline_cache_uuid, self.cache_uuid);
        assert_eq!(
            r.validation_version(),
            pcutil::VALIDATION_VERSION_SAFETY_CRITICAL_ONE
        );
        assert_eq!(r.implementation_data(), self.implementation_data);
        assert_eq!(r.pipeline_index_count(), self.pipelines.len() as u32);

        if !self.global_vendor_data.is_empty() {
            let gap = r.global_vendor_data().unwrap();
            assert_eq!(&gap[..self.global_vendor_data.len()], &self.global_vendor_data[..]);
        }

        for (i, p) in self.pipelines.iter().enumerate() {
            let i = i as u32;
            let pie = r.pipeline_index_entry(i).unwrap();
            assert_eq!(pie.pipeline_identifier, p.uuid);
            assert_eq!(pie.pipeline_memory_size, p.memory_size);
            assert_eq!(r.pipeline_index_entry_by_id(&p.uuid), Some(pie));

            if p.json.is_empty() {
                assert_eq!((pie.json_size, pie.json_offset), (0, 0));
                assert_eq!(r.json(&pie), None);
            } else {
                assert_eq!(r.json(&pie), Some(p.json.as_bytes()));
            }

            let gap = r.pipeline_vendor_data(i).unwrap();
            assert_eq!(&gap[..p.vendor_data.len()], &p.vendor_data[..]);

            assert_eq!(pie.stage_index_count, p.stages.len() as u32);
            for (s, stage) in p.stages.iter().enumerate() {
                let s = s as u32;
                let sie = r.stage_index_entry(&pie, s).unwrap();
                assert_eq!(r.spirv(&sie), Some(&stage.code[..]));
                let gap = r.stage_vendor_data(&pie, s).unwrap();
                assert_eq!(&gap[..stage.vendor_data.len()], &stage.vendor_data[..]);
            }
            assert_eq!(r.stage_index_entry(&pie, p.stages.len() as u32), None);
        }
        assert_eq!(r.pipeline_index_entry(self.pipelines.len() as u32), None);
    }
}

fn seeded(base: u32, payload: u8) -> u8 {
    ((base + u32::from(payload)) % 0xff) as u8
}

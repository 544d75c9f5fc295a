//! Shared helpers for `altair-gl` integration tests.

// Not every test binary uses every helper.
#![allow(dead_code)]

use std::collections::{HashMap, HashSet};

use altair_gl::driver::{GlHandle, GlProbe, ProbeError, ShaderStage, StageResources};
use altair_gl::UNBOUND;

pub fn init_logging() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// Scriptable [`GlProbe`] standing in for a live driver.
///
/// The probe shaders are recognized by distinctive substrings of their
/// sources, so each probe's outcome can be scripted independently. Buffer
/// contents and the dynamic-indexing draw are simulated well enough for the
/// readback comparison to behave like a real driver, including a faulty
/// mode that resolves every dynamic component index to component zero.
pub struct FakeProbe {
    pub vendor: String,
    pub extensions: HashSet<String>,
    pub stage_resources: [StageResources; ShaderStage::COUNT],
    pub uniform_alignment: u64,
    pub storage_alignment: u64,
    pub max_vertex_attributes: u32,
    pub max_varyings: u32,

    pub link_variable_aoffi: bool,
    pub link_component_indexing: bool,
    pub link_precise: bool,
    pub faulty_component_indexing: bool,
    pub fail_readback: bool,

    pub live_programs: HashSet<GlHandle>,
    pub live_buffers: HashSet<GlHandle>,
    pub live_vertex_arrays: HashSet<GlHandle>,
    pub bound_program: GlHandle,
    pub bound_vertex_array: GlHandle,

    next_handle: GlHandle,
    buffer_contents: HashMap<GlHandle, Vec<u8>>,
    program_sources: HashMap<GlHandle, String>,
    bound_uniform_buffer: GlHandle,
    bound_storage_buffer: GlHandle,
    uniform_value: u32,
}

impl FakeProbe {
    /// A driver with every extension, generous limits and no bugs.
    pub fn cooperative() -> Self {
        let extensions = [
            "GL_NV_gpu_shader5",
            "GL_NV_shader_thread_group",
            "GL_NV_shader_thread_shuffle",
            "GL_ARB_shader_ballot",
            "GL_ARB_shader_viewport_layer_array",
            "GL_EXT_shader_image_load_formatted",
        ]
        .into_iter()
        .map(str::to_owned)
        .collect();
        Self {
            vendor: "Mesa".to_owned(),
            extensions,
            stage_resources: [StageResources {
                uniform_buffers: 16,
                storage_buffers: 8,
                samplers: 32,
                images: 8,
            }; ShaderStage::COUNT],
            uniform_alignment: 256,
            storage_alignment: 16,
            max_vertex_attributes: 16,
            max_varyings: 31,
            link_variable_aoffi: true,
            link_component_indexing: true,
            link_precise: true,
            faulty_component_indexing: false,
            fail_readback: false,
            live_programs: HashSet::new(),
            live_buffers: HashSet::new(),
            live_vertex_arrays: HashSet::new(),
            bound_program: UNBOUND,
            bound_vertex_array: UNBOUND,
            next_handle: 1,
            buffer_contents: HashMap::new(),
            program_sources: HashMap::new(),
            bound_uniform_buffer: UNBOUND,
            bound_storage_buffer: UNBOUND,
            uniform_value: 0,
        }
    }

    pub fn with_vendor(vendor: &str) -> Self {
        let mut probe = Self::cooperative();
        probe.vendor = vendor.to_owned();
        probe
    }

    pub fn no_transients_remain(&self) -> bool {
        self.live_programs.is_empty()
            && self.live_buffers.is_empty()
            && self.live_vertex_arrays.is_empty()
            && self.bound_program == UNBOUND
            && self.bound_vertex_array == UNBOUND
    }

    fn alloc_handle(&mut self) -> GlHandle {
        let handle = self.next_handle;
        self.next_handle += 1;
        handle
    }

    fn uniform_words(&self) -> Vec<u32> {
        let bytes = self
            .buffer_contents
            .get(&self.bound_uniform_buffer)
            .cloned()
            .unwrap_or_default();
        bytes
            .chunks_exact(4)
            .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect()
    }
}

impl GlProbe for FakeProbe {
    fn vendor(&self) -> String {
        self.vendor.clone()
    }

    fn has_extension(&self, name: &str) -> bool {
        self.extensions.contains(name)
    }

    fn stage_resources(&self, stage: ShaderStage) -> StageResources {
        self.stage_resources[stage.index()]
    }

    fn uniform_buffer_offset_alignment(&self) -> u64 {
        self.uniform_alignment
    }

    fn storage_buffer_offset_alignment(&self) -> u64 {
        self.storage_alignment
    }

    fn max_vertex_attributes(&self) -> u32 {
        self.max_vertex_attributes
    }

    fn max_varyings(&self) -> u32 {
        self.max_varyings
    }

    fn compile_vertex_program(&mut self, source: &str) -> Option<GlHandle> {
        let links = if source.contains("textureOffset") {
            self.link_variable_aoffi
        } else if source.contains("input_value") {
            self.link_component_indexing
        } else if source.contains("precise") {
            self.link_precise
        } else {
            true
        };
        if !links {
            return None;
        }
        let handle = self.alloc_handle();
        self.live_programs.insert(handle);
        self.program_sources.insert(handle, source.to_owned());
        Some(handle)
    }

    fn delete_program(&mut self, program: GlHandle) {
        self.live_programs.remove(&program);
        self.program_sources.remove(&program);
    }

    fn use_program(&mut self, program: GlHandle) {
        self.bound_program = program;
    }

    fn create_vertex_array(&mut self) -> GlHandle {
        let handle = self.alloc_handle();
        self.live_vertex_arrays.insert(handle);
        handle
    }

    fn bind_vertex_array(&mut self, vertex_array: GlHandle) {
        self.bound_vertex_array = vertex_array;
    }

    fn delete_vertex_array(&mut self, vertex_array: GlHandle) {
        self.live_vertex_arrays.remove(&vertex_array);
    }

    fn create_buffer_with_data(&mut self, data: &[u8]) -> GlHandle {
        let handle = self.alloc_handle();
        self.live_buffers.insert(handle);
        self.buffer_contents.insert(handle, data.to_vec());
        handle
    }

    fn create_readback_buffer(&mut self, size: usize) -> GlHandle {
        let handle = self.alloc_handle();
        self.live_buffers.insert(handle);
        self.buffer_contents.insert(handle, vec![0; size]);
        handle
    }

    fn invalidate_buffer(&mut self, buffer: GlHandle) {
        if let Some(contents) = self.buffer_contents.get_mut(&buffer) {
            contents.fill(0xcd);
        }
    }

    fn bind_uniform_buffer(&mut self, _slot: u32, buffer: GlHandle) {
        self.bound_uniform_buffer = buffer;
    }

    fn bind_storage_buffer(&mut self, _slot: u32, buffer: GlHandle) {
        self.bound_storage_buffer = buffer;
    }

    fn set_uniform_u32(&mut self, _program: GlHandle, _location: u32, value: u32) {
        self.uniform_value = value;
    }

    fn draw_points(&mut self, _count: u32) {
        let is_indexing_probe = self
            .program_sources
            .get(&self.bound_program)
            .is_some_and(|source| source.contains("input_value"));
        if !is_indexing_probe {
            return;
        }
        let words = self.uniform_words();
        let index = self.uniform_value as usize;
        let resolved = if self.faulty_component_indexing {
            index & !3
        } else {
            index
        };
        let value = words.get(resolved).copied().unwrap_or(0);
        if let Some(output) = self.buffer_contents.get_mut(&self.bound_storage_buffer) {
            output[..4].copy_from_slice(&value.to_le_bytes());
        }
    }

    fn read_buffer_u32(&mut self, buffer: GlHandle, offset: usize) -> Result<u32, ProbeError> {
        if self.fail_readback {
            return Err(ProbeError {
                buffer,
                reason: "buffer mapping failed",
            });
        }
        let contents = self.buffer_contents.get(&buffer).ok_or(ProbeError {
            buffer,
            reason: "no such buffer",
        })?;
        let bytes = contents.get(offset..offset + 4).ok_or(ProbeError {
            buffer,
            reason: "read past end of buffer",
        })?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn delete_buffer(&mut self, buffer: GlHandle) {
        self.live_buffers.remove(&buffer);
        self.buffer_contents.remove(&buffer);
    }
}

//! Host driver capability and quirk probe.
//!
//! [`Device::probe`] runs once at context creation, on the context thread,
//! and snapshots everything the rest of the backend needs to know about the
//! host driver: binding-slot layout, alignment limits, extension support and
//! three functionally probed quirks. The snapshot is immutable afterwards;
//! every later decision reads it through accessors.
//!
//! Quirk probing compiles tiny throwaway programs on the live driver because
//! version and extension strings do not admit these bugs. Any probe failure
//! degrades to the conservative flag value instead of failing construction.

use tracing::{info, warn};

use crate::driver::{GlProbe, ShaderStage, StageResources, UNBOUND};

/// Uniform-buffer slots reserved per graphics stage for internal emulation
/// data (guest constant engine state, texture scaling factors).
pub const RESERVED_UNIFORM_BLOCKS: u32 = 1;

const FORCE_BROKEN_COMPUTE_ENV: &str = "ALTAIR_GL_FORCE_BROKEN_COMPUTE";
const FORCE_FAST_BUFFER_SUB_DATA_ENV: &str = "ALTAIR_GL_FORCE_FAST_BUFFER_SUB_DATA";

/// First binding slot of each resource class for one shader stage.
///
/// Graphics stages carve contiguous slot ranges out of shared namespaces in
/// stage order; a stage's entry is the sum of all earlier stages' capacities.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BaseBindings {
    pub uniform_buffer: u32,
    pub shader_storage_buffer: u32,
    pub sampler: u32,
    pub image: u32,
}

impl std::ops::Add<StageResources> for BaseBindings {
    type Output = BaseBindings;

    fn add(self, stage: StageResources) -> BaseBindings {
        BaseBindings {
            uniform_buffer: self.uniform_buffer + stage.uniform_buffers,
            shader_storage_buffer: self.shader_storage_buffer + stage.storage_buffers,
            sampler: self.sampler + stage.samplers,
            image: self.image + stage.images,
        }
    }
}

/// Caller-supplied corrections for the vendor-string heuristics.
///
/// `None` keeps the heuristic; `Some` pins the flag. The
/// `ALTAIR_GL_FORCE_BROKEN_COMPUTE` and `ALTAIR_GL_FORCE_FAST_BUFFER_SUB_DATA`
/// environment variables override both.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QuirkOverrides {
    pub broken_compute: Option<bool>,
    pub fast_buffer_sub_data: Option<bool>,
}

/// Immutable snapshot of the host driver's capabilities and quirks.
#[derive(Clone, Debug)]
pub struct Device {
    base_bindings: [BaseBindings; ShaderStage::COUNT],
    uniform_buffer_alignment: u64,
    storage_buffer_alignment: u64,
    max_vertex_attributes: u32,
    max_varyings: u32,
    has_warp_intrinsics: bool,
    has_shader_ballot: bool,
    has_vertex_viewport_layer: bool,
    has_image_load_formatted: bool,
    has_variable_aoffi: bool,
    has_component_indexing_bug: bool,
    has_precise_bug: bool,
    has_broken_compute: bool,
    has_fast_buffer_sub_data: bool,
}

impl Device {
    /// Query the host driver and run the functional quirk probes.
    ///
    /// May create transient programs, buffers and vertex arrays through `gl`;
    /// all of them are deleted and the program and vertex-array bindings
    /// restored to zero before returning.
    pub fn probe(gl: &mut impl GlProbe, overrides: &QuirkOverrides) -> Device {
        let vendor = gl.vendor();
        let is_nvidia = vendor == "NVIDIA Corporation";
        let is_intel = vendor == "Intel";

        let has_broken_compute = resolve_quirk(
            FORCE_BROKEN_COMPUTE_ENV,
            overrides.broken_compute,
            is_intel,
        );
        let has_fast_buffer_sub_data = resolve_quirk(
            FORCE_FAST_BUFFER_SUB_DATA_ENV,
            overrides.fast_buffer_sub_data,
            is_nvidia,
        );

        let device = Device {
            base_bindings: build_base_bindings(gl),
            uniform_buffer_alignment: gl.uniform_buffer_offset_alignment(),
            storage_buffer_alignment: gl.storage_buffer_offset_alignment(),
            max_vertex_attributes: gl.max_vertex_attributes(),
            max_varyings: gl.max_varyings(),
            has_warp_intrinsics: gl.has_extension("GL_NV_gpu_shader5")
                && gl.has_extension("GL_NV_shader_thread_group")
                && gl.has_extension("GL_NV_shader_thread_shuffle"),
            has_shader_ballot: gl.has_extension("GL_ARB_shader_ballot"),
            has_vertex_viewport_layer: gl.has_extension("GL_ARB_shader_viewport_layer_array"),
            has_image_load_formatted: gl.has_extension("GL_EXT_shader_image_load_formatted"),
            has_variable_aoffi: test_variable_aoffi(gl),
            has_component_indexing_bug: test_component_indexing_bug(gl),
            has_precise_bug: test_precise_bug(gl),
            has_broken_compute,
            has_fast_buffer_sub_data,
        };
        info!(
            has_variable_aoffi = device.has_variable_aoffi,
            has_component_indexing_bug = device.has_component_indexing_bug,
            has_precise_bug = device.has_precise_bug,
            "host driver probed"
        );
        device
    }

    /// Permissive snapshot for headless runs with no live driver: every
    /// capability present, every bug absent, zeroed binding tables.
    pub fn null() -> Device {
        Device {
            base_bindings: [BaseBindings::default(); ShaderStage::COUNT],
            uniform_buffer_alignment: 4,
            storage_buffer_alignment: 4,
            max_vertex_attributes: 16,
            max_varyings: 15,
            has_warp_intrinsics: true,
            has_shader_ballot: true,
            has_vertex_viewport_layer: true,
            has_image_load_formatted: true,
            has_variable_aoffi: true,
            has_component_indexing_bug: false,
            has_precise_bug: false,
            has_broken_compute: false,
            has_fast_buffer_sub_data: false,
        }
    }

    /// First binding slots of each resource class for `stage`.
    pub fn base_bindings(&self, stage: ShaderStage) -> BaseBindings {
        self.base_bindings[stage.index()]
    }

    /// Required alignment of uniform-buffer binding offsets, in bytes.
    pub fn uniform_buffer_alignment(&self) -> u64 {
        self.uniform_buffer_alignment
    }

    /// Required alignment of storage-buffer binding offsets, in bytes.
    pub fn storage_buffer_alignment(&self) -> u64 {
        self.storage_buffer_alignment
    }

    pub fn max_vertex_attributes(&self) -> u32 {
        self.max_vertex_attributes
    }

    pub fn max_varyings(&self) -> u32 {
        self.max_varyings
    }

    /// Warp vote/shuffle intrinsics are available to the shader translator.
    pub fn has_warp_intrinsics(&self) -> bool {
        self.has_warp_intrinsics
    }

    pub fn has_shader_ballot(&self) -> bool {
        self.has_shader_ballot
    }

    /// Viewport and layer indices may be written from the vertex stage.
    pub fn has_vertex_viewport_layer(&self) -> bool {
        self.has_vertex_viewport_layer
    }

    /// Formatted image loads work without an explicit format qualifier.
    pub fn has_image_load_formatted(&self) -> bool {
        self.has_image_load_formatted
    }

    /// Texture fetch offsets may be non-constant expressions.
    pub fn has_variable_aoffi(&self) -> bool {
        self.has_variable_aoffi
    }

    /// Dynamic vector component indexing miscompiles on this driver.
    pub fn has_component_indexing_bug(&self) -> bool {
        self.has_component_indexing_bug
    }

    /// The `precise` qualifier breaks program linking on this driver.
    pub fn has_precise_bug(&self) -> bool {
        self.has_precise_bug
    }

    /// Compute dispatch is unreliable; callers should prefer a fallback path.
    pub fn has_broken_compute(&self) -> bool {
        self.has_broken_compute
    }

    /// Small in-place buffer uploads beat the orphan-and-copy path here.
    pub fn has_fast_buffer_sub_data(&self) -> bool {
        self.has_fast_buffer_sub_data
    }
}

/// Env var wins over the caller override, which wins over the heuristic.
fn resolve_quirk(env_name: &str, caller: Option<bool>, heuristic: bool) -> bool {
    if let Some(forced) = env_override(env_name) {
        return forced;
    }
    caller.unwrap_or(heuristic)
}

/// Tri-state env parse: unset or unrecognized means "no override".
fn env_override(name: &str) -> Option<bool> {
    let value = std::env::var(name).ok()?;
    match value.trim() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        other => {
            warn!(var = name, value = other, "unrecognized quirk override ignored");
            None
        }
    }
}

/// Lay out the shared graphics binding namespaces stage by stage.
///
/// Each graphics stage starts where the previous one ends. The vertex stage
/// starts its uniform-buffer range after the reserved internal blocks, and
/// every stage's reported uniform capacity has the reservation carved out so
/// the accumulated bases already account for it. Compute binds from zero in
/// its own namespace.
fn build_base_bindings(gl: &impl GlProbe) -> [BaseBindings; ShaderStage::COUNT] {
    let graphics = [
        ShaderStage::Vertex,
        ShaderStage::TessControl,
        ShaderStage::TessEval,
        ShaderStage::Geometry,
        ShaderStage::Fragment,
    ];

    let mut table = [BaseBindings::default(); ShaderStage::COUNT];
    table[ShaderStage::Vertex.index()] = BaseBindings {
        uniform_buffer: RESERVED_UNIFORM_BLOCKS,
        shader_storage_buffer: 0,
        sampler: 0,
        image: 0,
    };
    for window in graphics.windows(2) {
        let (prev, next) = (window[0], window[1]);
        table[next.index()] = table[prev.index()] + stage_capacity(gl, prev);
    }
    table[ShaderStage::Compute.index()] = BaseBindings::default();
    table
}

fn stage_capacity(gl: &impl GlProbe, stage: ShaderStage) -> StageResources {
    let reported = gl.stage_resources(stage);
    StageResources {
        uniform_buffers: reported.uniform_buffers.saturating_sub(RESERVED_UNIFORM_BLOCKS),
        ..reported
    }
}

const VARIABLE_AOFFI_PROBE: &str = r#"#version 430 core
layout(binding = 0) uniform sampler2D tex;
layout(location = 0) uniform ivec2 variable_offset;
out vec4 output_attribute;
void main() {
    output_attribute = textureOffset(tex, vec2(0), variable_offset);
}
"#;

const COMPONENT_INDEXING_PROBE: &str = r#"#version 430 core
layout (std430, binding = 0) buffer OutputBuffer {
    uint output_value;
};
layout (std140, binding = 0) uniform InputBuffer {
    uvec4 input_value[4096];
};
layout (location = 0) uniform uint idx;
void main() {
    output_value = input_value[idx >> 2][idx & 3];
}
"#;

const PRECISE_PROBE: &str = r#"#version 430 core
in vec3 coords;
out float out_value;
uniform sampler2DShadow tex;
void main() {
    precise float tmp_value = vec4(texture(tex, coords)).x;
    out_value = tmp_value;
}
"#;

/// Words uploaded to the probe uniform buffer. The first `uvec4` is zero so
/// a driver that always resolves index zero still fails the comparison.
const COMPONENT_PROBE_VALUES: [u32; 8] = [
    0, 0, 0, 0, 0x93d1_43f1, 0x25aa_016f, 0x7c1e_88c4, 0x5a93_32b0,
];

/// True when a program using a non-constant texture fetch offset links.
fn test_variable_aoffi(gl: &mut impl GlProbe) -> bool {
    match gl.compile_vertex_program(VARIABLE_AOFFI_PROBE) {
        Some(program) => {
            gl.delete_program(program);
            true
        }
        None => false,
    }
}

/// Upload known words, read each one back through a dynamically indexed
/// vector component, and flag the bug on any mismatch.
///
/// Probe infrastructure failures (link failure, readback failure) also flag
/// the bug: the workaround path is correct everywhere, just slower.
fn test_component_indexing_bug(gl: &mut impl GlProbe) -> bool {
    let Some(program) = gl.compile_vertex_program(COMPONENT_INDEXING_PROBE) else {
        warn!("component indexing probe failed to link, assuming bug");
        return true;
    };

    let input = gl.create_buffer_with_data(bytemuck::cast_slice(&COMPONENT_PROBE_VALUES));
    let output = gl.create_readback_buffer(std::mem::size_of::<u32>());
    let vertex_array = gl.create_vertex_array();
    gl.bind_vertex_array(vertex_array);
    gl.use_program(program);
    gl.bind_uniform_buffer(0, input);

    let mut mismatch = false;
    for index in 4..8 {
        gl.invalidate_buffer(output);
        gl.bind_storage_buffer(0, output);
        gl.set_uniform_u32(program, 0, index);
        gl.draw_points(1);
        match gl.read_buffer_u32(output, 0) {
            Ok(value) if value == COMPONENT_PROBE_VALUES[index as usize] => {}
            Ok(_) => mismatch = true,
            Err(err) => {
                warn!(%err, "component indexing probe readback failed, assuming bug");
                mismatch = true;
            }
        }
    }

    gl.use_program(UNBOUND);
    gl.bind_vertex_array(UNBOUND);
    gl.delete_vertex_array(vertex_array);
    gl.delete_buffer(input);
    gl.delete_buffer(output);
    gl.delete_program(program);
    mismatch
}

/// True when applying `precise` to a shadow-sampler fetch breaks linking.
fn test_precise_bug(gl: &mut impl GlProbe) -> bool {
    match gl.compile_vertex_program(PRECISE_PROBE) {
        Some(program) => {
            gl.delete_program(program);
            false
        }
        None => true,
    }
}

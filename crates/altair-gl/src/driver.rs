//! Trait seams between this crate and the live GL context.
//!
//! The embedder owns the real function loader and implements [`GlDriver`]
//! (state-changing calls emitted by [`crate::PipelineState::apply`]) and
//! [`GlProbe`] (queries and transient objects used by [`crate::Device`]).
//! Everything here is expressed with semantic enums rather than raw GL
//! enumerants, so the tracker and probe can be exercised headlessly; see
//! [`RecordingDriver`] for the test implementation.
//!
//! All calls are synchronous and must run on the thread that owns the
//! context. None of the state-changing calls can fail; the only fallible
//! operation is probe readback ([`GlProbe::read_buffer_u32`]).

use thiserror::Error;

/// Raw GL object name. The driver allocates and recycles these.
pub type GlHandle = u32;

/// Reserved handle value meaning "no resource bound".
pub const UNBOUND: GlHandle = 0;

/// Integer rectangle used for viewports and scissors.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CompareFunc {
    Never,
    Less,
    Equal,
    LessOrEqual,
    Greater,
    NotEqual,
    GreaterOrEqual,
    Always,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StencilOp {
    Keep,
    Zero,
    Replace,
    IncrementClamp,
    DecrementClamp,
    Invert,
    IncrementWrap,
    DecrementWrap,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StencilFace {
    Front,
    Back,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BlendFactor {
    Zero,
    One,
    SrcColor,
    OneMinusSrcColor,
    DstColor,
    OneMinusDstColor,
    SrcAlpha,
    OneMinusSrcAlpha,
    DstAlpha,
    OneMinusDstAlpha,
    ConstantColor,
    OneMinusConstantColor,
    ConstantAlpha,
    OneMinusConstantAlpha,
    SrcAlphaSaturate,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BlendEquation {
    Add,
    Subtract,
    ReverseSubtract,
    Min,
    Max,
}

/// Window-space origin convention for clip control.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ClipOrigin {
    LowerLeft,
    UpperLeft,
}

/// Clip-space depth convention for clip control.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ClipDepthMode {
    NegativeOneToOne,
    ZeroToOne,
}

/// Pipeline stages with their own binding-base table entry.
///
/// Graphics stages share one binding-slot namespace laid out contiguously in
/// this order; compute has an independent zero-based range.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex = 0,
    TessControl = 1,
    TessEval = 2,
    Geometry = 3,
    Fragment = 4,
    Compute = 5,
}

impl ShaderStage {
    pub const COUNT: usize = 6;

    pub fn index(self) -> usize {
        self as usize
    }
}

bitflags::bitflags! {
    /// Per-channel color write enables for one render target.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct ColorMask: u8 {
        const RED = 1 << 0;
        const GREEN = 1 << 1;
        const BLUE = 1 << 2;
        const ALPHA = 1 << 3;
    }
}

impl Default for ColorMask {
    fn default() -> Self {
        Self::all()
    }
}

/// Per-stage resource capacities reported by the host driver.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StageResources {
    pub uniform_buffers: u32,
    pub storage_buffers: u32,
    pub samplers: u32,
    pub images: u32,
}

/// Probe readback failure. Never fatal: the probe resolves the affected
/// quirk flag to its conservative value instead.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("probe readback from buffer {buffer} failed: {reason}")]
pub struct ProbeError {
    pub buffer: GlHandle,
    pub reason: &'static str,
}

/// State-changing calls against the stateful host API.
///
/// [`crate::PipelineState::apply`] emits the minimal sequence of these to
/// move the context from the previously applied configuration to the desired
/// one. Implementations translate each method into exactly one driver call.
pub trait GlDriver {
    fn bind_read_framebuffer(&mut self, framebuffer: GlHandle);
    fn bind_draw_framebuffer(&mut self, framebuffer: GlHandle);
    fn bind_shader_program(&mut self, program: GlHandle);
    fn bind_program_pipeline(&mut self, pipeline: GlHandle);

    fn set_clip_distance(&mut self, index: u32, enabled: bool);
    fn set_fragment_color_clamp(&mut self, enabled: bool);
    fn set_alpha_to_coverage(&mut self, enabled: bool);
    fn set_alpha_to_one(&mut self, enabled: bool);
    fn set_rasterizer_discard(&mut self, enabled: bool);

    fn set_color_mask(&mut self, target: u32, mask: ColorMask);

    fn set_viewport_rect(&mut self, index: u32, rect: Rect);
    fn set_depth_range(&mut self, index: u32, near: f64, far: f64);
    fn set_scissor_test(&mut self, index: u32, enabled: bool);
    fn set_scissor_rect(&mut self, index: u32, rect: Rect);

    fn set_stencil_test(&mut self, enabled: bool);
    fn set_stencil_func(&mut self, face: StencilFace, func: CompareFunc, reference: i32, mask: u32);
    fn set_stencil_op(
        &mut self,
        face: StencilFace,
        on_stencil_fail: StencilOp,
        on_depth_fail: StencilOp,
        on_depth_pass: StencilOp,
    );
    fn set_stencil_write_mask(&mut self, face: StencilFace, mask: u32);

    fn set_blend_enabled(&mut self, enabled: bool);
    fn set_blend_func(
        &mut self,
        src_rgb: BlendFactor,
        dst_rgb: BlendFactor,
        src_alpha: BlendFactor,
        dst_alpha: BlendFactor,
    );
    fn set_blend_equation(&mut self, rgb: BlendEquation, alpha: BlendEquation);
    fn set_blend_enabled_indexed(&mut self, target: u32, enabled: bool);
    fn set_blend_func_indexed(
        &mut self,
        target: u32,
        src_rgb: BlendFactor,
        dst_rgb: BlendFactor,
        src_alpha: BlendFactor,
        dst_alpha: BlendFactor,
    );
    fn set_blend_equation_indexed(&mut self, target: u32, rgb: BlendEquation, alpha: BlendEquation);

    fn set_clip_control(&mut self, origin: ClipOrigin, depth_mode: ClipDepthMode);

    fn bind_renderbuffer(&mut self, renderbuffer: GlHandle);
    fn bind_texture_unit(&mut self, unit: u32, texture: GlHandle);
    fn bind_sampler(&mut self, unit: u32, sampler: GlHandle);

    /// Ranged bind of `textures` to image units `first..first + textures.len()`.
    fn bind_image_textures(&mut self, first: u32, textures: &[GlHandle]);
}

/// Query and transient-object surface used by [`crate::Device::probe`].
///
/// Objects created through this trait are probe-local: the probe deletes
/// them and restores the program/vertex-array bindings before returning.
pub trait GlProbe {
    fn vendor(&self) -> String;
    fn has_extension(&self, name: &str) -> bool;
    fn stage_resources(&self, stage: ShaderStage) -> StageResources;
    fn uniform_buffer_offset_alignment(&self) -> u64;
    fn storage_buffer_offset_alignment(&self) -> u64;
    fn max_vertex_attributes(&self) -> u32;
    fn max_varyings(&self) -> u32;

    /// Compile and link `source` as a vertex program. `None` on failure.
    fn compile_vertex_program(&mut self, source: &str) -> Option<GlHandle>;
    fn delete_program(&mut self, program: GlHandle);
    fn use_program(&mut self, program: GlHandle);

    fn create_vertex_array(&mut self) -> GlHandle;
    fn bind_vertex_array(&mut self, vertex_array: GlHandle);
    fn delete_vertex_array(&mut self, vertex_array: GlHandle);

    fn create_buffer_with_data(&mut self, data: &[u8]) -> GlHandle;
    /// Create a host-visible buffer the probe can read results back from.
    fn create_readback_buffer(&mut self, size: usize) -> GlHandle;
    /// Orphan the buffer's storage so the next readback cannot observe a
    /// stale value from a previous iteration.
    fn invalidate_buffer(&mut self, buffer: GlHandle);
    fn bind_uniform_buffer(&mut self, slot: u32, buffer: GlHandle);
    fn bind_storage_buffer(&mut self, slot: u32, buffer: GlHandle);
    fn set_uniform_u32(&mut self, program: GlHandle, location: u32, value: u32);
    fn draw_points(&mut self, count: u32);
    fn read_buffer_u32(&mut self, buffer: GlHandle, offset: usize) -> Result<u32, ProbeError>;
    fn delete_buffer(&mut self, buffer: GlHandle);
}

/// One recorded [`GlDriver`] call.
#[derive(Clone, Debug, PartialEq)]
pub enum GlCall {
    BindReadFramebuffer(GlHandle),
    BindDrawFramebuffer(GlHandle),
    BindShaderProgram(GlHandle),
    BindProgramPipeline(GlHandle),
    SetClipDistance {
        index: u32,
        enabled: bool,
    },
    SetFragmentColorClamp(bool),
    SetAlphaToCoverage(bool),
    SetAlphaToOne(bool),
    SetRasterizerDiscard(bool),
    SetColorMask {
        target: u32,
        mask: ColorMask,
    },
    SetViewportRect {
        index: u32,
        rect: Rect,
    },
    SetDepthRange {
        index: u32,
        near: f64,
        far: f64,
    },
    SetScissorTest {
        index: u32,
        enabled: bool,
    },
    SetScissorRect {
        index: u32,
        rect: Rect,
    },
    SetStencilTest(bool),
    SetStencilFunc {
        face: StencilFace,
        func: CompareFunc,
        reference: i32,
        mask: u32,
    },
    SetStencilOp {
        face: StencilFace,
        on_stencil_fail: StencilOp,
        on_depth_fail: StencilOp,
        on_depth_pass: StencilOp,
    },
    SetStencilWriteMask {
        face: StencilFace,
        mask: u32,
    },
    SetBlendEnabled(bool),
    SetBlendFunc {
        src_rgb: BlendFactor,
        dst_rgb: BlendFactor,
        src_alpha: BlendFactor,
        dst_alpha: BlendFactor,
    },
    SetBlendEquation {
        rgb: BlendEquation,
        alpha: BlendEquation,
    },
    SetBlendEnabledIndexed {
        target: u32,
        enabled: bool,
    },
    SetBlendFuncIndexed {
        target: u32,
        src_rgb: BlendFactor,
        dst_rgb: BlendFactor,
        src_alpha: BlendFactor,
        dst_alpha: BlendFactor,
    },
    SetBlendEquationIndexed {
        target: u32,
        rgb: BlendEquation,
        alpha: BlendEquation,
    },
    SetClipControl {
        origin: ClipOrigin,
        depth_mode: ClipDepthMode,
    },
    BindRenderbuffer(GlHandle),
    BindTextureUnit {
        unit: u32,
        texture: GlHandle,
    },
    BindSampler {
        unit: u32,
        sampler: GlHandle,
    },
    BindImageTextures {
        first: u32,
        textures: Vec<GlHandle>,
    },
}

/// [`GlDriver`] implementation that records every call for assertions.
///
/// Tests diff two states, then inspect [`RecordingDriver::calls`] (or drain
/// it with [`RecordingDriver::take`]) to check exactly which driver calls
/// the diff emitted.
#[derive(Debug, Default)]
pub struct RecordingDriver {
    pub calls: Vec<GlCall>,
}

impl RecordingDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drain and return the recorded calls.
    pub fn take(&mut self) -> Vec<GlCall> {
        std::mem::take(&mut self.calls)
    }
}

impl GlDriver for RecordingDriver {
    fn bind_read_framebuffer(&mut self, framebuffer: GlHandle) {
        self.calls.push(GlCall::BindReadFramebuffer(framebuffer));
    }

    fn bind_draw_framebuffer(&mut self, framebuffer: GlHandle) {
        self.calls.push(GlCall::BindDrawFramebuffer(framebuffer));
    }

    fn bind_shader_program(&mut self, program: GlHandle) {
        self.calls.push(GlCall::BindShaderProgram(program));
    }

    fn bind_program_pipeline(&mut self, pipeline: GlHandle) {
        self.calls.push(GlCall::BindProgramPipeline(pipeline));
    }

    fn set_clip_distance(&mut self, index: u32, enabled: bool) {
        self.calls.push(GlCall::SetClipDistance { index, enabled });
    }

    fn set_fragment_color_clamp(&mut self, enabled: bool) {
        self.calls.push(GlCall::SetFragmentColorClamp(enabled));
    }

    fn set_alpha_to_coverage(&mut self, enabled: bool) {
        self.calls.push(GlCall::SetAlphaToCoverage(enabled));
    }

    fn set_alpha_to_one(&mut self, enabled: bool) {
        self.calls.push(GlCall::SetAlphaToOne(enabled));
    }

    fn set_rasterizer_discard(&mut self, enabled: bool) {
        self.calls.push(GlCall::SetRasterizerDiscard(enabled));
    }

    fn set_color_mask(&mut self, target: u32, mask: ColorMask) {
        self.calls.push(GlCall::SetColorMask { target, mask });
    }

    fn set_viewport_rect(&mut self, index: u32, rect: Rect) {
        self.calls.push(GlCall::SetViewportRect { index, rect });
    }

    fn set_depth_range(&mut self, index: u32, near: f64, far: f64) {
        self.calls.push(GlCall::SetDepthRange { index, near, far });
    }

    fn set_scissor_test(&mut self, index: u32, enabled: bool) {
        self.calls.push(GlCall::SetScissorTest { index, enabled });
    }

    fn set_scissor_rect(&mut self, index: u32, rect: Rect) {
        self.calls.push(GlCall::SetScissorRect { index, rect });
    }

    fn set_stencil_test(&mut self, enabled: bool) {
        self.calls.push(GlCall::SetStencilTest(enabled));
    }

    fn set_stencil_func(&mut self, face: StencilFace, func: CompareFunc, reference: i32, mask: u32) {
        self.calls.push(GlCall::SetStencilFunc {
            face,
            func,
            reference,
            mask,
        });
    }

    fn set_stencil_op(
        &mut self,
        face: StencilFace,
        on_stencil_fail: StencilOp,
        on_depth_fail: StencilOp,
        on_depth_pass: StencilOp,
    ) {
        self.calls.push(GlCall::SetStencilOp {
            face,
            on_stencil_fail,
            on_depth_fail,
            on_depth_pass,
        });
    }

    fn set_stencil_write_mask(&mut self, face: StencilFace, mask: u32) {
        self.calls.push(GlCall::SetStencilWriteMask { face, mask });
    }

    fn set_blend_enabled(&mut self, enabled: bool) {
        self.calls.push(GlCall::SetBlendEnabled(enabled));
    }

    fn set_blend_func(
        &mut self,
        src_rgb: BlendFactor,
        dst_rgb: BlendFactor,
        src_alpha: BlendFactor,
        dst_alpha: BlendFactor,
    ) {
        self.calls.push(GlCall::SetBlendFunc {
            src_rgb,
            dst_rgb,
            src_alpha,
            dst_alpha,
        });
    }

    fn set_blend_equation(&mut self, rgb: BlendEquation, alpha: BlendEquation) {
        self.calls.push(GlCall::SetBlendEquation { rgb, alpha });
    }

    fn set_blend_enabled_indexed(&mut self, target: u32, enabled: bool) {
        self.calls
            .push(GlCall::SetBlendEnabledIndexed { target, enabled });
    }

    fn set_blend_func_indexed(
        &mut self,
        target: u32,
        src_rgb: BlendFactor,
        dst_rgb: BlendFactor,
        src_alpha: BlendFactor,
        dst_alpha: BlendFactor,
    ) {
        self.calls.push(GlCall::SetBlendFuncIndexed {
            target,
            src_rgb,
            dst_rgb,
            src_alpha,
            dst_alpha,
        });
    }

    fn set_blend_equation_indexed(&mut self, target: u32, rgb: BlendEquation, alpha: BlendEquation) {
        self.calls
            .push(GlCall::SetBlendEquationIndexed { target, rgb, alpha });
    }

    fn set_clip_control(&mut self, origin: ClipOrigin, depth_mode: ClipDepthMode) {
        self.calls.push(GlCall::SetClipControl { origin, depth_mode });
    }

    fn bind_renderbuffer(&mut self, renderbuffer: GlHandle) {
        self.calls.push(GlCall::BindRenderbuffer(renderbuffer));
    }

    fn bind_texture_unit(&mut self, unit: u32, texture: GlHandle) {
        self.calls.push(GlCall::BindTextureUnit { unit, texture });
    }

    fn bind_sampler(&mut self, unit: u32, sampler: GlHandle) {
        self.calls.push(GlCall::BindSampler { unit, sampler });
    }

    fn bind_image_textures(&mut self, first: u32, textures: &[GlHandle]) {
        self.calls.push(GlCall::BindImageTextures {
            first,
            textures: textures.to_vec(),
        });
    }
}

//! Guest pipeline configuration and differential state application.
//!
//! [`PipelineState`] is a plain value: the decoder fills one in from guest
//! registers without touching the driver, then [`PipelineState::apply`]
//! diffs it against the last-applied snapshot and emits only the driver
//! calls whose state actually changed. The snapshot is owned by the caller's
//! context wrapper and threaded through every `apply`, so there is exactly
//! one writer and no global state.
//!
//! Handles are raw GL names with `0` meaning unbound. The driver recycles
//! deleted names, so resource owners must call the matching invalidation
//! method ([`PipelineState::unbind_texture`] and friends) before deleting an
//! object; a recycled name that still sits in the snapshot would otherwise
//! suppress the rebind.

use crate::driver::{
    BlendEquation, BlendFactor, ClipDepthMode, ClipOrigin, ColorMask, CompareFunc, GlDriver,
    GlHandle, Rect, StencilFace, StencilOp, UNBOUND,
};
use crate::limits::{
    NUM_CLIP_DISTANCES, NUM_IMAGE_UNITS, NUM_RENDER_TARGETS, NUM_SAMPLER_UNITS, NUM_TEXTURE_UNITS,
    NUM_VIEWPORTS,
};

/// One viewport slot: window rectangle, depth range and scissor.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Viewport {
    pub rect: Rect,
    pub depth_range_near: f64,
    pub depth_range_far: f64,
    pub scissor_enabled: bool,
    pub scissor_rect: Rect,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            rect: Rect::default(),
            depth_range_near: 0.0,
            depth_range_far: 1.0,
            scissor_enabled: false,
            scissor_rect: Rect::default(),
        }
    }
}

/// Stencil configuration for one face.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StencilFaceState {
    pub test_func: CompareFunc,
    pub test_ref: i32,
    pub test_mask: u32,
    pub write_mask: u32,
    pub action_stencil_fail: StencilOp,
    pub action_depth_fail: StencilOp,
    pub action_depth_pass: StencilOp,
}

impl Default for StencilFaceState {
    fn default() -> Self {
        Self {
            test_func: CompareFunc::Always,
            test_ref: 0,
            test_mask: u32::MAX,
            write_mask: u32::MAX,
            action_stencil_fail: StencilOp::Keep,
            action_depth_fail: StencilOp::Keep,
            action_depth_pass: StencilOp::Keep,
        }
    }
}

/// Blend configuration for one render target.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlendTarget {
    pub enabled: bool,
    pub src_rgb: BlendFactor,
    pub dst_rgb: BlendFactor,
    pub src_alpha: BlendFactor,
    pub dst_alpha: BlendFactor,
    pub equation_rgb: BlendEquation,
    pub equation_alpha: BlendEquation,
}

impl Default for BlendTarget {
    fn default() -> Self {
        Self {
            enabled: false,
            src_rgb: BlendFactor::One,
            dst_rgb: BlendFactor::Zero,
            src_alpha: BlendFactor::One,
            dst_alpha: BlendFactor::Zero,
            equation_rgb: BlendEquation::Add,
            equation_alpha: BlendEquation::Add,
        }
    }
}

/// Complete pipeline configuration for one draw or dispatch.
///
/// `Default` matches the state of a freshly created context, so a
/// default-constructed applied snapshot is the correct starting point for
/// diffing on a context nothing else has touched.
#[derive(Clone, Debug, PartialEq)]
pub struct PipelineState {
    pub read_framebuffer: GlHandle,
    pub draw_framebuffer: GlHandle,
    pub shader_program: GlHandle,
    pub program_pipeline: GlHandle,
    pub clip_distances: [bool; NUM_CLIP_DISTANCES],
    pub fragment_color_clamp: bool,
    pub alpha_to_coverage: bool,
    pub alpha_to_one: bool,
    pub rasterizer_discard: bool,
    pub color_masks: [ColorMask; NUM_RENDER_TARGETS],
    pub viewports: [Viewport; NUM_VIEWPORTS],
    pub stencil_test: bool,
    pub stencil_front: StencilFaceState,
    pub stencil_back: StencilFaceState,
    pub independent_blend: bool,
    pub blend: [BlendTarget; NUM_RENDER_TARGETS],
    pub clip_origin: ClipOrigin,
    pub clip_depth_mode: ClipDepthMode,
    pub renderbuffer: GlHandle,
    pub textures: [GlHandle; NUM_TEXTURE_UNITS],
    pub samplers: [GlHandle; NUM_SAMPLER_UNITS],
    pub images: [GlHandle; NUM_IMAGE_UNITS],
}

impl Default for PipelineState {
    fn default() -> Self {
        Self {
            read_framebuffer: UNBOUND,
            draw_framebuffer: UNBOUND,
            shader_program: UNBOUND,
            program_pipeline: UNBOUND,
            clip_distances: [false; NUM_CLIP_DISTANCES],
            fragment_color_clamp: false,
            alpha_to_coverage: false,
            alpha_to_one: false,
            rasterizer_discard: false,
            color_masks: [ColorMask::all(); NUM_RENDER_TARGETS],
            viewports: [Viewport::default(); NUM_VIEWPORTS],
            stencil_test: false,
            stencil_front: StencilFaceState::default(),
            stencil_back: StencilFaceState::default(),
            independent_blend: false,
            blend: [BlendTarget::default(); NUM_RENDER_TARGETS],
            clip_origin: ClipOrigin::LowerLeft,
            clip_depth_mode: ClipDepthMode::NegativeOneToOne,
            renderbuffer: UNBOUND,
            textures: [UNBOUND; NUM_TEXTURE_UNITS],
            samplers: [UNBOUND; NUM_SAMPLER_UNITS],
            images: [UNBOUND; NUM_IMAGE_UNITS],
        }
    }
}

/// Write `desired` into `applied` and report whether it changed.
fn update<T: Copy + PartialEq>(applied: &mut T, desired: T) -> bool {
    if *applied == desired {
        return false;
    }
    *applied = desired;
    true
}

/// Inclusive index range of the slots where the two arrays differ.
fn differing_range<T: PartialEq>(applied: &[T], desired: &[T]) -> Option<(usize, usize)> {
    let mut range = None;
    for (index, (a, d)) in applied.iter().zip(desired).enumerate() {
        if a != d {
            let (first, _) = range.unwrap_or((index, index));
            range = Some((first, index));
        }
    }
    range
}

impl PipelineState {
    /// Diff against `applied` and emit the driver calls that differ.
    ///
    /// Allocation-free. Category order is fixed; within a category only
    /// changed slots produce calls, and an identical second `apply` produces
    /// none. On return `applied` equals `self`.
    pub fn apply<G: GlDriver>(&self, applied: &mut PipelineState, gl: &mut G) {
        self.apply_framebuffers(applied, gl);
        self.apply_shader_program(applied, gl);
        self.apply_program_pipeline(applied, gl);
        self.apply_clip_distances(applied, gl);
        self.apply_fragment_color_clamp(applied, gl);
        self.apply_multisample(applied, gl);
        self.apply_rasterizer_discard(applied, gl);
        self.apply_color_masks(applied, gl);
        self.apply_viewports(applied, gl);
        self.apply_stencil_test(applied, gl);
        self.apply_blending(applied, gl);
        self.apply_textures(applied, gl);
        self.apply_samplers(applied, gl);
        self.apply_images(applied, gl);
        self.apply_clip_control(applied, gl);
        self.apply_renderbuffer(applied, gl);
    }

    fn apply_framebuffers<G: GlDriver>(&self, applied: &mut PipelineState, gl: &mut G) {
        if update(&mut applied.read_framebuffer, self.read_framebuffer) {
            gl.bind_read_framebuffer(self.read_framebuffer);
        }
        if update(&mut applied.draw_framebuffer, self.draw_framebuffer) {
            gl.bind_draw_framebuffer(self.draw_framebuffer);
        }
    }

    fn apply_shader_program<G: GlDriver>(&self, applied: &mut PipelineState, gl: &mut G) {
        if update(&mut applied.shader_program, self.shader_program) {
            gl.bind_shader_program(self.shader_program);
        }
    }

    fn apply_program_pipeline<G: GlDriver>(&self, applied: &mut PipelineState, gl: &mut G) {
        if update(&mut applied.program_pipeline, self.program_pipeline) {
            gl.bind_program_pipeline(self.program_pipeline);
        }
    }

    fn apply_clip_distances<G: GlDriver>(&self, applied: &mut PipelineState, gl: &mut G) {
        for index in 0..NUM_CLIP_DISTANCES {
            if update(&mut applied.clip_distances[index], self.clip_distances[index]) {
                gl.set_clip_distance(index as u32, self.clip_distances[index]);
            }
        }
    }

    fn apply_fragment_color_clamp<G: GlDriver>(&self, applied: &mut PipelineState, gl: &mut G) {
        if update(&mut applied.fragment_color_clamp, self.fragment_color_clamp) {
            gl.set_fragment_color_clamp(self.fragment_color_clamp);
        }
    }

    fn apply_multisample<G: GlDriver>(&self, applied: &mut PipelineState, gl: &mut G) {
        if update(&mut applied.alpha_to_coverage, self.alpha_to_coverage) {
            gl.set_alpha_to_coverage(self.alpha_to_coverage);
        }
        if update(&mut applied.alpha_to_one, self.alpha_to_one) {
            gl.set_alpha_to_one(self.alpha_to_one);
        }
    }

    fn apply_rasterizer_discard<G: GlDriver>(&self, applied: &mut PipelineState, gl: &mut G) {
        if update(&mut applied.rasterizer_discard, self.rasterizer_discard) {
            gl.set_rasterizer_discard(self.rasterizer_discard);
        }
    }

    fn apply_color_masks<G: GlDriver>(&self, applied: &mut PipelineState, gl: &mut G) {
        for target in 0..NUM_RENDER_TARGETS {
            if update(&mut applied.color_masks[target], self.color_masks[target]) {
                gl.set_color_mask(target as u32, self.color_masks[target]);
            }
        }
    }

    fn apply_viewports<G: GlDriver>(&self, applied: &mut PipelineState, gl: &mut G) {
        for index in 0..NUM_VIEWPORTS {
            let desired = &self.viewports[index];
            let current = &mut applied.viewports[index];
            let slot = index as u32;
            if update(&mut current.rect, desired.rect) {
                gl.set_viewport_rect(slot, desired.rect);
            }
            let depth_changed = update(&mut current.depth_range_near, desired.depth_range_near);
            if update(&mut current.depth_range_far, desired.depth_range_far) || depth_changed {
                gl.set_depth_range(slot, desired.depth_range_near, desired.depth_range_far);
            }
            if update(&mut current.scissor_enabled, desired.scissor_enabled) {
                gl.set_scissor_test(slot, desired.scissor_enabled);
            }
            if update(&mut current.scissor_rect, desired.scissor_rect) {
                gl.set_scissor_rect(slot, desired.scissor_rect);
            }
        }
    }

    fn apply_stencil_test<G: GlDriver>(&self, applied: &mut PipelineState, gl: &mut G) {
        if update(&mut applied.stencil_test, self.stencil_test) {
            gl.set_stencil_test(self.stencil_test);
        }
        apply_stencil_face(gl, StencilFace::Front, &self.stencil_front, &mut applied.stencil_front);
        apply_stencil_face(gl, StencilFace::Back, &self.stencil_back, &mut applied.stencil_back);
    }

    fn apply_blending<G: GlDriver>(&self, applied: &mut PipelineState, gl: &mut G) {
        let mode_changed = update(&mut applied.independent_blend, self.independent_blend);
        if self.independent_blend {
            for target in 0..NUM_RENDER_TARGETS {
                self.apply_target_blending(applied, gl, target, mode_changed);
            }
        } else {
            self.apply_global_blending(applied, gl, mode_changed);
        }
    }

    /// Indexed-call path for one target. `force` re-emits every call even
    /// when the cached values match, which is required right after the
    /// independent flag flips: the global calls that were in effect before
    /// wrote all targets at once, so the per-target cache entries no longer
    /// describe what the driver has.
    fn apply_target_blending<G: GlDriver>(
        &self,
        applied: &mut PipelineState,
        gl: &mut G,
        target: usize,
        force: bool,
    ) {
        let desired = &self.blend[target];
        let current = &mut applied.blend[target];
        let slot = target as u32;
        if update(&mut current.enabled, desired.enabled) || force {
            gl.set_blend_enabled_indexed(slot, desired.enabled);
        }
        let funcs_changed = update(&mut current.src_rgb, desired.src_rgb)
            | update(&mut current.dst_rgb, desired.dst_rgb)
            | update(&mut current.src_alpha, desired.src_alpha)
            | update(&mut current.dst_alpha, desired.dst_alpha);
        if funcs_changed || force {
            gl.set_blend_func_indexed(
                slot,
                desired.src_rgb,
                desired.dst_rgb,
                desired.src_alpha,
                desired.dst_alpha,
            );
        }
        let equations_changed = update(&mut current.equation_rgb, desired.equation_rgb)
            | update(&mut current.equation_alpha, desired.equation_alpha);
        if equations_changed || force {
            gl.set_blend_equation_indexed(slot, desired.equation_rgb, desired.equation_alpha);
        }
    }

    fn apply_global_blending<G: GlDriver>(
        &self,
        applied: &mut PipelineState,
        gl: &mut G,
        force: bool,
    ) {
        let desired = &self.blend[0];
        let current = &mut applied.blend[0];
        if update(&mut current.enabled, desired.enabled) || force {
            gl.set_blend_enabled(desired.enabled);
        }
        let funcs_changed = update(&mut current.src_rgb, desired.src_rgb)
            | update(&mut current.dst_rgb, desired.dst_rgb)
            | update(&mut current.src_alpha, desired.src_alpha)
            | update(&mut current.dst_alpha, desired.dst_alpha);
        if funcs_changed || force {
            gl.set_blend_func(
                desired.src_rgb,
                desired.dst_rgb,
                desired.src_alpha,
                desired.dst_alpha,
            );
        }
        let equations_changed = update(&mut current.equation_rgb, desired.equation_rgb)
            | update(&mut current.equation_alpha, desired.equation_alpha);
        if equations_changed || force {
            gl.set_blend_equation(desired.equation_rgb, desired.equation_alpha);
        }
    }

    fn apply_textures<G: GlDriver>(&self, applied: &mut PipelineState, gl: &mut G) {
        for unit in 0..NUM_TEXTURE_UNITS {
            if update(&mut applied.textures[unit], self.textures[unit]) {
                // The per-unit bind cannot express a null texture. The cache
                // still records the null so the next real handle, even a
                // recycled name, diffs as a change and gets bound.
                if self.textures[unit] != UNBOUND {
                    gl.bind_texture_unit(unit as u32, self.textures[unit]);
                }
            }
        }
    }

    fn apply_samplers<G: GlDriver>(&self, applied: &mut PipelineState, gl: &mut G) {
        for unit in 0..NUM_SAMPLER_UNITS {
            if update(&mut applied.samplers[unit], self.samplers[unit]) {
                gl.bind_sampler(unit as u32, self.samplers[unit]);
            }
        }
    }

    fn apply_images<G: GlDriver>(&self, applied: &mut PipelineState, gl: &mut G) {
        if let Some((first, last)) = differing_range(&applied.images, &self.images) {
            applied.images[first..=last].copy_from_slice(&self.images[first..=last]);
            gl.bind_image_textures(first as u32, &self.images[first..=last]);
        }
    }

    fn apply_clip_control<G: GlDriver>(&self, applied: &mut PipelineState, gl: &mut G) {
        let origin_changed = update(&mut applied.clip_origin, self.clip_origin);
        if update(&mut applied.clip_depth_mode, self.clip_depth_mode) || origin_changed {
            gl.set_clip_control(self.clip_origin, self.clip_depth_mode);
        }
    }

    fn apply_renderbuffer<G: GlDriver>(&self, applied: &mut PipelineState, gl: &mut G) {
        if update(&mut applied.renderbuffer, self.renderbuffer) {
            gl.bind_renderbuffer(self.renderbuffer);
        }
    }

    /// Fold viewport slot 0 into its scissor so drivers that honor only the
    /// scissor box still clip to the viewport.
    ///
    /// With the scissor already enabled the box grows to cover both the
    /// scissor and the viewport rectangle, then clamps to non-negative
    /// origin and extent; otherwise the scissor becomes exactly the viewport
    /// rectangle. Either way the scissor test ends up enabled.
    pub fn emulate_viewport_with_scissor(&mut self) {
        let viewport = &mut self.viewports[0];
        if viewport.scissor_enabled {
            let rect = viewport.rect;
            let scissor = viewport.scissor_rect;
            let left = rect.x.max(scissor.x);
            let right = (rect.x + rect.width).max(scissor.x + scissor.width);
            let bottom = rect.y.max(scissor.y);
            let top = (rect.y + rect.height).max(scissor.y + scissor.height);
            viewport.scissor_rect = Rect {
                x: left.max(0),
                y: bottom.max(0),
                width: (right - left).max(0),
                height: (top - bottom).max(0),
            };
        } else {
            viewport.scissor_enabled = true;
            viewport.scissor_rect = viewport.rect;
        }
    }

    /// Reset every viewport slot to its default record.
    pub fn set_default_viewports(&mut self) -> &mut Self {
        self.viewports = [Viewport::default(); NUM_VIEWPORTS];
        self
    }

    /// Scrub `texture` from every texture unit it is bound to. Call before
    /// deleting the texture so a recycled name cannot alias the stale entry.
    pub fn unbind_texture(&mut self, texture: GlHandle) -> &mut Self {
        for unit in self.textures.iter_mut() {
            if *unit == texture {
                *unit = UNBOUND;
            }
        }
        self
    }

    /// Scrub `sampler` from every sampler unit it is bound to.
    pub fn reset_sampler(&mut self, sampler: GlHandle) -> &mut Self {
        for unit in self.samplers.iter_mut() {
            if *unit == sampler {
                *unit = UNBOUND;
            }
        }
        self
    }

    /// Clear the program binding if it refers to `program`.
    pub fn reset_program(&mut self, program: GlHandle) -> &mut Self {
        if self.shader_program == program {
            self.shader_program = UNBOUND;
        }
        self
    }

    /// Clear the program-pipeline binding if it refers to `pipeline`.
    pub fn reset_pipeline(&mut self, pipeline: GlHandle) -> &mut Self {
        if self.program_pipeline == pipeline {
            self.program_pipeline = UNBOUND;
        }
        self
    }

    /// Clear both framebuffer bindings that refer to `framebuffer`.
    pub fn reset_framebuffer(&mut self, framebuffer: GlHandle) -> &mut Self {
        if self.read_framebuffer == framebuffer {
            self.read_framebuffer = UNBOUND;
        }
        if self.draw_framebuffer == framebuffer {
            self.draw_framebuffer = UNBOUND;
        }
        self
    }

    /// Clear the renderbuffer binding if it refers to `renderbuffer`.
    pub fn reset_renderbuffer(&mut self, renderbuffer: GlHandle) -> &mut Self {
        if self.renderbuffer == renderbuffer {
            self.renderbuffer = UNBOUND;
        }
        self
    }
}

fn apply_stencil_face<G: GlDriver>(
    gl: &mut G,
    face: StencilFace,
    desired: &StencilFaceState,
    current: &mut StencilFaceState,
) {
    let func_changed = update(&mut current.test_func, desired.test_func)
        | update(&mut current.test_ref, desired.test_ref)
        | update(&mut current.test_mask, desired.test_mask);
    if func_changed {
        gl.set_stencil_func(face, desired.test_func, desired.test_ref, desired.test_mask);
    }
    let ops_changed = update(&mut current.action_stencil_fail, desired.action_stencil_fail)
        | update(&mut current.action_depth_fail, desired.action_depth_fail)
        | update(&mut current.action_depth_pass, desired.action_depth_pass);
    if ops_changed {
        gl.set_stencil_op(
            face,
            desired.action_stencil_fail,
            desired.action_depth_fail,
            desired.action_depth_pass,
        );
    }
    if update(&mut current.write_mask, desired.write_mask) {
        gl.set_stencil_write_mask(face, desired.write_mask);
    }
}

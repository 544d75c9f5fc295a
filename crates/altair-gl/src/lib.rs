//! `altair-gl` contains the OpenGL-backend driver probe and pipeline state
//! tracker used by Altair.
//!
//! Currently this crate provides:
//! - One-shot capability and quirk probing of the host driver at context
//!   creation (see [`Device`]).
//! - Differential application of guest pipeline configurations, emitting
//!   only the driver calls whose state changed (see [`PipelineState`]).
//! - The trait seams the embedder's GL loader implements (see [`driver`]).

mod device;
mod state;

pub mod driver;
pub mod limits;

pub use device::{BaseBindings, Device, QuirkOverrides, RESERVED_UNIFORM_BLOCKS};
pub use driver::{
    BlendEquation, BlendFactor, ClipDepthMode, ClipOrigin, ColorMask, CompareFunc, GlDriver,
    GlHandle, GlProbe, ProbeError, Rect, ShaderStage, StageResources, StencilFace, StencilOp,
    UNBOUND,
};
pub use state::{BlendTarget, PipelineState, StencilFaceState, Viewport};

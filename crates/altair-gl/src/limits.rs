//! Fixed slot counts of the guest GPU's graphics pipeline.
//!
//! The state tracker mirrors the guest register file, so every bindable
//! array it carries has a fixed extent. These constants size those arrays;
//! the *host* driver's own limits are probed at runtime instead (see
//! [`crate::Device`]).

/// Number of color render targets addressable by a single draw.
pub const NUM_RENDER_TARGETS: usize = 8;

/// Number of independent viewport/scissor slots.
pub const NUM_VIEWPORTS: usize = 16;

/// Number of user clip distances.
pub const NUM_CLIP_DISTANCES: usize = 8;

/// Number of texture units bindable across the graphics pipeline.
pub const NUM_TEXTURE_UNITS: usize = 32;

/// Number of sampler units. Parallels the texture unit array one-to-one.
pub const NUM_SAMPLER_UNITS: usize = 32;

/// Number of image (formatted load/store) units.
pub const NUM_IMAGE_UNITS: usize = 8;

// Texture dimensions handed to the GPU must be multiples of this on every axis
pub const GPU_MULTIBYTE_DIVISIBILITY_VALUE: u64 = 4;

/// Voxel value meaning "no renderable here". Never a valid mask number.
pub const EMPTY_MASK: u32 = 0;

// Mask texture layout
pub const MASK_BYTES_PER_VOXEL: usize = 2;
pub const MAX_MASK_NUMBER: u32 = u16::MAX as u32;

// Channel texture layout
pub const CHANNEL_TEXTURE_BYTES_PER_CHANNEL: usize = 1;
/// Every channel of a renderable without a channel file reads as this value
pub const SUBSTITUTE_CHANNEL_VALUE: u8 = 127;

/// Number of slabs a volume is split into when the config does not say otherwise
pub const DEFAULT_NUM_SLABS: usize = 8;

/// Largest single slab we will allocate; matches the legacy single-array limit
pub const MAX_SLAB_BYTES: u64 = i32::MAX as u64;

/// Largest channel payload a single .chan file may carry
pub const MAX_CHANNEL_FILE_BYTES: u64 = i32::MAX as u64;

/// Largest padded axis length accepted from a mask header
pub const MAX_AXIAL_LENGTH: u64 = i32::MAX as u64;

// Render method codes, stored in the 4th byte of a color mapping entry
pub const NON_RENDERING: u8 = 0;
pub const FRAGMENT_RENDERING: u8 = 1;
pub const COMPARTMENT_RENDERING: u8 = 2;
pub const PASS_THROUGH_RENDERING: u8 = 3;

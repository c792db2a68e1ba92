use std::path::PathBuf;
use thiserror::Error;

use super::voxel::VolumeDims;
use super::worker_status::BuildStatus;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VolumeError {
    #[error("Offset {offset} is outside of the volume of length {length}")]
    OffsetOutOfRange { offset: u64, length: u64 },
    #[error("Voxel ({x}, {y}, {z}) is outside of the volume {dims}")]
    CoordinateOutOfRange {
        x: u64,
        y: u64,
        z: u64,
        dims: VolumeDims,
    },
    #[error("Supplied offset {supplied} does not match offset {computed} computed from coordinates")]
    OffsetMismatch { supplied: u64, computed: u64 },
    #[error("Invalid slab count {0}; at least one slab is required")]
    InvalidSlabCount(usize),
    #[error("Volume {0} has no voxels")]
    EmptyVolume(VolumeDims),
    #[error("Volume {0} is too large to address")]
    SizeOverflow(VolumeDims),
    #[error("Slab size of {slab_bytes} bytes exceeds the maximum of {max} bytes; use more slabs")]
    SlabTooLarge { slab_bytes: u64, max: u64 },
    #[error("Volume of {requested} bytes exceeds the configured capacity of {capacity} bytes")]
    ExceedsCapacity { requested: u64, capacity: u64 },
    #[error("Failed to allocate a slab of {0} bytes")]
    AllocationFailed(u64),
    #[error("Voxel write of {given} bytes does not match {expected} bytes per voxel")]
    VoxelWidthMismatch { given: usize, expected: usize },
}

impl VolumeError {
    /// Capacity errors abort a whole build; the rest are addressing errors.
    pub fn is_capacity(&self) -> bool {
        matches!(
            self,
            Self::InvalidSlabCount(_)
                | Self::EmptyVolume(_)
                | Self::SizeOverflow(_)
                | Self::SlabTooLarge { .. }
                | Self::ExceedsCapacity { .. }
                | Self::AllocationFailed(_)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TrackerError {
    #[error("MultiMaskTracker used before the first mask number was set")]
    FirstMaskNumUnset,
    #[error("Invalid first mask number {0}; composite ids must start above the empty mask")]
    InvalidFirstMaskNum(u32),
    #[error("First mask number cannot change once composite ids have been allocated")]
    FirstMaskNumLocked,
    #[error("Mask number 0 is reserved for empty voxels")]
    ReservedMaskNumber,
    #[error("Original mask number {mask} collides with the composite id space starting at {first}")]
    MaskCollidesWithComposite { mask: u32, first: u32 },
    #[error("Voxel holds composite id {0} which was never allocated")]
    UnknownComposite(u32),
    #[error("Composite id space exhausted at ceiling {ceiling}")]
    CompositeSpaceExhausted { ceiling: u32 },
}

#[derive(Debug, Error)]
pub enum MaskFormatError {
    #[error("Mask stream truncated or unreadable: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Mask header has a zero axial length: {0} x {1} x {2}")]
    ZeroDimension(i64, i64, i64),
    #[error("Mask header field {field} has negative value {value}")]
    NegativeValue { field: &'static str, value: i64 },
    #[error("Unknown ray axis {0} in mask header; expected 0, 1 or 2")]
    BadAxis(u8),
    #[error("Mask bounding box {lo}..{hi} is outside of axis {axis} with length {len}")]
    BadBounds {
        axis: char,
        lo: i64,
        hi: i64,
        len: u64,
    },
    #[error("Mask claims {total} voxels but the volume only holds {capacity}")]
    TooManyVoxels { total: u64, capacity: u64 },
    #[error("Padded axial length {0} exceeds the maximum supported length")]
    AxisTooLong(u64),
    #[error("Negative ray skip count {0}")]
    NegativeSkip(i64),
    #[error("Invalid pair count {0} for a ray")]
    BadPairCount(i64),
    #[error("Pair {start}..{end} is outside of a ray of length {ray_len}")]
    PairOutOfRay { start: i64, end: i64, ray_len: u64 },
    #[error("Pairs along ray {0} are not in increasing order")]
    PairsOutOfOrder(u64),
    #[error("Ray number {ray} is past the last ray {last}")]
    RayPastEnd { ray: u64, last: u64 },
    #[error("Mask stream produced {read} voxels but the header declares {total}")]
    VoxelOverrun { read: u64, total: u64 },
    #[error("Ray {0} carries no voxels")]
    EmptyRay(u64),
}

#[derive(Debug, Error)]
pub enum ChanFormatError {
    #[error("Channel stream truncated or unreadable: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Channel stream has {chan} voxels but its mask has {mask}")]
    VoxelCountMismatch { mask: u64, chan: i64 },
    #[error("Channel stream declares zero channels")]
    ZeroChannels,
    #[error("Channel stream declares zero bytes per channel")]
    ZeroByteCount,
    #[error("Channel data of {0} bytes exceeds the maximum single file payload")]
    ExcessiveSize(u64),
}

#[derive(Debug, Error)]
pub enum AcceptorError {
    #[error("Acceptor failed due to volume error: {0}")]
    Volume(#[from] VolumeError),
    #[error("Acceptor failed due to tracker error: {0}")]
    Tracker(#[from] TrackerError),
    #[error("Renderable space {found} does not match the board space {expected}")]
    SpaceMismatch {
        expected: VolumeDims,
        found: VolumeDims,
    },
    #[error("Acceptor received data before the space size was set")]
    NoSpaceSize,
    #[error("Acceptor does not take {0} data")]
    NotAccepted(&'static str),
    #[error("Channel layout exceeds the texture layout: {0}")]
    ChannelMetaMismatch(String),
    #[error("Mask number {0} does not fit in the mask texture")]
    MaskNumberTooLarge(u32),
}

#[derive(Debug, Error)]
pub enum LoaderError {
    #[error("Renderable {0} has no mask file")]
    NoMaskFile(String),
    #[error("Loader failed due to mask format error: {0}")]
    Mask(#[from] MaskFormatError),
    #[error("Loader failed due to channel format error: {0}")]
    Chan(#[from] ChanFormatError),
    #[error("Loader failed due to acceptor error: {0}")]
    Acceptor(#[from] AcceptorError),
}

impl LoaderError {
    /// Fatal errors abort the whole build; everything else only drops the renderable.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Acceptor(AcceptorError::Tracker(_)) => true,
            Self::Acceptor(AcceptorError::Volume(e)) => e.is_capacity(),
            _ => false,
        }
    }
}

#[derive(Debug, Error)]
pub enum ResolverError {
    #[error("Resolver failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Resolved file {0:?} does not exist")]
    MissingFile(PathBuf),
}

#[derive(Debug, Error)]
pub enum BoardError {
    #[error("Failed to load board as file {0:?} does not exist")]
    BadFilePath(PathBuf),
    #[error("Board failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Board failed to parse YAML: {0}")]
    ParsingError(#[from] serde_yaml::Error),
    #[error("Board item {item} has an invalid color string {color:?}")]
    BadColor { item: String, color: String },
    #[error("Board item {0} has an invalid mask number; mask numbers start at 1")]
    BadMaskNumber(String),
    #[error("No mask or channel file sets found on the board; nothing to display")]
    NoRenderableFiles,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration as file {0:?} does not exist")]
    BadFilePath(PathBuf),
    #[error("Config failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Config failed to parse YAML: {0}")]
    ParsingError(#[from] serde_yaml::Error),
    #[error("Config has an invalid setting: {0}")]
    InvalidSetting(String),
}

#[derive(Debug, Error)]
pub enum AssemblerError {
    #[error("Assembler failed due to volume error: {0}")]
    Volume(#[from] VolumeError),
    #[error("Assembler failed due to tracker error: {0}")]
    Tracker(#[from] TrackerError),
    #[error("Assembler aborted while loading {name}: {source}")]
    Fatal { name: String, source: LoaderError },
    #[error("Assembler found no loadable renderables")]
    NothingToBuild,
    #[error("Assembler build was cancelled")]
    Cancelled,
    #[error("Assembler failed due to Send error: {0}")]
    SendError(#[from] std::sync::mpsc::SendError<BuildStatus>),
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("Export failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Export failed to convert to yaml: {0}")]
    ParsingError(#[from] serde_yaml::Error),
    #[error("Export failed to format the build time: {0}")]
    TimeFormat(#[from] time::error::Format),
    #[error("Export failed due to volume error: {0}")]
    Volume(#[from] VolumeError),
    #[cfg(feature = "hdf5")]
    #[error("Export failed due to HDF5 error: {0}")]
    HDF5Error(#[from] hdf5::Error),
    #[cfg(feature = "hdf5")]
    #[error("Export failed to shape texture data: {0}")]
    ShapeError(#[from] ndarray::ShapeError),
}

#[derive(Debug, Error)]
pub enum ProcessorError {
    #[error("Processor failed due to Config error: {0}")]
    ConfigError(#[from] ConfigError),
    #[error("Processor failed due to Board error: {0}")]
    BoardError(#[from] BoardError),
    #[error("Processor failed due to Resolver error: {0}")]
    ResolverError(#[from] ResolverError),
    #[error("Processor failed due to Assembler error: {0}")]
    AssemblerError(#[from] AssemblerError),
    #[error("Processor failed due to Export error: {0}")]
    ExportError(#[from] ExportError),
    #[error("Processor failed due to Send error: {0}")]
    SendError(#[from] std::sync::mpsc::SendError<BuildStatus>),
    #[error("Processor failed due to IO error: {0}")]
    IoError(#[from] std::io::Error),
}

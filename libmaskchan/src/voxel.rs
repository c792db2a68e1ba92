use std::fmt::Display;

use super::error::VolumeError;

/// Extent of a volume in voxels along x, y and z.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct VolumeDims {
    pub x: u64,
    pub y: u64,
    pub z: u64,
}

impl Display for VolumeDims {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}x{}", self.x, self.y, self.z)
    }
}

impl VolumeDims {
    pub fn new(x: u64, y: u64, z: u64) -> Self {
        Self { x, y, z }
    }

    pub fn as_array(&self) -> [u64; 3] {
        [self.x, self.y, self.z]
    }

    pub fn from_array(dims: [u64; 3]) -> Self {
        Self::new(dims[0], dims[1], dims[2])
    }

    /// Number of voxels, or None if the product does not fit in a u64
    pub fn voxel_count(&self) -> Option<u64> {
        self.x.checked_mul(self.y)?.checked_mul(self.z)
    }

    pub fn contains(&self, x: u64, y: u64, z: u64) -> bool {
        x < self.x && y < self.y && z < self.z
    }

    /// Linear offset of a voxel: `z*(Y*X) + y*X + x`
    pub fn offset_of(&self, x: u64, y: u64, z: u64) -> Result<u64, VolumeError> {
        if !self.contains(x, y, z) {
            return Err(VolumeError::CoordinateOutOfRange {
                x,
                y,
                z,
                dims: *self,
            });
        }
        Ok(z * (self.y * self.x) + y * self.x + x)
    }

    /// Inverse of offset_of
    pub fn address_of(&self, offset: u64) -> Result<VoxelAddress, VolumeError> {
        let length = self.voxel_count().unwrap_or(u64::MAX);
        if offset >= length {
            return Err(VolumeError::OffsetOutOfRange { offset, length });
        }
        let slice = self.x * self.y;
        let z = offset / slice;
        let remainder = offset % slice;
        Ok(VoxelAddress {
            x: remainder % self.x,
            y: remainder / self.x,
            z,
            offset,
        })
    }

    /// Round every axis up to a multiple of `divisor`
    pub fn padded_to(&self, divisor: u64) -> Self {
        let pad = |len: u64| {
            if divisor <= 1 {
                return len;
            }
            let leftover = len % divisor;
            if leftover > 0 {
                len + (divisor - leftover)
            } else {
                len
            }
        };
        Self::new(pad(self.x), pad(self.y), pad(self.z))
    }
}

/// A voxel coordinate together with its linear offset inside some volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoxelAddress {
    pub x: u64,
    pub y: u64,
    pub z: u64,
    pub offset: u64,
}

impl VoxelAddress {
    /// Build an address, computing the offset from the coordinates
    pub fn new(dims: &VolumeDims, x: u64, y: u64, z: u64) -> Result<Self, VolumeError> {
        let offset = dims.offset_of(x, y, z)?;
        Ok(Self { x, y, z, offset })
    }

    /// Cross-check an offset supplied by a caller against the one we computed
    pub fn check_offset(&self, supplied: u64) -> Result<(), VolumeError> {
        if supplied != self.offset {
            return Err(VolumeError::OffsetMismatch {
                supplied,
                computed: self.offset,
            });
        }
        Ok(())
    }
}

/// True and GPU-padded extent of the space a renderable lives in.
///
/// `coord_coverage` is the fraction of each padded axis actually occupied by data, used to
/// crop texture coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpaceSize {
    pub dims: VolumeDims,
    pub padded: VolumeDims,
    pub coord_coverage: [f32; 3],
}

impl SpaceSize {
    pub fn new(dims: VolumeDims, axial_divisibility: u64) -> Self {
        let padded = dims.padded_to(axial_divisibility);
        let mut coord_coverage = [1.0_f32; 3];
        let true_lengths = dims.as_array();
        let padded_lengths = padded.as_array();
        for axis in 0..3 {
            if padded_lengths[axis] != true_lengths[axis] {
                coord_coverage[axis] = true_lengths[axis] as f32 / padded_lengths[axis] as f32;
                spdlog::debug!(
                    "Expanding edge by {} to {}.",
                    padded_lengths[axis] - true_lengths[axis],
                    padded_lengths[axis]
                );
            }
        }
        Self {
            dims,
            padded,
            coord_coverage,
        }
    }

    /// Validate a (padded-space) position against its coordinates
    pub fn check_coord_consistency(
        &self,
        position: u64,
        x: u64,
        y: u64,
        z: u64,
    ) -> Result<VoxelAddress, VolumeError> {
        let address = VoxelAddress::new(&self.padded, x, y, z)?;
        address.check_offset(position)?;
        Ok(address)
    }
}

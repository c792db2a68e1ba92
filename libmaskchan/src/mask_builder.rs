use super::acceptor::{Acceptable, MaskChanAcceptor};
use super::constants::{MASK_BYTES_PER_VOXEL, MAX_MASK_NUMBER};
use super::error::{AcceptorError, VolumeError};
use super::large_volume::LargeVolumeStore;
use super::multi_mask::MultiMaskTracker;
use super::voxel::SpaceSize;

/// Check that a volume fits under an optional byte ceiling before allocating it
pub fn check_capacity(
    space: &SpaceSize,
    bytes_per_voxel: usize,
    max_volume_bytes: Option<u64>,
) -> Result<u64, VolumeError> {
    let requested = space
        .padded
        .voxel_count()
        .and_then(|count| count.checked_mul(bytes_per_voxel as u64))
        .ok_or(VolumeError::SizeOverflow(space.padded))?;
    match max_volume_bytes {
        Some(capacity) if requested > capacity => Err(VolumeError::ExceedsCapacity {
            requested,
            capacity,
        }),
        _ => Ok(requested),
    }
}

/// MaskVolumeBuilder paints mask numbers into the 16-bit mask texture.
///
/// It owns both the tracker and the volume, so every voxel update resolves the collision and
/// writes the result as one step.
#[derive(Debug)]
pub struct MaskVolumeBuilder {
    volume: LargeVolumeStore,
    tracker: MultiMaskTracker,
    space: SpaceSize,
    voxels_written: u64,
}

impl MaskVolumeBuilder {
    pub fn new(
        space: SpaceSize,
        tracker: MultiMaskTracker,
        slab_count: usize,
        max_volume_bytes: Option<u64>,
    ) -> Result<Self, VolumeError> {
        let bytes = check_capacity(&space, MASK_BYTES_PER_VOXEL, max_volume_bytes)?;
        spdlog::info!(
            "Allocating mask volume {} ({})",
            space.padded,
            human_bytes::human_bytes(bytes as f64)
        );
        let volume = LargeVolumeStore::new(space.padded, MASK_BYTES_PER_VOXEL, slab_count)?;
        Ok(Self {
            volume,
            tracker,
            space,
            voxels_written: 0,
        })
    }

    pub fn tracker(&self) -> &MultiMaskTracker {
        &self.tracker
    }

    pub fn volume(&self) -> &LargeVolumeStore {
        &self.volume
    }

    pub fn space(&self) -> &SpaceSize {
        &self.space
    }

    pub fn voxels_written(&self) -> u64 {
        self.voxels_written
    }

    pub fn into_parts(self) -> (LargeVolumeStore, MultiMaskTracker) {
        (self.volume, self.tracker)
    }
}

impl MaskChanAcceptor for MaskVolumeBuilder {
    fn acceptable_inputs(&self) -> Acceptable {
        Acceptable::Mask
    }

    fn set_space_size(&mut self, space: &SpaceSize) -> Result<(), AcceptorError> {
        if space.padded != self.space.padded {
            return Err(AcceptorError::SpaceMismatch {
                expected: self.space.padded,
                found: space.padded,
            });
        }
        Ok(())
    }

    fn add_mask_data(
        &mut self,
        mask_number: u32,
        position: u64,
        x: u64,
        y: u64,
        z: u64,
    ) -> Result<(), AcceptorError> {
        self.space.check_coord_consistency(position, x, y, z)?;
        if mask_number > MAX_MASK_NUMBER {
            return Err(AcceptorError::MaskNumberTooLarge(mask_number));
        }
        let existing = self.volume.read_u16(position)? as u32;
        let resolved = self.tracker.get_mask(mask_number, existing)?;
        if resolved > MAX_MASK_NUMBER {
            return Err(AcceptorError::MaskNumberTooLarge(resolved));
        }
        if resolved != existing {
            self.volume.write_u16(position, resolved as u16)?;
        }
        self.voxels_written += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::voxel::VolumeDims;

    fn builder() -> MaskVolumeBuilder {
        let mut tracker = MultiMaskTracker::new();
        tracker.set_first_mask_num(10).unwrap();
        MaskVolumeBuilder::new(SpaceSize::new(VolumeDims::new(4, 4, 4), 4), tracker, 3, None)
            .unwrap()
    }

    #[test]
    fn test_overlaps_become_composites() {
        let mut builder = builder();
        builder.add_mask_data(1, 5, 1, 1, 0).unwrap();
        builder.add_mask_data(1, 6, 2, 1, 0).unwrap();
        builder.add_mask_data(2, 6, 2, 1, 0).unwrap();
        builder.add_mask_data(2, 6, 2, 1, 0).unwrap();
        builder.add_mask_data(3, 6, 2, 1, 0).unwrap();
        assert_eq!(builder.volume().read_u16(5).unwrap(), 1);
        assert_eq!(builder.volume().read_u16(6).unwrap(), 10);
        let bean = builder.tracker().get_bean(10).unwrap();
        assert_eq!(bean.alt_masks(), &[1, 2, 3]);
        assert_eq!(bean.primary_mask(), 1);
        assert_eq!(builder.voxels_written(), 5);
    }

    #[test]
    fn test_inconsistent_position_rejected() {
        let mut builder = builder();
        assert!(matches!(
            builder.add_mask_data(1, 4, 1, 1, 0),
            Err(AcceptorError::Volume(VolumeError::OffsetMismatch { .. }))
        ));
        assert!(builder
            .set_space_size(&SpaceSize::new(VolumeDims::new(9, 4, 4), 4))
            .is_err());
        assert!(builder
            .set_space_size(&SpaceSize::new(VolumeDims::new(3, 4, 4), 4))
            .is_ok());
    }

    #[test]
    fn test_capacity_checked_before_allocation() {
        let space = SpaceSize::new(VolumeDims::new(8, 8, 8), 4);
        assert_eq!(check_capacity(&space, 2, None).unwrap(), 1024);
        let result = MaskVolumeBuilder::new(space, MultiMaskTracker::new(), 1, Some(1000));
        assert!(matches!(
            result,
            Err(VolumeError::ExceedsCapacity {
                requested: 1024,
                capacity: 1000
            })
        ));
    }
}

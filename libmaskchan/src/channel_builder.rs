use bitvec::vec::BitVec;

use super::acceptor::{Acceptable, MaskChanAcceptor};
use super::channel_meta::ChannelMetaData;
use super::error::{AcceptorError, VolumeError};
use super::large_volume::LargeVolumeStore;
use super::mask_builder::check_capacity;
use super::multi_mask::MultiMaskTracker;
use super::voxel::SpaceSize;

/// Who owns a voxel of the channel texture
#[derive(Debug)]
enum Ownership<'a> {
    /// A voxel belongs to the renderable whose mask (or composite primary) is painted there
    Masked {
        mask: &'a LargeVolumeStore,
        tracker: &'a MultiMaskTracker,
    },
    /// Without a mask volume the first renderable to write a voxel keeps it
    FirstIn(BitVec),
}

/// ChannelVolumeBuilder writes intensities into the interleaved channel texture.
#[derive(Debug)]
pub struct ChannelVolumeBuilder<'a> {
    volume: LargeVolumeStore,
    space: SpaceSize,
    texture_meta: ChannelMetaData,
    ownership: Ownership<'a>,
    intensity_divisor: u32,
    scratch: Vec<u8>,
    voxels_written: u64,
}

impl<'a> ChannelVolumeBuilder<'a> {
    /// `mask` is the finished mask pass, if there was one
    pub fn new(
        space: SpaceSize,
        texture_meta: ChannelMetaData,
        slab_count: usize,
        max_volume_bytes: Option<u64>,
        background: Option<&[u8]>,
        mask: Option<(&'a LargeVolumeStore, &'a MultiMaskTracker)>,
    ) -> Result<Self, VolumeError> {
        let width = texture_meta.record_width();
        let bytes = check_capacity(&space, width, max_volume_bytes)?;
        spdlog::info!(
            "Allocating {} channel volume {} ({})",
            texture_meta.channel_count,
            space.padded,
            human_bytes::human_bytes(bytes as f64)
        );
        let preset = background.map(|color| texture_meta.preset_voxel(color));
        let volume =
            LargeVolumeStore::with_preset(space.padded, width, slab_count, preset.as_deref())?;

        let ownership = match mask {
            Some((mask, tracker)) => Ownership::Masked { mask, tracker },
            None => Ownership::FirstIn(BitVec::repeat(false, (bytes / width as u64) as usize)),
        };

        Ok(Self {
            volume,
            space,
            texture_meta,
            ownership,
            intensity_divisor: 1,
            scratch: vec![0u8; width],
            voxels_written: 0,
        })
    }

    pub fn set_intensity_divisor(&mut self, divisor: u32) {
        self.intensity_divisor = divisor.max(1);
    }

    pub fn texture_meta(&self) -> &ChannelMetaData {
        &self.texture_meta
    }

    pub fn voxels_written(&self) -> u64 {
        self.voxels_written
    }

    pub fn into_volume(self) -> LargeVolumeStore {
        self.volume
    }

    fn owns(&mut self, original_mask_num: u32, position: u64) -> Result<bool, AcceptorError> {
        match &mut self.ownership {
            Ownership::Masked { mask, tracker } => {
                let painted = mask.read_u16(position)? as u32;
                if painted == original_mask_num {
                    return Ok(true);
                }
                Ok(tracker
                    .get_bean(painted)
                    .is_some_and(|bean| bean.primary_mask() == original_mask_num))
            }
            Ownership::FirstIn(written) => {
                let index = position as usize;
                if index >= written.len() {
                    return Err(AcceptorError::Volume(VolumeError::OffsetOutOfRange {
                        offset: position,
                        length: written.len() as u64,
                    }));
                }
                Ok(!written.replace(index, true))
            }
        }
    }
}

impl MaskChanAcceptor for ChannelVolumeBuilder<'_> {
    fn acceptable_inputs(&self) -> Acceptable {
        Acceptable::Channel
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

    fn set_channel_meta_data(&mut self, meta: &ChannelMetaData) -> Result<(), AcceptorError> {
        meta.check_fits(&self.texture_meta)
    }

    fn add_channel_data(
        &mut self,
        original_mask_num: u32,
        channel_bytes: &[u8],
        position: u64,
        x: u64,
        y: u64,
        z: u64,
        meta: &ChannelMetaData,
    ) -> Result<(), AcceptorError> {
        self.space.check_coord_consistency(position, x, y, z)?;
        if !self.owns(original_mask_num, position)? {
            return Ok(());
        }
        self.volume.read_voxel(position, &mut self.scratch)?;
        meta.interpret_record(
            channel_bytes,
            &self.texture_meta,
            self.intensity_divisor,
            &mut self.scratch,
        )?;
        self.volume.write_voxel(position, &self.scratch)?;
        self.voxels_written += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::MASK_BYTES_PER_VOXEL;
    use crate::voxel::VolumeDims;

    fn space() -> SpaceSize {
        SpaceSize::new(VolumeDims::new(4, 4, 4), 4)
    }

    #[test]
    fn test_first_writer_wins_without_mask() {
        let texture = ChannelMetaData::for_texture(1);
        let mut builder = ChannelVolumeBuilder::new(space(), texture, 2, None, None, None).unwrap();
        let meta = ChannelMetaData::new(1, 1, 0, 0, 0);
        builder.add_channel_data(1, &[40], 21, 1, 1, 1, &meta).unwrap();
        builder.add_channel_data(2, &[90], 21, 1, 1, 1, &meta).unwrap();
        let volume = builder.into_volume();
        assert_eq!(volume.get_value_at(21).unwrap(), 40);
    }

    #[test]
    fn test_composite_primary_owns_channels() {
        let mut tracker = MultiMaskTracker::new();
        tracker.set_first_mask_num(10).unwrap();
        let mut mask = LargeVolumeStore::new(space().padded, MASK_BYTES_PER_VOXEL, 1).unwrap();
        let composite = tracker.get_mask(2, 1).unwrap();
        mask.write_u16(0, composite as u16).unwrap();
        mask.write_u16(1, 2).unwrap();

        let texture = ChannelMetaData::for_texture(3);
        let mut builder = ChannelVolumeBuilder::new(
            space(),
            texture,
            4,
            None,
            Some(&[5u8, 5, 5][..]),
            Some((&mask, &tracker)),
        )
        .unwrap();
        let meta = ChannelMetaData::new(3, 1, 0, 1, 2);
        builder.add_channel_data(2, &[7, 8, 9], 0, 0, 0, 0, &meta).unwrap();
        builder.add_channel_data(1, &[1, 2, 3], 0, 0, 0, 0, &meta).unwrap();
        builder.add_channel_data(2, &[7, 8, 9], 1, 1, 0, 0, &meta).unwrap();
        builder.add_channel_data(3, &[4, 4, 4], 2, 2, 0, 0, &meta).unwrap();
        assert_eq!(builder.voxels_written(), 2);

        let volume = builder.into_volume();
        let mut voxel = [0u8; 4];
        volume.read_voxel(0, &mut voxel).unwrap();
        assert_eq!(voxel, [1, 2, 3, 255]);
        volume.read_voxel(1, &mut voxel).unwrap();
        assert_eq!(voxel, [7, 8, 9, 255]);
        // unowned voxels keep the background
        volume.read_voxel(2, &mut voxel).unwrap();
        assert_eq!(voxel, [5, 5, 5, 255]);
    }

    #[test]
    fn test_wider_stream_rejected() {
        let texture = ChannelMetaData::for_texture(1);
        let mut builder = ChannelVolumeBuilder::new(space(), texture, 1, None, None, None).unwrap();
        assert!(builder
            .set_channel_meta_data(&ChannelMetaData::new(3, 1, 0, 1, 2))
            .is_err());
        assert!(builder
            .set_channel_meta_data(&ChannelMetaData::new(1, 2, 0, 0, 0))
            .is_ok());
    }
}

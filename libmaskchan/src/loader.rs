use std::io::Read;

use super::acceptor::MaskChanAcceptor;
use super::chan_file::ChanFile;
use super::channel_meta::ChannelMetaData;
use super::constants::{GPU_MULTIBYTE_DIVISIBILITY_VALUE, SUBSTITUTE_CHANNEL_VALUE};
use super::error::LoaderError;
use super::mask_file::{MaskHeader, MaskRayReader};
use super::renderable::RenderableBean;
use super::voxel::SpaceSize;

/// What one read of a mask/chan pair produced
#[derive(Debug, Clone, PartialEq)]
pub struct LoadSummary {
    pub space: SpaceSize,
    pub voxels_read: u64,
    pub voxels_accepted: u64,
    /// Layout the voxels were read with, the substitute one when there was no channel file
    pub channel_meta: ChannelMetaData,
    /// Mean of each raw channel normalized to [0, 1]; None when there was no channel file
    pub channel_averages: Option<Vec<f64>>,
}

/// MaskChanLoader decodes the mask/chan pair of one renderable and hands every voxel to a set
/// of acceptors.
///
/// The loader holds no state between reads. A failed read leaves whatever the acceptors had
/// already received in place, so the caller must discard the renderable.
#[derive(Debug, Clone)]
pub struct MaskChanLoader<'a> {
    bean: &'a RenderableBean,
    axial_divisibility: u64,
    segment: Option<(u64, u64)>,
}

impl<'a> MaskChanLoader<'a> {
    pub fn new(bean: &'a RenderableBean) -> Self {
        Self {
            bean,
            axial_divisibility: GPU_MULTIBYTE_DIVISIBILITY_VALUE,
            segment: None,
        }
    }

    pub fn set_axial_length_divisibility(&mut self, divisibility: u64) {
        self.axial_divisibility = divisibility.max(1);
    }

    /// Only pass on voxels inside segment `segment` of `num_segments` equal 1-D segments of the
    /// padded volume. The last segment runs to the end of the volume.
    pub fn set_applicable_segment(&mut self, segment: u64, num_segments: u64) {
        if num_segments == 0 || segment >= num_segments {
            spdlog::warn!(
                "Ignoring invalid segment {} of {} for {}",
                segment,
                num_segments,
                self.bean.name
            );
            self.segment = None;
        } else {
            self.segment = Some((segment, num_segments));
        }
    }

    /// Voxel count declared by a mask header
    pub fn voxel_count<R: Read>(mask: &mut R) -> Result<u64, LoaderError> {
        Ok(MaskHeader::read(mask)?.total_voxels)
    }

    fn segment_range(&self, padded_length: u64) -> Option<(u64, u64)> {
        self.segment.map(|(segment, num_segments)| {
            let size = padded_length / num_segments;
            let start = size * segment;
            let end = if segment + 1 == num_segments {
                padded_length
            } else {
                start + size
            };
            (start, end)
        })
    }

    pub fn read<M: Read, C: Read>(
        &self,
        mask: M,
        chan: Option<C>,
        acceptors: &mut [&mut dyn MaskChanAcceptor],
    ) -> Result<LoadSummary, LoaderError> {
        let mut rays = MaskRayReader::new(mask)?;
        let header = rays.header().clone();
        let space = SpaceSize::new(header.dims, self.axial_divisibility);
        header.check_padded(&space.padded)?;
        spdlog::debug!(
            "Reading {} voxels of {} in {} (padded {})",
            header.total_voxels,
            self.bean.name,
            header.dims,
            space.padded
        );

        for acceptor in acceptors.iter_mut() {
            acceptor.set_space_size(&space)?;
        }

        let chan_file = match chan {
            Some(mut reader) => Some(ChanFile::read(&mut reader, header.total_voxels)?),
            None => None,
        };
        let meta = match chan_file.as_ref() {
            Some(file) => file.meta,
            None => ChannelMetaData::substitute(),
        };
        let takes_channel = acceptors
            .iter()
            .any(|acceptor| acceptor.acceptable_inputs().takes_channel());
        if takes_channel {
            for acceptor in acceptors.iter_mut() {
                if acceptor.acceptable_inputs().takes_channel() {
                    acceptor.set_channel_meta_data(&meta)?;
                }
            }
        }

        let mut record = match chan_file.as_ref() {
            Some(file) => vec![0u8; file.meta.raw_record_width()],
            None => vec![SUBSTITUTE_CHANNEL_VALUE; meta.record_width()],
        };
        let mut sums = vec![0f64; meta.raw_channel_count as usize];
        let value_scale = 256f64.powi(meta.byte_count as i32);

        let padded = space.padded;
        let slice = padded.x * padded.y;
        let range = self.segment_range(slice * padded.z);
        let translated = self.bean.translated_num;
        let axis = header.axis;
        let mut voxel_index = 0u64;
        let mut accepted = 0u64;

        while let Some(ray) = rays.next_ray()? {
            let mut coords = axis.ray_start(ray.ray_number, &header.dims);
            for (start, end) in ray.pairs {
                for along in start..end {
                    coords[axis.index()] = along;
                    let [x, mut y, z] = coords;
                    if self.bean.inverted_y {
                        y = header.dims.y - y - 1;
                    }
                    let position = z * slice + y * padded.x + x;

                    if let Some(file) = chan_file.as_ref() {
                        file.record(voxel_index, &mut record);
                        for (channel, sum) in sums.iter_mut().enumerate() {
                            *sum += file.value(channel, voxel_index) as f64 / value_scale;
                        }
                    }

                    let in_range = range.map_or(true, |(lo, hi)| position >= lo && position < hi);
                    if in_range {
                        for acceptor in acceptors.iter_mut() {
                            let inputs = acceptor.acceptable_inputs();
                            if inputs.takes_mask() {
                                acceptor.add_mask_data(translated, position, x, y, z)?;
                            }
                            if inputs.takes_channel() {
                                acceptor
                                    .add_channel_data(translated, &record, position, x, y, z, &meta)?;
                            }
                        }
                        accepted += 1;
                    }
                    voxel_index += 1;
                }
            }
        }

        for acceptor in acceptors.iter_mut() {
            acceptor.end_data()?;
        }

        let channel_averages = chan_file.map(|_| {
            sums.iter()
                .map(|sum| {
                    if voxel_index == 0 {
                        0.0
                    } else {
                        sum / voxel_index as f64
                    }
                })
                .collect::<Vec<f64>>()
        });
        if let Some(averages) = channel_averages.as_ref() {
            spdlog::debug!("Channel averages for {}: {:?}", self.bean.name, averages);
        }

        Ok(LoadSummary {
            space,
            voxels_read: voxel_index,
            voxels_accepted: accepted,
            channel_meta: meta,
            channel_averages,
        })
    }
}

use byteorder::{LittleEndian, WriteBytesExt};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use super::chan_file::ChanFile;
use super::channel_meta::ChannelMetaData;
use super::error::{ChanFormatError, VolumeError};
use super::mask_file::{MaskHeader, RayAxis};
use super::voxel::VolumeDims;

/// MaskChanWriter encodes a set of voxels (and optionally their channel values) as a legacy
/// .mask/.chan pair.
///
/// Voxels are kept in mask stream order, that is by ray number and then by position along
/// the ray. Adding the same voxel twice replaces its channel values.
#[derive(Debug, Clone)]
pub struct MaskChanWriter {
    dims: VolumeDims,
    axis: RayAxis,
    microns: [f32; 3],
    voxels: BTreeMap<(u64, u64), Vec<u64>>,
}

impl MaskChanWriter {
    pub fn new(dims: VolumeDims, axis: RayAxis) -> Self {
        Self {
            dims,
            axis,
            microns: [1.0; 3],
            voxels: BTreeMap::new(),
        }
    }

    pub fn set_microns(&mut self, microns: [f32; 3]) {
        self.microns = microns;
    }

    pub fn add_voxel(&mut self, x: u64, y: u64, z: u64) -> Result<(), VolumeError> {
        self.add_voxel_with_channels(x, y, z, &[])
    }

    pub fn add_voxel_with_channels(
        &mut self,
        x: u64,
        y: u64,
        z: u64,
        values: &[u64],
    ) -> Result<(), VolumeError> {
        self.dims.offset_of(x, y, z)?;
        let ray = self.axis.ray_number([x, y, z], &self.dims);
        let along = [x, y, z][self.axis.index()];
        self.voxels.insert((ray, along), values.to_vec());
        Ok(())
    }

    pub fn voxel_count(&self) -> u64 {
        self.voxels.len() as u64
    }

    /// Voxel coordinates in mask stream order
    pub fn ordered_voxels(&self) -> Vec<[u64; 3]> {
        self.voxels
            .keys()
            .map(|(ray, along)| {
                let mut coords = self.axis.ray_start(*ray, &self.dims);
                coords[self.axis.index()] = *along;
                coords
            })
            .collect()
    }

    pub fn header(&self) -> MaskHeader {
        let mut bounds = [[0u64; 2]; 3];
        let coords = self.ordered_voxels();
        if !coords.is_empty() {
            for (axis, bound) in bounds.iter_mut().enumerate() {
                let lo = coords.iter().map(|c| c[axis]).min().unwrap_or(0);
                let hi = coords.iter().map(|c| c[axis]).max().unwrap_or(0);
                *bound = [lo, hi + 1];
            }
        }
        MaskHeader {
            dims: self.dims,
            microns: self.microns,
            bounds,
            total_voxels: self.voxel_count(),
            axis: self.axis,
        }
    }

    pub fn write_mask<W: Write>(&self, writer: &mut W) -> Result<(), std::io::Error> {
        self.header().write(writer)?;

        // Group the sorted voxels into rays, and each ray into half-open runs
        let mut rays: Vec<(u64, Vec<(u64, u64)>)> = Vec::new();
        for (ray, along) in self.voxels.keys() {
            match rays.last_mut() {
                Some((last_ray, pairs)) if last_ray == ray => match pairs.last_mut() {
                    Some((_, end)) if end == along => *end += 1,
                    _ => pairs.push((*along, along + 1)),
                },
                _ => rays.push((*ray, vec![(*along, along + 1)])),
            }
        }

        let mut next_ray = 0u64;
        for (ray, pairs) in rays {
            writer.write_i64::<LittleEndian>((ray - next_ray) as i64)?;
            writer.write_i64::<LittleEndian>(pairs.len() as i64)?;
            for (start, end) in pairs {
                writer.write_i64::<LittleEndian>(start as i64)?;
                writer.write_i64::<LittleEndian>(end as i64)?;
            }
            next_ray = ray + 1;
        }
        Ok(())
    }

    /// Channel planes in mask stream order. Missing values are written as 0.
    pub fn chan_file(&self, meta: ChannelMetaData) -> Result<ChanFile, ChanFormatError> {
        let width = meta.byte_count as usize;
        let mut planes = vec![Vec::with_capacity(self.voxels.len() * width); meta.raw_channel_count as usize];
        for values in self.voxels.values() {
            for (channel, plane) in planes.iter_mut().enumerate() {
                let value = values.get(channel).copied().unwrap_or(0);
                plane.extend(value.to_le_bytes().iter().take(width));
                // wider than 8 bytes only pads with zeros
                plane.extend(std::iter::repeat(0u8).take(width.saturating_sub(8)));
            }
        }
        ChanFile::from_planes(meta, self.voxel_count(), planes)
    }

    pub fn write_chan<W: Write>(
        &self,
        writer: &mut W,
        meta: ChannelMetaData,
    ) -> Result<(), ChanFormatError> {
        self.chan_file(meta)?.write(writer)?;
        Ok(())
    }

    /// Write the mask file, and the channel file when a layout is given
    pub fn write_files(
        &self,
        mask_path: &Path,
        chan: Option<(&Path, ChannelMetaData)>,
    ) -> Result<(), ChanFormatError> {
        let mut mask_writer = BufWriter::new(File::create(mask_path)?);
        self.write_mask(&mut mask_writer)?;
        mask_writer.flush()?;
        if let Some((chan_path, meta)) = chan {
            let mut chan_writer = BufWriter::new(File::create(chan_path)?);
            self.write_chan(&mut chan_writer, meta)?;
            chan_writer.flush()?;
        }
        spdlog::debug!(
            "Wrote {} voxels to {}",
            self.voxel_count(),
            mask_path.to_string_lossy()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mask_file::MaskRayReader;
    use std::io::Cursor;

    fn le(values: &[i64]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    #[test]
    fn test_byte_exact_mask() {
        let mut writer = MaskChanWriter::new(VolumeDims::new(4, 2, 2), RayAxis::X);
        // ray = y*sz + z; voxels on rays 1 and 3
        writer.add_voxel(0, 0, 1).unwrap();
        writer.add_voxel(1, 0, 1).unwrap();
        writer.add_voxel(3, 0, 1).unwrap();
        writer.add_voxel(2, 1, 1).unwrap();
        writer.add_voxel(1, 0, 1).unwrap();

        let mut bytes = Vec::new();
        writer.write_mask(&mut bytes).unwrap();

        let mut expected = le(&[4, 2, 2]);
        expected.extend([1.0f32, 1.0, 1.0].iter().flat_map(|f| f.to_le_bytes()));
        expected.extend(le(&[0, 4, 0, 2, 1, 2]));
        expected.extend(le(&[4]));
        expected.push(0);
        // ray 1: skip 1, runs [0,2) and [3,4)
        expected.extend(le(&[1, 2, 0, 2, 3, 4]));
        // ray 3: skip 1 (ray 2 is empty), run [2,3)
        expected.extend(le(&[1, 1, 2, 3]));
        assert_eq!(bytes, expected);
    }

    #[test]
    fn test_reader_agrees_with_writer() {
        let dims = VolumeDims::new(5, 4, 3);
        for axis in [RayAxis::X, RayAxis::Y, RayAxis::Z] {
            let mut writer = MaskChanWriter::new(dims, axis);
            for (x, y, z) in [(0, 0, 0), (4, 3, 2), (2, 1, 0), (3, 1, 0), (2, 2, 2)] {
                writer.add_voxel(x, y, z).unwrap();
            }
            let mut bytes = Vec::new();
            writer.write_mask(&mut bytes).unwrap();

            let mut reader = MaskRayReader::new(Cursor::new(bytes)).unwrap();
            let mut decoded = Vec::new();
            while let Some(ray) = reader.next_ray().unwrap() {
                for (start, end) in ray.pairs {
                    for along in start..end {
                        let mut coords = axis.ray_start(ray.ray_number, &dims);
                        coords[axis.index()] = along;
                        decoded.push(coords);
                    }
                }
            }
            assert_eq!(decoded, writer.ordered_voxels());
            assert_eq!(decoded.len(), 5);
        }
    }

    #[test]
    fn test_channel_planes_follow_mask_order() {
        let mut writer = MaskChanWriter::new(VolumeDims::new(3, 3, 1), RayAxis::X);
        writer.add_voxel_with_channels(2, 1, 0, &[300, 7]).unwrap();
        writer.add_voxel_with_channels(0, 0, 0, &[1, 2]).unwrap();
        let chan = writer
            .chan_file(ChannelMetaData::new(2, 2, 0, 1, 1))
            .unwrap();
        assert_eq!(chan.planes()[0], vec![1, 0, 0x2c, 0x01]);
        assert_eq!(chan.planes()[1], vec![2, 0, 7, 0]);
        assert!(writer.add_voxel(3, 0, 0).is_err());
    }
}

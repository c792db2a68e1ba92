use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

use super::channel_meta::ChannelMetaData;
use super::constants::MAX_CHANNEL_FILE_BYTES;
use super::error::ChanFormatError;

/// The contents of a .chan file: one plane of values per channel, each plane in mask stream
/// voxel order.
#[derive(Debug, Clone, PartialEq)]
pub struct ChanFile {
    pub meta: ChannelMetaData,
    pub total_voxels: u64,
    planes: Vec<Vec<u8>>,
}

impl ChanFile {
    /// Read only the header: the voxel count and channel layout
    pub fn read_header<R: Read>(reader: &mut R) -> Result<(u64, ChannelMetaData), ChanFormatError> {
        let total_voxels = reader.read_i64::<LittleEndian>()?;
        let raw_channel_count = reader.read_u8()?;
        let red = reader.read_u8()?;
        let blue = reader.read_u8()?;
        let green = reader.read_u8()?;
        let byte_count = reader.read_u8()?;
        if raw_channel_count == 0 {
            return Err(ChanFormatError::ZeroChannels);
        }
        if byte_count == 0 {
            return Err(ChanFormatError::ZeroByteCount);
        }
        if total_voxels < 0 {
            return Err(ChanFormatError::VoxelCountMismatch {
                mask: 0,
                chan: total_voxels,
            });
        }
        Ok((
            total_voxels as u64,
            ChannelMetaData::new(raw_channel_count, byte_count, red, green, blue),
        ))
    }

    /// Read a whole channel stream belonging to a mask of `expected_voxels` voxels
    pub fn read<R: Read>(reader: &mut R, expected_voxels: u64) -> Result<Self, ChanFormatError> {
        let (total_voxels, meta) = Self::read_header(reader)?;
        if total_voxels != expected_voxels {
            return Err(ChanFormatError::VoxelCountMismatch {
                mask: expected_voxels,
                chan: total_voxels as i64,
            });
        }

        let plane_bytes = total_voxels
            .checked_mul(meta.byte_count as u64)
            .ok_or(ChanFormatError::ExcessiveSize(u64::MAX))?;
        if plane_bytes > MAX_CHANNEL_FILE_BYTES {
            return Err(ChanFormatError::ExcessiveSize(plane_bytes));
        }

        let mut planes = Vec::with_capacity(meta.raw_channel_count as usize);
        for _ in 0..meta.raw_channel_count {
            let mut plane = vec![0u8; plane_bytes as usize];
            reader.read_exact(&mut plane)?;
            planes.push(plane);
        }

        Ok(Self {
            meta,
            total_voxels,
            planes,
        })
    }

    /// Build a channel file from per-channel planes (used when writing fixtures and exports)
    pub fn from_planes(
        meta: ChannelMetaData,
        total_voxels: u64,
        planes: Vec<Vec<u8>>,
    ) -> Result<Self, ChanFormatError> {
        if meta.raw_channel_count == 0 || planes.len() != meta.raw_channel_count as usize {
            return Err(ChanFormatError::ZeroChannels);
        }
        if meta.byte_count == 0 {
            return Err(ChanFormatError::ZeroByteCount);
        }
        let plane_bytes = total_voxels * meta.byte_count as u64;
        if let Some(bad) = planes.iter().find(|plane| plane.len() as u64 != plane_bytes) {
            return Err(ChanFormatError::VoxelCountMismatch {
                mask: total_voxels,
                chan: (bad.len() / meta.byte_count as usize) as i64,
            });
        }
        Ok(Self {
            meta,
            total_voxels,
            planes,
        })
    }

    pub fn write<W: Write>(&self, writer: &mut W) -> Result<(), std::io::Error> {
        writer.write_i64::<LittleEndian>(self.total_voxels as i64)?;
        writer.write_u8(self.meta.raw_channel_count)?;
        writer.write_u8(self.meta.red_channel_index)?;
        writer.write_u8(self.meta.blue_channel_index)?;
        writer.write_u8(self.meta.green_channel_index)?;
        writer.write_u8(self.meta.byte_count)?;
        for plane in self.planes.iter() {
            writer.write_all(plane)?;
        }
        Ok(())
    }

    pub fn planes(&self) -> &[Vec<u8>] {
        &self.planes
    }

    /// Concatenate one voxel's bytes from every plane, in channel order
    pub fn record(&self, voxel_index: u64, out: &mut [u8]) {
        let width = self.meta.byte_count as usize;
        let start = voxel_index as usize * width;
        for (channel, plane) in self.planes.iter().enumerate() {
            out[channel * width..(channel + 1) * width]
                .copy_from_slice(&plane[start..start + width]);
        }
    }

    /// Little-endian value of one channel at one voxel
    pub fn value(&self, channel: usize, voxel_index: u64) -> u64 {
        let width = self.meta.byte_count as usize;
        let start = voxel_index as usize * width;
        self.planes[channel][start..start + width]
            .iter()
            .enumerate()
            .take(8)
            .fold(0u64, |value, (shift, byte)| {
                value | ((*byte as u64) << (8 * shift))
            })
    }
}

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

use super::constants::MAX_AXIAL_LENGTH;
use super::error::MaskFormatError;
use super::voxel::VolumeDims;

/// The axis walked by every ray of a mask file.
///
/// Rays are numbered over the two remaining axes, second-fastest varying first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RayAxis {
    X,
    Y,
    Z,
}

impl TryFrom<u8> for RayAxis {
    type Error = MaskFormatError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::X),
            1 => Ok(Self::Y),
            2 => Ok(Self::Z),
            _ => Err(MaskFormatError::BadAxis(value)),
        }
    }
}

impl RayAxis {
    pub fn as_byte(&self) -> u8 {
        match self {
            Self::X => 0,
            Self::Y => 1,
            Self::Z => 2,
        }
    }

    /// Index of the walked coordinate in an (x, y, z) triple
    pub fn index(&self) -> usize {
        self.as_byte() as usize
    }

    /// (walked, second-fastest, slowest) axis indexes
    fn axis_order(&self) -> [usize; 3] {
        match self {
            Self::X => [0, 2, 1],
            Self::Y => [1, 2, 0],
            Self::Z => [2, 1, 0],
        }
    }

    pub fn ray_length(&self, dims: &VolumeDims) -> u64 {
        dims.as_array()[self.axis_order()[0]]
    }

    pub fn ray_count(&self, dims: &VolumeDims) -> u64 {
        let lengths = dims.as_array();
        let [_, second, slowest] = self.axis_order();
        lengths[second] * lengths[slowest]
    }

    /// Coordinates of the first voxel of a ray; the walked coordinate is 0
    pub fn ray_start(&self, ray_number: u64, dims: &VolumeDims) -> [u64; 3] {
        let lengths = dims.as_array();
        let [_, second, slowest] = self.axis_order();
        let mut coords = [0u64; 3];
        coords[second] = ray_number % lengths[second];
        coords[slowest] = ray_number / lengths[second];
        coords
    }

    /// Inverse of ray_start, ignoring the walked coordinate
    pub fn ray_number(&self, coords: [u64; 3], dims: &VolumeDims) -> u64 {
        let lengths = dims.as_array();
        let [_, second, slowest] = self.axis_order();
        coords[slowest] * lengths[second] + coords[second]
    }
}

/// Fixed header at the start of every .mask file
#[derive(Debug, Clone, PartialEq)]
pub struct MaskHeader {
    pub dims: VolumeDims,
    pub microns: [f32; 3],
    /// Per axis (start inclusive, end exclusive)
    pub bounds: [[u64; 2]; 3],
    pub total_voxels: u64,
    pub axis: RayAxis,
}

fn non_negative(field: &'static str, value: i64) -> Result<u64, MaskFormatError> {
    if value < 0 {
        Err(MaskFormatError::NegativeValue { field, value })
    } else {
        Ok(value as u64)
    }
}

impl MaskHeader {
    pub fn read<R: Read>(reader: &mut R) -> Result<Self, MaskFormatError> {
        let sx = reader.read_i64::<LittleEndian>()?;
        let sy = reader.read_i64::<LittleEndian>()?;
        let sz = reader.read_i64::<LittleEndian>()?;
        if sx == 0 || sy == 0 || sz == 0 {
            return Err(MaskFormatError::ZeroDimension(sx, sy, sz));
        }
        let dims = VolumeDims::new(
            non_negative("sx", sx)?,
            non_negative("sy", sy)?,
            non_negative("sz", sz)?,
        );
        for length in dims.as_array() {
            if length > MAX_AXIAL_LENGTH {
                return Err(MaskFormatError::AxisTooLong(length));
            }
        }

        let mut microns = [0.0f32; 3];
        for micron in microns.iter_mut() {
            *micron = reader.read_f32::<LittleEndian>()?;
        }

        let lengths = dims.as_array();
        let mut bounds = [[0u64; 2]; 3];
        for (axis, name) in ['x', 'y', 'z'].into_iter().enumerate() {
            let lo = reader.read_i64::<LittleEndian>()?;
            let hi = reader.read_i64::<LittleEndian>()?;
            if lo < 0 || hi < lo || hi as u64 > lengths[axis] {
                return Err(MaskFormatError::BadBounds {
                    axis: name,
                    lo,
                    hi,
                    len: lengths[axis],
                });
            }
            bounds[axis] = [lo as u64, hi as u64];
        }

        let total_voxels = non_negative("total_voxels", reader.read_i64::<LittleEndian>()?)?;
        let capacity = dims.voxel_count().unwrap_or(u64::MAX);
        if total_voxels > capacity {
            return Err(MaskFormatError::TooManyVoxels {
                total: total_voxels,
                capacity,
            });
        }
        let axis = RayAxis::try_from(reader.read_u8()?)?;

        Ok(Self {
            dims,
            microns,
            bounds,
            total_voxels,
            axis,
        })
    }

    pub fn write<W: Write>(&self, writer: &mut W) -> Result<(), std::io::Error> {
        for length in self.dims.as_array() {
            writer.write_i64::<LittleEndian>(length as i64)?;
        }
        for micron in self.microns {
            writer.write_f32::<LittleEndian>(micron)?;
        }
        for [lo, hi] in self.bounds {
            writer.write_i64::<LittleEndian>(lo as i64)?;
            writer.write_i64::<LittleEndian>(hi as i64)?;
        }
        writer.write_i64::<LittleEndian>(self.total_voxels as i64)?;
        writer.write_u8(self.axis.as_byte())?;
        Ok(())
    }

    /// Padded dimensions must stay addressable by the GPU texture path
    pub fn check_padded(&self, padded: &VolumeDims) -> Result<(), MaskFormatError> {
        for length in padded.as_array() {
            if length > MAX_AXIAL_LENGTH {
                return Err(MaskFormatError::AxisTooLong(length));
            }
        }
        Ok(())
    }
}

/// One decoded ray: its number and the half-open runs set along it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaskRay {
    pub ray_number: u64,
    pub pairs: Vec<(u64, u64)>,
}

impl MaskRay {
    pub fn voxel_count(&self) -> u64 {
        self.pairs.iter().map(|(start, end)| end - start).sum()
    }
}

/// Streams the rays of a mask body after its header has been read.
///
/// Stops once the header's total voxel count has been produced; anything after that is not
/// read.
#[derive(Debug)]
pub struct MaskRayReader<R: Read> {
    reader: R,
    header: MaskHeader,
    next_ray: u64,
    voxels_read: u64,
}

impl<R: Read> MaskRayReader<R> {
    pub fn new(mut reader: R) -> Result<Self, MaskFormatError> {
        let header = MaskHeader::read(&mut reader)?;
        Ok(Self {
            reader,
            header,
            next_ray: 0,
            voxels_read: 0,
        })
    }

    pub fn header(&self) -> &MaskHeader {
        &self.header
    }

    pub fn voxels_read(&self) -> u64 {
        self.voxels_read
    }

    pub fn next_ray(&mut self) -> Result<Option<MaskRay>, MaskFormatError> {
        if self.voxels_read >= self.header.total_voxels {
            return Ok(None);
        }
        let dims = self.header.dims;
        let ray_len = self.header.axis.ray_length(&dims);
        let last_ray = self.header.axis.ray_count(&dims) - 1;

        let skip = self.reader.read_i64::<LittleEndian>()?;
        if skip < 0 {
            return Err(MaskFormatError::NegativeSkip(skip));
        }
        let ray_number = self.next_ray.saturating_add(skip as u64);
        if ray_number > last_ray {
            return Err(MaskFormatError::RayPastEnd {
                ray: ray_number,
                last: last_ray,
            });
        }

        let pair_count = self.reader.read_i64::<LittleEndian>()?;
        if pair_count < 0 || pair_count as u64 > ray_len {
            return Err(MaskFormatError::BadPairCount(pair_count));
        }
        if pair_count == 0 {
            return Err(MaskFormatError::EmptyRay(ray_number));
        }

        let mut pairs = Vec::with_capacity(pair_count as usize);
        let mut previous_end = 0u64;
        for _ in 0..pair_count {
            let start = self.reader.read_i64::<LittleEndian>()?;
            let end = self.reader.read_i64::<LittleEndian>()?;
            if start < 0 || end < start || end as u64 > ray_len {
                return Err(MaskFormatError::PairOutOfRay {
                    start,
                    end,
                    ray_len,
                });
            }
            if (start as u64) < previous_end {
                return Err(MaskFormatError::PairsOutOfOrder(ray_number));
            }
            previous_end = end as u64;
            pairs.push((start as u64, end as u64));
        }

        let ray = MaskRay { ray_number, pairs };
        let count = ray.voxel_count();
        if count == 0 {
            return Err(MaskFormatError::EmptyRay(ray_number));
        }
        if self.voxels_read + count > self.header.total_voxels {
            return Err(MaskFormatError::VoxelOverrun {
                read: self.voxels_read + count,
                total: self.header.total_voxels,
            });
        }
        self.voxels_read += count;
        self.next_ray = ray_number + 1;
        Ok(Some(ray))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn header(axis: RayAxis, total_voxels: u64) -> MaskHeader {
        MaskHeader {
            dims: VolumeDims::new(4, 3, 2),
            microns: [0.5, 0.5, 1.0],
            bounds: [[0, 4], [0, 3], [0, 2]],
            total_voxels,
            axis,
        }
    }

    fn body(rays: &[(i64, Vec<(i64, i64)>)]) -> Vec<u8> {
        let mut bytes = Vec::new();
        for (skip, pairs) in rays {
            bytes.write_i64::<LittleEndian>(*skip).unwrap();
            bytes.write_i64::<LittleEndian>(pairs.len() as i64).unwrap();
            for (start, end) in pairs.iter() {
                bytes.write_i64::<LittleEndian>(*start).unwrap();
                bytes.write_i64::<LittleEndian>(*end).unwrap();
            }
        }
        bytes
    }

    fn stream(header: &MaskHeader, rays: &[(i64, Vec<(i64, i64)>)]) -> Cursor<Vec<u8>> {
        let mut bytes = Vec::new();
        header.write(&mut bytes).unwrap();
        bytes.extend(body(rays));
        Cursor::new(bytes)
    }

    #[test]
    fn test_header_layout() {
        let mut bytes = Vec::new();
        header(RayAxis::Z, 7).write(&mut bytes).unwrap();
        // 3 dims, 3 floats, 6 bounds, total, axis byte
        assert_eq!(bytes.len(), 3 * 8 + 3 * 4 + 6 * 8 + 8 + 1);
        assert_eq!(&bytes[0..8], &4i64.to_le_bytes());
        assert_eq!(*bytes.last().unwrap(), 2);
        let parsed = MaskHeader::read(&mut Cursor::new(bytes)).unwrap();
        assert_eq!(parsed, header(RayAxis::Z, 7));
    }

    #[test]
    fn test_ray_geometry() {
        let dims = VolumeDims::new(4, 3, 2);
        assert_eq!(RayAxis::X.ray_length(&dims), 4);
        assert_eq!(RayAxis::X.ray_count(&dims), 6);
        // axis X: ray = y*sz + z
        assert_eq!(RayAxis::X.ray_start(3, &dims), [0, 1, 1]);
        // axis Y: ray = x*sz + z
        assert_eq!(RayAxis::Y.ray_start(5, &dims), [2, 0, 1]);
        // axis Z: ray = x*sy + y
        assert_eq!(RayAxis::Z.ray_start(5, &dims), [1, 2, 0]);
        for axis in [RayAxis::X, RayAxis::Y, RayAxis::Z] {
            for ray in 0..axis.ray_count(&dims) {
                assert_eq!(axis.ray_number(axis.ray_start(ray, &dims), &dims), ray);
            }
        }
    }

    #[test]
    fn test_ray_skipping() {
        let mut reader = MaskRayReader::new(stream(
            &header(RayAxis::X, 5),
            &[(1, vec![(0, 2)]), (0, vec![(1, 2), (3, 4)]), (2, vec![(0, 1)])],
        ))
        .unwrap();
        assert_eq!(reader.next_ray().unwrap().unwrap().ray_number, 1);
        let second = reader.next_ray().unwrap().unwrap();
        assert_eq!(second.ray_number, 2);
        assert_eq!(second.pairs, vec![(1, 2), (3, 4)]);
        assert_eq!(reader.next_ray().unwrap().unwrap().ray_number, 5);
        assert!(reader.next_ray().unwrap().is_none());
        assert_eq!(reader.voxels_read(), 5);
    }

    #[test]
    fn test_format_errors() {
        let cases: Vec<(Vec<(i64, Vec<(i64, i64)>)>, u64)> = vec![
            (vec![(-1, vec![(0, 1)])], 1),
            (vec![(6, vec![(0, 1)])], 1),
            (vec![(0, vec![(0, 5)])], 5),
            (vec![(0, vec![(2, 3), (0, 1)])], 2),
            (vec![(0, vec![(0, 3)])], 2),
            (vec![(0, vec![])], 1),
        ];
        for (rays, total) in cases {
            let mut reader = MaskRayReader::new(stream(&header(RayAxis::X, total), &rays)).unwrap();
            assert!(reader.next_ray().is_err());
        }

        // truncated body
        let mut reader = MaskRayReader::new(stream(&header(RayAxis::X, 3), &[(0, vec![(0, 2)])])).unwrap();
        reader.next_ray().unwrap();
        assert!(matches!(
            reader.next_ray(),
            Err(MaskFormatError::IOError(_))
        ));
    }

    #[test]
    fn test_bad_headers() {
        let mut bad_axis = Vec::new();
        header(RayAxis::X, 1).write(&mut bad_axis).unwrap();
        *bad_axis.last_mut().unwrap() = 3;
        assert!(matches!(
            MaskHeader::read(&mut Cursor::new(bad_axis)),
            Err(MaskFormatError::BadAxis(3))
        ));

        let mut too_many = header(RayAxis::X, 25);
        let mut bytes = Vec::new();
        too_many.write(&mut bytes).unwrap();
        assert!(matches!(
            MaskHeader::read(&mut Cursor::new(bytes)),
            Err(MaskFormatError::TooManyVoxels { .. })
        ));

        too_many.total_voxels = 1;
        too_many.bounds[1] = [0, 4];
        let mut bytes = Vec::new();
        too_many.write(&mut bytes).unwrap();
        assert!(matches!(
            MaskHeader::read(&mut Cursor::new(bytes)),
            Err(MaskFormatError::BadBounds { axis: 'y', .. })
        ));

        let mut zero = Vec::new();
        header(RayAxis::X, 1).write(&mut zero).unwrap();
        zero[8..16].copy_from_slice(&0i64.to_le_bytes());
        assert!(matches!(
            MaskHeader::read(&mut Cursor::new(zero)),
            Err(MaskFormatError::ZeroDimension(4, 0, 2))
        ));
    }
}

use super::constants::MAX_SLAB_BYTES;
use super::error::VolumeError;
use super::voxel::VolumeDims;

/// LargeVolumeStore is byte-addressable storage for a volume which may be too large for a
/// single contiguous buffer.
///
/// The volume is split into `slab_count` equally sized slabs along its linear (z-major)
/// order. A global offset maps to `(offset / slab_capacity, offset % slab_capacity)`. The
/// layout is fixed at construction; a volume of different dimensions needs a new store.
/// The final slab may be partially unused, and `length()` only ever reports the logical
/// volume length.
#[derive(Debug, Clone)]
pub struct LargeVolumeStore {
    slabs: Vec<Vec<u8>>,
    slab_capacity: u64,
    length: u64,
    dims: VolumeDims,
    bytes_per_voxel: usize,
}

impl LargeVolumeStore {
    /// Create a zero filled store
    pub fn new(
        dims: VolumeDims,
        bytes_per_voxel: usize,
        slab_count: usize,
    ) -> Result<Self, VolumeError> {
        Self::with_preset(dims, bytes_per_voxel, slab_count, None)
    }

    /// Create a store where every voxel starts out as `preset` (one value per voxel byte)
    pub fn with_preset(
        dims: VolumeDims,
        bytes_per_voxel: usize,
        slab_count: usize,
        preset: Option<&[u8]>,
    ) -> Result<Self, VolumeError> {
        if slab_count == 0 {
            return Err(VolumeError::InvalidSlabCount(slab_count));
        }
        if bytes_per_voxel == 0 {
            return Err(VolumeError::EmptyVolume(dims));
        }
        let length = dims
            .voxel_count()
            .and_then(|count| count.checked_mul(bytes_per_voxel as u64))
            .ok_or(VolumeError::SizeOverflow(dims))?;
        if length == 0 {
            return Err(VolumeError::EmptyVolume(dims));
        }

        let slab_capacity = length.div_ceil(slab_count as u64);
        if slab_capacity > MAX_SLAB_BYTES {
            return Err(VolumeError::SlabTooLarge {
                slab_bytes: slab_capacity,
                max: MAX_SLAB_BYTES,
            });
        }

        let mut slabs = Vec::with_capacity(slab_count);
        for slab_index in 0..slab_count {
            let mut slab: Vec<u8> = Vec::new();
            slab.try_reserve_exact(slab_capacity as usize)
                .map_err(|_| VolumeError::AllocationFailed(slab_capacity))?;
            match preset {
                Some(pattern) if !pattern.is_empty() => {
                    let slab_start = slab_index as u64 * slab_capacity;
                    slab.extend((0..slab_capacity).map(|local| {
                        pattern[((slab_start + local) % bytes_per_voxel as u64) as usize
                            % pattern.len()]
                    }));
                }
                _ => slab.resize(slab_capacity as usize, 0),
            }
            slabs.push(slab);
        }

        spdlog::debug!(
            "Allocated volume {} as {} slabs of {}",
            dims,
            slab_count,
            human_bytes::human_bytes(slab_capacity as f64)
        );

        Ok(Self {
            slabs,
            slab_capacity,
            length,
            dims,
            bytes_per_voxel,
        })
    }

    /// Total logical length in bytes (X*Y*Z*bytes_per_voxel)
    pub fn length(&self) -> u64 {
        self.length
    }

    pub fn dims(&self) -> VolumeDims {
        self.dims
    }

    pub fn bytes_per_voxel(&self) -> usize {
        self.bytes_per_voxel
    }

    pub fn slab_count(&self) -> usize {
        self.slabs.len()
    }

    pub fn slab_capacity(&self) -> u64 {
        self.slab_capacity
    }

    /// Raw slabs, in order, for chunked upload. The tail of the last slab may lie past
    /// `length()`.
    pub fn slabs(&self) -> &[Vec<u8>] {
        &self.slabs
    }

    fn locate(&self, offset: u64) -> Result<(usize, usize), VolumeError> {
        let slab_index = offset / self.slab_capacity;
        if offset >= self.length || slab_index >= self.slabs.len() as u64 {
            return Err(VolumeError::OffsetOutOfRange {
                offset,
                length: self.length,
            });
        }
        Ok((slab_index as usize, (offset % self.slab_capacity) as usize))
    }

    pub fn get_value_at(&self, offset: u64) -> Result<u8, VolumeError> {
        let (slab, local) = self.locate(offset)?;
        Ok(self.slabs[slab][local])
    }

    pub fn set_value_at(&mut self, offset: u64, value: u8) -> Result<(), VolumeError> {
        let (slab, local) = self.locate(offset)?;
        self.slabs[slab][local] = value;
        Ok(())
    }

    /// Copy the bytes of one voxel (by voxel index, not byte offset) into `out`.
    /// A voxel may straddle two slabs.
    pub fn read_voxel(&self, voxel_index: u64, out: &mut [u8]) -> Result<(), VolumeError> {
        if out.len() != self.bytes_per_voxel {
            return Err(VolumeError::VoxelWidthMismatch {
                given: out.len(),
                expected: self.bytes_per_voxel,
            });
        }
        let start = self.voxel_start(voxel_index)?;
        for (i, byte) in out.iter_mut().enumerate() {
            *byte = self.get_value_at(start + i as u64)?;
        }
        Ok(())
    }

    pub fn write_voxel(&mut self, voxel_index: u64, bytes: &[u8]) -> Result<(), VolumeError> {
        if bytes.len() != self.bytes_per_voxel {
            return Err(VolumeError::VoxelWidthMismatch {
                given: bytes.len(),
                expected: self.bytes_per_voxel,
            });
        }
        let start = self.voxel_start(voxel_index)?;
        for (i, byte) in bytes.iter().enumerate() {
            self.set_value_at(start + i as u64, *byte)?;
        }
        Ok(())
    }

    /// Little-endian u16 voxel, for 2-byte mask volumes
    pub fn read_u16(&self, voxel_index: u64) -> Result<u16, VolumeError> {
        let mut bytes = [0u8; 2];
        self.read_voxel(voxel_index, &mut bytes)?;
        Ok(u16::from_le_bytes(bytes))
    }

    pub fn write_u16(&mut self, voxel_index: u64, value: u16) -> Result<(), VolumeError> {
        self.write_voxel(voxel_index, &value.to_le_bytes())
    }

    fn voxel_start(&self, voxel_index: u64) -> Result<u64, VolumeError> {
        voxel_index
            .checked_mul(self.bytes_per_voxel as u64)
            .filter(|start| *start < self.length)
            .ok_or(VolumeError::OffsetOutOfRange {
                offset: voxel_index.saturating_mul(self.bytes_per_voxel as u64),
                length: self.length,
            })
    }

    /// Copy the logical contents into one contiguous buffer
    pub fn to_contiguous(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(self.length as usize);
        let mut remaining = self.length as usize;
        for slab in self.slabs.iter() {
            let take = remaining.min(slab.len());
            data.extend_from_slice(&slab[..take]);
            remaining -= take;
        }
        data
    }

    /// Number of non-zero bytes in the logical volume
    pub fn count_non_zero(&self) -> u64 {
        let mut remaining = self.length as usize;
        let mut count = 0;
        for slab in self.slabs.iter() {
            let take = remaining.min(slab.len());
            count += slab[..take].iter().filter(|b| **b != 0).count() as u64;
            remaining -= take;
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source_bytes(length: usize) -> Vec<u8> {
        (0..length).map(|i| ((i * 37 + 11) % 251) as u8).collect()
    }

    #[test]
    fn test_slab_partition_invariance() {
        let dims = VolumeDims::new(5, 5, 5);
        let source = source_bytes(250);
        let mut single = LargeVolumeStore::new(dims, 2, 1).unwrap();
        let mut split = LargeVolumeStore::new(dims, 2, 5).unwrap();
        assert_eq!(single.length(), 250);
        assert_eq!(split.length(), 250);
        assert_eq!(split.slab_capacity(), 50);

        for (offset, value) in source.iter().enumerate() {
            single.set_value_at(offset as u64, *value).unwrap();
            split.set_value_at(offset as u64, *value).unwrap();
        }
        for (offset, value) in source.iter().enumerate() {
            assert_eq!(single.get_value_at(offset as u64).unwrap(), *value);
            assert_eq!(split.get_value_at(offset as u64).unwrap(), *value);
        }
        assert_eq!(single.to_contiguous(), source);
        assert_eq!(split.to_contiguous(), source);
    }

    #[test]
    fn test_uneven_slabs() {
        let dims = VolumeDims::new(5, 5, 5);
        let mut store = LargeVolumeStore::new(dims, 2, 3).unwrap();
        assert_eq!(store.slab_capacity(), 84);
        assert_eq!(store.length(), 250);
        store.set_value_at(249, 9).unwrap();
        assert_eq!(store.get_value_at(249).unwrap(), 9);
        // Inside the last slab's spare capacity, but past the logical end
        assert_eq!(
            store.get_value_at(250),
            Err(VolumeError::OffsetOutOfRange {
                offset: 250,
                length: 250
            })
        );
        assert!(store.set_value_at(251, 1).is_err());
        assert_eq!(store.to_contiguous().len(), 250);
    }

    #[test]
    fn test_voxel_straddles_slab_boundary() {
        // 3 voxels of 3 bytes over 2 slabs of 5 bytes: voxel 1 spans both
        let dims = VolumeDims::new(3, 1, 1);
        let mut store = LargeVolumeStore::new(dims, 3, 2).unwrap();
        assert_eq!(store.slab_capacity(), 5);
        store.write_voxel(1, &[7, 8, 9]).unwrap();
        let mut out = [0u8; 3];
        store.read_voxel(1, &mut out).unwrap();
        assert_eq!(out, [7, 8, 9]);
        assert_eq!(store.slabs()[0][3..5], [7, 8]);
        assert_eq!(store.slabs()[1][0], 9);
        assert!(store.write_voxel(3, &[1, 2, 3]).is_err());
        assert!(store.write_voxel(0, &[1, 2]).is_err());
    }

    #[test]
    fn test_u16_voxels() {
        let mut store = LargeVolumeStore::new(VolumeDims::new(4, 4, 4), 2, 3).unwrap();
        for voxel in 0..64 {
            store.write_u16(voxel, (voxel * 1000) as u16).unwrap();
        }
        for voxel in 0..64 {
            assert_eq!(store.read_u16(voxel).unwrap(), (voxel * 1000) as u16);
        }
        assert!(store.read_u16(64).is_err());
    }

    #[test]
    fn test_bad_slab_counts_fail_fast() {
        let dims = VolumeDims::new(5, 5, 5);
        assert_eq!(
            LargeVolumeStore::new(dims, 2, 0).unwrap_err(),
            VolumeError::InvalidSlabCount(0)
        );
        assert!(LargeVolumeStore::new(VolumeDims::new(0, 5, 5), 2, 1).is_err());
        assert!(matches!(
            LargeVolumeStore::new(VolumeDims::new(u64::MAX, 2, 2), 1, 1),
            Err(VolumeError::SizeOverflow(_))
        ));
        // 2048^3 is 8 GiB: too big for one slab, so fail before allocating
        assert!(matches!(
            LargeVolumeStore::new(VolumeDims::new(2048, 2048, 2048), 1, 1),
            Err(VolumeError::SlabTooLarge { .. })
        ));
    }

    #[test]
    fn test_preset_fill() {
        let preset = [10u8, 20, 30, 255];
        let store =
            LargeVolumeStore::with_preset(VolumeDims::new(3, 3, 1), 4, 5, Some(&preset)).unwrap();
        let mut out = [0u8; 4];
        for voxel in 0..9 {
            store.read_voxel(voxel, &mut out).unwrap();
            assert_eq!(out, preset);
        }
        assert_eq!(store.count_non_zero(), 36);
    }
}

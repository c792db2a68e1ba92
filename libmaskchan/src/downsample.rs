use fxhash::FxHashMap;

use super::constants::EMPTY_MASK;
use super::error::VolumeError;
use super::large_volume::LargeVolumeStore;
use super::voxel::{SpaceSize, VolumeDims};

/// Rate actually applied to a space: at least 1 and at most the longest true axis, beyond
/// which every rate collapses the volume to a single voxel.
pub fn effective_rate(space: &SpaceSize, rate: u64) -> u64 {
    let longest = space.dims.as_array().into_iter().max().unwrap_or(1).max(1);
    rate.clamp(1, longest)
}

/// Shrunk space for a downsample rate. True dims are divided rounding up, then re-padded.
pub fn downsampled_space(space: &SpaceSize, rate: u64, axial_divisibility: u64) -> SpaceSize {
    let rate = effective_rate(space, rate);
    let dims = space.dims.as_array().map(|len| len.div_ceil(rate));
    SpaceSize::new(VolumeDims::from_array(dims), axial_divisibility)
}

/// Visit every output voxel with the source voxels of its block
fn for_each_block<F>(
    source: &SpaceSize,
    target: &SpaceSize,
    rate: u64,
    mut visit: F,
) -> Result<(), VolumeError>
where
    F: FnMut(u64, &[u64]) -> Result<(), VolumeError>,
{
    let block_len = source
        .dims
        .as_array()
        .into_iter()
        .try_fold(1u64, |len, axis| len.checked_mul(rate.min(axis)))
        .and_then(|len| usize::try_from(len).ok())
        .unwrap_or(0);
    let mut block = Vec::with_capacity(block_len);
    for oz in 0..target.dims.z {
        for oy in 0..target.dims.y {
            for ox in 0..target.dims.x {
                block.clear();
                for z in oz * rate..((oz + 1) * rate).min(source.dims.z) {
                    for y in oy * rate..((oy + 1) * rate).min(source.dims.y) {
                        for x in ox * rate..((ox + 1) * rate).min(source.dims.x) {
                            block.push(source.padded.offset_of(x, y, z)?);
                        }
                    }
                }
                let out = target.padded.offset_of(ox, oy, oz)?;
                visit(out, &block)?;
            }
        }
    }
    Ok(())
}

/// Downsample a u16 mask volume. Each block keeps its most frequent non-empty mask number,
/// with ties going to the smaller number.
pub fn downsample_mask(
    volume: &LargeVolumeStore,
    space: &SpaceSize,
    rate: u64,
    axial_divisibility: u64,
    slab_count: usize,
) -> Result<(LargeVolumeStore, SpaceSize), VolumeError> {
    let rate = effective_rate(space, rate);
    let target = downsampled_space(space, rate, axial_divisibility);
    let mut output =
        LargeVolumeStore::new(target.padded, volume.bytes_per_voxel(), slab_count)?;
    let mut counts: FxHashMap<u16, u32> = FxHashMap::default();
    for_each_block(space, &target, rate, |out, block| {
        counts.clear();
        for offset in block {
            let value = volume.read_u16(*offset)?;
            if value as u32 != EMPTY_MASK {
                *counts.entry(value).or_insert(0) += 1;
            }
        }
        let winner = counts
            .iter()
            .max_by(|(a_id, a_count), (b_id, b_count)| {
                a_count.cmp(b_count).then_with(|| b_id.cmp(a_id))
            })
            .map(|(id, _)| *id);
        if let Some(id) = winner {
            output.write_u16(out, id)?;
        }
        Ok(())
    })?;
    spdlog::debug!(
        "Downsampled mask volume {} to {}",
        space.padded,
        target.padded
    );
    Ok((output, target))
}

/// Downsample an interleaved channel volume by averaging every byte over its block
pub fn downsample_channels(
    volume: &LargeVolumeStore,
    space: &SpaceSize,
    rate: u64,
    axial_divisibility: u64,
    slab_count: usize,
) -> Result<(LargeVolumeStore, SpaceSize), VolumeError> {
    let rate = effective_rate(space, rate);
    let target = downsampled_space(space, rate, axial_divisibility);
    let width = volume.bytes_per_voxel();
    let mut output = LargeVolumeStore::new(target.padded, width, slab_count)?;
    let mut voxel = vec![0u8; width];
    let mut sums = vec![0u64; width];
    for_each_block(space, &target, rate, |out, block| {
        if block.is_empty() {
            return Ok(());
        }
        sums.iter_mut().for_each(|sum| *sum = 0);
        for offset in block {
            volume.read_voxel(*offset, &mut voxel)?;
            for (sum, byte) in sums.iter_mut().zip(voxel.iter()) {
                *sum += *byte as u64;
            }
        }
        for (byte, sum) in voxel.iter_mut().zip(sums.iter()) {
            *byte = (sum / block.len() as u64) as u8;
        }
        output.write_voxel(out, &voxel)
    })?;
    Ok((output, target))
}

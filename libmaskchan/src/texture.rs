use serde::Serialize;

use super::channel_meta::ChannelMetaData;
use super::large_volume::LargeVolumeStore;
use super::multi_mask::MultiMaskTracker;
use super::render_mapping::RenderMapping;
use super::voxel::SpaceSize;

/// A renderable left out of a build, and why
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DroppedRenderable {
    pub name: String,
    pub reason: String,
}

/// Mean channel values of one renderable, per raw channel
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelAverages {
    pub name: String,
    pub translated_num: u32,
    pub averages: Vec<f64>,
}

/// Composite entry as reported in the build metadata
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompositeEntry {
    pub multi_mask_num: u32,
    pub alt_masks: Vec<u32>,
    pub voxel_count: u64,
}

/// BoardTexture is the published result of one successful build: the mask and channel
/// volumes in padded space, the color table and the bookkeeping gathered on the way.
#[derive(Debug)]
pub struct BoardTexture {
    pub space: SpaceSize,
    pub mask: Option<LargeVolumeStore>,
    pub channels: Option<LargeVolumeStore>,
    pub channel_meta: Option<ChannelMetaData>,
    pub mapping: RenderMapping,
    pub tracker: MultiMaskTracker,
    pub channel_averages: Vec<ChannelAverages>,
    pub dropped: Vec<DroppedRenderable>,
    pub rendered: Vec<String>,
    pub downsample_rate: u64,
}

impl BoardTexture {
    pub fn composites(&self) -> Vec<CompositeEntry> {
        self.tracker
            .sorted_beans()
            .into_iter()
            .map(|bean| CompositeEntry {
                multi_mask_num: bean.multi_mask_num(),
                alt_masks: bean.alt_masks().to_vec(),
                voxel_count: bean.voxel_count(),
            })
            .collect()
    }

    /// Mask texture as little-endian u16 values
    pub fn mask_bytes(&self) -> Option<Vec<u8>> {
        self.mask.as_ref().map(|volume| volume.to_contiguous())
    }

    pub fn channel_bytes(&self) -> Option<Vec<u8>> {
        self.channels.as_ref().map(|volume| volume.to_contiguous())
    }

    pub fn channel_count(&self) -> u8 {
        self.channel_meta
            .as_ref()
            .map(|meta| meta.channel_count)
            .unwrap_or(0)
    }

    pub fn total_bytes(&self) -> u64 {
        self.mask.as_ref().map(|v| v.length()).unwrap_or(0)
            + self.channels.as_ref().map(|v| v.length()).unwrap_or(0)
    }
}

use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use super::constants::MASK_BYTES_PER_VOXEL;
use super::error::ExportError;
use super::large_volume::LargeVolumeStore;
use super::texture::{BoardTexture, ChannelAverages, CompositeEntry, DroppedRenderable};

pub const MASK_TEXTURE_NAME: &str = "mask_texture.raw";
pub const CHANNEL_TEXTURE_NAME: &str = "channel_texture.raw";
pub const COLOR_MAPPING_NAME: &str = "color_mapping.raw";
pub const METADATA_NAME: &str = "board_texture.yml";
/// This is the version of the output format
const FORMAT_VERSION: &str = "1.0";

/// Everything a renderer needs to know to upload the raw texture files
#[derive(Debug, Clone, Serialize)]
pub struct TextureMetadata {
    pub version: String,
    pub created: String,
    pub board: String,
    pub dims: [u64; 3],
    pub padded_dims: [u64; 3],
    pub coord_coverage: [f32; 3],
    pub downsample_rate: u64,
    pub mask_bytes_per_voxel: usize,
    pub channel_count: u8,
    pub mask_texture: Option<String>,
    pub channel_texture: Option<String>,
    pub color_mapping: String,
    pub color_mapping_entries: usize,
    pub total_size: String,
    pub rendered: Vec<String>,
    pub dropped: Vec<DroppedRenderable>,
    pub composites: Vec<CompositeEntry>,
    pub channel_averages: Vec<ChannelAverages>,
}

impl TextureMetadata {
    pub fn new(texture: &BoardTexture, board: &str) -> Result<Self, ExportError> {
        Ok(Self {
            version: format!("{}:{}", env!("CARGO_PKG_NAME"), FORMAT_VERSION),
            created: OffsetDateTime::now_utc().format(&Rfc3339)?,
            board: board.to_string(),
            dims: texture.space.dims.as_array(),
            padded_dims: texture.space.padded.as_array(),
            coord_coverage: texture.space.coord_coverage,
            downsample_rate: texture.downsample_rate,
            mask_bytes_per_voxel: MASK_BYTES_PER_VOXEL,
            channel_count: texture.channel_count(),
            mask_texture: texture.mask.as_ref().map(|_| MASK_TEXTURE_NAME.to_string()),
            channel_texture: texture
                .channels
                .as_ref()
                .map(|_| CHANNEL_TEXTURE_NAME.to_string()),
            color_mapping: COLOR_MAPPING_NAME.to_string(),
            color_mapping_entries: texture.mapping.len(),
            total_size: human_bytes::human_bytes(texture.total_bytes() as f64),
            rendered: texture.rendered.clone(),
            dropped: texture.dropped.clone(),
            composites: texture.composites(),
            channel_averages: texture.channel_averages.clone(),
        })
    }
}

/// Stream a volume to disk slab by slab
fn write_volume(volume: &LargeVolumeStore, path: &Path) -> Result<(), ExportError> {
    let mut writer = BufWriter::new(File::create(path)?);
    let mut remaining = volume.length() as usize;
    for slab in volume.slabs() {
        let take = remaining.min(slab.len());
        writer.write_all(&slab[..take])?;
        remaining -= take;
    }
    writer.flush()?;
    Ok(())
}

/// Write the raw texture files and their metadata into a directory.
///
/// Returns the path of the metadata file.
pub fn write_texture(
    texture: &BoardTexture,
    board: &str,
    output_dir: &Path,
) -> Result<PathBuf, ExportError> {
    let metadata = TextureMetadata::new(texture, board)?;
    if let Some(mask) = texture.mask.as_ref() {
        write_volume(mask, &output_dir.join(MASK_TEXTURE_NAME))?;
    }
    if let Some(channels) = texture.channels.as_ref() {
        write_volume(channels, &output_dir.join(CHANNEL_TEXTURE_NAME))?;
    }
    std::fs::write(
        output_dir.join(COLOR_MAPPING_NAME),
        texture.mapping.as_bytes(),
    )?;

    let metadata_path = output_dir.join(METADATA_NAME);
    let mut metadata_file = File::create(&metadata_path)?;
    metadata_file.write_all(serde_yaml::to_string(&metadata)?.as_bytes())?;
    spdlog::info!(
        "Wrote board texture {} ({}) to {}",
        board,
        metadata.total_size,
        output_dir.to_string_lossy()
    );
    Ok(metadata_path)
}

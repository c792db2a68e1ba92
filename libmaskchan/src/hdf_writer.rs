use hdf5::File;
use ndarray::{Array2, Array3, Array4};
use std::path::{Path, PathBuf};

use super::error::ExportError;
use super::texture::BoardTexture;

const TEXTURE_NAME: &str = "texture";
const MASK_NAME: &str = "mask";
const CHANNELS_NAME: &str = "channels";
const COLOR_MAPPING_NAME: &str = "color_mapping";
const COMPOSITES_NAME: &str = "composites";

// Structure
// texture - dims_x/y/z, padded_x/y/z, channel_count, downsample_rate
// |---- mask(dset) u16 [z, y, x]
// |---- channels(dset) u8 [z, y, x, channel]
// |---- color_mapping(dset) u8 [mask number, rgba]
// composites
// |---- composite_#(dset) - alt masks, voxel_count

/// A simple struct which wraps around the hdf5-rust library.
///
/// Writes one board texture per file.
#[derive(Debug)]
pub struct HDFWriter {
    file_handle: File,
    path: PathBuf,
}

impl HDFWriter {
    pub fn new(path: &Path) -> Result<Self, ExportError> {
        let file_handle = File::create(path)?;
        Ok(Self {
            file_handle,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write_texture(&self, texture: &BoardTexture) -> Result<(), ExportError> {
        let group = self.file_handle.create_group(TEXTURE_NAME)?;
        let dims = texture.space.dims;
        let padded = texture.space.padded;
        for (name, value) in [
            ("dims_x", dims.x),
            ("dims_y", dims.y),
            ("dims_z", dims.z),
            ("padded_x", padded.x),
            ("padded_y", padded.y),
            ("padded_z", padded.z),
            ("downsample_rate", texture.downsample_rate),
        ] {
            group.new_attr::<u64>().create(name)?.write_scalar(&value)?;
        }
        group
            .new_attr::<u8>()
            .create("channel_count")?
            .write_scalar(&texture.channel_count())?;

        let shape = (padded.z as usize, padded.y as usize, padded.x as usize);
        if let Some(mask) = texture.mask.as_ref() {
            let values = mask
                .to_contiguous()
                .chunks_exact(2)
                .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
                .collect::<Vec<u16>>();
            let data = Array3::from_shape_vec(shape, values)?;
            group
                .new_dataset_builder()
                .with_data(&data)
                .create(MASK_NAME)?;
        }
        if let Some(channels) = texture.channels.as_ref() {
            let width = channels.bytes_per_voxel();
            let data =
                Array4::from_shape_vec((shape.0, shape.1, shape.2, width), channels.to_contiguous())?;
            group
                .new_dataset_builder()
                .with_data(&data)
                .create(CHANNELS_NAME)?;
        }
        let mapping = Array2::from_shape_vec((texture.mapping.len(), 4), texture.mapping.as_bytes())?;
        group
            .new_dataset_builder()
            .with_data(&mapping)
            .create(COLOR_MAPPING_NAME)?;

        let composites_group = self.file_handle.create_group(COMPOSITES_NAME)?;
        for composite in texture.composites() {
            let dset = composites_group
                .new_dataset_builder()
                .with_data(&composite.alt_masks)
                .create(format!("composite_{}", composite.multi_mask_num).as_str())?;
            dset.new_attr::<u64>()
                .create("voxel_count")?
                .write_scalar(&composite.voxel_count)?;
        }
        spdlog::info!("Wrote board texture to {}", self.path.to_string_lossy());
        Ok(())
    }
}

use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::mpsc::Sender;
use std::sync::Arc;

use super::assembler::TextureVolumeAssembler;
use super::board::Board;
use super::config::Config;
use super::error::ProcessorError;
use super::export::write_texture;
use super::resolver::{CacheFileResolver, FileResolver, TrivialFileResolver};
use super::worker_status::{BuildPhase, BuildStatus};

/// The main loop of maskchan.
///
/// This takes in a config (and progress monitor) and builds the board texture it describes,
/// writing the result into the output directory. Returns the path of the texture metadata.
///
/// Setting `cancel` abandons the build; nothing is written in that case.
pub fn process(
    config: &Config,
    tx: &Sender<BuildStatus>,
    cancel: Arc<AtomicBool>,
) -> Result<PathBuf, ProcessorError> {
    config.validate()?;
    let output_dir = config.get_output_directory()?;
    let board = Board::read_board_file(&config.get_board_file()?)?;
    spdlog::info!("Building board {}...", board.name);

    let cache = config
        .cache_path
        .as_ref()
        .map(|cache_dir| CacheFileResolver::new(config.data_root.clone(), cache_dir));
    let trivial = TrivialFileResolver::new(config.data_root.clone());
    let resolver: &dyn FileResolver = match cache.as_ref() {
        Some(cache) => cache,
        None => &trivial,
    };
    let renderables = board.renderables(resolver)?;
    if let Some(cache) = cache.as_ref() {
        spdlog::info!(
            "Copied {} into the file cache",
            human_bytes::human_bytes(cache.copied_bytes() as f64)
        );
    }

    let mut assembler = TextureVolumeAssembler::new(config.assembler_settings());
    assembler.set_status_sender(tx.clone());
    assembler.set_cancel_flag(cancel);
    let texture = assembler.build(renderables)?;
    spdlog::info!(
        "Board texture {} (padded {}) built from {} renderables, {} dropped",
        texture.space.dims,
        texture.space.padded,
        texture.rendered.len(),
        texture.dropped.len()
    );

    let metadata_path = write_texture(&texture, &board.name, &output_dir)?;
    if config.write_hdf5 {
        write_hdf5(&texture, &output_dir)?;
    }
    tx.send(BuildStatus::new(1.0, BuildPhase::Finish, &board.name))?;

    if config.delete_cached_files() {
        if let Some(cache) = cache.as_ref() {
            cache.clear()?;
        }
    }
    Ok(metadata_path)
}

#[cfg(feature = "hdf5")]
fn write_hdf5(
    texture: &super::texture::BoardTexture,
    output_dir: &std::path::Path,
) -> Result<(), ProcessorError> {
    let writer = super::hdf_writer::HDFWriter::new(&output_dir.join("board_texture.h5"))?;
    writer.write_texture(texture)?;
    Ok(())
}

#[cfg(not(feature = "hdf5"))]
fn write_hdf5(
    _texture: &super::texture::BoardTexture,
    _output_dir: &std::path::Path,
) -> Result<(), ProcessorError> {
    spdlog::warn!("HDF5 export requested but maskchan was built without the hdf5 feature");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AssemblerError;
    use crate::mask_file::RayAxis;
    use crate::voxel::VolumeDims;
    use crate::writer::MaskChanWriter;
    use std::sync::atomic::Ordering;

    const BOARD: &str = r#"
name: pipeline
items:
  - name: frag
    color: "00ff00"
    mask: frag.mask
  - name: gone
    mask: gone.mask
"#;

    fn setup(name: &str) -> (PathBuf, Config) {
        let root = std::env::temp_dir().join(format!("maskchan_{}_{}", name, std::process::id()));
        let data = root.join("data");
        let output = root.join("out");
        std::fs::create_dir_all(&data).unwrap();
        std::fs::create_dir_all(&output).unwrap();

        let mut writer = MaskChanWriter::new(VolumeDims::new(2, 2, 2), RayAxis::Z);
        writer.add_voxel(0, 0, 0).unwrap();
        writer.add_voxel(1, 1, 1).unwrap();
        writer.write_files(&data.join("frag.mask"), None).unwrap();
        std::fs::write(root.join("board.yml"), BOARD).unwrap();

        let config = Config {
            board_path: root.join("board.yml"),
            output_path: output,
            data_root: Some(data),
            cache_path: Some(root.join("cache")),
            delete_cached: true,
            ..Default::default()
        };
        (root, config)
    }

    #[test]
    fn test_process_board() {
        let (root, config) = setup("process");
        let (tx, rx) = std::sync::mpsc::channel();
        let metadata = process(&config, &tx, Arc::new(AtomicBool::new(false))).unwrap();
        assert!(metadata.exists());

        let yaml = std::fs::read_to_string(metadata).unwrap();
        assert!(yaml.contains("gone"));
        let mask = std::fs::read(config.output_path.join("mask_texture.raw")).unwrap();
        assert_eq!(mask.len(), 4 * 4 * 4 * 2);
        // substitute channels: 4 channels of 127 where the fragment is
        let channels = std::fs::read(config.output_path.join("channel_texture.raw")).unwrap();
        assert_eq!(channels.len(), 4 * 4 * 4 * 4);
        assert_eq!(channels.iter().filter(|b| **b == 127).count(), 2 * 3);
        assert!(!root.join("cache").exists());
        assert_eq!(rx.try_iter().last().unwrap().phase, BuildPhase::Finish);
        std::fs::remove_dir_all(root).unwrap();
    }

    #[test]
    fn test_cancelled_build_writes_nothing() {
        let (root, config) = setup("process_cancel");
        let (tx, _rx) = std::sync::mpsc::channel();
        let cancel = Arc::new(AtomicBool::new(false));
        cancel.store(true, Ordering::Relaxed);
        let result = process(&config, &tx, cancel);
        assert!(matches!(
            result,
            Err(ProcessorError::AssemblerError(AssemblerError::Cancelled))
        ));
        assert!(!config.output_path.join("board_texture.yml").exists());
        std::fs::remove_dir_all(root).unwrap();
    }
}

use std::fs::File;
use std::io::BufReader;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;

use super::acceptor::MaskChanAcceptor;
use super::channel_builder::ChannelVolumeBuilder;
use super::channel_meta::ChannelMetaData;
use super::constants::{
    DEFAULT_NUM_SLABS, EMPTY_MASK, GPU_MULTIBYTE_DIVISIBILITY_VALUE, MASK_BYTES_PER_VOXEL,
};
use super::downsample::{downsample_channels, downsample_mask, effective_rate};
use super::error::{
    AssemblerError, ChanFormatError, LoaderError, MaskFormatError, TrackerError, VolumeError,
};
use super::loader::MaskChanLoader;
use super::mask_builder::{check_capacity, MaskVolumeBuilder};
use super::multi_mask::MultiMaskTracker;
use super::render_mapping::RenderMapping;
use super::renderable::{FragmentSizeFilter, MaskChanRenderableData, RenderableBean};
use super::texture::{BoardTexture, ChannelAverages, DroppedRenderable};
use super::voxel::SpaceSize;
use super::worker_status::{BuildPhase, BuildStatus};

/// Knobs of a board texture build
#[derive(Debug, Clone, PartialEq)]
pub struct AssemblerSettings {
    pub slab_count: usize,
    pub axial_divisibility: u64,
    /// Ceiling on mask plus channel texture bytes
    pub max_volume_bytes: Option<u64>,
    pub use_channel_data: bool,
    pub intensity_divisor: u32,
    pub downsample_rate: u64,
    pub filter: FragmentSizeFilter,
    pub background: Option<Vec<u8>>,
}

impl Default for AssemblerSettings {
    fn default() -> Self {
        Self {
            slab_count: DEFAULT_NUM_SLABS,
            axial_divisibility: GPU_MULTIBYTE_DIVISIBILITY_VALUE,
            max_volume_bytes: None,
            use_channel_data: true,
            intensity_divisor: 1,
            downsample_rate: 1,
            filter: FragmentSizeFilter::default(),
            background: None,
        }
    }
}

/// A renderable which passed the validation read
#[derive(Debug)]
struct Scanned {
    data: MaskChanRenderableData,
    space: SpaceSize,
    channel_meta: ChannelMetaData,
    channel_averages: Option<Vec<f64>>,
}

fn open_mask(data: &MaskChanRenderableData) -> Result<BufReader<File>, LoaderError> {
    let path = data
        .mask_path()
        .ok_or_else(|| LoaderError::NoMaskFile(data.bean().name.clone()))?;
    let file = File::open(path).map_err(MaskFormatError::from)?;
    Ok(BufReader::new(file))
}

fn open_chan(data: &MaskChanRenderableData) -> Result<Option<BufReader<File>>, LoaderError> {
    match data.channel_path() {
        Some(path) => {
            let file = File::open(path).map_err(ChanFormatError::from)?;
            Ok(Some(BufReader::new(file)))
        }
        None => Ok(None),
    }
}

/// TextureVolumeAssembler runs one board texture build from a list of renderables.
///
/// The build goes through three passes over the renderables:
///
/// 1. Scan: every mask/chan pair is decoded once without writing anything, which yields its
///    voxel count, channel layout and averages. Pairs which fail to decode are dropped here so
///    they never leave half-painted voxels behind.
/// 2. Mask: renderables are painted in processing order into the mask texture; overlaps become
///    composite ids in the MultiMaskTracker.
/// 3. Channel: intensities are written into the channel texture for the voxels each renderable
///    owns.
///
/// Format problems only drop the renderable at hand. Capacity and tracker problems abort the
/// build, and nothing is returned.
#[derive(Debug, Default)]
pub struct TextureVolumeAssembler {
    settings: AssemblerSettings,
    status: Option<Sender<BuildStatus>>,
    cancel: Option<Arc<AtomicBool>>,
}

impl TextureVolumeAssembler {
    pub fn new(settings: AssemblerSettings) -> Self {
        Self {
            settings,
            status: None,
            cancel: None,
        }
    }

    pub fn set_status_sender(&mut self, tx: Sender<BuildStatus>) {
        self.status = Some(tx);
    }

    pub fn set_cancel_flag(&mut self, cancel: Arc<AtomicBool>) {
        self.cancel = Some(cancel);
    }

    pub fn settings(&self) -> &AssemblerSettings {
        &self.settings
    }

    fn check_cancel(&self) -> Result<(), AssemblerError> {
        if self
            .cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
        {
            spdlog::warn!("Board build cancelled, discarding all buffers");
            return Err(AssemblerError::Cancelled);
        }
        Ok(())
    }

    fn report(
        &self,
        phase: BuildPhase,
        done: usize,
        total: usize,
        name: &str,
    ) -> Result<(), AssemblerError> {
        if let Some(tx) = self.status.as_ref() {
            tx.send(BuildStatus::new(
                done as f32 / total.max(1) as f32,
                phase,
                name,
            ))?;
        }
        Ok(())
    }

    fn loader<'a>(&self, bean: &'a RenderableBean) -> MaskChanLoader<'a> {
        let mut loader = MaskChanLoader::new(bean);
        loader.set_axial_length_divisibility(self.settings.axial_divisibility);
        loader
    }

    fn scan(&self, data: &mut MaskChanRenderableData) -> Result<Scanned, LoaderError> {
        if let Some(path) = data.channel_path() {
            if !path.exists() {
                spdlog::warn!(
                    "Channel file {} of {} does not exist, using substitute channel data",
                    path.to_string_lossy(),
                    data.bean().name
                );
                data.set_channel_path(None);
            }
        }
        let mask = open_mask(data)?;
        let chan = open_chan(data)?;
        let mut nobody: Vec<&mut dyn MaskChanAcceptor> = Vec::new();
        let summary = self.loader(data.bean()).read(mask, chan, &mut nobody)?;
        data.bean_mut().voxel_count = summary.voxels_read;
        Ok(Scanned {
            data: data.clone(),
            space: summary.space,
            channel_meta: summary.channel_meta,
            channel_averages: summary.channel_averages,
        })
    }

    /// Build the board texture. Nothing is returned unless every pass completes.
    pub fn build(
        &self,
        renderables: Vec<MaskChanRenderableData>,
    ) -> Result<BoardTexture, AssemblerError> {
        let mut dropped: Vec<DroppedRenderable> = Vec::new();
        let total = renderables.len();

        // Scan
        let mut scanned: Vec<Scanned> = Vec::with_capacity(total);
        for (idx, mut data) in renderables.into_iter().enumerate() {
            self.check_cancel()?;
            self.report(BuildPhase::Scan, idx, total, &data.bean().name)?;
            if data.bean().translated_num == EMPTY_MASK {
                spdlog::debug!("{} has no mask number, not painting it", data.bean().name);
                continue;
            }
            match self.scan(&mut data) {
                Ok(item) => scanned.push(item),
                Err(e) => {
                    spdlog::warn!("Dropping {}: {}", data.bean().name, e);
                    dropped.push(DroppedRenderable {
                        name: data.bean().name.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        scanned.sort_by(|a, b| MaskChanRenderableData::processing_order(&a.data, &b.data));
        let space = match scanned.first() {
            Some(first) => first.space,
            None => return Err(AssemblerError::NothingToBuild),
        };
        scanned.retain(|item| {
            if item.space.dims == space.dims {
                return true;
            }
            spdlog::warn!(
                "Dropping {}: volume {} differs from board volume {}",
                item.data.bean().name,
                item.space.dims,
                space.dims
            );
            dropped.push(DroppedRenderable {
                name: item.data.bean().name.clone(),
                reason: format!("volume {} differs from board volume {}", item.space.dims, space.dims),
            });
            false
        });

        let (kept, filtered) = self
            .settings
            .filter
            .apply_by(scanned, |item| &item.data);
        for name in filtered {
            spdlog::info!("Fragment {} filtered out by size", name);
            dropped.push(DroppedRenderable {
                name,
                reason: String::from("filtered by fragment size"),
            });
        }

        // Check the whole footprint before allocating anything
        let texture_meta = ChannelMetaData::for_texture(
            kept.iter()
                .map(|item| item.channel_meta.raw_channel_count)
                .max()
                .unwrap_or(1),
        );
        let mut requested = check_capacity(&space, MASK_BYTES_PER_VOXEL, None)?;
        if self.settings.use_channel_data {
            requested += check_capacity(&space, texture_meta.record_width(), None)?;
        }
        if let Some(capacity) = self.settings.max_volume_bytes {
            if requested > capacity {
                spdlog::error!(
                    "Board textures need {} but only {} are allowed",
                    human_bytes::human_bytes(requested as f64),
                    human_bytes::human_bytes(capacity as f64)
                );
                return Err(VolumeError::ExceedsCapacity {
                    requested,
                    capacity,
                }
                .into());
            }
        }

        let highest_original = kept
            .iter()
            .map(|item| item.data.bean().translated_num)
            .max()
            .unwrap_or(EMPTY_MASK);
        let mut tracker = MultiMaskTracker::new();
        let first_mask_num = highest_original
            .checked_add(1)
            .ok_or(TrackerError::InvalidFirstMaskNum(highest_original))?;
        tracker.set_first_mask_num(first_mask_num)?;

        // Mask
        let mut mask_builder = MaskVolumeBuilder::new(
            space,
            tracker,
            self.settings.slab_count,
            self.settings.max_volume_bytes,
        )?;
        let count = kept.len();
        let mut rendered: Vec<Scanned> = Vec::with_capacity(count);
        for (idx, item) in kept.into_iter().enumerate() {
            self.check_cancel()?;
            let name = item.data.bean().name.clone();
            self.report(BuildPhase::Mask, idx, count, &name)?;
            let result = open_mask(&item.data).and_then(|mask| {
                self.loader(item.data.bean()).read(
                    mask,
                    None::<BufReader<File>>,
                    &mut [&mut mask_builder as &mut dyn MaskChanAcceptor],
                )
            });
            match result {
                Ok(summary) => {
                    spdlog::debug!("Painted {} voxels of {}", summary.voxels_accepted, name);
                    rendered.push(item);
                }
                Err(e) if e.is_fatal() => return Err(AssemblerError::Fatal { name, source: e }),
                Err(e) => {
                    spdlog::warn!("Dropping {} from the mask texture: {}", name, e);
                    dropped.push(DroppedRenderable {
                        name,
                        reason: e.to_string(),
                    });
                }
            }
        }
        if rendered.is_empty() {
            return Err(AssemblerError::NothingToBuild);
        }
        let (mut mask_volume, tracker) = mask_builder.into_parts();
        spdlog::info!(
            "Mask texture done: {} renderables, {} composites",
            rendered.len(),
            tracker.get_multi_mask_beans().len()
        );

        // Channel
        let mut channel_volume = None;
        if self.settings.use_channel_data {
            let mut builder = ChannelVolumeBuilder::new(
                space,
                texture_meta,
                self.settings.slab_count,
                self.settings.max_volume_bytes,
                self.settings.background.as_deref(),
                Some((&mask_volume, &tracker)),
            )?;
            builder.set_intensity_divisor(self.settings.intensity_divisor);
            for (idx, item) in rendered.iter().enumerate() {
                self.check_cancel()?;
                let name = &item.data.bean().name;
                self.report(BuildPhase::Channel, idx, rendered.len(), name)?;
                let result = open_mask(&item.data).and_then(|mask| {
                    let chan = open_chan(&item.data)?;
                    self.loader(item.data.bean()).read(
                        mask,
                        chan,
                        &mut [&mut builder as &mut dyn MaskChanAcceptor],
                    )
                });
                match result {
                    Ok(_) => (),
                    Err(e) if e.is_fatal() => {
                        return Err(AssemblerError::Fatal {
                            name: name.clone(),
                            source: e,
                        })
                    }
                    Err(e) => {
                        spdlog::warn!("Dropping channel data of {}: {}", name, e);
                        dropped.push(DroppedRenderable {
                            name: name.clone(),
                            reason: format!("channel data: {e}"),
                        });
                    }
                }
            }
            channel_volume = Some(builder.into_volume());
        }

        self.report(BuildPhase::Finish, 0, 1, "")?;
        let beans: Vec<RenderableBean> = rendered
            .iter()
            .map(|item| item.data.bean().clone())
            .collect();
        let mapping = RenderMapping::build(&beans, &tracker);

        let mut board_space = space;
        let rate = effective_rate(&space, self.settings.downsample_rate);
        if rate != self.settings.downsample_rate.max(1) {
            spdlog::warn!(
                "Downsample rate {} exceeds the board volume {}, using {}",
                self.settings.downsample_rate,
                space.dims,
                rate
            );
        }
        if rate > 1 {
            let (volume, reduced) = downsample_mask(
                &mask_volume,
                &space,
                rate,
                self.settings.axial_divisibility,
                self.settings.slab_count,
            )?;
            mask_volume = volume;
            board_space = reduced;
            if let Some(channels) = channel_volume.take() {
                let (volume, _) = downsample_channels(
                    &channels,
                    &space,
                    rate,
                    self.settings.axial_divisibility,
                    self.settings.slab_count,
                )?;
                channel_volume = Some(volume);
            }
        }

        let channel_averages = rendered
            .iter()
            .filter_map(|item| {
                item.channel_averages.as_ref().map(|averages| ChannelAverages {
                    name: item.data.bean().name.clone(),
                    translated_num: item.data.bean().translated_num,
                    averages: averages.clone(),
                })
            })
            .collect();
        self.report(BuildPhase::Finish, 1, 1, "")?;

        Ok(BoardTexture {
            space: board_space,
            mask: Some(mask_volume),
            channel_meta: channel_volume.as_ref().map(|_| texture_meta),
            channels: channel_volume,
            mapping,
            tracker,
            channel_averages,
            dropped,
            rendered: beans.into_iter().map(|bean| bean.name).collect(),
            downsample_rate: rate,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AcceptorError;
    use crate::mask_file::RayAxis;
    use crate::renderable::{RenderMethod, RenderableKind};
    use crate::voxel::VolumeDims;
    use crate::writer::MaskChanWriter;
    use std::path::{Path, PathBuf};

    fn fixture_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("maskchan_{}_{}", name, std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn write_pair(
        dir: &Path,
        name: &str,
        voxels: &[(u64, u64, u64)],
        value: Option<u64>,
    ) -> (PathBuf, Option<PathBuf>) {
        let mut writer = MaskChanWriter::new(VolumeDims::new(4, 4, 4), RayAxis::X);
        for (x, y, z) in voxels {
            writer
                .add_voxel_with_channels(*x, *y, *z, &[value.unwrap_or(0)])
                .unwrap();
        }
        let mask = dir.join(format!("{name}.mask"));
        let chan = dir.join(format!("{name}.chan"));
        match value {
            Some(_) => {
                writer
                    .write_files(&mask, Some((&chan, ChannelMetaData::new(1, 1, 0, 0, 0))))
                    .unwrap();
                (mask, Some(chan))
            }
            None => {
                writer.write_files(&mask, None).unwrap();
                (mask, None)
            }
        }
    }

    fn fragment(
        name: &str,
        num: u32,
        rgb: [u8; 3],
        files: (PathBuf, Option<PathBuf>),
    ) -> MaskChanRenderableData {
        let mut bean = RenderableBean::new(num as u64, name, RenderableKind::NeuronFragment, num);
        bean.rgb = Some(rgb);
        bean.render_method = RenderMethod::Fragment;
        MaskChanRenderableData::new(bean, Some(files.0), files.1)
    }

    /// Fragment voxels land at y = 3 - y in the padded 4x4x4 volume
    fn position(x: u64, y: u64, z: u64) -> u64 {
        z * 16 + (3 - y) * 4 + x
    }

    fn board(dir: &Path, with_channels: bool) -> Vec<MaskChanRenderableData> {
        let value = |v: u64| if with_channels { Some(v) } else { None };
        let big = write_pair(dir, "big", &[(0, 0, 0), (1, 0, 0), (2, 0, 0)], value(100));
        let small = write_pair(dir, "small", &[(1, 0, 0), (3, 3, 3)], value(200));
        let mut missing = fragment("missing", 3, [9, 9, 9], (dir.join("nope.mask"), None));
        missing.bean_mut().voxel_count = 1000;
        let container = MaskChanRenderableData::new(
            RenderableBean::new(99, "sample", RenderableKind::Sample, 0),
            None,
            None,
        );
        vec![
            container,
            fragment("small", 2, [0, 0, 200], small),
            missing,
            fragment("big", 1, [200, 0, 0], big),
        ]
    }

    #[test]
    fn test_mask_pass_resolves_overlaps() {
        let dir = fixture_dir("mask_pass");
        let settings = AssemblerSettings {
            use_channel_data: false,
            slab_count: 3,
            ..Default::default()
        };
        let texture = TextureVolumeAssembler::new(settings)
            .build(board(&dir, false))
            .unwrap();

        let mask = texture.mask.as_ref().unwrap();
        assert_eq!(mask.read_u16(position(0, 0, 0)).unwrap(), 1);
        assert_eq!(mask.read_u16(position(2, 0, 0)).unwrap(), 1);
        assert_eq!(mask.read_u16(position(3, 3, 3)).unwrap(), 2);
        // big is painted first, so it is the primary of the overlap
        let composite = mask.read_u16(position(1, 0, 0)).unwrap() as u32;
        assert_eq!(composite, 3);
        assert_eq!(texture.tracker.get_bean(composite).unwrap().primary_mask(), 1);
        assert_eq!(texture.mapping.entry(composite), Some([200, 0, 0, 1]));
        assert_eq!(texture.mapping.entry(2), Some([0, 0, 200, 1]));

        assert_eq!(texture.rendered, vec!["big", "small"]);
        assert_eq!(texture.dropped.len(), 1);
        assert_eq!(texture.dropped[0].name, "missing");
        assert!(texture.channels.is_none());
        assert_eq!(texture.composites()[0].alt_masks, vec![1, 2]);
        std::fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_channel_pass_respects_ownership() {
        let dir = fixture_dir("channel_pass");
        let texture = TextureVolumeAssembler::new(AssemblerSettings::default())
            .build(board(&dir, true))
            .unwrap();
        assert_eq!(texture.channel_count(), 1);
        let channels = texture.channels.as_ref().unwrap();
        assert_eq!(channels.get_value_at(position(0, 0, 0)).unwrap(), 100);
        assert_eq!(channels.get_value_at(position(1, 0, 0)).unwrap(), 100);
        assert_eq!(channels.get_value_at(position(3, 3, 3)).unwrap(), 200);
        assert_eq!(channels.get_value_at(position(3, 0, 0)).unwrap(), 0);

        assert_eq!(texture.channel_averages.len(), 2);
        let big = &texture.channel_averages[0];
        assert_eq!(big.name, "big");
        assert!((big.averages[0] - 100.0 / 256.0).abs() < 1e-9);
        std::fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_capacity_fails_before_any_load() {
        let dir = fixture_dir("capacity");
        let settings = AssemblerSettings {
            max_volume_bytes: Some(150),
            ..Default::default()
        };
        let result = TextureVolumeAssembler::new(settings).build(board(&dir, true));
        assert!(matches!(
            result,
            Err(AssemblerError::Volume(VolumeError::ExceedsCapacity {
                requested: 192,
                capacity: 150
            }))
        ));
        std::fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_cancel_and_empty_builds_publish_nothing() {
        let dir = fixture_dir("cancel");
        let mut assembler = TextureVolumeAssembler::new(AssemblerSettings::default());
        assembler.set_cancel_flag(Arc::new(AtomicBool::new(true)));
        assert!(matches!(
            assembler.build(board(&dir, false)),
            Err(AssemblerError::Cancelled)
        ));

        let assembler = TextureVolumeAssembler::new(AssemblerSettings::default());
        let only_missing = vec![fragment("missing", 1, [1, 1, 1], (dir.join("gone.mask"), None))];
        assert!(matches!(
            assembler.build(only_missing),
            Err(AssemblerError::NothingToBuild)
        ));
        std::fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_exhausted_composite_ids_abort_the_build() {
        let dir = fixture_dir("exhausted");
        // 65535 is the only composite id left; the second overlapping pair has nowhere to go
        let wide = write_pair(&dir, "wide", &[(0, 0, 0), (1, 0, 0)], None);
        let left = write_pair(&dir, "left", &[(0, 0, 0)], None);
        let right = write_pair(&dir, "right", &[(1, 0, 0)], None);
        let renderables = vec![
            fragment("right", 65534, [0, 0, 255], right),
            fragment("left", 65533, [0, 255, 0], left),
            fragment("wide", 65532, [255, 0, 0], wide),
        ];
        let settings = AssemblerSettings {
            use_channel_data: false,
            ..Default::default()
        };
        let result = TextureVolumeAssembler::new(settings).build(renderables);
        match result {
            Err(AssemblerError::Fatal { name, source }) => {
                assert_eq!(name, "right");
                assert!(matches!(
                    source,
                    LoaderError::Acceptor(AcceptorError::Tracker(
                        TrackerError::CompositeSpaceExhausted { ceiling: 65535 }
                    ))
                ));
            }
            other => panic!("expected a fatal tracker error, got {:?}", other.err()),
        }
        std::fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_highest_mask_number_leaves_no_composite_ids() {
        let dir = fixture_dir("highest_mask");
        let files = write_pair(&dir, "last", &[(0, 0, 0)], None);
        let renderables = vec![fragment("last", u32::MAX, [1, 2, 3], files)];
        let settings = AssemblerSettings {
            use_channel_data: false,
            ..Default::default()
        };
        assert!(matches!(
            TextureVolumeAssembler::new(settings).build(renderables),
            Err(AssemblerError::Tracker(TrackerError::InvalidFirstMaskNum(u32::MAX)))
        ));
        std::fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_oversized_downsample_rate_is_clamped() {
        let dir = fixture_dir("big_rate");
        let texture = TextureVolumeAssembler::new(AssemblerSettings {
            downsample_rate: 3_000_000,
            ..Default::default()
        })
        .build(board(&dir, true))
        .unwrap();
        assert_eq!(texture.downsample_rate, 4);
        assert_eq!(texture.space.dims, VolumeDims::new(1, 1, 1));
        // the whole board collapses onto big, the most frequent mask number
        assert_eq!(texture.mask.as_ref().unwrap().read_u16(0).unwrap(), 1);
        std::fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_progress_is_reported() {
        let dir = fixture_dir("progress");
        let (tx, rx) = std::sync::mpsc::channel();
        let mut assembler = TextureVolumeAssembler::new(AssemblerSettings {
            downsample_rate: 2,
            ..Default::default()
        });
        assembler.set_status_sender(tx);
        let texture = assembler.build(board(&dir, true)).unwrap();
        assert_eq!(texture.space.dims, VolumeDims::new(2, 2, 2));
        assert_eq!(texture.space.padded, VolumeDims::new(4, 4, 4));

        let statuses: Vec<BuildStatus> = rx.try_iter().collect();
        assert!(statuses.iter().any(|s| s.phase == BuildPhase::Mask));
        assert!(statuses.iter().any(|s| s.phase == BuildPhase::Channel));
        assert_eq!(statuses.last().unwrap().progress, 1.0);
        std::fs::remove_dir_all(dir).unwrap();
    }
}

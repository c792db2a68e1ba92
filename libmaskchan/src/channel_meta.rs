use serde::{Deserialize, Serialize};

use super::constants::CHANNEL_TEXTURE_BYTES_PER_CHANNEL;
use super::error::AcceptorError;

/// Channel layout of one intensity stream, or of the channel texture.
///
/// `raw_channel_count` is what the data actually carries; `channel_count` may be larger when
/// the layout is rounded out for the GPU (3 raw channels are stored as 4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelMetaData {
    pub raw_channel_count: u8,
    pub channel_count: u8,
    pub byte_count: u8,
    pub red_channel_index: u8,
    pub green_channel_index: u8,
    pub blue_channel_index: u8,
}

impl ChannelMetaData {
    pub fn new(raw_channel_count: u8, byte_count: u8, red: u8, green: u8, blue: u8) -> Self {
        Self {
            raw_channel_count,
            channel_count: raw_channel_count,
            byte_count,
            red_channel_index: red,
            green_channel_index: green,
            blue_channel_index: blue,
        }
    }

    /// Layout used for renderables which have no channel file
    pub fn substitute() -> Self {
        Self {
            raw_channel_count: 3,
            channel_count: 4,
            byte_count: 1,
            red_channel_index: 0,
            green_channel_index: 1,
            blue_channel_index: 2,
        }
    }

    /// Layout of the channel texture for the widest raw channel count on a board
    pub fn for_texture(max_raw_channel_count: u8) -> Self {
        let raw = max_raw_channel_count.max(1);
        Self {
            raw_channel_count: raw,
            channel_count: Self::texture_channel_count(raw),
            byte_count: CHANNEL_TEXTURE_BYTES_PER_CHANNEL as u8,
            red_channel_index: 0,
            green_channel_index: 1,
            blue_channel_index: 2,
        }
    }

    /// 1 stays 1, 2 through 4 round out to 4, anything wider is kept as is
    pub fn texture_channel_count(max_raw_channel_count: u8) -> u8 {
        match max_raw_channel_count {
            0 | 1 => 1,
            2..=4 => 4,
            n => n,
        }
    }

    /// Width in bytes of one voxel's record as handed to acceptors
    pub fn record_width(&self) -> usize {
        self.channel_count as usize * self.byte_count as usize
    }

    pub fn raw_record_width(&self) -> usize {
        self.raw_channel_count as usize * self.byte_count as usize
    }

    pub fn is_rgb(&self) -> bool {
        self.raw_channel_count >= 3
    }

    /// Red, green and blue source indexes, in that order
    pub fn ordered_rgb_indexes(&self) -> [u8; 3] {
        [
            self.red_channel_index,
            self.green_channel_index,
            self.blue_channel_index,
        ]
    }

    /// Texture slot a source channel lands in. RGB data is reordered to R, G, B.
    pub fn target_slot(&self, source_channel: u8) -> u8 {
        if self.is_rgb() {
            if source_channel == self.red_channel_index {
                return 0;
            } else if source_channel == self.green_channel_index {
                return 1;
            } else if source_channel == self.blue_channel_index {
                return 2;
            }
        }
        source_channel
    }

    /// Ensure a stream with this layout can be written into `texture`
    pub fn check_fits(&self, texture: &ChannelMetaData) -> Result<(), AcceptorError> {
        let mut problems = Vec::new();
        if self.raw_channel_count > texture.channel_count {
            problems.push(format!(
                "channel count {} exceeds texture channel count {}",
                self.raw_channel_count, texture.channel_count
            ));
        }
        if self.byte_count == 0 {
            problems.push(String::from("zero bytes per channel"));
        }
        for index in self.ordered_rgb_indexes() {
            if self.is_rgb() && index >= self.raw_channel_count {
                problems.push(format!(
                    "color index {} outside of {} channels",
                    index, self.raw_channel_count
                ));
            }
        }
        if problems.is_empty() {
            Ok(())
        } else {
            Err(AcceptorError::ChannelMetaMismatch(problems.join("; ")))
        }
    }

    /// Reduce one little-endian channel value to a texture byte: divide, then keep the most
    /// significant byte of the value's width.
    pub fn reduce_value(value_bytes: &[u8], intensity_divisor: u32) -> u8 {
        let mut value: u64 = 0;
        for (shift, byte) in value_bytes.iter().take(8).enumerate() {
            value |= (*byte as u64) << (8 * shift);
        }
        let value = value / intensity_divisor.max(1) as u64;
        let width = value_bytes.len().clamp(1, 8);
        ((value >> (8 * (width - 1))) & 0xff) as u8
    }

    /// Translate one voxel record in this layout into texture bytes.
    ///
    /// Slots with no source channel are left untouched.
    pub fn interpret_record(
        &self,
        record: &[u8],
        texture: &ChannelMetaData,
        intensity_divisor: u32,
        out: &mut [u8],
    ) -> Result<(), AcceptorError> {
        let byte_count = self.byte_count as usize;
        if record.len() < self.raw_record_width() {
            return Err(AcceptorError::ChannelMetaMismatch(format!(
                "record of {} bytes is narrower than {} channels of {} bytes",
                record.len(),
                self.raw_channel_count,
                byte_count
            )));
        }
        if out.len() != texture.record_width() {
            return Err(AcceptorError::ChannelMetaMismatch(format!(
                "output record of {} bytes does not match texture width {}",
                out.len(),
                texture.record_width()
            )));
        }
        for channel in 0..self.raw_channel_count {
            let slot = self.target_slot(channel) as usize;
            if slot >= texture.channel_count as usize {
                continue;
            }
            let start = channel as usize * byte_count;
            out[slot] = Self::reduce_value(&record[start..start + byte_count], intensity_divisor);
        }
        Ok(())
    }

    /// Background preset voxel for the texture: the color fills the texture channels in order
    /// and a missing alpha channel is set to opaque.
    pub fn preset_voxel(&self, background: &[u8]) -> Vec<u8> {
        let mut preset = vec![0u8; self.record_width()];
        let copied = background.len().min(preset.len());
        preset[..copied].copy_from_slice(&background[..copied]);
        if background.len() < self.channel_count as usize {
            if let Some(last) = preset.last_mut() {
                *last = 255;
            }
        }
        preset
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_texture_layouts() {
        assert_eq!(ChannelMetaData::texture_channel_count(1), 1);
        assert_eq!(ChannelMetaData::texture_channel_count(2), 4);
        assert_eq!(ChannelMetaData::texture_channel_count(3), 4);
        assert_eq!(ChannelMetaData::texture_channel_count(4), 4);
        assert_eq!(ChannelMetaData::texture_channel_count(6), 6);
        let texture = ChannelMetaData::for_texture(3);
        assert_eq!(texture.channel_count, 4);
        assert_eq!(texture.record_width(), 4);
        assert_eq!(ChannelMetaData::substitute().record_width(), 4);
        assert_eq!(ChannelMetaData::substitute().raw_record_width(), 3);
    }

    #[test]
    fn test_rgb_reordering() {
        // on disk: channel 0 is blue, 1 is green, 2 is red
        let meta = ChannelMetaData::new(3, 1, 2, 1, 0);
        let texture = ChannelMetaData::for_texture(3);
        let mut out = [9u8; 4];
        meta.interpret_record(&[10, 20, 30], &texture, 1, &mut out)
            .unwrap();
        assert_eq!(out, [30, 20, 10, 9]);
    }

    #[test]
    fn test_multibyte_reduction() {
        assert_eq!(ChannelMetaData::reduce_value(&[0x34, 0x12], 1), 0x12);
        assert_eq!(ChannelMetaData::reduce_value(&[0x00, 0x10], 16), 0x01);
        assert_eq!(ChannelMetaData::reduce_value(&[200], 1), 200);
        assert_eq!(ChannelMetaData::reduce_value(&[200], 2), 100);
        assert_eq!(ChannelMetaData::reduce_value(&[200], 0), 200);
    }

    #[test]
    fn test_fit_checks() {
        let texture = ChannelMetaData::for_texture(1);
        assert!(ChannelMetaData::new(1, 2, 0, 0, 0).check_fits(&texture).is_ok());
        assert!(ChannelMetaData::new(3, 1, 0, 1, 2).check_fits(&texture).is_err());
        let wide = ChannelMetaData::for_texture(4);
        assert!(ChannelMetaData::new(3, 1, 0, 1, 5).check_fits(&wide).is_err());
    }

    #[test]
    fn test_background_preset() {
        let texture = ChannelMetaData::for_texture(3);
        assert_eq!(texture.preset_voxel(&[1, 2, 3]), vec![1, 2, 3, 255]);
        assert_eq!(texture.preset_voxel(&[1, 2, 3, 4]), vec![1, 2, 3, 4]);
        assert_eq!(texture.preset_voxel(&[1, 2, 3, 4, 5]), vec![1, 2, 3, 4]);
        let gray = ChannelMetaData::for_texture(1);
        assert_eq!(gray.preset_voxel(&[9, 8, 7]), vec![9]);
    }
}

use super::channel_meta::ChannelMetaData;
use super::error::AcceptorError;
use super::voxel::SpaceSize;

/// Which callbacks an acceptor wants from the loader
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acceptable {
    Mask,
    Channel,
    Both,
}

impl Acceptable {
    pub fn takes_mask(&self) -> bool {
        matches!(self, Self::Mask | Self::Both)
    }

    pub fn takes_channel(&self) -> bool {
        matches!(self, Self::Channel | Self::Both)
    }
}

/// MaskChanAcceptor receives the decoded voxels of a mask/chan pair.
///
/// The loader calls `set_space_size` once per file before any data, `set_channel_meta_data`
/// before any channel data, and `end_data` once the file pair is exhausted. `position` is
/// always the padded-space linear offset of (x, y, z).
pub trait MaskChanAcceptor {
    fn acceptable_inputs(&self) -> Acceptable;

    fn set_space_size(&mut self, space: &SpaceSize) -> Result<(), AcceptorError>;

    fn set_channel_meta_data(&mut self, _meta: &ChannelMetaData) -> Result<(), AcceptorError> {
        Ok(())
    }

    fn add_mask_data(
        &mut self,
        _mask_number: u32,
        _position: u64,
        _x: u64,
        _y: u64,
        _z: u64,
    ) -> Result<(), AcceptorError> {
        Err(AcceptorError::NotAccepted("mask"))
    }

    #[allow(clippy::too_many_arguments)]
    fn add_channel_data(
        &mut self,
        _original_mask_num: u32,
        _channel_bytes: &[u8],
        _position: u64,
        _x: u64,
        _y: u64,
        _z: u64,
        _meta: &ChannelMetaData,
    ) -> Result<(), AcceptorError> {
        Err(AcceptorError::NotAccepted("channel"))
    }

    /// Flush any buffered writes for the current file pair
    fn end_data(&mut self) -> Result<(), AcceptorError> {
        Ok(())
    }
}

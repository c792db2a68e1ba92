use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::assembler::AssemblerSettings;
use super::constants::{DEFAULT_NUM_SLABS, GPU_MULTIBYTE_DIVISIBILITY_VALUE};
use super::error::ConfigError;
use super::renderable::FragmentSizeFilter;

/// Structure representing the application configuration. Contains pathing and build settings
/// Configs are seralizable and deserializable to YAML using serde and serde_yaml
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub board_path: PathBuf,
    pub output_path: PathBuf,
    pub data_root: Option<PathBuf>,
    pub cache_path: Option<PathBuf>,
    pub delete_cached: bool,
    pub slab_count: usize,
    pub axial_divisibility: u64,
    pub max_volume_bytes: Option<u64>,
    pub use_channel_data: bool,
    pub intensity_divisor: u32,
    pub downsample_rate: u64,
    pub min_fragment_voxels: Option<u64>,
    pub max_fragments: Option<usize>,
    pub background_color: Option<[u8; 3]>,
    pub write_hdf5: bool,
}

impl Default for Config {
    /// Generate a new Config object. Paths will be empty/invalid
    fn default() -> Self {
        Self {
            board_path: PathBuf::from("None"),
            output_path: PathBuf::from("None"),
            data_root: None,
            cache_path: None,
            delete_cached: false,
            slab_count: DEFAULT_NUM_SLABS,
            axial_divisibility: GPU_MULTIBYTE_DIVISIBILITY_VALUE,
            max_volume_bytes: None,
            use_channel_data: true,
            intensity_divisor: 1,
            downsample_rate: 1,
            min_fragment_voxels: None,
            max_fragments: None,
            background_color: None,
            write_hdf5: false,
        }
    }
}

impl Config {
    /// Read the configuration in a YAML file
    /// Returns a Config if successful
    pub fn read_config_file(config_path: &Path) -> Result<Self, ConfigError> {
        if !config_path.exists() {
            return Err(ConfigError::BadFilePath(config_path.to_path_buf()));
        }

        let yaml_str = std::fs::read_to_string(config_path)?;

        let config = serde_yaml::from_str::<Self>(&yaml_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Write the configuration to a YAML file
    pub fn write_config_file(&self, config_path: &Path) -> Result<(), ConfigError> {
        let yaml_str = serde_yaml::to_string(self)?;
        std::fs::write(config_path, yaml_str)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.slab_count == 0 {
            return Err(ConfigError::InvalidSetting(String::from(
                "slab_count must be at least 1",
            )));
        }
        if self.axial_divisibility == 0 {
            return Err(ConfigError::InvalidSetting(String::from(
                "axial_divisibility must be at least 1",
            )));
        }
        if self.intensity_divisor == 0 {
            return Err(ConfigError::InvalidSetting(String::from(
                "intensity_divisor must be at least 1",
            )));
        }
        if self.downsample_rate == 0 {
            return Err(ConfigError::InvalidSetting(String::from(
                "downsample_rate must be at least 1",
            )));
        }
        Ok(())
    }

    /// Get the path to the board description, if it exists
    pub fn get_board_file(&self) -> Result<PathBuf, ConfigError> {
        if self.board_path.exists() {
            Ok(self.board_path.clone())
        } else {
            Err(ConfigError::BadFilePath(self.board_path.clone()))
        }
    }

    /// Get the output directory, if it exists
    pub fn get_output_directory(&self) -> Result<PathBuf, ConfigError> {
        if self.output_path.exists() {
            Ok(self.output_path.clone())
        } else {
            Err(ConfigError::BadFilePath(self.output_path.clone()))
        }
    }

    pub fn need_cache_files(&self) -> bool {
        self.cache_path.is_some()
    }

    pub fn delete_cached_files(&self) -> bool {
        self.need_cache_files() && self.delete_cached
    }

    pub fn fragment_filter(&self) -> FragmentSizeFilter {
        FragmentSizeFilter {
            min_voxels: self.min_fragment_voxels,
            max_fragments: self.max_fragments,
        }
    }

    pub fn assembler_settings(&self) -> AssemblerSettings {
        AssemblerSettings {
            slab_count: self.slab_count,
            axial_divisibility: self.axial_divisibility,
            max_volume_bytes: self.max_volume_bytes,
            use_channel_data: self.use_channel_data,
            intensity_divisor: self.intensity_divisor,
            downsample_rate: self.downsample_rate,
            filter: self.fragment_filter(),
            background: self.background_color.map(|color| color.to_vec()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_yaml_is_rejected_and_full_yaml_parses() {
        assert!(serde_yaml::from_str::<Config>("board_path: b.yaml").is_err());

        let yaml = serde_yaml::to_string(&Config::default()).unwrap();
        let mut config: Config = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(config, Config::default());

        config.max_fragments = Some(3);
        config.background_color = Some([1, 2, 3]);
        let settings = config.assembler_settings();
        assert_eq!(settings.filter.max_fragments, Some(3));
        assert_eq!(settings.background, Some(vec![1, 2, 3]));
        assert_eq!(settings.slab_count, DEFAULT_NUM_SLABS);
    }

    #[test]
    fn test_invalid_settings() {
        let config = Config {
            slab_count: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidSetting(_))
        ));
        assert!(Config::default().validate().is_ok());
        assert!(matches!(
            Config::read_config_file(Path::new("/definitely/not/here.yaml")),
            Err(ConfigError::BadFilePath(_))
        ));
    }
}

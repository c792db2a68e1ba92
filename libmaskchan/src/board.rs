use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::error::BoardError;
use super::renderable::{MaskChanRenderableData, RenderMethod, RenderableBean, RenderableKind};
use super::resolver::FileResolver;

fn default_visible() -> bool {
    true
}

/// One entry of a board description
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoardItem {
    pub name: String,
    #[serde(default)]
    pub id: u64,
    #[serde(default)]
    pub kind: RenderableKind,
    /// Mask number of the item in its source data
    #[serde(default)]
    pub mask_number: Option<u32>,
    /// Hex color such as "ff8000" or "#ff8000"
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default = "default_visible")]
    pub visible: bool,
    #[serde(default)]
    pub pass_through: bool,
    #[serde(default)]
    pub mask: Option<String>,
    #[serde(default)]
    pub chan: Option<String>,
}

/// Board is the YAML description of the items composited into one alignment board
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Board {
    pub name: String,
    pub items: Vec<BoardItem>,
}

fn parse_color(item: &BoardItem) -> Result<Option<[u8; 3]>, BoardError> {
    let color = match item.color.as_ref() {
        Some(color) => color,
        None => return Ok(None),
    };
    let bad = || BoardError::BadColor {
        item: item.name.clone(),
        color: color.clone(),
    };
    let hex = color.trim().trim_start_matches('#');
    if hex.len() != 6 || !hex.is_ascii() {
        return Err(bad());
    }
    let mut rgb = [0u8; 3];
    for (idx, channel) in rgb.iter_mut().enumerate() {
        *channel = u8::from_str_radix(&hex[idx * 2..idx * 2 + 2], 16).map_err(|_| bad())?;
    }
    Ok(Some(rgb))
}

impl Board {
    /// Read a board description from a YAML file
    pub fn read_board_file(board_path: &Path) -> Result<Self, BoardError> {
        if !board_path.exists() {
            return Err(BoardError::BadFilePath(board_path.to_path_buf()));
        }
        let yaml_str = std::fs::read_to_string(board_path)?;
        Ok(serde_yaml::from_str::<Self>(&yaml_str)?)
    }

    /// Turn the items into renderables. Items with a mask file get translated mask numbers
    /// 1, 2, 3... in board order; items without one become non-rendering containers.
    pub fn renderables(
        &self,
        resolver: &dyn FileResolver,
    ) -> Result<Vec<MaskChanRenderableData>, BoardError> {
        if self.items.iter().all(|item| item.mask.is_none()) {
            return Err(BoardError::NoRenderableFiles);
        }

        let mut next_num = 1u32;
        let mut renderables = Vec::with_capacity(self.items.len());
        for item in self.items.iter() {
            if item.mask_number == Some(0) {
                return Err(BoardError::BadMaskNumber(item.name.clone()));
            }
            let translated = match item.mask {
                Some(_) => {
                    next_num += 1;
                    next_num - 1
                }
                None => 0,
            };
            let mut bean = RenderableBean::new(item.id, &item.name, item.kind, translated);
            bean.label_file_num = item.mask_number.unwrap_or(translated);
            bean.rgb = parse_color(item)?;
            if !item.visible || translated == 0 {
                bean.render_method = RenderMethod::NonRendering;
            } else if item.pass_through {
                bean.render_method = RenderMethod::PassThrough;
            }

            let mask_path = item
                .mask
                .as_deref()
                .and_then(|name| resolve(resolver, &item.name, name));
            let chan_path = item
                .chan
                .as_deref()
                .and_then(|name| resolve(resolver, &item.name, name));
            renderables.push(MaskChanRenderableData::new(bean, mask_path, chan_path));
        }
        spdlog::info!(
            "Board {} lists {} items, {} with mask files",
            self.name,
            self.items.len(),
            next_num - 1
        );
        Ok(renderables)
    }
}

/// An unresolvable file only costs its item, which the build will drop
fn resolve(resolver: &dyn FileResolver, item: &str, filename: &str) -> Option<PathBuf> {
    match resolver.resolved_filename(filename) {
        Ok(path) => Some(path),
        Err(e) => {
            spdlog::warn!("Could not resolve {} for {}: {}", filename, item, e);
            None
        }
    }
}

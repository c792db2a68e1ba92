use fxhash::FxHashMap;

use super::constants::NON_RENDERING;
use super::multi_mask::MultiMaskTracker;
use super::renderable::RenderableBean;

// Colors handed to renderables which come without one, picked by mask number
const PALETTE: [[u8; 3]; 12] = [
    [255, 0, 0],
    [0, 255, 0],
    [0, 0, 255],
    [255, 255, 0],
    [255, 0, 255],
    [0, 255, 255],
    [255, 128, 0],
    [128, 0, 255],
    [0, 255, 128],
    [255, 0, 128],
    [128, 255, 0],
    [0, 128, 255],
];

pub fn palette_color(mask_number: u32) -> [u8; 3] {
    PALETTE[(mask_number.saturating_sub(1) as usize) % PALETTE.len()]
}

/// RenderMapping is the lookup table the renderer uses to color the mask texture:
/// `[r, g, b, render method]` for every mask number from 0 to the highest one in use.
///
/// Composite ids take the entry of their dominant member, which is the first original mask
/// painted there whose renderable is rendering.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderMapping {
    entries: Vec<[u8; 4]>,
}

impl RenderMapping {
    pub fn build(beans: &[RenderableBean], tracker: &MultiMaskTracker) -> Self {
        let mut originals: FxHashMap<u32, [u8; 4]> = FxHashMap::default();
        for bean in beans.iter().filter(|bean| bean.translated_num > 0) {
            let entry = if bean.render_method.is_rendering() {
                let [r, g, b] = bean.rgb.unwrap_or_else(|| palette_color(bean.translated_num));
                [r, g, b, bean.render_method.code()]
            } else {
                [0, 0, 0, NON_RENDERING]
            };
            originals.insert(bean.translated_num, entry);
        }

        let highest_original = originals.keys().copied().max().unwrap_or(0);
        let highest = tracker
            .highest_mask_num()
            .unwrap_or(0)
            .max(highest_original);
        let mut entries = vec![[0u8; 4]; highest as usize + 1];
        for (number, entry) in originals.iter() {
            entries[*number as usize] = *entry;
        }

        for bean in tracker.sorted_beans() {
            let dominant = bean
                .alt_masks()
                .iter()
                .filter_map(|mask| originals.get(mask))
                .find(|entry| entry[3] != NON_RENDERING);
            if let Some(entry) = dominant {
                entries[bean.multi_mask_num() as usize] = *entry;
            }
        }

        Self { entries }
    }

    pub fn entry(&self, mask_number: u32) -> Option<[u8; 4]> {
        self.entries.get(mask_number as usize).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[[u8; 4]] {
        &self.entries
    }

    /// Flat byte table for upload
    pub fn as_bytes(&self) -> Vec<u8> {
        self.entries.iter().flatten().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderable::{RenderMethod, RenderableKind};

    fn bean(num: u32, rgb: Option<[u8; 3]>, method: RenderMethod) -> RenderableBean {
        let mut bean = RenderableBean::new(num as u64, "item", RenderableKind::NeuronFragment, num);
        bean.rgb = rgb;
        bean.render_method = method;
        bean
    }

    #[test]
    fn test_dominant_member_colors_composite() {
        let beans = vec![
            bean(1, Some([10, 20, 30]), RenderMethod::Fragment),
            bean(2, Some([40, 50, 60]), RenderMethod::Fragment),
            bean(3, None, RenderMethod::NonRendering),
            bean(4, Some([1, 1, 1]), RenderMethod::PassThrough),
        ];
        let mut tracker = MultiMaskTracker::new();
        tracker.set_first_mask_num(5).unwrap();
        // 1 painted first, then 2 on top
        let first = tracker.get_mask(2, 1).unwrap();
        // 3 painted first, 4 on top: the hidden 3 does not count
        let second = tracker.get_mask(4, 3).unwrap();
        // 3 and 3's partner only
        let hidden = tracker.get_mask(3, 2).unwrap();

        let mapping = RenderMapping::build(&beans, &tracker);
        assert_eq!(mapping.len(), 8);
        assert_eq!(mapping.entry(0), Some([0, 0, 0, 0]));
        assert_eq!(mapping.entry(first), Some([10, 20, 30, 1]));
        assert_eq!(mapping.entry(second), Some([1, 1, 1, 3]));
        assert_eq!(mapping.entry(hidden), Some([40, 50, 60, 1]));
        assert_eq!(mapping.entry(3), Some([0, 0, 0, 0]));
        assert_eq!(mapping.as_bytes().len(), 32);
    }

    #[test]
    fn test_composite_of_hidden_masks_is_hidden() {
        let beans = vec![
            bean(1, Some([10, 20, 30]), RenderMethod::NonRendering),
            bean(2, None, RenderMethod::NonRendering),
        ];
        let mut tracker = MultiMaskTracker::new();
        tracker.set_first_mask_num(3).unwrap();
        let composite = tracker.get_mask(1, 2).unwrap();
        let mapping = RenderMapping::build(&beans, &tracker);
        assert_eq!(mapping.entry(composite), Some([0, 0, 0, NON_RENDERING]));
    }

    #[test]
    fn test_palette_fallback() {
        let beans = vec![bean(2, None, RenderMethod::Fragment)];
        let mapping = RenderMapping::build(&beans, &MultiMaskTracker::new());
        assert_eq!(mapping.entry(2), Some([0, 255, 0, 1]));
        assert_eq!(palette_color(13), palette_color(1));
    }
}

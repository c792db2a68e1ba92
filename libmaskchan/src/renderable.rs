use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::path::PathBuf;

use super::constants::{
    COMPARTMENT_RENDERING, FRAGMENT_RENDERING, NON_RENDERING, PASS_THROUGH_RENDERING,
};

/// What kind of item a renderable represents on a board
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderableKind {
    Sample,
    #[default]
    NeuronFragment,
    Compartment,
    ReferenceChannel,
}

impl RenderableKind {
    /// Compartments and reference channels sort after fragments and are never size filtered
    pub fn is_compartment_like(&self) -> bool {
        matches!(self, Self::Compartment | Self::ReferenceChannel)
    }

    /// Only neuron fragments are stored upside down in their mask files
    pub fn inverts_y(&self) -> bool {
        matches!(self, Self::NeuronFragment)
    }
}

/// How the renderer treats voxels of a renderable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderMethod {
    NonRendering,
    #[default]
    Fragment,
    Compartment,
    PassThrough,
}

impl RenderMethod {
    /// Byte stored in the 4th slot of a color mapping entry
    pub fn code(&self) -> u8 {
        match self {
            Self::NonRendering => NON_RENDERING,
            Self::Fragment => FRAGMENT_RENDERING,
            Self::Compartment => COMPARTMENT_RENDERING,
            Self::PassThrough => PASS_THROUGH_RENDERING,
        }
    }

    pub fn is_rendering(&self) -> bool {
        !matches!(self, Self::NonRendering)
    }
}

/// Identity and display attributes of one renderable
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderableBean {
    pub id: u64,
    pub name: String,
    pub kind: RenderableKind,
    /// Mask number of the item in its source data
    pub label_file_num: u32,
    /// Mask number painted into the board volume. 0 means a non-rendering container.
    pub translated_num: u32,
    pub rgb: Option<[u8; 3]>,
    pub render_method: RenderMethod,
    pub voxel_count: u64,
    pub inverted_y: bool,
}

impl RenderableBean {
    pub fn new(id: u64, name: &str, kind: RenderableKind, translated_num: u32) -> Self {
        Self {
            id,
            name: name.to_string(),
            kind,
            label_file_num: translated_num,
            translated_num,
            rgb: None,
            render_method: if kind.is_compartment_like() {
                RenderMethod::Compartment
            } else {
                RenderMethod::Fragment
            },
            voxel_count: 0,
            inverted_y: kind.inverts_y(),
        }
    }

    /// Processing order for a build: fragments first, then larger before smaller, then by
    /// name and mask number so the order never depends on insertion.
    pub fn processing_order(a: &Self, b: &Self) -> Ordering {
        a.kind
            .is_compartment_like()
            .cmp(&b.kind.is_compartment_like())
            .then_with(|| b.voxel_count.cmp(&a.voxel_count))
            .then_with(|| a.name.cmp(&b.name))
            .then_with(|| a.translated_num.cmp(&b.translated_num))
    }
}

/// A renderable together with the files that hold its voxels
#[derive(Debug, Clone, PartialEq)]
pub struct MaskChanRenderableData {
    bean: RenderableBean,
    mask_path: Option<PathBuf>,
    channel_path: Option<PathBuf>,
    compartment: bool,
}

impl MaskChanRenderableData {
    pub fn new(
        bean: RenderableBean,
        mask_path: Option<PathBuf>,
        channel_path: Option<PathBuf>,
    ) -> Self {
        let compartment = bean.kind.is_compartment_like();
        Self {
            bean,
            mask_path,
            channel_path,
            compartment,
        }
    }

    pub fn bean(&self) -> &RenderableBean {
        &self.bean
    }

    pub fn bean_mut(&mut self) -> &mut RenderableBean {
        &mut self.bean
    }

    pub fn into_bean(self) -> RenderableBean {
        self.bean
    }

    pub fn mask_path(&self) -> Option<&PathBuf> {
        self.mask_path.as_ref()
    }

    pub fn channel_path(&self) -> Option<&PathBuf> {
        self.channel_path.as_ref()
    }

    pub fn set_channel_path(&mut self, channel_path: Option<PathBuf>) {
        self.channel_path = channel_path;
    }

    pub fn is_compartment(&self) -> bool {
        self.compartment
    }

    /// Compartment flag first, then the bean order
    pub fn processing_order(a: &Self, b: &Self) -> Ordering {
        a.compartment
            .cmp(&b.compartment)
            .then_with(|| RenderableBean::processing_order(&a.bean, &b.bean))
    }
}

/// Drops small fragments and caps the fragment count. Compartments always pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FragmentSizeFilter {
    pub min_voxels: Option<u64>,
    pub max_fragments: Option<usize>,
}

impl FragmentSizeFilter {
    pub fn is_active(&self) -> bool {
        self.min_voxels.is_some() || self.max_fragments.is_some()
    }

    /// Filter an already sorted list, returning the kept renderables and the names of the
    /// dropped ones.
    pub fn apply(
        &self,
        renderables: Vec<MaskChanRenderableData>,
    ) -> (Vec<MaskChanRenderableData>, Vec<String>) {
        self.apply_by(renderables, |renderable| renderable)
    }

    /// Same as `apply` for anything that carries a renderable
    pub fn apply_by<T, F>(&self, items: Vec<T>, renderable_of: F) -> (Vec<T>, Vec<String>)
    where
        F: Fn(&T) -> &MaskChanRenderableData,
    {
        let mut kept = Vec::with_capacity(items.len());
        let mut dropped = Vec::new();
        let mut fragment_count = 0usize;
        for item in items {
            let renderable = renderable_of(&item);
            if renderable.is_compartment() {
                kept.push(item);
                continue;
            }
            let too_small = self
                .min_voxels
                .is_some_and(|min| renderable.bean().voxel_count < min);
            let too_many = self
                .max_fragments
                .is_some_and(|max| fragment_count >= max);
            if too_small || too_many {
                dropped.push(renderable.bean().name.clone());
            } else {
                fragment_count += 1;
                kept.push(item);
            }
        }
        (kept, dropped)
    }
}

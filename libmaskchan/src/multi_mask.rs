use bit_set::BitSet;
use fxhash::FxHashMap;

use super::constants::{EMPTY_MASK, MAX_MASK_NUMBER};
use super::error::TrackerError;

/// MultiMaskBean is one composite mask id: the original mask numbers folded into it and the
/// number of voxel writes which resolved to it.
#[derive(Debug, Clone)]
pub struct MultiMaskBean {
    multi_mask_num: u32,
    alt_masks: Vec<u32>,
    members: BitSet,
    voxel_count: u64,
}

impl MultiMaskBean {
    fn new(multi_mask_num: u32, existing: u32, incoming: u32) -> Self {
        let mut bean = Self {
            multi_mask_num,
            alt_masks: Vec::new(),
            members: BitSet::new(),
            voxel_count: 1,
        };
        bean.add_alt_mask(existing);
        bean.add_alt_mask(incoming);
        bean
    }

    fn add_alt_mask(&mut self, mask: u32) -> bool {
        if self.members.insert(mask as usize) {
            self.alt_masks.push(mask);
            true
        } else {
            false
        }
    }

    pub fn multi_mask_num(&self) -> u32 {
        self.multi_mask_num
    }

    /// Original masks in the order they were first seen at this composite
    pub fn alt_masks(&self) -> &[u32] {
        &self.alt_masks
    }

    /// The first original mask painted where this composite lives
    pub fn primary_mask(&self) -> u32 {
        self.alt_masks.first().copied().unwrap_or(EMPTY_MASK)
    }

    pub fn contains(&self, mask: u32) -> bool {
        self.members.contains(mask as usize)
    }

    pub fn voxel_count(&self) -> u64 {
        self.voxel_count
    }
}

/// MultiMaskTracker hands out composite mask ids for voxels where more than one original mask
/// lands. One tracker lives for exactly one texture build.
///
/// The same unordered pair of originals always maps to the same composite. A composite which
/// is hit by a further original grows in place and keeps its id.
#[derive(Debug)]
pub struct MultiMaskTracker {
    beans: FxHashMap<u32, MultiMaskBean>,
    pair_ids: FxHashMap<(u32, u32), u32>,
    first_mask_num: Option<u32>,
    next_mask_num: u32,
    ceiling: u32,
}

impl Default for MultiMaskTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl MultiMaskTracker {
    /// Tracker limited to ids which fit the 16-bit mask texture
    pub fn new() -> Self {
        Self::with_ceiling(MAX_MASK_NUMBER)
    }

    pub fn with_ceiling(ceiling: u32) -> Self {
        Self {
            beans: FxHashMap::default(),
            pair_ids: FxHashMap::default(),
            first_mask_num: None,
            next_mask_num: 0,
            ceiling: ceiling.min(u32::MAX - 1),
        }
    }

    /// Set the lowest composite id. Must be greater than every original mask number.
    pub fn set_first_mask_num(&mut self, first: u32) -> Result<(), TrackerError> {
        if first == EMPTY_MASK || first > self.ceiling {
            return Err(TrackerError::InvalidFirstMaskNum(first));
        }
        if !self.beans.is_empty() {
            return Err(TrackerError::FirstMaskNumLocked);
        }
        self.first_mask_num = Some(first);
        self.next_mask_num = first;
        Ok(())
    }

    pub fn first_mask_num(&self) -> Option<u32> {
        self.first_mask_num
    }

    /// Highest id handed out so far, if any
    pub fn highest_mask_num(&self) -> Option<u32> {
        if self.beans.is_empty() {
            None
        } else {
            Some(self.next_mask_num - 1)
        }
    }

    /// Resolve what a voxel currently holding `existing` should hold after `original` is
    /// painted over it.
    pub fn get_mask(&mut self, original: u32, existing: u32) -> Result<u32, TrackerError> {
        let first = self.first_mask_num.ok_or(TrackerError::FirstMaskNumUnset)?;
        if original == EMPTY_MASK {
            return Err(TrackerError::ReservedMaskNumber);
        }
        if original >= first {
            return Err(TrackerError::MaskCollidesWithComposite {
                mask: original,
                first,
            });
        }

        if existing == EMPTY_MASK || existing == original {
            return Ok(original);
        }

        if existing >= first {
            let bean = self
                .beans
                .get_mut(&existing)
                .ok_or(TrackerError::UnknownComposite(existing))?;
            if bean.add_alt_mask(original) {
                spdlog::debug!(
                    "Composite {} expanded with mask {} to {} masks",
                    existing,
                    original,
                    bean.alt_masks.len()
                );
            }
            bean.voxel_count += 1;
            return Ok(existing);
        }

        let key = (existing.min(original), existing.max(original));
        if let Some(id) = self.pair_ids.get(&key) {
            let id = *id;
            if let Some(bean) = self.beans.get_mut(&id) {
                bean.add_alt_mask(existing);
                bean.add_alt_mask(original);
                bean.voxel_count += 1;
            }
            return Ok(id);
        }

        if self.next_mask_num > self.ceiling {
            return Err(TrackerError::CompositeSpaceExhausted {
                ceiling: self.ceiling,
            });
        }
        let id = self.next_mask_num;
        self.next_mask_num += 1;
        self.beans
            .insert(id, MultiMaskBean::new(id, existing, original));
        self.pair_ids.insert(key, id);
        Ok(id)
    }

    /// Number of distinct original masks folded into a composite (0 when unknown)
    pub fn get_mask_expansion_count(&self, multi_mask_num: u32) -> usize {
        self.beans
            .get(&multi_mask_num)
            .map(|bean| bean.alt_masks.len())
            .unwrap_or(0)
    }

    pub fn get_multi_mask_beans(&self) -> &FxHashMap<u32, MultiMaskBean> {
        &self.beans
    }

    pub fn get_bean(&self, multi_mask_num: u32) -> Option<&MultiMaskBean> {
        self.beans.get(&multi_mask_num)
    }

    pub fn is_composite(&self, mask: u32) -> bool {
        self.beans.contains_key(&mask)
    }

    /// Beans ordered by id
    pub fn sorted_beans(&self) -> Vec<&MultiMaskBean> {
        let mut beans: Vec<&MultiMaskBean> = self.beans.values().collect();
        beans.sort_by_key(|bean| bean.multi_mask_num);
        beans
    }
}

//! Capacity-bounded glyph texture atlas with stale-entry replacement.
//!
//! Each atlas owns a `wgpu` texture array: one fixed-size slot per layer,
//! one glyph per slot. Slot bookkeeping is freshness-based: `get` marks an
//! entry fresh, `invalidate()` (once per frame) marks everything stale,
//! and a full atlas replaces the first stale entry it finds — the new
//! glyph inherits the evicted entry's slot. This is deliberately NOT the
//! LRU-tail policy of the generic freshness cache; the two policies
//! coexist, one per cache.

use std::collections::BTreeMap;

use crate::font::RenderedGlyph;

/// Slots per atlas. Bounded by wgpu's default texture array layer limit.
pub const ATLAS_DEPTH: u32 = 256;

/// Metadata for a glyph resident in an atlas slot.
#[derive(Debug, Clone, Copy)]
pub struct GlyphSprite {
    /// Texture array layer holding the bitmap.
    pub slot: u32,
    /// Normalized extent of the glyph within its slot (origin 0,0).
    pub uv_size: [f32; 2],
    pub width: u32,
    pub height: u32,
    /// Horizontal bearing from the pen to the bitmap's left edge.
    pub left: i32,
    /// Vertical bearing from the baseline up to the bitmap's top.
    pub top: i32,
    pub advance: f32,
    pub colored: bool,
}

struct SlotEntry {
    sprite: GlyphSprite,
    fresh: bool,
}

/// Glyph-id → slot bookkeeping, separated from the GPU texture so the
/// replacement policy is testable on its own.
///
/// The ordered map makes the stale scan deterministic: when the atlas is
/// full, the stale entry with the lowest glyph id is always the victim.
pub struct SlotCache {
    capacity: u32,
    /// Next unused slot while the atlas is still filling.
    next_slot: u32,
    entries: BTreeMap<u32, SlotEntry>,
}

impl SlotCache {
    pub fn new(capacity: u32) -> Self {
        Self {
            capacity,
            next_slot: 0,
            entries: BTreeMap::new(),
        }
    }

    /// Look up a glyph, marking its entry fresh on hit.
    pub fn get(&mut self, glyph: u32) -> Option<GlyphSprite> {
        let entry = self.entries.get_mut(&glyph)?;
        entry.fresh = true;
        Some(entry.sprite)
    }

    /// Record a glyph's sprite, returning the slot it was assigned.
    ///
    /// The caller must have verified `!is_full() || contains_stale()`;
    /// violating that is a programming error, not a runtime condition.
    pub fn insert(&mut self, glyph: u32, mut sprite: GlyphSprite) -> u32 {
        assert!(
            !self.is_full() || self.contains_stale(),
            "atlas insert requires free capacity or a stale entry",
        );
        debug_assert!(!self.entries.contains_key(&glyph));

        let slot = if self.is_full() {
            let stale = self
                .entries
                .iter()
                .find(|(_, e)| !e.fresh)
                .map(|(&g, _)| g)
                .expect("staleness verified above");
            let evicted = self.entries.remove(&stale).expect("key just found");
            log::debug!("atlas: glyph {glyph} replaces stale {stale} in slot {}", evicted.sprite.slot);
            evicted.sprite.slot
        } else {
            let s = self.next_slot;
            self.next_slot += 1;
            s
        };

        sprite.slot = slot;
        self.entries.insert(glyph, SlotEntry { sprite, fresh: true });
        slot
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() as u32 == self.capacity
    }

    pub fn contains_stale(&self) -> bool {
        self.entries.values().any(|e| !e.fresh)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Frame boundary: every entry becomes an eviction candidate until it
    /// is touched again.
    pub fn invalidate(&mut self) {
        for entry in self.entries.values_mut() {
            entry.fresh = false;
        }
    }
}

/// GPU-resident atlas: the texture array plus its slot bookkeeping.
pub struct TextureAtlas {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    slot_width: u32,
    slot_height: u32,
    bytes_per_pixel: u32,
    cache: SlotCache,
}

impl TextureAtlas {
    pub fn new(
        device: &wgpu::Device,
        label: &str,
        slot_width: u32,
        slot_height: u32,
        format: wgpu::TextureFormat,
    ) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width: slot_width,
                height: slot_height,
                depth_or_array_layers: ATLAS_DEPTH,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor {
            dimension: Some(wgpu::TextureViewDimension::D2Array),
            ..Default::default()
        });

        let bytes_per_pixel = match format {
            wgpu::TextureFormat::Rgba8Unorm => 4,
            _ => 1,
        };

        Self {
            texture,
            view,
            slot_width,
            slot_height,
            bytes_per_pixel,
            cache: SlotCache::new(ATLAS_DEPTH),
        }
    }

    pub fn view(&self) -> &wgpu::TextureView {
        &self.view
    }

    /// Look up a glyph, marking it fresh on hit. A miss means the caller
    /// must rasterize and `insert`.
    pub fn get(&mut self, glyph: u32) -> Option<GlyphSprite> {
        self.cache.get(glyph)
    }

    /// Whether an insert is currently admissible.
    pub fn has_room_or_stale(&self) -> bool {
        !self.cache.is_full() || self.cache.contains_stale()
    }

    /// Upload a rasterized glyph into a slot and record its sprite.
    /// Precondition as in [`SlotCache::insert`].
    pub fn insert(
        &mut self,
        glyph: u32,
        rendered: &RenderedGlyph,
        queue: &wgpu::Queue,
    ) -> GlyphSprite {
        // Bitmaps are expected to fit the slot; anything larger is cropped
        // at the slot boundary.
        let (data, width, height) = crop_bitmap(
            &rendered.data,
            rendered.width,
            rendered.height,
            self.bytes_per_pixel,
            self.slot_width,
            self.slot_height,
        );

        let sprite = GlyphSprite {
            slot: 0,
            uv_size: [
                width as f32 / self.slot_width as f32,
                height as f32 / self.slot_height as f32,
            ],
            width,
            height,
            left: rendered.left,
            top: rendered.top,
            advance: rendered.advance,
            colored: rendered.colored,
        };
        let slot = self.cache.insert(glyph, sprite);

        if width > 0 && height > 0 {
            queue.write_texture(
                wgpu::TexelCopyTextureInfo {
                    texture: &self.texture,
                    mip_level: 0,
                    origin: wgpu::Origin3d { x: 0, y: 0, z: slot },
                    aspect: wgpu::TextureAspect::All,
                },
                &data,
                wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(width * self.bytes_per_pixel),
                    rows_per_image: Some(height),
                },
                wgpu::Extent3d {
                    width,
                    height,
                    depth_or_array_layers: 1,
                },
            );
        }

        self.cache
            .get(glyph)
            .expect("sprite recorded above")
    }

    pub fn invalidate(&mut self) {
        self.cache.invalidate();
    }
}

/// Clamp a tight-row bitmap to the slot extents.
fn crop_bitmap(
    data: &[u8],
    width: u32,
    height: u32,
    bytes_per_pixel: u32,
    max_width: u32,
    max_height: u32,
) -> (Vec<u8>, u32, u32) {
    if width <= max_width && height <= max_height {
        return (data.to_vec(), width, height);
    }
    let w = width.min(max_width);
    let h = height.min(max_height);
    let src_row = (width * bytes_per_pixel) as usize;
    let dst_row = (w * bytes_per_pixel) as usize;
    let mut cropped = Vec::with_capacity(dst_row * h as usize);
    for row in data.chunks(src_row).take(h as usize) {
        cropped.extend_from_slice(&row[..dst_row]);
    }
    (cropped, w, h)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sprite() -> GlyphSprite {
        GlyphSprite {
            slot: 0,
            uv_size: [0.5, 0.5],
            width: 8,
            height: 10,
            left: 1,
            top: 9,
            advance: 9.0,
            colored: false,
        }
    }

    #[test]
    fn slots_are_monotonic_while_filling() {
        let mut c = SlotCache::new(4);
        for (i, glyph) in [100, 50, 200, 75].into_iter().enumerate() {
            assert_eq!(c.insert(glyph, sprite()), i as u32);
        }
        assert!(c.is_full());
        assert!(!c.contains_stale());
    }

    #[test]
    fn get_miss_and_hit() {
        let mut c = SlotCache::new(2);
        assert!(c.get(7).is_none());
        c.insert(7, sprite());
        let s = c.get(7).expect("hit");
        assert_eq!(s.slot, 0);
        assert_eq!(s.advance, 9.0);
    }

    #[test]
    #[should_panic(expected = "free capacity or a stale entry")]
    fn insert_into_full_all_fresh_atlas_is_a_bug() {
        let mut c = SlotCache::new(2);
        c.insert(1, sprite());
        c.insert(2, sprite());
        c.insert(3, sprite());
    }

    #[test]
    fn replacement_inherits_the_evicted_slot() {
        let mut c = SlotCache::new(3);
        c.insert(10, sprite()); // slot 0
        c.insert(20, sprite()); // slot 1
        c.insert(30, sprite()); // slot 2
        c.invalidate();

        // Touch 20 so it survives; the lowest stale glyph (10) is evicted
        // and its slot 0 is reused exactly.
        assert!(c.get(20).is_some());
        let slot = c.insert(40, sprite());
        assert_eq!(slot, 0);
        assert!(c.get(10).is_none());
        assert_eq!(c.get(40).map(|s| s.slot), Some(0));
        assert_eq!(c.len(), 3);
    }

    #[test]
    fn stale_victim_is_lowest_glyph_id() {
        let mut c = SlotCache::new(3);
        c.insert(30, sprite()); // slot 0
        c.insert(10, sprite()); // slot 1
        c.insert(20, sprite()); // slot 2
        c.invalidate();

        // All three stale: glyph 10 (lowest id) must go first, then 20.
        assert_eq!(c.insert(40, sprite()), 1);
        assert_eq!(c.insert(50, sprite()), 2);
        assert!(c.get(10).is_none());
        assert!(c.get(20).is_none());
        assert!(c.get(30).is_some());
    }

    #[test]
    fn get_refreshes_against_staleness() {
        let mut c = SlotCache::new(2);
        c.insert(1, sprite());
        c.insert(2, sprite());
        c.invalidate();
        assert!(c.contains_stale());

        assert!(c.get(1).is_some());
        assert!(c.get(2).is_some());
        assert!(!c.contains_stale());
    }

    #[test]
    fn crop_bitmap_passes_fitting_bitmaps_through() {
        let data = vec![7u8; 4 * 3];
        let (out, w, h) = crop_bitmap(&data, 4, 3, 1, 8, 8);
        assert_eq!((w, h), (4, 3));
        assert_eq!(out, data);
    }

    #[test]
    fn crop_bitmap_clamps_to_slot() {
        // 4x2 bitmap of row-numbered bytes, cropped to 2x1.
        let data = vec![0, 1, 2, 3, 10, 11, 12, 13];
        let (out, w, h) = crop_bitmap(&data, 4, 2, 1, 2, 1);
        assert_eq!((w, h), (2, 1));
        assert_eq!(out, vec![0, 1]);
    }
}

//! Face collection — owns raw font bytes, computes slot metrics, and
//! rasterizes glyphs through swash.
//!
//! Faces are loaded once at startup in fallback priority order and are
//! immutable afterwards. Raw bytes are kept alive so transient rustybuzz
//! faces can borrow them during shaping.

use std::path::{Path, PathBuf};

use anyhow::{Context as _, bail};
use swash::scale::{Render, ScaleContext, Source, StrikeWith};
use swash::zeno::Format;
use swash::{CacheKey, FontRef};

/// One loaded font face plus the derived per-glyph slot extents.
struct Face {
    /// Raw font file bytes (kept alive for rustybuzz `Face` borrowing).
    data: Vec<u8>,
    /// Face index within a collection file (0 for single-face files).
    index: u32,
    /// swash table offset + cache key for cheap `FontRef` reconstruction.
    offset: u32,
    key: CacheKey,
    /// Whether this face carries color glyphs (emoji).
    colored: bool,
    /// Pixel extents of the atlas slot needed to hold any glyph.
    slot_width: u32,
    slot_height: u32,
}

impl Face {
    fn as_swash(&self) -> FontRef<'_> {
        FontRef {
            data: &self.data,
            offset: self.offset,
            key: self.key,
        }
    }
}

/// A rasterized glyph ready for atlas upload: tight rows, no stride
/// padding, 1 byte per pixel for masks and 4 (RGBA) for color glyphs.
pub struct RenderedGlyph {
    pub width: u32,
    pub height: u32,
    /// Horizontal bearing: offset from the pen to the bitmap's left edge.
    pub left: i32,
    /// Vertical bearing: offset from the baseline up to the bitmap's top.
    pub top: i32,
    pub advance: f32,
    pub colored: bool,
    pub data: Vec<u8>,
}

/// Ordered, immutable-after-load set of font faces.
pub struct FaceCollection {
    faces: Vec<Face>,
    scale_cx: ScaleContext,
    features: Vec<rustybuzz::Feature>,
    /// Nominal glyph size in pixels.
    size: f32,
    /// Distance from a line's top to its baseline, in pixels.
    baseline: usize,
    /// Glyph id for U+FFFD in face 0.
    replacement_glyph: u32,
}

impl FaceCollection {
    /// Load every face file, in priority order. Any unreadable or
    /// unparsable face is a fatal configuration error — rendering with a
    /// missing fallback face is not attempted.
    pub fn load(paths: &[PathBuf], size: f32) -> anyhow::Result<Self> {
        if paths.is_empty() {
            bail!("no font faces configured");
        }

        let mut faces = Vec::with_capacity(paths.len());
        for path in paths {
            faces.push(load_face(path, size)?);
        }

        let primary = faces[0].as_swash();
        let metrics = primary.metrics(&[]).scale(size);
        let baseline = metrics.ascent.ceil().max(size * 0.8) as usize;
        let replacement_glyph = u32::from(primary.charmap().map('\u{FFFD}'));

        log::info!(
            "fonts: loaded {} face(s), primary ascent {:.1}px",
            faces.len(),
            metrics.ascent,
        );

        Ok(Self {
            faces,
            scale_cx: ScaleContext::new(),
            features: shaping_features(),
            size,
            baseline,
            replacement_glyph,
        })
    }

    pub fn len(&self) -> usize {
        self.faces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.faces.is_empty()
    }

    pub fn size(&self) -> f32 {
        self.size
    }

    pub fn baseline(&self) -> usize {
        self.baseline
    }

    pub fn replacement_glyph(&self) -> u32 {
        self.replacement_glyph
    }

    /// OpenType features applied to every shaping run: kerning, standard
    /// and contextual ligatures.
    pub fn features(&self) -> &[rustybuzz::Feature] {
        &self.features
    }

    /// Slot extents for the monochrome atlas: the union over non-color
    /// faces.
    pub fn mono_extents(&self) -> (u32, u32) {
        self.extents_where(|f| !f.colored)
    }

    /// Slot extents for the color atlas: the union over color faces, or
    /// the monochrome extents when no color face is loaded.
    pub fn color_extents(&self) -> (u32, u32) {
        let (w, h) = self.extents_where(|f| f.colored);
        if w == 0 || h == 0 {
            self.mono_extents()
        } else {
            (w, h)
        }
    }

    /// Create transient rustybuzz faces borrowing the stored bytes,
    /// parallel to the face indices.
    pub fn shaping_faces(&self) -> Vec<rustybuzz::Face<'_>> {
        self.faces
            .iter()
            .map(|f| {
                rustybuzz::Face::from_slice(&f.data, f.index).expect("face validated at load")
            })
            .collect()
    }

    /// Rasterize a glyph from the given face at the collection's size.
    ///
    /// Engine-level failure to produce an image for a shaped glyph id is
    /// fatal: it means the face selection and the rasterizer disagree
    /// about the face's contents.
    pub fn rasterize(&mut self, face_index: usize, glyph_id: u32) -> RenderedGlyph {
        let face = &self.faces[face_index];
        let font = face.as_swash();

        let mut scaler = self
            .scale_cx
            .builder(font)
            .size(self.size)
            .hint(true)
            .build();

        let image = Render::new(&[
            Source::ColorBitmap(StrikeWith::BestFit),
            Source::Outline,
        ])
        .format(Format::Alpha)
        .render(&mut scaler, glyph_id as u16)
        .unwrap_or_else(|| {
            panic!("could not render glyph {glyph_id} from face {face_index}")
        });

        let colored = matches!(image.content, swash::scale::image::Content::Color);
        let bytes_per_pixel = if colored { 4 } else { 1 };

        let width = image.placement.width;
        let height = image.placement.height;
        let data = strip_row_padding(
            &image.data,
            height as usize,
            width as usize * bytes_per_pixel,
        );

        let advance = font
            .glyph_metrics(&[])
            .scale(self.size)
            .advance_width(glyph_id as u16);

        RenderedGlyph {
            width,
            height,
            left: image.placement.left,
            top: image.placement.top,
            advance,
            colored,
            data,
        }
    }

    fn extents_where(&self, pred: impl Fn(&Face) -> bool) -> (u32, u32) {
        self.faces
            .iter()
            .filter(|f| pred(f))
            .fold((0, 0), |(w, h), f| {
                (w.max(f.slot_width), h.max(f.slot_height))
            })
    }
}

fn load_face(path: &Path, size: f32) -> anyhow::Result<Face> {
    let data = std::fs::read(path)
        .with_context(|| format!("could not read font {}", path.display()))?;

    let font = FontRef::from_index(&data, 0)
        .with_context(|| format!("could not parse font {}", path.display()))?;
    let offset = font.offset;
    let key = font.key;

    // Validate up front that rustybuzz accepts the face too, so that the
    // transient shaping faces created every frame cannot fail.
    if rustybuzz::Face::from_slice(&data, 0).is_none() {
        bail!("font {} is not shapeable", path.display());
    }

    let colored =
        font.color_palettes().count() > 0 || font.color_strikes().count() > 0;
    let (slot_width, slot_height) = glyph_extents(&font, size);

    log::debug!(
        "fonts: {} colored={colored} slot={slot_width}x{slot_height}",
        path.display(),
    );

    Ok(Face {
        data,
        index: 0,
        offset,
        key,
        colored,
        slot_width,
        slot_height,
    })
}

/// Pixel extents of the smallest atlas slot that holds any glyph of this
/// face at the given size, with headroom for hinting and overshoot.
/// Bitmap-only faces can report degenerate scaled metrics, in which case
/// the nominal size bounds the slot.
fn glyph_extents(font: &FontRef<'_>, size: f32) -> (u32, u32) {
    let m = font.metrics(&[]).scale(size);
    let w = if m.max_width > 0.0 {
        m.max_width * 1.5
    } else {
        size * 1.5
    };
    let h = if m.ascent + m.descent > 0.0 {
        (m.ascent + m.descent) * 1.25
    } else {
        size * 1.5
    };
    (w.ceil().max(size) as u32, h.ceil().max(size) as u32)
}

/// Copy a `rows × pitch` raster buffer into tight `row_bytes`-wide rows.
/// Rasterizer buffers can carry per-row stride padding; only the first
/// `row_bytes` bytes of each row are meaningful for upload.
fn strip_row_padding(data: &[u8], rows: usize, row_bytes: usize) -> Vec<u8> {
    if rows == 0 || row_bytes == 0 {
        return Vec::new();
    }
    let pitch = data.len() / rows;
    if pitch <= row_bytes {
        return data.to_vec();
    }
    let mut tight = Vec::with_capacity(rows * row_bytes);
    for row in data.chunks(pitch).take(rows) {
        tight.extend_from_slice(&row[..row_bytes]);
    }
    tight
}

fn shaping_features() -> Vec<rustybuzz::Feature> {
    const TAGS: [&[u8; 4]; 3] = [b"kern", b"liga", b"clig"];
    TAGS.iter()
        .map(|t| rustybuzz::Feature::new(rustybuzz::ttf_parser::Tag::from_bytes(*t), 1, ..))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::font::discovery;

    fn test_collection() -> Option<FaceCollection> {
        let path = discovery::any_monospace()?;
        FaceCollection::load(&[path], 17.0).ok()
    }

    #[test]
    fn strip_row_padding_removes_stride() {
        // Two rows of three meaningful bytes with one padding byte each.
        let padded = [1, 2, 3, 0, 4, 5, 6, 0];
        assert_eq!(strip_row_padding(&padded, 2, 3), vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn strip_row_padding_passes_tight_buffers_through() {
        let tight = [1, 2, 3, 4, 5, 6];
        assert_eq!(strip_row_padding(&tight, 2, 3), tight.to_vec());
        assert_eq!(strip_row_padding(&tight, 3, 2), tight.to_vec());
    }

    #[test]
    fn strip_row_padding_empty_bitmap() {
        assert!(strip_row_padding(&[], 0, 3).is_empty());
        assert!(strip_row_padding(&[], 2, 0).is_empty());
    }

    #[test]
    fn empty_face_list_is_an_error() {
        assert!(FaceCollection::load(&[], 17.0).is_err());
    }

    #[test]
    fn missing_face_file_is_an_error() {
        let missing = PathBuf::from("/nonexistent/folio-face.ttf");
        assert!(FaceCollection::load(&[missing], 17.0).is_err());
    }

    #[test]
    fn loads_a_system_face() {
        let Some(fc) = test_collection() else { return };
        assert_eq!(fc.len(), 1);
        assert!(fc.baseline() > 0);
        let (w, h) = fc.mono_extents();
        assert!(w > 0 && h > 0);
    }

    #[test]
    fn rasterizes_a_mask_glyph() {
        let Some(mut fc) = test_collection() else { return };
        let glyph = u32::from(fc.faces[0].as_swash().charmap().map('A'));
        assert_ne!(glyph, 0);

        let rendered = fc.rasterize(0, glyph);
        assert!(!rendered.colored);
        assert!(rendered.width > 0 && rendered.height > 0);
        assert_eq!(
            rendered.data.len(),
            (rendered.width * rendered.height) as usize,
        );
        assert!(rendered.advance > 0.0);
    }

    #[test]
    fn shaping_faces_parallel_to_collection() {
        let Some(fc) = test_collection() else { return };
        assert_eq!(fc.shaping_faces().len(), fc.len());
    }
}

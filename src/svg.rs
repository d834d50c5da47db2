//! SVG document wrapper: parsing, rasterization and a single-slot bitmap cache.
//!
//! The cache holds exactly one entry, keyed on `(width, height, scale)`.
//! `scale` is carried as its own key component even though it is currently
//! derived from the canvas zoom — logical zoom and device pixel size are
//! separate concepts, and keeping both avoids stale bitmaps if they ever
//! diverge.

use egui::ColorImage;
use image::RgbaImage;
use rayon::prelude::*;
use std::fs;
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum SvgError {
    #[error("failed to read SVG file: {0}")]
    Read(#[from] std::io::Error),
    #[error("failed to parse SVG")]
    Parse,
    #[error("no SVG document loaded")]
    NoDocument,
    #[error("failed to allocate pixmap for rendering")]
    PixmapAlloc,
}

// ============================================================================
// BITMAP — straight-alpha RGBA output of a render
// ============================================================================

/// A decoded, straight-alpha RGBA bitmap.
///
/// `has_alpha` is always true for rasterizer output; bitmaps without an
/// alpha channel can still occur for imported pixel data and make the whole
/// bounding rectangle count as a hit during hit-testing.
pub struct Bitmap {
    image: RgbaImage,
    has_alpha: bool,
}

impl Bitmap {
    pub fn from_image(image: RgbaImage, has_alpha: bool) -> Self {
        Self { image, has_alpha }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn has_alpha(&self) -> bool {
        self.has_alpha
    }

    /// Alpha value at a pixel, or `None` when the bitmap has no alpha channel.
    /// Out-of-bounds coordinates read as fully transparent.
    pub fn alpha_at(&self, x: u32, y: u32) -> Option<u8> {
        if !self.has_alpha {
            return None;
        }
        if x >= self.image.width() || y >= self.image.height() {
            return Some(0);
        }
        Some(self.image.get_pixel(x, y)[3])
    }

    pub fn as_raw(&self) -> &[u8] {
        self.image.as_raw()
    }

    /// Convert for upload as an egui texture. egui expects straight
    /// (unmultiplied) alpha, which is why renders unpremultiply first.
    pub fn to_color_image(&self) -> ColorImage {
        ColorImage::from_rgba_unmultiplied(
            [self.image.width() as usize, self.image.height() as usize],
            self.image.as_raw(),
        )
    }
}

/// Convert premultiplied RGBA bytes to straight alpha in place, using
/// integer arithmetic only: `c = c * 255 / a` when `a != 0`, and RGB is
/// forced to 0 when `a == 0` (never a division).
pub fn unpremultiply(data: &mut [u8]) {
    data.par_chunks_exact_mut(4).for_each(|px| {
        let a = px[3] as u16;
        if a == 0 {
            px[0] = 0;
            px[1] = 0;
            px[2] = 0;
        } else if a < 255 {
            px[0] = ((px[0] as u16 * 255) / a) as u8;
            px[1] = ((px[1] as u16 * 255) / a) as u8;
            px[2] = ((px[2] as u16 * 255) / a) as u8;
        }
    });
}

// ============================================================================
// SVG DOCUMENT — parsed tree + source text + render cache
// ============================================================================

struct CacheEntry {
    width: u32,
    height: u32,
    scale: f32,
    bitmap: Bitmap,
}

impl CacheEntry {
    fn matches(&self, width: u32, height: u32, scale: f32) -> bool {
        // Exact key match: the cache is valid for one geometry tuple only.
        self.width == width && self.height == height && self.scale.to_bits() == scale.to_bits()
    }
}

/// Owns one parsed SVG document and its single-slot render cache.
///
/// The parsed tree is replaced wholesale on (re)load and never partially
/// mutated here; editors rewrite the retained source text (see [`crate::dom`])
/// and reload, then the dirty flag forces re-rasterization.
pub struct SvgDocument {
    text: String,
    tree: Option<usvg::Tree>,
    dirty: bool,
    cache: Option<CacheEntry>,
    generation: u64,
}

impl Default for SvgDocument {
    fn default() -> Self {
        Self::new()
    }
}

impl SvgDocument {
    pub fn new() -> Self {
        Self {
            text: String::new(),
            tree: None,
            dirty: true,
            cache: None,
            generation: 0,
        }
    }

    /// Load and parse an SVG file (UTF-8). On failure the wrapper holds no
    /// document and rendering fails until a successful reload.
    pub fn load_from_file(&mut self, path: &Path) -> Result<(), SvgError> {
        let text = fs::read_to_string(path)?;
        self.load_from_text(text)
    }

    /// Parse SVG from in-memory text. The source text is retained so the
    /// mutation interface can rewrite it later.
    pub fn load_from_text(&mut self, text: impl Into<String>) -> Result<(), SvgError> {
        self.text = text.into();
        self.tree = None;
        self.dirty = true;
        if self.text.is_empty() {
            return Err(SvgError::Parse);
        }

        let mut options = usvg::Options::default();
        options.fontdb_mut().load_system_fonts();
        let tree = usvg::Tree::from_str(&self.text, &options).map_err(|_| SvgError::Parse)?;
        self.tree = Some(tree);
        Ok(())
    }

    pub fn is_loaded(&self) -> bool {
        self.tree.is_some()
    }

    /// Current SVG source text, or `None` when no document is loaded.
    pub fn document_text(&self) -> Option<&str> {
        self.tree.as_ref().map(|_| self.text.as_str())
    }

    /// Intrinsic document size in SVG user units.
    pub fn intrinsic_size(&self) -> Option<(f32, f32)> {
        self.tree.as_ref().map(|t| {
            let size = t.size();
            (size.width(), size.height())
        })
    }

    /// Invalidate the cache unconditionally. Call after any external
    /// mutation of the document (color or text edits).
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Bumped every time a render actually rasterizes. Lets the canvas keep
    /// GPU textures in sync without comparing pixel data.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Read-only cache probe: the cached bitmap if it is valid for exactly
    /// this geometry tuple and the document is clean. Never renders.
    pub fn cached_bitmap(&self, width: u32, height: u32, scale: f32) -> Option<&Bitmap> {
        match &self.cache {
            Some(entry) if !self.dirty && entry.matches(width, height, scale) => {
                Some(&entry.bitmap)
            }
            _ => None,
        }
    }

    /// Render the document at exactly `width × height` device pixels.
    ///
    /// Returns the cached bitmap unchanged on an exact geometry match with a
    /// clean document; otherwise rasterizes, unpremultiplies, replaces the
    /// cache entry and clears the dirty flag.
    pub fn render(&mut self, width: u32, height: u32, scale: f32) -> Result<&Bitmap, SvgError> {
        let Some(tree) = self.tree.as_ref() else {
            return Err(SvgError::NoDocument);
        };

        let hit = !self.dirty
            && self
                .cache
                .as_ref()
                .is_some_and(|entry| entry.matches(width, height, scale));

        if !hit {
            let bitmap = rasterize(tree, width, height)?;
            self.cache = Some(CacheEntry {
                width,
                height,
                scale,
                bitmap,
            });
            self.dirty = false;
            self.generation = self.generation.wrapping_add(1);
        }

        match &self.cache {
            Some(entry) => Ok(&entry.bitmap),
            // Unreachable: a miss above either stored an entry or returned early.
            None => Err(SvgError::NoDocument),
        }
    }
}

fn rasterize(tree: &usvg::Tree, width: u32, height: u32) -> Result<Bitmap, SvgError> {
    let mut pixmap = tiny_skia::Pixmap::new(width, height).ok_or(SvgError::PixmapAlloc)?;

    // Stretch the intrinsic size to fill the requested pixel box, matching
    // a render-to-bitmap(width, height) contract.
    let size = tree.size();
    let sx = width as f32 / size.width().max(1.0);
    let sy = height as f32 / size.height().max(1.0);
    resvg::render(
        tree,
        tiny_skia::Transform::from_scale(sx, sy),
        &mut pixmap.as_mut(),
    );

    // tiny-skia produces premultiplied RGBA; egui wants straight alpha.
    let mut data = pixmap.take();
    unpremultiply(&mut data);

    let image = RgbaImage::from_raw(width, height, data).ok_or(SvgError::PixmapAlloc)?;
    Ok(Bitmap::from_image(image, true))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const RECT_SVG: &str = r##"<svg xmlns="http://www.w3.org/2000/svg" width="16" height="16">
  <rect x="0" y="0" width="8" height="16" fill="#336699"/>
</svg>"##;

    fn loaded(text: &str) -> SvgDocument {
        let mut doc = SvgDocument::new();
        doc.load_from_text(text).expect("demo SVG parses");
        doc
    }

    #[test]
    fn unpremultiply_uses_integer_math() {
        // Premultiplied (64, 64, 64, 128) → 64*255/128 = 127 (truncating).
        let mut px = [64, 64, 64, 128];
        unpremultiply(&mut px);
        assert_eq!(px, [127, 127, 127, 128]);
    }

    #[test]
    fn unpremultiply_zero_alpha_defines_rgb_as_zero() {
        let mut px = [7, 9, 11, 0];
        unpremultiply(&mut px);
        assert_eq!(px, [0, 0, 0, 0]);
    }

    #[test]
    fn unpremultiply_opaque_pixels_unchanged() {
        let mut px = [12, 34, 56, 255];
        unpremultiply(&mut px);
        assert_eq!(px, [12, 34, 56, 255]);
    }

    #[test]
    fn render_same_tuple_is_a_cache_hit() {
        let mut doc = loaded(RECT_SVG);
        doc.render(32, 32, 2.0).unwrap();
        let generation = doc.generation();
        let first: Vec<u8> = doc.cached_bitmap(32, 32, 2.0).unwrap().as_raw().to_vec();

        let again = doc.render(32, 32, 2.0).unwrap();
        assert_eq!(again.as_raw(), &first[..], "cache hit must be bit-identical");
        assert_eq!(doc.generation(), generation, "cache hit must not rasterize");
    }

    #[test]
    fn mark_dirty_forces_rerender() {
        let mut doc = loaded(RECT_SVG);
        doc.render(32, 32, 2.0).unwrap();
        let generation = doc.generation();

        doc.mark_dirty();
        assert!(doc.cached_bitmap(32, 32, 2.0).is_none());
        doc.render(32, 32, 2.0).unwrap();
        assert_eq!(doc.generation(), generation + 1);
    }

    #[test]
    fn geometry_mismatch_invalidates_probe() {
        let mut doc = loaded(RECT_SVG);
        doc.render(32, 32, 2.0).unwrap();
        assert!(doc.cached_bitmap(32, 32, 2.0).is_some());
        assert!(doc.cached_bitmap(64, 32, 2.0).is_none());
        assert!(doc.cached_bitmap(32, 64, 2.0).is_none());
        assert!(doc.cached_bitmap(32, 32, 1.0).is_none());
    }

    #[test]
    fn scale_is_its_own_cache_key_component() {
        let mut doc = loaded(RECT_SVG);
        doc.render(32, 32, 2.0).unwrap();
        let generation = doc.generation();
        // Same pixel size, different scale: must rasterize again.
        doc.render(32, 32, 1.0).unwrap();
        assert_eq!(doc.generation(), generation + 1);
    }

    #[test]
    fn render_alpha_channel_is_straight() {
        let mut doc = loaded(RECT_SVG);
        let bitmap = doc.render(16, 16, 1.0).unwrap();
        // Left half opaque rect, right half untouched background.
        assert_eq!(bitmap.alpha_at(2, 8), Some(255));
        assert_eq!(bitmap.alpha_at(12, 8), Some(0));
    }

    #[test]
    fn parse_failure_leaves_no_document() {
        let mut doc = SvgDocument::new();
        assert!(doc.load_from_text("this is not xml <<<").is_err());
        assert!(!doc.is_loaded());
        assert!(doc.document_text().is_none());
        assert!(matches!(doc.render(16, 16, 1.0), Err(SvgError::NoDocument)));
    }

    #[test]
    fn zero_size_render_reports_alloc_failure() {
        let mut doc = loaded(RECT_SVG);
        assert!(matches!(doc.render(0, 16, 1.0), Err(SvgError::PixmapAlloc)));
    }

    #[test]
    fn load_from_file_roundtrip() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(RECT_SVG.as_bytes()).unwrap();

        let mut doc = SvgDocument::new();
        doc.load_from_file(file.path()).unwrap();
        assert!(doc.is_loaded());
        assert_eq!(doc.intrinsic_size(), Some((16.0, 16.0)));
    }

    #[test]
    fn load_from_missing_file_fails() {
        let mut doc = SvgDocument::new();
        let err = doc.load_from_file(Path::new("/nonexistent/icon.svg"));
        assert!(matches!(err, Err(SvgError::Read(_))));
        assert!(!doc.is_loaded());
    }
}

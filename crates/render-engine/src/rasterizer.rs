//! Slide rasterizer.
//!
//! Turns a [`SlideSurface`] into a [`SlideSnapshot`] at a requested pixel
//! size. A render attempt with the theme's custom font is tried first, then
//! one with system fonts only. If both fail the caller still gets a bitmap:
//! the degraded placeholder card. Rasterization never returns an error.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use resvg::tiny_skia::{Color, FillRule, FilterQuality, Mask, Pixmap, PixmapPaint, Transform};
use tokslides_project_model::assets::{local_image_id, ImageStore};
use tokslides_project_model::project::ProjectError;
use tracing::{debug, error, warn};

use crate::frame::{rgba_image_to_pixmap, SlideSnapshot, BASE_HEIGHT, BASE_WIDTH};
use crate::placeholder::render_error_pixmap;
use crate::shape::rounded_rect_path;
use crate::surface::{ImageBox, SlideSurface, IMAGE_CORNER_RADIUS};

/// Per-attempt render switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RasterizeOptions {
    /// Load the theme's bundled font file.
    pub custom_fonts: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum RasterizeError {
    #[error("font '{family}' unavailable: {reason}")]
    Font { family: String, reason: String },

    #[error("slide markup rejected: {0}")]
    Markup(String),

    #[error("cannot allocate {width}x{height} bitmap")]
    Allocation { width: u32, height: u32 },

    #[error(transparent)]
    Asset(#[from] ProjectError),
}

/// Backend that draws a surface into a pixmap of exactly `width`×`height`.
pub trait SurfaceRenderer: Send + Sync {
    fn render(
        &self,
        surface: &SlideSurface,
        width: u32,
        height: u32,
        options: RasterizeOptions,
    ) -> Result<Pixmap, RasterizeError>;
}

/// `usvg`/`resvg` renderer with raster images composited on top.
pub struct SvgSurfaceRenderer {
    fonts_dir: Option<PathBuf>,
    images: Option<Arc<dyn ImageStore>>,
    asset_root: Option<PathBuf>,
    system_fonts: Arc<usvg::fontdb::Database>,
    custom_fonts: Mutex<HashMap<PathBuf, Arc<usvg::fontdb::Database>>>,
}

impl SvgSurfaceRenderer {
    /// Renderer backed by the system font database.
    pub fn new() -> Self {
        let mut db = usvg::fontdb::Database::new();
        db.load_system_fonts();
        debug!(faces = db.len(), "Loaded system fonts");
        Self::with_font_database(Arc::new(db))
    }

    pub fn with_font_database(fonts: Arc<usvg::fontdb::Database>) -> Self {
        Self {
            fonts_dir: None,
            images: None,
            asset_root: None,
            system_fonts: fonts,
            custom_fonts: Mutex::new(HashMap::new()),
        }
    }

    /// Directory holding theme font files.
    pub fn with_fonts_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.fonts_dir = Some(dir.into());
        self
    }

    /// Store resolving `local://` image sources.
    pub fn with_image_store(mut self, store: Arc<dyn ImageStore>) -> Self {
        self.images = Some(store);
        self
    }

    /// Directory that relative image paths are resolved against.
    pub fn with_asset_root(mut self, dir: impl Into<PathBuf>) -> Self {
        self.asset_root = Some(dir.into());
        self
    }

    fn font_database(
        &self,
        surface: &SlideSurface,
        options: RasterizeOptions,
    ) -> Result<(Arc<usvg::fontdb::Database>, String), RasterizeError> {
        let font = &surface.theme.font;
        let generic = font.generic.css_name();
        let file = match (&font.file, options.custom_fonts) {
            (Some(file), true) => file,
            _ => return Ok((self.system_fonts.clone(), generic.to_string())),
        };

        let unavailable = |reason: String| RasterizeError::Font {
            family: font.family.clone(),
            reason,
        };
        let dir = self
            .fonts_dir
            .as_ref()
            .ok_or_else(|| unavailable("no fonts directory configured".into()))?;
        let path = dir.join(file);
        let family_list = format!("'{}', {generic}", font.family);

        let mut cache = self
            .custom_fonts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(db) = cache.get(&path) {
            return Ok((db.clone(), family_list));
        }

        let mut db = (*self.system_fonts).clone();
        db.load_font_file(&path)
            .map_err(|e| unavailable(format!("{}: {e}", path.display())))?;
        let registered = db
            .faces()
            .any(|face| face.families.iter().any(|(name, _)| name == &font.family));
        if !registered {
            return Err(unavailable(format!(
                "{} does not provide this family",
                path.display()
            )));
        }

        let db = Arc::new(db);
        cache.insert(path, db.clone());
        Ok((db, family_list))
    }

    fn image_bytes(&self, src: &str) -> Result<Option<Vec<u8>>, RasterizeError> {
        if let Some(id) = local_image_id(src) {
            return match &self.images {
                Some(store) => Ok(store.get(id)?),
                None => Ok(None),
            };
        }
        if src.contains("://") {
            debug!(src, "Remote image sources are not fetched");
            return Ok(None);
        }
        let Some(root) = &self.asset_root else {
            return Ok(None);
        };
        let path = root.join(src);
        match std::fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(ProjectError::IoError { path, source }.into()),
        }
    }

    fn decode_images(&self, surface: &SlideSurface) -> Result<HashMap<String, Pixmap>, RasterizeError> {
        let mut decoded = HashMap::new();
        for src in surface.image_sources() {
            if decoded.contains_key(&src) {
                continue;
            }
            let Some(bytes) = self.image_bytes(&src)? else {
                warn!(src = %src, "Slide image not found");
                continue;
            };
            match image::load_from_memory(&bytes) {
                Ok(img) => {
                    if let Some(pixmap) = rgba_image_to_pixmap(&img.to_rgba8()) {
                        decoded.insert(src, pixmap);
                    }
                }
                Err(e) => warn!(src = %src, error = %e, "Slide image could not be decoded"),
            }
        }
        Ok(decoded)
    }
}

impl Default for SvgSurfaceRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl SurfaceRenderer for SvgSurfaceRenderer {
    fn render(
        &self,
        surface: &SlideSurface,
        width: u32,
        height: u32,
        options: RasterizeOptions,
    ) -> Result<Pixmap, RasterizeError> {
        let (fontdb, family) = self.font_database(surface, options)?;
        let images = self.decode_images(surface)?;
        let layout = surface.layout(&family, |src| {
            images.get(src).map(|p| (p.width(), p.height()))
        });

        let opts = usvg::Options {
            fontdb,
            ..Default::default()
        };
        let tree = usvg::Tree::from_str(&layout.svg, &opts)
            .map_err(|e| RasterizeError::Markup(e.to_string()))?;

        let mut pixmap =
            Pixmap::new(width, height).ok_or(RasterizeError::Allocation { width, height })?;

        // Painted first so a background the SVG renderer drops still shows.
        let fallback = surface.theme.background.fallback_color();
        pixmap.fill(Color::from_rgba8(fallback.r, fallback.g, fallback.b, 255));

        let sx = width as f32 / BASE_WIDTH;
        let sy = height as f32 / BASE_HEIGHT;
        resvg::render(&tree, Transform::from_scale(sx, sy), &mut pixmap.as_mut());

        for image_box in &layout.images {
            if let Some(image) = images.get(&image_box.src) {
                draw_image(&mut pixmap, image, image_box, sx, sy);
            }
        }
        Ok(pixmap)
    }
}

fn draw_image(target: &mut Pixmap, image: &Pixmap, at: &ImageBox, sx: f32, sy: f32) {
    let (x, y) = (at.x * sx, at.y * sy);
    let (w, h) = (at.width * sx, at.height * sy);
    let Some(outline) = rounded_rect_path(x, y, w, h, IMAGE_CORNER_RADIUS * sx.min(sy)) else {
        return;
    };
    let Some(mut clip) = Mask::new(target.width(), target.height()) else {
        return;
    };
    clip.fill_path(&outline, FillRule::Winding, true, Transform::identity());

    let transform = Transform::from_translate(x, y)
        .pre_scale(w / image.width() as f32, h / image.height() as f32);
    target.draw_pixmap(
        0,
        0,
        image.as_ref(),
        &PixmapPaint {
            quality: FilterQuality::Bilinear,
            ..PixmapPaint::default()
        },
        transform,
        Some(&clip),
    );
}

/// Two-attempt rasterization with placeholder fallback.
#[derive(Clone)]
pub struct Rasterizer {
    renderer: Arc<dyn SurfaceRenderer>,
}

impl Rasterizer {
    pub fn new(renderer: Arc<dyn SurfaceRenderer>) -> Self {
        Self { renderer }
    }

    /// Rasterize on the blocking pool.
    pub async fn rasterize(&self, surface: SlideSurface, width: u32, height: u32) -> SlideSnapshot {
        let this = self.clone();
        tokio::task::spawn_blocking(move || this.rasterize_blocking(&surface, width, height))
            .await
            .unwrap_or_else(|e| {
                error!(error = %e, "Rasterization task failed");
                SlideSnapshot::degraded(render_error_pixmap(width, height))
            })
    }

    pub fn rasterize_blocking(&self, surface: &SlideSurface, width: u32, height: u32) -> SlideSnapshot {
        let attempts = [
            RasterizeOptions { custom_fonts: true },
            RasterizeOptions { custom_fonts: false },
        ];
        for (attempt, options) in attempts.into_iter().enumerate() {
            match self.renderer.render(surface, width, height, options) {
                Ok(pixmap) if pixmap.width() == width && pixmap.height() == height => {
                    return SlideSnapshot::new(pixmap);
                }
                Ok(pixmap) => warn!(
                    attempt = attempt + 1,
                    got_width = pixmap.width(),
                    got_height = pixmap.height(),
                    width,
                    height,
                    "Rasterized slide has wrong dimensions"
                ),
                Err(e) => warn!(
                    attempt = attempt + 1,
                    custom_fonts = options.custom_fonts,
                    error = %e,
                    "Slide rasterization failed"
                ),
            }
        }

        error!(
            slide = surface.index + 1,
            "All rasterization attempts failed, using placeholder"
        );
        SlideSnapshot::degraded(render_error_pixmap(width, height))
    }
}

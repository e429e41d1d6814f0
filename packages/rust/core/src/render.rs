//! PDF rendering capability.
//!
//! [`PdfRenderer`] rasterizes single-page notices with pdfium and pulls
//! embedded label images out with lopdf. [`NoRenderer`] does neither; the
//! orchestrator still reuses files already present at the deterministic
//! paths, so earlier renders flow into a run either way.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use image::{DynamicImage, GrayImage, ImageFormat, RgbImage};
use lopdf::{Document, Object};
use pdfium_render::prelude::{PdfRenderConfig, Pdfium};
use tracing::{debug, warn};

use recallbrief_shared::{AppConfig, GlobalId, RecallBriefError, Result};

pub trait DocumentRenderer: Send + Sync {
    /// Render the first page of `pdf` to `dest` (only single-page notices are
    /// rendered). Returns the written path.
    fn render_first_page(
        &self,
        pdf: &Path,
        dest: &Path,
    ) -> impl Future<Output = Option<PathBuf>> + Send;

    /// Extract embedded label images into `images_dir` as `{owner}_{i}.png`,
    /// 1-based, in page order.
    fn extract_images(
        &self,
        pdf: &Path,
        owner: &GlobalId,
        images_dir: &Path,
    ) -> impl Future<Output = Vec<PathBuf>> + Send;
}

/// Renders nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRenderer;

impl DocumentRenderer for NoRenderer {
    async fn render_first_page(&self, _pdf: &Path, _dest: &Path) -> Option<PathBuf> {
        None
    }

    async fn extract_images(&self, _pdf: &Path, _owner: &GlobalId, _images_dir: &Path) -> Vec<PathBuf> {
        Vec::new()
    }
}

// ---------------------------------------------------------------------------
// PdfRenderer
// ---------------------------------------------------------------------------

/// PDF user space is 72 points per inch.
const POINTS_PER_INCH: f32 = 72.0;

/// Bound once per process; the first renderer to ask picks the library path.
static PDFIUM: OnceLock<Option<Pdfium>> = OnceLock::new();

/// Renderer backed by pdfium (page raster) and lopdf (embedded images).
///
/// A missing pdfium library only disables page rendering; image extraction
/// is pure Rust and always available.
#[derive(Debug, Clone)]
pub struct PdfRenderer {
    scale: f32,
    min_image_px: u32,
    pdfium_dir: Option<PathBuf>,
}

impl PdfRenderer {
    pub fn new(page_dpi: u32, min_image_px: u32) -> Self {
        Self {
            scale: page_dpi.max(1) as f32 / POINTS_PER_INCH,
            min_image_px,
            pdfium_dir: None,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        let mut renderer = Self::new(config.render.page_dpi, config.render.min_image_px);
        renderer.pdfium_dir = config.render.pdfium_dir.as_ref().map(PathBuf::from);
        renderer
    }

    fn pdfium(&self) -> Option<&'static Pdfium> {
        PDFIUM
            .get_or_init(|| {
                let bindings = match &self.pdfium_dir {
                    Some(dir) => Pdfium::bind_to_library(
                        Pdfium::pdfium_platform_library_name_at_path(dir),
                    ),
                    None => Pdfium::bind_to_system_library(),
                };
                match bindings {
                    Ok(bindings) => Some(Pdfium::new(bindings)),
                    Err(e) => {
                        warn!(error = %e, "pdfium unavailable, page images will not be rendered");
                        None
                    }
                }
            })
            .as_ref()
    }
}

impl DocumentRenderer for PdfRenderer {
    async fn render_first_page(&self, pdf: &Path, dest: &Path) -> Option<PathBuf> {
        let renderer = self.clone();
        let pdf = pdf.to_path_buf();
        let dest = dest.to_path_buf();

        let result = tokio::task::spawn_blocking(move || {
            let Some(pdfium) = renderer.pdfium() else {
                return Ok(None);
            };
            render_single_page(pdfium, &pdf, &dest, renderer.scale)
        })
        .await
        .unwrap_or_else(|e| Err(RecallBriefError::parse(format!("render task failed: {e}"))));

        match result {
            Ok(Some(path)) => {
                debug!(path = %path.display(), "first page rendered");
                Some(path)
            }
            Ok(None) => None,
            Err(e) => {
                warn!(error = %e, "first page render failed");
                None
            }
        }
    }

    async fn extract_images(&self, pdf: &Path, owner: &GlobalId, images_dir: &Path) -> Vec<PathBuf> {
        let min_px = self.min_image_px;
        let pdf = pdf.to_path_buf();
        let owner = owner.clone();
        let images_dir = images_dir.to_path_buf();

        let result = tokio::task::spawn_blocking(move || {
            extract_embedded(&pdf, &owner, &images_dir, min_px)
        })
        .await
        .unwrap_or_else(|e| Err(RecallBriefError::parse(format!("extract task failed: {e}"))));

        result.unwrap_or_else(|e| {
            warn!(error = %e, "label image extraction failed");
            Vec::new()
        })
    }
}

/// Rasterize the only page of `pdf`. Multi-page documents are left alone.
fn render_single_page(pdfium: &Pdfium, pdf: &Path, dest: &Path, scale: f32) -> Result<Option<PathBuf>> {
    let document = pdfium
        .load_pdf_from_file(pdf, None)
        .map_err(|e| RecallBriefError::parse(format!("{}: {e}", pdf.display())))?;
    let pages = document.pages();
    if pages.len() != 1 {
        debug!(pdf = %pdf.display(), pages = pages.len(), "not a single-page document");
        return Ok(None);
    }

    let page = pages
        .get(0)
        .map_err(|e| RecallBriefError::parse(format!("{}: {e}", pdf.display())))?;
    let bitmap = page
        .render_with_config(&PdfRenderConfig::new().scale_page_by_factor(scale))
        .map_err(|e| RecallBriefError::parse(format!("{}: {e}", pdf.display())))?;

    let (width, height) = (bitmap.width().max(0) as u32, bitmap.height().max(0) as u32);
    let pixels = image::RgbaImage::from_raw(width, height, bitmap.as_rgba_bytes())
        .ok_or_else(|| RecallBriefError::parse("rendered bitmap has an unexpected size"))?;

    write_png(&DynamicImage::ImageRgba8(pixels), dest)?;
    Ok(Some(dest.to_path_buf()))
}

/// Write every embedded RGB or grayscale image of at least `min_px` on both
/// sides as `{owner}_{i}.png`.
fn extract_embedded(pdf: &Path, owner: &GlobalId, images_dir: &Path, min_px: u32) -> Result<Vec<PathBuf>> {
    let document = Document::load(pdf)
        .map_err(|e| RecallBriefError::parse(format!("{}: {e}", pdf.display())))?;

    let mut written = Vec::new();
    for (page_number, page_id) in document.get_pages() {
        let images = match document.get_page_images(page_id) {
            Ok(images) => images,
            Err(e) => {
                warn!(page = page_number, error = %e, "cannot list page images");
                continue;
            }
        };

        for image in images {
            let min = i64::from(min_px);
            if image.width < min || image.height < min {
                continue;
            }
            let embedded = EmbeddedImage {
                id: image.id,
                width: image.width,
                height: image.height,
                color_space: image.color_space.as_deref(),
                filters: image.filters.as_deref().unwrap_or_default(),
                bits_per_component: image.bits_per_component,
                content: image.content,
            };
            let Some(decoded) = embedded.decode(&document) else {
                debug!(page = page_number, object = ?image.id, "unsupported image encoding");
                continue;
            };

            if written.is_empty() {
                std::fs::create_dir_all(images_dir).map_err(|e| RecallBriefError::io(images_dir, e))?;
            }
            let dest = images_dir.join(format!("{owner}_{}.png", written.len() + 1));
            write_png(&decoded, &dest)?;
            written.push(dest);
        }
    }

    debug!(%owner, images = written.len(), "embedded images extracted");
    Ok(written)
}

/// The parts of an image XObject needed to turn it into pixels.
struct EmbeddedImage<'a> {
    id: lopdf::ObjectId,
    width: i64,
    height: i64,
    color_space: Option<&'a str>,
    filters: &'a [String],
    bits_per_component: Option<i64>,
    content: &'a [u8],
}

impl EmbeddedImage<'_> {
    fn decode(&self, document: &Document) -> Option<DynamicImage> {
        if self.color_space == Some("DeviceCMYK") {
            return None;
        }

        if self.filters.iter().any(|f| f == "DCTDecode") {
            let decoded = image::load_from_memory_with_format(self.content, ImageFormat::Jpeg).ok()?;
            return Some(DynamicImage::ImageRgb8(decoded.to_rgb8()));
        }

        if self.bits_per_component.unwrap_or(8) != 8 {
            return None;
        }
        let data = match self.filters {
            [] => self.content.to_vec(),
            [only] if only == "FlateDecode" => document
                .get_object(self.id)
                .and_then(Object::as_stream)
                .and_then(|stream| stream.decompressed_content())
                .ok()?,
            _ => return None,
        };

        let width = u32::try_from(self.width).ok()?;
        let height = u32::try_from(self.height).ok()?;
        let area = width as usize * height as usize;
        let channels = match self.color_space {
            Some("DeviceRGB") => 3,
            Some("DeviceGray") => 1,
            _ if data.len() >= area * 3 => 3,
            _ if data.len() >= area => 1,
            _ => return None,
        };
        if data.len() < area * channels {
            return None;
        }

        let pixels = data[..area * channels].to_vec();
        if channels == 3 {
            RgbImage::from_raw(width, height, pixels).map(DynamicImage::ImageRgb8)
        } else {
            GrayImage::from_raw(width, height, pixels).map(DynamicImage::ImageLuma8)
        }
    }
}

/// Encode next to `dest` and rename into place.
fn write_png(image: &DynamicImage, dest: &Path) -> Result<()> {
    let part = dest.with_extension("png.part");
    image
        .save_with_format(&part, ImageFormat::Png)
        .map_err(|e| RecallBriefError::parse(format!("{}: {e}", dest.display())))?;
    std::fs::rename(&part, dest).map_err(|e| RecallBriefError::io(dest, e))
}

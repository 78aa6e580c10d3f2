//! Normalizes label files into opaque RGB rasters.
//! 將標籤檔案正規化為不透明的 RGB 點陣圖。

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use image::io::Reader as ImageReader;
use image::{ColorType, DynamicImage, Rgb, RgbImage, RgbaImage};
use thiserror::Error;
use tracing::{debug, info};

use crate::artifact::TemporaryArtifact;

const VECTOR_EXTENSION: &str = "svg";
const RASTER_SUFFIX: &str = ".png";

/// Channel layout of a decoded image.
/// 解碼後影像的色彩通道配置。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorMode {
    Rgb,
    Rgba,
    Grayscale,
    GrayscaleAlpha,
}

impl ColorMode {
    fn of(color: ColorType) -> Self {
        match (color.has_color(), color.has_alpha()) {
            (true, true) => ColorMode::Rgba,
            (true, false) => ColorMode::Rgb,
            (false, true) => ColorMode::GrayscaleAlpha,
            (false, false) => ColorMode::Grayscale,
        }
    }

    pub const fn has_alpha(&self) -> bool {
        matches!(self, ColorMode::Rgba | ColorMode::GrayscaleAlpha)
    }
}

/// Fully opaque raster ready for a device or the simulation backend.
/// 可直接送往裝置或模擬後端的完全不透明點陣圖。
#[derive(Debug, Clone)]
pub struct PreparedRaster {
    source_mode: ColorMode,
    pixels: RgbImage,
}

impl PreparedRaster {
    pub fn pixel_width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn pixel_height(&self) -> u32 {
        self.pixels.height()
    }

    /// Always [`ColorMode::Rgb`]; alpha is flattened during preparation.
    pub fn color_mode(&self) -> ColorMode {
        ColorMode::Rgb
    }

    /// Mode the source file was decoded in, before flattening.
    pub fn source_mode(&self) -> ColorMode {
        self.source_mode
    }

    pub fn pixels(&self) -> &RgbImage {
        &self.pixels
    }
}

/// Output of [`ImagePreparer::prepare`]. Dropping it deletes the artifact.
#[derive(Debug)]
pub struct Prepared {
    pub raster: PreparedRaster,
    /// Present only when the source was converted from a vector document.
    pub artifact: Option<TemporaryArtifact>,
}

#[derive(Debug, Error)]
pub enum PrepareError {
    #[error("image file not found: {0}")]
    NotFound(PathBuf),
    #[error("vector rendering is not available for {0}")]
    ConversionUnsupported(PathBuf),
    #[error("failed to convert vector file {path}: {reason}")]
    ConversionFailed { path: PathBuf, reason: String },
    #[error("failed to decode image {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Failure reported by a [`VectorRenderer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VectorRenderError(String);

impl VectorRenderError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

impl fmt::Display for VectorRenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for VectorRenderError {}

/// Rasterizes a vector document into PNG bytes.
/// 將向量文件點陣化為 PNG 位元組。
pub trait VectorRenderer: Send + Sync {
    fn render_png(&self, document: &[u8]) -> Result<Vec<u8>, VectorRenderError>;
}

#[cfg(feature = "svg")]
pub use svg::ResvgRenderer;

#[cfg(feature = "svg")]
mod svg {
    use std::sync::Arc;

    use once_cell::sync::Lazy;
    use resvg::tiny_skia::{Pixmap, Transform};
    use resvg::usvg::{fontdb, Options, Tree};

    use super::{VectorRenderError, VectorRenderer};

    static SYSTEM_FONTS: Lazy<Arc<fontdb::Database>> = Lazy::new(|| {
        let mut database = fontdb::Database::new();
        database.load_system_fonts();
        Arc::new(database)
    });

    /// SVG renderer backed by `resvg`.
    #[derive(Debug, Clone, Copy)]
    pub struct ResvgRenderer {
        scale: f32,
    }

    impl ResvgRenderer {
        /// `scale` is raster pixels per SVG user unit; non-positive values fall back to 1.
        pub fn new(scale: f32) -> Self {
            let scale = if scale.is_finite() && scale > 0.0 {
                scale
            } else {
                1.0
            };
            Self { scale }
        }
    }

    impl Default for ResvgRenderer {
        fn default() -> Self {
            Self::new(1.0)
        }
    }

    impl VectorRenderer for ResvgRenderer {
        fn render_png(&self, document: &[u8]) -> Result<Vec<u8>, VectorRenderError> {
            let mut options = Options::default();
            options.fontdb = SYSTEM_FONTS.clone();
            let tree = Tree::from_data(document, &options)
                .map_err(|err| VectorRenderError::new(format!("invalid SVG: {err}")))?;

            let size = tree.size();
            let width = (size.width() * self.scale).ceil() as u32;
            let height = (size.height() * self.scale).ceil() as u32;
            let mut pixmap = Pixmap::new(width, height).ok_or_else(|| {
                VectorRenderError::new(format!("SVG has an empty canvas ({width}x{height})"))
            })?;
            resvg::render(
                &tree,
                Transform::from_scale(self.scale, self.scale),
                &mut pixmap.as_mut(),
            );
            pixmap
                .encode_png()
                .map_err(|err| VectorRenderError::new(format!("PNG encoding failed: {err}")))
        }
    }
}

/// Turns label files into [`PreparedRaster`]s.
/// 將標籤檔案轉換為 [`PreparedRaster`]。
pub struct ImagePreparer {
    vector: Option<Box<dyn VectorRenderer>>,
    temp_dir: Option<PathBuf>,
}

impl fmt::Debug for ImagePreparer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImagePreparer")
            .field("supports_vector", &self.supports_vector())
            .field("temp_dir", &self.temp_dir)
            .finish()
    }
}

impl Default for ImagePreparer {
    fn default() -> Self {
        Self::new()
    }
}

impl ImagePreparer {
    /// Preparer with the built-in SVG renderer when the `svg` feature is enabled.
    pub fn new() -> Self {
        #[cfg(feature = "svg")]
        {
            Self::with_vector_renderer(ResvgRenderer::default())
        }
        #[cfg(not(feature = "svg"))]
        {
            Self::without_vector_support()
        }
    }

    pub fn without_vector_support() -> Self {
        Self {
            vector: None,
            temp_dir: None,
        }
    }

    pub fn with_vector_renderer(renderer: impl VectorRenderer + 'static) -> Self {
        Self {
            vector: Some(Box::new(renderer)),
            temp_dir: None,
        }
    }

    /// Places conversion artifacts in `dir` instead of the platform temp directory.
    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = Some(dir.into());
        self
    }

    pub fn supports_vector(&self) -> bool {
        self.vector.is_some()
    }

    pub fn prepare(&self, source: &Path) -> Result<Prepared, PrepareError> {
        if !source.exists() {
            return Err(PrepareError::NotFound(source.to_path_buf()));
        }

        if !is_vector(source) {
            let raster = load_raster(source)?;
            return Ok(Prepared {
                raster,
                artifact: None,
            });
        }

        let renderer = self
            .vector
            .as_deref()
            .ok_or_else(|| PrepareError::ConversionUnsupported(source.to_path_buf()))?;
        let document = fs::read(source).map_err(|err| io_error(source, err))?;
        let png = renderer
            .render_png(&document)
            .map_err(|err| conversion_failed(source, err.to_string()))?;
        if png.is_empty() {
            return Err(conversion_failed(source, "renderer produced no output"));
        }

        let artifact = self.reserve_artifact().map_err(|err| io_error(source, err))?;
        fs::write(artifact.path(), &png).map_err(|err| io_error(artifact.path(), err))?;
        let written = fs::metadata(artifact.path())
            .map_err(|err| io_error(artifact.path(), err))?
            .len();
        if written == 0 {
            return Err(conversion_failed(source, "rendered PNG is empty"));
        }

        let raster = load_raster(artifact.path())?;
        info!(
            source = %source.display(),
            width = raster.pixel_width(),
            height = raster.pixel_height(),
            "converted vector label"
        );
        Ok(Prepared {
            raster,
            artifact: Some(artifact),
        })
    }

    fn reserve_artifact(&self) -> io::Result<TemporaryArtifact> {
        match &self.temp_dir {
            Some(dir) => TemporaryArtifact::create_in(dir, RASTER_SUFFIX),
            None => TemporaryArtifact::create(RASTER_SUFFIX),
        }
    }
}

/// True for paths whose extension marks a vector document (case-insensitive).
pub fn is_vector(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(VECTOR_EXTENSION))
}

fn load_raster(path: &Path) -> Result<PreparedRaster, PrepareError> {
    let decoded = ImageReader::open(path)
        .map_err(|err| io_error(path, err))?
        .with_guessed_format()
        .map_err(|err| io_error(path, err))?
        .decode()
        .map_err(|source| PrepareError::Decode {
            path: path.to_path_buf(),
            source,
        })?;
    let source_mode = ColorMode::of(decoded.color());
    debug!(path = %path.display(), mode = ?source_mode, "decoded raster");
    Ok(PreparedRaster {
        source_mode,
        pixels: flatten(decoded, source_mode),
    })
}

fn flatten(image: DynamicImage, mode: ColorMode) -> RgbImage {
    if mode.has_alpha() {
        composite_on_white(&image.to_rgba8())
    } else {
        image.to_rgb8()
    }
}

fn composite_on_white(rgba: &RgbaImage) -> RgbImage {
    RgbImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        let [r, g, b, a] = rgba.get_pixel(x, y).0;
        let blend = |channel: u8| -> u8 {
            let alpha = a as u32;
            ((channel as u32 * alpha + 255 * (255 - alpha) + 127) / 255) as u8
        };
        Rgb([blend(r), blend(g), blend(b)])
    })
}

fn io_error(path: &Path, source: io::Error) -> PrepareError {
    PrepareError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn conversion_failed(path: &Path, reason: impl Into<String>) -> PrepareError {
    PrepareError::ConversionFailed {
        path: path.to_path_buf(),
        reason: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayAlphaImage, LumaA, Rgba};
    use tempfile::tempdir;

    struct BrokenRenderer;

    impl VectorRenderer for BrokenRenderer {
        fn render_png(&self, _document: &[u8]) -> Result<Vec<u8>, VectorRenderError> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn opaque_png_keeps_dimensions() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("label.png");
        RgbImage::from_pixel(400, 200, Rgb([12, 34, 56]))
            .save(&path)
            .expect("write png");

        let prepared = ImagePreparer::without_vector_support()
            .prepare(&path)
            .expect("prepare");
        assert!(prepared.artifact.is_none());
        assert_eq!(prepared.raster.pixel_width(), 400);
        assert_eq!(prepared.raster.pixel_height(), 200);
        assert_eq!(prepared.raster.color_mode(), ColorMode::Rgb);
        assert_eq!(prepared.raster.pixels().get_pixel(5, 5), &Rgb([12, 34, 56]));
    }

    #[test]
    fn rgba_is_flattened_onto_white() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("alpha.png");
        let mut image = RgbaImage::from_pixel(4, 4, Rgba([0, 0, 0, 0]));
        image.put_pixel(1, 1, Rgba([0, 0, 0, 255]));
        image.put_pixel(2, 2, Rgba([0, 0, 0, 128]));
        image.save(&path).expect("write png");

        let prepared = ImagePreparer::without_vector_support()
            .prepare(&path)
            .expect("prepare");
        let pixels = prepared.raster.pixels();
        assert_eq!(prepared.raster.source_mode(), ColorMode::Rgba);
        assert_eq!(pixels.get_pixel(0, 0), &Rgb([255, 255, 255]));
        assert_eq!(pixels.get_pixel(1, 1), &Rgb([0, 0, 0]));
        assert_eq!(pixels.get_pixel(2, 2), &Rgb([127, 127, 127]));
    }

    #[test]
    fn luminance_alpha_is_flattened() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("la.png");
        GrayAlphaImage::from_pixel(3, 2, LumaA([0, 0]))
            .save(&path)
            .expect("write png");

        let prepared = ImagePreparer::without_vector_support()
            .prepare(&path)
            .expect("prepare");
        assert_eq!(prepared.raster.source_mode(), ColorMode::GrayscaleAlpha);
        assert!(prepared
            .raster
            .pixels()
            .pixels()
            .all(|pixel| pixel == &Rgb([255, 255, 255])));
    }

    #[test]
    fn missing_file_is_not_found() {
        let err = ImagePreparer::new()
            .prepare(Path::new("/definitely/not/here.png"))
            .unwrap_err();
        assert!(matches!(err, PrepareError::NotFound(_)));
    }

    #[test]
    fn svg_without_renderer_is_unsupported() {
        let dir = tempdir().expect("tempdir");
        let scratch = tempdir().expect("scratch");
        let path = dir.path().join("label.SVG");
        fs::write(&path, "<svg xmlns='http://www.w3.org/2000/svg' width='10' height='10'/>")
            .expect("write svg");

        let err = ImagePreparer::without_vector_support()
            .with_temp_dir(scratch.path())
            .prepare(&path)
            .unwrap_err();
        assert!(matches!(err, PrepareError::ConversionUnsupported(_)));
        assert_eq!(fs::read_dir(scratch.path()).expect("read").count(), 0);
    }

    #[test]
    fn empty_render_output_fails_conversion() {
        let dir = tempdir().expect("tempdir");
        let scratch = tempdir().expect("scratch");
        let path = dir.path().join("label.svg");
        fs::write(&path, "<svg/>").expect("write svg");

        let err = ImagePreparer::with_vector_renderer(BrokenRenderer)
            .with_temp_dir(scratch.path())
            .prepare(&path)
            .unwrap_err();
        assert!(matches!(err, PrepareError::ConversionFailed { .. }));
        assert_eq!(fs::read_dir(scratch.path()).expect("read").count(), 0);
    }

    #[test]
    fn vector_extension_detection() {
        assert!(is_vector(Path::new("a/b/label.svg")));
        assert!(is_vector(Path::new("LABEL.Svg")));
        assert!(!is_vector(Path::new("label.png")));
        assert!(!is_vector(Path::new("svg")));
    }

    #[cfg(feature = "svg")]
    #[test]
    fn svg_is_rendered_through_an_artifact() {
        let dir = tempdir().expect("tempdir");
        let scratch = tempdir().expect("scratch");
        let path = dir.path().join("label.svg");
        fs::write(
            &path,
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="120" height="40">
                <rect x="10" y="10" width="100" height="20" fill="black"/>
            </svg>"#,
        )
        .expect("write svg");

        let prepared = ImagePreparer::new()
            .with_temp_dir(scratch.path())
            .prepare(&path)
            .expect("prepare");
        assert_eq!(prepared.raster.pixel_width(), 120);
        assert_eq!(prepared.raster.pixel_height(), 40);
        assert_eq!(prepared.raster.pixels().get_pixel(0, 0), &Rgb([255, 255, 255]));
        assert_eq!(prepared.raster.pixels().get_pixel(60, 20), &Rgb([0, 0, 0]));

        let artifact = prepared.artifact.expect("artifact");
        let artifact_path = artifact.path().to_path_buf();
        assert!(artifact_path.starts_with(scratch.path()));
        assert!(artifact_path.exists());
        drop(artifact);
        assert!(!artifact_path.exists());
    }

    #[cfg(feature = "svg")]
    #[test]
    fn malformed_svg_fails_conversion() {
        let dir = tempdir().expect("tempdir");
        let scratch = tempdir().expect("scratch");
        let path = dir.path().join("broken.svg");
        fs::write(&path, "this is not xml").expect("write svg");

        let err = ImagePreparer::new()
            .with_temp_dir(scratch.path())
            .prepare(&path)
            .unwrap_err();
        assert!(matches!(err, PrepareError::ConversionFailed { .. }));
        assert_eq!(fs::read_dir(scratch.path()).expect("read").count(), 0);
    }
}

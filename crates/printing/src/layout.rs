use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};
use thiserror::Error;

use crate::job::Orientation;

/// Printable bounds of one label, in device pixels.
/// 單張標籤的可列印範圍（裝置像素）。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrintableArea {
    pub width_units: u32,
    pub height_units: u32,
}

impl PrintableArea {
    pub const fn new(width_units: u32, height_units: u32) -> Self {
        Self {
            width_units,
            height_units,
        }
    }

    /// Converts a page size in points (1/72") to device pixels at `dpi`.
    pub fn from_points(width_pt: f64, height_pt: f64, dpi: u32) -> Self {
        let to_pixels = |points: f64| (points * dpi as f64 / 72.0).floor().max(0.0) as u32;
        Self {
            width_units: to_pixels(width_pt),
            height_units: to_pixels(height_pt),
        }
    }

    pub const fn is_empty(&self) -> bool {
        self.width_units == 0 || self.height_units == 0
    }
}

/// Scaled, centered rectangle inside a [`PrintableArea`].
/// 在可列印範圍內經縮放並置中的矩形。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LayoutError {
    #[error("raster has a zero dimension ({width}x{height})")]
    InvalidImage { width: u32, height: u32 },
    #[error("printable area has a zero dimension ({width}x{height})")]
    EmptyArea { width: u32, height: u32 },
}

/// Fits a raster into `area`, rotating a quarter turn for landscape.
/// 將點陣圖放入可列印範圍；橫向時先旋轉九十度。
///
/// The raster is shrunk to fit while keeping its aspect ratio but never
/// enlarged. The result is centered, with both the scaled size and the
/// offsets truncated toward zero.
pub fn layout(
    raster_width: u32,
    raster_height: u32,
    area: PrintableArea,
    orientation: Orientation,
) -> Result<Placement, LayoutError> {
    if raster_width == 0 || raster_height == 0 {
        return Err(LayoutError::InvalidImage {
            width: raster_width,
            height: raster_height,
        });
    }
    if area.is_empty() {
        return Err(LayoutError::EmptyArea {
            width: area.width_units,
            height: area.height_units,
        });
    }

    let (effective_width, effective_height) = orientation.oriented(raster_width, raster_height);
    let (width, height) = fit_within(
        effective_width,
        effective_height,
        area.width_units,
        area.height_units,
    );

    Ok(Placement {
        x: (area.width_units - width) / 2,
        y: (area.height_units - height) / 2,
        width,
        height,
    })
}

// Integer arithmetic keeps the limiting side exact; a float scale factor can
// land one pixel short after truncation.
fn fit_within(width: u32, height: u32, max_width: u32, max_height: u32) -> (u32, u32) {
    if width <= max_width && height <= max_height {
        return (width, height);
    }
    let (w, h) = (width as u64, height as u64);
    let (max_w, max_h) = (max_width as u64, max_height as u64);
    let (fitted_w, fitted_h) = if max_w * h <= max_h * w {
        (max_w, h * max_w / w)
    } else {
        (w * max_h / h, max_h)
    };
    (fitted_w.max(1) as u32, fitted_h.max(1) as u32)
}

/// Rotates (for landscape) and resamples `raster` to exactly the placement size.
/// 依方向旋轉並重新取樣成配置大小。
pub fn render_placed(raster: &RgbImage, placement: Placement, orientation: Orientation) -> RgbImage {
    let oriented = match orientation {
        Orientation::Portrait => None,
        Orientation::Landscape => Some(imageops::rotate90(raster)),
    };
    let source = oriented.as_ref().unwrap_or(raster);
    if source.dimensions() == (placement.width, placement.height) {
        return source.clone();
    }
    imageops::resize(source, placement.width, placement.height, FilterType::Triangle)
}

/// Blits a placed raster onto a white page the size of `area`.
pub fn compose_page(placed: &RgbImage, placement: Placement, area: PrintableArea) -> RgbImage {
    let mut page = RgbImage::from_pixel(area.width_units, area.height_units, Rgb([255, 255, 255]));
    imageops::overlay(&mut page, placed, placement.x as i64, placement.y as i64);
    page
}

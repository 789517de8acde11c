//! Canvas compositor: cover-fit, scale, position and clip a photo onto a white canvas.

use anyhow::Context;
use image::{DynamicImage, RgbImage, RgbaImage, imageops::FilterType};

use crate::{
    foundation::{
        core::{Canvas, Placement},
        error::CustomizerResult,
    },
    render::blend::{self, OPAQUE_WHITE},
};

/// Portion of the scaled image that lands on the canvas.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExtractRegion {
    pub left: u32,
    pub top: u32,
    pub width: u32,
    pub height: u32,
}

/// Integer geometry for one placement, computed before any pixel work.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PlacementPlan {
    pub scaled_width: u32,
    pub scaled_height: u32,
    /// Top-left of the scaled image in canvas coordinates; may be negative.
    pub left: i64,
    pub top: i64,
    /// `None` when nothing of the scaled image overlaps the canvas.
    pub extract: Option<ExtractRegion>,
    pub dest_left: u32,
    pub dest_top: u32,
}

/// Compute where the scaled image goes and which part of it survives clipping.
///
/// `placement` is clamped first, so any input yields a valid plan.
pub fn plan_placement(placement: Placement, canvas: Canvas) -> PlacementPlan {
    let p = placement.clamped();
    let cw = i64::from(canvas.width);
    let ch = i64::from(canvas.height);

    let scaled_w = scaled_dim(canvas.width, p.zoom);
    let scaled_h = scaled_dim(canvas.height, p.zoom);

    let center_x = (p.x / 100.0 * cw as f64).round() as i64;
    let center_y = (p.y / 100.0 * ch as f64).round() as i64;
    let left = center_x - i64::from(scaled_w) / 2;
    let top = center_y - i64::from(scaled_h) / 2;

    let extract_left = (-left).max(0);
    let extract_top = (-top).max(0);
    let dest_left = left.max(0);
    let dest_top = top.max(0);

    let width = (i64::from(scaled_w) - extract_left).min(cw - dest_left);
    let height = (i64::from(scaled_h) - extract_top).min(ch - dest_top);

    let extract = (width > 0 && height > 0).then(|| ExtractRegion {
        left: extract_left as u32,
        top: extract_top as u32,
        width: width as u32,
        height: height as u32,
    });

    PlacementPlan {
        scaled_width: scaled_w,
        scaled_height: scaled_h,
        left,
        top,
        extract,
        dest_left: dest_left.min(cw) as u32,
        dest_top: dest_top.min(ch) as u32,
    }
}

fn scaled_dim(canvas_dim: u32, zoom: f64) -> u32 {
    (f64::from(canvas_dim) * zoom).round().max(1.0) as u32
}

/// Decode `source`, place it per `placement` and return the opaque RGB canvas.
#[tracing::instrument(skip(source), fields(bytes = source.len()))]
pub fn transform(
    source: &[u8],
    placement: Placement,
    canvas: Canvas,
) -> CustomizerResult<RgbImage> {
    let decoded = image::load_from_memory(source).context("decode source image")?;
    let placed = place_on_canvas(&decoded, placement, canvas)?;
    Ok(DynamicImage::ImageRgba8(placed).to_rgb8())
}

/// Pixel-level placement on an already decoded image, returned with straight alpha.
pub fn place_on_canvas(
    source: &DynamicImage,
    placement: Placement,
    canvas: Canvas,
) -> CustomizerResult<RgbaImage> {
    let plan = plan_placement(placement, canvas);
    tracing::debug!(?plan, "placement plan");

    let mut out = RgbaImage::from_pixel(canvas.width, canvas.height, image::Rgba(OPAQUE_WHITE));
    let Some(region) = plan.extract else {
        return Ok(out);
    };

    // Cover-fit: fill the scaled box entirely, cropping the source's excess.
    let scaled = source
        .resize_to_fill(plan.scaled_width, plan.scaled_height, FilterType::Lanczos3)
        .to_rgba8();
    let clipped = image::imageops::crop_imm(
        &scaled,
        region.left,
        region.top,
        region.width,
        region.height,
    )
    .to_image();

    blend::over_image_at(&mut out, &clipped, plan.dest_left, plan.dest_top)?;
    Ok(out)
}

#[cfg(test)]
#[path = "../../tests/unit/render/placement.rs"]
mod tests;

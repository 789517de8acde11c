//! Binary alpha masks for the supported outline shapes.
//!
//! Every shape is built as a [`kurbo`] geometry, flattened to polygons and filled with a
//! non-zero winding rule sampled at pixel centers. Output is a single-channel [`GrayImage`]
//! where `255` is inside and `0` is outside; there is no anti-aliasing, so compositing
//! never produces partially transparent fringe pixels.

use std::f64::consts::TAU;

use image::{GrayImage, Luma};
use kurbo::{BezPath, Circle, PathEl, Point, Rect, RoundedRect, Shape as _};

use crate::foundation::{
    core::Shape,
    error::{CustomizerError, CustomizerResult},
};

pub const MASK_INSIDE: u8 = 255;
pub const MASK_OUTSIDE: u8 = 0;

/// Inset of the rounded rectangle, as a fraction of the shorter canvas side.
const RECT_PADDING_FRAC: f64 = 0.08;
/// Corner radius of the rounded rectangle in pixels.
const RECT_CORNER_RADIUS: f64 = 24.0;
/// Space kept around the heart, as a fraction of the shorter canvas side.
const HEART_PADDING_FRAC: f64 = 0.04;
const HEART_SAMPLES: usize = 256;
const FLATTEN_TOLERANCE: f64 = 0.05;

/// Build the alpha mask for `shape` on a `width`x`height` canvas.
pub fn generate_mask(shape: Shape, width: u32, height: u32) -> CustomizerResult<GrayImage> {
    if width == 0 || height == 0 {
        return Err(CustomizerError::validation(format!(
            "mask size must be non-zero, got {width}x{height}"
        )));
    }
    let path = shape_path(shape, f64::from(width), f64::from(height));
    Ok(fill_path(&path, width, height))
}

/// Parse `shape` and build its mask; unknown names fail with [`CustomizerError::InvalidShape`].
pub fn generate_mask_named(shape: &str, width: u32, height: u32) -> CustomizerResult<GrayImage> {
    generate_mask(shape.parse()?, width, height)
}

pub fn shape_path(shape: Shape, w: f64, h: f64) -> BezPath {
    let min = w.min(h);
    match shape {
        Shape::Circle => Circle::new((w / 2.0, h / 2.0), min / 2.0).to_path(FLATTEN_TOLERANCE),
        Shape::Rectangle => {
            let pad = min * RECT_PADDING_FRAC;
            let inner = Rect::new(pad, pad, w - pad, h - pad);
            let radius = RECT_CORNER_RADIUS.min(inner.width().min(inner.height()) / 2.0);
            RoundedRect::from_rect(inner, radius).to_path(FLATTEN_TOLERANCE)
        }
        Shape::Heart => heart_path(w, h),
    }
}

/// The classic parametric heart curve, fitted and centered inside the canvas.
fn heart_path(w: f64, h: f64) -> BezPath {
    let raw: Vec<Point> = (0..HEART_SAMPLES)
        .map(|i| {
            let t = TAU * (i as f64) / (HEART_SAMPLES as f64);
            let x = 16.0 * t.sin().powi(3);
            let y = 13.0 * t.cos() - 5.0 * (2.0 * t).cos() - 2.0 * (3.0 * t).cos() - (4.0 * t).cos();
            // Curve is y-up; canvas is y-down.
            Point::new(x, -y)
        })
        .collect();

    let mut bounds = Rect::from_points(raw[0], raw[0]);
    for p in &raw[1..] {
        bounds = bounds.union_pt(*p);
    }

    let pad = w.min(h) * HEART_PADDING_FRAC;
    let scale = ((w - 2.0 * pad) / bounds.width()).min((h - 2.0 * pad) / bounds.height());
    let offset_x = (w - bounds.width() * scale) / 2.0 - bounds.x0 * scale;
    let offset_y = (h - bounds.height() * scale) / 2.0 - bounds.y0 * scale;

    let mut path = BezPath::new();
    for (i, p) in raw.iter().enumerate() {
        let q = Point::new(p.x * scale + offset_x, p.y * scale + offset_y);
        if i == 0 {
            path.move_to(q);
        } else {
            path.line_to(q);
        }
    }
    path.close_path();
    path
}

struct Edge {
    a: Point,
    b: Point,
}

fn polygon_edges(path: &BezPath) -> Vec<Edge> {
    let mut edges = Vec::new();
    let mut start: Option<Point> = None;
    let mut last: Option<Point> = None;

    kurbo::flatten(path, FLATTEN_TOLERANCE, |el| match el {
        PathEl::MoveTo(p) => {
            if let (Some(s), Some(l)) = (start, last)
                && s != l
            {
                edges.push(Edge { a: l, b: s });
            }
            start = Some(p);
            last = Some(p);
        }
        PathEl::LineTo(p) => {
            if let Some(l) = last {
                edges.push(Edge { a: l, b: p });
            }
            last = Some(p);
        }
        PathEl::ClosePath => {
            if let (Some(s), Some(l)) = (start, last)
                && s != l
            {
                edges.push(Edge { a: l, b: s });
            }
            last = start;
        }
        // flatten only emits lines
        PathEl::QuadTo(..) | PathEl::CurveTo(..) => {}
    });

    if let (Some(s), Some(l)) = (start, last)
        && s != l
    {
        edges.push(Edge { a: l, b: s });
    }
    edges
}

/// Non-zero winding scanline fill, sampled at pixel centers.
fn fill_path(path: &BezPath, width: u32, height: u32) -> GrayImage {
    let edges = polygon_edges(path);
    let mut mask = GrayImage::from_pixel(width, height, Luma([MASK_OUTSIDE]));
    let mut crossings: Vec<(f64, i32)> = Vec::new();

    for row in 0..height {
        let yc = f64::from(row) + 0.5;
        crossings.clear();
        for e in &edges {
            let (dir, lo, hi) = if e.a.y < e.b.y {
                (1, e.a, e.b)
            } else {
                (-1, e.b, e.a)
            };
            if lo.y <= yc && yc < hi.y {
                let t = (yc - lo.y) / (hi.y - lo.y);
                crossings.push((lo.x + t * (hi.x - lo.x), dir));
            }
        }
        crossings.sort_by(|l, r| l.0.total_cmp(&r.0));

        let mut winding = 0;
        for pair in crossings.windows(2) {
            winding += pair[0].1;
            if winding == 0 {
                continue;
            }
            // Pixels whose center lies in [x0, x1).
            let first = (pair[0].0 - 0.5).ceil().max(0.0);
            let end = (pair[1].0 - 0.5).ceil().min(f64::from(width));
            let (first, end) = (first as u32, end as u32);
            for col in first..end.max(first) {
                mask.put_pixel(col, row, Luma([MASK_INSIDE]));
            }
        }
    }
    mask
}

#[cfg(test)]
#[path = "../../tests/unit/render/mask.rs"]
mod tests;

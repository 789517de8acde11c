use image::{GrayImage, RgbaImage};

use crate::foundation::error::{CustomizerError, CustomizerResult};

pub type PremulRgba8 = [u8; 4];

pub const OPAQUE_BLACK: PremulRgba8 = [0, 0, 0, 255];
pub const OPAQUE_WHITE: PremulRgba8 = [255, 255, 255, 255];

/// Porter-Duff source-over on premultiplied pixels.
pub fn over(dst: PremulRgba8, src: PremulRgba8) -> PremulRgba8 {
    if src[3] == 0 {
        return dst;
    }
    if src[3] == 255 {
        return src;
    }

    let inv = 255u16 - u16::from(src[3]);
    let mut out = [0u8; 4];
    for i in 0..4 {
        out[i] = src[i].saturating_add(mul_div255(u16::from(dst[i]), inv));
    }
    out
}

/// Porter-Duff destination-in: keep `dst` where the coverage is opaque.
pub fn dest_in(dst: PremulRgba8, coverage: u8) -> PremulRgba8 {
    let c = u16::from(coverage);
    [
        mul_div255(u16::from(dst[0]), c),
        mul_div255(u16::from(dst[1]), c),
        mul_div255(u16::from(dst[2]), c),
        mul_div255(u16::from(dst[3]), c),
    ]
}

pub fn premultiply(px: [u8; 4]) -> PremulRgba8 {
    let a = u16::from(px[3]);
    [
        mul_div255(u16::from(px[0]), a),
        mul_div255(u16::from(px[1]), a),
        mul_div255(u16::from(px[2]), a),
        px[3],
    ]
}

pub fn unpremultiply(px: PremulRgba8) -> [u8; 4] {
    let a = u32::from(px[3]);
    if a == 0 {
        return [0, 0, 0, 0];
    }
    let un = |c: u8| (((u32::from(c) * 255) + a / 2) / a).min(255) as u8;
    [un(px[0]), un(px[1]), un(px[2]), px[3]]
}

/// Source-over `src` (straight alpha) onto `dst` (straight alpha) with `src`'s top-left at `(left, top)`.
///
/// `src` must lie entirely inside `dst`.
pub fn over_image_at(
    dst: &mut RgbaImage,
    src: &RgbaImage,
    left: u32,
    top: u32,
) -> CustomizerResult<()> {
    let fits_x = left
        .checked_add(src.width())
        .is_some_and(|r| r <= dst.width());
    let fits_y = top
        .checked_add(src.height())
        .is_some_and(|b| b <= dst.height());
    if !fits_x || !fits_y {
        return Err(CustomizerError::validation(format!(
            "overlay {}x{} at ({left},{top}) exceeds {}x{} destination",
            src.width(),
            src.height(),
            dst.width(),
            dst.height()
        )));
    }

    for (x, y, s) in src.enumerate_pixels() {
        let d = dst.get_pixel_mut(left + x, top + y);
        let out = over(premultiply(d.0), premultiply(s.0));
        d.0 = unpremultiply(out);
    }
    Ok(())
}

/// Replace coverage with `mask` (destination-in) and flatten onto an opaque `background`.
pub fn mask_and_flatten(
    src: &RgbaImage,
    mask: &GrayImage,
    background: PremulRgba8,
) -> CustomizerResult<RgbaImage> {
    if src.dimensions() != mask.dimensions() {
        return Err(CustomizerError::validation(format!(
            "mask {}x{} does not match image {}x{}",
            mask.width(),
            mask.height(),
            src.width(),
            src.height()
        )));
    }

    let mut out = RgbaImage::new(src.width(), src.height());
    for ((o, s), m) in out.pixels_mut().zip(src.pixels()).zip(mask.pixels()) {
        let masked = dest_in(premultiply(s.0), m.0[0]);
        o.0 = unpremultiply(over(background, masked));
    }
    Ok(out)
}

fn mul_div255(x: u16, y: u16) -> u8 {
    (((u32::from(x) * u32::from(y)) + 127) / 255) as u8
}

#[cfg(test)]
#[path = "../../tests/unit/render/blend.rs"]
mod tests;

use std::io::Cursor;

use anyhow::Context;
use image::{DynamicImage, ImageFormat, RgbaImage};

use crate::{
    foundation::{
        core::{Canvas, PlacementParams, SourceImage},
        error::{CustomizerError, CustomizerResult},
    },
    render::{
        blend::{self, OPAQUE_BLACK},
        mask, placement,
    },
};

/// Turns an uploaded photo plus placement into the delivered shaped PNG.
///
/// Stateless; one instance can serve any number of concurrent renders.
#[derive(Clone, Copy, Debug, Default)]
pub struct ImagePipeline {
    canvas: Canvas,
}

impl ImagePipeline {
    pub fn new(canvas: Canvas) -> Self {
        Self { canvas }
    }

    pub fn canvas(&self) -> Canvas {
        self.canvas
    }

    /// Render and encode as PNG. Any failure is reported as
    /// [`CustomizerError::ImageProcessingFailed`] tagged with the shape.
    #[tracing::instrument(skip(self, source), fields(shape = %params.shape))]
    pub fn render_shaped_png(
        &self,
        source: &SourceImage,
        params: &PlacementParams,
    ) -> CustomizerResult<Vec<u8>> {
        let shaped = self.render_shaped(source, params)?;
        encode_png(shaped).map_err(|e| wrap(params, e))
    }

    pub fn render_shaped(
        &self,
        source: &SourceImage,
        params: &PlacementParams,
    ) -> CustomizerResult<RgbaImage> {
        let placed = placement::transform(source.bytes(), params.placement, self.canvas)
            .map_err(|e| wrap(params, e))?;
        let alpha = mask::generate_mask(params.shape, self.canvas.width, self.canvas.height)
            .map_err(|e| wrap(params, e))?;
        let rgba = DynamicImage::ImageRgb8(placed).to_rgba8();
        blend::mask_and_flatten(&rgba, &alpha, OPAQUE_BLACK).map_err(|e| wrap(params, e))
    }
}

fn wrap(params: &PlacementParams, err: impl Into<anyhow::Error>) -> CustomizerError {
    CustomizerError::image_processing(params.shape.as_str(), err)
}

pub fn encode_png(img: RgbaImage) -> anyhow::Result<Vec<u8>> {
    let mut buf = Vec::new();
    DynamicImage::ImageRgba8(img)
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .context("encode png")?;
    Ok(buf)
}

#[cfg(test)]
#[path = "../../tests/unit/render/pipeline.rs"]
mod tests;

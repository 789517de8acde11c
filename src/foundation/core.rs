use std::{fmt, str::FromStr};

use crate::foundation::error::{CustomizerError, CustomizerResult};

pub const ZOOM_MIN: f64 = 0.1;
pub const ZOOM_MAX: f64 = 5.0;
pub const PERCENT_MIN: f64 = 0.0;
pub const PERCENT_MAX: f64 = 100.0;

pub const MAX_ID_LEN: usize = 128;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Canvas {
    pub width: u32,
    pub height: u32,
}

impl Canvas {
    pub const DEFAULT: Canvas = Canvas {
        width: 500,
        height: 500,
    };

    pub fn new(width: u32, height: u32) -> CustomizerResult<Self> {
        if width == 0 || height == 0 {
            return Err(CustomizerError::validation(
                "canvas width and height must be > 0",
            ));
        }
        Ok(Self { width, height })
    }

    pub fn min_side(self) -> u32 {
        self.width.min(self.height)
    }
}

impl Default for Canvas {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Decorative outline the rendered photo is clipped to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Shape {
    Circle,
    Heart,
    Rectangle,
}

impl Shape {
    pub const ALL: [Shape; 3] = [Shape::Circle, Shape::Heart, Shape::Rectangle];

    pub fn as_str(self) -> &'static str {
        match self {
            Shape::Circle => "circle",
            Shape::Heart => "heart",
            Shape::Rectangle => "rectangle",
        }
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Shape {
    type Err = CustomizerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "circle" => Ok(Shape::Circle),
            "heart" => Ok(Shape::Heart),
            "rectangle" => Ok(Shape::Rectangle),
            _ => Err(CustomizerError::invalid_shape(s)),
        }
    }
}

/// Photo position on the output canvas.
///
/// `x`/`y` are center-based percentages (50 = canvas center), `zoom` scales the
/// cover-fit source relative to the canvas.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Placement {
    pub x: f64,
    pub y: f64,
    pub zoom: f64,
}

impl Placement {
    pub const CENTERED: Placement = Placement {
        x: 50.0,
        y: 50.0,
        zoom: 1.0,
    };

    /// Lower every component into its legal range. Idempotent.
    pub fn clamped(self) -> Self {
        Self {
            x: self.x.clamp(PERCENT_MIN, PERCENT_MAX),
            y: self.y.clamp(PERCENT_MIN, PERCENT_MAX),
            zoom: self.zoom.clamp(ZOOM_MIN, ZOOM_MAX),
        }
    }
}

impl Default for Placement {
    fn default() -> Self {
        Self::CENTERED
    }
}

#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PlacementParams {
    #[serde(flatten)]
    pub placement: Placement,
    pub shape: Shape,
}

impl PlacementParams {
    pub fn new(placement: Placement, shape: Shape) -> Self {
        Self {
            placement: placement.clamped(),
            shape,
        }
    }
}

/// Placement fields as they arrive from a form: all optional, all text.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct RawPlacement {
    pub x: Option<String>,
    pub y: Option<String>,
    pub zoom: Option<String>,
    pub shape: Option<String>,
}

impl RawPlacement {
    /// Parse and clamp. Missing or unparsable fields fail; out-of-range values are clamped.
    pub fn into_params(self) -> CustomizerResult<PlacementParams> {
        let x = parse_number("x", self.x.as_deref())?;
        let y = parse_number("y", self.y.as_deref())?;
        let zoom = parse_number("zoom", self.zoom.as_deref())?;
        let shape = self
            .shape
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| CustomizerError::validation("missing field 'shape'"))?
            .parse::<Shape>()?;

        Ok(PlacementParams::new(Placement { x, y, zoom }, shape))
    }
}

fn parse_number(field: &str, raw: Option<&str>) -> CustomizerResult<f64> {
    let raw = raw
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| CustomizerError::validation(format!("missing field '{field}'")))?;
    let v: f64 = raw.parse().map_err(|_| {
        CustomizerError::validation(format!("field '{field}' is not a number: '{raw}'"))
    })?;
    if !v.is_finite() {
        return Err(CustomizerError::validation(format!(
            "field '{field}' must be finite"
        )));
    }
    Ok(v)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ImageMime {
    #[serde(rename = "image/png")]
    Png,
    #[serde(rename = "image/jpeg")]
    Jpeg,
}

impl ImageMime {
    pub fn as_str(self) -> &'static str {
        match self {
            ImageMime::Png => "image/png",
            ImageMime::Jpeg => "image/jpeg",
        }
    }
}

impl FromStr for ImageMime {
    type Err = CustomizerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "image/png" => Ok(ImageMime::Png),
            "image/jpeg" | "image/jpg" => Ok(ImageMime::Jpeg),
            other => Err(CustomizerError::validation(format!(
                "unsupported image type '{other}' (expected image/png or image/jpeg)"
            ))),
        }
    }
}

/// Uploaded photo bytes plus the declared MIME type.
#[derive(Clone, Debug)]
pub struct SourceImage {
    bytes: Vec<u8>,
    mime: ImageMime,
}

impl SourceImage {
    pub fn new(bytes: Vec<u8>, mime: &str) -> CustomizerResult<Self> {
        let mime = mime.parse()?;
        if bytes.is_empty() {
            return Err(CustomizerError::validation("image payload is empty"));
        }
        Ok(Self { bytes, mime })
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn mime(&self) -> ImageMime {
        self.mime
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

/// Session ids become the leading folder segment, so `-` is reserved as separator.
pub fn validate_session_id(id: &str) -> CustomizerResult<()> {
    validate_id("session id", id, |c| c.is_ascii_alphanumeric() || c == '_')
}

pub fn validate_product_id(id: &str) -> CustomizerResult<()> {
    validate_id("product id", id, |c| {
        c.is_ascii_alphanumeric() || c == '_' || c == '-'
    })
}

/// Asset names must stay inside their folder.
pub fn validate_file_name(name: &str) -> CustomizerResult<()> {
    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
        return Err(CustomizerError::validation(format!(
            "invalid asset file name '{name}'"
        )));
    }
    Ok(())
}

fn validate_id(what: &str, id: &str, allowed: impl Fn(char) -> bool) -> CustomizerResult<()> {
    if id.is_empty() {
        return Err(CustomizerError::validation(format!("missing {what}")));
    }
    if id.len() > MAX_ID_LEN {
        return Err(CustomizerError::validation(format!(
            "{what} longer than {MAX_ID_LEN} characters"
        )));
    }
    if let Some(bad) = id.chars().find(|c| !allowed(*c)) {
        return Err(CustomizerError::validation(format!(
            "{what} '{id}' contains invalid character '{bad}'"
        )));
    }
    Ok(())
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/core.rs"]
mod tests;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use image::RgbImage;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::shared::color::{Color, ColorParseError};
use crate::shared::constants::{DEFAULT_TRACK_LINE_WIDTH, MAX_BLUR_RADIUS};

/// One queued visual transform targeting a face box.
///
/// Descriptors are interpreted by a [`FilterRenderer`] backend; they carry
/// no rendering state of their own.
///
/// [`FilterRenderer`]: crate::filtering::domain::filter_renderer::FilterRenderer
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum FaceFilter {
    /// Gaussian blur with standard deviation `radius` pixels.
    Blur { radius: f32 },
    /// Stroke along the inside edge of the face box.
    Outline { color: Color, width: u32 },
    Greyscale,
    /// Mosaic of `block` x `block` pixel cells.
    Pixelate { block: u32 },
    /// Draws `image` resized to the face box.
    #[serde(skip)]
    Replace { image: Arc<RgbImage> },
}

/// Options for an outline ("track") filter.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TrackOptions {
    pub stroke: Color,
    pub line_width: u32,
}

impl Default for TrackOptions {
    fn default() -> Self {
        Self {
            stroke: Color::WHITE,
            line_width: DEFAULT_TRACK_LINE_WIDTH,
        }
    }
}

impl From<TrackOptions> for FaceFilter {
    fn from(opts: TrackOptions) -> Self {
        FaceFilter::Outline {
            color: opts.stroke,
            width: opts.line_width,
        }
    }
}

#[derive(Error, Debug, PartialEq)]
pub enum FilterError {
    #[error("blur radius must be in (0, 250], got {0}")]
    BlurRadius(f32),
    #[error("outline width must be at least 1")]
    OutlineWidth,
    #[error("pixelate block must be at least 2, got {0}")]
    PixelateBlock(u32),
    #[error("replacement image is empty")]
    EmptyReplacement,
    #[error("unknown filter '{0}' (expected blur, outline, greyscale or pixelate)")]
    UnknownKind(String),
    #[error("filter '{spec}' takes {expected}")]
    Arguments { spec: String, expected: &'static str },
    #[error("invalid number '{0}' in filter")]
    Number(String),
    #[error(transparent)]
    Color(#[from] ColorParseError),
}

impl FaceFilter {
    pub fn blur(radius: f32) -> Self {
        FaceFilter::Blur { radius }
    }

    pub fn outline(color: Color, width: u32) -> Self {
        FaceFilter::Outline { color, width }
    }

    pub fn replace(image: RgbImage) -> Self {
        FaceFilter::Replace {
            image: Arc::new(image),
        }
    }

    /// Short name used in log messages.
    pub fn kind(&self) -> &'static str {
        match self {
            FaceFilter::Blur { .. } => "blur",
            FaceFilter::Outline { .. } => "outline",
            FaceFilter::Greyscale => "greyscale",
            FaceFilter::Pixelate { .. } => "pixelate",
            FaceFilter::Replace { .. } => "replace",
        }
    }

    pub fn validate(&self) -> Result<(), FilterError> {
        match self {
            FaceFilter::Blur { radius } => {
                if !(*radius > 0.0 && *radius <= MAX_BLUR_RADIUS) {
                    return Err(FilterError::BlurRadius(*radius));
                }
            }
            FaceFilter::Outline { width, .. } => {
                if *width == 0 {
                    return Err(FilterError::OutlineWidth);
                }
            }
            FaceFilter::Pixelate { block } => {
                if *block < 2 {
                    return Err(FilterError::PixelateBlock(*block));
                }
            }
            FaceFilter::Replace { image } => {
                if image.width() == 0 || image.height() == 0 {
                    return Err(FilterError::EmptyReplacement);
                }
            }
            FaceFilter::Greyscale => {}
        }
        Ok(())
    }
}

/// Parses `blur:8`, `outline`, `outline:red`, `outline:#00ff00:2`,
/// `greyscale` (or `grayscale`) and `pixelate:12`.
///
/// Replacement filters need an image and cannot be parsed from text.
impl FromStr for FaceFilter {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.trim().split(':').map(str::trim);
        let kind = parts.next().unwrap_or_default().to_ascii_lowercase();
        let args: Vec<&str> = parts.collect();
        let arity = |max: usize, expected: &'static str| {
            if args.len() > max {
                Err(FilterError::Arguments {
                    spec: s.to_string(),
                    expected,
                })
            } else {
                Ok(())
            }
        };

        let filter = match kind.as_str() {
            "blur" => {
                arity(1, "one radius, e.g. blur:8")?;
                let radius = args.first().ok_or_else(|| FilterError::Arguments {
                    spec: s.to_string(),
                    expected: "one radius, e.g. blur:8",
                })?;
                FaceFilter::Blur {
                    radius: parse_number(radius)?,
                }
            }
            "outline" | "track" => {
                arity(2, "an optional color and width, e.g. outline:white:3")?;
                let defaults = TrackOptions::default();
                let color = match args.first() {
                    Some(c) => c.parse()?,
                    None => defaults.stroke,
                };
                let width = match args.get(1) {
                    Some(w) => parse_number(w)?,
                    None => defaults.line_width,
                };
                FaceFilter::Outline { color, width }
            }
            "greyscale" | "grayscale" => {
                arity(0, "no arguments")?;
                FaceFilter::Greyscale
            }
            "pixelate" => {
                arity(1, "one block size, e.g. pixelate:12")?;
                let block = args.first().ok_or_else(|| FilterError::Arguments {
                    spec: s.to_string(),
                    expected: "one block size, e.g. pixelate:12",
                })?;
                FaceFilter::Pixelate {
                    block: parse_number(block)?,
                }
            }
            _ => return Err(FilterError::UnknownKind(kind.clone())),
        };
        filter.validate()?;
        Ok(filter)
    }
}

fn parse_number<T: FromStr>(s: &str) -> Result<T, FilterError> {
    s.parse().map_err(|_| FilterError::Number(s.to_string()))
}

impl fmt::Display for FaceFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FaceFilter::Blur { radius } => write!(f, "blur({radius})"),
            FaceFilter::Outline { color, width } => write!(f, "outline({color},{width})"),
            FaceFilter::Greyscale => write!(f, "greyscale"),
            FaceFilter::Pixelate { block } => write!(f, "pixelate({block})"),
            FaceFilter::Replace { image } => {
                write!(f, "replace({}x{})", image.width(), image.height())
            }
        }
    }
}

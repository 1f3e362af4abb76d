use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Detector-reported face bounding box, in frame pixels.
///
/// Never mutated after detection: filters read it as drawing coordinates
/// and the session keys filter lists by the face it belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Region {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

#[derive(Error, Debug, PartialEq)]
pub enum RegionParseError {
    #[error("expected 4 comma-separated values (x,y,w,h), got '{0}'")]
    Arity(String),
    #[error("invalid number '{0}' in region")]
    Number(String),
    #[error("region '{0}' has a non-positive size")]
    Empty(String),
}

impl Region {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    /// Intersection with a `frame_w` x `frame_h` frame.
    ///
    /// Returns a zero-sized region anchored at the clamped origin when the
    /// box lies entirely outside the frame.
    pub fn clamp_to(&self, frame_w: u32, frame_h: u32) -> Region {
        let fw = frame_w.min(i32::MAX as u32) as i32;
        let fh = frame_h.min(i32::MAX as u32) as i32;
        let x1 = self.x.clamp(0, fw);
        let y1 = self.y.clamp(0, fh);
        let x2 = self.x.saturating_add(self.width.max(0)).clamp(0, fw);
        let y2 = self.y.saturating_add(self.height.max(0)).clamp(0, fh);
        Region::new(x1, y1, (x2 - x1).max(0), (y2 - y1).max(0))
    }

    /// Parses a `;`-separated list of `x,y,w,h` boxes.
    pub fn parse_list(s: &str) -> Result<Vec<Region>, RegionParseError> {
        s.split(';')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(str::parse)
            .collect()
    }
}

impl FromStr for Region {
    type Err = RegionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(',').map(str::trim).collect();
        if parts.len() != 4 {
            return Err(RegionParseError::Arity(s.to_string()));
        }
        let mut values = [0i32; 4];
        for (slot, part) in values.iter_mut().zip(&parts) {
            *slot = part
                .parse()
                .map_err(|_| RegionParseError::Number(part.to_string()))?;
        }
        let region = Region::new(values[0], values[1], values[2], values[3]);
        if region.is_empty() {
            return Err(RegionParseError::Empty(s.to_string()));
        }
        Ok(region)
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}+{}+{}", self.width, self.height, self.x, self.y)
    }
}

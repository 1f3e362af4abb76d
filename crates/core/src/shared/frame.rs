use image::RgbImage;
use ndarray::{ArrayView3, ArrayViewMut3};

use crate::shared::region::Region;

/// A single image/video frame: contiguous RGB bytes in row-major order.
///
/// Format conversion happens at I/O boundaries only; the filtering layer
/// works on crops of this buffer and pastes them back.
#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    data: Vec<u8>,
    width: u32,
    height: u32,
    channels: u8,
    index: usize,
}

impl Frame {
    pub fn new(data: Vec<u8>, width: u32, height: u32, channels: u8, index: usize) -> Self {
        debug_assert_eq!(
            data.len(),
            (width as usize) * (height as usize) * (channels as usize),
            "data length must equal width * height * channels"
        );
        Self {
            data,
            width,
            height,
            channels,
            index,
        }
    }

    /// Wraps a decoded RGB image without copying its pixels.
    pub fn from_rgb_image(image: RgbImage, index: usize) -> Self {
        let (width, height) = image.dimensions();
        Self::new(image.into_raw(), width, height, 3, index)
    }

    /// Copies the pixels into an `RgbImage`. Returns `None` for non-RGB frames.
    pub fn to_rgb_image(&self) -> Option<RgbImage> {
        if self.channels != 3 {
            return None;
        }
        RgbImage::from_raw(self.width, self.height, self.data.clone())
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> u8 {
        self.channels
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Pixel at `(x, y)` as a channel slice.
    pub fn pixel(&self, x: u32, y: u32) -> &[u8] {
        let ch = self.channels as usize;
        let offset = (y as usize * self.width as usize + x as usize) * ch;
        &self.data[offset..offset + ch]
    }

    /// Copies the part of `region` that lies inside the frame into a new frame.
    ///
    /// The crop keeps this frame's index. An out-of-frame region yields an
    /// empty (0x0) frame.
    pub fn crop(&self, region: &Region) -> Frame {
        let r = region.clamp_to(self.width, self.height);
        if r.is_empty() {
            return Frame::new(Vec::new(), 0, 0, self.channels, self.index);
        }
        let ch = self.channels as usize;
        let (rx, ry) = (r.x as usize, r.y as usize);
        let (rw, rh) = (r.width as usize, r.height as usize);
        let row_len = rw * ch;

        let mut out = Vec::with_capacity(rh * row_len);
        for row in ry..ry + rh {
            let start = (row * self.width as usize + rx) * ch;
            out.extend_from_slice(&self.data[start..start + row_len]);
        }
        Frame::new(out, rw as u32, rh as u32, self.channels, self.index)
    }

    /// Draws `patch` with its top-left corner at `(x, y)`.
    ///
    /// Rows and columns falling outside the frame are dropped. The patch
    /// must have the same channel count as the frame.
    pub fn paste(&mut self, patch: &Frame, x: i32, y: i32) {
        debug_assert_eq!(patch.channels, self.channels, "channel count mismatch");
        let ch = self.channels as usize;
        let target = Region::new(x, y, patch.width as i32, patch.height as i32)
            .clamp_to(self.width, self.height);
        if target.is_empty() {
            return;
        }
        let skip_x = (target.x - x) as usize;
        let skip_y = (target.y - y) as usize;
        let row_len = target.width as usize * ch;

        for row in 0..target.height as usize {
            let src = ((skip_y + row) * patch.width as usize + skip_x) * ch;
            let dst = ((target.y as usize + row) * self.width as usize + target.x as usize) * ch;
            self.data[dst..dst + row_len].copy_from_slice(&patch.data[src..src + row_len]);
        }
    }

    pub fn as_ndarray(&self) -> ArrayView3<'_, u8> {
        ArrayView3::from_shape(self.shape(), &self.data)
            .expect("Frame data length must match dimensions")
    }

    pub fn as_ndarray_mut(&mut self) -> ArrayViewMut3<'_, u8> {
        ArrayViewMut3::from_shape(self.shape(), &mut self.data)
            .expect("Frame data length must match dimensions")
    }

    fn shape(&self) -> (usize, usize, usize) {
        (
            self.height as usize,
            self.width as usize,
            self.channels as usize,
        )
    }
}

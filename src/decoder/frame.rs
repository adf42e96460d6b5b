use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::FrameError;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum PixelFormat {
    /// Planar YUV 4:2:0, limited (studio) range.
    Yuv420p,
    /// Planar YUV 4:2:0, full (jpeg) range.
    Yuvj420p,
}

/// Position and resolution of one plane inside a packed YUV420 buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PlaneLayout {
    pub width: u32,
    pub height: u32,
    pub offset: usize,
    pub len: usize,
}

impl PlaneLayout {
    pub fn range(&self) -> std::ops::Range<usize> {
        self.offset..self.offset + self.len
    }
}

/// Y, U and V planes of a `width`x`height` picture, in buffer order.
pub fn yuv420_layout(width: u32, height: u32) -> [PlaneLayout; 3] {
    let len_y = width as usize * height as usize;
    let len_u = len_y >> 2;
    let (cw, ch) = (width >> 1, height >> 1);
    [
        PlaneLayout {
            width,
            height,
            offset: 0,
            len: len_y,
        },
        PlaneLayout {
            width: cw,
            height: ch,
            offset: len_y,
            len: len_u,
        },
        PlaneLayout {
            width: cw,
            height: ch,
            offset: len_y + len_u,
            len: len_u,
        },
    ]
}

pub fn yuv420_size(width: u32, height: u32) -> usize {
    let len_y = width as usize * height as usize;
    len_y + (len_y >> 1)
}

pub struct Planes<'a> {
    pub y: &'a [u8],
    pub u: &'a [u8],
    pub v: &'a [u8],
}

pub type ReleaseHook = Box<dyn FnOnce(Vec<u8>) + Send>;

/// A decoded picture. Dropping the frame releases its buffer.
pub struct Frame {
    width: u32,
    height: u32,
    format: PixelFormat,
    pts: i64,
    data: Vec<u8>,
    release: Option<ReleaseHook>,
}

impl Frame {
    pub fn yuv420(width: u32, height: u32, data: Vec<u8>) -> Result<Self, FrameError> {
        if width == 0 || height == 0 || width % 2 != 0 || height % 2 != 0 {
            return Err(FrameError::InvalidDimensions { width, height });
        }
        let expected = yuv420_size(width, height);
        if data.len() != expected {
            return Err(FrameError::LengthMismatch {
                width,
                height,
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            format: PixelFormat::Yuv420p,
            pts: 0,
            data,
            release: None,
        })
    }

    pub fn with_format(mut self, format: PixelFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_pts(mut self, pts: i64) -> Self {
        self.pts = pts;
        self
    }

    /// Hands the buffer to `hook` when the frame is released.
    pub fn on_release(mut self, hook: impl FnOnce(Vec<u8>) + Send + 'static) -> Self {
        self.release = Some(Box::new(hook));
        self
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn pts(&self) -> i64 {
        self.pts
    }

    /// Packed Y+U+V bytes.
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn layout(&self) -> [PlaneLayout; 3] {
        yuv420_layout(self.width, self.height)
    }

    pub fn planes(&self) -> Planes<'_> {
        let [y, u, v] = self.layout();
        Planes {
            y: &self.data[y.range()],
            u: &self.data[u.range()],
            v: &self.data[v.range()],
        }
    }
}

impl Drop for Frame {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release(std::mem::take(&mut self.data));
        }
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("format", &self.format)
            .field("pts", &self.pts)
            .field("size", &self.data.len())
            .finish()
    }
}

use log::debug;

use super::frame::{yuv420_size, Frame, PixelFormat};
use super::{CodecFactory, CodecOptions, FrameDecoder};
use crate::error::DecodeError;
use crate::packet::Packet;
use crate::types::{
    CodecParameters, CODEC_ID_RAWVIDEO, COLOR_RANGE_JPEG, PIX_FMT_YUV420P, PIX_FMT_YUVJ420P,
};
use crate::utils::FramePool;

/// `rawvideo` codec: each packet carries one packed YUV420 picture.
pub struct RawVideoDecoder {
    width: u32,
    height: u32,
    format: PixelFormat,
    pool: FramePool,
}

impl RawVideoDecoder {
    pub fn new(par: &CodecParameters, pool: FramePool) -> Result<Self, DecodeError> {
        if par.codec_id != CODEC_ID_RAWVIDEO {
            return Err(DecodeError::UnsupportedCodec(par.codec_id));
        }
        let format = match par.format {
            PIX_FMT_YUVJ420P => PixelFormat::Yuvj420p,
            PIX_FMT_YUV420P if par.color_range == COLOR_RANGE_JPEG => PixelFormat::Yuvj420p,
            PIX_FMT_YUV420P => PixelFormat::Yuv420p,
            other => return Err(DecodeError::UnsupportedFormat(other)),
        };
        let (width, height) = (par.width, par.height);
        if width == 0 || height == 0 || width % 2 != 0 || height % 2 != 0 {
            return Err(crate::error::FrameError::InvalidDimensions { width, height }.into());
        }
        Ok(Self {
            width,
            height,
            format,
            pool,
        })
    }

    pub fn frame_size(&self) -> usize {
        yuv420_size(self.width, self.height)
    }
}

impl FrameDecoder for RawVideoDecoder {
    fn decode_packet(&mut self, packet: &Packet) -> Result<Option<Frame>, DecodeError> {
        if packet.data.is_empty() {
            return Ok(None);
        }
        let size = self.frame_size();
        if packet.data.len() != size {
            return Err(DecodeError::InvalidData(format!(
                "rawvideo packet of {} bytes, expected {size} for {}x{}",
                packet.data.len(),
                self.width,
                self.height
            )));
        }

        let mut data = self.pool.acquire(size);
        data.copy_from_slice(&packet.data);
        let frame = self
            .pool
            .frame(self.width, self.height, data)?
            .with_format(self.format)
            .with_pts(packet.pts);
        debug!("rawvideo frame pts={} size={}", packet.pts, size);
        Ok(Some(frame))
    }
}

/// Codec factory knowing only `rawvideo`; frames come from `pool`.
pub fn rawvideo_codecs(pool: FramePool) -> CodecFactory {
    Box::new(
        move |par: &CodecParameters,
              _options: &CodecOptions|
              -> Result<Box<dyn FrameDecoder>, DecodeError> {
            Ok(Box::new(RawVideoDecoder::new(par, pool.clone())?))
        },
    )
}

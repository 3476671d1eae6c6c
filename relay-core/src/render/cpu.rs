//! Software YUV → RGB conversion.
//!
//! Selected only when the config asks for it. Each output pixel samples
//! the chroma texel covering it (nearest), which matches the GPU path
//! exactly on texel centres.

use crate::codec::frame::DecodedFrame;
use crate::error::RelayError;
use crate::render::{FrameRenderer, RenderBackend, RenderedFrame, check_target_size, yuv_to_rgb};

/// RGBA8 render target held in memory.
pub struct CpuRenderer {
    width: u32,
    height: u32,
    rgba: Vec<u8>,
}

impl CpuRenderer {
    pub fn new(width: u32, height: u32) -> Result<Self, RelayError> {
        let mut renderer = Self {
            width: 0,
            height: 0,
            rgba: Vec::new(),
        };
        renderer.resize(width, height)?;
        Ok(renderer)
    }
}

impl FrameRenderer for CpuRenderer {
    fn backend(&self) -> RenderBackend {
        RenderBackend::Cpu
    }

    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn resize(&mut self, width: u32, height: u32) -> Result<(), RelayError> {
        check_target_size(width, height)?;
        self.width = width;
        self.height = height;
        self.rgba = vec![0; width as usize * height as usize * 4];
        Ok(())
    }

    fn draw(&mut self, frame: &DecodedFrame) -> Result<(), RelayError> {
        if (frame.width, frame.height) != (self.width, self.height) {
            return Err(RelayError::Render(format!(
                "frame {}x{} does not match target {}x{}",
                frame.width, frame.height, self.width, self.height
            )));
        }

        let width = self.width as usize;
        let chroma_width = frame.chroma_width() as usize;

        for (row, out_row) in self.rgba.chunks_exact_mut(width * 4).enumerate() {
            let luma_row = &frame.y[row * width..(row + 1) * width];
            let chroma_offset = (row / 2) * chroma_width;
            let u_row = &frame.u[chroma_offset..chroma_offset + chroma_width];
            let v_row = &frame.v[chroma_offset..chroma_offset + chroma_width];

            for (col, px) in out_row.chunks_exact_mut(4).enumerate() {
                let [r, g, b] = yuv_to_rgb(luma_row[col], u_row[col / 2], v_row[col / 2]);
                px.copy_from_slice(&[r, g, b, 255]);
            }
        }
        Ok(())
    }

    fn read_pixels(&mut self) -> Result<RenderedFrame, RelayError> {
        Ok(RenderedFrame {
            width: self.width,
            height: self.height,
            rgba: self.rgba.clone(),
        })
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::frame::{FrameCodec, encode_frame, solid_frame};

    #[test]
    fn solid_grey_frame() {
        let msg = solid_frame(4, 4, 128, 128, 128).unwrap();
        let frame = FrameCodec::decode(&msg).unwrap();

        let mut r = CpuRenderer::new(4, 4).unwrap();
        assert!(!r.render(&frame).unwrap());

        let out = r.read_pixels().unwrap();
        assert_eq!(out.rgba.len(), 4 * 4 * 4);
        for px in out.rgba.chunks_exact(4) {
            assert_eq!(px, [129, 127, 129, 255]);
        }
    }

    #[test]
    fn resizes_to_incoming_frame() {
        let msg = solid_frame(8, 2, 16, 128, 128).unwrap();
        let frame = FrameCodec::decode(&msg).unwrap();

        let mut r = CpuRenderer::new(4, 4).unwrap();
        assert!(r.render(&frame).unwrap());
        assert_eq!(r.dimensions(), (8, 2));
        assert_eq!(r.read_pixels().unwrap().rgba.len(), 8 * 2 * 4);
    }

    #[test]
    fn chroma_is_subsampled_per_2x2_block() {
        // Left chroma column is red-ish, right is blue-ish.
        let y = [128u8; 16];
        let u = [85, 255, 85, 255];
        let v = [255, 107, 255, 107];
        let msg = encode_frame(4, 4, &y, &u, &v).unwrap();
        let frame = FrameCodec::decode(&msg).unwrap();

        let mut r = CpuRenderer::new(4, 4).unwrap();
        r.render(&frame).unwrap();
        let out = r.read_pixels().unwrap();

        for row in 0..4 {
            assert_eq!(out.pixel(0, row), out.pixel(1, row));
            assert_eq!(out.pixel(2, row), out.pixel(3, row));
            assert!(out.pixel(0, row)[0] > out.pixel(0, row)[2]);
            assert!(out.pixel(3, row)[2] > out.pixel(3, row)[0]);
        }
    }

    #[test]
    fn top_row_stays_on_top() {
        let mut y = [0u8; 16];
        y[..4].copy_from_slice(&[255; 4]);
        let msg = encode_frame(4, 4, &y, &[128; 4], &[128; 4]).unwrap();
        let frame = FrameCodec::decode(&msg).unwrap();

        let mut r = CpuRenderer::new(4, 4).unwrap();
        r.render(&frame).unwrap();
        let out = r.read_pixels().unwrap();
        assert!(out.pixel(0, 0)[0] > 250);
        assert!(out.pixel(0, 3)[0] < 5);
    }

    #[test]
    fn mismatched_draw_is_an_error() {
        let msg = solid_frame(2, 2, 0, 128, 128).unwrap();
        let frame = FrameCodec::decode(&msg).unwrap();
        let mut r = CpuRenderer::new(4, 4).unwrap();
        assert!(r.draw(&frame).is_err());
    }

    #[test]
    fn zero_target_rejected() {
        assert!(CpuRenderer::new(0, 4).is_err());
    }
}

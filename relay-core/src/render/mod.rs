//! YUV → RGB render stage.
//!
//! | Backend | Type          | Notes                                        |
//! |---------|---------------|----------------------------------------------|
//! | `gpu`   | `GpuRenderer` | wgpu, offscreen RGBA target, shader colour conversion |
//! | `cpu`   | `CpuRenderer` | software conversion, same BT.601 coefficients |
//!
//! The backend is picked explicitly from [`RenderConfig`]. A missing GPU is
//! an initialisation error, never a silent switch to the CPU path.

pub mod cpu;
pub mod gpu;

use serde::{Deserialize, Serialize};

use crate::codec::MAX_MESSAGE_SIZE;
use crate::codec::frame::DecodedFrame;
use crate::error::RelayError;

pub use cpu::CpuRenderer;
pub use gpu::GpuRenderer;

// ── BT.601 coefficients ──────────────────────────────────────────

pub const KR_V: f32 = 1.402;
pub const KG_U: f32 = 0.344;
pub const KG_V: f32 = 0.714;
pub const KB_U: f32 = 1.772;

/// Full-range BT.601 conversion of one sample.
pub fn yuv_to_rgb(y: u8, u: u8, v: u8) -> [u8; 3] {
    let y = y as f32 / 255.0;
    let u = u as f32 / 255.0 - 0.5;
    let v = v as f32 / 255.0 - 0.5;

    let r = y + KR_V * v;
    let g = y - KG_U * u - KG_V * v;
    let b = y + KB_U * u;

    [to_unorm8(r), to_unorm8(g), to_unorm8(b)]
}

fn to_unorm8(c: f32) -> u8 {
    (c.clamp(0.0, 1.0) * 255.0).round() as u8
}

// ── Config ───────────────────────────────────────────────────────

/// Which conversion path draws the frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderBackend {
    #[default]
    Gpu,
    Cpu,
}

impl std::fmt::Display for RenderBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Gpu => write!(f, "gpu"),
            Self::Cpu => write!(f, "cpu"),
        }
    }
}

/// Render stage settings.
#[derive(Debug, Clone)]
pub struct RenderConfig {
    pub backend: RenderBackend,
    /// Initial render target width.
    pub width: u32,
    /// Initial render target height.
    pub height: u32,
    /// Read every drawn frame back and publish it to subscribers.
    pub publish_frames: bool,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            backend: RenderBackend::Gpu,
            width: 640,
            height: 480,
            publish_frames: false,
        }
    }
}

// ── RenderedFrame ────────────────────────────────────────────────

/// Tightly packed RGBA8 contents of the render target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedFrame {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

impl RenderedFrame {
    /// RGBA bytes of the pixel at `(x, y)`, row 0 at the top.
    pub fn pixel(&self, x: u32, y: u32) -> &[u8] {
        let offset = (y as usize * self.width as usize + x as usize) * 4;
        &self.rgba[offset..offset + 4]
    }
}

// ── FrameRenderer ────────────────────────────────────────────────

/// A render target that draws decoded I420 frames.
pub trait FrameRenderer: Send {
    fn backend(&self) -> RenderBackend;

    /// Current render target size.
    fn dimensions(&self) -> (u32, u32);

    /// Reconfigure the render target and viewport.
    fn resize(&mut self, width: u32, height: u32) -> Result<(), RelayError>;

    /// Upload the planes and draw. The target must already match the frame.
    fn draw(&mut self, frame: &DecodedFrame) -> Result<(), RelayError>;

    /// Copy the render target out as RGBA8.
    fn read_pixels(&mut self) -> Result<RenderedFrame, RelayError>;

    /// Resize to the frame if needed, then draw it.
    ///
    /// Returns `true` when the target was resized.
    fn render(&mut self, frame: &DecodedFrame) -> Result<bool, RelayError> {
        let resized = self.dimensions() != (frame.width, frame.height);
        if resized {
            self.resize(frame.width, frame.height)?;
        }
        self.draw(frame)?;
        Ok(resized)
    }
}

/// Build the renderer selected by `config`.
pub async fn create_renderer(config: &RenderConfig) -> Result<Box<dyn FrameRenderer>, RelayError> {
    match config.backend {
        RenderBackend::Gpu => Ok(Box::new(GpuRenderer::new(config.width, config.height).await?)),
        RenderBackend::Cpu => Ok(Box::new(CpuRenderer::new(config.width, config.height)?)),
    }
}

/// Widest or tallest render target accepted.
pub const MAX_TARGET_DIMENSION: u32 = 16_384;

/// Largest render target area: every I420 frame that fits in one
/// message fits here, nothing much bigger does.
pub const MAX_TARGET_PIXELS: u64 = MAX_MESSAGE_SIZE as u64 * 2 / 3;

pub(crate) fn check_target_size(width: u32, height: u32) -> Result<(), RelayError> {
    let pixels = (width as u64).checked_mul(height as u64);
    let fits = width > 0
        && height > 0
        && width <= MAX_TARGET_DIMENSION
        && height <= MAX_TARGET_DIMENSION
        && pixels.is_some_and(|p| p <= MAX_TARGET_PIXELS);
    if !fits {
        return Err(RelayError::Render(format!(
            "invalid render target {width}x{height}"
        )));
    }
    Ok(())
}

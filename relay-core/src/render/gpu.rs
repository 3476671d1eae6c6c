//! wgpu render path.
//!
//! Planes are uploaded as single-channel `R8Unorm` textures (Y at full
//! resolution, U and V at half), sampled linearly with clamp-to-edge
//! addressing, and converted to RGB in the fragment shader while
//! drawing a full-screen quad into an offscreen `Rgba8Unorm` target.
//! The quad's texture coordinates are flipped vertically so row 0 of
//! the Y plane lands at the top of the target.

use std::sync::mpsc;

use bytemuck::{Pod, Zeroable};
use tracing::{error, info};
use wgpu::util::DeviceExt;

use crate::codec::frame::DecodedFrame;
use crate::error::RelayError;
use crate::render::{FrameRenderer, RenderBackend, RenderedFrame, check_target_size};

const SHADER: &str = include_str!("yuv.wgsl");

const TARGET_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;
const PLANE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::R8Unorm;

// ── Geometry ─────────────────────────────────────────────────────

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct QuadVertex {
    position: [f32; 2],
    uv: [f32; 2],
}

/// Triangle strip covering clip space; v runs opposite to y.
const QUAD: [QuadVertex; 4] = [
    QuadVertex { position: [-1.0, -1.0], uv: [0.0, 1.0] },
    QuadVertex { position: [1.0, -1.0], uv: [1.0, 1.0] },
    QuadVertex { position: [-1.0, 1.0], uv: [0.0, 0.0] },
    QuadVertex { position: [1.0, 1.0], uv: [1.0, 0.0] },
];

const QUAD_ATTRIBUTES: [wgpu::VertexAttribute; 2] =
    wgpu::vertex_attr_array![0 => Float32x2, 1 => Float32x2];

// ── FrameTextures ────────────────────────────────────────────────

/// Everything sized to the current frame resolution.
struct FrameTextures {
    target: wgpu::Texture,
    target_view: wgpu::TextureView,
    y: wgpu::Texture,
    u: wgpu::Texture,
    v: wgpu::Texture,
    bind_group: wgpu::BindGroup,
}

// ── GpuRenderer ──────────────────────────────────────────────────

/// Headless wgpu renderer.
pub struct GpuRenderer {
    device: wgpu::Device,
    queue: wgpu::Queue,
    pipeline: wgpu::RenderPipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    quad: wgpu::Buffer,
    textures: FrameTextures,
    width: u32,
    height: u32,
}

impl GpuRenderer {
    /// Acquire an adapter and device and build the shader pipeline.
    ///
    /// Fails with [`RelayError::GpuUnavailable`] when no adapter or device
    /// exists and [`RelayError::Gpu`] when the shader does not validate.
    pub async fn new(width: u32, height: u32) -> Result<Self, RelayError> {
        check_target_size(width, height)?;

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                force_fallback_adapter: false,
                compatible_surface: None,
            })
            .await
            .map_err(|e| RelayError::GpuUnavailable(e.to_string()))?;

        let info = adapter.get_info();
        info!("gpu adapter: {} ({:?})", info.name, info.backend);

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("relay.device"),
                required_limits: wgpu::Limits::downlevel_defaults()
                    .using_resolution(adapter.limits()),
                ..Default::default()
            })
            .await
            .map_err(|e| RelayError::GpuUnavailable(e.to_string()))?;

        device.on_uncaptured_error(Box::new(|e| error!("uncaptured gpu error: {e}")));

        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let (pipeline, bind_group_layout) = build_pipeline(&device);
        if let Some(e) = device.pop_error_scope().await {
            return Err(RelayError::Gpu(format!("shader pipeline: {e}")));
        }

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("relay.plane_sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let quad = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("relay.quad"),
            contents: bytemuck::cast_slice(&QUAD),
            usage: wgpu::BufferUsages::VERTEX,
        });

        let textures =
            create_frame_textures(&device, &bind_group_layout, &sampler, width, height);

        Ok(Self {
            device,
            queue,
            pipeline,
            bind_group_layout,
            sampler,
            quad,
            textures,
            width,
            height,
        })
    }

    fn upload_plane(&self, texture: &wgpu::Texture, data: &[u8], width: u32, height: u32) {
        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            data,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(width),
                rows_per_image: Some(height),
            },
            extent(width, height),
        );
    }

    fn wait_idle(&self) -> Result<(), RelayError> {
        self.device
            .poll(wgpu::PollType::Wait)
            .map(|_| ())
            .map_err(|e| RelayError::Gpu(format!("device poll: {e}")))
    }
}

impl FrameRenderer for GpuRenderer {
    fn backend(&self) -> RenderBackend {
        RenderBackend::Gpu
    }

    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn resize(&mut self, width: u32, height: u32) -> Result<(), RelayError> {
        check_target_size(width, height)?;
        let max = self.device.limits().max_texture_dimension_2d;
        if width > max || height > max {
            return Err(RelayError::Render(format!(
                "{width}x{height} exceeds the gpu texture limit of {max}"
            )));
        }
        self.textures = create_frame_textures(
            &self.device,
            &self.bind_group_layout,
            &self.sampler,
            width,
            height,
        );
        self.width = width;
        self.height = height;
        info!("render target resized to {width}x{height}");
        Ok(())
    }

    fn draw(&mut self, frame: &DecodedFrame) -> Result<(), RelayError> {
        if (frame.width, frame.height) != (self.width, self.height) {
            return Err(RelayError::Render(format!(
                "frame {}x{} does not match target {}x{}",
                frame.width, frame.height, self.width, self.height
            )));
        }

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);

        let (cw, ch) = (frame.chroma_width(), frame.chroma_height());
        self.upload_plane(&self.textures.y, &frame.y, frame.width, frame.height);
        self.upload_plane(&self.textures.u, &frame.u, cw, ch);
        self.upload_plane(&self.textures.v, &frame.v, cw, ch);

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("relay.frame"),
            });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("relay.yuv_to_rgb"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &self.textures.target_view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_viewport(0.0, 0.0, self.width as f32, self.height as f32, 0.0, 1.0);
            pass.set_pipeline(&self.pipeline);
            pass.set_bind_group(0, &self.textures.bind_group, &[]);
            pass.set_vertex_buffer(0, self.quad.slice(..));
            pass.draw(0..QUAD.len() as u32, 0..1);
        }
        self.queue.submit(Some(encoder.finish()));
        let idle = self.wait_idle();

        // The scope is popped even when the poll failed.
        if let Some(e) = futures::executor::block_on(self.device.pop_error_scope()) {
            return Err(RelayError::Gpu(format!("draw: {e}")));
        }
        idle
    }

    fn read_pixels(&mut self) -> Result<RenderedFrame, RelayError> {
        let (width, height) = (self.width, self.height);
        let unpadded = width * 4;
        let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let padded = unpadded.div_ceil(align) * align;

        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("relay.readback"),
            size: padded as u64 * height as u64,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("relay.readback"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &self.textures.target,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded),
                    rows_per_image: Some(height),
                },
            },
            extent(width, height),
        );
        self.queue.submit(Some(encoder.finish()));

        let slice = buffer.slice(..);
        let (tx, rx) = mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        self.wait_idle()?;
        rx.recv()
            .map_err(|_| RelayError::Gpu("readback callback dropped".into()))?
            .map_err(|e| RelayError::Gpu(format!("readback map: {e}")))?;

        let mut rgba = Vec::with_capacity(unpadded as usize * height as usize);
        {
            let mapped = slice.get_mapped_range();
            for row in mapped.chunks(padded as usize) {
                rgba.extend_from_slice(&row[..unpadded as usize]);
            }
        }
        buffer.unmap();

        Ok(RenderedFrame {
            width,
            height,
            rgba,
        })
    }
}

// ── Construction helpers ─────────────────────────────────────────

fn extent(width: u32, height: u32) -> wgpu::Extent3d {
    wgpu::Extent3d {
        width,
        height,
        depth_or_array_layers: 1,
    }
}

fn build_pipeline(device: &wgpu::Device) -> (wgpu::RenderPipeline, wgpu::BindGroupLayout) {
    let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("relay.yuv_shader"),
        source: wgpu::ShaderSource::Wgsl(SHADER.into()),
    });

    let plane_entry = |binding| wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Float { filterable: true },
            view_dimension: wgpu::TextureViewDimension::D2,
            multisampled: false,
        },
        count: None,
    };

    let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("relay.planes"),
        entries: &[
            plane_entry(0),
            plane_entry(1),
            plane_entry(2),
            wgpu::BindGroupLayoutEntry {
                binding: 3,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                count: None,
            },
        ],
    });

    let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("relay.pipeline_layout"),
        bind_group_layouts: &[&bind_group_layout],
        push_constant_ranges: &[],
    });

    let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some("relay.yuv_pipeline"),
        layout: Some(&layout),
        vertex: wgpu::VertexState {
            module: &shader,
            entry_point: Some("vs_main"),
            compilation_options: wgpu::PipelineCompilationOptions::default(),
            buffers: &[wgpu::VertexBufferLayout {
                array_stride: std::mem::size_of::<QuadVertex>() as wgpu::BufferAddress,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes: &QUAD_ATTRIBUTES,
            }],
        },
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleStrip,
            ..Default::default()
        },
        depth_stencil: None,
        multisample: wgpu::MultisampleState::default(),
        fragment: Some(wgpu::FragmentState {
            module: &shader,
            entry_point: Some("fs_main"),
            compilation_options: wgpu::PipelineCompilationOptions::default(),
            targets: &[Some(wgpu::ColorTargetState {
                format: TARGET_FORMAT,
                blend: None,
                write_mask: wgpu::ColorWrites::ALL,
            })],
        }),
        multiview: None,
        cache: None,
    });

    (pipeline, bind_group_layout)
}

fn create_plane(device: &wgpu::Device, label: &str, width: u32, height: u32) -> wgpu::Texture {
    device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size: extent(width, height),
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: PLANE_FORMAT,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    })
}

fn create_frame_textures(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    sampler: &wgpu::Sampler,
    width: u32,
    height: u32,
) -> FrameTextures {
    // Odd target sizes (set_resolution) still need a non-empty chroma plane.
    let (cw, ch) = ((width / 2).max(1), (height / 2).max(1));

    let target = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("relay.target"),
        size: extent(width, height),
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: TARGET_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT
            | wgpu::TextureUsages::COPY_SRC
            | wgpu::TextureUsages::TEXTURE_BINDING,
        view_formats: &[],
    });
    let target_view = target.create_view(&wgpu::TextureViewDescriptor::default());

    let y = create_plane(device, "relay.plane_y", width, height);
    let u = create_plane(device, "relay.plane_u", cw, ch);
    let v = create_plane(device, "relay.plane_v", cw, ch);

    let views = [&y, &u, &v].map(|t| t.create_view(&wgpu::TextureViewDescriptor::default()));
    let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("relay.planes"),
        layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(&views[0]),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::TextureView(&views[1]),
            },
            wgpu::BindGroupEntry {
                binding: 2,
                resource: wgpu::BindingResource::TextureView(&views[2]),
            },
            wgpu::BindGroupEntry {
                binding: 3,
                resource: wgpu::BindingResource::Sampler(sampler),
            },
        ],
    });

    FrameTextures {
        target,
        target_view,
        y,
        u,
        v,
        bind_group,
    }
}

// ── Tests ────────────────────────────────────────────────────────

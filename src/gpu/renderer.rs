//! GPU device state and the per-frame renderer.
//!
//! The frame flow mirrors the cache design: for every visible line the
//! shaping cache is consulted, each resolved glyph is looked up in the
//! monochrome atlas and then the color atlas, and misses rasterize +
//! insert only while both atlases can admit an entry (the color decision
//! is only known after rasterization). When neither can, the accumulated
//! instances are flushed in a draw pass and both atlases are invalidated
//! so the frame can keep going. At frame end everything is invalidated:
//! entries untouched next frame become eviction candidates.

use std::sync::Arc;
use std::time::Instant;

use anyhow::Context as _;
use winit::window::Window;

use crate::config::Config;
use crate::document::Document;
use crate::font::{FaceCollection, ShapingCache};
use crate::viewport::Viewport;

use super::atlas::TextureAtlas;
use super::pipeline::{self, INSTANCE_STRIDE};

/// Left margin before the first glyph of each line, in pixels.
const MARGIN_X: f32 = 4.0;

/// GPU device, queue, and the window surface.
pub struct Gpu {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub surface: wgpu::Surface<'static>,
    pub surface_config: wgpu::SurfaceConfiguration,
}

impl Gpu {
    /// Initialize wgpu: instance, surface, adapter, device, queue.
    pub fn new(window: Arc<Window>) -> anyhow::Result<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());

        let surface = instance
            .create_surface(window.clone())
            .context("failed to create wgpu surface")?;

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: Some(&surface),
            force_fallback_adapter: false,
        }))
        .context("failed to find a GPU adapter")?;

        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("folio"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                ..Default::default()
            },
        ))
        .context("failed to create GPU device")?;

        let caps = surface.get_capabilities(&adapter);
        // Prefer a non-sRGB format so configured sRGB color values pass
        // through without double gamma correction.
        let surface_format = caps
            .formats
            .iter()
            .find(|f| !f.is_srgb())
            .copied()
            .unwrap_or(caps.formats[0]);

        let size = window.inner_size();
        let surface_config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: wgpu::PresentMode::Fifo,
            alpha_mode: caps.alpha_modes[0],
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &surface_config);

        log::info!(
            "GPU init: adapter={}, format={surface_format:?}",
            adapter.get_info().name,
        );

        Ok(Self {
            device,
            queue,
            surface,
            surface_config,
        })
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.surface_config.width = width.max(1);
        self.surface_config.height = height.max(1);
        self.surface.configure(&self.device, &self.surface_config);
    }

    fn reconfigure(&self) {
        self.surface.configure(&self.device, &self.surface_config);
    }
}

/// Accumulates raw instance bytes for one draw batch.
struct InstanceWriter {
    data: Vec<u8>,
    count: u32,
}

impl InstanceWriter {
    fn new() -> Self {
        Self {
            data: Vec::new(),
            count: 0,
        }
    }

    fn push_glyph(
        &mut self,
        x: f32,
        y: f32,
        w: f32,
        h: f32,
        uv_size: [f32; 2],
        layer: u32,
        color: [f32; 4],
    ) {
        for v in [x, y, w, h, uv_size[0], uv_size[1]] {
            self.data.extend_from_slice(&v.to_le_bytes());
        }
        self.data.extend_from_slice(&layer.to_le_bytes());
        self.data.extend_from_slice(&0u32.to_le_bytes());
        for v in color {
            self.data.extend_from_slice(&v.to_le_bytes());
        }
        self.count += 1;
        debug_assert_eq!(self.data.len() as u64, u64::from(self.count) * INSTANCE_STRIDE);
    }

    fn is_empty(&self) -> bool {
        self.count == 0
    }

    fn clear(&mut self) {
        self.data.clear();
        self.count = 0;
    }
}

/// The frame renderer: owns pipelines, the two atlases, and the buffers.
pub struct Renderer {
    mask_pipeline: wgpu::RenderPipeline,
    color_pipeline: wgpu::RenderPipeline,
    uniform_buffer: wgpu::Buffer,
    uniform_bind_group: wgpu::BindGroup,
    mono_atlas: TextureAtlas,
    color_atlas: TextureAtlas,
    mono_bind_group: wgpu::BindGroup,
    color_bind_group: wgpu::BindGroup,
    mono_buffer: wgpu::Buffer,
    color_buffer: wgpu::Buffer,
    font_size: f32,
    line_height: usize,
    baseline: usize,
    fg_color: [f32; 4],
    bg_color: [f32; 4],
}

impl Renderer {
    pub fn new(gpu: &Gpu, fonts: &FaceCollection, config: &Config) -> Self {
        let device = &gpu.device;
        let format = gpu.surface_config.format;

        let uniform_layout = pipeline::create_uniform_bind_group_layout(device);
        let atlas_layout = pipeline::create_atlas_bind_group_layout(device);

        let mask_pipeline = pipeline::create_glyph_pipeline(
            device,
            format,
            &uniform_layout,
            &atlas_layout,
            "fs_mask",
            "mask_pipeline",
        );
        let color_pipeline = pipeline::create_glyph_pipeline(
            device,
            format,
            &uniform_layout,
            &atlas_layout,
            "fs_color",
            "color_pipeline",
        );

        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("uniform_buffer"),
            size: 64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let uniform_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("uniform_bind_group"),
            layout: &uniform_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform_buffer.as_entire_binding(),
            }],
        });

        let (mono_w, mono_h) = fonts.mono_extents();
        let mono_atlas = TextureAtlas::new(
            device,
            "mono_atlas",
            mono_w,
            mono_h,
            wgpu::TextureFormat::R8Unorm,
        );
        let (color_w, color_h) = fonts.color_extents();
        let color_atlas = TextureAtlas::new(
            device,
            "color_atlas",
            color_w,
            color_h,
            wgpu::TextureFormat::Rgba8Unorm,
        );

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("atlas_sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let mono_bind_group = atlas_bind_group(device, &atlas_layout, mono_atlas.view(), &sampler, "mono");
        let color_bind_group =
            atlas_bind_group(device, &atlas_layout, color_atlas.view(), &sampler, "color");

        let mono_buffer = instance_buffer(device, "mono_instances", 4096);
        let color_buffer = instance_buffer(device, "color_instances", 1024);

        Self {
            mask_pipeline,
            color_pipeline,
            uniform_buffer,
            uniform_bind_group,
            mono_atlas,
            color_atlas,
            mono_bind_group,
            color_bind_group,
            mono_buffer,
            color_buffer,
            font_size: fonts.size(),
            line_height: config.font.line_height(),
            baseline: fonts.baseline(),
            fg_color: config.colors.foreground_rgba(),
            bg_color: config.colors.background_rgba(),
        }
    }

    /// Render the visible line range to the surface.
    pub fn draw_frame(
        &mut self,
        gpu: &Gpu,
        document: &Document,
        viewport: &Viewport,
        fonts: &mut FaceCollection,
        shaping: &mut ShapingCache,
    ) {
        let started = Instant::now();

        let frame = match gpu.surface.get_current_texture() {
            Ok(f) => f,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                gpu.reconfigure();
                return;
            }
            Err(e) => {
                log::warn!("surface unavailable: {e}");
                return;
            }
        };
        let view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let projection = ortho_projection(
            gpu.surface_config.width as f32,
            gpu.surface_config.height as f32,
        );
        gpu.queue.write_buffer(&self.uniform_buffer, 0, &projection);

        let mut mono = InstanceWriter::new();
        let mut color = InstanceWriter::new();
        let mut first_pass = true;

        for (row, line_index) in viewport.current_range().enumerate() {
            let shaped = shaping.get_or_shape(document.line(line_index), fonts);

            let mut pen_x = MARGIN_X;
            let baseline_y = (row * self.line_height + self.baseline) as f32;

            let mut i = 0;
            let mut retried = false;
            while i < shaped.len() {
                let glyph = shaped.glyphs[i];

                let sprite = self.mono_atlas.get(glyph).or_else(|| self.color_atlas.get(glyph));
                let sprite = match sprite {
                    Some(s) => Some(s),
                    // Rasterize only while both atlases can take the
                    // glyph; which one receives it is known only after
                    // rasterization reveals whether it is colored.
                    None if self.mono_atlas.has_room_or_stale()
                        && self.color_atlas.has_room_or_stale() =>
                    {
                        let rendered = fonts.rasterize(shaped.faces[i] as usize, glyph);
                        let s = if rendered.colored {
                            self.color_atlas.insert(glyph, &rendered, &gpu.queue)
                        } else {
                            self.mono_atlas.insert(glyph, &rendered, &gpu.queue)
                        };
                        Some(s)
                    }
                    None => None,
                };

                let Some(sprite) = sprite else {
                    if retried {
                        log::warn!("atlas cannot admit glyph {glyph}, skipping");
                        retried = false;
                        i += 1;
                        continue;
                    }
                    // Both atlases exhausted mid-frame: draw what we have
                    // so those entries can go stale, then retry.
                    self.flush(gpu, &view, &mut mono, &mut color, &mut first_pass);
                    self.mono_atlas.invalidate();
                    self.color_atlas.invalidate();
                    retried = true;
                    continue;
                };

                retried = false;
                pen_x += self.emit(&mut mono, &mut color, &sprite, pen_x, baseline_y);
                i += 1;
            }
        }

        self.flush(gpu, &view, &mut mono, &mut color, &mut first_pass);
        frame.present();

        // Frame boundary: only entries touched again next frame stay
        // protected from eviction.
        self.mono_atlas.invalidate();
        self.color_atlas.invalidate();
        shaping.invalidate();

        log::trace!("frame built in {:.2?}", started.elapsed());
    }

    /// Push one positioned glyph instance; returns the pen advance.
    fn emit(
        &self,
        mono: &mut InstanceWriter,
        color: &mut InstanceWriter,
        sprite: &super::GlyphSprite,
        pen_x: f32,
        baseline_y: f32,
    ) -> f32 {
        if sprite.width == 0 || sprite.height == 0 {
            // Blank glyph (space): advance the pen, draw nothing.
            return sprite.advance;
        }

        let (x, y, w, h, advance);
        if sprite.colored {
            // Color bitmaps come at the strike's own size: fit them to the
            // nominal font pixel box and advance by the fitted width.
            let ratio_x = self.font_size / sprite.width as f32;
            let ratio_y = self.font_size / sprite.height as f32;
            w = sprite.width as f32 * ratio_x;
            h = sprite.height as f32 * ratio_y;
            x = pen_x + sprite.left as f32 * ratio_x;
            y = baseline_y - sprite.top as f32 * ratio_y;
            advance = w;
        } else {
            w = sprite.width as f32;
            h = sprite.height as f32;
            x = pen_x + sprite.left as f32;
            y = baseline_y - sprite.top as f32;
            advance = sprite.advance;
        }

        let writer = if sprite.colored { color } else { mono };
        writer.push_glyph(x, y, w, h, sprite.uv_size, sprite.slot, self.fg_color);
        advance
    }

    /// Draw the accumulated instances in one render pass and submit.
    /// The first pass of a frame clears to the background color.
    fn flush(
        &mut self,
        gpu: &Gpu,
        view: &wgpu::TextureView,
        mono: &mut InstanceWriter,
        color: &mut InstanceWriter,
        first_pass: &mut bool,
    ) {
        if mono.is_empty() && color.is_empty() && !*first_pass {
            return;
        }

        ensure_buffer_capacity(
            &gpu.device,
            &mut self.mono_buffer,
            "mono_instances",
            mono.data.len() as u64,
        );
        ensure_buffer_capacity(
            &gpu.device,
            &mut self.color_buffer,
            "color_instances",
            color.data.len() as u64,
        );
        if !mono.is_empty() {
            gpu.queue.write_buffer(&self.mono_buffer, 0, &mono.data);
        }
        if !color.is_empty() {
            gpu.queue.write_buffer(&self.color_buffer, 0, &color.data);
        }

        let mut encoder = gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: None });
        {
            let load = if *first_pass {
                wgpu::LoadOp::Clear(wgpu::Color {
                    r: f64::from(self.bg_color[0]),
                    g: f64::from(self.bg_color[1]),
                    b: f64::from(self.bg_color[2]),
                    a: 1.0,
                })
            } else {
                wgpu::LoadOp::Load
            };

            let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("glyph_pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view,
                    resolve_target: None,
                    depth_slice: None,
                    ops: wgpu::Operations {
                        load,
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            });

            rpass.set_bind_group(0, &self.uniform_bind_group, &[]);
            if !mono.is_empty() {
                rpass.set_pipeline(&self.mask_pipeline);
                rpass.set_bind_group(1, &self.mono_bind_group, &[]);
                rpass.set_vertex_buffer(0, self.mono_buffer.slice(..));
                rpass.draw(0..4, 0..mono.count);
            }
            if !color.is_empty() {
                rpass.set_pipeline(&self.color_pipeline);
                rpass.set_bind_group(1, &self.color_bind_group, &[]);
                rpass.set_vertex_buffer(0, self.color_buffer.slice(..));
                rpass.draw(0..4, 0..color.count);
            }
        }
        gpu.queue.submit(std::iter::once(encoder.finish()));

        *first_pass = false;
        mono.clear();
        color.clear();
    }
}

fn atlas_bind_group(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    view: &wgpu::TextureView,
    sampler: &wgpu::Sampler,
    label: &str,
) -> wgpu::BindGroup {
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some(label),
        layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(view),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::Sampler(sampler),
            },
        ],
    })
}

fn instance_buffer(device: &wgpu::Device, label: &str, instances: u64) -> wgpu::Buffer {
    device.create_buffer(&wgpu::BufferDescriptor {
        label: Some(label),
        size: instances * INSTANCE_STRIDE,
        usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    })
}

/// Grow an instance buffer when a batch outruns it.
fn ensure_buffer_capacity(
    device: &wgpu::Device,
    buffer: &mut wgpu::Buffer,
    label: &str,
    needed: u64,
) {
    if buffer.size() >= needed {
        return;
    }
    let instances = needed.div_ceil(INSTANCE_STRIDE).next_power_of_two();
    log::debug!("growing {label} buffer to {instances} instances");
    *buffer = instance_buffer(device, label, instances);
}

/// Column-major orthographic projection mapping pixel coordinates
/// (origin top-left, y down) to clip space.
fn ortho_projection(width: f32, height: f32) -> [u8; 64] {
    let m: [f32; 16] = [
        2.0 / width, 0.0, 0.0, 0.0,
        0.0, -2.0 / height, 0.0, 0.0,
        0.0, 0.0, 1.0, 0.0,
        -1.0, 1.0, 0.0, 1.0,
    ];
    let mut bytes = [0u8; 64];
    for (i, v) in m.iter().enumerate() {
        bytes[i * 4..i * 4 + 4].copy_from_slice(&v.to_le_bytes());
    }
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instance_writer_packs_to_stride() {
        let mut w = InstanceWriter::new();
        assert!(w.is_empty());
        w.push_glyph(1.0, 2.0, 3.0, 4.0, [0.5, 0.5], 7, [1.0, 1.0, 1.0, 1.0]);
        assert_eq!(w.count, 1);
        assert_eq!(w.data.len() as u64, INSTANCE_STRIDE);
        w.push_glyph(0.0, 0.0, 1.0, 1.0, [0.1, 0.1], 0, [0.0, 0.0, 0.0, 1.0]);
        assert_eq!(w.data.len() as u64, 2 * INSTANCE_STRIDE);

        w.clear();
        assert!(w.is_empty());
        assert!(w.data.is_empty());
    }

    #[test]
    fn instance_writer_layer_lands_at_offset_24() {
        let mut w = InstanceWriter::new();
        w.push_glyph(0.0, 0.0, 0.0, 0.0, [0.0, 0.0], 0xAABBCCDD, [0.0; 4]);
        assert_eq!(
            &w.data[24..28],
            &0xAABB_CCDDu32.to_le_bytes(),
        );
    }

    #[test]
    fn projection_maps_corners_to_clip_space() {
        let bytes = ortho_projection(800.0, 600.0);
        let mut m = [0f32; 16];
        for (i, chunk) in bytes.chunks(4).enumerate() {
            m[i] = f32::from_le_bytes(chunk.try_into().expect("4-byte chunk"));
        }
        // Column-major multiply of (x, y, 0, 1).
        let apply = |x: f32, y: f32| {
            (
                m[0] * x + m[4] * y + m[12],
                m[1] * x + m[5] * y + m[13],
            )
        };
        let close = |(ax, ay): (f32, f32), (bx, by): (f32, f32)| {
            (ax - bx).abs() < 1e-5 && (ay - by).abs() < 1e-5
        };
        assert!(close(apply(0.0, 0.0), (-1.0, 1.0)));
        assert!(close(apply(800.0, 600.0), (1.0, -1.0)));
        assert!(close(apply(400.0, 300.0), (0.0, 0.0)));
    }
}

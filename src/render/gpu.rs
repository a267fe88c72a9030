//! Headless wgpu device and a ping-pong chain of fullscreen WGSL passes
//! that runs over a `Surface` and reads the result back.

use anyhow::{Context, Result};
use bytemuck::{Pod, Zeroable};

use super::surface::Surface;

/// Surfaces hold raw bytes, so no sRGB conversion on upload or readback.
pub const TEXTURE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

pub struct GpuContext {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
}

impl GpuContext {
    pub fn new() -> Result<Self> {
        pollster::block_on(Self::init_async())
    }

    async fn init_async() -> Result<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::METAL | wgpu::Backends::VULKAN | wgpu::Backends::DX12,
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .context("Failed to find a suitable GPU adapter")?;

        log::info!("Using GPU: {}", adapter.get_info().name);
        log::info!("Backend: {:?}", adapter.get_info().backend);

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("vjgen_device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default(),
                    ..Default::default()
                },
                None,
            )
            .await
            .context("Failed to create GPU device")?;

        Ok(Self { device, queue })
    }
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
struct PassUniforms {
    resolution: [f32; 2],
    time: f32,
    intensity: f32,
}

struct ShaderPass {
    pipeline: wgpu::RenderPipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    uniform_buffer: wgpu::Buffer,
}

pub struct ShaderChain {
    passes: Vec<ShaderPass>,
    ping_texture: wgpu::Texture,
    pong_texture: wgpu::Texture,
    ping_view: wgpu::TextureView,
    pong_view: wgpu::TextureView,
    readback: wgpu::Buffer,
    padded_bytes_per_row: u32,
    width: u32,
    height: u32,
}

impl ShaderChain {
    /// Builds passes for the named effects or presets (`crt`, `all`).
    /// Unknown names are skipped with a warning.
    pub fn new(device: &wgpu::Device, width: u32, height: u32, effects: &[&str]) -> Result<Self> {
        let make_texture = |label: &str| {
            device.create_texture(&wgpu::TextureDescriptor {
                label: Some(label),
                size: wgpu::Extent3d { width, height, depth_or_array_layers: 1 },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: TEXTURE_FORMAT,
                usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                    | wgpu::TextureUsages::TEXTURE_BINDING
                    | wgpu::TextureUsages::COPY_SRC
                    | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            })
        };

        let ping_texture = make_texture("shader_ping");
        let pong_texture = make_texture("shader_pong");
        let ping_view = ping_texture.create_view(&Default::default());
        let pong_view = pong_texture.create_view(&Default::default());

        let mut passes = Vec::new();
        for name in expand_presets(effects) {
            match pass_source(name) {
                Some(source) => passes.push(ShaderPass::new(device, &source, name)),
                None => log::warn!("Unknown shader pass: {}", name),
            }
        }

        let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let padded_bytes_per_row = (width * 4).div_ceil(align) * align;
        let readback = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("shader_readback"),
            size: (padded_bytes_per_row * height) as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        Ok(Self {
            passes,
            ping_texture,
            pong_texture,
            ping_view,
            pong_view,
            readback,
            padded_bytes_per_row,
            width,
            height,
        })
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn pass_count(&self) -> usize {
        self.passes.len()
    }

    /// Uploads `input`, runs every pass and writes the result into `output`.
    /// Both surfaces must match the chain size.
    pub fn run(&self, gpu: &GpuContext, input: &Surface, output: &mut Surface, time: f32, intensity: f32) -> Result<()> {
        anyhow::ensure!(
            input.width() == self.width && input.height() == self.height,
            "input is {}x{}, chain is {}x{}",
            input.width(),
            input.height(),
            self.width,
            self.height
        );
        output.resize(self.width, self.height);

        let extent = wgpu::Extent3d { width: self.width, height: self.height, depth_or_array_layers: 1 };
        gpu.queue.write_texture(
            self.ping_texture.as_image_copy(),
            input.pixels(),
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(self.width * 4),
                rows_per_image: Some(self.height),
            },
            extent,
        );

        let textures = [&self.ping_texture, &self.pong_texture];
        let views = [&self.ping_view, &self.pong_view];

        for (i, pass) in self.passes.iter().enumerate() {
            let src_idx = i % 2;
            let dst_idx = (i + 1) % 2;

            let uniforms = PassUniforms {
                resolution: [self.width as f32, self.height as f32],
                time,
                intensity,
            };
            gpu.queue.write_buffer(&pass.uniform_buffer, 0, bytemuck::bytes_of(&uniforms));

            let bind_group = gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("shader_bind_group"),
                layout: &pass.bind_group_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: pass.uniform_buffer.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::TextureView(views[src_idx]),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: wgpu::BindingResource::Sampler(&pass.sampler),
                    },
                ],
            });

            let mut encoder = gpu.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("shader_encoder"),
            });
            {
                let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                    label: Some("shader_pass"),
                    color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                        view: views[dst_idx],
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
                render_pass.set_pipeline(&pass.pipeline);
                render_pass.set_bind_group(0, &bind_group, &[]);
                render_pass.draw(0..3, 0..1); // fullscreen triangle
            }
            gpu.queue.submit(std::iter::once(encoder.finish()));
        }

        let result = textures[self.passes.len() % 2];
        self.read_into(gpu, result, output)
    }

    fn read_into(&self, gpu: &GpuContext, texture: &wgpu::Texture, output: &mut Surface) -> Result<()> {
        let mut encoder = gpu.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("readback_encoder"),
        });
        encoder.copy_texture_to_buffer(
            texture.as_image_copy(),
            wgpu::TexelCopyBufferInfo {
                buffer: &self.readback,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(self.padded_bytes_per_row),
                    rows_per_image: Some(self.height),
                },
            },
            wgpu::Extent3d { width: self.width, height: self.height, depth_or_array_layers: 1 },
        );
        gpu.queue.submit(std::iter::once(encoder.finish()));

        let slice = self.readback.slice(..);
        let (sender, receiver) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        gpu.device.poll(wgpu::Maintain::Wait);
        receiver.recv()?.context("Failed to map readback buffer")?;

        {
            let data = slice.get_mapped_range();
            let row_bytes = (self.width * 4) as usize;
            // strip row padding
            for (row, out) in output.pixels_mut().chunks_exact_mut(row_bytes).enumerate() {
                let start = row * self.padded_bytes_per_row as usize;
                out.copy_from_slice(&data[start..start + row_bytes]);
            }
        }
        self.readback.unmap();
        Ok(())
    }
}

impl ShaderPass {
    fn new(device: &wgpu::Device, shader_source: &str, name: &str) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(name),
            source: wgpu::ShaderSource::Wgsl(shader_source.into()),
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("shader_sampler"),
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("shader_bind_group_layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("shader_pipeline_layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(name),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                buffers: &[],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: TEXTURE_FORMAT,
                    blend: Some(wgpu::BlendState::REPLACE),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                ..Default::default()
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("shader_uniforms"),
            size: std::mem::size_of::<PassUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        Self {
            pipeline,
            bind_group_layout,
            sampler,
            uniform_buffer,
        }
    }
}

pub fn expand_presets<'a>(effects: &[&'a str]) -> Vec<&'a str> {
    let mut result = Vec::new();
    for &e in effects {
        match e {
            "none" => return Vec::new(),
            "crt" => result.extend_from_slice(&[
                "crt_scanlines",
                "chromatic_aberration",
                "vignette",
                "film_grain",
                "color_grading",
            ]),
            "all" => result.extend_from_slice(&[
                "bloom",
                "crt_scanlines",
                "chromatic_aberration",
                "vignette",
                "film_grain",
                "color_grading",
            ]),
            other => result.push(other),
        }
    }
    result
}

const COMMON_HEADER: &str = r#"
struct PassUniforms {
    resolution: vec2<f32>,
    time: f32,
    intensity: f32,
};

@group(0) @binding(0) var<uniform> pp: PassUniforms;
@group(0) @binding(1) var input_tex: texture_2d<f32>;
@group(0) @binding(2) var input_sampler: sampler;

struct VertexOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) uv: vec2<f32>,
};

@vertex
fn vs_main(@builtin(vertex_index) vertex_index: u32) -> VertexOutput {
    var out: VertexOutput;
    let x = f32(i32(vertex_index) / 2) * 4.0 - 1.0;
    let y = f32(i32(vertex_index) % 2) * 4.0 - 1.0;
    out.position = vec4<f32>(x, y, 0.0, 1.0);
    out.uv = vec2<f32>((x + 1.0) * 0.5, (1.0 - y) * 0.5);
    return out;
}
"#;

fn pass_source(name: &str) -> Option<String> {
    let fragment = match name {
        "bloom" => r#"
fn luminance(c: vec3<f32>) -> f32 {
    return dot(c, vec3<f32>(0.2126, 0.7152, 0.0722));
}

@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    let texel_size = 1.0 / pp.resolution;
    var color = textureSample(input_tex, input_sampler, in.uv).rgb;

    var bloom_color = vec3<f32>(0.0);
    let radius = 4;
    var total_weight = 0.0;

    for (var x = -radius; x <= radius; x++) {
        for (var y = -radius; y <= radius; y++) {
            let offset = vec2<f32>(f32(x), f32(y)) * texel_size * 2.0;
            let sample_color = textureSample(input_tex, input_sampler, in.uv + offset).rgb;
            if luminance(sample_color) > 0.6 {
                let w = 1.0 / (1.0 + f32(x * x + y * y));
                bloom_color += sample_color * w;
                total_weight += w;
            }
        }
    }

    if total_weight > 0.0 {
        bloom_color /= total_weight;
    }

    color += bloom_color * 0.4 * pp.intensity;
    return vec4<f32>(color, 1.0);
}
"#,
        "chromatic_aberration" => r#"
@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    let dir = in.uv - vec2<f32>(0.5, 0.5);
    let offset = dir * length(dir) * 0.008 * pp.intensity;

    let r = textureSample(input_tex, input_sampler, in.uv + offset).r;
    let g = textureSample(input_tex, input_sampler, in.uv).g;
    let b = textureSample(input_tex, input_sampler, in.uv - offset).b;

    return vec4<f32>(r, g, b, 1.0);
}
"#,
        "vignette" => r#"
@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    var color = textureSample(input_tex, input_sampler, in.uv).rgb;
    let dist = distance(in.uv, vec2<f32>(0.5, 0.5)) * 1.4142;
    color *= 1.0 - smoothstep(0.4, 1.2, dist) * 0.7 * pp.intensity;
    return vec4<f32>(color, 1.0);
}
"#,
        "film_grain" => r#"
fn hash(p: vec2<f32>) -> f32 {
    var p3 = fract(vec3<f32>(p.x, p.y, p.x) * 0.1031);
    p3 += dot(p3, vec3<f32>(p3.y + 33.33, p3.z + 33.33, p3.x + 33.33));
    return fract((p3.x + p3.y) * p3.z);
}

@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    var color = textureSample(input_tex, input_sampler, in.uv).rgb;
    let noise = hash(in.uv * pp.resolution + vec2<f32>(pp.time * 1000.0, pp.time * 573.0));
    color += vec3<f32>((noise - 0.5) * 0.08 * pp.intensity);
    return vec4<f32>(color, 1.0);
}
"#,
        "crt_scanlines" => r#"
@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    let center = in.uv - vec2<f32>(0.5, 0.5);
    let barrel = 0.15 * pp.intensity;
    let uv = in.uv + center * dot(center, center) * barrel;

    if uv.x < 0.0 || uv.x > 1.0 || uv.y < 0.0 || uv.y > 1.0 {
        return vec4<f32>(0.0, 0.0, 0.0, 1.0);
    }

    var color = textureSample(input_tex, input_sampler, uv).rgb;

    let scanline = sin(uv.y * pp.resolution.y * 0.5 * 3.14159) * 0.5 + 0.5;
    color *= 1.0 - 0.15 * pp.intensity * (1.0 - scanline);

    let phosphor = sin(uv.x * pp.resolution.x * 3.14159) * 0.5 + 0.5;
    color *= 0.95 + 0.05 * phosphor;

    return vec4<f32>(color, 1.0);
}
"#,
        "color_grading" => r#"
@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    var color = textureSample(input_tex, input_sampler, in.uv).rgb;
    color = (color - 0.5) * 1.15 + 0.5;
    color.r *= 1.02;
    color.b *= 0.98;
    let gray = dot(color, vec3<f32>(0.2126, 0.7152, 0.0722));
    color = clamp(mix(vec3<f32>(gray), color, 1.1), vec3<f32>(0.0), vec3<f32>(1.0));
    return vec4<f32>(color, 1.0);
}
"#,
        _ => return None,
    };

    Some(format!("{}{}", COMMON_HEADER, fragment))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_expand() {
        assert_eq!(expand_presets(&["crt"]).len(), 5);
        assert_eq!(expand_presets(&["all"])[0], "bloom");
        assert!(expand_presets(&["bloom", "none"]).is_empty());
    }

    #[test]
    fn every_expanded_pass_has_source() {
        for name in expand_presets(&["all"]) {
            assert!(pass_source(name).is_some(), "{}", name);
        }
        assert!(pass_source("sepia").is_none());
    }
}

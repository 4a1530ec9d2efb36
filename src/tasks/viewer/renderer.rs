use std::borrow::Cow;

use bytemuck::{Pod, Zeroable};
use image::RgbaImage;
use image::imageops::{self, FilterType};
use tracing::{debug, warn};
use wgpu::util::DeviceExt;

use super::session::{FrameDescriptor, InstalledModel};
use crate::processing::image_buffer::ImageBuffer;
use crate::processing::mesh::Mesh;
use crate::tasks::loader::fit_within;

const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub uv: [f32; 2],
}

impl Vertex {
    const ATTRIBUTES: [wgpu::VertexAttribute; 2] =
        wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x2];

    fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<Vertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRIBUTES,
        }
    }
}

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct Uniforms {
    pub view_proj: [[f32; 4]; 4],
    pub model: [[f32; 4]; 4],
}

impl Uniforms {
    pub fn from_frame(frame: &FrameDescriptor) -> Self {
        Self {
            view_proj: frame.view_proj.to_cols_array_2d(),
            model: frame.model.to_cols_array_2d(),
        }
    }
}

/// Interleaves positions and texture coordinates for upload.
pub fn vertices_of(mesh: &Mesh) -> Vec<Vertex> {
    mesh.vertices()
        .iter()
        .zip(mesh.uvs())
        .map(|(&position, &uv)| Vertex { position, uv })
        .collect()
}

/// The photo as it will be uploaded, shrunk when an edge exceeds `max_side`.
pub fn fit_texture(image: &ImageBuffer, max_side: u32) -> Cow<'_, ImageBuffer> {
    let (w, h) = image.dimensions();
    let (nw, nh) = fit_within(w, h, max_side);
    if (nw, nh) == (w, h) {
        return Cow::Borrowed(image);
    }
    let Some(src) = RgbaImage::from_raw(w, h, image.as_raw().to_vec()) else {
        return Cow::Borrowed(image);
    };
    let resized = imageops::resize(&src, nw, nh, FilterType::Triangle);
    match ImageBuffer::try_from(resized) {
        Ok(fitted) => {
            warn!(
                from_w = w,
                from_h = h,
                to_w = nw,
                to_h = nh,
                "photo exceeds GPU texture limit, downscaling"
            );
            Cow::Owned(fitted)
        }
        Err(_) => Cow::Borrowed(image),
    }
}

/// Whether the mesh's vertex and index buffers each fit in `max_buffer_size` bytes.
pub fn fits_buffer_limit(mesh: &Mesh, max_buffer_size: u64) -> bool {
    let vertex_bytes = (mesh.vertex_count() * std::mem::size_of::<Vertex>()) as u64;
    let index_bytes = std::mem::size_of_val(mesh.indices()) as u64;
    vertex_bytes <= max_buffer_size && index_bytes <= max_buffer_size
}

/// GPU copy of one installed model.
struct GpuModel {
    generation: u64,
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    index_count: u32,
    _texture: wgpu::Texture,
    bind_group: wgpu::BindGroup,
}

pub struct MeshRenderer {
    single_sided: wgpu::RenderPipeline,
    double_sided: wgpu::RenderPipeline,
    uniform_buffer: wgpu::Buffer,
    uniform_bind_group: wgpu::BindGroup,
    texture_layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    depth_view: wgpu::TextureView,
    model: Option<GpuModel>,
}

impl MeshRenderer {
    pub fn new(
        device: &wgpu::Device,
        format: wgpu::TextureFormat,
        width: u32,
        height: u32,
    ) -> Self {
        let uniform_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("mesh-uniform-layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });
        let texture_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("mesh-texture-layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        multisampled: false,
                        view_dimension: wgpu::TextureViewDimension::D2,
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let uniform_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("mesh-uniforms"),
            contents: bytemuck::bytes_of(&Uniforms::zeroed()),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let uniform_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("mesh-uniform-bind-group"),
            layout: &uniform_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform_buffer.as_entire_binding(),
            }],
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("mesh-photo-sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("mesh-shader"),
            source: wgpu::ShaderSource::Wgsl(std::borrow::Cow::Borrowed(include_str!(
                "mesh.wgsl"
            ))),
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("mesh-pipeline-layout"),
            bind_group_layouts: &[&uniform_layout, &texture_layout],
            push_constant_ranges: &[],
        });

        let build = |label: &'static str, cull_mode: Option<wgpu::Face>| {
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(label),
                layout: Some(&pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &shader,
                    entry_point: Some("vs_main"),
                    buffers: &[Vertex::layout()],
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                },
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    strip_index_format: None,
                    front_face: wgpu::FrontFace::Ccw,
                    cull_mode,
                    unclipped_depth: false,
                    polygon_mode: wgpu::PolygonMode::Fill,
                    conservative: false,
                },
                depth_stencil: Some(wgpu::DepthStencilState {
                    format: DEPTH_FORMAT,
                    depth_write_enabled: true,
                    depth_compare: wgpu::CompareFunction::Less,
                    stencil: wgpu::StencilState::default(),
                    bias: wgpu::DepthBiasState::default(),
                }),
                multisample: wgpu::MultisampleState::default(),
                fragment: Some(wgpu::FragmentState {
                    module: &shader,
                    entry_point: Some("fs_main"),
                    targets: &[Some(wgpu::ColorTargetState {
                        format,
                        blend: Some(wgpu::BlendState::REPLACE),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                }),
                multiview: None,
                cache: None,
            })
        };
        let single_sided = build("mesh-pipeline-culled", Some(wgpu::Face::Back));
        let double_sided = build("mesh-pipeline-double-sided", None);

        Self {
            single_sided,
            double_sided,
            uniform_buffer,
            uniform_bind_group,
            texture_layout,
            sampler,
            depth_view: create_depth_view(device, width, height),
            model: None,
        }
    }

    pub fn resize(&mut self, device: &wgpu::Device, width: u32, height: u32) {
        self.depth_view = create_depth_view(device, width, height);
    }

    /// Brings GPU resources in line with the session's model. The previous
    /// model's buffers are dropped before the next one is uploaded.
    pub fn sync_model(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        installed: Option<&InstalledModel>,
    ) {
        let current = self.model.as_ref().map(|m| m.generation);
        let wanted = installed.map(|m| m.generation);
        if current == wanted {
            return;
        }
        if let Some(old) = self.model.take() {
            debug!(generation = old.generation, "dropping GPU model");
        }
        let Some(installed) = installed else {
            return;
        };
        let limits = device.limits();
        if !fits_buffer_limit(&installed.mesh, limits.max_buffer_size) {
            warn!(
                generation = installed.generation,
                vertices = installed.mesh.vertex_count(),
                max_buffer_size = limits.max_buffer_size,
                "mesh exceeds GPU buffer limit, not uploading"
            );
            return;
        }
        self.model = Some(self.upload(
            device,
            queue,
            installed,
            limits.max_texture_dimension_2d,
        ));
    }

    fn upload(
        &self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        installed: &InstalledModel,
        max_texture_side: u32,
    ) -> GpuModel {
        let mesh = &installed.mesh;
        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("mesh-vertices"),
            contents: bytemuck::cast_slice(&vertices_of(mesh)),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("mesh-indices"),
            contents: bytemuck::cast_slice(mesh.indices()),
            usage: wgpu::BufferUsages::INDEX,
        });

        let image = fit_texture(mesh.texture(), max_texture_side);
        let (w, h) = image.dimensions();
        let size = wgpu::Extent3d {
            width: w,
            height: h,
            depth_or_array_layers: 1,
        };
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("mesh-photo"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8UnormSrgb,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        queue.write_texture(
            texture.as_image_copy(),
            image.as_raw(),
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(4 * w),
                rows_per_image: Some(h),
            },
            size,
        );
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("mesh-texture-bind-group"),
            layout: &self.texture_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
            ],
        });

        debug!(
            generation = installed.generation,
            vertices = mesh.vertex_count(),
            width = w,
            height = h,
            "uploaded GPU model"
        );
        GpuModel {
            generation: installed.generation,
            vertex_buffer,
            index_buffer,
            index_count: mesh.indices().len().min(u32::MAX as usize) as u32,
            _texture: texture,
            bind_group,
        }
    }

    pub fn render(
        &self,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
        target: &wgpu::TextureView,
        frame: &FrameDescriptor,
    ) {
        queue.write_buffer(
            &self.uniform_buffer,
            0,
            bytemuck::bytes_of(&Uniforms::from_frame(frame)),
        );
        let [r, g, b, a] = frame.clear_color;
        let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("mesh-pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: target,
                resolve_target: None,
                depth_slice: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color { r, g, b, a }),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: &self.depth_view,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(1.0),
                    store: wgpu::StoreOp::Discard,
                }),
                stencil_ops: None,
            }),
            occlusion_query_set: None,
            timestamp_writes: None,
        });

        let Some(model) = self.model.as_ref() else {
            return;
        };
        let pipeline = if frame.double_sided {
            &self.double_sided
        } else {
            &self.single_sided
        };
        rpass.set_pipeline(pipeline);
        rpass.set_bind_group(0, &self.uniform_bind_group, &[]);
        rpass.set_bind_group(1, &model.bind_group, &[]);
        rpass.set_vertex_buffer(0, model.vertex_buffer.slice(..));
        rpass.set_index_buffer(model.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
        rpass.draw_indexed(0..model.index_count, 0, 0..1);
    }
}

fn create_depth_view(device: &wgpu::Device, width: u32, height: u32) -> wgpu::TextureView {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("mesh-depth"),
        size: wgpu::Extent3d {
            width: width.max(1),
            height: height.max(1),
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: DEPTH_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        view_formats: &[],
    });
    texture.create_view(&wgpu::TextureViewDescriptor::default())
}

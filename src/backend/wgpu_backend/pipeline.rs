//! Render pipelines for immediate draws
//!
//! Fixed-function state that wgpu bakes into pipelines (topology, depth
//! mode, color writes, target formats) is turned into a [`PipelineKey`];
//! pipelines are built on first use and cached per key.

use std::collections::HashMap;

use crate::backend::types::ClipVertex;

const SHADER: &str = r#"
struct VertexInput {
    @location(0) position: vec4<f32>,
    @location(1) color: vec4<f32>,
    @location(2) uv: vec2<f32>,
};

struct VertexOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) color: vec4<f32>,
    @location(1) uv: vec2<f32>,
};

@group(0) @binding(0) var color_texture: texture_2d<f32>;
@group(0) @binding(1) var color_sampler: sampler;

@vertex
fn vs_main(in: VertexInput) -> VertexOutput {
    var out: VertexOutput;
    out.position = in.position;
    out.color = in.color;
    out.uv = in.uv;
    return out;
}

@fragment
fn fs_flat(in: VertexOutput) -> @location(0) vec4<f32> {
    return in.color;
}

@fragment
fn fs_textured(in: VertexOutput) -> @location(0) vec4<f32> {
    return in.color * textureSample(color_texture, color_sampler, in.uv);
}
"#;

/// How a draw interacts with the depth attachment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(super) enum DepthMode {
    /// No test, no writes
    Ignore,
    /// GL `LESS` test with writes
    Less,
    /// Always pass and write, used by clears
    Overwrite,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(super) struct PipelineKey {
    pub topology: wgpu::PrimitiveTopology,
    pub color_format: Option<wgpu::TextureFormat>,
    pub has_depth: bool,
    pub depth: DepthMode,
    pub write_color: bool,
    pub textured: bool,
}

pub(super) struct PipelineCache {
    module: wgpu::ShaderModule,
    texture_layout: wgpu::BindGroupLayout,
    flat_layout: wgpu::PipelineLayout,
    textured_layout: wgpu::PipelineLayout,
    pipelines: HashMap<PipelineKey, wgpu::RenderPipeline>,
}

impl PipelineCache {
    pub fn new(device: &wgpu::Device) -> Self {
        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("mosaic-immediate-shader"),
            source: wgpu::ShaderSource::Wgsl(SHADER.into()),
        });

        let texture_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("mosaic-texture-layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
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

        let flat_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("mosaic-flat-pipeline-layout"),
            bind_group_layouts: &[],
            push_constant_ranges: &[],
        });
        let textured_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("mosaic-textured-pipeline-layout"),
            bind_group_layouts: &[&texture_layout],
            push_constant_ranges: &[],
        });

        Self {
            module,
            texture_layout,
            flat_layout,
            textured_layout,
            pipelines: HashMap::new(),
        }
    }

    pub fn texture_layout(&self) -> &wgpu::BindGroupLayout {
        &self.texture_layout
    }

    pub fn len(&self) -> usize {
        self.pipelines.len()
    }

    pub fn get(&mut self, device: &wgpu::Device, key: PipelineKey) -> &wgpu::RenderPipeline {
        let Self {
            module,
            flat_layout,
            textured_layout,
            pipelines,
            ..
        } = self;
        pipelines.entry(key).or_insert_with(|| {
            log::trace!("WgpuBackend: building pipeline {:?}", key);
            let layout: &wgpu::PipelineLayout = if key.textured {
                textured_layout
            } else {
                flat_layout
            };
            build_pipeline(device, module, layout, key)
        })
    }
}

fn build_pipeline(
    device: &wgpu::Device,
    module: &wgpu::ShaderModule,
    layout: &wgpu::PipelineLayout,
    key: PipelineKey,
) -> wgpu::RenderPipeline {
    let write_mask = if key.write_color {
        wgpu::ColorWrites::ALL
    } else {
        wgpu::ColorWrites::empty()
    };
    let targets: Vec<Option<wgpu::ColorTargetState>> = key
        .color_format
        .map(|format| wgpu::ColorTargetState {
            format,
            blend: None,
            write_mask,
        })
        .into_iter()
        .map(Some)
        .collect();

    let depth_stencil = key.has_depth.then(|| wgpu::DepthStencilState {
        format: wgpu::TextureFormat::Depth32Float,
        depth_write_enabled: key.depth != DepthMode::Ignore,
        depth_compare: match key.depth {
            DepthMode::Less => wgpu::CompareFunction::Less,
            DepthMode::Ignore | DepthMode::Overwrite => wgpu::CompareFunction::Always,
        },
        stencil: wgpu::StencilState::default(),
        bias: wgpu::DepthBiasState::default(),
    });

    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some("mosaic-immediate-pipeline"),
        layout: Some(layout),
        vertex: wgpu::VertexState {
            module,
            entry_point: "vs_main",
            buffers: &[wgpu::VertexBufferLayout {
                array_stride: std::mem::size_of::<ClipVertex>() as wgpu::BufferAddress,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes: &wgpu::vertex_attr_array![
                    0 => Float32x4,
                    1 => Float32x4,
                    2 => Float32x2
                ],
            }],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        },
        primitive: wgpu::PrimitiveState {
            topology: key.topology,
            ..Default::default()
        },
        depth_stencil,
        multisample: wgpu::MultisampleState::default(),
        fragment: key.color_format.map(|_| wgpu::FragmentState {
            module,
            entry_point: if key.textured { "fs_textured" } else { "fs_flat" },
            targets: &targets,
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        }),
        multiview: None,
    })
}

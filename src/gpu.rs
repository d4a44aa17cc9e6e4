use std::time::Duration;
use wgpu::util::DeviceExt;
use anyhow::{Context, Result, anyhow, bail, ensure};
use log::{debug, info};
use crate::{
    Float,
    executor::{KernelParams, StepExecutor},
    fields::Fields,
    lattice::D3Q19,
    topology::{CellFlag, ExecutionMode},
};

const SHADER_BODY: &str = include_str!("shaders/lbm.wgsl");

/// Matches `@workgroup_size(8, 8, 1)` in the shader
const WORKGROUP_SIZE_XY: u32 = 8;

/// Device and queue shared by every GPU resource of a run.
pub struct GPUContext {
    device: wgpu::Device,
    queue: wgpu::Queue,
}

impl GPUContext {
    pub async fn new() -> Result<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                force_fallback_adapter: false,
                compatible_surface: None,
            })
            .await
            .context("no suitable GPU adapter found")?;

        let adapter_info = adapter.get_info();
        info!("GPU Adapter Selected: {} ({:?}, {:?}, {:?})",
              adapter_info.name, adapter_info.vendor, adapter_info.device_type, adapter_info.backend);

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("LBM Device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: adapter.limits(),
                    memory_hints: wgpu::MemoryHints::Performance,
                    ..Default::default()
                },
            )
            .await
            .context("failed to open GPU device")?;

        Ok(Self { device, queue })
    }

    /// Block until all submitted work has finished.
    fn wait(&self) -> Result<()> {
        self.device
            .poll(wgpu::PollType::Wait)
            .map(|_| ())
            .map_err(|err| anyhow!("GPU device poll failed: {:?}", err))
    }

    async fn read_buffer(&self, buffer: &wgpu::Buffer, size: u64) -> Result<Vec<Float>> {
        let staging_buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Staging Buffer"),
            size,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Copy Encoder"),
        });
        encoder.copy_buffer_to_buffer(buffer, 0, &staging_buffer, 0, size);
        self.queue.submit(std::iter::once(encoder.finish()));

        let buffer_slice = staging_buffer.slice(..);
        let (sender, receiver) = futures::channel::oneshot::channel();
        buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });

        self.wait()?;
        receiver
            .await
            .context("staging buffer mapping was dropped")?
            .context("failed to map staging buffer")?;

        let data = buffer_slice.get_mapped_range();
        let result: Vec<Float> = bytemuck::cast_slice(&data).to_vec();

        drop(data);
        staging_buffer.unmap();

        Ok(result)
    }
}

/// Device-resident copies of the distribution and flag fields.
///
/// The two distribution buffers ping-pong: `front` holds the current state
/// (the host's `collide`), the other one is scratch space (`stream`).
pub struct DeviceFields {
    distributions: [wgpu::Buffer; 2],
    flags: wgpu::Buffer,
    front: usize,
    size: u64,
}

impl DeviceFields {
    /// Upload the host fields.
    pub fn init(gpu: &GPUContext, fields: &Fields) -> Result<Self> {
        let size = std::mem::size_of_val(fields.distributions.collide()) as u64;
        let limit = gpu.device.limits().max_storage_buffer_binding_size as u64;
        ensure!(
            size <= limit,
            "distribution field needs {} bytes, device allows {} per storage buffer",
            size, limit
        );

        let usage = wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::COPY_SRC;
        let collide_buffer = gpu.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Collide Buffer"),
            contents: bytemuck::cast_slice(fields.distributions.collide()),
            usage,
        });
        let stream_buffer = gpu.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Stream Buffer"),
            contents: bytemuck::cast_slice(fields.distributions.stream()),
            usage,
        });
        let flags = gpu.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Flag Buffer"),
            contents: bytemuck::cast_slice(&fields.flags.codes()),
            usage: wgpu::BufferUsages::STORAGE,
        });

        debug!("Uploaded {} bytes per distribution field to the GPU", size);

        Ok(Self {
            distributions: [collide_buffer, stream_buffer],
            flags,
            front: 0,
            size,
        })
    }

    /// Copy both distribution buffers back into `fields`.
    pub fn sync_to_host(&self, gpu: &GPUContext, fields: &mut Fields) -> Result<()> {
        let collide = pollster::block_on(gpu.read_buffer(&self.distributions[self.front], self.size))?;
        let stream = pollster::block_on(gpu.read_buffer(&self.distributions[1 - self.front], self.size))?;

        ensure!(
            collide.len() == fields.distributions.collide().len(),
            "device field has {} values, host field {}",
            collide.len(), fields.distributions.collide().len()
        );
        fields.distributions.collide_mut().copy_from_slice(&collide);
        fields.distributions.stream_mut().copy_from_slice(&stream);
        Ok(())
    }

    pub fn release(self) {
        for buffer in &self.distributions {
            buffer.destroy();
        }
        self.flags.destroy();
    }

    fn flip(&mut self) {
        self.front = 1 - self.front;
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct GPUParams {
    step: u32,
    node_count: u32,
    tau: f32,
    padding: f32,
    wall_velocity: [f32; 4], // 16 bytes aligned
}

/// WGSL constants derived from the lattice model and flag codes.
fn shader_prelude() -> String {
    let q = D3Q19::Q;
    let velocities = D3Q19::VELOCITIES
        .iter()
        .map(|c| format!("vec3<i32>({}, {}, {})", c[0], c[1], c[2]))
        .collect::<Vec<_>>()
        .join(", ");
    let weights = D3Q19::WEIGHTS
        .iter()
        .map(|w| format!("{:?}", w))
        .collect::<Vec<_>>()
        .join(", ");
    let moving_wall_mask = CellFlag::all()
        .filter(|flag| flag.is_moving_wall())
        .fold(0u32, |mask, flag| mask | (1 << flag.code()));

    format!(
        "const Q: u32 = {q}u;\n\
         const FLUID: u32 = {fluid}u;\n\
         const CS2: f32 = {cs2:?};\n\
         const MOVING_WALL_MASK: u32 = {moving_wall_mask}u;\n\
         var<private> VELOCITIES: array<vec3<i32>, {q}> = array<vec3<i32>, {q}>({velocities});\n\
         var<private> WEIGHTS: array<f32, {q}> = array<f32, {q}>({weights});\n",
        fluid = CellFlag::Fluid.code(),
        cs2 = D3Q19::CS2,
    )
}

pub fn shader_source() -> String {
    format!("{}\n{}", shader_prelude(), SHADER_BODY)
}

/// Runs the fused stream/collide/boundary iteration on the GPU.
pub struct AcceleratorExecutor {
    gpu: GPUContext,
    device_fields: DeviceFields,
    params_buffer: wgpu::Buffer,
    stream_collide_pipeline: wgpu::ComputePipeline,
    boundary_pipeline: wgpu::ComputePipeline,
    // bind_groups[k] reads distributions[k] and writes the other buffer
    bind_groups: [wgpu::BindGroup; 2],
    dispatch: [u32; 3],
}

impl AcceleratorExecutor {
    pub async fn new(params: KernelParams, fields: &Fields) -> Result<Self> {
        ensure!(
            fields.mode() == ExecutionMode::Accelerator,
            "accelerator executor needs an accelerator-mode flag field, got {:?}",
            fields.mode()
        );

        let gpu = GPUContext::new().await?;
        let device_fields = DeviceFields::init(&gpu, fields)?;
        let grid = fields.grid();
        let step = u32::try_from(grid.step()).context("grid too large for the GPU path")?;
        let node_count = u32::try_from(grid.node_count()).context("grid too large for the GPU path")?;

        let gpu_params = GPUParams {
            step,
            node_count,
            tau: params.tau,
            padding: 0.0,
            wall_velocity: [
                params.wall_velocity.x,
                params.wall_velocity.y,
                params.wall_velocity.z,
                0.0, // padding
            ],
        };
        let params_buffer = gpu.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Params Buffer"),
            contents: bytemuck::cast_slice(&[gpu_params]),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        gpu.device.push_error_scope(wgpu::ErrorFilter::Validation);

        let shader = gpu.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("LBM Shader"),
            source: wgpu::ShaderSource::Wgsl(shader_source().into()),
        });

        let storage_entry = |binding: u32, read_only: bool| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Storage { read_only },
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        };
        let bind_group_layout = gpu.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("LBM Bind Group Layout"),
            entries: &[
                storage_entry(0, true),
                storage_entry(1, false),
                storage_entry(2, true),
                wgpu::BindGroupLayoutEntry {
                    binding: 3,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
            ],
        });

        let pipeline_layout = gpu.device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("LBM Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let create_pipeline = |label: &str, entry_point: &str| {
            gpu.device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(label),
                layout: Some(&pipeline_layout),
                module: &shader,
                entry_point: Some(entry_point),
                compilation_options: Default::default(),
                cache: None,
            })
        };
        let stream_collide_pipeline = create_pipeline("Stream Collide Pipeline", "stream_collide");
        let boundary_pipeline = create_pipeline("Boundary Pipeline", "boundary");

        let create_bind_group = |front: usize| {
            gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("LBM Bind Group"),
                layout: &bind_group_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: device_fields.distributions[front].as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: device_fields.distributions[1 - front].as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: device_fields.flags.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 3,
                        resource: params_buffer.as_entire_binding(),
                    },
                ],
            })
        };
        let bind_groups = [create_bind_group(0), create_bind_group(1)];

        if let Some(err) = gpu.device.pop_error_scope().await {
            bail!("GPU pipeline setup failed: {}", err);
        }

        let dispatch = dispatch_size(step);
        debug!("GPU dispatch: {:?} workgroups", dispatch);

        Ok(Self {
            gpu,
            device_fields,
            params_buffer,
            stream_collide_pipeline,
            boundary_pipeline,
            bind_groups,
            dispatch,
        })
    }
}

fn dispatch_size(step: u32) -> [u32; 3] {
    let groups_xy = step.div_ceil(WORKGROUP_SIZE_XY);
    [groups_xy, groups_xy, step] // one z-slice per workgroup
}

impl StepExecutor for AcceleratorExecutor {
    fn mode(&self) -> ExecutionMode {
        ExecutionMode::Accelerator
    }

    fn advance(&mut self, _fields: &mut Fields) -> Result<Option<Duration>> {
        let mut encoder = self.gpu.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("LBM Step Encoder"),
        });
        let bind_group = &self.bind_groups[self.device_fields.front];
        let [x, y, z] = self.dispatch;

        {
            let mut compute_pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Stream Collide Pass"),
                timestamp_writes: None,
            });
            compute_pass.set_pipeline(&self.stream_collide_pipeline);
            compute_pass.set_bind_group(0, bind_group, &[]);
            compute_pass.dispatch_workgroups(x, y, z);
        }

        // Boundary nodes read the post-collision fluid populations.
        {
            let mut compute_pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Boundary Pass"),
                timestamp_writes: None,
            });
            compute_pass.set_pipeline(&self.boundary_pipeline);
            compute_pass.set_bind_group(0, bind_group, &[]);
            compute_pass.dispatch_workgroups(x, y, z);
        }

        self.gpu.queue.submit(std::iter::once(encoder.finish()));
        self.gpu.wait()?;
        self.device_fields.flip();

        Ok(None)
    }

    fn synchronize(&mut self, fields: &mut Fields) -> Result<()> {
        self.device_fields.sync_to_host(&self.gpu, fields)
    }

    fn release(self: Box<Self>) {
        let this = *self;
        this.params_buffer.destroy();
        this.device_fields.release();
        debug!("Released GPU fields");
    }
}

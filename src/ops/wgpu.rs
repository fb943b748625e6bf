//! GPU-accelerated vector loss using WGPU.
//!
//! This module runs the elementwise part of the loss backward pass,
//! `(prob - exp(-t * label)) / N`, as a WGSL compute shader. The device,
//! shader and pipeline are created once, lazily, on first use (via
//! `lazy_static`) and reused for every call.
//!
//! Calls are synchronous: the gradient is read back into host memory before
//! the function returns. Data is computed in `f32` on the device and
//! converted back to the caller's element type.
//!
//! The loss value itself is reduced on the host with the same routine as the
//! CPU path, reading the caller's probabilities at full precision.
//!
//! Every failure (no adapter, oversized batch, mapping error) is reported as
//! `None` so that the dispatch layer can fall back to the CPU.

use crate::float::Float;
use briny::prelude::*;
use bytemuck::{Pod, Zeroable};
use std::sync::mpsc;
use thiserror::Error;
use wgpu::util::DeviceExt;

const VECTOR_LOSS_GRAD: &str = include_str!("shaders/vector_loss_grad.wgsl");

/// Invocations per workgroup, matching `@workgroup_size` in the shader.
const WORKGROUP_SIZE: u32 = 64;

/// Errors raised while preparing or running the GPU kernel.
#[derive(Debug, Error)]
pub enum GpuError {
    /// No suitable adapter.
    #[error("adapter error: {0}")]
    Adapter(#[from] wgpu::RequestAdapterError),
    /// The adapter refused to open a device.
    #[error("device error: {0}")]
    Device(#[from] wgpu::RequestDeviceError),
    /// A shader source failed validation.
    #[error("shader `{0}` failed validation")]
    Shader(&'static str),
    /// Waiting for the queue failed.
    #[error("poll error: {0}")]
    Poll(#[from] wgpu::PollError),
    /// Reading the result buffer back failed.
    #[error("buffer map error: {0}")]
    Map(#[from] wgpu::BufferAsyncError),
    /// The map callback was dropped without reporting.
    #[error("buffer map callback never ran")]
    MapCancelled,
    /// The batch needs more workgroups than the device can dispatch.
    #[error("{count} elements exceed the dispatch limit of the device")]
    TooLarge { count: usize },
}

/// Secure wrapper for WGSL source code.
pub struct WgslSource<'a>(pub &'a str);

impl Validate for WgslSource<'_> {
    fn validate(&self) -> Result<(), ValidationError> {
        let src = self.0;

        if src.len() > 65536 {
            return Err(ValidationError);
        }

        if !src.contains("fn main") {
            return Err(ValidationError);
        }

        if src.contains("import") || src.contains("#include") {
            return Err(ValidationError);
        }

        let forbidden = ["asm", "unsafe", "ptr", "std::"];
        if forbidden.iter().any(|bad| src.contains(bad)) {
            return Err(ValidationError);
        }

        Ok(())
    }
}

/// Validates a WGSL shader and compiles it on `device`.
///
/// # Errors
/// [`GpuError::Shader`] if the source fails validation.
pub fn load_shader(
    device: &wgpu::Device,
    label: &'static str,
    source: &str,
) -> Result<wgpu::ShaderModule, GpuError> {
    WgslSource(source)
        .validate()
        .map_err(|_| GpuError::Shader(label))?;

    Ok(device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Wgsl(source.into()),
    }))
}

/// Uniform block of the gradient kernel.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct KernelParams {
    count: u32,
    _pad: u32,
    temperature: f32,
    inv_num: f32,
}

fn storage_entry(binding: u32, read_only: bool) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

/// Device, queue and compiled pipeline of the gradient kernel.
pub struct VectorLossKernel {
    device: wgpu::Device,
    queue: wgpu::Queue,
    layout: wgpu::BindGroupLayout,
    pipeline: wgpu::ComputePipeline,
}

impl VectorLossKernel {
    /// Selects the default adapter, opens a device and compiles the pipeline.
    ///
    /// # Errors
    /// A [`GpuError`] if no adapter or device is available, or the shader is rejected.
    pub fn new() -> Result<Self, GpuError> {
        let instance = wgpu::Instance::default();
        let adapter =
            pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions::default()))?;
        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("vector_loss_device"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            memory_hints: wgpu::MemoryHints::Performance,
            trace: wgpu::Trace::default(),
        }))?;

        let shader = load_shader(&device, "vector_loss_grad", VECTOR_LOSS_GRAD)?;

        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("vector_loss_bgl"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                storage_entry(1, true),
                storage_entry(2, true),
                storage_entry(3, false),
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("vector_loss_pipeline_layout"),
            bind_group_layouts: &[&layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("vector_loss_pipeline"),
            layout: Some(&pipeline_layout),
            module: &shader,
            entry_point: Some("main"),
            cache: None,
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        });

        Ok(Self {
            device,
            queue,
            layout,
            pipeline,
        })
    }

    /// Runs the kernel over `prob`/`label`, blocking until `grad` holds the result.
    ///
    /// # Errors
    /// A [`GpuError`] if the batch is too large to dispatch or the readback fails.
    pub fn run(
        &self,
        prob: &[f32],
        label: &[f32],
        temperature: f32,
        inv_num: f32,
        grad: &mut [f32],
    ) -> Result<(), GpuError> {
        let count = prob.len();
        let groups = u32::try_from(count.div_ceil(WORKGROUP_SIZE as usize))
            .ok()
            .filter(|&g| g <= self.device.limits().max_compute_workgroups_per_dimension)
            .ok_or(GpuError::TooLarge { count })?;
        let count_u32 = u32::try_from(count).map_err(|_| GpuError::TooLarge { count })?;

        let params = KernelParams {
            count: count_u32,
            _pad: 0,
            temperature,
            inv_num,
        };
        let size = std::mem::size_of_val(prob) as u64;

        let params_buf = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("vector_loss_params"),
                contents: bytemuck::bytes_of(&params),
                usage: wgpu::BufferUsages::UNIFORM,
            });
        let prob_buf = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("vector_loss_prob"),
                contents: bytemuck::cast_slice(prob),
                usage: wgpu::BufferUsages::STORAGE,
            });
        let label_buf = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("vector_loss_label"),
                contents: bytemuck::cast_slice(label),
                usage: wgpu::BufferUsages::STORAGE,
            });
        let grad_buf = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("vector_loss_grad"),
            size,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });
        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("vector_loss_staging"),
            size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("vector_loss_bind_group"),
            layout: &self.layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: params_buf.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: prob_buf.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: label_buf.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: grad_buf.as_entire_binding(),
                },
            ],
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("vector_loss_encoder"),
            });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("vector_loss_pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.dispatch_workgroups(groups, 1, 1);
        }
        encoder.copy_buffer_to_buffer(&grad_buf, 0, &staging, 0, size);
        self.queue.submit(Some(encoder.finish()));

        let slice = staging.slice(..);
        let (tx, rx) = mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        self.device.poll(wgpu::PollType::Wait)?;
        rx.recv().map_err(|_| GpuError::MapCancelled)??;

        {
            let view = slice.get_mapped_range();
            grad.copy_from_slice(bytemuck::cast_slice::<u8, f32>(&view));
        }
        staging.unmap();

        Ok(())
    }
}

lazy_static::lazy_static! {
    static ref KERNEL: Option<VectorLossKernel> = match VectorLossKernel::new() {
        Ok(kernel) => Some(kernel),
        Err(err) => {
            tracing::warn!(%err, "WGPU unavailable, vector loss stays on the CPU");
            None
        }
    };
}

/// Computes the score gradient on the GPU and returns the loss.
///
/// # Returns
/// - `Some(loss)` once `grad` holds the device result
/// - `None` if the GPU is unavailable or the dispatch failed; `grad` is then untouched
pub fn wgpu_vector_loss_backward<T: Float>(
    prob: &[T],
    labels: &[T],
    num: usize,
    temperature: T,
    grad: &mut [T],
) -> Option<T> {
    if num == 0 || prob.is_empty() {
        return None;
    }
    let kernel = KERNEL.as_ref()?;

    let p: Vec<f32> = prob.iter().map(|&x| x.into_f32()).collect();
    let l: Vec<f32> = labels.iter().map(|&x| x.into_f32()).collect();
    let mut out = vec![0.0f32; p.len()];
    #[allow(clippy::cast_precision_loss)]
    let inv_num = 1.0 / num as f32;

    if let Err(err) = kernel.run(&p, &l, temperature.into_f32(), inv_num, &mut out) {
        tracing::debug!(%err, "WGPU vector loss dispatch failed");
        return None;
    }

    for (g, v) in grad.iter_mut().zip(out) {
        *g = T::from_f32(v);
    }
    Some(super::cpu::vector_loss_value(prob, labels, num))
}

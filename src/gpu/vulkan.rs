//! Vulkan compute device.
//!
//! Runs `shaders/trace.comp` and `shaders/tonemap.comp` through vulkano.
//! Scene data and images live in storage buffers; images are host-visible so
//! read-back and clearing are plain mapped copies. Every dispatch waits on a
//! fence before returning.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use log::{debug, info};
use vulkano::{
    buffer::{Buffer, BufferContents, BufferCreateInfo, BufferUsage, Subbuffer},
    command_buffer::{
        allocator::StandardCommandBufferAllocator, AutoCommandBufferBuilder, CommandBufferUsage,
    },
    descriptor_set::{
        allocator::StandardDescriptorSetAllocator, DescriptorSet, WriteDescriptorSet,
    },
    device::{
        physical::PhysicalDeviceType, Device, DeviceCreateInfo, DeviceExtensions, Queue,
        QueueCreateInfo, QueueFlags,
    },
    instance::{Instance, InstanceCreateFlags, InstanceCreateInfo},
    memory::allocator::{AllocationCreateInfo, MemoryTypeFilter, StandardMemoryAllocator},
    pipeline::{
        compute::ComputePipelineCreateInfo, layout::PipelineDescriptorSetLayoutCreateInfo,
        ComputePipeline, Pipeline, PipelineBindPoint, PipelineLayout,
        PipelineShaderStageCreateInfo,
    },
    shader::ShaderModule,
    sync::{self, GpuFuture},
    VulkanLibrary,
};

use super::device::{ComputeDevice, ImageKind, SceneBuffer};
use super::layout::{ToneMapUniforms, TraceUniforms};
use super::shaders;
use crate::error::{RenderError, RenderResult};

/// Threads per workgroup edge, as declared by both shaders.
const WORKGROUP_SIZE: u32 = 16;

/// Binding order of the trace shader's scene buffers (bindings 1..=9).
const SCENE_BINDINGS: [SceneBuffer; 9] = SceneBuffer::ALL;

/// Binding order of the trace shader's output images (bindings 10..=13).
const TRACE_IMAGES: [ImageKind; 4] = [
    ImageKind::Accumulation,
    ImageKind::Albedo,
    ImageKind::Normal,
    ImageKind::Depth,
];

pub struct VulkanDevice {
    device: Arc<Device>,
    queue: Arc<Queue>,
    memory_allocator: Arc<StandardMemoryAllocator>,
    descriptor_set_allocator: Arc<StandardDescriptorSetAllocator>,
    command_buffer_allocator: Arc<StandardCommandBufferAllocator>,
    trace_pipeline: Arc<ComputePipeline>,
    tone_map_pipeline: Arc<ComputePipeline>,
    name: String,
    scene: HashMap<SceneBuffer, Subbuffer<[u8]>>,
    images: HashMap<ImageKind, Subbuffer<[f32]>>,
    size: [u32; 2],
}

impl VulkanDevice {
    /// Pick the best compute-capable physical device and build both pipelines.
    pub fn new() -> RenderResult<Self> {
        info!("Initializing Vulkan compute device...");

        let library = VulkanLibrary::new().map_err(RenderError::device)?;
        let instance = Instance::new(
            library,
            InstanceCreateInfo {
                flags: InstanceCreateFlags::ENUMERATE_PORTABILITY,
                ..Default::default()
            },
        )
        .map_err(RenderError::device)?;

        let device_extensions = DeviceExtensions {
            khr_storage_buffer_storage_class: true,
            ..DeviceExtensions::empty()
        };

        let physical_devices: Vec<_> = instance
            .enumerate_physical_devices()
            .map_err(RenderError::device)?
            .collect();
        info!("Available Vulkan devices:");
        for device in &physical_devices {
            info!(
                "  - {} ({:?})",
                device.properties().device_name,
                device.properties().device_type
            );
        }

        let (physical_device, queue_family_index) = physical_devices
            .into_iter()
            .filter(|p| p.supported_extensions().contains(&device_extensions))
            .filter_map(|p| {
                p.queue_family_properties()
                    .iter()
                    .position(|q| q.queue_flags.contains(QueueFlags::COMPUTE))
                    .map(|q| (p, q as u32))
            })
            .min_by_key(|(p, _)| match p.properties().device_type {
                PhysicalDeviceType::DiscreteGpu => 0,
                PhysicalDeviceType::IntegratedGpu => 1,
                PhysicalDeviceType::VirtualGpu => 2,
                PhysicalDeviceType::Cpu => 3,
                _ => 4,
            })
            .ok_or_else(|| RenderError::device("no Vulkan device with a compute queue"))?;

        let name = physical_device.properties().device_name.clone();
        info!(
            "Selected GPU: {} ({:?})",
            name,
            physical_device.properties().device_type
        );

        let (device, mut queues) = Device::new(
            physical_device,
            DeviceCreateInfo {
                queue_create_infos: vec![QueueCreateInfo {
                    queue_family_index,
                    ..Default::default()
                }],
                enabled_extensions: device_extensions,
                ..Default::default()
            },
        )
        .map_err(RenderError::device)?;
        let queue = queues
            .next()
            .ok_or_else(|| RenderError::device("failed to get compute queue"))?;

        let memory_allocator = Arc::new(StandardMemoryAllocator::new_default(device.clone()));
        let descriptor_set_allocator = Arc::new(StandardDescriptorSetAllocator::new(
            device.clone(),
            Default::default(),
        ));
        let command_buffer_allocator = Arc::new(StandardCommandBufferAllocator::new(
            device.clone(),
            Default::default(),
        ));

        let trace_shader = shaders::load_trace(device.clone())?;
        let trace_pipeline = create_compute_pipeline(device.clone(), trace_shader)?;
        let tone_map_shader = shaders::load_tone_map(device.clone())?;
        let tone_map_pipeline = create_compute_pipeline(device.clone(), tone_map_shader)?;

        let mut vulkan = Self {
            device,
            queue,
            memory_allocator,
            descriptor_set_allocator,
            command_buffer_allocator,
            trace_pipeline,
            tone_map_pipeline,
            name,
            scene: HashMap::new(),
            images: HashMap::new(),
            size: [0, 0],
        };
        for buffer in SceneBuffer::ALL {
            vulkan.upload(buffer, &[])?;
        }
        Ok(vulkan)
    }

    fn storage_buffer<T, I>(&self, data: I, host_read: bool) -> RenderResult<Subbuffer<[T]>>
    where
        T: BufferContents,
        I: IntoIterator<Item = T>,
        I::IntoIter: ExactSizeIterator,
    {
        let access = if host_read {
            MemoryTypeFilter::HOST_RANDOM_ACCESS
        } else {
            MemoryTypeFilter::HOST_SEQUENTIAL_WRITE
        };
        Buffer::from_iter(
            self.memory_allocator.clone(),
            BufferCreateInfo {
                usage: BufferUsage::STORAGE_BUFFER,
                ..Default::default()
            },
            AllocationCreateInfo {
                memory_type_filter: MemoryTypeFilter::PREFER_DEVICE | access,
                ..Default::default()
            },
            data,
        )
        .map_err(RenderError::upload)
    }

    fn uniform_buffer<T: BufferContents>(&self, data: T) -> RenderResult<Subbuffer<T>> {
        Buffer::from_data(
            self.memory_allocator.clone(),
            BufferCreateInfo {
                usage: BufferUsage::STORAGE_BUFFER,
                ..Default::default()
            },
            AllocationCreateInfo {
                memory_type_filter: MemoryTypeFilter::PREFER_DEVICE
                    | MemoryTypeFilter::HOST_SEQUENTIAL_WRITE,
                ..Default::default()
            },
            data,
        )
        .map_err(RenderError::upload)
    }

    fn image(&self, kind: ImageKind) -> RenderResult<&Subbuffer<[f32]>> {
        self.images
            .get(&kind)
            .ok_or_else(|| RenderError::dispatch(format!("{:?} image is not allocated", kind)))
    }

    /// Bind `writes` to the pipeline's set 0 and run it over `rect_size`.
    fn dispatch(
        &self,
        pipeline: &Arc<ComputePipeline>,
        writes: Vec<WriteDescriptorSet>,
        rect_size: [u32; 2],
    ) -> RenderResult<()> {
        if rect_size[0] == 0 || rect_size[1] == 0 {
            return Ok(());
        }
        let layout = pipeline
            .layout()
            .set_layouts()
            .first()
            .ok_or_else(|| RenderError::dispatch("pipeline has no descriptor set layout"))?;
        let allocator = self.descriptor_set_allocator.clone();
        let set = DescriptorSet::new(allocator, layout.clone(), writes, [])
            .map_err(RenderError::dispatch)?;

        let mut builder = AutoCommandBufferBuilder::primary(
            self.command_buffer_allocator.clone(),
            self.queue.queue_family_index(),
            CommandBufferUsage::OneTimeSubmit,
        )
        .map_err(RenderError::dispatch)?;

        // SAFETY: the shaders bound here guard every invocation against the
        // dispatched rectangle and every buffer access against its length.
        unsafe {
            builder
                .bind_pipeline_compute(pipeline.clone())
                .map_err(RenderError::dispatch)?
                .bind_descriptor_sets(PipelineBindPoint::Compute, pipeline.layout().clone(), 0, set)
                .map_err(RenderError::dispatch)?
                .dispatch([
                    rect_size[0].div_ceil(WORKGROUP_SIZE),
                    rect_size[1].div_ceil(WORKGROUP_SIZE),
                    1,
                ])
                .map_err(RenderError::dispatch)?;
        }

        let command_buffer = builder.build().map_err(RenderError::dispatch)?;
        let future = sync::now(self.device.clone())
            .then_execute(self.queue.clone(), command_buffer)
            .map_err(RenderError::dispatch)?
            .then_signal_fence_and_flush()
            .map_err(RenderError::dispatch)?;
        future.wait(None).map_err(RenderError::dispatch)
    }
}

fn create_compute_pipeline(
    device: Arc<Device>,
    shader: Arc<ShaderModule>,
) -> RenderResult<Arc<ComputePipeline>> {
    let entry_point = shader
        .entry_point("main")
        .ok_or_else(|| RenderError::ShaderLoad("missing entry point 'main'".into()))?;
    let stage = PipelineShaderStageCreateInfo::new(entry_point);
    let layout = PipelineLayout::new(
        device.clone(),
        PipelineDescriptorSetLayoutCreateInfo::from_stages([&stage])
            .into_pipeline_layout_create_info(device.clone())
            .map_err(|e| RenderError::ShaderLoad(e.to_string()))?,
    )
    .map_err(|e| RenderError::ShaderLoad(e.to_string()))?;

    ComputePipeline::new(device, None, ComputePipelineCreateInfo::stage_layout(stage, layout))
        .map_err(|e| RenderError::ShaderLoad(e.to_string()))
}

impl ComputeDevice for VulkanDevice {
    fn name(&self) -> String {
        format!("Vulkan ({})", self.name)
    }

    fn upload(&mut self, buffer: SceneBuffer, bytes: &[u8]) -> RenderResult<()> {
        // Zero-sized buffers cannot be created; shaders see an empty array.
        let padded: Vec<u8> = if bytes.is_empty() {
            vec![0; 16]
        } else {
            bytes.to_vec()
        };
        let uploaded = self.storage_buffer(padded, false)?;
        debug!("Uploaded {:?}: {} bytes", buffer, bytes.len());
        self.scene.insert(buffer, uploaded);
        Ok(())
    }

    fn allocate_images(&mut self, width: u32, height: u32) -> RenderResult<()> {
        for kind in ImageKind::ALL {
            let len = kind.len(width, height).max(1);
            let image = self.storage_buffer((0..len).map(|_| 0.0f32), true)?;
            self.images.insert(kind, image);
        }
        self.size = [width, height];
        Ok(())
    }

    fn clear_images(&mut self) -> RenderResult<()> {
        for image in self.images.values() {
            image.write().map_err(RenderError::upload)?.fill(0.0);
        }
        Ok(())
    }

    fn trace(&mut self, uniforms: &TraceUniforms) -> RenderResult<()> {
        let start = Instant::now();
        let mut writes = vec![WriteDescriptorSet::buffer(0, self.uniform_buffer(*uniforms)?)];
        for (binding, buffer) in SCENE_BINDINGS.iter().enumerate() {
            let data = self
                .scene
                .get(buffer)
                .ok_or_else(|| RenderError::dispatch(format!("{:?} was never uploaded", buffer)))?;
            writes.push(WriteDescriptorSet::buffer(binding as u32 + 1, data.clone()));
        }
        for (binding, kind) in TRACE_IMAGES.iter().enumerate() {
            writes.push(WriteDescriptorSet::buffer(
                binding as u32 + 1 + SCENE_BINDINGS.len() as u32,
                self.image(*kind)?.clone(),
            ));
        }
        self.dispatch(&self.trace_pipeline, writes, uniforms.rect_size)?;
        debug!(
            "Trace dispatch {}x{} in {:.2?}",
            uniforms.rect_size[0],
            uniforms.rect_size[1],
            start.elapsed()
        );
        Ok(())
    }

    fn tone_map(&mut self, uniforms: &ToneMapUniforms) -> RenderResult<()> {
        let writes = vec![
            WriteDescriptorSet::buffer(0, self.uniform_buffer(*uniforms)?),
            WriteDescriptorSet::buffer(1, self.image(ImageKind::Accumulation)?.clone()),
            WriteDescriptorSet::buffer(2, self.image(ImageKind::Output)?.clone()),
        ];
        self.dispatch(&self.tone_map_pipeline, writes, uniforms.rect_size)
    }

    fn read_image(&mut self, image: ImageKind) -> RenderResult<Vec<f32>> {
        let len = image.len(self.size[0], self.size[1]);
        let guard = self.image(image)?.read().map_err(RenderError::readback)?;
        Ok(guard[..len].to_vec())
    }

    fn write_image(&mut self, image: ImageKind, data: &[f32]) -> RenderResult<()> {
        let len = image.len(self.size[0], self.size[1]);
        if data.len() != len {
            return Err(RenderError::upload(format!(
                "{:?} image holds {} floats, got {}",
                image,
                len,
                data.len()
            )));
        }
        let mut guard = self.image(image)?.write().map_err(RenderError::upload)?;
        guard[..len].copy_from_slice(data);
        Ok(())
    }
}

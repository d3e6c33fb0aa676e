/*!

GPU profiling core for graphics API interception layers, using timestamp queries.

`device_profiler` receives the hooks of a thin interception layer, records timestamp queries into the application's
command buffers and turns them into a per-frame hierarchy of
submits → command buffers → render passes → subpasses → pipelines → drawcalls.
The driver is reached exclusively through the [`ProfilerDevice`] trait.

# How to use

```ignore
use device_profiler::*;

let profiler = DeviceProfiler::new(device, ProfilerSettings::default(), MetricsBackend::None)?;

// Object lifecycle hooks.
profiler.create_shader_module(vertex_module, &vertex_bytecode);
profiler.create_shader_module(fragment_module, &fragment_bytecode);
profiler.create_pipeline(pipeline, &PipelineCreateInfo {
    bind_point: PipelineBindPoint::Graphics,
    stages: &[
        ShaderStageInfo { stage: ShaderStage::VERTEX, module: vertex_module, entry_point: "main" },
        ShaderStageInfo { stage: ShaderStage::FRAGMENT, module: fragment_module, entry_point: "main" },
    ],
});
profiler.allocate_command_buffers(&[command_buffer], CommandBufferLevel::Primary);

// Recording hooks, called around the forwarded commands.
profiler.begin_command_buffer(command_buffer);
{
    let render_pass = scope::RenderPassScope::start(&profiler, command_buffer, render_pass, SubpassContents::Inline);
    profiler.bind_pipeline(command_buffer, pipeline);
    profiled_command!(&profiler, command_buffer, DrawcallType::Draw, {
        // Forward the draw to the driver.
    });
}
profiler.end_command_buffer(command_buffer);

// Submission and frame hooks, called after forwarding to the driver.
profiler.submit(queue, &[SubmitInfo { command_buffers: &[command_buffer] }]);
profiler.present(queue);

let frame = profiler.get_data();
println!("GPU time: {:?}, drawcalls: {}", frame.gpu_time(), frame.stats.drawcall_count());
```

# Internals

Every command buffer has a [`CommandBufferRecorder`] behind its own lock in the [`Registry`].
Recorders allocate timestamp queries from pools handed out by a device-wide `QueryPoolCache`.
When recording ends, the used pools are frozen into a shared, immutable set of queries
that every submission of the recording refers to.

Submissions snapshot the recordings of their command buffers into a [`SubmitBatch`](submit::SubmitBatch),
which is queued in the [`DataAggregator`]. At present, the profiler waits for the GPU, reads back all queued
timestamps, resolves the region trees and publishes the result as a new [`FrameData`].
Query pools go back to the cache once the last snapshot referring to them is gone.

Depending on the [`ProfilerMode`], regions below a certain level are only counted, not timed.
*/

pub mod aggregator;
pub mod command_buffer;
pub mod data;
mod device;
mod errors;
mod handles;
pub mod macros;
pub mod memory;
pub mod metrics;
mod profiler;
pub mod queries;
mod registry;
pub mod scope;
mod settings;
mod shader;
pub mod submit;

pub use aggregator::DataAggregator;
pub use command_buffer::{
    CommandBufferRecorder, ImageLayout, ImageMemoryBarrier, PipelineBarrierInfo, RecordedCommandBuffer, RecorderState,
};
pub use data::{
    CommandBufferData, CommandBufferLevel, CpuData, DrawcallData, DrawcallStats, DrawcallType, FrameData, MemoryData,
    PipelineData, Region, RenderPassData, SortOrder, SubmitBatchData, SubmitData, SubpassContents, SubpassData,
    TimestampRange,
};
pub use device::{MemoryHeap, MemoryProperties, MemoryType, ProfilerDevice, TimestampPeriod};
pub use errors::{ConfigError, CreationError, DeviceError, RegistryError, SettingsError, SubmitError};
pub use handles::{
    CommandBufferHandle, DeviceMemoryHandle, FenceHandle, ImageHandle, PipelineHandle, QueryPoolHandle, QueueHandle,
    RenderPassHandle, ShaderModuleHandle,
};
pub use metrics::{EnumerateResult, MetricProperties, MetricUnit, MetricValue, MetricsBackend, VendorMetrics};
pub use profiler::{
    AttachmentDescription, AttachmentKind, AttachmentLoadOp, DeviceProfiler, PipelineCreateInfo, RenderPassCreateInfo,
};
pub use registry::{
    PipelineBindPoint, PipelineRecord, RegistryAccessStats, Registry, RenderPassRecord, ResourceMap,
    ShaderModuleRecord,
};
pub use settings::{ProfilerMode, ProfilerSettings, SyncMode, CONFIG_FILE_NAME};
pub use shader::{
    compute_module_hash, compute_shader_tuple, hash_entry_point, ShaderStage, ShaderStageInfo, ShaderTuple,
};
pub use submit::SubmitInfo;

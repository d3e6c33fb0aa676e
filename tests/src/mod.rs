use std::{
    collections::{HashMap, HashSet},
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
};

use device_profiler::{
    profiled_command, CommandBufferData, CommandBufferHandle, CommandBufferLevel, DeviceError, DeviceProfiler,
    DrawcallType, FenceHandle, FrameData, MemoryHeap, MemoryProperties, MemoryType, MetricsBackend, PipelineBindPoint,
    PipelineCreateInfo, PipelineHandle, ProfilerDevice, ProfilerSettings, QueryPoolHandle, QueueHandle,
    RenderPassCreateInfo, RenderPassHandle, ShaderModuleHandle, ShaderStage, ShaderStageInfo, SubmitInfo,
    TimestampPeriod,
};
use parking_lot::Mutex;

mod frames;

pub const QUEUE: QueueHandle = QueueHandle(0x100);

/// Ticks the fake GPU clock advances with every timestamp write.
pub const TICKS_PER_TIMESTAMP: u64 = 100;

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[derive(Default)]
struct FakeDeviceState {
    clock: u64,
    next_handle: u64,
    query_pools: HashMap<QueryPoolHandle, Vec<u64>>,
    fences: HashSet<FenceHandle>,
    /// Remaining query pools that may be created, unlimited if `None`.
    query_pool_budget: Option<usize>,
}

/// Device with a deterministic clock: every timestamp write advances it by [`TICKS_PER_TIMESTAMP`],
/// at the time the write is recorded.
#[derive(Default)]
pub struct FakeDevice {
    state: Mutex<FakeDeviceState>,
    fail_fence_creation: AtomicBool,
    fail_query_reads: AtomicBool,
    wait_idle_count: AtomicUsize,
    fence_wait_count: AtomicUsize,
}

impl FakeDevice {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_fence_creation(&self) {
        self.fail_fence_creation.store(true, Ordering::Relaxed);
    }

    pub fn fail_query_reads(&self, fail: bool) {
        self.fail_query_reads.store(fail, Ordering::Relaxed);
    }

    pub fn limit_query_pool_creation(&self, remaining: usize) {
        self.state.lock().query_pool_budget = Some(remaining);
    }

    pub fn live_query_pools(&self) -> usize {
        self.state.lock().query_pools.len()
    }

    pub fn live_fences(&self) -> usize {
        self.state.lock().fences.len()
    }

    pub fn wait_idle_count(&self) -> usize {
        self.wait_idle_count.load(Ordering::Relaxed)
    }

    pub fn fence_wait_count(&self) -> usize {
        self.fence_wait_count.load(Ordering::Relaxed)
    }

    fn next_handle(state: &mut FakeDeviceState) -> u64 {
        state.next_handle += 1;
        0x1000 + state.next_handle
    }
}

impl ProfilerDevice for FakeDevice {
    fn timestamp_period(&self) -> TimestampPeriod {
        TimestampPeriod(1.0)
    }

    fn memory_properties(&self) -> MemoryProperties {
        MemoryProperties {
            memory_types: vec![
                MemoryType {
                    heap_index: 0,
                    device_local: true,
                    host_visible: false,
                },
                MemoryType {
                    heap_index: 1,
                    device_local: false,
                    host_visible: true,
                },
                MemoryType {
                    heap_index: 0,
                    device_local: true,
                    host_visible: true,
                },
            ],
            memory_heaps: vec![
                MemoryHeap {
                    size: 8 << 30,
                    device_local: true,
                },
                MemoryHeap {
                    size: 16 << 30,
                    device_local: false,
                },
            ],
        }
    }

    fn create_query_pool(&self, query_count: u32) -> Result<QueryPoolHandle, DeviceError> {
        let mut state = self.state.lock();
        if let Some(budget) = state.query_pool_budget.as_mut() {
            if *budget == 0 {
                return Err(DeviceError::OutOfDeviceMemory);
            }
            *budget -= 1;
        }
        let handle = QueryPoolHandle(Self::next_handle(&mut state));
        state.query_pools.insert(handle, vec![0; query_count as usize]);
        Ok(handle)
    }

    fn destroy_query_pool(&self, pool: QueryPoolHandle) {
        let removed = self.state.lock().query_pools.remove(&pool);
        assert!(removed.is_some(), "{pool:?} destroyed twice");
    }

    fn reset_query_pool(&self, pool: QueryPoolHandle, first_query: u32, query_count: u32) {
        let mut state = self.state.lock();
        let queries = state.query_pools.get_mut(&pool).expect("reset of unknown query pool");
        let range = first_query as usize..(first_query + query_count) as usize;
        queries[range].fill(0);
    }

    fn cmd_write_timestamp(&self, _command_buffer: CommandBufferHandle, pool: QueryPoolHandle, query: u32) {
        let mut state = self.state.lock();
        state.clock += TICKS_PER_TIMESTAMP;
        let clock = state.clock;
        let queries = state.query_pools.get_mut(&pool).expect("write to unknown query pool");
        queries[query as usize] = clock;
    }

    fn get_query_results(&self, pool: QueryPoolHandle, first_query: u32, results: &mut [u64]) -> Result<(), DeviceError> {
        if self.fail_query_reads.load(Ordering::Relaxed) {
            return Err(DeviceError::DeviceLost);
        }
        let state = self.state.lock();
        let queries = state.query_pools.get(&pool).expect("read of unknown query pool");
        let first = first_query as usize;
        results.copy_from_slice(&queries[first..first + results.len()]);
        Ok(())
    }

    fn create_fence(&self) -> Result<FenceHandle, DeviceError> {
        if self.fail_fence_creation.load(Ordering::Relaxed) {
            return Err(DeviceError::OutOfHostMemory);
        }
        let mut state = self.state.lock();
        let fence = FenceHandle(Self::next_handle(&mut state));
        state.fences.insert(fence);
        Ok(fence)
    }

    fn destroy_fence(&self, fence: FenceHandle) {
        assert!(self.state.lock().fences.remove(&fence), "{fence:?} destroyed twice");
    }

    fn queue_signal_fence(&self, _queue: QueueHandle, fence: FenceHandle) -> Result<(), DeviceError> {
        assert!(self.state.lock().fences.contains(&fence));
        Ok(())
    }

    fn wait_for_fence(&self, fence: FenceHandle) -> Result<(), DeviceError> {
        assert!(self.state.lock().fences.contains(&fence));
        self.fence_wait_count.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn device_wait_idle(&self) -> Result<(), DeviceError> {
        self.wait_idle_count.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

pub fn create_profiler(settings: ProfilerSettings) -> (Arc<FakeDevice>, DeviceProfiler) {
    init_logger();
    let device = FakeDevice::new();
    let profiler = DeviceProfiler::new(device.clone(), settings, MetricsBackend::None).unwrap();
    (device, profiler)
}

/// Creates a graphics pipeline from two freshly registered shader modules.
pub fn create_graphics_pipeline(profiler: &DeviceProfiler, pipeline: PipelineHandle, vertex: &[u8], fragment: &[u8]) {
    let vertex_module = ShaderModuleHandle((pipeline.0 << 8) | 1);
    let fragment_module = ShaderModuleHandle((pipeline.0 << 8) | 2);
    profiler.create_shader_module(vertex_module, vertex);
    profiler.create_shader_module(fragment_module, fragment);
    profiler.create_pipeline(
        pipeline,
        &PipelineCreateInfo {
            bind_point: PipelineBindPoint::Graphics,
            stages: &[
                ShaderStageInfo {
                    stage: ShaderStage::VERTEX,
                    module: vertex_module,
                    entry_point: "main",
                },
                ShaderStageInfo {
                    stage: ShaderStage::FRAGMENT,
                    module: fragment_module,
                    entry_point: "main",
                },
            ],
        },
    );
}

pub fn create_compute_pipeline(profiler: &DeviceProfiler, pipeline: PipelineHandle, compute: &[u8]) {
    let module = ShaderModuleHandle((pipeline.0 << 8) | 3);
    profiler.create_shader_module(module, compute);
    profiler.create_pipeline(
        pipeline,
        &PipelineCreateInfo {
            bind_point: PipelineBindPoint::Compute,
            stages: &[ShaderStageInfo {
                stage: ShaderStage::COMPUTE,
                module,
                entry_point: "main",
            }],
        },
    );
}

pub fn create_render_pass(profiler: &DeviceProfiler, render_pass: RenderPassHandle, subpass_count: u32) {
    profiler.create_render_pass(
        render_pass,
        &RenderPassCreateInfo {
            subpass_count,
            attachments: &[],
        },
    );
}

pub fn allocate_primary(profiler: &DeviceProfiler, command_buffer: CommandBufferHandle) {
    profiler.allocate_command_buffers(&[command_buffer], CommandBufferLevel::Primary);
}

pub fn record_commands(
    profiler: &DeviceProfiler,
    command_buffer: CommandBufferHandle,
    drawcall_type: DrawcallType,
    count: usize,
) {
    for _ in 0..count {
        profiled_command!(profiler, command_buffer, drawcall_type, {});
    }
}

/// Submits `command_buffers` as a single submit info.
pub fn submit(profiler: &DeviceProfiler, command_buffers: &[CommandBufferHandle]) {
    profiler.submit(QUEUE, &[SubmitInfo { command_buffers }]);
}

/// All primary command buffers of a frame, in submission order.
pub fn command_buffers(frame: &FrameData) -> Vec<&CommandBufferData> {
    frame
        .submits
        .iter()
        .flat_map(|batch| batch.submits.iter())
        .flat_map(|submit| submit.command_buffers.iter())
        .collect()
}

use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use parking_lot::{Mutex, RwLock};

use crate::{
    command_buffer::{CommandBufferRecorder, PipelineBarrierInfo, RecordedCommandBuffer, RecorderState},
    compute_module_hash, compute_shader_tuple,
    data::{CommandBufferLevel, CpuData, DrawcallType, FrameData, SubpassContents},
    memory::MemoryTracker,
    metrics::{EnumerateResult, MetricProperties, MetricsBackend},
    queries::QueryPoolCache,
    submit::{collect_submit_batch, SubmitInfo},
    CommandBufferHandle, CreationError, DataAggregator, DeviceMemoryHandle, FenceHandle, PipelineBindPoint,
    PipelineHandle, PipelineRecord, ProfilerDevice, ProfilerMode, ProfilerSettings, QueueHandle, Registry,
    RenderPassHandle, RenderPassRecord, SettingsError, ShaderModuleHandle, ShaderModuleRecord, ShaderStageInfo,
    SyncMode, TimestampPeriod,
};

/// Query pools created up front, so the first recordings don't hit the driver for them.
const NUM_PREALLOCATED_QUERY_POOLS: usize = 4;

/// Arguments of a pipeline create call.
#[derive(Clone, Copy, Debug)]
pub struct PipelineCreateInfo<'a> {
    pub bind_point: PipelineBindPoint,
    pub stages: &'a [ShaderStageInfo<'a>],
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum AttachmentKind {
    #[default]
    Color,
    DepthStencil,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum AttachmentLoadOp {
    #[default]
    Load,
    Clear,
    DontCare,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct AttachmentDescription {
    pub kind: AttachmentKind,
    pub load_op: AttachmentLoadOp,
    /// Only meaningful for depth/stencil attachments.
    pub stencil_load_op: AttachmentLoadOp,
}

/// Arguments of a render pass create call.
#[derive(Clone, Copy, Debug, Default)]
pub struct RenderPassCreateInfo<'a> {
    pub subpass_count: u32,
    pub attachments: &'a [AttachmentDescription],
}

struct CpuCounters {
    last_frame: Instant,
    interval_start: Instant,
    frames_in_interval: u32,
    frames_per_sec: f32,
}

impl CpuCounters {
    fn new() -> Self {
        let now = Instant::now();
        Self {
            last_frame: now,
            interval_start: now,
            frames_in_interval: 0,
            frames_per_sec: 0.0,
        }
    }

    fn end_frame(&mut self, update_interval: Duration) -> CpuData {
        let now = Instant::now();
        let frame_time = now - self.last_frame;
        self.last_frame = now;

        self.frames_in_interval += 1;
        let interval = now - self.interval_start;
        if interval >= update_interval && !interval.is_zero() {
            self.frames_per_sec = self.frames_in_interval as f32 / interval.as_secs_f32();
            self.frames_in_interval = 0;
            self.interval_start = now;
        }

        CpuData {
            frame_time,
            frames_per_sec: self.frames_per_sec,
        }
    }
}

/// Profiler of a single device.
///
/// Receives the hooks of the interception layer, records GPU timestamps into the application's command buffers
/// and publishes one [`FrameData`] per presented frame.
///
/// All hooks take `&self` and may be called from any thread, exactly as the host API allows the intercepted calls to be made.
pub struct DeviceProfiler {
    device: Arc<dyn ProfilerDevice>,
    timestamp_period: TimestampPeriod,

    registry: Registry,
    aggregator: DataAggregator,
    query_pool_cache: Arc<QueryPoolCache>,
    memory: MemoryTracker,
    metrics: MetricsBackend,

    settings: RwLock<ProfilerSettings>,
    pending_settings: Mutex<Option<ProfilerSettings>>,

    /// Submissions hold this shared, the frame boundary exclusively, so no batch can slip in between aggregation and reset.
    submission_gate: RwLock<()>,
    submit_fence: Mutex<FenceHandle>,
    next_submit_index: AtomicU64,

    published: Mutex<Arc<FrameData>>,
    frame_index: AtomicU64,
    cpu: Mutex<CpuCounters>,
}

// Public interface
impl DeviceProfiler {
    /// Creates the profiler of `device`.
    ///
    /// If this fails, everything created on the device so far has been destroyed again.
    pub fn new(
        device: Arc<dyn ProfilerDevice>,
        settings: ProfilerSettings,
        metrics: MetricsBackend,
    ) -> Result<Self, CreationError> {
        settings.validate()?;

        let submit_fence = device.create_fence()?;

        let query_pool_cache = Arc::new(QueryPoolCache::new(device.clone(), settings.query_pool_size));
        if let Err(err) = query_pool_cache.preallocate(NUM_PREALLOCATED_QUERY_POOLS) {
            // Pools created so far are destroyed with the cache.
            drop(query_pool_cache);
            device.destroy_fence(submit_fence);
            return Err(err.into());
        }

        if metrics.is_available() {
            log::info!("Collecting {} hardware metrics", metrics.metric_count());
        }

        Ok(Self {
            timestamp_period: device.timestamp_period(),
            memory: MemoryTracker::new(device.memory_properties()),
            device,

            registry: Registry::new(),
            aggregator: DataAggregator::new(),
            query_pool_cache,
            metrics,

            settings: RwLock::new(settings),
            pending_settings: Mutex::new(None),

            submission_gate: RwLock::new(()),
            submit_fence: Mutex::new(submit_fence),
            next_submit_index: AtomicU64::new(0),

            published: Mutex::new(Arc::default()),
            frame_index: AtomicU64::new(0),
            cpu: Mutex::new(CpuCounters::new()),
        })
    }

    /// Data of the last presented frame.
    ///
    /// The returned frame is never modified; later frames are published as new objects.
    pub fn get_data(&self) -> Arc<FrameData> {
        self.published.lock().clone()
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn settings(&self) -> ProfilerSettings {
        self.settings.read().clone()
    }

    /// Changes the detail level starting with the next frame.
    ///
    /// Command buffers keep the level they were recorded with.
    pub fn set_mode(&self, mode: ProfilerMode) {
        self.update_pending_settings(|settings| settings.mode = mode);
    }

    /// Changes the synchronization point starting with the next frame.
    pub fn set_sync_mode(&self, sync_mode: SyncMode) {
        self.update_pending_settings(|settings| settings.sync_mode = sync_mode);
    }

    /// Replaces all settings starting with the next frame.
    ///
    /// The query pool size is fixed at creation, changes to it are ignored.
    pub fn change_settings(&self, settings: ProfilerSettings) -> Result<(), SettingsError> {
        settings.validate()?;
        self.update_pending_settings(|pending| *pending = settings);
        Ok(())
    }

    /// Index of the frame currently being recorded.
    pub fn current_frame(&self) -> u64 {
        self.frame_index.load(Ordering::Acquire)
    }

    pub fn timestamp_period(&self) -> TimestampPeriod {
        self.timestamp_period
    }

    pub fn enumerate_metric_properties(&self, properties: Option<&mut [MetricProperties]>) -> EnumerateResult {
        self.metrics.enumerate_properties(properties)
    }

    /// Sets the debug name of any object. An empty name removes it.
    pub fn set_debug_object_name(&self, handle: u64, name: &str) {
        if name.is_empty() {
            self.registry.object_names.remove(handle);
        } else {
            self.registry.object_names.insert(handle, name.to_owned());
        }
    }

    pub fn name_for_handle(&self, handle: u64) -> String {
        self.registry.name_for_handle(handle)
    }
}

// Object lifecycle hooks
impl DeviceProfiler {
    pub fn create_shader_module(&self, module: ShaderModuleHandle, bytecode: &[u8]) {
        let record = ShaderModuleRecord {
            hash: compute_module_hash(bytecode),
        };
        self.registry.shader_modules.insert(module, record);
    }

    pub fn destroy_shader_module(&self, module: ShaderModuleHandle) {
        self.registry.shader_modules.remove(module);
    }

    /// Registers a pipeline and names it after its shaders unless it already has a name.
    pub fn create_pipeline(&self, pipeline: PipelineHandle, info: &PipelineCreateInfo<'_>) {
        let shader_tuple = compute_shader_tuple(info.stages, |module| {
            self.registry.shader_modules.at(module).ok().map(|record| record.hash)
        });

        self.registry.pipelines.insert(
            pipeline,
            PipelineRecord {
                handle: pipeline,
                bind_point: info.bind_point,
                shader_tuple,
            },
        );
        self.registry
            .object_names
            .get_or_insert_with(pipeline.as_raw(), || shader_tuple.label());
    }

    pub fn destroy_pipeline(&self, pipeline: PipelineHandle) {
        self.registry.pipelines.remove(pipeline);
        self.registry.retire_name(pipeline.as_raw());
    }

    pub fn create_render_pass(&self, render_pass: RenderPassHandle, info: &RenderPassCreateInfo<'_>) {
        let mut record = RenderPassRecord {
            handle: render_pass,
            subpass_count: info.subpass_count,
            ..Default::default()
        };
        for attachment in info.attachments {
            match attachment.kind {
                AttachmentKind::Color if attachment.load_op == AttachmentLoadOp::Clear => {
                    record.clear_color_attachment_count += 1;
                }
                AttachmentKind::DepthStencil
                    if attachment.load_op == AttachmentLoadOp::Clear
                        || attachment.stencil_load_op == AttachmentLoadOp::Clear =>
                {
                    record.clear_depth_stencil_attachment_count += 1;
                }
                _ => {}
            }
        }
        self.registry.render_passes.insert(render_pass, record);
    }

    pub fn destroy_render_pass(&self, render_pass: RenderPassHandle) {
        self.registry.render_passes.remove(render_pass);
        self.registry.retire_name(render_pass.as_raw());
    }

    pub fn allocate_command_buffers(&self, command_buffers: &[CommandBufferHandle], level: CommandBufferLevel) {
        for &command_buffer in command_buffers {
            let recorder = CommandBufferRecorder::new(command_buffer, level, self.query_pool_cache.clone());
            self.registry
                .command_buffers
                .insert(command_buffer, Arc::new(Mutex::new(recorder)));
        }
    }

    /// Forgets the command buffers. Their submitted recordings stay alive until aggregated.
    pub fn free_command_buffers(&self, command_buffers: &[CommandBufferHandle]) {
        for &command_buffer in command_buffers {
            self.registry.command_buffers.remove(command_buffer);
            self.registry.retire_name(command_buffer.as_raw());
        }
    }

    pub fn allocate_memory(&self, memory: DeviceMemoryHandle, size: u64, memory_type_index: u32) {
        self.memory.allocate(memory, size, memory_type_index);
    }

    pub fn free_memory(&self, memory: DeviceMemoryHandle) {
        self.memory.free(memory);
    }
}

// Recording hooks
impl DeviceProfiler {
    /// Starts a recording at the current [`ProfilerMode`].
    ///
    /// Command buffers allocated before the profiler was attached are registered as primary command buffers here.
    pub fn begin_command_buffer(&self, command_buffer: CommandBufferHandle) {
        let mode = self.settings.read().mode;
        let recorder = self.registry.command_buffers.get_or_insert_with(command_buffer, || {
            log::debug!("Registering unknown {command_buffer:?} at begin");
            Arc::new(Mutex::new(CommandBufferRecorder::new(
                command_buffer,
                CommandBufferLevel::Primary,
                self.query_pool_cache.clone(),
            )))
        });
        recorder.lock().begin(mode);
    }

    pub fn end_command_buffer(&self, command_buffer: CommandBufferHandle) {
        self.with_recorder(command_buffer, |recorder| recorder.end());
    }

    pub fn begin_render_pass(
        &self,
        command_buffer: CommandBufferHandle,
        render_pass: RenderPassHandle,
        contents: SubpassContents,
    ) {
        let record = self.registry.render_passes.at(render_pass).unwrap_or_else(|err| {
            log::warn!("Beginning unregistered render pass: {err}");
            RenderPassRecord {
                handle: render_pass,
                ..Default::default()
            }
        });
        self.with_recorder(command_buffer, |recorder| recorder.begin_render_pass(&record, contents));
    }

    pub fn post_begin_render_pass(&self, command_buffer: CommandBufferHandle) {
        self.with_recorder(command_buffer, |recorder| recorder.post_begin_render_pass());
    }

    pub fn next_subpass(&self, command_buffer: CommandBufferHandle, contents: SubpassContents) {
        self.with_recorder(command_buffer, |recorder| recorder.next_subpass(contents));
    }

    pub fn pre_end_render_pass(&self, command_buffer: CommandBufferHandle) {
        self.with_recorder(command_buffer, |recorder| recorder.pre_end_render_pass());
    }

    pub fn end_render_pass(&self, command_buffer: CommandBufferHandle) {
        self.with_recorder(command_buffer, |recorder| recorder.end_render_pass());
    }

    /// Unknown pipelines are ignored; their commands are attributed to the previously bound pipeline.
    pub fn bind_pipeline(&self, command_buffer: CommandBufferHandle, pipeline: PipelineHandle) {
        let Ok(record) = self.registry.pipelines.at(pipeline) else {
            log::trace!("Ignoring bind of unregistered {pipeline:?}");
            return;
        };
        self.with_recorder(command_buffer, |recorder| recorder.bind_pipeline(record));
    }

    pub fn pre_command(&self, command_buffer: CommandBufferHandle, drawcall_type: DrawcallType) {
        self.with_recorder(command_buffer, |recorder| recorder.pre_command(drawcall_type));
    }

    pub fn post_command(&self, command_buffer: CommandBufferHandle, drawcall_type: DrawcallType) {
        self.with_recorder(command_buffer, |recorder| recorder.post_command(drawcall_type));
    }

    /// Post command hook of a clear attachments command, counting every cleared attachment.
    pub fn post_clear_attachments(&self, command_buffer: CommandBufferHandle, attachment_count: u32) {
        self.with_recorder(command_buffer, |recorder| recorder.post_clear_attachments(attachment_count));
    }

    pub fn pipeline_barrier(&self, command_buffer: CommandBufferHandle, barrier: &PipelineBarrierInfo<'_>) {
        self.with_recorder(command_buffer, |recorder| recorder.pipeline_barrier(barrier));
    }

    /// Nests the recordings of `secondaries` into `command_buffer`.
    pub fn execute_commands(&self, command_buffer: CommandBufferHandle, secondaries: &[CommandBufferHandle]) {
        // Secondaries are locked one at a time and before the primary, so no two recorder locks are ever held at once.
        let recordings: Vec<RecordedCommandBuffer> = secondaries
            .iter()
            .filter_map(|&secondary| {
                let recorder = self.registry.command_buffers.at(secondary).ok()?;
                let recorder = recorder.lock();
                match recorder.state() {
                    RecorderState::Executable | RecorderState::Submitted => Some(recorder.get_data()),
                    state => {
                        log::warn!("Skipping executed {secondary:?} in state {state:?}");
                        None
                    }
                }
            })
            .collect();

        self.with_recorder(command_buffer, |recorder| recorder.execute_commands(recordings));
    }

    fn with_recorder(&self, command_buffer: CommandBufferHandle, hook: impl FnOnce(&mut CommandBufferRecorder)) {
        match self.registry.command_buffers.at(command_buffer) {
            Ok(recorder) => hook(&mut *recorder.lock()),
            Err(err) => log::warn!("Ignoring recording hook: {err}"),
        }
    }
}

// Submission and frame hooks
impl DeviceProfiler {
    /// Collects the recordings of a queue submission.
    ///
    /// Must be called after the submission was forwarded to the driver.
    pub fn submit(&self, queue: QueueHandle, submits: &[SubmitInfo<'_>]) {
        profiling::scope!("DeviceProfiler::submit");

        let _gate = self.submission_gate.read();
        let submit_index = self.next_submit_index.fetch_add(1, Ordering::Relaxed);
        let batch = collect_submit_batch(&self.registry, queue, submit_index, submits);
        self.aggregator.append_submit(batch);

        if self.settings.read().sync_mode == SyncMode::Submit {
            let fence = self.submit_fence.lock();
            let waited = self
                .device
                .queue_signal_fence(queue, *fence)
                .and_then(|()| self.device.wait_for_fence(*fence));
            if let Err(err) = waited {
                log::warn!("Failed to wait for submission {submit_index} on {queue:?}: {err}");
            }
        }
    }

    /// Ends the current frame: resolves everything submitted during it and publishes the result.
    pub fn present(&self, queue: QueueHandle) {
        profiling::scope!("DeviceProfiler::present");

        let _gate = self.submission_gate.write();
        let settings = self.settings.read().clone();

        if settings.sync_mode == SyncMode::Present {
            if let Err(err) = self.device.device_wait_idle() {
                log::warn!("Failed to wait for the device at present on {queue:?}: {err}");
            }
        }

        let aggregated = self.aggregator.aggregate();
        // Drops the aggregator's reference, so the frame can usually be completed in place.
        self.aggregator.reset();
        let mut frame = Arc::try_unwrap(aggregated).unwrap_or_else(|shared| FrameData::clone(&shared));

        frame.frame_index = self.frame_index.load(Ordering::Acquire);
        frame.timestamp_period = self.timestamp_period;
        frame.memory = self.memory.data();
        frame.cpu = self.cpu.lock().end_frame(settings.output_update_interval);
        frame.metrics = self.metrics.collect_frame_metrics();
        frame.registry_access_stats = self.registry.access_stats();
        frame.object_names = self.registry.capture_names(frame.referenced_handles());

        *self.published.lock() = Arc::new(frame);

        self.registry.reset_access_stats();
        self.apply_pending_settings();
        self.frame_index.fetch_add(1, Ordering::AcqRel);

        profiling::finish_frame!();
    }
}

// Internals
impl DeviceProfiler {
    fn update_pending_settings(&self, update: impl FnOnce(&mut ProfilerSettings)) {
        let mut pending = self.pending_settings.lock();
        let settings = pending.get_or_insert_with(|| self.settings.read().clone());
        update(settings);
    }

    fn apply_pending_settings(&self) {
        let Some(mut pending) = self.pending_settings.lock().take() else {
            return;
        };

        let mut settings = self.settings.write();
        if pending.query_pool_size != settings.query_pool_size {
            log::warn!(
                "Query pool size can't change at runtime, keeping {}",
                settings.query_pool_size
            );
            pending.query_pool_size = settings.query_pool_size;
        }
        log::debug!("Applying profiler settings {pending:?}");
        *settings = pending;
    }
}

impl Drop for DeviceProfiler {
    fn drop(&mut self) {
        // Recorders and pending recordings hold query pools, which go back to the cache and are destroyed with it.
        self.aggregator.reset();
        self.registry.clear();
        self.device.destroy_fence(*self.submit_fence.get_mut());
    }
}

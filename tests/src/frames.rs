use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Barrier,
    },
    thread,
    time::Duration,
};

use device_profiler::{
    CommandBufferHandle, CommandBufferLevel, CreationError, DeviceError, DeviceMemoryHandle, DeviceProfiler,
    DrawcallType, EnumerateResult, MetricProperties, MetricUnit, MetricValue, MetricsBackend, PipelineHandle,
    ProfilerMode, ProfilerSettings, RenderPassHandle, SettingsError, SubpassContents, SyncMode, VendorMetrics,
};

use super::{
    allocate_primary, command_buffers, create_graphics_pipeline, create_profiler, create_render_pass, init_logger,
    record_commands, submit, FakeDevice, QUEUE, TICKS_PER_TIMESTAMP,
};

const COMMAND_BUFFER: CommandBufferHandle = CommandBufferHandle(0x10);

fn record_single_draw(profiler: &DeviceProfiler, command_buffer: CommandBufferHandle) {
    profiler.begin_command_buffer(command_buffer);
    record_commands(profiler, command_buffer, DrawcallType::Draw, 1);
    profiler.end_command_buffer(command_buffer);
}

#[test]
fn frames_are_numbered() {
    let (_device, profiler) = create_profiler(ProfilerSettings::default());
    assert_eq!(profiler.current_frame(), 0);
    assert_eq!(profiler.get_data().frame_index, 0);
    assert!(profiler.get_data().submits.is_empty());

    profiler.present(QUEUE);
    assert_eq!(profiler.get_data().frame_index, 0);
    assert_eq!(profiler.current_frame(), 1);

    profiler.present(QUEUE);
    assert_eq!(profiler.get_data().frame_index, 1);
    assert_eq!(profiler.current_frame(), 2);
}

#[test]
fn gpu_time_uses_timestamp_period() {
    let (_device, profiler) = create_profiler(ProfilerSettings {
        mode: ProfilerMode::PerFrame,
        ..Default::default()
    });
    allocate_primary(&profiler, COMMAND_BUFFER);
    record_single_draw(&profiler, COMMAND_BUFFER);
    submit(&profiler, &[COMMAND_BUFFER]);
    profiler.present(QUEUE);

    let frame = profiler.get_data();
    assert_eq!(frame.timestamp_period, profiler.timestamp_period());
    assert_eq!(frame.ticks, TICKS_PER_TIMESTAMP);
    assert_eq!(frame.gpu_time(), Duration::from_nanos(TICKS_PER_TIMESTAMP));
}

#[test]
fn snapshot_is_shared_until_next_present() {
    let (_device, profiler) = create_profiler(ProfilerSettings::default());
    profiler.present(QUEUE);

    let first = profiler.get_data();
    let second = profiler.get_data();
    assert!(std::sync::Arc::ptr_eq(&first, &second));

    profiler.present(QUEUE);
    assert!(!std::sync::Arc::ptr_eq(&first, &profiler.get_data()));
    assert_eq!(first.frame_index, 0);
}

#[test]
fn present_during_recording_publishes_empty_frame() {
    let (_device, profiler) = create_profiler(ProfilerSettings::default());
    allocate_primary(&profiler, COMMAND_BUFFER);

    profiler.begin_command_buffer(COMMAND_BUFFER);
    record_commands(&profiler, COMMAND_BUFFER, DrawcallType::Draw, 2);
    profiler.present(QUEUE);

    let frame = profiler.get_data();
    assert!(frame.submits.is_empty());
    assert_eq!(frame.ticks, 0);
    assert_eq!(frame.stats.drawcall_count(), 0);

    record_commands(&profiler, COMMAND_BUFFER, DrawcallType::Draw, 1);
    profiler.end_command_buffer(COMMAND_BUFFER);
    submit(&profiler, &[COMMAND_BUFFER]);
    profiler.present(QUEUE);

    let frame = profiler.get_data();
    assert_eq!(frame.frame_index, 1);
    assert_eq!(frame.stats.draw_count, 3);
}

#[test]
fn command_buffers_recorded_on_many_threads() {
    const NUM_THREADS: u64 = 4;
    const DRAWS_PER_THREAD: usize = 10;

    let (_device, profiler) = create_profiler(ProfilerSettings::default());
    let render_pass = RenderPassHandle(0x20);
    let pipeline = PipelineHandle(0x30);
    create_render_pass(&profiler, render_pass, 1);
    create_graphics_pipeline(&profiler, pipeline, b"vs", b"fs");

    let start = Barrier::new(NUM_THREADS as usize);
    thread::scope(|scope| {
        for thread_index in 0..NUM_THREADS {
            let profiler = &profiler;
            let start = &start;
            scope.spawn(move || {
                let command_buffer = CommandBufferHandle(0x100 + thread_index);
                allocate_primary(profiler, command_buffer);
                start.wait();

                profiler.begin_command_buffer(command_buffer);
                profiler.begin_render_pass(command_buffer, render_pass, SubpassContents::Inline);
                profiler.post_begin_render_pass(command_buffer);
                profiler.bind_pipeline(command_buffer, pipeline);
                record_commands(profiler, command_buffer, DrawcallType::Draw, DRAWS_PER_THREAD);
                profiler.pre_end_render_pass(command_buffer);
                profiler.end_render_pass(command_buffer);
                profiler.end_command_buffer(command_buffer);
                submit(profiler, &[command_buffer]);
            });
        }
    });
    profiler.present(QUEUE);

    let frame = profiler.get_data();
    assert_eq!(frame.submits.len(), NUM_THREADS as usize);
    assert!(frame.submits.windows(2).all(|pair| pair[0].submit_index < pair[1].submit_index));
    assert_eq!(frame.stats.draw_count, NUM_THREADS as u32 * DRAWS_PER_THREAD as u32);
    for command_buffer in command_buffers(&frame) {
        let subpass = &command_buffer.render_passes[0].subpasses[0];
        assert_eq!(subpass.pipelines[0].drawcalls.len(), DRAWS_PER_THREAD);
        assert!(subpass.pipelines[0].drawcalls.iter().all(|drawcall| drawcall.ticks > 0));
    }
    assert_eq!(frame.top_pipelines.len(), 1);
    assert_eq!(frame.top_pipelines[0].stats.draw_count, 40);
}

#[test]
fn frames_are_presented_while_recording() {
    const NUM_THREADS: u64 = 3;
    const SUBMITS_PER_THREAD: usize = 100;
    const DRAWS_PER_SUBMIT: usize = 3;

    for mode in [
        ProfilerMode::PerDrawcall,
        ProfilerMode::PerPipeline,
        ProfilerMode::PerRenderPass,
        ProfilerMode::PerFrame,
    ] {
        let (_device, profiler) = create_profiler(ProfilerSettings {
            mode,
            ..Default::default()
        });
        let pipeline = PipelineHandle(0x30);
        create_graphics_pipeline(&profiler, pipeline, b"vs", b"fs");

        let finished_threads = AtomicUsize::new(0);
        let (mut submits, mut draws) = thread::scope(|scope| {
            for thread_index in 0..NUM_THREADS {
                let profiler = &profiler;
                let finished_threads = &finished_threads;
                scope.spawn(move || {
                    let command_buffer = CommandBufferHandle(0x100 + thread_index);
                    allocate_primary(profiler, command_buffer);
                    for _ in 0..SUBMITS_PER_THREAD {
                        profiler.begin_command_buffer(command_buffer);
                        profiler.bind_pipeline(command_buffer, pipeline);
                        record_commands(profiler, command_buffer, DrawcallType::Draw, DRAWS_PER_SUBMIT);
                        profiler.end_command_buffer(command_buffer);
                        submit(profiler, &[command_buffer]);
                    }
                    finished_threads.fetch_add(1, Ordering::Release);
                });
            }

            let presenter = scope.spawn(|| {
                let (mut submits, mut draws) = (0, 0);
                while finished_threads.load(Ordering::Acquire) < NUM_THREADS as usize {
                    profiler.present(QUEUE);
                    let frame = profiler.get_data();
                    submits += frame.submits.len();
                    draws += frame.stats.draw_count as usize;
                    thread::yield_now();
                }
                (submits, draws)
            });
            presenter.join().unwrap()
        });

        // Whatever was submitted after the last present of the loop.
        profiler.present(QUEUE);
        let frame = profiler.get_data();
        submits += frame.submits.len();
        draws += frame.stats.draw_count as usize;

        let expected_submits = NUM_THREADS as usize * SUBMITS_PER_THREAD;
        assert_eq!(submits, expected_submits, "{mode:?}");
        assert_eq!(draws, expected_submits * DRAWS_PER_SUBMIT, "{mode:?}");
    }
}

#[test]
fn sync_modes() {
    let (device, profiler) = create_profiler(ProfilerSettings::default());
    allocate_primary(&profiler, COMMAND_BUFFER);
    record_single_draw(&profiler, COMMAND_BUFFER);

    submit(&profiler, &[COMMAND_BUFFER]);
    submit(&profiler, &[COMMAND_BUFFER]);
    assert_eq!(device.fence_wait_count(), 0);
    profiler.present(QUEUE);
    assert_eq!(device.wait_idle_count(), 1);

    profiler.set_sync_mode(SyncMode::Submit);
    // Takes effect at the frame boundary.
    submit(&profiler, &[COMMAND_BUFFER]);
    assert_eq!(device.fence_wait_count(), 0);
    profiler.present(QUEUE);
    assert_eq!(device.wait_idle_count(), 2);

    submit(&profiler, &[COMMAND_BUFFER]);
    submit(&profiler, &[COMMAND_BUFFER]);
    assert_eq!(device.fence_wait_count(), 2);
    profiler.present(QUEUE);
    assert_eq!(device.wait_idle_count(), 2);
    assert_eq!(profiler.get_data().submits.len(), 2);
}

#[test]
fn mode_changes_apply_to_next_frame() {
    let (_device, profiler) = create_profiler(ProfilerSettings::default());
    allocate_primary(&profiler, COMMAND_BUFFER);

    profiler.set_mode(ProfilerMode::PerFrame);
    assert_eq!(profiler.settings().mode, ProfilerMode::PerDrawcall);
    record_single_draw(&profiler, COMMAND_BUFFER);
    submit(&profiler, &[COMMAND_BUFFER]);
    profiler.present(QUEUE);

    assert_eq!(profiler.settings().mode, ProfilerMode::PerFrame);
    let frame = profiler.get_data();
    assert_eq!(command_buffers(&frame)[0].render_passes.len(), 1);

    record_single_draw(&profiler, COMMAND_BUFFER);
    submit(&profiler, &[COMMAND_BUFFER]);
    profiler.present(QUEUE);
    let frame = profiler.get_data();
    assert!(command_buffers(&frame)[0].render_passes.is_empty());
    assert_eq!(frame.stats.draw_count, 1);
}

#[test]
fn settings_changes_are_validated() {
    let (_device, profiler) = create_profiler(ProfilerSettings::default());

    assert_eq!(
        profiler.change_settings(ProfilerSettings {
            query_pool_size: 1,
            ..Default::default()
        }),
        Err(SettingsError::InvalidQueryPoolSize(1))
    );

    profiler
        .change_settings(ProfilerSettings {
            mode: ProfilerMode::PerRenderPass,
            sync_mode: SyncMode::Submit,
            query_pool_size: 64,
            output_update_interval: Duration::from_secs(1),
        })
        .unwrap();
    assert_eq!(profiler.settings(), ProfilerSettings::default());

    profiler.present(QUEUE);
    let settings = profiler.settings();
    assert_eq!(settings.mode, ProfilerMode::PerRenderPass);
    assert_eq!(settings.sync_mode, SyncMode::Submit);
    assert_eq!(settings.output_update_interval, Duration::from_secs(1));
    // Pools already handed out keep their size.
    assert_eq!(settings.query_pool_size, ProfilerSettings::default().query_pool_size);
}

#[test]
fn memory_allocations_are_reported() {
    let (_device, profiler) = create_profiler(ProfilerSettings::default());
    profiler.allocate_memory(DeviceMemoryHandle(1), 1024, 0);
    profiler.allocate_memory(DeviceMemoryHandle(2), 512, 1);
    profiler.allocate_memory(DeviceMemoryHandle(3), 256, 2);
    profiler.present(QUEUE);

    let frame = profiler.get_data();
    let memory = &frame.memory;
    assert_eq!(memory.total_allocation_count, 3);
    assert_eq!(memory.total_allocation_size, 1792);
    assert_eq!(memory.device_local_allocation_size, 1280);
    assert_eq!(memory.host_visible_allocation_size, 768);
    assert_eq!(memory.heaps[0].allocation_count, 2);
    assert_eq!(memory.heaps[1].allocation_size, 512);
    assert_eq!(memory.types[2].allocation_size, 256);

    profiler.free_memory(DeviceMemoryHandle(1));
    profiler.free_memory(DeviceMemoryHandle(42));
    profiler.present(QUEUE);

    let frame = profiler.get_data();
    let memory = &frame.memory;
    assert_eq!(memory.total_allocation_count, 2);
    assert_eq!(memory.total_allocation_size, 768);
    assert_eq!(memory.device_local_allocation_size, 256);
    assert_eq!(memory.heaps[0].allocation_size, 256);
}

#[test]
fn cpu_counters() {
    let (_device, profiler) = create_profiler(ProfilerSettings {
        output_update_interval: Duration::ZERO,
        ..Default::default()
    });
    thread::sleep(Duration::from_millis(2));
    profiler.present(QUEUE);
    let cpu = profiler.get_data().cpu;
    assert!(cpu.frame_time >= Duration::from_millis(2));
    assert!(cpu.frames_per_sec > 0.0);
}

struct FakeMetrics;

impl VendorMetrics for FakeMetrics {
    fn metric_properties(&self) -> Vec<MetricProperties> {
        ["gpu_busy", "shader_clock", "vram_bandwidth"]
            .into_iter()
            .zip([MetricUnit::Percentage, MetricUnit::Hertz, MetricUnit::BytesPerSecond])
            .map(|(short_name, unit)| MetricProperties {
                short_name: short_name.to_owned(),
                description: format!("Fake {short_name}"),
                unit,
            })
            .collect()
    }

    fn collect_frame_metrics(&self) -> Vec<MetricValue> {
        vec![
            MetricValue::Float(87.5),
            MetricValue::Unsigned(1_500_000_000),
            MetricValue::Unsigned(1 << 30),
        ]
    }
}

#[test]
fn metrics_enumeration() {
    init_logger();
    let profiler = DeviceProfiler::new(
        FakeDevice::new(),
        ProfilerSettings::default(),
        MetricsBackend::Vendor(Box::new(FakeMetrics)),
    )
    .unwrap();

    assert_eq!(profiler.enumerate_metric_properties(None), EnumerateResult::Complete(3));

    let mut too_small = vec![MetricProperties::default(); 2];
    assert_eq!(
        profiler.enumerate_metric_properties(Some(too_small.as_mut_slice())),
        EnumerateResult::Incomplete(2)
    );
    assert_eq!(too_small[1].short_name, "shader_clock");

    let mut large_enough = vec![MetricProperties::default(); 4];
    assert_eq!(
        profiler.enumerate_metric_properties(Some(large_enough.as_mut_slice())),
        EnumerateResult::Complete(3)
    );
    assert_eq!(large_enough[2].unit, MetricUnit::BytesPerSecond);
    assert_eq!(large_enough[3], MetricProperties::default());

    profiler.present(QUEUE);
    assert_eq!(profiler.get_data().metrics, FakeMetrics.collect_frame_metrics());
}

#[test]
fn no_metrics_without_backend() {
    let (_device, profiler) = create_profiler(ProfilerSettings::default());
    assert_eq!(profiler.enumerate_metric_properties(None), EnumerateResult::Complete(0));
    let mut properties = vec![MetricProperties::default(); 1];
    assert_eq!(
        profiler.enumerate_metric_properties(Some(properties.as_mut_slice())),
        EnumerateResult::Complete(0)
    );
    profiler.present(QUEUE);
    assert!(profiler.get_data().metrics.is_empty());
}

#[test]
fn debug_names() {
    let (_device, profiler) = create_profiler(ProfilerSettings::default());
    let named_early = PipelineHandle(0x30);
    let named_late = PipelineHandle(0x31);
    let render_pass = RenderPassHandle(0x20);

    profiler.set_debug_object_name(named_early.as_raw(), "Shadows");
    create_graphics_pipeline(&profiler, named_early, b"vs0", b"fs0");
    create_graphics_pipeline(&profiler, named_late, b"vs1", b"fs1");
    let default_name = profiler.registry().pipelines.at(named_late).unwrap().shader_tuple.label();
    assert_eq!(profiler.name_for_handle(named_early.as_raw()), "Shadows");
    assert_eq!(profiler.name_for_handle(named_late.as_raw()), default_name);

    profiler.set_debug_object_name(named_late.as_raw(), "Lighting");
    profiler.set_debug_object_name(COMMAND_BUFFER.as_raw(), "Main");
    create_render_pass(&profiler, render_pass, 1);
    allocate_primary(&profiler, COMMAND_BUFFER);

    profiler.begin_command_buffer(COMMAND_BUFFER);
    profiler.begin_render_pass(COMMAND_BUFFER, render_pass, SubpassContents::Inline);
    profiler.post_begin_render_pass(COMMAND_BUFFER);
    for pipeline in [named_early, named_late] {
        profiler.bind_pipeline(COMMAND_BUFFER, pipeline);
        record_commands(&profiler, COMMAND_BUFFER, DrawcallType::Draw, 1);
    }
    profiler.pre_end_render_pass(COMMAND_BUFFER);
    profiler.end_render_pass(COMMAND_BUFFER);
    profiler.end_command_buffer(COMMAND_BUFFER);
    submit(&profiler, &[COMMAND_BUFFER]);

    // Names are captured at the frame boundary.
    profiler.set_debug_object_name(named_early.as_raw(), "Cascaded shadows");
    profiler.present(QUEUE);
    profiler.set_debug_object_name(named_early.as_raw(), "");
    assert_eq!(profiler.name_for_handle(named_early.as_raw()), "0x0000000000000030");

    let frame = profiler.get_data();
    assert_eq!(frame.name_for_handle(named_early.as_raw()), "Cascaded shadows");
    assert_eq!(frame.name_for_handle(named_late.as_raw()), "Lighting");
    assert_eq!(frame.name_for_handle(COMMAND_BUFFER.as_raw()), "Main");
    assert_eq!(frame.name_for_handle(render_pass.as_raw()), "0x0000000000000020");
    // Only referenced objects are captured.
    assert_eq!(frame.object_names.len(), 3);
}

#[test]
fn creation_fails_cleanly() {
    init_logger();

    let device = FakeDevice::new();
    let result = DeviceProfiler::new(
        device.clone(),
        ProfilerSettings {
            query_pool_size: 1,
            ..Default::default()
        },
        MetricsBackend::None,
    );
    assert_eq!(
        result.err(),
        Some(CreationError::InvalidSettings(SettingsError::InvalidQueryPoolSize(1)))
    );
    assert_eq!(device.live_fences(), 0);

    let device = FakeDevice::new();
    device.fail_fence_creation();
    let result = DeviceProfiler::new(device.clone(), ProfilerSettings::default(), MetricsBackend::None);
    assert_eq!(result.err(), Some(CreationError::Device(DeviceError::OutOfHostMemory)));
    assert_eq!(device.live_query_pools(), 0);

    let device = FakeDevice::new();
    device.limit_query_pool_creation(2);
    let result = DeviceProfiler::new(device.clone(), ProfilerSettings::default(), MetricsBackend::None);
    assert_eq!(result.err(), Some(CreationError::Device(DeviceError::OutOfDeviceMemory)));
    assert_eq!(device.live_query_pools(), 0);
    assert_eq!(device.live_fences(), 0);
}

#[test]
fn recording_survives_query_pool_exhaustion() {
    let (device, profiler) = create_profiler(ProfilerSettings {
        query_pool_size: 2,
        ..Default::default()
    });
    // Only the preallocated pools are left.
    device.limit_query_pool_creation(0);
    allocate_primary(&profiler, COMMAND_BUFFER);

    profiler.begin_command_buffer(COMMAND_BUFFER);
    record_commands(&profiler, COMMAND_BUFFER, DrawcallType::Draw, 10);
    profiler.end_command_buffer(COMMAND_BUFFER);
    submit(&profiler, &[COMMAND_BUFFER]);
    profiler.present(QUEUE);

    let frame = profiler.get_data();
    assert_eq!(frame.stats.draw_count, 10);
    let drawcalls = &command_buffers(&frame)[0].render_passes[0].subpasses[0].pipelines[0].drawcalls;
    assert_eq!(drawcalls.len(), 10);
    // The preallocated pools hold the command buffer begin, three complete draws and the begin of a fourth.
    assert_eq!(drawcalls.iter().filter(|drawcall| drawcall.timestamps.is_some()).count(), 3);
}

#[test]
fn dropping_the_profiler_releases_device_objects() {
    let (device, profiler) = create_profiler(ProfilerSettings::default());
    assert_eq!(device.live_fences(), 1);
    assert!(device.live_query_pools() > 0);

    let secondary = CommandBufferHandle(0x11);
    allocate_primary(&profiler, COMMAND_BUFFER);
    profiler.allocate_command_buffers(&[secondary], CommandBufferLevel::Secondary);

    record_single_draw(&profiler, COMMAND_BUFFER);
    submit(&profiler, &[COMMAND_BUFFER]);
    profiler.present(QUEUE);

    // Left pending and left recording.
    submit(&profiler, &[COMMAND_BUFFER]);
    profiler.begin_command_buffer(secondary);
    record_commands(&profiler, secondary, DrawcallType::Dispatch, 1);

    let frame = profiler.get_data();
    drop(profiler);
    assert_eq!(device.live_query_pools(), 0);
    assert_eq!(device.live_fences(), 0);
    assert_eq!(frame.stats.draw_count, 1);
}

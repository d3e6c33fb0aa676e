//! Merging of submitted recordings into per-frame results.

use std::{collections::HashMap, sync::Arc};

use parking_lot::Mutex;

use crate::{
    command_buffer::{
        QueryRange, RecordedCommandBuffer, RecordedDrawcall, RecordedPipeline, RecordedRenderPass, RecordedSubpass,
    },
    data::{
        CommandBufferData, DrawcallData, DrawcallStats, FrameData, PipelineData, RenderPassData, SubmitBatchData, SubmitData,
        SubpassData, TimestampRange,
    },
    queries::ResolvedTimestamps,
    submit::SubmitBatch,
};

/// Number of pipelines reported in [`FrameData::top_pipelines`].
pub const NUM_TOP_PIPELINES: usize = 10;

#[derive(Default)]
struct AggregatorState {
    pending_batches: Vec<SubmitBatch>,
    last_frame: Arc<FrameData>,
}

/// Collects submission batches of the current frame and turns them into [`FrameData`].
#[derive(Default)]
pub struct DataAggregator {
    state: Mutex<AggregatorState>,
}

impl DataAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a batch for the next [`Self::aggregate`].
    pub fn append_submit(&self, batch: SubmitBatch) {
        self.state.lock().pending_batches.push(batch);
    }

    pub fn num_pending_batches(&self) -> usize {
        self.state.lock().pending_batches.len()
    }

    /// Resolves all queued batches into a new frame.
    ///
    /// Every batch is consumed exactly once. The GPU must have finished executing the queued batches,
    /// which the caller makes sure of by waiting on the device or on each submission.
    pub fn aggregate(&self) -> Arc<FrameData> {
        profiling::scope!("DataAggregator::aggregate");

        let mut batches = std::mem::take(&mut self.state.lock().pending_batches);
        // Several threads may submit at once, so append order doesn't need to match submission order.
        batches.sort_by_key(|batch| batch.submit_index);

        // Query readback may block, so it happens without holding the lock.
        let frame = Arc::new(resolve_frame(batches));
        self.state.lock().last_frame = frame.clone();
        frame
    }

    /// Result of the last [`Self::aggregate`].
    pub fn get_aggregated_data(&self) -> Arc<FrameData> {
        self.state.lock().last_frame.clone()
    }

    /// Drops queued batches and the last result.
    ///
    /// Frames handed out before stay untouched.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.pending_batches.clear();
        state.last_frame = Arc::default();
    }
}

fn resolve_frame(batches: Vec<SubmitBatch>) -> FrameData {
    let submits: Vec<SubmitBatchData> = batches.into_iter().map(resolve_batch).collect();

    let mut frame = FrameData {
        ticks: submits.iter().map(|batch| batch.ticks).sum(),
        stats: submits.iter().map(|batch| batch.stats).sum(),
        submits,
        ..Default::default()
    };
    frame.top_pipelines = collect_top_pipelines(&frame);
    frame
}

fn resolve_batch(batch: SubmitBatch) -> SubmitBatchData {
    let submits: Vec<SubmitData> = batch
        .submits
        .into_iter()
        .map(|submit| {
            let command_buffers: Vec<CommandBufferData> =
                submit.command_buffers.iter().map(resolve_command_buffer).collect();
            SubmitData {
                ticks: command_buffers.iter().map(|command_buffer| command_buffer.ticks).sum(),
                stats: command_buffers.iter().map(|command_buffer| command_buffer.stats).sum(),
                command_buffers,
            }
        })
        .collect();

    SubmitBatchData {
        queue: batch.queue,
        submit_index: batch.submit_index,
        ticks: submits.iter().map(|submit| submit.ticks).sum(),
        stats: submits.iter().map(|submit| submit.stats).sum(),
        submits,
    }
}

/// Reads back the timestamps of `recorded` and builds its region tree.
///
/// Regions without both timestamps take the time of their children.
/// If the timestamps can't be read at all, the whole tree reports zero ticks but keeps its counters.
pub fn resolve_command_buffer(recorded: &RecordedCommandBuffer) -> CommandBufferData {
    let timestamps = recorded.timestamps.as_ref().and_then(|queries| match queries.read() {
        Ok(timestamps) => Some(timestamps),
        Err(err) => {
            log::warn!("Failed to read timestamps of {:?}: {err}", recorded.handle);
            None
        }
    });
    let timestamps = timestamps.as_ref();

    let render_passes: Vec<RenderPassData> = recorded
        .render_passes
        .iter()
        .map(|render_pass| resolve_render_pass(timestamps, render_pass))
        .collect();

    let range = resolve_range(timestamps, recorded.queries);
    let mut stats = recorded.stats;
    stats += render_passes.iter().map(|render_pass| render_pass.stats).sum::<DrawcallStats>();

    CommandBufferData {
        handle: recorded.handle,
        level: recorded.level,
        ticks: ticks_or(range, || render_passes.iter().map(|render_pass| render_pass.ticks).sum()),
        stats,
        timestamps: range,
        render_passes,
    }
}

fn resolve_render_pass(timestamps: Option<&ResolvedTimestamps>, recorded: &RecordedRenderPass) -> RenderPassData {
    let subpasses: Vec<SubpassData> = recorded
        .subpasses
        .iter()
        .map(|subpass| resolve_subpass(timestamps, subpass))
        .collect();

    let range = resolve_range(timestamps, recorded.queries);
    let begin = resolve_range(timestamps, recorded.begin);
    let end = resolve_range(timestamps, recorded.end);
    let mut stats = recorded.stats;
    stats += subpasses.iter().map(|subpass| subpass.stats).sum::<DrawcallStats>();

    RenderPassData {
        handle: recorded.handle,
        ticks: ticks_or(range, || {
            begin.map_or(0, |border| border.ticks())
                + subpasses.iter().map(|subpass| subpass.ticks).sum::<u64>()
                + end.map_or(0, |border| border.ticks())
        }),
        stats,
        timestamps: range,
        begin,
        end,
        subpasses,
    }
}

fn resolve_subpass(timestamps: Option<&ResolvedTimestamps>, recorded: &RecordedSubpass) -> SubpassData {
    let pipelines: Vec<PipelineData> = recorded
        .pipelines
        .iter()
        .map(|pipeline| resolve_pipeline(timestamps, pipeline))
        .collect();
    // Secondary command buffers carry their own timestamps.
    let secondary_command_buffers: Vec<CommandBufferData> = recorded
        .secondary_command_buffers
        .iter()
        .map(resolve_command_buffer)
        .collect();

    let range = resolve_range(timestamps, recorded.queries);
    let mut stats = recorded.stats;
    stats += pipelines.iter().map(|pipeline| pipeline.stats).sum::<DrawcallStats>();
    stats += secondary_command_buffers.iter().map(|secondary| secondary.stats).sum::<DrawcallStats>();

    SubpassData {
        index: recorded.index,
        contents: recorded.contents,
        ticks: ticks_or(range, || {
            pipelines.iter().map(|pipeline| pipeline.ticks).sum::<u64>()
                + secondary_command_buffers.iter().map(|secondary| secondary.ticks).sum::<u64>()
        }),
        stats,
        timestamps: range,
        pipelines,
        secondary_command_buffers,
    }
}

fn resolve_pipeline(timestamps: Option<&ResolvedTimestamps>, recorded: &RecordedPipeline) -> PipelineData {
    let drawcalls: Vec<DrawcallData> = recorded
        .drawcalls
        .iter()
        .map(|drawcall| resolve_drawcall(timestamps, drawcall))
        .collect();

    let range = resolve_range(timestamps, recorded.queries);

    PipelineData {
        handle: recorded.pipeline.handle,
        bind_point: recorded.pipeline.bind_point,
        shader_tuple: recorded.pipeline.shader_tuple,
        ticks: ticks_or(range, || drawcalls.iter().map(|drawcall| drawcall.ticks).sum()),
        stats: recorded.stats,
        timestamps: range,
        drawcalls,
    }
}

fn resolve_drawcall(timestamps: Option<&ResolvedTimestamps>, recorded: &RecordedDrawcall) -> DrawcallData {
    let range = resolve_range(timestamps, recorded.queries);
    DrawcallData {
        drawcall_type: recorded.drawcall_type,
        ticks: range.map_or(0, |range| range.ticks()),
        timestamps: range,
    }
}

fn resolve_range(timestamps: Option<&ResolvedTimestamps>, queries: QueryRange) -> Option<TimestampRange> {
    let timestamps = timestamps?;
    Some(TimestampRange {
        begin: timestamps.get(queries.begin?)?,
        end: timestamps.get(queries.end?)?,
    })
}

#[inline]
fn ticks_or(range: Option<TimestampRange>, children: impl FnOnce() -> u64) -> u64 {
    match range {
        Some(range) => range.ticks(),
        None => children(),
    }
}

/// Pipelines with the most GPU time, merged across all their uses in the frame.
///
/// The internal pseudo-pipeline is left out. Ties keep the order of first use.
fn collect_top_pipelines(frame: &FrameData) -> Vec<PipelineData> {
    fn visit_command_buffer(
        command_buffer: &CommandBufferData,
        merged: &mut Vec<PipelineData>,
        index_by_handle: &mut HashMap<u64, usize>,
    ) {
        for subpass in command_buffer
            .render_passes
            .iter()
            .flat_map(|render_pass| render_pass.subpasses.iter())
        {
            for pipeline in subpass.pipelines.iter().filter(|pipeline| !pipeline.handle.is_null()) {
                match index_by_handle.get(&pipeline.handle.as_raw()) {
                    Some(&index) => {
                        merged[index].ticks += pipeline.ticks;
                        merged[index].stats += pipeline.stats;
                    }
                    None => {
                        index_by_handle.insert(pipeline.handle.as_raw(), merged.len());
                        merged.push(PipelineData {
                            timestamps: None,
                            drawcalls: Vec::new(),
                            ..pipeline.clone()
                        });
                    }
                }
            }
            for secondary in &subpass.secondary_command_buffers {
                visit_command_buffer(secondary, merged, index_by_handle);
            }
        }
    }

    let mut merged = Vec::new();
    let mut index_by_handle = HashMap::new();
    for command_buffer in frame
        .submits
        .iter()
        .flat_map(|batch| batch.submits.iter())
        .flat_map(|submit| submit.command_buffers.iter())
    {
        visit_command_buffer(command_buffer, &mut merged, &mut index_by_handle);
    }

    merged.sort_by(|a, b| b.ticks.cmp(&a.ticks));
    merged.truncate(NUM_TOP_PIPELINES);
    merged
}

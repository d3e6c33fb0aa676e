//! Recording of the region hierarchy of a single command buffer.
//!
//! A [`CommandBufferRecorder`] follows the recording hooks of one command buffer and builds a tree of
//! command buffer → render pass → subpass → pipeline → drawcall regions.
//! Regions reference timestamp queries by address only; the queries are read back once the GPU has finished,
//! see [`DataAggregator`](crate::DataAggregator).
//!
//! Commands recorded outside of a render pass are placed in an implicit render pass with a null handle,
//! which contains a single subpass without an index.
//! Transfer and clear commands are attributed to [`PipelineRecord::INTERNAL`].
//!
//! A hook that closes regions and opens new ones writes a single timestamp that ends all closed regions
//! and begins all opened ones. This keeps a render pass exactly as long as its borders and subpasses together.

use std::sync::Arc;

use crate::{
    data::{CommandBufferLevel, DrawcallStats, DrawcallType, SubpassContents},
    queries::{QueryAddress, QueryAllocator, QueryPoolCache, TimestampQueries},
    CommandBufferHandle, ImageHandle, PipelineBindPoint, PipelineRecord, ProfilerMode, RenderPassHandle,
    RenderPassRecord, SubmitError,
};

/// Lifecycle of a command buffer as seen by the profiler.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum RecorderState {
    /// Allocated, never recorded.
    #[default]
    Initial,
    Recording,
    /// Recording ended, ready for submission.
    Executable,
    /// Submitted at least once since the last recording.
    Submitted,
}

/// Begin and end timestamp query of a region.
///
/// Either may be missing, if the region isn't timed at the active [`ProfilerMode`] or no query could be allocated.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueryRange {
    pub begin: Option<QueryAddress>,
    pub end: Option<QueryAddress>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordedDrawcall {
    pub drawcall_type: DrawcallType,
    pub queries: QueryRange,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordedPipeline {
    /// Copy of the pipeline's record at the time it was used.
    pub pipeline: PipelineRecord,
    pub queries: QueryRange,
    pub stats: DrawcallStats,
    pub drawcalls: Vec<RecordedDrawcall>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordedSubpass {
    pub index: Option<u32>,
    pub contents: SubpassContents,
    pub queries: QueryRange,
    /// Counters of commands not recorded at pipeline level.
    pub stats: DrawcallStats,
    pub pipelines: Vec<RecordedPipeline>,
    pub secondary_command_buffers: Vec<RecordedCommandBuffer>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordedRenderPass {
    pub handle: RenderPassHandle,
    pub queries: QueryRange,
    /// Implicit clears performed by the render pass itself.
    pub stats: DrawcallStats,
    pub begin: QueryRange,
    pub end: QueryRange,
    pub subpasses: Vec<RecordedSubpass>,
}

/// Finished recording of a command buffer.
///
/// Holds a shared handle to its timestamp queries, so the snapshot may outlive the recorder and its next recording.
#[derive(Clone, Debug, Default)]
pub struct RecordedCommandBuffer {
    pub handle: CommandBufferHandle,
    pub level: CommandBufferLevel,
    pub queries: QueryRange,
    /// Counters not attributed to any render pass, such as barriers.
    pub stats: DrawcallStats,
    pub render_passes: Vec<RecordedRenderPass>,
    pub timestamps: Option<Arc<TimestampQueries>>,
}

impl PartialEq for RecordedCommandBuffer {
    fn eq(&self, other: &Self) -> bool {
        self.handle == other.handle
            && self.level == other.level
            && self.queries == other.queries
            && self.stats == other.stats
            && self.render_passes == other.render_passes
            && match (&self.timestamps, &other.timestamps) {
                (Some(a), Some(b)) => Arc::ptr_eq(a, b),
                (None, None) => true,
                _ => false,
            }
    }
}

impl Eq for RecordedCommandBuffer {}

impl RecordedCommandBuffer {
    /// Sum of the counters of this command buffer and everything recorded in it.
    pub fn total_stats(&self) -> DrawcallStats {
        let mut stats = self.stats;
        for render_pass in &self.render_passes {
            stats += render_pass.stats;
            for subpass in &render_pass.subpasses {
                stats += subpass.stats;
                stats += subpass.pipelines.iter().map(|pipeline| pipeline.stats).sum::<DrawcallStats>();
                stats += subpass
                    .secondary_command_buffers
                    .iter()
                    .map(RecordedCommandBuffer::total_stats)
                    .sum::<DrawcallStats>();
            }
        }
        stats
    }
}

/// Image layout, using the host API's values.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct ImageLayout(pub u32);

impl ImageLayout {
    pub const UNDEFINED: Self = Self(0);
    pub const GENERAL: Self = Self(1);
    pub const COLOR_ATTACHMENT_OPTIMAL: Self = Self(2);
    pub const DEPTH_STENCIL_ATTACHMENT_OPTIMAL: Self = Self(3);
    pub const SHADER_READ_ONLY_OPTIMAL: Self = Self(5);
    pub const TRANSFER_SRC_OPTIMAL: Self = Self(6);
    pub const TRANSFER_DST_OPTIMAL: Self = Self(7);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ImageMemoryBarrier {
    pub image: ImageHandle,
    pub old_layout: ImageLayout,
    pub new_layout: ImageLayout,
}

/// Arguments of a pipeline barrier command.
#[derive(Clone, Copy, Debug, Default)]
pub struct PipelineBarrierInfo<'a> {
    pub memory_barrier_count: u32,
    pub buffer_memory_barrier_count: u32,
    pub image_memory_barriers: &'a [ImageMemoryBarrier],
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum RenderPassPhase {
    /// Between begin and the first subpass.
    Begin,
    Subpass,
    /// After the last subpass.
    End,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum OpenRenderPass {
    Implicit,
    Explicit(RenderPassPhase),
}

/// Currently open regions. Open regions are always the last element at their level.
#[derive(Clone, Copy, Debug, Default)]
struct Cursor {
    command_buffer_open: bool,
    render_pass: Option<OpenRenderPass>,
    subpass_open: bool,
    pipeline_open: bool,
    drawcall_open: bool,
    /// Command between its pre and post hook.
    pending_command: Option<DrawcallType>,
    /// Contents of the first subpass, known at render pass begin.
    first_subpass_contents: SubpassContents,
    graphics_pipeline: Option<PipelineRecord>,
    compute_pipeline: Option<PipelineRecord>,
}

/// Regions a [`ProfilerMode`] builds nodes for and times.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
enum Depth {
    RenderPass,
    Pipeline,
    Drawcall,
}

/// Records the region hierarchy of one command buffer.
///
/// Each command buffer has its own recorder behind its own lock, so threads recording different command buffers never wait on each other.
pub struct CommandBufferRecorder {
    handle: CommandBufferHandle,
    level: CommandBufferLevel,
    mode: ProfilerMode,
    state: RecorderState,
    query_pool_cache: Arc<QueryPoolCache>,
    allocator: Option<QueryAllocator>,
    data: RecordedCommandBuffer,
    cursor: Cursor,
}

impl CommandBufferRecorder {
    pub fn new(handle: CommandBufferHandle, level: CommandBufferLevel, query_pool_cache: Arc<QueryPoolCache>) -> Self {
        Self {
            handle,
            level,
            mode: ProfilerMode::default(),
            state: RecorderState::Initial,
            query_pool_cache,
            allocator: None,
            data: RecordedCommandBuffer {
                handle,
                level,
                ..Default::default()
            },
            cursor: Cursor::default(),
        }
    }

    pub fn handle(&self) -> CommandBufferHandle {
        self.handle
    }

    pub fn level(&self) -> CommandBufferLevel {
        self.level
    }

    pub fn state(&self) -> RecorderState {
        self.state
    }

    /// Detail level of the current recording.
    pub fn mode(&self) -> ProfilerMode {
        self.mode
    }

    /// Number of regions that are still open.
    pub fn num_open_regions(&self) -> usize {
        let cursor = &self.cursor;
        [
            cursor.command_buffer_open,
            cursor.render_pass.is_some(),
            cursor.subpass_open,
            cursor.pipeline_open,
            cursor.drawcall_open,
        ]
        .into_iter()
        .filter(|open| *open)
        .count()
    }

    /// Starts a new recording, discarding the previous one.
    ///
    /// Snapshots of the previous recording handed out by [`Self::get_data`] stay valid.
    pub fn begin(&mut self, mode: ProfilerMode) {
        if self.state == RecorderState::Recording {
            log::debug!("{:?} began recording while already recording, restarting", self.handle);
        }

        self.mode = mode;
        self.allocator = Some(QueryAllocator::new(self.query_pool_cache.clone()));
        self.data = RecordedCommandBuffer {
            handle: self.handle,
            level: self.level,
            ..Default::default()
        };
        self.cursor = Cursor {
            command_buffer_open: true,
            ..Default::default()
        };
        self.state = RecorderState::Recording;

        self.data.queries.begin = self.write_timestamp();
    }

    /// Closes every open region and freezes the recording.
    pub fn end(&mut self) {
        if self.state != RecorderState::Recording {
            log::debug!("Ignoring end of {:?}, it is not recording", self.handle);
            return;
        }

        let query = self.write_timestamp();
        self.close_render_pass(query);
        self.data.queries.end = query;
        self.cursor.command_buffer_open = false;

        self.data.timestamps = self.allocator.take().map(|allocator| Arc::new(allocator.finish()));
        self.state = RecorderState::Executable;
    }

    pub fn begin_render_pass(&mut self, render_pass: &RenderPassRecord, contents: SubpassContents) {
        if !self.is_recording("begin render pass") {
            return;
        }

        let query = self.timestamp_if(self.records(Depth::RenderPass));
        if let Some(OpenRenderPass::Explicit(_)) = self.cursor.render_pass {
            log::warn!("{:?} began a render pass while another one was still open", self.handle);
        }
        self.close_render_pass(query);

        let implicit_clears = DrawcallStats {
            clear_implicit_count: render_pass.clear_color_attachment_count
                + render_pass.clear_depth_stencil_attachment_count,
            ..Default::default()
        };

        self.cursor.render_pass = Some(OpenRenderPass::Explicit(RenderPassPhase::Begin));
        self.cursor.first_subpass_contents = contents;

        if self.records(Depth::RenderPass) {
            self.data.render_passes.push(RecordedRenderPass {
                handle: render_pass.handle,
                queries: QueryRange {
                    begin: query,
                    end: None,
                },
                stats: implicit_clears,
                begin: QueryRange {
                    begin: query,
                    end: None,
                },
                end: QueryRange::default(),
                subpasses: Vec::with_capacity(render_pass.subpass_count as usize),
            });
        } else {
            self.data.stats += implicit_clears;
        }
    }

    /// Called after the render pass began, ends its begin border and opens the first subpass.
    pub fn post_begin_render_pass(&mut self) {
        if self.cursor.render_pass != Some(OpenRenderPass::Explicit(RenderPassPhase::Begin)) {
            log::debug!("Ignoring unmatched post begin render pass on {:?}", self.handle);
            return;
        }

        let query = self.timestamp_if(self.records(Depth::RenderPass));
        let contents = self.cursor.first_subpass_contents;
        if let Some(render_pass) = self.current_render_pass_mut() {
            render_pass.begin.end = query;
        }
        self.cursor.render_pass = Some(OpenRenderPass::Explicit(RenderPassPhase::Subpass));
        self.open_subpass(Some(0), contents, query);
    }

    pub fn next_subpass(&mut self, contents: SubpassContents) {
        if self.cursor.render_pass != Some(OpenRenderPass::Explicit(RenderPassPhase::Subpass)) {
            log::debug!("Ignoring next subpass outside of a render pass on {:?}", self.handle);
            return;
        }

        let query = self.timestamp_if(self.records(Depth::RenderPass));
        let next_index = self
            .current_subpass_mut()
            .and_then(|subpass| subpass.index)
            .map_or(0, |index| index + 1);
        self.close_subpass(query);
        self.open_subpass(Some(next_index), contents, query);
    }

    /// Called before the render pass ends, closes the last subpass and opens the end border.
    pub fn pre_end_render_pass(&mut self) {
        if self.cursor.render_pass != Some(OpenRenderPass::Explicit(RenderPassPhase::Subpass)) {
            log::debug!("Ignoring unmatched pre end render pass on {:?}", self.handle);
            return;
        }

        let query = self.timestamp_if(self.records(Depth::RenderPass));
        self.close_subpass(query);
        if let Some(render_pass) = self.current_render_pass_mut() {
            render_pass.end.begin = query;
        }
        self.cursor.render_pass = Some(OpenRenderPass::Explicit(RenderPassPhase::End));
    }

    /// Closes the render pass. Ignored if no render pass was begun.
    pub fn end_render_pass(&mut self) {
        let Some(OpenRenderPass::Explicit(phase)) = self.cursor.render_pass else {
            log::warn!("Ignoring end of render pass on {:?}, no render pass was begun", self.handle);
            return;
        };
        if phase != RenderPassPhase::End {
            log::debug!("{:?} ended a render pass without the pre end hook", self.handle);
        }

        let query = self.timestamp_if(self.records(Depth::RenderPass));
        self.close_render_pass(query);
    }

    /// Sets the pipeline subsequent draws or dispatches are attributed to.
    pub fn bind_pipeline(&mut self, pipeline: PipelineRecord) {
        if !self.is_recording("bind pipeline") {
            return;
        }

        match pipeline.bind_point {
            PipelineBindPoint::Graphics => self.cursor.graphics_pipeline = Some(pipeline),
            PipelineBindPoint::Compute => self.cursor.compute_pipeline = Some(pipeline),
        }
    }

    /// Called before a drawcall-class command is recorded.
    pub fn pre_command(&mut self, drawcall_type: DrawcallType) {
        if !self.is_recording("pre command") {
            return;
        }

        if let Some(unfinished) = self.cursor.pending_command {
            log::debug!("{unfinished:?} on {:?} had no post command hook", self.handle);
            self.post_command(unfinished);
        }

        let pipeline = self.pipeline_for(drawcall_type);
        let opens_render_pass = self.cursor.render_pass.is_none() && self.records(Depth::RenderPass);
        let in_subpass = opens_render_pass || self.cursor.subpass_open;
        let switches_pipeline = in_subpass
            && self.records(Depth::Pipeline)
            && !(self.cursor.pipeline_open
                && self.current_pipeline_mut().map(|open| open.pipeline) == Some(pipeline));

        let query = self.timestamp_if(
            (opens_render_pass && self.times(Depth::RenderPass))
                || (switches_pipeline && self.times(Depth::Pipeline))
                || (in_subpass && self.times(Depth::Drawcall)),
        );

        if opens_render_pass {
            self.open_implicit_render_pass(query);
        }

        if switches_pipeline {
            self.close_pipeline(query);
            let pipeline_query = if self.times(Depth::Pipeline) { query } else { None };
            if let Some(subpass) = self.current_subpass_mut() {
                subpass.pipelines.push(RecordedPipeline {
                    pipeline,
                    queries: QueryRange {
                        begin: pipeline_query,
                        end: None,
                    },
                    stats: DrawcallStats::default(),
                    drawcalls: Vec::new(),
                });
                self.cursor.pipeline_open = true;
            }
        }

        if self.records(Depth::Drawcall) {
            if let Some(pipeline) = self.current_pipeline_mut() {
                pipeline.drawcalls.push(RecordedDrawcall {
                    drawcall_type,
                    queries: QueryRange {
                        begin: query,
                        end: None,
                    },
                });
                self.cursor.drawcall_open = true;
            }
        }

        self.cursor.pending_command = Some(drawcall_type);
    }

    /// Called after a drawcall-class command was recorded. Ignored without a preceding [`Self::pre_command`].
    pub fn post_command(&mut self, drawcall_type: DrawcallType) {
        self.finish_command(drawcall_type, 1);
    }

    /// Called after a clear attachments command, which counts once per cleared attachment.
    pub fn post_clear_attachments(&mut self, attachment_count: u32) {
        self.finish_command(DrawcallType::ClearAttachments, attachment_count);
    }

    fn finish_command(&mut self, drawcall_type: DrawcallType, count: u32) {
        let Some(_) = self.cursor.pending_command.take() else {
            log::debug!("Ignoring unmatched post command {drawcall_type:?} on {:?}", self.handle);
            return;
        };

        if self.cursor.drawcall_open {
            let query = self.write_timestamp();
            if let Some(drawcall) = self.current_drawcall_mut() {
                drawcall.drawcall_type = drawcall_type;
                drawcall.queries.end = query;
            }
            self.cursor.drawcall_open = false;
        }

        self.deepest_stats_mut().add_drawcalls(drawcall_type, count);
    }

    pub fn pipeline_barrier(&mut self, barrier: &PipelineBarrierInfo<'_>) {
        if !self.is_recording("pipeline barrier") {
            return;
        }

        let stats = &mut self.data.stats;
        stats.pipeline_barrier_count += 1;
        stats.memory_barrier_count += barrier.memory_barrier_count;
        stats.buffer_memory_barrier_count += barrier.buffer_memory_barrier_count;
        stats.image_memory_barrier_count += barrier.image_memory_barriers.len() as u32;
        stats.undefined_layout_transition_count += barrier
            .image_memory_barriers
            .iter()
            .filter(|image_barrier| image_barrier.old_layout == ImageLayout::UNDEFINED)
            .count() as u32;
    }

    /// Nests finished secondary command buffers into the current subpass.
    pub fn execute_commands(&mut self, secondaries: Vec<RecordedCommandBuffer>) {
        if !self.is_recording("execute commands") {
            return;
        }

        if !self.records(Depth::RenderPass) {
            for secondary in &secondaries {
                self.data.stats += secondary.total_stats();
            }
            return;
        }

        let opens_render_pass = self.cursor.render_pass.is_none();
        let closes_pipeline = self.cursor.pipeline_open;
        let query = self.timestamp_if(
            (opens_render_pass && self.times(Depth::RenderPass))
                || (closes_pipeline && self.times(Depth::Pipeline)),
        );

        if opens_render_pass {
            self.open_implicit_render_pass(query);
        }
        self.close_pipeline(query);

        match self.current_subpass_mut() {
            Some(subpass) => subpass.secondary_command_buffers.extend(secondaries),
            None => {
                log::debug!(
                    "{:?} executed secondary command buffers outside of a subpass, counting them at command buffer level",
                    self.handle
                );
                for secondary in &secondaries {
                    self.data.stats += secondary.total_stats();
                }
            }
        }
    }

    /// Marks the recording as submitted.
    ///
    /// Fails if the command buffer was never recorded or is still being recorded.
    /// Resubmitting without re-recording is allowed.
    pub fn submit(&mut self) -> Result<(), SubmitError> {
        match self.state {
            RecorderState::Initial => Err(SubmitError::NotRecorded(self.handle)),
            RecorderState::Recording => Err(SubmitError::UnclosedRegions {
                command_buffer: self.handle,
                open_regions: self.num_open_regions(),
            }),
            RecorderState::Executable | RecorderState::Submitted => {
                self.state = RecorderState::Submitted;
                Ok(())
            }
        }
    }

    /// Snapshot of the current recording.
    pub fn get_data(&self) -> RecordedCommandBuffer {
        self.data.clone()
    }
}

// Internals
impl CommandBufferRecorder {
    /// Whether the current mode builds nodes at `depth`.
    fn records(&self, depth: Depth) -> bool {
        match depth {
            Depth::RenderPass => self.mode <= ProfilerMode::PerRenderPass,
            Depth::Pipeline => self.mode <= ProfilerMode::PerPipeline,
            Depth::Drawcall => self.mode == ProfilerMode::PerDrawcall,
        }
    }

    /// Whether the current mode writes timestamps for regions at `depth`.
    ///
    /// Pipelines recorded per drawcall get their time from their drawcalls.
    fn times(&self, depth: Depth) -> bool {
        match depth {
            Depth::Pipeline => self.mode == ProfilerMode::PerPipeline,
            _ => self.records(depth),
        }
    }

    fn is_recording(&self, what: &str) -> bool {
        if self.state != RecorderState::Recording {
            log::debug!("Ignoring {what} on {:?}, it is not recording", self.handle);
            return false;
        }
        true
    }

    fn write_timestamp(&mut self) -> Option<QueryAddress> {
        self.allocator.as_mut()?.write_timestamp(self.handle)
    }

    fn timestamp_if(&mut self, needed: bool) -> Option<QueryAddress> {
        if needed {
            self.write_timestamp()
        } else {
            None
        }
    }

    fn pipeline_for(&self, drawcall_type: DrawcallType) -> PipelineRecord {
        let bound = if drawcall_type.is_internal() {
            None
        } else if drawcall_type.is_dispatch() {
            self.cursor.compute_pipeline
        } else {
            self.cursor.graphics_pipeline
        };
        bound.unwrap_or(PipelineRecord::INTERNAL)
    }

    fn current_render_pass_mut(&mut self) -> Option<&mut RecordedRenderPass> {
        if self.cursor.render_pass.is_none() || !self.records(Depth::RenderPass) {
            return None;
        }
        self.data.render_passes.last_mut()
    }

    fn current_subpass_mut(&mut self) -> Option<&mut RecordedSubpass> {
        if !self.cursor.subpass_open {
            return None;
        }
        self.current_render_pass_mut()?.subpasses.last_mut()
    }

    fn current_pipeline_mut(&mut self) -> Option<&mut RecordedPipeline> {
        if !self.cursor.pipeline_open {
            return None;
        }
        self.current_subpass_mut()?.pipelines.last_mut()
    }

    fn current_drawcall_mut(&mut self) -> Option<&mut RecordedDrawcall> {
        if !self.cursor.drawcall_open {
            return None;
        }
        self.current_pipeline_mut()?.drawcalls.last_mut()
    }

    /// Counters of the deepest open region the current mode records.
    fn deepest_stats_mut(&mut self) -> &mut DrawcallStats {
        let cursor = self.cursor;
        let data = &mut self.data;
        if cursor.render_pass.is_some() && self.mode <= ProfilerMode::PerRenderPass {
            if let Some(render_pass) = data.render_passes.last_mut() {
                if cursor.subpass_open {
                    if let Some(subpass) = render_pass.subpasses.last_mut() {
                        if cursor.pipeline_open {
                            if let Some(pipeline) = subpass.pipelines.last_mut() {
                                return &mut pipeline.stats;
                            }
                        }
                        return &mut subpass.stats;
                    }
                }
                return &mut render_pass.stats;
            }
        }
        &mut data.stats
    }

    fn open_implicit_render_pass(&mut self, query: Option<QueryAddress>) {
        self.data.render_passes.push(RecordedRenderPass {
            handle: RenderPassHandle::NULL,
            queries: QueryRange {
                begin: query,
                end: None,
            },
            stats: DrawcallStats::default(),
            begin: QueryRange::default(),
            end: QueryRange::default(),
            subpasses: Vec::new(),
        });
        self.cursor.render_pass = Some(OpenRenderPass::Implicit);
        self.open_subpass(None, SubpassContents::Inline, query);
    }

    fn open_subpass(&mut self, index: Option<u32>, contents: SubpassContents, query: Option<QueryAddress>) {
        if let Some(render_pass) = self.current_render_pass_mut() {
            render_pass.subpasses.push(RecordedSubpass {
                index,
                contents,
                queries: QueryRange {
                    begin: query,
                    end: None,
                },
                stats: DrawcallStats::default(),
                pipelines: Vec::new(),
                secondary_command_buffers: Vec::new(),
            });
        }
        self.cursor.subpass_open = true;
    }

    fn close_drawcall(&mut self, query: Option<QueryAddress>) {
        if let Some(unfinished) = self.cursor.pending_command.take() {
            log::debug!("{unfinished:?} on {:?} had no post command hook", self.handle);
            self.deepest_stats_mut().add_drawcall(unfinished);
        }
        if let Some(drawcall) = self.current_drawcall_mut() {
            drawcall.queries.end = query;
        }
        self.cursor.drawcall_open = false;
    }

    fn close_pipeline(&mut self, query: Option<QueryAddress>) {
        self.close_drawcall(query);
        let timed = self.times(Depth::Pipeline);
        if let Some(pipeline) = self.current_pipeline_mut() {
            if timed {
                pipeline.queries.end = query;
            }
        }
        self.cursor.pipeline_open = false;
    }

    fn close_subpass(&mut self, query: Option<QueryAddress>) {
        self.close_pipeline(query);
        if let Some(subpass) = self.current_subpass_mut() {
            subpass.queries.end = query;
        }
        self.cursor.subpass_open = false;
    }

    /// Closes the open render pass, implicit or explicit, including the border it is in.
    fn close_render_pass(&mut self, query: Option<QueryAddress>) {
        self.close_subpass(query);

        let phase = self.cursor.render_pass;
        if let Some(render_pass) = self.current_render_pass_mut() {
            match phase {
                Some(OpenRenderPass::Explicit(RenderPassPhase::Begin)) => render_pass.begin.end = query,
                Some(OpenRenderPass::Explicit(RenderPassPhase::End)) => render_pass.end.end = query,
                _ => {}
            }
            render_pass.queries.end = query;
        }
        self.cursor.render_pass = None;
    }
}

//! Resolved, immutable profiling results.
//!
//! Everything in here is plain data: copies of the records that were current when the frame was aggregated.
//! Snapshots stay valid no matter what happens to the underlying host objects afterwards.

use std::{collections::HashMap, time::Duration};

use crate::{
    CommandBufferHandle, MetricValue, PipelineBindPoint, PipelineHandle, QueueHandle, RegistryAccessStats,
    RenderPassHandle, ShaderTuple, TimestampPeriod,
};

/// Type of a drawcall-class command.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DrawcallType {
    Draw,
    DrawIndexed,
    DrawIndirect,
    DrawIndexedIndirect,
    Dispatch,
    DispatchIndirect,
    CopyBuffer,
    CopyBufferToImage,
    CopyImage,
    CopyImageToBuffer,
    ClearColorImage,
    ClearDepthStencilImage,
    ClearAttachments,
    ResolveImage,
    BlitImage,
    FillBuffer,
    UpdateBuffer,
}

impl DrawcallType {
    /// Commands that don't need a bound pipeline and are attributed to the internal pseudo-pipeline.
    pub fn is_internal(self) -> bool {
        !matches!(
            self,
            Self::Draw
                | Self::DrawIndexed
                | Self::DrawIndirect
                | Self::DrawIndexedIndirect
                | Self::Dispatch
                | Self::DispatchIndirect
        )
    }

    pub fn is_dispatch(self) -> bool {
        matches!(self, Self::Dispatch | Self::DispatchIndirect)
    }
}

/// Per-category command counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DrawcallStats {
    pub draw_count: u32,
    pub draw_indirect_count: u32,
    pub dispatch_count: u32,
    pub dispatch_indirect_count: u32,
    pub copy_buffer_count: u32,
    pub copy_buffer_to_image_count: u32,
    pub copy_image_count: u32,
    pub copy_image_to_buffer_count: u32,
    pub clear_color_count: u32,
    pub clear_depth_stencil_count: u32,
    pub clear_attachments_count: u32,
    /// Attachment clears performed by render pass load operations.
    pub clear_implicit_count: u32,
    pub resolve_count: u32,
    pub blit_count: u32,
    pub fill_buffer_count: u32,
    pub update_buffer_count: u32,
    /// Pipeline barrier commands, each holding any number of the barriers below.
    pub pipeline_barrier_count: u32,
    pub memory_barrier_count: u32,
    pub buffer_memory_barrier_count: u32,
    pub image_memory_barrier_count: u32,
    /// Image barriers transitioning from the undefined layout.
    ///
    /// Not an error, but a hint that the application may not track image contents where it could.
    pub undefined_layout_transition_count: u32,
}

impl DrawcallStats {
    pub fn add_drawcall(&mut self, drawcall: DrawcallType) {
        self.add_drawcalls(drawcall, 1);
    }

    /// Adds `count` commands of one type, e.g. one per attachment of a clear attachments command.
    pub fn add_drawcalls(&mut self, drawcall: DrawcallType, count: u32) {
        let counter = match drawcall {
            DrawcallType::Draw | DrawcallType::DrawIndexed => &mut self.draw_count,
            DrawcallType::DrawIndirect | DrawcallType::DrawIndexedIndirect => &mut self.draw_indirect_count,
            DrawcallType::Dispatch => &mut self.dispatch_count,
            DrawcallType::DispatchIndirect => &mut self.dispatch_indirect_count,
            DrawcallType::CopyBuffer => &mut self.copy_buffer_count,
            DrawcallType::CopyBufferToImage => &mut self.copy_buffer_to_image_count,
            DrawcallType::CopyImage => &mut self.copy_image_count,
            DrawcallType::CopyImageToBuffer => &mut self.copy_image_to_buffer_count,
            DrawcallType::ClearColorImage => &mut self.clear_color_count,
            DrawcallType::ClearDepthStencilImage => &mut self.clear_depth_stencil_count,
            DrawcallType::ClearAttachments => &mut self.clear_attachments_count,
            DrawcallType::ResolveImage => &mut self.resolve_count,
            DrawcallType::BlitImage => &mut self.blit_count,
            DrawcallType::FillBuffer => &mut self.fill_buffer_count,
            DrawcallType::UpdateBuffer => &mut self.update_buffer_count,
        };
        *counter += count;
    }

    /// Number of explicitly recorded drawcall-class commands.
    ///
    /// Excludes implicit clears and barriers.
    pub fn drawcall_count(&self) -> u32 {
        self.draw_count
            + self.draw_indirect_count
            + self.dispatch_count
            + self.dispatch_indirect_count
            + self.copy_buffer_count
            + self.copy_buffer_to_image_count
            + self.copy_image_count
            + self.copy_image_to_buffer_count
            + self.clear_color_count
            + self.clear_depth_stencil_count
            + self.clear_attachments_count
            + self.resolve_count
            + self.blit_count
            + self.fill_buffer_count
            + self.update_buffer_count
    }
}

impl std::ops::AddAssign for DrawcallStats {
    fn add_assign(&mut self, rhs: Self) {
        self.draw_count += rhs.draw_count;
        self.draw_indirect_count += rhs.draw_indirect_count;
        self.dispatch_count += rhs.dispatch_count;
        self.dispatch_indirect_count += rhs.dispatch_indirect_count;
        self.copy_buffer_count += rhs.copy_buffer_count;
        self.copy_buffer_to_image_count += rhs.copy_buffer_to_image_count;
        self.copy_image_count += rhs.copy_image_count;
        self.copy_image_to_buffer_count += rhs.copy_image_to_buffer_count;
        self.clear_color_count += rhs.clear_color_count;
        self.clear_depth_stencil_count += rhs.clear_depth_stencil_count;
        self.clear_attachments_count += rhs.clear_attachments_count;
        self.clear_implicit_count += rhs.clear_implicit_count;
        self.resolve_count += rhs.resolve_count;
        self.blit_count += rhs.blit_count;
        self.fill_buffer_count += rhs.fill_buffer_count;
        self.update_buffer_count += rhs.update_buffer_count;
        self.pipeline_barrier_count += rhs.pipeline_barrier_count;
        self.memory_barrier_count += rhs.memory_barrier_count;
        self.buffer_memory_barrier_count += rhs.buffer_memory_barrier_count;
        self.image_memory_barrier_count += rhs.image_memory_barrier_count;
        self.undefined_layout_transition_count += rhs.undefined_layout_transition_count;
    }
}

impl std::iter::Sum for DrawcallStats {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), |mut total, stats| {
            total += stats;
            total
        })
    }
}

/// Begin and end timestamp of a region in raw GPU ticks.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TimestampRange {
    pub begin: u64,
    pub end: u64,
}

impl TimestampRange {
    pub fn ticks(&self) -> u64 {
        self.end.saturating_sub(self.begin)
    }
}

/// Any node of the region hierarchy.
pub trait Region {
    /// GPU time of the region in raw ticks.
    fn ticks(&self) -> u64;
}

/// Order in which a reporting layer wants to walk regions of one level.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SortOrder {
    /// Order of recording and submission, as stored.
    #[default]
    Submission,
    /// Longest regions first, ties in submission order.
    DescendingDuration,
}

/// View of `regions` in the requested order. The stored order is never changed.
pub fn sorted_regions<R: Region>(regions: &[R], order: SortOrder) -> Vec<&R> {
    let mut sorted: Vec<&R> = regions.iter().collect();
    if order == SortOrder::DescendingDuration {
        sorted.sort_by(|a, b| b.ticks().cmp(&a.ticks()));
    }
    sorted
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DrawcallData {
    pub drawcall_type: DrawcallType,
    pub ticks: u64,
    pub timestamps: Option<TimestampRange>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PipelineData {
    pub handle: PipelineHandle,
    pub bind_point: PipelineBindPoint,
    pub shader_tuple: ShaderTuple,
    pub ticks: u64,
    pub stats: DrawcallStats,
    /// Only present when timed per pipeline.
    pub timestamps: Option<TimestampRange>,
    pub drawcalls: Vec<DrawcallData>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum SubpassContents {
    #[default]
    Inline,
    SecondaryCommandBuffers,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SubpassData {
    /// `None` for the implicit subpass around commands outside of a render pass.
    pub index: Option<u32>,
    pub contents: SubpassContents,
    pub ticks: u64,
    pub stats: DrawcallStats,
    pub timestamps: Option<TimestampRange>,
    pub pipelines: Vec<PipelineData>,
    pub secondary_command_buffers: Vec<CommandBufferData>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RenderPassData {
    /// Null for the implicit render pass around commands outside of a render pass.
    pub handle: RenderPassHandle,
    pub ticks: u64,
    pub stats: DrawcallStats,
    pub timestamps: Option<TimestampRange>,
    /// Fixed cost of beginning the render pass (load operations), not attributable to any subpass.
    pub begin: Option<TimestampRange>,
    /// Fixed cost of ending the render pass (store and resolve operations).
    pub end: Option<TimestampRange>,
    pub subpasses: Vec<SubpassData>,
}

impl RenderPassData {
    pub fn is_implicit(&self) -> bool {
        self.handle.is_null()
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum CommandBufferLevel {
    #[default]
    Primary,
    Secondary,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CommandBufferData {
    pub handle: CommandBufferHandle,
    pub level: CommandBufferLevel,
    pub ticks: u64,
    pub stats: DrawcallStats,
    pub timestamps: Option<TimestampRange>,
    pub render_passes: Vec<RenderPassData>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SubmitData {
    pub ticks: u64,
    pub stats: DrawcallStats,
    pub command_buffers: Vec<CommandBufferData>,
}

/// All submit infos of one submission call.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SubmitBatchData {
    pub queue: QueueHandle,
    /// Position of the submission call among all submissions of the device.
    pub submit_index: u64,
    pub ticks: u64,
    pub stats: DrawcallStats,
    pub submits: Vec<SubmitData>,
}

macro_rules! impl_region {
    ($($name:ident,)*) => {
        $(
            impl Region for $name {
                #[inline]
                fn ticks(&self) -> u64 {
                    self.ticks
                }
            }
        )*
    };
}

impl_region!(
    DrawcallData,
    PipelineData,
    SubpassData,
    RenderPassData,
    CommandBufferData,
    SubmitData,
    SubmitBatchData,
);

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MemoryHeapData {
    pub allocation_count: u32,
    pub allocation_size: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MemoryTypeData {
    pub allocation_count: u32,
    pub allocation_size: u64,
}

/// Device memory allocated by the application at the end of the frame.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MemoryData {
    pub total_allocation_count: u32,
    pub total_allocation_size: u64,
    pub device_local_allocation_count: u32,
    pub device_local_allocation_size: u64,
    pub host_visible_allocation_count: u32,
    pub host_visible_allocation_size: u64,
    pub heaps: Vec<MemoryHeapData>,
    pub types: Vec<MemoryTypeData>,
}

/// CPU-side frame counters.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct CpuData {
    /// Wall-clock time since the previous frame boundary.
    pub frame_time: Duration,
    /// Frames per second, averaged over the configured update interval.
    pub frames_per_sec: f32,
}

/// Everything profiled during one frame.
#[derive(Clone, Debug, Default)]
pub struct FrameData {
    pub frame_index: u64,
    /// Sum of the GPU time of all primary command buffers.
    pub ticks: u64,
    pub stats: DrawcallStats,
    pub submits: Vec<SubmitBatchData>,
    /// Up to ten pipelines with the highest GPU time, longest first.
    pub top_pipelines: Vec<PipelineData>,
    pub memory: MemoryData,
    pub cpu: CpuData,
    pub metrics: Vec<MetricValue>,
    pub registry_access_stats: RegistryAccessStats,
    /// Debug names of the objects referenced by this frame, as they were at the frame boundary.
    pub object_names: HashMap<u64, String>,
    /// Timestamp period the frame was measured with.
    pub timestamp_period: TimestampPeriod,
}

impl FrameData {
    /// GPU time of the frame, using the timestamp period it was measured with.
    pub fn gpu_time(&self) -> Duration {
        self.timestamp_period.ticks_to_duration(self.ticks)
    }

    /// Debug name of `handle` captured with the frame, or its hexadecimal value.
    pub fn name_for_handle(&self, handle: u64) -> String {
        self.object_names
            .get(&handle)
            .cloned()
            .unwrap_or_else(|| format!("0x{handle:016x}"))
    }

    /// Raw values of every non-null handle in the region tree, in tree order.
    pub fn referenced_handles(&self) -> Vec<u64> {
        fn visit_command_buffer(command_buffer: &CommandBufferData, handles: &mut Vec<u64>) {
            handles.push(command_buffer.handle.as_raw());
            for render_pass in &command_buffer.render_passes {
                if !render_pass.is_implicit() {
                    handles.push(render_pass.handle.as_raw());
                }
                for subpass in &render_pass.subpasses {
                    handles.extend(
                        subpass
                            .pipelines
                            .iter()
                            .filter(|pipeline| !pipeline.handle.is_null())
                            .map(|pipeline| pipeline.handle.as_raw()),
                    );
                    for secondary in &subpass.secondary_command_buffers {
                        visit_command_buffer(secondary, handles);
                    }
                }
            }
        }

        let mut handles = Vec::new();
        for batch in &self.submits {
            for submit in &batch.submits {
                for command_buffer in &submit.command_buffers {
                    visit_command_buffer(command_buffer, &mut handles);
                }
            }
        }
        handles
    }
}

use std::time::Duration;

use crate::{CommandBufferHandle, DeviceError, FenceHandle, QueryPoolHandle, QueueHandle};

/// Driver entry points the profiler needs from the device it instruments.
///
/// Implemented by the layer on top of the next layer's dispatch table.
/// All methods are called synchronously from whichever thread triggered the corresponding hook,
/// so implementations need to be thread safe in the same way the host API is.
pub trait ProfilerDevice: Send + Sync {
    /// Nanoseconds per timestamp tick.
    fn timestamp_period(&self) -> TimestampPeriod;

    /// Memory heaps and types of the physical device, used for the allocation ledger.
    fn memory_properties(&self) -> MemoryProperties;

    fn create_query_pool(&self, query_count: u32) -> Result<QueryPoolHandle, DeviceError>;

    fn destroy_query_pool(&self, pool: QueryPoolHandle);

    /// Resets a range of queries from the host.
    fn reset_query_pool(&self, pool: QueryPoolHandle, first_query: u32, query_count: u32);

    /// Records a timestamp write into `command_buffer`.
    fn cmd_write_timestamp(&self, command_buffer: CommandBufferHandle, pool: QueryPoolHandle, query: u32);

    /// Reads back `results.len()` timestamps starting at `first_query`.
    ///
    /// Must only be called once all command buffers writing these queries have completed execution.
    fn get_query_results(&self, pool: QueryPoolHandle, first_query: u32, results: &mut [u64]) -> Result<(), DeviceError>;

    fn create_fence(&self) -> Result<FenceHandle, DeviceError>;

    fn destroy_fence(&self, fence: FenceHandle);

    /// Submits an empty batch to `queue` that signals `fence` once all previous work on the queue completed.
    fn queue_signal_fence(&self, queue: QueueHandle, fence: FenceHandle) -> Result<(), DeviceError>;

    /// Blocks until `fence` is signaled and resets it.
    ///
    /// There is no timeout on the profiler side: a hung GPU blocks for as long as the driver's wait does.
    fn wait_for_fence(&self, fence: FenceHandle) -> Result<(), DeviceError>;

    /// Blocks until all work on the device completed.
    fn device_wait_idle(&self) -> Result<(), DeviceError>;
}

/// Conversion factor from raw GPU timestamp ticks to nanoseconds.
///
/// Snapshots always store raw ticks; conversion happens where the data is consumed.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct TimestampPeriod(pub f32);

impl TimestampPeriod {
    #[inline]
    pub fn nanoseconds_per_tick(self) -> f32 {
        self.0
    }

    #[inline]
    pub fn ticks_to_nanoseconds(self, ticks: u64) -> f64 {
        ticks as f64 * self.0 as f64
    }

    #[inline]
    pub fn ticks_to_milliseconds(self, ticks: u64) -> f64 {
        self.ticks_to_nanoseconds(ticks) / 1000.0 / 1000.0
    }

    pub fn ticks_to_duration(self, ticks: u64) -> Duration {
        Duration::from_nanos(self.ticks_to_nanoseconds(ticks).round() as u64)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MemoryProperties {
    pub memory_types: Vec<MemoryType>,
    pub memory_heaps: Vec<MemoryHeap>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MemoryType {
    pub heap_index: u32,
    pub device_local: bool,
    pub host_visible: bool,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MemoryHeap {
    pub size: u64,
    pub device_local: bool,
}

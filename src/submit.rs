//! Collection of recorded command buffers at submission time.

use crate::{command_buffer::RecordedCommandBuffer, CommandBufferHandle, QueueHandle, Registry};

/// One submit info of a queue submission.
#[derive(Clone, Copy, Debug, Default)]
pub struct SubmitInfo<'a> {
    pub command_buffers: &'a [CommandBufferHandle],
}

/// Command buffers of one submit info, in submission order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Submit {
    pub command_buffers: Vec<RecordedCommandBuffer>,
}

/// Everything submitted by one queue submission call.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SubmitBatch {
    pub queue: QueueHandle,
    pub submit_index: u64,
    pub submits: Vec<Submit>,
}

impl SubmitBatch {
    pub fn num_command_buffers(&self) -> usize {
        self.submits.iter().map(|submit| submit.command_buffers.len()).sum()
    }
}

/// Marks every command buffer of `submits` as submitted and snapshots its recording.
///
/// Command buffers the registry doesn't know about are an error of the interception shims:
/// this asserts in debug builds and skips them in release builds.
/// Command buffers that can't be submitted (never recorded, still recording) are skipped with a warning.
pub fn collect_submit_batch(
    registry: &Registry,
    queue: QueueHandle,
    submit_index: u64,
    submits: &[SubmitInfo<'_>],
) -> SubmitBatch {
    profiling::scope!("collect_submit_batch");

    let submits = submits
        .iter()
        .map(|info| Submit {
            command_buffers: info
                .command_buffers
                .iter()
                .filter_map(|&handle| collect_command_buffer(registry, handle))
                .collect(),
        })
        .collect();

    SubmitBatch {
        queue,
        submit_index,
        submits,
    }
}

fn collect_command_buffer(registry: &Registry, handle: CommandBufferHandle) -> Option<RecordedCommandBuffer> {
    let recorder = match registry.command_buffers.at(handle) {
        Ok(recorder) => recorder,
        Err(err) => {
            debug_assert!(false, "Submitted command buffer is not registered: {err}");
            log::error!("Skipping submitted command buffer {handle:?}: {err}");
            return None;
        }
    };

    let mut recorder = recorder.lock();
    if let Err(err) = recorder.submit() {
        log::warn!("Skipping submitted command buffer: {err}");
        return None;
    }
    Some(recorder.get_data())
}

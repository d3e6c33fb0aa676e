//! Scope types that bracket the recording of a command with the profiler's hooks.
//! The closing hook is called on drop, so a scope can't be left open on early returns.

use crate::{CommandBufferHandle, DeviceProfiler, DrawcallType, RenderPassHandle, SubpassContents};

/// Brackets a single drawcall-class command.
///
/// Calls [`DeviceProfiler::post_command()`] on drop.
pub struct CommandScope<'a> {
    pub profiler: &'a DeviceProfiler,
    pub command_buffer: CommandBufferHandle,
    pub drawcall_type: DrawcallType,
}

impl<'a> CommandScope<'a> {
    #[must_use]
    #[inline]
    pub fn start(profiler: &'a DeviceProfiler, command_buffer: CommandBufferHandle, drawcall_type: DrawcallType) -> Self {
        profiler.pre_command(command_buffer, drawcall_type);
        Self {
            profiler,
            command_buffer,
            drawcall_type,
        }
    }
}

impl Drop for CommandScope<'_> {
    #[inline]
    fn drop(&mut self) {
        self.profiler.post_command(self.command_buffer, self.drawcall_type);
    }
}

/// Brackets a render pass, from its begin up to its end.
///
/// The begin hooks run on creation, the end hooks on drop.
pub struct RenderPassScope<'a> {
    pub profiler: &'a DeviceProfiler,
    pub command_buffer: CommandBufferHandle,
}

impl<'a> RenderPassScope<'a> {
    #[must_use]
    #[inline]
    pub fn start(
        profiler: &'a DeviceProfiler,
        command_buffer: CommandBufferHandle,
        render_pass: RenderPassHandle,
        contents: SubpassContents,
    ) -> Self {
        profiler.begin_render_pass(command_buffer, render_pass, contents);
        profiler.post_begin_render_pass(command_buffer);
        Self {
            profiler,
            command_buffer,
        }
    }

    /// Moves on to the next subpass of the render pass.
    #[inline]
    pub fn next_subpass(&self, contents: SubpassContents) {
        self.profiler.next_subpass(self.command_buffer, contents);
    }

    /// Starts a command scope within this render pass.
    #[must_use]
    #[inline]
    pub fn command(&self, drawcall_type: DrawcallType) -> CommandScope<'a> {
        CommandScope::start(self.profiler, self.command_buffer, drawcall_type)
    }
}

impl Drop for RenderPassScope<'_> {
    #[inline]
    fn drop(&mut self) {
        self.profiler.pre_end_render_pass(self.command_buffer);
        self.profiler.end_render_pass(self.command_buffer);
    }
}

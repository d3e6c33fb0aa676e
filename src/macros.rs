/// Brackets the recording of a drawcall-class command with [`DeviceProfiler::pre_command`](crate::DeviceProfiler::pre_command)
/// and [`DeviceProfiler::post_command`](crate::DeviceProfiler::post_command), evaluating to the result of `$code`.
///
/// ```ignore
/// profiled_command!(&profiler, command_buffer, DrawcallType::Draw, {
///     next_layer.cmd_draw(command_buffer, vertex_count, instance_count, first_vertex, first_instance)
/// });
/// ```
#[macro_export]
macro_rules! profiled_command {
    ($profiler:expr, $command_buffer:expr, $drawcall_type:expr, $code:expr) => {{
        $profiler.pre_command($command_buffer, $drawcall_type);
        let ret = $code;
        $profiler.post_command($command_buffer, $drawcall_type);
        ret
    }};
}

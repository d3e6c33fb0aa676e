/// Errors that can occur during [`DeviceProfiler::new`](crate::DeviceProfiler::new).
///
/// Whenever one of these is returned, every object the profiler created on the device has already been destroyed again.
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum CreationError {
    #[error(transparent)]
    InvalidSettings(#[from] SettingsError),

    #[error("Failed to create profiler resources on the device: {0}")]
    Device(#[from] DeviceError),
}

/// Errors that can occur when validating [`ProfilerSettings`](crate::ProfilerSettings).
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum SettingsError {
    #[error("ProfilerSettings::query_pool_size must be at least 2, got {0}.")]
    InvalidQueryPoolSize(u32),

    #[error("Unknown profiler mode {0}.")]
    UnknownMode(u32),

    #[error("Unknown profiler synchronization mode {0}.")]
    UnknownSyncMode(u32),

    #[error("Invalid value {value:?} for configuration key {key}.")]
    InvalidValue { key: String, value: String },
}

/// Errors that can occur while reading a configuration file.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read the configuration file: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Settings(#[from] SettingsError),
}

/// Failures reported by a [`ProfilerDevice`](crate::ProfilerDevice).
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceError {
    #[error("out of host memory")]
    OutOfHostMemory,

    #[error("out of device memory")]
    OutOfDeviceMemory,

    #[error("query results are not available yet")]
    NotReady,

    #[error("the device has been lost")]
    DeviceLost,

    #[error("driver call failed with result code {0}")]
    Other(i32),
}

/// Errors that can occur during [`CommandBufferRecorder::submit`](crate::CommandBufferRecorder::submit).
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum SubmitError {
    #[error("Command buffer {0:?} was never recorded.")]
    NotRecorded(crate::CommandBufferHandle),

    #[error("All regions need to be closed before submitting a command buffer. {open_regions} regions of {command_buffer:?} were still open.")]
    UnclosedRegions {
        command_buffer: crate::CommandBufferHandle,
        open_regions: usize,
    },
}

/// Errors that can occur during registry lookups.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryError {
    #[error("No resource registered for handle 0x{0:x}.")]
    NotFound(u64),
}

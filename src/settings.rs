use std::{path::Path, time::Duration};

use crate::{ConfigError, SettingsError};

/// Name of the configuration file looked up next to the application.
pub const CONFIG_FILE_NAME: &str = "VkLayer_profiler_layer.conf";

/// Granularity at which GPU timestamps are collected.
///
/// Ordered from the finest to the coarsest level.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ProfilerMode {
    /// Every drawcall-class command gets its own timestamps.
    #[default]
    PerDrawcall,
    /// Consecutive commands using the same pipeline are timed together.
    PerPipeline,
    /// Render passes and subpasses are timed, commands are only counted.
    PerRenderPass,
    /// Only whole command buffers are timed.
    PerFrame,
}

impl TryFrom<u32> for ProfilerMode {
    type Error = SettingsError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::PerDrawcall),
            1 => Ok(Self::PerPipeline),
            2 => Ok(Self::PerRenderPass),
            3 => Ok(Self::PerFrame),
            _ => Err(SettingsError::UnknownMode(value)),
        }
    }
}

/// Point at which the profiler waits for the GPU before reading timestamp queries.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum SyncMode {
    /// Wait for the device to become idle once per frame, at present.
    #[default]
    Present,
    /// Wait for the queue after every submission.
    Submit,
}

impl TryFrom<u32> for SyncMode {
    type Error = SettingsError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Present),
            1 => Ok(Self::Submit),
            _ => Err(SettingsError::UnknownSyncMode(value)),
        }
    }
}

/// Settings passed on initialization of [`DeviceProfiler`](crate::DeviceProfiler).
///
/// Changes made at runtime take effect at the next frame boundary.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProfilerSettings {
    pub mode: ProfilerMode,

    pub sync_mode: SyncMode,

    /// Number of timestamp queries in each query pool handed to a command buffer.
    ///
    /// Command buffers needing more queries get additional pools.
    pub query_pool_size: u32,

    /// Interval over which the frames-per-second counter is averaged.
    pub output_update_interval: Duration,
}

impl Default for ProfilerSettings {
    fn default() -> Self {
        Self {
            mode: ProfilerMode::default(),
            sync_mode: SyncMode::default(),
            query_pool_size: 4096,
            output_update_interval: Duration::from_millis(500),
        }
    }
}

impl ProfilerSettings {
    pub fn validate(&self) -> Result<(), SettingsError> {
        // Every region needs a begin and an end query.
        if self.query_pool_size < 2 {
            Err(SettingsError::InvalidQueryPoolSize(self.query_pool_size))
        } else {
            Ok(())
        }
    }

    /// Parses whitespace separated `KEY VALUE` pairs, starting from the default settings.
    ///
    /// Unknown keys are skipped with a warning.
    pub fn from_config_str(config: &str) -> Result<Self, SettingsError> {
        let mut settings = Self::default();
        let mut tokens = config.split_whitespace();

        while let Some(key) = tokens.next() {
            let Some(value) = tokens.next() else {
                return Err(SettingsError::InvalidValue {
                    key: key.to_owned(),
                    value: String::new(),
                });
            };
            let number = || {
                value.parse::<u32>().map_err(|_| SettingsError::InvalidValue {
                    key: key.to_owned(),
                    value: value.to_owned(),
                })
            };

            match key {
                "MODE" => settings.mode = ProfilerMode::try_from(number()?)?,
                "SYNC_MODE" => settings.sync_mode = SyncMode::try_from(number()?)?,
                "NUM_QUERIES_PER_CMD_BUFFER" => settings.query_pool_size = number()?,
                "OUTPUT_UPDATE_INTERVAL" => {
                    settings.output_update_interval = Duration::from_millis(number()? as u64);
                }
                _ => log::warn!("Ignoring unknown profiler configuration key {key}"),
            }
        }

        settings.validate()?;
        Ok(settings)
    }

    /// Reads settings from [`CONFIG_FILE_NAME`] in `directory`.
    ///
    /// Returns the default settings if there is no such file.
    pub fn load_from_directory(directory: &Path) -> Result<Self, ConfigError> {
        let path = directory.join(CONFIG_FILE_NAME);
        if !path.exists() {
            log::debug!("No profiler configuration at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let config = std::fs::read_to_string(&path)?;
        Ok(Self::from_config_str(&config)?)
    }
}

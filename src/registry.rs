//! Per-device maps from host handles to the profiler's metadata records.

use std::{
    collections::HashMap,
    hash::Hash,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use dashmap::DashMap;
use parking_lot::Mutex;

use crate::{
    CommandBufferHandle, CommandBufferRecorder, PipelineHandle, RegistryError, RenderPassHandle, ShaderModuleHandle,
    ShaderTuple,
};

/// Sharded concurrent map keyed by a host handle.
///
/// Lookups vastly outnumber inserts and removals, so readers of different shards never wait on each other.
/// Every access is timed; the average is reported once per frame.
pub struct ResourceMap<K, V> {
    map: DashMap<K, V>,
    access_stats: AccessStats,
}

impl<K: Eq + Hash + Copy + Into<u64>, V: Clone> ResourceMap<K, V> {
    pub fn new() -> Self {
        Self {
            map: DashMap::new(),
            access_stats: AccessStats::default(),
        }
    }

    /// Inserts `value`, returning the record previously registered under the same handle.
    pub fn insert(&self, key: K, value: V) -> Option<V> {
        let _timer = self.access_stats.time();
        self.map.insert(key, value)
    }

    pub fn remove(&self, key: K) -> Option<V> {
        let _timer = self.access_stats.time();
        self.map.remove(&key).map(|(_, value)| value)
    }

    /// Returns a copy of the record registered under `key`.
    pub fn at(&self, key: K) -> Result<V, RegistryError> {
        let _timer = self.access_stats.time();
        self.map
            .get(&key)
            .map(|entry| entry.value().clone())
            .ok_or(RegistryError::NotFound(key.into()))
    }

    /// Atomically looks up `key`, registering the result of `create` if it is missing.
    pub fn get_or_insert_with(&self, key: K, create: impl FnOnce() -> V) -> V {
        let _timer = self.access_stats.time();
        self.map.entry(key).or_insert_with(create).value().clone()
    }

    pub fn contains(&self, key: K) -> bool {
        self.map.contains_key(&key)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn keys(&self) -> Vec<K> {
        self.map.iter().map(|entry| *entry.key()).collect()
    }

    pub fn clear(&self) {
        self.map.clear();
    }

    pub fn average_access_time(&self) -> Duration {
        self.access_stats.average()
    }

    pub fn reset_access_stats(&self) {
        self.access_stats.reset();
    }
}

impl<K: Eq + Hash + Copy + Into<u64>, V: Clone> Default for ResourceMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Default)]
struct AccessStats {
    total_nanoseconds: AtomicU64,
    access_count: AtomicU64,
}

impl AccessStats {
    fn time(&self) -> AccessTimer<'_> {
        AccessTimer {
            stats: self,
            start: Instant::now(),
        }
    }

    fn average(&self) -> Duration {
        let count = self.access_count.load(Ordering::Relaxed);
        if count == 0 {
            return Duration::ZERO;
        }
        Duration::from_nanos(self.total_nanoseconds.load(Ordering::Relaxed) / count)
    }

    fn reset(&self) {
        self.total_nanoseconds.store(0, Ordering::Relaxed);
        self.access_count.store(0, Ordering::Relaxed);
    }
}

struct AccessTimer<'a> {
    stats: &'a AccessStats,
    start: Instant,
}

impl Drop for AccessTimer<'_> {
    fn drop(&mut self) {
        let elapsed = self.start.elapsed().as_nanos().min(u64::MAX as u128) as u64;
        self.stats.total_nanoseconds.fetch_add(elapsed, Ordering::Relaxed);
        self.stats.access_count.fetch_add(1, Ordering::Relaxed);
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ShaderModuleRecord {
    /// Hash of the module's bytecode.
    pub hash: u32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum PipelineBindPoint {
    #[default]
    Graphics,
    Compute,
}

/// Pipeline metadata, captured by value everywhere it is recorded.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct PipelineRecord {
    pub handle: PipelineHandle,
    pub bind_point: PipelineBindPoint,
    pub shader_tuple: ShaderTuple,
}

impl PipelineRecord {
    /// Pseudo-pipeline that transfer and clear commands recorded outside of any pipeline are attributed to.
    pub const INTERNAL: Self = Self {
        handle: PipelineHandle::NULL,
        bind_point: PipelineBindPoint::Graphics,
        shader_tuple: ShaderTuple::EMPTY,
    };
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct RenderPassRecord {
    pub handle: RenderPassHandle,
    pub subpass_count: u32,
    /// Color attachments cleared when the render pass begins.
    pub clear_color_attachment_count: u32,
    /// Depth/stencil attachments cleared when the render pass begins.
    pub clear_depth_stencil_attachment_count: u32,
}

/// Diagnostic average lookup latency of each registry map over the last frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RegistryAccessStats {
    pub shader_modules: Duration,
    pub pipelines: Duration,
    pub render_passes: Duration,
    pub command_buffers: Duration,
}

/// All resource maps of one profiled device.
#[derive(Default)]
pub struct Registry {
    pub shader_modules: ResourceMap<ShaderModuleHandle, ShaderModuleRecord>,
    pub pipelines: ResourceMap<PipelineHandle, PipelineRecord>,
    pub render_passes: ResourceMap<RenderPassHandle, RenderPassRecord>,
    pub command_buffers: ResourceMap<CommandBufferHandle, Arc<Mutex<CommandBufferRecorder>>>,
    /// Debug names keyed by raw handle value of any object type.
    pub object_names: ResourceMap<u64, String>,
    /// Names of objects destroyed since the last frame was published.
    retired_names: Mutex<HashMap<u64, String>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn access_stats(&self) -> RegistryAccessStats {
        RegistryAccessStats {
            shader_modules: self.shader_modules.average_access_time(),
            pipelines: self.pipelines.average_access_time(),
            render_passes: self.render_passes.average_access_time(),
            command_buffers: self.command_buffers.average_access_time(),
        }
    }

    pub fn reset_access_stats(&self) {
        self.shader_modules.reset_access_stats();
        self.pipelines.reset_access_stats();
        self.render_passes.reset_access_stats();
        self.command_buffers.reset_access_stats();
        self.object_names.reset_access_stats();
    }

    /// Debug name of `handle`, or its hexadecimal value if no name was set.
    pub fn name_for_handle(&self, handle: u64) -> String {
        self.object_names
            .at(handle)
            .unwrap_or_else(|_| format!("0x{handle:016x}"))
    }

    /// Removes the debug name of a destroyed object.
    ///
    /// Work recorded with the object before it was destroyed is still published under this name with the next frame.
    pub fn retire_name(&self, handle: u64) {
        let mut retired = self.retired_names.lock();
        if let Some(name) = self.object_names.remove(handle) {
            retired.insert(handle, name);
        }
    }

    /// Debug names of `handles` for the frame being published, then releases the names of destroyed objects.
    ///
    /// Live names take precedence over names of destroyed objects whose handle was reused.
    pub fn capture_names(&self, handles: impl IntoIterator<Item = u64>) -> HashMap<u64, String> {
        let mut retired = self.retired_names.lock();
        let names = handles
            .into_iter()
            .filter_map(|handle| {
                let name = self
                    .object_names
                    .at(handle)
                    .ok()
                    .or_else(|| retired.get(&handle).cloned())?;
                Some((handle, name))
            })
            .collect();
        retired.clear();
        names
    }

    /// Drops every record, e.g. when the device is destroyed.
    pub fn clear(&self) {
        self.command_buffers.clear();
        self.pipelines.clear();
        self.render_passes.clear();
        self.shader_modules.clear();
        self.object_names.clear();
        self.retired_names.lock().clear();
    }
}

//! Timestamp query pools.
//!
//! Every command buffer recording allocates its timestamps from a [`QueryAllocator`].
//! The allocator takes pools from a device-wide [`QueryPoolCache`], preferring previously used pools over creating new ones.
//! Once recording finishes, the pools are frozen into [`TimestampQueries`], which is shared by every snapshot of that recording
//! (a command buffer may be submitted several times without being re-recorded).
//! When the last snapshot is dropped, the pools are reset and go back to the cache.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::{CommandBufferHandle, DeviceError, ProfilerDevice, QueryPoolHandle};

/// Location of a single timestamp query.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct QueryAddress {
    pub pool_idx: u32,
    pub query_idx: u32,
}

/// A pool of timestamp queries on the device.
#[derive(Debug)]
struct QueryPool {
    handle: QueryPoolHandle,
    capacity: u32,
    num_used_queries: u32,
}

/// Device-wide cache of unused query pools.
pub struct QueryPoolCache {
    device: Arc<dyn ProfilerDevice>,
    pool_capacity: u32,
    unused_pools: Mutex<Vec<QueryPool>>,
}

impl QueryPoolCache {
    pub fn new(device: Arc<dyn ProfilerDevice>, pool_capacity: u32) -> Self {
        Self {
            device,
            pool_capacity,
            unused_pools: Mutex::new(Vec::new()),
        }
    }

    pub fn device(&self) -> &dyn ProfilerDevice {
        self.device.as_ref()
    }

    pub fn num_unused_pools(&self) -> usize {
        self.unused_pools.lock().len()
    }

    /// Creates `count` pools up front so the first recordings don't have to.
    pub fn preallocate(&self, count: usize) -> Result<(), DeviceError> {
        for _ in 0..count {
            let pool = self.create_pool()?;
            self.unused_pools.lock().push(pool);
        }
        Ok(())
    }

    fn create_pool(&self) -> Result<QueryPool, DeviceError> {
        let handle = self.device.create_query_pool(self.pool_capacity)?;
        self.device.reset_query_pool(handle, 0, self.pool_capacity);
        Ok(QueryPool {
            handle,
            capacity: self.pool_capacity,
            num_used_queries: 0,
        })
    }

    fn acquire(&self) -> Result<QueryPool, DeviceError> {
        if let Some(pool) = self.unused_pools.lock().pop() {
            return Ok(pool);
        }
        self.create_pool()
    }

    fn release(&self, pools: Vec<QueryPool>) {
        let mut unused_pools = self.unused_pools.lock();
        for mut pool in pools {
            if pool.num_used_queries > 0 {
                self.device.reset_query_pool(pool.handle, 0, pool.num_used_queries);
                pool.num_used_queries = 0;
            }
            unused_pools.push(pool);
        }
    }
}

impl Drop for QueryPoolCache {
    fn drop(&mut self) {
        for pool in self.unused_pools.get_mut().drain(..) {
            self.device.destroy_query_pool(pool.handle);
        }
    }
}

/// Hands out timestamp queries while a command buffer is recorded.
pub struct QueryAllocator {
    cache: Arc<QueryPoolCache>,
    pools: Vec<QueryPool>,
}

impl QueryAllocator {
    pub fn new(cache: Arc<QueryPoolCache>) -> Self {
        Self {
            cache,
            pools: Vec::new(),
        }
    }

    /// Records a timestamp write into `command_buffer` and returns where it will land.
    ///
    /// Returns `None` if no pool could be created; the region then simply has no timestamp.
    pub fn write_timestamp(&mut self, command_buffer: CommandBufferHandle) -> Option<QueryAddress> {
        let address = self.allocate_query()?;
        let pool = &self.pools[address.pool_idx as usize];
        self.cache
            .device()
            .cmd_write_timestamp(command_buffer, pool.handle, address.query_idx);
        Some(address)
    }

    fn allocate_query(&mut self) -> Option<QueryAddress> {
        let num_pools = self.pools.len();

        if let Some(active_pool) = self.pools.last_mut() {
            if active_pool.capacity > active_pool.num_used_queries {
                let address = QueryAddress {
                    pool_idx: num_pools as u32 - 1,
                    query_idx: active_pool.num_used_queries,
                };
                active_pool.num_used_queries += 1;
                return Some(address);
            }
        }

        let mut new_pool = match self.cache.acquire() {
            Ok(pool) => pool,
            Err(err) => {
                log::warn!("Failed to create a timestamp query pool, timestamps will be missing: {err}");
                return None;
            }
        };
        new_pool.num_used_queries += 1;
        self.pools.push(new_pool);

        Some(QueryAddress {
            pool_idx: self.pools.len() as u32 - 1,
            query_idx: 0,
        })
    }

    pub fn num_used_queries(&self) -> u32 {
        self.pools.iter().map(|pool| pool.num_used_queries).sum()
    }

    /// Freezes the written queries for readback.
    pub fn finish(mut self) -> TimestampQueries {
        TimestampQueries {
            cache: self.cache.clone(),
            pools: std::mem::take(&mut self.pools),
        }
    }
}

impl Drop for QueryAllocator {
    fn drop(&mut self) {
        if !self.pools.is_empty() {
            self.cache.release(std::mem::take(&mut self.pools));
        }
    }
}

/// Timestamps written by one finished recording.
pub struct TimestampQueries {
    cache: Arc<QueryPoolCache>,
    pools: Vec<QueryPool>,
}

impl TimestampQueries {
    /// Reads back all written timestamps.
    ///
    /// Must only be called after the GPU finished executing the command buffer.
    pub fn read(&self) -> Result<ResolvedTimestamps, DeviceError> {
        let device = self.cache.device();
        let pools = self
            .pools
            .iter()
            .map(|pool| {
                let mut results = vec![0; pool.num_used_queries as usize];
                device.get_query_results(pool.handle, 0, &mut results)?;
                Ok(results)
            })
            .collect::<Result<Vec<_>, DeviceError>>()?;
        Ok(ResolvedTimestamps { pools })
    }
}

impl Drop for TimestampQueries {
    fn drop(&mut self) {
        self.cache.release(std::mem::take(&mut self.pools));
    }
}

impl std::fmt::Debug for TimestampQueries {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimestampQueries").field("pools", &self.pools).finish()
    }
}

/// Raw tick values read back from the device.
#[derive(Clone, Debug, Default)]
pub struct ResolvedTimestamps {
    pools: Vec<Vec<u64>>,
}

impl ResolvedTimestamps {
    pub fn get(&self, address: QueryAddress) -> Option<u64> {
        self.pools
            .get(address.pool_idx as usize)?
            .get(address.query_idx as usize)
            .copied()
    }
}

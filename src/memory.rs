//! Device memory allocated by the application, totalled per heap and memory type.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::{
    data::{MemoryData, MemoryHeapData, MemoryTypeData},
    DeviceMemoryHandle, MemoryProperties,
};

#[derive(Clone, Copy, Debug)]
struct Allocation {
    size: u64,
    memory_type_index: u32,
}

struct MemoryLedger {
    allocations: HashMap<DeviceMemoryHandle, Allocation>,
    data: MemoryData,
}

/// Running totals of the device memory allocated by the application.
pub struct MemoryTracker {
    properties: MemoryProperties,
    ledger: Mutex<MemoryLedger>,
}

impl MemoryTracker {
    pub fn new(properties: MemoryProperties) -> Self {
        let data = MemoryData {
            heaps: vec![MemoryHeapData::default(); properties.memory_heaps.len()],
            types: vec![MemoryTypeData::default(); properties.memory_types.len()],
            ..Default::default()
        };
        Self {
            properties,
            ledger: Mutex::new(MemoryLedger {
                allocations: HashMap::new(),
                data,
            }),
        }
    }

    pub fn allocate(&self, memory: DeviceMemoryHandle, size: u64, memory_type_index: u32) {
        let allocation = Allocation {
            size,
            memory_type_index,
        };

        let mut ledger = self.ledger.lock();
        if let Some(previous) = ledger.allocations.insert(memory, allocation) {
            log::warn!("{memory:?} was allocated twice without being freed");
            self.apply(&mut ledger.data, previous, Change::Remove);
        }
        self.apply(&mut ledger.data, allocation, Change::Add);
    }

    /// Ignored for allocations the tracker never saw.
    pub fn free(&self, memory: DeviceMemoryHandle) {
        let mut ledger = self.ledger.lock();
        match ledger.allocations.remove(&memory) {
            Some(allocation) => self.apply(&mut ledger.data, allocation, Change::Remove),
            None => log::debug!("Ignoring free of untracked {memory:?}"),
        }
    }

    pub fn data(&self) -> MemoryData {
        self.ledger.lock().data.clone()
    }

    fn apply(&self, data: &mut MemoryData, allocation: Allocation, change: Change) {
        fn update(count: &mut u32, size: &mut u64, allocation: Allocation, change: Change) {
            match change {
                Change::Add => {
                    *count += 1;
                    *size += allocation.size;
                }
                Change::Remove => {
                    *count = count.saturating_sub(1);
                    *size = size.saturating_sub(allocation.size);
                }
            }
        }

        update(&mut data.total_allocation_count, &mut data.total_allocation_size, allocation, change);

        // Unknown type indices only show up in the totals.
        let Some(memory_type) = self.properties.memory_types.get(allocation.memory_type_index as usize) else {
            return;
        };

        if memory_type.device_local {
            update(
                &mut data.device_local_allocation_count,
                &mut data.device_local_allocation_size,
                allocation,
                change,
            );
        }
        if memory_type.host_visible {
            update(
                &mut data.host_visible_allocation_count,
                &mut data.host_visible_allocation_size,
                allocation,
                change,
            );
        }
        if let Some(ty) = data.types.get_mut(allocation.memory_type_index as usize) {
            update(&mut ty.allocation_count, &mut ty.allocation_size, allocation, change);
        }
        if let Some(heap) = data.heaps.get_mut(memory_type.heap_index as usize) {
            update(&mut heap.allocation_count, &mut heap.allocation_size, allocation, change);
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Change {
    Add,
    Remove,
}

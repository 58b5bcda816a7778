// Copyright 2021 System76 <info@system76.com>
// SPDX-License-Identifier: LGPL-3.0-only

use crate::device::{Device, StorageEngine};
use crate::error::PartitioningError;

/// Read-only queries over the device graph of a storage engine.
pub struct DeviceGraphGuard<'a, E> {
    engine: &'a E,
}

impl<'a, E: StorageEngine> DeviceGraphGuard<'a, E> {
    pub fn new(engine: &'a E) -> Self {
        Self { engine }
    }

    /// Find a device by name, hidden devices included.
    pub fn resolve(&self, name: &str) -> Result<Device, PartitioningError<E::Error>> {
        self.engine
            .device_by_name(name, true)
            .ok_or_else(|| PartitioningError::UnknownDevice(name.to_owned()))
    }

    /// A disk with a partition table that the engine supports.
    pub fn is_partitioned(device: &Device) -> bool {
        device.is_disk() && device.partitioned && device.format.supported
    }

    /// Names of the addressable partitions of a device.
    ///
    /// Extended partitions which contain logical partitions are left out.
    pub fn list_partitions(device: &Device) -> Vec<String> {
        if !Self::is_partitioned(device) {
            return Vec::new();
        }

        device
            .children
            .iter()
            .filter(|child| child.is_partition())
            .filter(|child| !(child.is_extended() && !child.format.logical_partitions.is_empty()))
            .map(|child| child.name.clone())
            .collect()
    }

    pub fn size_limits(device: &Device) -> (u64, u64) {
        (device.min_size, device.max_size)
    }

    pub fn is_resizable(device: &Device) -> bool {
        device.resizable
    }
}

// Copyright 2021 System76 <info@system76.com>
// SPDX-License-Identifier: LGPL-3.0-only

use crate::request::PartitioningRequest;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PartitionKind {
    Primary,
    Extended,
    Logical,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeviceKind {
    Disk,
    Partition(PartitionKind),
    /// LVM volumes, LUKS mappings, and other device maps.
    DeviceMap,
    Other,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Format {
    /// Format type, such as `ext4` or a partition table type.
    pub type_: String,
    /// Whether the storage engine is able to manage this format.
    pub supported: bool,
    /// Names of the logical partitions inside an extended partition.
    pub logical_partitions: Vec<String>,
}

/// Snapshot of a device and its descendants, as reported by a storage engine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Device {
    /// A device name could be `sda1`.
    pub name: String,
    pub kind: DeviceKind,
    pub protected: bool,
    pub hidden: bool,
    /// Sizes are in bytes.
    pub size: u64,
    pub min_size: u64,
    pub max_size: u64,
    pub resizable: bool,
    pub partitioned: bool,
    pub format: Format,
    pub children: Vec<Device>,
}

impl Device {
    pub fn new(name: impl Into<String>, kind: DeviceKind, size: u64) -> Self {
        Self {
            name: name.into(),
            kind,
            protected: false,
            hidden: false,
            size,
            min_size: size,
            max_size: size,
            resizable: false,
            partitioned: false,
            format: Format::default(),
            children: Vec::new(),
        }
    }

    pub fn disk(name: impl Into<String>, size: u64) -> Self {
        Self::new(name, DeviceKind::Disk, size)
    }

    pub fn partition(name: impl Into<String>, size: u64) -> Self {
        Self::new(name, DeviceKind::Partition(PartitionKind::Primary), size)
    }

    /// Mark the device as holding a supported partition table.
    pub fn with_table(mut self, table: &str) -> Self {
        self.partitioned = true;
        self.format = Format {
            type_: table.to_owned(),
            supported: true,
            logical_partitions: Vec::new(),
        };
        self
    }

    pub fn with_format(mut self, format: Format) -> Self {
        self.format = format;
        self
    }

    pub fn with_limits(mut self, min_size: u64, max_size: u64) -> Self {
        self.resizable = true;
        self.min_size = min_size;
        self.max_size = max_size;
        self
    }

    pub fn protected(mut self) -> Self {
        self.protected = true;
        self
    }

    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    pub fn is_disk(&self) -> bool {
        self.kind == DeviceKind::Disk
    }

    pub fn is_partition(&self) -> bool {
        matches!(self.kind, DeviceKind::Partition(_))
    }

    pub fn is_extended(&self) -> bool {
        self.kind == DeviceKind::Partition(PartitionKind::Extended)
    }
}

/// Device graph and the operations that partitioning may schedule on it.
pub trait StorageEngine {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Locate a device, optionally including devices hidden from users.
    fn device_by_name(&self, name: &str, include_hidden: bool) -> Option<Device>;

    /// Remove a device along with every device that depends on it.
    fn recursive_remove(&mut self, device: &Device) -> Result<(), Self::Error>;

    /// Align a requested size to a boundary suitable for the device.
    fn align_target_size(&self, device: &Device, size: u64) -> u64;

    fn resize_device(&mut self, device: &Device, size: u64) -> Result<(), Self::Error>;

    /// Schedule an automatic layout described by `request`.
    fn autopart(&mut self, request: &PartitioningRequest) -> Result<(), Self::Error>;
}

// Copyright 2021 System76 <info@system76.com>
// SPDX-License-Identifier: LGPL-3.0-only

use crate::device::{Device, DeviceKind, PartitionKind, StorageEngine};
use crate::error::DeviceTreeError;
use crate::request::{ExcludedMountPoints, PartitioningRequest, PartitioningScheme};
use std::collections::BTreeMap;

/// Partitions are aligned to 1 MiB boundaries.
pub const PARTITION_ALIGNMENT: u64 = 1024 * 1024;
pub const SECTOR_SIZE: u64 = 512;

/// A change scheduled against the device tree.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Action {
    Destroy(String),
    Resize {
        device: String,
        size: u64,
    },
    Autopart {
        scheme: PartitioningScheme,
        file_system_type: String,
        excluded: ExcludedMountPoints,
        encrypted: bool,
    },
}

struct Node {
    /// Stored without children; see `Node::children`.
    device: Device,
    parent: Option<String>,
    children: Vec<String>,
}

/// In-memory device graph which records actions instead of applying them.
#[derive(Default)]
pub struct DeviceTree {
    nodes: BTreeMap<String, Node>,
    roots: Vec<String>,
    actions: Vec<Action>,
}

impl DeviceTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a device, and its children, beneath `parent`.
    pub fn add(&mut self, mut device: Device, parent: Option<&str>) -> Result<(), DeviceTreeError> {
        if self.nodes.contains_key(&device.name) {
            return Err(DeviceTreeError::Exists(device.name));
        }

        match parent {
            Some(parent) => self
                .nodes
                .get_mut(parent)
                .ok_or_else(|| DeviceTreeError::NotFound(parent.to_owned()))?
                .children
                .push(device.name.clone()),
            None => self.roots.push(device.name.clone()),
        }

        let children = std::mem::take(&mut device.children);
        let name = device.name.clone();

        self.nodes.insert(
            name.clone(),
            Node {
                device,
                parent: parent.map(String::from),
                children: Vec::new(),
            },
        );

        for child in children {
            self.add(child, Some(&name))?;
        }

        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    /// Snapshots of every device without a parent.
    pub fn roots(&self) -> Vec<Device> {
        self.roots
            .iter()
            .filter_map(|name| self.snapshot(name))
            .collect()
    }

    /// Every action scheduled so far, oldest first.
    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    fn snapshot(&self, name: &str) -> Option<Device> {
        let node = self.nodes.get(name)?;
        let mut device = node.device.clone();
        device.children = node
            .children
            .iter()
            .filter_map(|child| self.snapshot(child))
            .collect();
        Some(device)
    }

    /// Collect a device and its dependents, leaves first.
    fn dependents(&self, name: &str, out: &mut Vec<String>) -> Result<(), DeviceTreeError> {
        let node = self
            .nodes
            .get(name)
            .ok_or_else(|| DeviceTreeError::NotFound(name.to_owned()))?;

        for child in &node.children {
            self.dependents(child, out)?;
        }

        // Logical partitions are siblings of their extended partition.
        if node.device.is_extended() {
            for logical in &node.device.format.logical_partitions {
                if self.nodes.contains_key(logical) {
                    self.dependents(logical, out)?;
                }
            }
        }

        if !out.iter().any(|seen| seen == name) {
            out.push(name.to_owned());
        }

        Ok(())
    }

    fn destroy(&mut self, name: &str) {
        let node = match self.nodes.remove(name) {
            Some(node) => node,
            None => return,
        };

        match node.parent {
            Some(parent) => {
                let siblings = match self.nodes.get(&parent) {
                    Some(parent) => parent.children.clone(),
                    None => Vec::new(),
                };

                if node.device.kind == DeviceKind::Partition(PartitionKind::Logical) {
                    for sibling in siblings {
                        if let Some(sibling) = self.nodes.get_mut(&sibling) {
                            sibling
                                .device
                                .format
                                .logical_partitions
                                .retain(|logical| logical != name);
                        }
                    }
                }

                if let Some(parent) = self.nodes.get_mut(&parent) {
                    parent.children.retain(|child| child != name);
                }
            }
            None => self.roots.retain(|root| root != name),
        }

        tracing::debug!("scheduled removal of {}", name);
        self.actions.push(Action::Destroy(name.to_owned()));
    }
}

impl StorageEngine for DeviceTree {
    type Error = DeviceTreeError;

    fn device_by_name(&self, name: &str, include_hidden: bool) -> Option<Device> {
        let node = self.nodes.get(name)?;

        if node.device.hidden && !include_hidden {
            return None;
        }

        self.snapshot(name)
    }

    fn recursive_remove(&mut self, device: &Device) -> Result<(), DeviceTreeError> {
        let mut doomed = Vec::new();
        self.dependents(&device.name, &mut doomed)?;

        if let Some(protected) = doomed
            .iter()
            .find(|name| self.nodes.get(name.as_str()).map_or(false, |n| n.device.protected))
        {
            return Err(DeviceTreeError::Protected(protected.clone()));
        }

        for name in doomed {
            self.destroy(&name);
        }

        Ok(())
    }

    fn align_target_size(&self, device: &Device, size: u64) -> u64 {
        let grain = if device.is_partition() {
            PARTITION_ALIGNMENT
        } else {
            SECTOR_SIZE
        };

        let aligned = size - size % grain;
        if aligned >= device.min_size {
            return aligned;
        }

        // Capped at the current size.
        let min_size = (device.min_size + grain - 1) / grain * grain;
        min_size.min(device.size.max(device.min_size))
    }

    fn resize_device(&mut self, device: &Device, size: u64) -> Result<(), DeviceTreeError> {
        let node = self
            .nodes
            .get_mut(&device.name)
            .ok_or_else(|| DeviceTreeError::NotFound(device.name.clone()))?;

        let current = &mut node.device;

        if !current.resizable {
            return Err(DeviceTreeError::NotResizable(current.name.clone()));
        }

        if size < current.min_size || size > current.max_size {
            return Err(DeviceTreeError::SizeOutOfRange {
                name: current.name.clone(),
                size,
                min: current.min_size,
                max: current.max_size,
            });
        }

        tracing::debug!("scheduled resize of {} from {} to {}", current.name, current.size, size);
        current.size = size;

        self.actions.push(Action::Resize {
            device: device.name.clone(),
            size,
        });

        Ok(())
    }

    fn autopart(&mut self, request: &PartitioningRequest) -> Result<(), DeviceTreeError> {
        self.actions.push(Action::Autopart {
            scheme: request.partitioning_scheme,
            file_system_type: request.file_system_type.clone(),
            excluded: request.excluded_mount_points,
            encrypted: request.encrypted,
        });

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::Format;

    const MIB: u64 = 1024 * 1024;
    const GIB: u64 = 1024 * MIB;

    /// `sda` with `sda1`, extended `sda2` holding logical `sda5`, and a
    /// LUKS mapping on `sda5`.
    fn dos_disk() -> DeviceTree {
        let mut tree = DeviceTree::new();
        let mut sda = Device::disk("sda", 16 * GIB).with_table("dos");
        sda.children.push(Device::partition("sda1", GIB));
        sda.children.push(
            Device::new("sda2", DeviceKind::Partition(PartitionKind::Extended), 8 * GIB)
                .with_format(Format {
                    type_: String::new(),
                    supported: true,
                    logical_partitions: vec!["sda5".into()],
                }),
        );

        let mut sda5 = Device::new("sda5", DeviceKind::Partition(PartitionKind::Logical), 8 * GIB);
        sda5.children
            .push(Device::new("luks-sda5", DeviceKind::DeviceMap, 8 * GIB));
        sda.children.push(sda5);

        tree.add(sda, None).unwrap();
        tree
    }

    #[test]
    fn snapshots_include_children() {
        let tree = dos_disk();
        let sda = tree.device_by_name("sda", false).unwrap();
        let names: Vec<_> = sda.children.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["sda1", "sda2", "sda5"]);
        assert_eq!(sda.children[2].children[0].name, "luks-sda5");
    }

    #[test]
    fn hidden_devices_need_include_hidden() {
        let mut tree = DeviceTree::new();
        tree.add(Device::disk("loop0", GIB).hidden(), None).unwrap();

        assert!(tree.device_by_name("loop0", false).is_none());
        assert!(tree.device_by_name("loop0", true).is_some());
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let mut tree = dos_disk();
        assert!(matches!(
            tree.add(Device::partition("sda1", GIB), Some("sda")),
            Err(DeviceTreeError::Exists(_))
        ));
        assert!(matches!(
            tree.add(Device::partition("sdb1", GIB), Some("sdb")),
            Err(DeviceTreeError::NotFound(_))
        ));
    }

    #[test]
    fn remove_is_leaves_first() {
        let mut tree = dos_disk();
        let sda5 = tree.device_by_name("sda5", false).unwrap();
        tree.recursive_remove(&sda5).unwrap();

        assert_eq!(
            tree.actions(),
            &[
                Action::Destroy("luks-sda5".into()),
                Action::Destroy("sda5".into())
            ]
        );

        let sda2 = tree.device_by_name("sda2", false).unwrap();
        assert!(sda2.format.logical_partitions.is_empty());
    }

    #[test]
    fn removing_extended_removes_logicals() {
        let mut tree = dos_disk();
        let sda2 = tree.device_by_name("sda2", false).unwrap();
        tree.recursive_remove(&sda2).unwrap();

        assert!(!tree.contains("sda2"));
        assert!(!tree.contains("sda5"));
        assert!(!tree.contains("luks-sda5"));
        assert!(tree.contains("sda1"));
        assert_eq!(tree.actions().last(), Some(&Action::Destroy("sda2".into())));
    }

    #[test]
    fn protected_descendant_blocks_removal() {
        let mut tree = DeviceTree::new();
        let mut sda = Device::disk("sda", 16 * GIB).with_table("gpt");
        let mut sda1 = Device::partition("sda1", GIB);
        sda1.children
            .push(Device::new("root", DeviceKind::DeviceMap, GIB).protected());
        sda.children.push(sda1);
        tree.add(sda, None).unwrap();

        let sda = tree.device_by_name("sda", false).unwrap();
        assert!(matches!(
            tree.recursive_remove(&sda),
            Err(DeviceTreeError::Protected(name)) if name == "root"
        ));
        assert!(tree.contains("sda1"));
        assert!(tree.actions().is_empty());
    }

    #[test]
    fn alignment_rounds_down_but_not_below_min() {
        let tree = DeviceTree::new();
        let part = Device::partition("sda1", 10 * GIB).with_limits(GIB + 1, 20 * GIB);

        assert_eq!(tree.align_target_size(&part, 4 * GIB + 123), 4 * GIB);
        assert_eq!(tree.align_target_size(&part, GIB + 10), GIB + MIB);

        let volume = Device::new("home", DeviceKind::DeviceMap, 10 * GIB).with_limits(0, 20 * GIB);
        assert_eq!(tree.align_target_size(&volume, 1000), 512);
    }

    #[test]
    fn alignment_never_exceeds_the_current_size() {
        let mut tree = DeviceTree::new();
        tree.add(
            Device::partition("sda1", GIB + 512).with_limits(GIB + 512, 4 * GIB),
            None,
        )
        .unwrap();

        let sda1 = tree.device_by_name("sda1", false).unwrap();
        let aligned = tree.align_target_size(&sda1, GIB);
        assert_eq!(aligned, GIB + 512);

        tree.resize_device(&sda1, aligned).unwrap();
        assert_eq!(tree.device_by_name("sda1", false).unwrap().size, GIB + 512);
    }

    #[test]
    fn resize_respects_limits() {
        let mut tree = DeviceTree::new();
        tree.add(
            Device::partition("sda1", 10 * GIB).with_limits(2 * GIB, 20 * GIB),
            None,
        )
        .unwrap();
        tree.add(Device::partition("sda2", GIB), None).unwrap();

        let sda1 = tree.device_by_name("sda1", false).unwrap();
        assert!(matches!(
            tree.resize_device(&sda1, GIB),
            Err(DeviceTreeError::SizeOutOfRange { .. })
        ));

        tree.resize_device(&sda1, 4 * GIB).unwrap();
        assert_eq!(tree.device_by_name("sda1", false).unwrap().size, 4 * GIB);

        let sda2 = tree.device_by_name("sda2", false).unwrap();
        assert!(matches!(
            tree.resize_device(&sda2, GIB / 2),
            Err(DeviceTreeError::NotResizable(_))
        ));
    }
}

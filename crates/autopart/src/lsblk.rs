// Copyright 2021 System76 <info@system76.com>
// SPDX-License-Identifier: LGPL-3.0-only

//! Builds a device tree from the block devices that `lsblk` reports.

use crate::device::{Device, DeviceKind, Format, PartitionKind};
use crate::device_tree::{DeviceTree, PARTITION_ALIGNMENT};
use crate::error::DeviceTreeError;
use cradle::prelude::*;
use std::collections::BTreeSet;

const COLUMNS: &str = "NAME,SIZE,TYPE,PTTYPE,PARTTYPE,FSTYPE,FSUSED,MOUNTPOINT";

/// DOS partition types of extended partitions.
const EXTENDED_TYPES: &[&str] = &["0x5", "0xf", "0x85"];

/// File systems which can be shrunk.
const SHRINKABLE: &[&str] = &["ext2", "ext3", "ext4", "btrfs", "ntfs"];

/// File systems which can only grow.
const GROWABLE: &[&str] = &["xfs"];

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("failed to run lsblk")]
    Command(#[source] cradle::Error),
    #[error("lsblk output could not be parsed")]
    Json(#[from] serde_json::Error),
    #[error("lsblk output does not form a device tree")]
    Tree(#[from] DeviceTreeError),
}

#[derive(Deserialize)]
struct LsblkOutput {
    blockdevices: Vec<LsblkDevice>,
}

#[derive(Deserialize)]
struct LsblkDevice {
    name: String,
    size: Option<Bytes>,
    #[serde(rename = "type")]
    type_: String,
    pttype: Option<String>,
    parttype: Option<String>,
    fstype: Option<String>,
    fsused: Option<Bytes>,
    mountpoint: Option<String>,
    #[serde(default)]
    children: Vec<LsblkDevice>,
}

/// Older releases of lsblk print byte counts as strings.
#[derive(Deserialize)]
#[serde(untagged)]
enum Bytes {
    Number(u64),
    Text(String),
}

impl Bytes {
    fn get(&self) -> Option<u64> {
        match self {
            Bytes::Number(bytes) => Some(*bytes),
            Bytes::Text(text) => text.trim().parse().ok(),
        }
    }
}

/// Probe the block devices of the running system.
pub fn probe(protected_mounts: &[String]) -> Result<DeviceTree, ProbeError> {
    let output: StdoutUntrimmed =
        run_result!("lsblk", "--json", "--bytes", "--output", COLUMNS).map_err(ProbeError::Command)?;

    parse(&output.0, protected_mounts)
}

/// Build a device tree from `lsblk --json --bytes` output.
///
/// Devices mounted at one of `protected_mounts` are protected.
pub fn parse(json: &str, protected_mounts: &[String]) -> Result<DeviceTree, ProbeError> {
    let output: LsblkOutput = serde_json::from_str(json)?;

    let mut converter = Converter {
        protected_mounts,
        seen: BTreeSet::new(),
    };

    let mut tree = DeviceTree::new();

    for entry in &output.blockdevices {
        if let Some(device) = converter.convert(entry, None) {
            tree.add(device, None)?;
        }
    }

    Ok(tree)
}

#[derive(Clone, Copy)]
struct Parent<'a> {
    table: Option<&'a str>,
    size: u64,
}

struct Converter<'a> {
    protected_mounts: &'a [String],
    seen: BTreeSet<String>,
}

impl<'a> Converter<'a> {
    fn convert(&mut self, entry: &LsblkDevice, parent: Option<Parent>) -> Option<Device> {
        // Members of RAID and multi-PV volumes are listed under each parent.
        if !self.seen.insert(entry.name.clone()) {
            tracing::debug!("{}: already listed under another parent", entry.name);
            return None;
        }

        let size = ward::ward!(entry.size.as_ref().and_then(Bytes::get), else {
            tracing::warn!("{}: lsblk did not report a size", entry.name);
            return None;
        });

        let kind = match entry.type_.as_str() {
            "disk" => DeviceKind::Disk,
            "part" => DeviceKind::Partition(partition_kind(entry, parent)),
            "lvm" | "crypt" | "dm" | "mpath" => DeviceKind::DeviceMap,
            _ => DeviceKind::Other,
        };

        let mut device = Device::new(entry.name.clone(), kind, size);
        device.hidden = entry.type_ == "loop" || entry.type_ == "rom";
        device.protected = entry.mountpoint.as_ref().map_or(false, |mount| {
            self.protected_mounts.iter().any(|protected| protected == mount)
        });

        let table = entry.pttype.as_deref().filter(|_| kind == DeviceKind::Disk);

        match table {
            Some(table) => {
                let supported = table == "gpt" || table == "dos";
                device.partitioned = supported;
                device.format = Format {
                    type_: table.to_owned(),
                    supported,
                    logical_partitions: Vec::new(),
                };
            }
            None => {
                let fstype = entry.fstype.clone().unwrap_or_default();
                device.format = Format {
                    supported: !fstype.is_empty(),
                    type_: fstype,
                    logical_partitions: Vec::new(),
                };
            }
        }

        self.set_limits(&mut device, entry, parent);

        let this = Parent { table, size };
        device.children = entry
            .children
            .iter()
            .filter_map(|child| self.convert(child, Some(this)))
            .collect();

        if table == Some("dos") {
            let logicals: Vec<String> = device
                .children
                .iter()
                .filter(|child| child.kind == DeviceKind::Partition(PartitionKind::Logical))
                .map(|child| child.name.clone())
                .collect();

            for child in device.children.iter_mut().filter(|child| child.is_extended()) {
                child.format.logical_partitions = logicals.clone();
            }
        }

        Some(device)
    }

    fn set_limits(&self, device: &mut Device, entry: &LsblkDevice, parent: Option<Parent>) {
        if device.is_disk() || device.is_extended() {
            return;
        }

        let fstype = entry.fstype.as_deref().unwrap_or_default();
        let max_size = match parent {
            Some(parent) if device.is_partition() => parent.size,
            _ => device.size,
        };

        let min_size = if SHRINKABLE.contains(&fstype) {
            let used = entry.fsused.as_ref().and_then(Bytes::get);
            used.map_or(device.size, |used| {
                (used + PARTITION_ALIGNMENT - 1) / PARTITION_ALIGNMENT * PARTITION_ALIGNMENT
            })
        } else if GROWABLE.contains(&fstype) {
            device.size
        } else {
            return;
        };

        device.resizable = true;
        device.min_size = min_size.min(device.size);
        device.max_size = max_size;
    }
}

fn partition_kind(entry: &LsblkDevice, parent: Option<Parent>) -> PartitionKind {
    if parent.and_then(|parent| parent.table) != Some("dos") {
        return PartitionKind::Primary;
    }

    if entry
        .parttype
        .as_deref()
        .map_or(false, |type_| EXTENDED_TYPES.contains(&type_))
    {
        return PartitionKind::Extended;
    }

    match partition_number(&entry.name) {
        Some(number) if number >= 5 => PartitionKind::Logical,
        _ => PartitionKind::Primary,
    }
}

/// The trailing number of a partition name, such as 5 for `nvme0n1p5`.
fn partition_number(name: &str) -> Option<u32> {
    let start = name
        .char_indices()
        .rev()
        .take_while(|(_, c)| c.is_ascii_digit())
        .last()
        .map(|(index, _)| index)?;

    name[start..].parse().ok()
}

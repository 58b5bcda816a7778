// Copyright 2021 System76 <info@system76.com>
// SPDX-License-Identifier: GPL-3.0-only

#[macro_use]
extern crate fomat_macros;

use pop_autopart::*;
use std::rc::Rc;

fn main() {
    let protected = vec!["/".to_owned(), "/boot".to_owned(), "/boot/efi".to_owned()];
    let tree = lsblk::probe(&protected).unwrap();

    for disk in tree.roots() {
        display(&disk, 0);
    }

    let storage = Rc::new(ACell::new(tree));
    let module = AutoPartitioningModule::new(storage);
    let t = ACellOwner::new();

    for disk in module.storage().ro(&t).roots() {
        if !module.is_device_partitioned(&disk.name, &t).unwrap() {
            continue;
        }

        pintln!(
            (disk.name) ": " [module.device_partitions(&disk.name, &t).unwrap()]
        );
    }
}

fn display(device: &Device, level: usize) {
    let indent = "  ".repeat(level);

    pintln!(
        (indent) (device.name) " " [device.kind] "\n"
        (indent) "  Size: " (device.size) "\n"
        (indent) "  Format: " (device.format.type_)
        if device.resizable {
            "\n" (indent) "  Limits: " (device.min_size) ".." (device.max_size)
        }
        if device.protected {
            "\n" (indent) "  Protected"
        }
        if device.hidden {
            "\n" (indent) "  Hidden"
        }
    );

    for child in &device.children {
        display(child, level + 1);
    }
}

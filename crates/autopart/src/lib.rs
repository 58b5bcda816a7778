// Copyright 2021 System76 <info@system76.com>
// SPDX-License-Identifier: LGPL-3.0-only

#[macro_use]
extern crate serde;
#[macro_use]
extern crate thiserror;

use qcell::{TLCell, TLCellOwner};

mod device;
mod device_tree;
mod error;
mod guard;
pub mod kickstart;
pub mod lsblk;
mod module;
mod request;
mod signal;
pub mod task;

pub struct CellMarker;

/// Storage shared between the module and the tasks it schedules.
pub type ACell<T> = TLCell<CellMarker, T>;
/// Token which grants access to every `ACell` on the current thread.
pub type ACellOwner = TLCellOwner<CellMarker>;

pub use self::device::*;
pub use self::device_tree::*;
pub use self::error::*;
pub use self::guard::*;
pub use self::module::*;
pub use self::request::*;
pub use self::signal::*;

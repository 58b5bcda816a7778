// Copyright 2021 System76 <info@system76.com>
// SPDX-License-Identifier: LGPL-3.0-only

#[derive(Debug, Error)]
pub enum PartitioningError<E: std::error::Error + 'static> {
    #[error("device {0} does not exist")]
    UnknownDevice(String),
    #[error("device {0} is protected")]
    ProtectedDevice(String),
    #[error("encrypted partitioning requires a passphrase")]
    MissingPassphrase,
    #[error(transparent)]
    Engine(E),
}

#[derive(Debug, Error)]
pub enum DeviceTreeError {
    #[error("device {0} does not exist")]
    NotFound(String),
    #[error("device {0} already exists")]
    Exists(String),
    #[error("device {0} is protected")]
    Protected(String),
    #[error("device {0} cannot be resized")]
    NotResizable(String),
    #[error("cannot resize {name} to {size} bytes: must be within {min}..={max}")]
    SizeOutOfRange {
        name: String,
        size: u64,
        min: u64,
        max: u64,
    },
}

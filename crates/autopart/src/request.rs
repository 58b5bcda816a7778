// Copyright 2021 System76 <info@system76.com>
// SPDX-License-Identifier: LGPL-3.0-only

use secstr::SecUtf8;
use std::fmt;

/// Layout used when partitions are created automatically.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartitioningScheme {
    Plain,
    Btrfs,
    Lvm,
    #[serde(rename = "thinp")]
    LvmThinp,
}

impl PartitioningScheme {
    pub const DEFAULT: Self = PartitioningScheme::Lvm;
}

impl Default for PartitioningScheme {
    fn default() -> Self {
        Self::DEFAULT
    }
}

bitflags::bitflags! {
    /// Mount points which automatic partitioning should not create.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct ExcludedMountPoints: u8 {
        const BOOT = 1 << 0;
        const HOME = 1 << 1;
        const SWAP = 1 << 2;
    }
}

const MOUNT_POINTS: &[(ExcludedMountPoints, &str)] = &[
    (ExcludedMountPoints::BOOT, "/boot"),
    (ExcludedMountPoints::HOME, "/home"),
    (ExcludedMountPoints::SWAP, "swap"),
];

impl ExcludedMountPoints {
    /// The flag for a mount point, if it is one that may be excluded.
    pub fn from_mount_point(mount_point: &str) -> Option<Self> {
        MOUNT_POINTS
            .iter()
            .find(|(_, name)| *name == mount_point)
            .map(|(flag, _)| *flag)
    }

    /// Mount points contained in the set, in a stable order.
    pub fn mount_points(self) -> impl Iterator<Item = &'static str> {
        MOUNT_POINTS
            .iter()
            .filter(move |(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
    }
}

/// User intent for automatic partitioning.
///
/// Requests are replaced as a whole by the module which owns them, so an
/// observer of a change always reads a complete request. The encryption
/// fields are only meaningful when `encrypted` is set.
#[derive(Clone, PartialEq)]
pub struct PartitioningRequest {
    pub partitioning_scheme: PartitioningScheme,
    /// Empty selects the default file system of the scheme.
    pub file_system_type: String,
    pub excluded_mount_points: ExcludedMountPoints,
    pub encrypted: bool,
    pub passphrase: SecUtf8,
    pub cipher: String,
    pub luks_version: String,
    pub pbkdf: String,
    pub pbkdf_memory: u32,
    pub pbkdf_time: u32,
    pub pbkdf_iterations: u32,
    pub escrow_certificate: String,
    pub backup_passphrase_enabled: bool,
}

impl PartitioningRequest {
    pub fn has_passphrase(&self) -> bool {
        !self.passphrase.unsecure().is_empty()
    }

    /// Encryption was requested but nothing can unlock the devices yet.
    pub fn requires_passphrase(&self) -> bool {
        self.encrypted && !self.has_passphrase()
    }
}

impl Default for PartitioningRequest {
    fn default() -> Self {
        Self {
            partitioning_scheme: PartitioningScheme::default(),
            file_system_type: String::new(),
            excluded_mount_points: ExcludedMountPoints::empty(),
            encrypted: false,
            passphrase: SecUtf8::from(""),
            cipher: String::new(),
            luks_version: String::new(),
            pbkdf: String::new(),
            pbkdf_memory: 0,
            pbkdf_time: 0,
            pbkdf_iterations: 0,
            escrow_certificate: String::new(),
            backup_passphrase_enabled: false,
        }
    }
}

impl fmt::Debug for PartitioningRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("PartitioningRequest");

        debug
            .field("partitioning_scheme", &self.partitioning_scheme)
            .field("file_system_type", &self.file_system_type)
            .field(
                "excluded_mount_points",
                &self.excluded_mount_points.mount_points().collect::<Vec<_>>(),
            )
            .field("encrypted", &self.encrypted);

        if self.encrypted {
            debug
                .field("passphrase", &self.passphrase)
                .field("cipher", &self.cipher)
                .field("luks_version", &self.luks_version)
                .field("pbkdf", &self.pbkdf)
                .field("pbkdf_memory", &self.pbkdf_memory)
                .field("pbkdf_time", &self.pbkdf_time)
                .field("pbkdf_iterations", &self.pbkdf_iterations)
                .field("escrow_certificate", &self.escrow_certificate)
                .field("backup_passphrase_enabled", &self.backup_passphrase_enabled);
        }

        debug.finish()
    }
}

// Copyright 2021 System76 <info@system76.com>
// SPDX-License-Identifier: LGPL-3.0-only

//! Mapping between the `autopart` kickstart command and a partitioning request.
//!
//! Both directions destructure or construct every field explicitly, so a field
//! added to either side without a mapping is a compile error.

use crate::request::{ExcludedMountPoints, PartitioningRequest, PartitioningScheme};
use secstr::SecUtf8;

/// Parsed fields of the `autopart` command.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutopartData {
    pub autopart: bool,
    #[serde(rename = "type")]
    pub type_: Option<PartitioningScheme>,
    pub fstype: String,
    pub noboot: bool,
    pub nohome: bool,
    pub noswap: bool,
    pub encrypted: bool,
    pub passphrase: SecUtf8,
    pub cipher: String,
    pub luks_version: String,
    pub pbkdf: String,
    pub pbkdf_memory: u32,
    pub pbkdf_time: u32,
    pub pbkdf_iterations: u32,
    pub escrowcert: String,
    pub backuppassphrase: bool,
}

impl Default for AutopartData {
    fn default() -> Self {
        Self {
            autopart: false,
            type_: None,
            fstype: String::new(),
            noboot: false,
            nohome: false,
            noswap: false,
            encrypted: false,
            passphrase: SecUtf8::from(""),
            cipher: String::new(),
            luks_version: String::new(),
            pbkdf: String::new(),
            pbkdf_memory: 0,
            pbkdf_time: 0,
            pbkdf_iterations: 0,
            escrowcert: String::new(),
            backuppassphrase: false,
        }
    }
}

/// Build a fresh request from kickstart data.
///
/// Encryption settings are only read when `encrypted` is set; otherwise they
/// keep their defaults.
pub fn import_request(data: &AutopartData) -> PartitioningRequest {
    let AutopartData {
        autopart: _,
        type_,
        fstype,
        noboot,
        nohome,
        noswap,
        encrypted,
        passphrase,
        cipher,
        luks_version,
        pbkdf,
        pbkdf_memory,
        pbkdf_time,
        pbkdf_iterations,
        escrowcert,
        backuppassphrase,
    } = data;

    let mut request = PartitioningRequest::default();

    if let Some(scheme) = type_ {
        request.partitioning_scheme = *scheme;
    }

    request.file_system_type = fstype.clone();

    let excluded = [
        (*noboot, ExcludedMountPoints::BOOT),
        (*nohome, ExcludedMountPoints::HOME),
        (*noswap, ExcludedMountPoints::SWAP),
    ];

    for (set, flag) in excluded.iter() {
        request.excluded_mount_points.set(*flag, *set);
    }

    if *encrypted {
        request.encrypted = true;
        request.passphrase = passphrase.clone();
        request.cipher = cipher.clone();
        request.luks_version = luks_version.clone();

        request.pbkdf = pbkdf.clone();
        request.pbkdf_memory = *pbkdf_memory;
        request.pbkdf_time = *pbkdf_time;
        request.pbkdf_iterations = *pbkdf_iterations;

        request.escrow_certificate = escrowcert.clone();
        request.backup_passphrase_enabled = *backuppassphrase;
    }

    request
}

/// Write a request back into kickstart data, preserving `data.autopart`.
///
/// The passphrase is never written out. The scheme is omitted when it is the
/// default one.
pub fn export_request(request: &PartitioningRequest, data: &mut AutopartData) {
    let PartitioningRequest {
        partitioning_scheme,
        file_system_type,
        excluded_mount_points,
        encrypted,
        passphrase: _,
        cipher,
        luks_version,
        pbkdf,
        pbkdf_memory,
        pbkdf_time,
        pbkdf_iterations,
        escrow_certificate,
        backup_passphrase_enabled,
    } = request;

    let mut exported = AutopartData {
        autopart: data.autopart,
        type_: None,
        fstype: file_system_type.clone(),
        noboot: excluded_mount_points.contains(ExcludedMountPoints::BOOT),
        nohome: excluded_mount_points.contains(ExcludedMountPoints::HOME),
        noswap: excluded_mount_points.contains(ExcludedMountPoints::SWAP),
        encrypted: *encrypted,
        passphrase: SecUtf8::from(""),
        ..AutopartData::default()
    };

    if *partitioning_scheme != PartitioningScheme::DEFAULT {
        exported.type_ = Some(*partitioning_scheme);
    }

    if *encrypted {
        exported.cipher = cipher.clone();
        exported.luks_version = luks_version.clone();

        exported.pbkdf = pbkdf.clone();
        exported.pbkdf_memory = *pbkdf_memory;
        exported.pbkdf_time = *pbkdf_time;
        exported.pbkdf_iterations = *pbkdf_iterations;

        exported.escrowcert = escrow_certificate.clone();
        exported.backuppassphrase = *backup_passphrase_enabled;
    }

    *data = exported;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encrypted_request() -> PartitioningRequest {
        PartitioningRequest {
            partitioning_scheme: PartitioningScheme::Btrfs,
            file_system_type: "xfs".into(),
            excluded_mount_points: ExcludedMountPoints::HOME,
            encrypted: true,
            passphrase: SecUtf8::from("correct horse"),
            cipher: "aes-xts-plain64".into(),
            luks_version: "luks2".into(),
            pbkdf: "argon2id".into(),
            pbkdf_memory: 256,
            pbkdf_time: 0,
            pbkdf_iterations: 1000,
            escrow_certificate: "file:///tmp/escrow.pem".into(),
            backup_passphrase_enabled: true,
        }
    }

    #[test]
    fn export_excluding_swap() {
        let request = PartitioningRequest {
            excluded_mount_points: ExcludedMountPoints::SWAP,
            ..PartitioningRequest::default()
        };

        let mut data = AutopartData::default();
        export_request(&request, &mut data);

        assert!(data.noswap);
        assert!(!data.noboot);
        assert!(!data.nohome);
        assert!(!data.encrypted);
        assert_eq!(data.passphrase.unsecure(), "");
        assert_eq!(data.type_, None);
    }

    #[test]
    fn export_drops_the_passphrase() {
        let mut data = AutopartData::default();
        export_request(&encrypted_request(), &mut data);

        assert!(data.encrypted);
        assert_eq!(data.passphrase.unsecure(), "");
        assert_eq!(data.cipher, "aes-xts-plain64");
        assert_eq!(data.escrowcert, "file:///tmp/escrow.pem");
        assert_eq!(data.type_, Some(PartitioningScheme::Btrfs));
    }

    #[test]
    fn export_keeps_the_enabled_flag() {
        let mut data = AutopartData {
            autopart: true,
            ..AutopartData::default()
        };

        export_request(&PartitioningRequest::default(), &mut data);
        assert!(data.autopart);
    }

    #[test]
    fn import_reads_encryption_only_when_encrypted() {
        let data = AutopartData {
            cipher: "aes-cbc-essiv".into(),
            passphrase: SecUtf8::from("ignored"),
            nohome: true,
            ..AutopartData::default()
        };

        let request = import_request(&data);
        assert_eq!(request.cipher, "");
        assert!(!request.has_passphrase());
        assert_eq!(request.excluded_mount_points, ExcludedMountPoints::HOME);
    }

    #[test]
    fn import_then_export_is_stable() {
        let mut first = AutopartData::default();
        export_request(&encrypted_request(), &mut first);

        let mut second = AutopartData::default();
        export_request(&import_request(&first), &mut second);

        assert_eq!(first, second);
    }

    #[test]
    fn inert_encryption_settings_are_not_exported() {
        let request = PartitioningRequest {
            encrypted: false,
            passphrase: SecUtf8::from(""),
            cipher: "aes-xts-plain64".into(),
            pbkdf_time: 4000,
            ..encrypted_request()
        };

        let mut first = AutopartData::default();
        export_request(&request, &mut first);

        assert!(!first.encrypted);
        assert_eq!(first.cipher, "");
        assert_eq!(first.pbkdf_time, 0);
        assert_eq!(first.escrowcert, "");
        assert!(!first.backuppassphrase);

        let imported = import_request(&first);
        assert!(!imported.encrypted);
        assert_eq!(imported.cipher, "");
        assert_eq!(imported.partitioning_scheme, request.partitioning_scheme);
        assert_eq!(imported.file_system_type, request.file_system_type);
        assert_eq!(imported.excluded_mount_points, request.excluded_mount_points);

        let mut second = AutopartData::default();
        export_request(&imported, &mut second);
        assert_eq!(first, second);
    }

    #[test]
    fn deserializes_missing_fields_as_defaults() {
        let data: AutopartData =
            serde_json::from_str(r#"{"autopart": true, "type": "thinp", "noswap": true}"#)
                .expect("parse autopart data");

        assert!(data.autopart);
        assert_eq!(data.type_, Some(PartitioningScheme::LvmThinp));
        assert!(data.noswap);
        assert_eq!(data.fstype, "");
    }
}

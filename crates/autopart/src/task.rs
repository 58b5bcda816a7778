// Copyright 2021 System76 <info@system76.com>
// SPDX-License-Identifier: LGPL-3.0-only

//! Deferred work handed out by the partitioning module.

use crate::device::StorageEngine;
use crate::error::PartitioningError;
use crate::request::PartitioningRequest;
use crate::{ACell, ACellOwner};
use std::rc::Rc;
use std::sync::Arc;

/// A unit of work which is executed when the caller decides to.
pub trait Task {
    type Error: std::error::Error;

    fn name(&self) -> &'static str;

    fn run(&self, t: &mut ACellOwner) -> Result<(), Self::Error>;
}

/// Schedules the automatic layout of a request on the storage.
pub struct AutomaticPartitioningTask<E> {
    storage: Rc<ACell<E>>,
    request: Arc<PartitioningRequest>,
}

impl<E: StorageEngine> AutomaticPartitioningTask<E> {
    pub fn new(storage: Rc<ACell<E>>, request: Arc<PartitioningRequest>) -> Self {
        Self { storage, request }
    }

    /// The request as it was when the task was created.
    pub fn request(&self) -> &PartitioningRequest {
        &self.request
    }
}

impl<E: StorageEngine> Task for AutomaticPartitioningTask<E> {
    type Error = PartitioningError<E::Error>;

    fn name(&self) -> &'static str {
        "Schedule the automatic partitioning"
    }

    fn run(&self, t: &mut ACellOwner) -> Result<(), Self::Error> {
        if self.request.requires_passphrase() {
            return Err(PartitioningError::MissingPassphrase);
        }

        tracing::info!("scheduling automatic partitioning with {:?}", self.request);

        self.storage
            .rw(t)
            .autopart(&self.request)
            .map_err(PartitioningError::Engine)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device_tree::{Action, DeviceTree};
    use crate::request::{ExcludedMountPoints, PartitioningScheme};
    use secstr::SecUtf8;

    #[test]
    fn run_hands_the_request_to_the_storage() {
        let mut t = ACellOwner::new();
        let storage = Rc::new(ACell::new(DeviceTree::new()));
        let request = PartitioningRequest {
            partitioning_scheme: PartitioningScheme::Plain,
            excluded_mount_points: ExcludedMountPoints::SWAP,
            ..PartitioningRequest::default()
        };

        let task = AutomaticPartitioningTask::new(storage.clone(), Arc::new(request));
        assert!(storage.ro(&t).actions().is_empty());

        task.run(&mut t).unwrap();

        assert_eq!(
            storage.ro(&t).actions(),
            &[Action::Autopart {
                scheme: PartitioningScheme::Plain,
                file_system_type: String::new(),
                excluded: ExcludedMountPoints::SWAP,
                encrypted: false,
            }]
        );
    }

    #[test]
    fn encrypted_request_needs_a_passphrase() {
        let mut t = ACellOwner::new();
        let storage = Rc::new(ACell::new(DeviceTree::new()));
        let mut request = PartitioningRequest {
            encrypted: true,
            ..PartitioningRequest::default()
        };

        let task = AutomaticPartitioningTask::new(storage.clone(), Arc::new(request.clone()));
        assert!(matches!(
            task.run(&mut t),
            Err(PartitioningError::MissingPassphrase)
        ));
        assert!(storage.ro(&t).actions().is_empty());

        request.passphrase = SecUtf8::from("secret");
        let task = AutomaticPartitioningTask::new(storage.clone(), Arc::new(request));
        task.run(&mut t).unwrap();
        assert_eq!(storage.ro(&t).actions().len(), 1);
    }
}

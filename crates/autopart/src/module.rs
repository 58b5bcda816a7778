// Copyright 2021 System76 <info@system76.com>
// SPDX-License-Identifier: LGPL-3.0-only

use crate::device::StorageEngine;
use crate::error::PartitioningError;
use crate::guard::DeviceGraphGuard;
use crate::kickstart::{self, AutopartData};
use crate::request::PartitioningRequest;
use crate::signal::Signal;
use crate::task::AutomaticPartitioningTask;
use crate::{ACell, ACellOwner};
use secstr::SecUtf8;
use std::rc::Rc;
use std::sync::Arc;

pub type ModuleResult<T, E> = std::result::Result<T, PartitioningError<<E as StorageEngine>::Error>>;

/// Holds the automatic partitioning intent, and edits the device graph on its behalf.
pub struct AutoPartitioningModule<E> {
    storage: Rc<ACell<E>>,
    enabled: bool,
    request: Arc<PartitioningRequest>,
    /// Emitted after `enabled` was replaced.
    pub enabled_changed: Signal,
    /// Emitted after the request was replaced.
    pub request_changed: Signal,
}

impl<E: StorageEngine> AutoPartitioningModule<E> {
    pub fn new(storage: Rc<ACell<E>>) -> Self {
        Self {
            storage,
            enabled: false,
            request: Arc::new(PartitioningRequest::default()),
            enabled_changed: Signal::new(),
            request_changed: Signal::new(),
        }
    }

    pub fn storage(&self) -> &Rc<ACell<E>> {
        &self.storage
    }

    /// Read the `autopart` command into a new request.
    pub fn process_kickstart(&mut self, data: &AutopartData) {
        self.set_enabled(data.autopart);
        self.set_request(kickstart::import_request(data));
    }

    /// Write the current state back as an `autopart` command.
    pub fn setup_kickstart(&self, data: &mut AutopartData) {
        data.autopart = self.enabled;
        kickstart::export_request(&self.request, data);
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        self.enabled_changed.emit();
        tracing::debug!("enabled is set to {}", enabled);
    }

    pub fn request(&self) -> &PartitioningRequest {
        &self.request
    }

    pub fn set_request(&mut self, request: PartitioningRequest) {
        self.request = Arc::new(request);
        self.request_changed.emit();
        tracing::debug!("request is set to {:?}", self.request);
    }

    pub fn requires_passphrase(&self) -> bool {
        self.request.requires_passphrase()
    }

    /// Replace the request with a copy that carries `passphrase`.
    pub fn set_passphrase(&mut self, passphrase: &str) {
        let mut request = PartitioningRequest::clone(&self.request);
        request.passphrase = SecUtf8::from(passphrase);
        self.set_request(request);
    }

    /// Remove a device after removing its dependent devices.
    ///
    /// A protected device is an error. When some of its direct children are
    /// protected, only the unprotected children are removed and the device is
    /// kept. Protection further down is left to the storage engine.
    pub fn remove_device(&self, name: &str, t: &mut ACellOwner) -> ModuleResult<(), E> {
        let device = DeviceGraphGuard::new(self.storage.ro(t)).resolve(name)?;

        if device.protected {
            return Err(PartitioningError::ProtectedDevice(name.to_owned()));
        }

        let storage = self.storage.rw(t);

        if device.children.iter().any(|child| child.protected) {
            tracing::debug!("removing unprotected children of {}", name);

            for child in device.children.iter().filter(|child| !child.protected) {
                // Removing an extended partition also removes its logical partitions.
                let child = match storage.device_by_name(&child.name, true) {
                    Some(child) => child,
                    None => continue,
                };

                storage
                    .recursive_remove(&child)
                    .map_err(PartitioningError::Engine)?;
            }

            return Ok(());
        }

        tracing::debug!("removing device {}", name);
        storage
            .recursive_remove(&device)
            .map_err(PartitioningError::Engine)
    }

    /// Shrink a device to at most `size` bytes.
    pub fn shrink_device(&self, name: &str, size: u64, t: &mut ACellOwner) -> ModuleResult<(), E> {
        let device = DeviceGraphGuard::new(self.storage.ro(t)).resolve(name)?;

        if device.protected {
            return Err(PartitioningError::ProtectedDevice(name.to_owned()));
        }

        if device.size <= size {
            tracing::debug!("the size of {} is already {}", name, device.size);
            return Ok(());
        }

        let storage = self.storage.rw(t);
        let aligned = storage.align_target_size(&device, size);

        tracing::debug!("shrinking {} to {} ({} aligned)", name, size, aligned);
        storage
            .resize_device(&device, aligned)
            .map_err(PartitioningError::Engine)
    }

    pub fn is_device_partitioned(&self, name: &str, t: &ACellOwner) -> ModuleResult<bool, E> {
        let device = DeviceGraphGuard::new(self.storage.ro(t)).resolve(name)?;
        Ok(DeviceGraphGuard::<E>::is_partitioned(&device))
    }

    pub fn device_partitions(&self, name: &str, t: &ACellOwner) -> ModuleResult<Vec<String>, E> {
        let device = DeviceGraphGuard::new(self.storage.ro(t)).resolve(name)?;
        Ok(DeviceGraphGuard::<E>::list_partitions(&device))
    }

    pub fn is_device_resizable(&self, name: &str, t: &ACellOwner) -> ModuleResult<bool, E> {
        let device = DeviceGraphGuard::new(self.storage.ro(t)).resolve(name)?;
        Ok(DeviceGraphGuard::<E>::is_resizable(&device))
    }

    /// Minimum and maximum sizes of a device, in bytes.
    pub fn device_size_limits(&self, name: &str, t: &ACellOwner) -> ModuleResult<(u64, u64), E> {
        let device = DeviceGraphGuard::new(self.storage.ro(t)).resolve(name)?;
        Ok(DeviceGraphGuard::<E>::size_limits(&device))
    }

    /// Capture the storage and current request for partitioning later on.
    pub fn configure_with_task(&self) -> AutomaticPartitioningTask<E> {
        AutomaticPartitioningTask::new(self.storage.clone(), self.request.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device_tree::DeviceTree;
    use std::cell::Cell;

    fn module() -> AutoPartitioningModule<DeviceTree> {
        AutoPartitioningModule::new(Rc::new(ACell::new(DeviceTree::new())))
    }

    #[test]
    fn setters_notify_observers() {
        let mut module = module();
        let enabled = Rc::new(Cell::new(0));
        let request = Rc::new(Cell::new(0));

        {
            let enabled = enabled.clone();
            module
                .enabled_changed
                .connect(move || enabled.set(enabled.get() + 1));
        }
        {
            let request = request.clone();
            module
                .request_changed
                .connect(move || request.set(request.get() + 1));
        }

        module.set_enabled(true);
        module.set_passphrase("secret");

        assert_eq!(enabled.get(), 1);
        assert_eq!(request.get(), 1);
        assert!(module.enabled());
    }

    #[test]
    fn set_passphrase_replaces_the_request() {
        let mut module = module();
        module.set_request(PartitioningRequest {
            encrypted: true,
            cipher: "aes-xts-plain64".into(),
            ..PartitioningRequest::default()
        });

        let task = module.configure_with_task();
        assert!(module.requires_passphrase());

        module.set_passphrase("secret");
        assert!(!module.requires_passphrase());
        assert_eq!(module.request().cipher, "aes-xts-plain64");

        // The earlier snapshot is not affected.
        assert!(task.request().requires_passphrase());
    }

    #[test]
    fn kickstart_round_trip_carries_enabled() {
        let mut module = module();
        let data = AutopartData {
            autopart: true,
            nohome: true,
            ..AutopartData::default()
        };

        module.process_kickstart(&data);
        assert!(module.enabled());

        let mut generated = AutopartData::default();
        module.setup_kickstart(&mut generated);
        assert_eq!(generated, data);
    }
}

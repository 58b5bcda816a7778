// Copyright 2021 System76 <info@system76.com>
// SPDX-License-Identifier: GPL-3.0-only

use anyhow::Context;
use pop_autopart::kickstart::AutopartData;
use pop_autopart::task::{AutomaticPartitioningTask, Task};
use pop_autopart::{lsblk, ACell, ACellOwner, AutoPartitioningModule, DeviceTree};

use crate::frontend::Frontend;
use crate::{DeviceInfo, Request};
use std::cell::Cell;
use std::future::Future;
use std::rc::Rc;
use zbus::{Connection, SignalContext};

/// Changes announced by the module since they were last relayed.
#[derive(Default)]
struct Changes {
    enabled: Cell<bool>,
    request: Cell<bool>,
}

/// DBus backend which carries out requests it receives.
pub struct Backend {
    pub module: AutoPartitioningModule<DeviceTree>,
    pub t: ACellOwner,
    pub protected_mounts: Vec<String>,
    task: Option<AutomaticPartitioningTask<DeviceTree>>,
    changes: Rc<Changes>,
}

impl Backend {
    pub fn new(protected_mounts: Vec<String>) -> Self {
        let storage = Rc::new(ACell::new(DeviceTree::new()));
        let mut module = AutoPartitioningModule::new(storage);
        let changes = Rc::new(Changes::default());

        {
            let changes = changes.clone();
            module
                .enabled_changed
                .connect(move || changes.enabled.set(true));
        }

        {
            let changes = changes.clone();
            module
                .request_changed
                .connect(move || changes.request.set(true));
        }

        Self {
            module,
            t: ACellOwner::new(),
            protected_mounts,
            task: None,
            changes,
        }
    }

    /// Performs requests in the background between requests, emitting signals as necessary.
    pub async fn on_event(&mut self, conn: &Connection, event: Request) {
        self.with(conn, |backend, ctx| async move {
            let reply = match event {
                Request::ConfigureWithTask => {
                    let name = backend.configure_with_task();
                    Frontend::task_configured(&ctx, name.to_owned()).await
                }

                Request::DeviceInfo(device) => match backend.device_info(&device) {
                    Ok(info) => Frontend::device_info_ok(&ctx, info).await,
                    Err(why) => Frontend::device_info_err(&ctx, device, format!("{:#}", why)).await,
                },

                Request::DiskRescan => {
                    if let Err(why) = backend.disk_rescan() {
                        tracing::error!("disk rescan failed: {:#}", why);
                    }

                    Frontend::disk_rescan_complete(&ctx).await
                }

                Request::GenerateKickstart => match backend.generate_kickstart() {
                    Ok(json) => Frontend::kickstart_generated(&ctx, json).await,
                    Err(why) => Frontend::kickstart_err(&ctx, format!("{:#}", why)).await,
                },

                Request::ReadKickstart { json } => match backend.read_kickstart(&json) {
                    Ok(()) => Ok(()),
                    Err(why) => Frontend::kickstart_err(&ctx, format!("{:#}", why)).await,
                },

                Request::RemoveDevice(device) => match backend.remove_device(&device) {
                    Ok(()) => Frontend::remove_device_ok(&ctx, device).await,
                    Err(why) => {
                        Frontend::remove_device_err(&ctx, device, format!("{:#}", why)).await
                    }
                },

                Request::RequiresPassphrase => {
                    let required = backend.module.requires_passphrase();
                    Frontend::requires_passphrase_ok(&ctx, required).await
                }

                Request::RunTask => match backend.run_task() {
                    Ok(()) => Frontend::task_ok(&ctx).await,
                    Err(why) => Frontend::task_err(&ctx, format!("{:#}", why)).await,
                },

                Request::SetEnabled(enabled) => {
                    backend.module.set_enabled(enabled);
                    Ok(())
                }

                Request::SetPassphrase(passphrase) => {
                    backend.module.set_passphrase(&passphrase);
                    Ok(())
                }

                Request::ShrinkDevice { device, size } => {
                    match backend.shrink_device(&device, size) {
                        Ok(()) => Frontend::shrink_device_ok(&ctx, device).await,
                        Err(why) => {
                            Frontend::shrink_device_err(&ctx, device, format!("{:#}", why)).await
                        }
                    }
                }
            };

            let relayed = backend.relay_changes(&ctx).await;
            reply.and(relayed)
        })
        .await;
    }

    pub fn configure_with_task(&mut self) -> &'static str {
        let task = self.module.configure_with_task();
        let name = task.name();
        self.task = Some(task);
        name
    }

    pub fn device_info(&self, device: &str) -> anyhow::Result<DeviceInfo> {
        let &Self {
            ref module, ref t, ..
        } = self;

        let (min_size, max_size) = module.device_size_limits(device, t)?;

        Ok(DeviceInfo {
            device: device.to_owned(),
            partitioned: module.is_device_partitioned(device, t)?,
            partitions: module.device_partitions(device, t)?,
            resizable: module.is_device_resizable(device, t)?,
            min_size,
            max_size,
        })
    }

    /// Replace the device tree with a fresh probe of the system.
    pub fn disk_rescan(&mut self) -> anyhow::Result<()> {
        let &mut Self {
            ref module,
            ref mut t,
            ref protected_mounts,
            ..
        } = self;

        let tree = lsblk::probe(protected_mounts).context("could not probe block devices")?;
        *module.storage().rw(t) = tree;
        Ok(())
    }

    pub fn generate_kickstart(&self) -> anyhow::Result<String> {
        let mut data = AutopartData::default();
        self.module.setup_kickstart(&mut data);
        serde_json::to_string(&data).context("could not serialize kickstart data")
    }

    pub fn read_kickstart(&mut self, json: &str) -> anyhow::Result<()> {
        let data: AutopartData =
            serde_json::from_str(json).context("kickstart data is not valid")?;
        self.module.process_kickstart(&data);
        Ok(())
    }

    pub fn remove_device(&mut self, device: &str) -> anyhow::Result<()> {
        self.module
            .remove_device(device, &mut self.t)
            .with_context(|| format!("could not remove {}", device))
    }

    pub fn shrink_device(&mut self, device: &str, size: u64) -> anyhow::Result<()> {
        self.module
            .shrink_device(device, size, &mut self.t)
            .with_context(|| format!("could not shrink {}", device))
    }

    pub fn run_task(&mut self) -> anyhow::Result<()> {
        let task = self.task.take().context("no task has been configured")?;
        tracing::info!("running task: {}", task.name());
        task.run(&mut self.t).context("partitioning task failed")
    }

    /// Clears the pending changes, returning whether the enabled flag and the
    /// request changed.
    fn take_changes(&self) -> (bool, bool) {
        (
            self.changes.enabled.replace(false),
            self.changes.request.replace(false),
        )
    }

    async fn relay_changes(&self, ctx: &SignalContext<'_>) -> zbus::Result<()> {
        let (enabled, request) = self.take_changes();

        if enabled {
            Frontend::enabled_changed(ctx, self.module.enabled()).await?;
        }

        if request {
            Frontend::request_changed(ctx).await?;
        }

        Ok(())
    }

    pub async fn with<'a, C, F>(&'a mut self, conn: &Connection, future: C)
    where
        C: FnOnce(&'a mut Self, SignalContext<'a>) -> F + 'a,
        F: Future<Output = zbus::Result<()>> + 'a,
    {
        if let Ok(iface) = conn
            .object_server()
            .interface::<_, Frontend>(crate::IFACE)
            .await
        {
            if let Err(why) = future(self, iface.signal_context().to_owned()).await {
                tracing::error!("dbus backend context error: {:?}", why);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kickstart_round_trip() {
        let mut backend = Backend::new(Vec::new());
        backend
            .read_kickstart(r#"{"autopart": true, "type": "plain", "nohome": true}"#)
            .unwrap();

        assert!(backend.changes.enabled.get());
        assert!(backend.changes.request.get());

        let json = backend.generate_kickstart().unwrap();
        let data: AutopartData = serde_json::from_str(&json).unwrap();
        assert!(data.autopart);
        assert!(data.nohome);
        assert_eq!(data.passphrase.unsecure(), "");
    }

    #[test]
    fn changes_are_relayed_once() {
        let mut backend = Backend::new(Vec::new());
        backend.module.set_enabled(true);
        backend.module.set_passphrase("hunter2");

        assert_eq!(backend.take_changes(), (true, true));
        assert_eq!(backend.take_changes(), (false, false));

        backend.module.set_passphrase("hunter3");
        assert_eq!(backend.take_changes(), (false, true));
    }

    #[test]
    fn invalid_kickstart_leaves_state_alone() {
        let mut backend = Backend::new(Vec::new());
        assert!(backend.read_kickstart("[1, 2]").is_err());
        assert!(!backend.changes.request.get());
    }

    #[test]
    fn tasks_run_once() {
        let mut backend = Backend::new(Vec::new());
        assert!(backend.run_task().is_err());

        backend.configure_with_task();
        backend.run_task().unwrap();
        assert_eq!(backend.module.storage().ro(&backend.t).actions().len(), 1);

        assert!(backend.run_task().is_err());
    }

    #[test]
    fn unknown_device_info() {
        let backend = Backend::new(Vec::new());
        let why = format!("{:#}", backend.device_info("sdz").unwrap_err());
        assert!(why.contains("sdz"));
    }
}

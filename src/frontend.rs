use crate::{DeviceInfo, Request};
use postage::mpsc::Sender;
use postage::prelude::*;
use zbus::SignalContext;

/// DBus frontend which accepts requests and passes them on to the background.
pub struct Frontend {
    pub sender: Sender<Request>,
}

impl Frontend {
    async fn forward(&mut self, request: Request) -> zbus::fdo::Result<()> {
        self.sender
            .send(request)
            .await
            .map_err(|_| zbus::fdo::Error::Failed("backend is not running".into()))
    }
}

#[dbus_interface(name = "com.system76.Distinst.AutoPartitioning")]
impl Frontend {
    /// Replace the partitioning request with one read from `autopart` kickstart data, as JSON.
    async fn read_kickstart(&mut self, json: String) -> zbus::fdo::Result<()> {
        tracing::debug!("reading kickstart data");
        self.forward(Request::ReadKickstart { json }).await
    }

    /// Request the `autopart` kickstart data of the current state, as JSON.
    async fn generate_kickstart(&mut self) -> zbus::fdo::Result<()> {
        tracing::debug!("generating kickstart data");
        self.forward(Request::GenerateKickstart).await
    }

    #[dbus_interface(signal)]
    pub async fn kickstart_generated(ctx: &SignalContext<'_>, json: String) -> zbus::Result<()>;

    #[dbus_interface(signal)]
    pub async fn kickstart_err(ctx: &SignalContext<'_>, why: String) -> zbus::Result<()>;

    async fn set_enabled(&mut self, enabled: bool) -> zbus::fdo::Result<()> {
        self.forward(Request::SetEnabled(enabled)).await
    }

    #[dbus_interface(signal)]
    pub async fn enabled_changed(ctx: &SignalContext<'_>, enabled: bool) -> zbus::Result<()>;

    #[dbus_interface(signal)]
    pub async fn request_changed(ctx: &SignalContext<'_>) -> zbus::Result<()>;

    /// Set a default passphrase for all encrypted devices.
    async fn set_passphrase(&mut self, passphrase: String) -> zbus::fdo::Result<()> {
        self.forward(Request::SetPassphrase(passphrase)).await
    }

    async fn requires_passphrase(&mut self) -> zbus::fdo::Result<()> {
        self.forward(Request::RequiresPassphrase).await
    }

    #[dbus_interface(signal)]
    pub async fn requires_passphrase_ok(ctx: &SignalContext<'_>, required: bool)
        -> zbus::Result<()>;

    /// Remove a device and its dependents, sparing protected children.
    async fn remove_device(&mut self, device: String) -> zbus::fdo::Result<()> {
        tracing::debug!("removing {}", device);
        self.forward(Request::RemoveDevice(device)).await
    }

    #[dbus_interface(signal)]
    pub async fn remove_device_ok(ctx: &SignalContext<'_>, device: String) -> zbus::Result<()>;

    #[dbus_interface(signal)]
    pub async fn remove_device_err(
        ctx: &SignalContext<'_>,
        device: String,
        why: String,
    ) -> zbus::Result<()>;

    /// Shrink a device to at most `size` bytes.
    async fn shrink_device(&mut self, device: String, size: u64) -> zbus::fdo::Result<()> {
        tracing::debug!("shrinking {} to {}", device, size);
        self.forward(Request::ShrinkDevice { device, size }).await
    }

    #[dbus_interface(signal)]
    pub async fn shrink_device_ok(ctx: &SignalContext<'_>, device: String) -> zbus::Result<()>;

    #[dbus_interface(signal)]
    pub async fn shrink_device_err(
        ctx: &SignalContext<'_>,
        device: String,
        why: String,
    ) -> zbus::Result<()>;

    /// Request the partitions, resizability, and size limits of a device.
    async fn device_info(&mut self, device: String) -> zbus::fdo::Result<()> {
        self.forward(Request::DeviceInfo(device)).await
    }

    #[dbus_interface(signal)]
    pub async fn device_info_ok(ctx: &SignalContext<'_>, info: DeviceInfo) -> zbus::Result<()>;

    #[dbus_interface(signal)]
    pub async fn device_info_err(
        ctx: &SignalContext<'_>,
        device: String,
        why: String,
    ) -> zbus::Result<()>;

    /// Capture the current request for partitioning, without running it.
    async fn configure_with_task(&mut self) -> zbus::fdo::Result<()> {
        self.forward(Request::ConfigureWithTask).await
    }

    #[dbus_interface(signal)]
    pub async fn task_configured(ctx: &SignalContext<'_>, name: String) -> zbus::Result<()>;

    /// Run the task created by the last `ConfigureWithTask` call.
    async fn run_task(&mut self) -> zbus::fdo::Result<()> {
        self.forward(Request::RunTask).await
    }

    #[dbus_interface(signal)]
    pub async fn task_ok(ctx: &SignalContext<'_>) -> zbus::Result<()>;

    #[dbus_interface(signal)]
    pub async fn task_err(ctx: &SignalContext<'_>, why: String) -> zbus::Result<()>;

    /// Initiate a rescan of disk information.
    async fn disk_rescan(&mut self) -> zbus::fdo::Result<()> {
        tracing::debug!("disk rescan");
        self.forward(Request::DiskRescan).await
    }

    #[dbus_interface(signal)]
    pub async fn disk_rescan_complete(ctx: &SignalContext<'_>) -> zbus::Result<()>;
}

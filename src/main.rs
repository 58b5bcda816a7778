// Copyright 2021 System76 <info@system76.com>
// SPDX-License-Identifier: GPL-3.0-only

#[macro_use]
extern crate zbus;

pub mod backend;
pub mod config;
pub mod frontend;

use crate::backend::Backend;
use crate::config::Config;
use crate::frontend::Frontend;
use anyhow::Context;
use postage::mpsc;
use postage::prelude::*;
use std::path::Path;
use tracing_subscriber::EnvFilter;
use zbus::ConnectionBuilder;

const IFACE: &str = "/com/system76/Distinst/AutoPartitioning";

fn main() -> anyhow::Result<()> {
    better_panic::install();

    let config = Config::load(Path::new(config::CONFIG_PATH))?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log.as_deref().unwrap_or("info")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    async_io::block_on(async_main(config))
}

async fn async_main(config: Config) -> anyhow::Result<()> {
    let (sender, mut receiver) = mpsc::channel(2);

    let mut backend = Backend::new(config.protected_mounts);

    if let Err(why) = backend.disk_rescan() {
        tracing::error!("failed to probe block devices: {:#}", why);
    }

    let frontend = Frontend { sender };

    tracing::info!("initiating connection to system");

    let connection = ConnectionBuilder::system()
        .context("failed to create system connection builder")?
        .name("com.system76.Distinst.AutoPartitioning")
        .context("failed to set name for system service")?
        .serve_at(IFACE, frontend)
        .context("failed to serve interface")?
        .build()
        .await
        .context("failed to initialize dbus connection")?;

    tracing::info!("initiated connection");

    let conn = connection.clone();

    // Processes all requests from the DBus frontend.
    while let Some(event) = receiver.recv().await {
        backend.on_event(&conn, event).await;
    }

    Ok(())
}

use serde::{Deserialize, Serialize};
use zvariant::Type;

#[derive(Debug, Type, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub device: String,
    pub partitioned: bool,
    pub partitions: Vec<String>,
    pub resizable: bool,
    pub min_size: u64,
    pub max_size: u64,
}

#[derive(Debug)]
pub enum Request {
    ConfigureWithTask,
    DeviceInfo(String),
    DiskRescan,
    GenerateKickstart,
    ReadKickstart { json: String },
    RemoveDevice(String),
    RequiresPassphrase,
    RunTask,
    SetEnabled(bool),
    SetPassphrase(String),
    ShrinkDevice { device: String, size: u64 },
}

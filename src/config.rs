// Copyright 2021 System76 <info@system76.com>
// SPDX-License-Identifier: GPL-3.0-only

use anyhow::Context;
use envfile::EnvFile;
use std::path::Path;

pub const CONFIG_PATH: &str = "/etc/distinst/autopart.conf";

/// Mount points of the live environment, which must never be removed or resized.
pub const DEFAULT_PROTECTED_MOUNTS: &[&str] =
    &["/", "/boot", "/boot/efi", "/run/initramfs/live", "/cdrom"];

#[derive(Debug, PartialEq)]
pub struct Config {
    pub protected_mounts: Vec<String>,
    /// Log filter directive, used when `RUST_LOG` is not set.
    pub log: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            protected_mounts: DEFAULT_PROTECTED_MOUNTS
                .iter()
                .map(|&mount| mount.to_owned())
                .collect(),
            log: None,
        }
    }
}

impl Config {
    /// Read the configuration, falling back to defaults when the file does not exist.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let env = EnvFile::new(path)
            .with_context(|| format!("failed to read configuration at {}", path.display()))?;

        Ok(Self::from_env(&env))
    }

    fn from_env(env: &EnvFile) -> Self {
        let mut config = Self::default();

        if let Some(mounts) = env.get("PROTECTED_MOUNTS") {
            config.protected_mounts = mounts
                .trim_matches('"')
                .split(|c: char| c == ',' || c.is_whitespace())
                .filter(|mount| !mount.is_empty())
                .map(String::from)
                .collect();
        }

        config.log = env
            .get("LOG")
            .map(|log| log.trim_matches('"').to_owned())
            .filter(|log| !log.is_empty());

        config
    }
}

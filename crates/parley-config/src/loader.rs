// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Layered configuration loading with Figment.
//!
//! Merge order, later wins: compiled defaults, `/etc/parley/parley.toml`,
//! `<config_dir>/parley/parley.toml`, `./parley.toml`, then `PARLEY_*`
//! environment variables.

#![allow(clippy::result_large_err)] // figment::Error is external

use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

use crate::model::ParleyConfig;

pub const SYSTEM_CONFIG_PATH: &str = "/etc/parley/parley.toml";
pub const LOCAL_CONFIG_PATH: &str = "parley.toml";

/// `<config_dir>/parley/parley.toml`, if the platform has a config dir.
pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("parley").join("parley.toml"))
}

/// Loads the full hierarchy with environment overrides.
pub fn load_config() -> Result<ParleyConfig, figment::Error> {
    build_figment().extract()
}

/// Loads defaults overlaid with one TOML string. No files, no environment.
pub fn load_config_from_str(toml_content: &str) -> Result<ParleyConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(ParleyConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Loads one explicit file with environment overrides.
pub fn load_config_from_path(path: &Path) -> Result<ParleyConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(ParleyConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// The Figment behind [`load_config`], before extraction.
pub fn build_figment() -> Figment {
    let mut figment = Figment::new()
        .merge(Serialized::defaults(ParleyConfig::default()))
        .merge(Toml::file(SYSTEM_CONFIG_PATH));
    if let Some(user) = user_config_path() {
        figment = figment.merge(Toml::file(user));
    }
    figment
        .merge(Toml::file(LOCAL_CONFIG_PATH))
        .merge(env_provider())
}

/// Maps `PARLEY_<SECTION>_<KEY>` onto `<section>.<key>`.
///
/// Only the first underscore after the section name is a separator, so
/// `PARLEY_SUBSCRIPTION_CACHE_TTL_SECS` becomes `subscription.cache_ttl_secs`.
fn env_provider() -> Env {
    Env::prefixed("PARLEY_").map(|key| {
        let key = key.as_str().to_ascii_lowercase();
        let mapped = SECTIONS
            .iter()
            .find_map(|section| {
                key.strip_prefix(section)
                    .and_then(|rest| rest.strip_prefix('_'))
                    .map(|rest| format!("{section}.{rest}"))
            })
            .unwrap_or(key);
        mapped.into()
    })
}

const SECTIONS: &[&str] = &[
    "chat",
    "subscription",
    "bridge",
    "storage",
    "session",
    "widget",
    "logging",
];

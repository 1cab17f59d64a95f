// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

mod loader;
mod settings;
mod validation;

#[cfg(test)]
mod integration_tests;
pub mod consts;

pub use loader::{
    load_and_validate_config, load_config, Config, InterfaceConfig, WidthConfig, WidthKeyword,
};
pub use settings::{ProtocolSettings, SettingsPatch, StreamSettings};
pub use validation::validate_config;

/*
 *  config.rs
 *
 *  LeVelS - audio bargraph overlay
 *  (c) 2020-26 Stuart Hunter
 *
 *  This program is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU General Public License as published by
 *  the Free Software Foundation, either version 3 of the License, or
 *  (at your option) any later version.
 *
 *  This program is distributed in the hope that it will be useful,
 *  but WITHOUT ANY WARRANTY; without even the implied warranty of
 *  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *  GNU General Public License for more details.
 *
 *  See <http://www.gnu.org/licenses/> to get a copy of the GNU General
 *  Public License.
 *
 */

use clap::{ArgAction, Parser, ValueHint};
use dirs_next::home_dir;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};
use thiserror::Error;

/// The nine relative placements: 0=center, 1=left, 2=right, 4=top,
/// 8=bottom plus the valid corner combinations.  Negative selects
/// absolute x/y positioning.
pub const POSITION_CODES: [i32; 9] = [0, 1, 2, 4, 8, 5, 6, 9, 10];

/// Error type for config loading/validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Top-level app configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// e.g., "info" | "debug"
    pub log_level: Option<String>,
    /// bargraph geometry & placement
    #[serde(default)]
    pub bargraph: BarGraphConfig,
}

/// Bargraph overlay settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BarGraphConfig {
    /// X coordinate of the bargraph
    pub x: i32,
    /// Y coordinate of the bargraph
    pub y: i32,
    /// 0 full transparency, 255 full opacity
    pub transparency: u8,
    /// placement code, negative = absolute x/y
    pub position: i32,
    /// width in pixel of each bar
    pub bar_width: u32,
    /// height in pixel of the bargraph
    pub bar_height: u32,
}

impl Default for BarGraphConfig {
    fn default() -> Self {
        Self {
            x: 0,
            y: 0,
            transparency: 255,
            position: -1,
            bar_width: 30,
            bar_height: 300,
        }
    }
}

/// A single runtime parameter change, delivered over the overlay
/// filter's control channel and dispatched by match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigChange {
    X(i32),
    Y(i32),
    Transparency(u8),
    Position(i32),
    BarWidth(u32),
    BarHeight(u32),
    Alarm(bool),
}

/// CLI overrides. All fields are Options so we can layer them over YAML.
#[derive(Debug, Parser, Clone)]
#[command(name = "LeVelS", about = "LeVelS audio bargraph overlay", disable_help_flag = false)]
pub struct Cli {
    /// Path to a YAML config file (overrides search)
    #[arg(long, value_hint = ValueHint::FilePath)]
    pub config: Option<PathBuf>,
    #[arg(long)]
    pub log_level: Option<String>,
    #[arg(long)]
    pub x: Option<i32>,
    #[arg(long)]
    pub y: Option<i32>,
    #[arg(long)]
    pub transparency: Option<u8>,
    #[arg(long, allow_hyphen_values = true)]
    pub position: Option<i32>,
    #[arg(long)]
    pub bar_width: Option<u32>,
    #[arg(long)]
    pub bar_height: Option<u32>,
    /// dump fully merged config (after overrides) and exit
    #[arg(long, action = ArgAction::SetTrue)]
    pub dump_config: bool,
}

/// Public entry point: parse CLI, read YAML, merge, validate.
pub fn load() -> Result<Config, ConfigError> {
    let cli = Cli::parse();

    // 1) defaults (from `Default` impl), then YAML (explicit path or search)
    let mut cfg = Config::default();
    if let Some(p) = cli.config.as_ref() {
        if p.exists() {
            cfg = read_yaml(p)?;
        } else {
            return Err(ConfigError::Validation(format!(
                "Config file not found: {}",
                p.display()
            )));
        }
    } else if let Some(p) = find_config_file() {
        cfg = read_yaml(&p)?;
    }

    // 2) CLI overrides (highest precedence)
    apply_cli_overrides(&mut cfg, &cli);

    // 3) Validate
    validate(&cfg)?;

    if cli.dump_config {
        // Pretty YAML of effective config (nice for debugging)
        let s = serde_yaml::to_string(&cfg)?;
        println!("{s}");
        std::process::exit(0);
    }

    Ok(cfg)
}

/// Try common locations in order (first hit wins).
fn find_config_file() -> Option<PathBuf> {
    // XDG-style: ~/.config/levels/config.yaml
    if let Some(home) = home_dir() {
        let p = home.join(".config/levels/config.yaml");
        if p.exists() {
            return Some(p);
        }
        let p = home.join(".config/levels.yaml");
        if p.exists() {
            return Some(p);
        }
    }
    // project local
    for candidate in &["levels.yaml", "config.yaml", "config/levels.yaml"] {
        let p = PathBuf::from(candidate);
        if p.exists() {
            return Some(p);
        }
    }
    None
}

fn read_yaml(path: &Path) -> Result<Config, ConfigError> {
    let s = fs::read_to_string(path)?;
    let cfg: Config = serde_yaml::from_str(&s)?;
    Ok(cfg)
}

fn apply_cli_overrides(cfg: &mut Config, cli: &Cli) {
    if cli.log_level.is_some() {
        cfg.log_level = cli.log_level.clone();
    }
    let bargraph = &mut cfg.bargraph;
    if let Some(x) = cli.x {
        bargraph.x = x;
    }
    if let Some(y) = cli.y {
        bargraph.y = y;
    }
    if let Some(t) = cli.transparency {
        bargraph.transparency = t;
    }
    if let Some(p) = cli.position {
        bargraph.position = p;
    }
    if let Some(w) = cli.bar_width {
        bargraph.bar_width = w;
    }
    if let Some(h) = cli.bar_height {
        bargraph.bar_height = h;
    }
}

/// Put any invariants here (required fields, ranges, etc.)
pub fn validate(cfg: &Config) -> Result<(), ConfigError> {
    let bargraph = &cfg.bargraph;
    if bargraph.bar_width == 0 || bargraph.bar_height == 0 {
        return Err(ConfigError::Validation(
            "bar_width/bar_height must be > 0".into(),
        ));
    }
    if bargraph.position >= 0 && !POSITION_CODES.contains(&bargraph.position) {
        return Err(ConfigError::Validation(format!(
            "position must be negative (absolute) or one of {:?}",
            POSITION_CODES
        )));
    }
    Ok(())
}

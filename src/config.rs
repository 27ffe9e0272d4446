/*!
Startup parameters.

Built from, in increasing priority: the defaults below, a TOML file named by a
`config=<path>` argument, and `key=value` arguments using the same keys as the
file (`scale=0.5 precision=single`).
*/

use std::{fs, io, path::PathBuf, str::FromStr};

use serde::Deserialize;
use thiserror::Error;

use crate::{kernel::Precision, screen, view::ViewState};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read { path: PathBuf, source: io::Error },

    #[error("invalid config at {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("expected `key=value`, got `{0}`")]
    Malformed(String),

    #[error("unknown parameter `{0}`")]
    UnknownKey(String),

    #[error("invalid value `{value}` for `{key}`")]
    InvalidValue { key: String, value: String },

    #[error("{0}")]
    OutOfRange(&'static str),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Gpu,
    Cpu,
}

impl FromStr for BackendKind {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "gpu" => Ok(BackendKind::Gpu),
            "cpu" => Ok(BackendKind::Cpu),
            _ => Err(()),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub width: u32,
    pub height: u32,
    #[serde(alias = "cx")]
    pub center_x: f64,
    #[serde(alias = "cy")]
    pub center_y: f64,
    pub scale: f64,
    pub decay: f64,
    /// Below this the zoom snaps back to `scale`.
    pub scale_floor: f64,
    /// Kernel passes per frame.
    pub passes: u32,
    pub precision: Precision,
    pub backend: BackendKind,
    /// Frames per timing report.
    pub report_interval: u32,
    /// CPU backend worker count; defaults to the number of logical cores.
    pub threads: Option<usize>,
    /// Run this many frames without a window, then exit.
    pub headless_frames: Option<u32>,
    pub paused: bool,
}

impl Default for Config {
    fn default() -> Self {
        let view = ViewState::default();
        Self {
            width: 1200,
            height: 800,
            center_x: view.center.0,
            center_y: view.center.1,
            scale: view.scale,
            decay: view.decay_factor,
            scale_floor: 1e-7,
            passes: 500,
            precision: Precision::Double,
            backend: BackendKind::Gpu,
            report_interval: 60,
            threads: None,
            headless_frames: None,
            paused: view.paused,
        }
    }
}

impl Config {
    pub fn from_args<I>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let mut pairs = Vec::new();
        for arg in args {
            let arg = arg.as_ref();
            let (key, value) = arg
                .split_once('=')
                .ok_or_else(|| ConfigError::Malformed(arg.to_string()))?;
            pairs.push((key.trim().to_string(), value.trim().to_string()));
        }

        let mut config = match pairs.iter().find(|(key, _)| key == "config") {
            Some((_, path)) => Self::load(path.into())?,
            None => Self::default(),
        };
        for (key, value) in pairs.iter().filter(|(key, _)| key != "config") {
            config.set(key, value)?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn load(path: PathBuf) -> Result<Self, ConfigError> {
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(source) => return Err(ConfigError::Read { path, source }),
        };
        toml::from_str(&text).map_err(|source| ConfigError::Parse { path, source })
    }

    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        fn parse<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
            value.parse().map_err(|_| ConfigError::InvalidValue {
                key: key.to_string(),
                value: value.to_string(),
            })
        }

        match key {
            "width" => self.width = parse(key, value)?,
            "height" => self.height = parse(key, value)?,
            "center_x" | "cx" => self.center_x = parse(key, value)?,
            "center_y" | "cy" => self.center_y = parse(key, value)?,
            "scale" => self.scale = parse(key, value)?,
            "decay" => self.decay = parse(key, value)?,
            "scale_floor" => self.scale_floor = parse(key, value)?,
            "passes" => self.passes = parse(key, value)?,
            "precision" => self.precision = parse(key, value)?,
            "backend" => self.backend = parse(key, value)?,
            "report_interval" => self.report_interval = parse(key, value)?,
            "threads" => self.threads = Some(parse(key, value)?),
            "headless_frames" => self.headless_frames = Some(parse(key, value)?),
            "paused" => self.paused = parse(key, value)?,
            _ => return Err(ConfigError::UnknownKey(key.to_string())),
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.width == 0 || self.height == 0 {
            return Err(ConfigError::OutOfRange("width and height must be non-zero"));
        }
        if !(self.center_x.is_finite() && self.center_y.is_finite()) {
            return Err(ConfigError::OutOfRange("center must be finite"));
        }
        if !(self.scale.is_finite() && self.scale > 0.0) {
            return Err(ConfigError::OutOfRange("scale must be positive"));
        }
        if !(self.decay > 0.0 && self.decay < 1.0) {
            return Err(ConfigError::OutOfRange("decay must be between 0 and 1"));
        }
        if !(self.scale_floor > 0.0 && self.scale_floor < self.scale) {
            return Err(ConfigError::OutOfRange("scale_floor must be positive and below scale"));
        }
        if self.passes == 0 {
            return Err(ConfigError::OutOfRange("passes must be non-zero"));
        }
        if self.threads == Some(0) {
            return Err(ConfigError::OutOfRange("threads must be non-zero"));
        }
        Ok(())
    }

    pub fn size(&self) -> screen::Size {
        screen::Size::new(self.width, self.height)
    }

    pub fn view_state(&self) -> ViewState {
        ViewState {
            center: (self.center_x, self.center_y),
            scale: self.scale,
            decay_factor: self.decay,
            paused: self.paused,
        }
    }

    pub fn threads(&self) -> usize {
        self.threads.unwrap_or_else(num_cpus::get)
    }
}

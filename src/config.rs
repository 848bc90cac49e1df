use anyhow::{Context, Result};
use faceswap_vision::model::LandmarkModelSpec;
use faceswap_vision::{SeamlessParams, Strategy, SwapOptions};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub static CONFIG_PATH: Lazy<&'static Path> = Lazy::new(|| {
    Path::new(option_env!("FACESWAP_CONFIG_PATH").unwrap_or("/usr/local/etc/faceswap/config.toml"))
});

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub strategy: Strategy,
    /// ONNX landmark regression model.
    pub landmark_model: PathBuf,
    pub landmark_input_size: u32,
    pub landmark_count: usize,
    pub landmark_margin: f32,
    /// Relative margin used by the border check.
    pub border_margin: f32,
    pub feather_divisor: f32,
    pub seamless_iterations: u32,
    pub seamless_tolerance: f32,
    /// Targets below this confidence are not swapped.
    pub detection_threshold: f32,
}

impl Default for Config {
    fn default() -> Self {
        let swap = SwapOptions::default();
        let model = LandmarkModelSpec::default();
        Self {
            strategy: swap.strategy,
            landmark_model: PathBuf::from("/usr/local/share/faceswap/landmarks.onnx"),
            landmark_input_size: model.input_size,
            landmark_count: model.points,
            landmark_margin: model.margin,
            border_margin: 0.1,
            feather_divisor: swap.feather_divisor,
            seamless_iterations: swap.seamless.iterations,
            seamless_tolerance: swap.seamless.tolerance,
            detection_threshold: 0.6,
        }
    }
}

impl Config {
    pub fn swap_options(&self) -> SwapOptions {
        SwapOptions {
            strategy: self.strategy,
            feather_divisor: self.feather_divisor,
            seamless: SeamlessParams {
                iterations: self.seamless_iterations,
                tolerance: self.seamless_tolerance,
            },
        }
    }

    pub fn landmark_spec(&self) -> LandmarkModelSpec {
        LandmarkModelSpec {
            input_size: self.landmark_input_size,
            points: self.landmark_count,
            margin: self.landmark_margin,
        }
    }
}

pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let path = path.unwrap_or(&CONFIG_PATH);
    if !path.exists() {
        return Ok(Config::default());
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading config at {}", path.display()))?;
    toml::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))
}

pub fn save_config(cfg: &Config, path: Option<&Path>) -> Result<()> {
    let path = path.unwrap_or(&CONFIG_PATH);
    let data = toml::to_string_pretty(cfg)?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, data)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let cfg: Config = toml::from_str("strategy = \"triangulated\"\nborder_margin = 0.25\n").unwrap();
        assert_eq!(cfg.strategy, Strategy::Triangulated);
        assert_eq!(cfg.border_margin, 0.25);
        assert_eq!(cfg.feather_divisor, 8.0);
        assert_eq!(cfg.landmark_count, 68);
    }

    #[test]
    fn test_swap_options_follow_config() {
        let cfg = Config {
            seamless_iterations: 42,
            feather_divisor: 4.0,
            ..Config::default()
        };
        let opts = cfg.swap_options();
        assert_eq!(opts.seamless.iterations, 42);
        assert_eq!(opts.feather_divisor, 4.0);
        assert_eq!(opts.strategy, Strategy::Affine);
    }
}

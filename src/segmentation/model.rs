use std::fmt;
use std::process::{Command, Stdio};

use serde::Deserialize;
use tracing::debug;

/// The four pretrained predictor sizes offered to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModelVariant {
    Tiny,
    Small,
    #[default]
    BasePlus,
    Large,
}

impl ModelVariant {
    pub const ALL: [ModelVariant; 4] = [
        ModelVariant::Tiny,
        ModelVariant::Small,
        ModelVariant::BasePlus,
        ModelVariant::Large,
    ];

    /// Identifier the predictor loads pretrained weights by.
    pub fn model_id(self) -> &'static str {
        match self {
            ModelVariant::Tiny => "facebook/sam2.1-hiera-tiny",
            ModelVariant::Small => "facebook/sam2.1-hiera-small",
            ModelVariant::BasePlus => "facebook/sam2.1-hiera-base-plus",
            ModelVariant::Large => "facebook/sam2.1-hiera-large",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            ModelVariant::Tiny => "SAM2 Tiny",
            ModelVariant::Small => "SAM2 Small",
            ModelVariant::BasePlus => "SAM2 Base+",
            ModelVariant::Large => "SAM2 Large",
        }
    }
}

impl fmt::Display for ModelVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl std::str::FromStr for ModelVariant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tiny" => Ok(ModelVariant::Tiny),
            "small" => Ok(ModelVariant::Small),
            "base-plus" | "base+" | "baseplus" => Ok(ModelVariant::BasePlus),
            "large" => Ok(ModelVariant::Large),
            other => ModelVariant::ALL
                .into_iter()
                .find(|variant| variant.model_id() == other)
                .ok_or_else(|| format!("unknown model '{}'", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceChoice {
    #[default]
    Auto,
    Cuda,
    Cpu,
}

impl DeviceChoice {
    pub const ALL: [DeviceChoice; 3] = [DeviceChoice::Auto, DeviceChoice::Cuda, DeviceChoice::Cpu];

    pub fn label(self) -> &'static str {
        match self {
            DeviceChoice::Auto => "Auto",
            DeviceChoice::Cuda => "CUDA",
            DeviceChoice::Cpu => "CPU",
        }
    }
}

impl std::str::FromStr for DeviceChoice {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(DeviceChoice::Auto),
            "cuda" | "gpu" => Ok(DeviceChoice::Cuda),
            "cpu" => Ok(DeviceChoice::Cpu),
            other => Err(format!("unknown device '{}'", other)),
        }
    }
}

/// Compute device handed to the predictor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Device {
    Cuda,
    Cpu,
}

impl Device {
    pub fn as_str(self) -> &'static str {
        match self {
            Device::Cuda => "cuda",
            Device::Cpu => "cpu",
        }
    }

    /// Resolves `auto` to the accelerator when one is visible, otherwise the CPU.
    pub fn resolve(choice: DeviceChoice) -> Self {
        match choice {
            DeviceChoice::Cuda => Device::Cuda,
            DeviceChoice::Cpu => Device::Cpu,
            DeviceChoice::Auto => {
                if accelerator_available() {
                    Device::Cuda
                } else {
                    Device::Cpu
                }
            }
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn accelerator_available() -> bool {
    let available = Command::new("nvidia-smi")
        .arg("-L")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(false);
    debug!("CUDA accelerator available: {}", available);
    available
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_map_to_pretrained_ids() {
        assert_eq!(ModelVariant::default(), ModelVariant::BasePlus);
        assert_eq!(
            ModelVariant::BasePlus.model_id(),
            "facebook/sam2.1-hiera-base-plus"
        );
        assert_eq!(ModelVariant::Tiny.to_string(), "SAM2 Tiny");
    }

    #[test]
    fn parses_short_names_and_ids() {
        assert_eq!("base+".parse::<ModelVariant>(), Ok(ModelVariant::BasePlus));
        assert_eq!("Large".parse::<ModelVariant>(), Ok(ModelVariant::Large));
        assert_eq!(
            "facebook/sam2.1-hiera-small".parse::<ModelVariant>(),
            Ok(ModelVariant::Small)
        );
        assert!("huge".parse::<ModelVariant>().is_err());
    }

    #[test]
    fn explicit_device_choice_wins() {
        assert_eq!(Device::resolve(DeviceChoice::Cpu), Device::Cpu);
        assert_eq!(Device::resolve(DeviceChoice::Cuda), Device::Cuda);
        assert_eq!("gpu".parse::<DeviceChoice>(), Ok(DeviceChoice::Cuda));
    }
}

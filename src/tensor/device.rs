//! Compute device placement for parameters

use serde::{Deserialize, Serialize};
use std::fmt;

/// Device a parameter lives on
///
/// Newly created tensors start on [`Device::Cpu`]; layers move their
/// parameters explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    /// Host memory
    #[default]
    Cpu,
    /// CUDA GPU with device ID
    Cuda { device_id: usize },
}

impl Device {
    /// Check if this device is CUDA
    #[must_use]
    pub const fn is_cuda(&self) -> bool {
        matches!(self, Self::Cuda { .. })
    }

    /// Check if this device is CPU
    #[must_use]
    pub const fn is_cpu(&self) -> bool {
        matches!(self, Self::Cpu)
    }

    /// Get device ID for CUDA devices
    #[must_use]
    pub const fn device_id(&self) -> Option<usize> {
        match self {
            Self::Cuda { device_id } => Some(*device_id),
            Self::Cpu => None,
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cpu => write!(f, "cpu"),
            Self::Cuda { device_id } => write!(f, "cuda:{device_id}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_cpu() {
        assert_eq!(Device::default(), Device::Cpu);
        assert!(Device::default().is_cpu());
    }

    #[test]
    fn test_cuda_device_id() {
        let dev = Device::Cuda { device_id: 1 };
        assert!(dev.is_cuda());
        assert_eq!(dev.device_id(), Some(1));
        assert_eq!(Device::Cpu.device_id(), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(Device::Cpu.to_string(), "cpu");
        assert_eq!(Device::Cuda { device_id: 3 }.to_string(), "cuda:3");
    }
}

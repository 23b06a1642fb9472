use std::fmt;
use std::io;
use std::process::Command;

use thiserror::Error;

/// Kernel driver matching the detected GPU vendor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GpuDriver {
    Nvidia,
    Amdgpu,
    Radeon,
    I915,
}

/// AMD model substrings new enough for the amdgpu kernel driver. Older
/// parts fall back to radeon.
const AMDGPU_MODELS: &[&str] = &[
    "Radeon HD 7",
    "Radeon HD 8",
    "Radeon R5",
    "Radeon R7",
    "Radeon R9",
    "Radeon RX",
];

#[derive(Debug, Error)]
pub enum GpuError {
    #[error("Unknown or unsupported GPU driver")]
    Unsupported,

    #[error("Failed to probe host hardware: {0}")]
    Probe(#[from] io::Error),
}

impl GpuDriver {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Nvidia => "nvidia",
            Self::Amdgpu => "amdgpu",
            Self::Radeon => "radeon",
            Self::I915 => "i915",
        }
    }
}

impl fmt::Display for GpuDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Detect the GPU driver for the host machine.
///
/// `nvidia-smi` is consulted before the PCI listing since NVIDIA devices
/// can be absent from `lspci` output inside VMs that still pass the
/// management interface through.
pub fn detect() -> Result<GpuDriver, GpuError> {
    if nvidia_smi_reports_device() {
        return Ok(GpuDriver::Nvidia);
    }

    let listing = pci_listing()?;
    from_listing(&listing)
}

/// Classify a PCI device listing. First match wins: NVIDIA, then AMD
/// (amdgpu or radeon by model generation), then Intel.
pub fn from_listing(listing: &str) -> Result<GpuDriver, GpuError> {
    if listing.contains("NVIDIA") {
        return Ok(GpuDriver::Nvidia);
    }

    if listing.contains("AMD") {
        let vga_entry = listing
            .lines()
            .find(|line| line.contains("VGA") && line.contains("AMD"))
            .unwrap_or("");

        if AMDGPU_MODELS.iter().any(|model| vga_entry.contains(model)) {
            return Ok(GpuDriver::Amdgpu);
        }
        return Ok(GpuDriver::Radeon);
    }

    if listing.contains("Intel") {
        return Ok(GpuDriver::I915);
    }

    Err(GpuError::Unsupported)
}

fn nvidia_smi_reports_device() -> bool {
    which::which("nvidia-smi")
        .ok()
        .and_then(|smi| Command::new(smi).arg("-L").output().ok())
        .map(|output| output.status.success())
        .unwrap_or(false)
}

fn pci_listing() -> Result<String, GpuError> {
    let output = Command::new("lspci").output().map_err(|err| {
        // A host without lspci is as undetectable as one without a GPU
        if err.kind() == io::ErrorKind::NotFound {
            GpuError::Unsupported
        } else {
            GpuError::Probe(err)
        }
    })?;

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

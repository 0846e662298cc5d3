use crate::core::{ClassifierError, ModelOptions, Result};
use candle_core::Device;
use std::fmt;

/// Open CUDA device `index`, or fail with a configuration error.
fn open_cuda(index: usize) -> Result<Device> {
    Device::new_cuda(index).map_err(|e| {
        ClassifierError::Configuration(format!("CUDA device {index} is not available: {e}"))
    })
}

/// Where the classifier should run its forward passes.
#[derive(Debug, Clone, Default)]
pub enum DeviceRequest {
    /// First CUDA device when one can be opened, CPU otherwise.
    #[default]
    Default,
    Cpu,
    /// A specific CUDA ordinal; fails instead of falling back.
    Cuda(usize),
    Explicit(Device),
}

impl DeviceRequest {
    pub fn resolve(self) -> Result<Device> {
        match self {
            DeviceRequest::Default => Ok(open_cuda(0).unwrap_or_else(|err| {
                tracing::debug!(%err, "falling back to CPU");
                Device::Cpu
            })),
            DeviceRequest::Cpu => Ok(Device::Cpu),
            DeviceRequest::Cuda(index) => open_cuda(index).inspect_err(|err| {
                tracing::warn!(%err, "requested CUDA device is unavailable");
            }),
            DeviceRequest::Explicit(device) => Ok(device),
        }
    }
}

impl fmt::Display for DeviceRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceRequest::Default => f.write_str("auto"),
            DeviceRequest::Cpu => f.write_str("cpu"),
            DeviceRequest::Cuda(index) => write!(f, "cuda:{index}"),
            DeviceRequest::Explicit(device) => write!(f, "{:?}", device.location()),
        }
    }
}

/// Device setters shared by builders that carry a [`DeviceRequest`].
pub trait DeviceSelectable: Sized {
    fn device_request_mut(&mut self) -> &mut DeviceRequest;

    /// Run on CPU even when CUDA is present.
    fn cpu(mut self) -> Self {
        *self.device_request_mut() = DeviceRequest::Cpu;
        self
    }

    fn cuda_device(mut self, index: usize) -> Self {
        *self.device_request_mut() = DeviceRequest::Cuda(index);
        self
    }

    fn device(mut self, device: Device) -> Self {
        *self.device_request_mut() = DeviceRequest::Explicit(device);
        self
    }
}

/// Key under which a model loaded from `source` onto `device` is cached.
/// The same checkpoint on two devices is two entries.
pub fn build_cache_key<O: ModelOptions>(source: &O, device: &Device) -> String {
    format!("{}@{:?}", source.cache_key(), device.location())
}

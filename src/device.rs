use candle_core::Device;
use tracing::{info, warn};

/// Picks the accelerator when one was compiled in and answers, otherwise the CPU.
pub fn select_device(force_cpu: bool) -> Device {
    if force_cpu {
        info!("CPU forced from the command line");
        return Device::Cpu;
    }

    #[cfg(feature = "cuda")]
    {
        match Device::new_cuda(0) {
            Ok(device) => return device,
            Err(e) => warn!("CUDA not available: {}, falling back to CPU", e),
        }
    }

    #[cfg(feature = "metal")]
    {
        match Device::new_metal(0) {
            Ok(device) => return device,
            Err(e) => warn!("Metal not available: {}, falling back to CPU", e),
        }
    }

    if !cfg!(any(feature = "cuda", feature = "metal")) {
        warn!("Built without accelerator support");
    }
    Device::Cpu
}

pub fn device_info(device: &Device) -> String {
    match device {
        Device::Cpu => "CPU".to_string(),
        Device::Cuda(_) => "CUDA".to_string(),
        Device::Metal(_) => "Metal".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forced_cpu_is_cpu() {
        let device = select_device(true);
        assert!(device.is_cpu());
        assert_eq!(device_info(&device), "CPU");
    }
}

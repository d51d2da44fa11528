use candle_core::Device;

/// Metal or CUDA when compiled in and available, CPU otherwise.
pub fn select_device() -> Device {
    #[cfg(feature = "metal")]
    {
        if let Ok(dev) = Device::new_metal(0) {
            tracing::info!("device: metal");
            return dev;
        }
    }
    #[cfg(feature = "cuda")]
    {
        if let Ok(dev) = Device::new_cuda(0) {
            tracing::info!("device: cuda");
            return dev;
        }
    }
    tracing::info!("device: cpu");
    Device::Cpu
}

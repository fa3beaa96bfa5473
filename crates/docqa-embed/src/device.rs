use candle_core::Device;

pub fn select_device() -> Device {
    #[cfg(feature = "metal")]
    {
        match Device::new_metal(0) {
            Ok(dev) => { tracing::info!("Embedding device: Metal (MPS)"); return dev; }
            Err(e) => tracing::warn!("Metal unavailable ({}), falling back to CPU", e),
        }
    }
    tracing::info!("Embedding device: CPU");
    Device::Cpu
}

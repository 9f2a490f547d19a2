pub mod audio;
pub mod volume;
#[cfg(feature = "device")]
pub mod device;

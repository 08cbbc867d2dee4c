//! Simulated instrument drivers implementing [`crate::dispatch::Dispatch`]
//! for each control kind named in the configuration (§3, §4.3).

pub mod autosampler;
pub mod buffer_task;
pub mod coflow;
pub mod exposure;
pub mod hplc;

pub use autosampler::AutosamplerDriver;
pub use coflow::CoflowDriver;
pub use exposure::ExposureDriver;
pub use hplc::HplcDriver;

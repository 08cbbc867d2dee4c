pub mod automator;
pub mod config;
pub mod instrument;
pub mod logging;
pub mod validate;

pub use automator::AutomatorConfig;
pub use config::BeamlineConfig;
pub use instrument::{InstrumentConfig, InstrumentKind};
pub use logging::{LogFormat, LoggingConfig};

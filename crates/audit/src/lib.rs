pub mod sink;
pub mod tracing_init;

pub use sink::*;
pub use tracing_init::init_tracing;

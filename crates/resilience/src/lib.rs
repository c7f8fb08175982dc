pub mod breaker;
pub mod idempotency;
pub mod incident;
pub mod lock;
pub mod ratelimit;

pub use breaker::*;
pub use idempotency::*;
pub use incident::*;
pub use lock::*;
pub use ratelimit::*;

pub(crate) fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system time is before UNIX epoch - clock error")
        .as_millis() as u64
}

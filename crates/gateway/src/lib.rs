pub mod adapter;
pub mod client;
pub mod webhook;

pub use adapter::*;
pub use client::*;
pub use webhook::*;

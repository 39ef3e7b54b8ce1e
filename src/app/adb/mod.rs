pub mod bridge;
pub mod client;
pub mod locator;
pub mod parse;
pub mod runner;

pub use bridge::{Device, DeviceBridge, ShellOutputReceiver};
pub use client::AdbBridge;

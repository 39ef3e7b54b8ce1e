pub mod adb;
pub mod config;
pub mod device;
pub mod error;
pub mod logging;
pub mod models;
pub mod profiler;
pub mod session;
pub mod shell;
pub mod state;
pub mod systrace;

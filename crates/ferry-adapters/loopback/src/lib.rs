//! # Ferry Loopback Adapter
//!
//! An in-process [`DeviceAdapter`](ferry_core::DeviceAdapter) whose devices
//! exist only in memory. It resolves every request on its own task, the same
//! way a radio-backed adapter would, which makes it the reference adapter for
//! tests and demos.
//!
//! ## Scripting
//!
//! | Hook | Reported as |
//! |---|---|
//! | [`fail_next`](LoopbackAdapter::fail_next) | the next matching request fails |
//! | [`inject`](LoopbackAdapter::inject) | receive done |
//! | [`inject_failure`](LoopbackAdapter::inject_failure) | receive failed |
//! | [`drop_session`](LoopbackAdapter::drop_session) | unexpected disconnect |
//! | [`request_connection`](LoopbackAdapter::request_connection) | connect requested + done |
//! | [`vanish`](LoopbackAdapter::vanish) | device disconnect done |
//! | [`report_fault`](LoopbackAdapter::report_fault) | communication error |
//!
//! With `echo` enabled (the default) every sent payload comes back as
//! inbound data on the same session.

pub mod adapter;
pub mod config;
mod world;

pub use adapter::{LoopbackAdapter, LoopbackAdapterBuilder};
pub use config::{DeviceConfig, LoopbackConfig};
pub use world::Operation;

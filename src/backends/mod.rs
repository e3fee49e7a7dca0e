//! Backend implementations.

pub mod aws;
pub mod kubectl;

#[cfg(feature = "mock")]
pub mod mock;

pub mod core;

#[cfg(feature = "host")]
pub mod host;

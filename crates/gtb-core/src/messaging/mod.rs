//! The update stream: typed inbound records plus the transport port the
//! poller drives.

pub mod port;
pub mod types;

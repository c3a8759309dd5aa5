//! The edge: a TCP accept loop feeding a per-connection handler that
//! gates requests through the auth module and forwards allowed ones to
//! the Registry's chosen Upstream.

mod master;
mod worker;

pub use master::Master;

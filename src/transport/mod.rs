//! Transport module - TCP listener and full-buffer framed channel.
//!
//! Provides:
//! - [`AgencyListener`] - bound TCP endpoint with a configured backlog
//! - [`FramedChannel`] - exact reads and complete writes over any stream

mod channel;
mod listener;

pub use channel::FramedChannel;
pub use listener::AgencyListener;

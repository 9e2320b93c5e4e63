//! Network-facing modules: capture channels, frame codecs, retransmission.

pub mod arp;
pub mod capture;
pub mod classify;
pub mod forward;

#[cfg(test)]
pub mod testutil;

pub use capture::{
    CaptureFilter, PacketCapture, PacketSender, PnetCapture, PnetSender, find_interface,
    interface_identity, open_capture,
};
pub use classify::{FrameSummary, TrafficKind, classify};

//! # RollCall Channels
//! Messaging transports.
//!
//! The bot reaches WhatsApp through an HTTP bridge that owns the web session
//! (QR pairing, reconnects). `whatsapp` is the outbound client, `webhook`
//! turns the bridge's event callbacks into typed events.

pub mod webhook;
pub mod whatsapp;

pub use webhook::parse_bridge_event;
pub use whatsapp::WhatsAppBridge;

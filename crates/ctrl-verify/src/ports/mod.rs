//! # Ports Layer
//!
//! - **Inbound (Driving)**: the verification and signing API the messenger calls.

pub mod inbound;

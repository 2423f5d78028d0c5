//! signassist: real-time touchless sign-language interaction engine.
//!
//! Turns per-frame hand landmarks into classified gestures, fingerspelled
//! words, mode switches, and pointer navigation, and sequences confirmed
//! translations into a transcript and speech.

pub mod backend;
pub mod config;
pub mod interaction;
pub mod recognition;
pub mod session;
pub mod sexp;
pub mod tracking;

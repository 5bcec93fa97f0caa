//! Core chat engine
//!
//! Everything in here runs on the single thread that drives ticks. Nothing
//! blocks and nothing is shared; the transport serializes input before it
//! gets here. The engine owns no I/O and only reports problems through
//! tracing.

pub mod audience;
pub mod delivery;
pub mod dialogue;
pub mod page_processor;
pub mod router;
pub mod scheduler;

pub use page_processor::{ChatPageProcessor, DialogueEvent};

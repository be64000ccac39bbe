//! Parsed HL7v2 message access
//!
//! A compact ER7 tokenizer plus typed views for the composite data types the
//! transform reads. It is intentionally permissive: structural rules (which
//! segments must appear and how often) belong to the transform, not the tokenizer.

pub mod datatypes;
pub mod message;

pub use datatypes::{Cx, Pl, Xcn, Xon, Xpn};
pub use message::{Delimiters, FieldValue, Hl7Error, Hl7Message, MessageType, Segment};

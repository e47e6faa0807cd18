//! H.264 elementary-stream demuxing
//!
//! Slices Annex-B byte streams into NAL units and applies emulation
//! prevention so downstream parsers never see a spurious start code.

pub mod extractor;

pub use extractor::{extract, strip_emulation_prevention, NalUnit, NalUnitType};

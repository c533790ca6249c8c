//! Descriptor file I/O (the "C7" component): a compact binary format for
//! round-tripping full precision, and a plain-text format compatible with
//! the Lowe/VisualSFM descriptor-file convention.

pub mod binary;
pub mod text;

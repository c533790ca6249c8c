//! In-crate test modules that need access to crate-internal items (the
//! shader registry) rather than only the public API exercised by
//! `tests/*.rs`.

mod shader_validation;

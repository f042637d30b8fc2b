//! Index structures for selector resolution

pub mod label_index;

pub use label_index::LabelIndex;

//! Cascading USD layer composition: a writer that serializes individual
//! layer files deterministically and a rebuilder that regenerates every
//! level of the hierarchy affected by a publish.

pub mod rebuilder;
pub mod writer;

pub use rebuilder::CompositionRebuilder;
pub use writer::LayerWriter;

//! Call-level and locus-level filter sets

pub mod call;
pub mod locus;

pub use call::CallFilter;
pub use locus::LocusFilter;

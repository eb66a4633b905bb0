//! The build IR and its lowering to a Dockerfile (§4.7).

pub mod builder;
pub mod lower;

pub use builder::{IrBuilder, IrDirective};
pub use lower::lower;

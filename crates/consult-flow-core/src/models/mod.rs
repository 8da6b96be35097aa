//! Domain models for the consultation workflow.

mod catalog;
mod consultation;
mod history;
mod vitals;

pub use catalog::*;
pub use consultation::*;
pub use history::*;
pub use vitals::*;

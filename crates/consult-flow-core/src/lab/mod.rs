//! Lab catalog lookup and lab status polling.

mod catalog;
mod poller;

pub use catalog::*;
pub use poller::*;

//! Calendar sync core logic

pub mod mapper;
pub mod ports;
pub mod reconcile;
pub mod window;

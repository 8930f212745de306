//! The order service actor: sole writer of the order snapshot.

mod service;


pub use service::*;

pub mod actor;
pub mod order;

pub use actor::*;
pub use order::*;

pub mod naming;
pub mod types;

pub use types::*;

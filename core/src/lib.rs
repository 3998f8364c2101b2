#![no_std]

extern crate alloc;

pub use cell::*;
pub use engine::*;
pub use error::*;
pub use snapshot::*;
pub use types::*;

mod cell;
mod engine;
mod error;
mod hint;
mod snapshot;
mod types;

#![doc = include_str!("../README.md")]

mod error;
mod observer;
mod pending;
mod pool;
mod report;
mod task;

pub use crate::error::*;
pub use crate::observer::*;
pub use crate::pending::*;
pub use crate::pool::*;
pub use crate::report::*;
pub use crate::task::*;

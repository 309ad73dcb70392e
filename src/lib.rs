pub mod error;
pub mod sm2;

pub use crate::error::{Error, Result};

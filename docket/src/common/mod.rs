//! Shared building blocks: the dynamic [Value] type, reserved names and
//! defaults, lock helpers and background task utilities.

mod constants;
mod value;
pub(crate) mod util;

pub use constants::*;
pub use util::*;
pub use value::*;

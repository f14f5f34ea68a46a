mod date_utils;
mod name_utils;
mod task_util;

pub use date_utils::*;
pub use name_utils::*;
pub use task_util::*;

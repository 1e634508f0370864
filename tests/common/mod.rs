#![allow(dead_code)]

pub use hopdag_test_utils::builders;
pub use hopdag_test_utils::{init_tracing, with_timeout};

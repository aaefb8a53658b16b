//! Execution support for store background work.

mod tasks;

pub(crate) use tasks::{Background, Work};

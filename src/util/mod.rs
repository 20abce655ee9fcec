//! Small shared utilities: record field paths and id generation.

pub mod ids;
pub mod path;

//! API handlers module

pub mod ask;
pub mod citation;
pub mod health;
pub mod history;

//! Database record structures and request types.

pub mod users;

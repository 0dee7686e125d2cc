//! Message-type dispatch: handler registration, per-request context and errors.

pub mod context;
pub mod errors;
pub mod registry;

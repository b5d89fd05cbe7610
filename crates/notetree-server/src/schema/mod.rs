//! API schema types for request/response definitions.
//!
//! Each sub-module defines the request and response types for one API
//! domain. Field names are camelCase on the wire.

pub mod nodes;
pub mod projects;
pub mod session;

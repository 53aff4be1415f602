//! Data Transfer Objects for REST request/response serialization.

pub mod command_dto;

pub use command_dto::*;

//! Test doubles for the nutrition service.

pub mod fake;
pub mod stub;

//! Domain layer containing business logic and domain types.
//!
//! # Module Organization
//!
//! - `foundation` - Shared domain primitives (value objects, IDs, errors)
//! - `licensing` - License lifecycle, correlation tokens and entitlement

pub mod foundation;
pub mod licensing;

//! Checkout policy engine.
//!
//! Pure logic only: the rule-set model and its JSON codec, the cart
//! validation and payment customization evaluators, and the editing
//! operations used by the admin surface. No database or HTTP dependencies.

pub mod error;
pub mod types;
pub mod validation;

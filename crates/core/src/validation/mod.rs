//! Checkout validation engine.
//!
//! Provides the rule-set model, two pure evaluators (cart validation and
//! payment customization), move-decision types for globally unique rules,
//! and the invariant-preserving rule-set editor.

pub mod cart;
pub mod conflict;
pub mod editor;
pub mod money;
pub mod payment;
pub mod rules;

pub mod checkout;
pub mod functions;
pub mod rule_sets;

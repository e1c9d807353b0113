pub mod rule_set;

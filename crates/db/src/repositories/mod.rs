pub mod rule_set_repo;

pub use rule_set_repo::RuleSetRepo;

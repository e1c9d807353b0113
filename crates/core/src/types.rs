/// Identifier of a validation function inside a shop's rule set (`fn_<millis>`).
pub type FunctionId = String;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

use serde::Serialize;

/// Public face of a registered user, as embedded in report reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserSummary {
    pub id: i64,
    pub name: String,
}

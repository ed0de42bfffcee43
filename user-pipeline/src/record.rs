use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

/// Opaque user identifier. Numeric and string ids are both accepted and
/// serialized back in the shape they came in.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(untagged)]
pub enum UserId {
    Number(Number),
    Text(String),
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserId::Number(n) => write!(f, "{}", n),
            UserId::Text(s) => f.write_str(s),
        }
    }
}

impl From<u64> for UserId {
    fn from(value: u64) -> Self {
        UserId::Number(value.into())
    }
}

impl From<&str> for UserId {
    fn from(value: &str) -> Self {
        UserId::Text(value.to_owned())
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct UserRecord {
    pub id: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Any other field on the record, passed through untouched.
    #[serde(flatten)]
    pub properties: Map<String, Value>,
}

impl UserRecord {
    pub fn new(id: impl Into<UserId>, email: Option<&str>) -> Self {
        Self {
            id: id.into(),
            email: email.map(String::from),
            properties: Map::new(),
        }
    }

    /// The email, if present and not empty.
    pub fn email(&self) -> Option<&str> {
        self.email.as_deref().filter(|email| !email.is_empty())
    }

    pub fn needs_enrichment(&self) -> bool {
        self.email().is_none()
    }

    /// The key two records are considered duplicates under. `None` until the
    /// record has a non-empty email.
    pub fn dedup_key(&self) -> Option<String> {
        self.email().map(normalize)
    }
}

/// Lowercase only: no trimming and no folding beyond case.
pub fn normalize(email: &str) -> String {
    email.to_lowercase()
}

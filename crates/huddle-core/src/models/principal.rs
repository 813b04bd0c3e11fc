//! Authenticated user profile and role model.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Role assigned to a dashboard user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Committee,
    Treasurer,
    Member,
    /// Any role string this client does not know about yet.
    #[serde(untagged)]
    Other(String),
}

impl Default for Role {
    fn default() -> Self {
        Role::Member
    }
}

/// Capability groups that pages and actions are gated on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub enum AccessGroup {
    /// Everyone, including anonymous visitors.
    All,
    /// Any signed-in user.
    Member,
    /// Committee members and officers.
    Committee,
    /// Income/expense management.
    Finance,
    Admin,
}

impl AccessGroup {
    /// Whether `role` belongs to this group.
    pub fn allows(&self, role: &Role) -> bool {
        match self {
            AccessGroup::All | AccessGroup::Member => true,
            AccessGroup::Committee => {
                matches!(role, Role::Admin | Role::Committee | Role::Treasurer)
            }
            AccessGroup::Finance => matches!(role, Role::Admin | Role::Treasurer),
            AccessGroup::Admin => matches!(role, Role::Admin),
        }
    }
}

/// The signed-in user's profile.
///
/// Fields the client does not model explicitly are preserved in `extra` so
/// a profile patch or a cache round trip never drops server data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "camelCase")]
pub struct Principal {
    #[serde(alias = "_id")]
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub role: Role,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(flatten)]
    #[cfg_attr(feature = "ts", ts(skip))]
    pub extra: Map<String, Value>,
}

impl Principal {
    /// Name to show in headers and menus, falling back to the email.
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .filter(|n| !n.is_empty())
            .or(self.email.as_deref())
            .unwrap_or(&self.id)
    }

    /// Shallow-merge a JSON object into this profile.
    ///
    /// Top-level keys in `patch` replace the existing values; nested objects
    /// are replaced, not merged. Fails if the patch is not an object or the
    /// merged result no longer describes a valid profile.
    pub fn merged(&self, patch: &Value) -> Result<Principal, serde_json::Error> {
        let patch = match patch {
            Value::Object(map) => map,
            other => {
                return Err(serde::de::Error::custom(format!(
                    "profile patch must be a JSON object, got {}",
                    other
                )))
            }
        };

        let mut current = match serde_json::to_value(self)? {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        for (key, value) in patch {
            current.insert(key.clone(), value.clone());
        }
        serde_json::from_value(Value::Object(current))
    }
}

/// Response body of sign-in, sign-up, federated sign-in and refresh.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthPayload {
    pub token: String,
    pub user: Principal,
}

//! Current-user model carried by every request context

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The authenticated user record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: u64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub role: Option<String>,
    /// Application-specific fields
    #[serde(default, flatten)]
    pub extra: Map<String, Value>,
}

impl AuthUser {
    pub fn new(id: u64, name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            email: email.into(),
            role: None,
            extra: Map::new(),
        }
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.role.as_deref() == Some(role)
    }
}

/// Who is making the request
#[derive(Debug, Clone, PartialEq, Default)]
pub enum CurrentUser {
    #[default]
    Anonymous,
    Authenticated(AuthUser),
}

impl CurrentUser {
    pub fn auth(&self) -> Option<&AuthUser> {
        match self {
            CurrentUser::Authenticated(user) => Some(user),
            CurrentUser::Anonymous => None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, CurrentUser::Authenticated(_))
    }

    pub fn id(&self) -> Option<u64> {
        self.auth().map(|user| user.id)
    }

    /// Template value: the user record or `null`
    pub fn to_value(&self) -> Value {
        match self {
            CurrentUser::Authenticated(user) => {
                serde_json::to_value(user).unwrap_or(Value::Null)
            }
            CurrentUser::Anonymous => Value::Null,
        }
    }
}

impl From<Option<AuthUser>> for CurrentUser {
    fn from(user: Option<AuthUser>) -> Self {
        user.map_or(CurrentUser::Anonymous, CurrentUser::Authenticated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extra_fields_round_trip_through_json() {
        let user: AuthUser = serde_json::from_value(json!({
            "id": 7,
            "name": "Sam",
            "email": "sam@example.com",
            "role": "admin",
            "team": "ops"
        }))
        .unwrap();

        assert!(user.has_role("admin"));
        assert_eq!(user.extra["team"], "ops");
        assert_eq!(CurrentUser::Authenticated(user).to_value()["team"], "ops");
    }

    #[test]
    fn test_anonymous_accessors() {
        let user = CurrentUser::default();
        assert!(!user.is_authenticated());
        assert_eq!(user.id(), None);
        assert_eq!(user.to_value(), Value::Null);
        assert_eq!(CurrentUser::from(None), CurrentUser::Anonymous);
    }
}

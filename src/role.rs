//! User roles and the acting user forwarded from the session boundary
use super::stage::{Level, parse_level};
use std::fmt;

const ROLE_PREFIX: &str = "ROLE_";

/// A user's role, always carried in its `ROLE_` prefixed form.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Role {
    Admin,
    Approver(Level),
    User,
    // e.g. ROLE_PARTY_NAME; kept verbatim, carries no approval authority
    Other(String),
}

impl Role {
    /// Normalise a free-form role string from the auth layer. Never fails:
    /// anything unrecognised becomes [`Role::Other`].
    pub fn normalize(raw: &str) -> Self {
        let upper = raw.trim().to_ascii_uppercase();
        let name = upper.strip_prefix(ROLE_PREFIX).unwrap_or(&upper);

        match name {
            "ADMIN" => Role::Admin,
            "USER" => Role::User,
            other => match parse_level(other) {
                Some(level) => Role::Approver(level),
                None => Role::Other(format!("{ROLE_PREFIX}{other}")),
            },
        }
    }

    pub fn approver(n: u8) -> Option<Self> {
        Level::new(n).map(Role::Approver)
    }

    /// The approval level this role corresponds to, if any.
    pub fn level(&self) -> Option<Level> {
        match self {
            Role::Approver(level) => Some(*level),
            _ => None,
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Role::Admin)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Admin => write!(f, "{ROLE_PREFIX}ADMIN"),
            Role::Approver(level) => write!(f, "{ROLE_PREFIX}{level}"),
            Role::User => write!(f, "{ROLE_PREFIX}USER"),
            Role::Other(name) => f.write_str(name),
        }
    }
}

impl From<&str> for Role {
    fn from(value: &str) -> Self {
        Role::normalize(value)
    }
}

/// The signed-in user on whose behalf an action is requested.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub user_id: String,
    pub name: String, // stamped on the record as the approver identity
    pub role: Role,
}

impl Actor {
    pub fn new(user_id: impl Into<String>, name: impl Into<String>, role: Role) -> Self {
        Self {
            user_id: user_id.into(),
            name: name.into(),
            role,
        }
    }
    /// Build an actor from raw session values.
    pub fn from_session(user_id: &str, name: &str, raw_role: &str) -> Self {
        Self::new(user_id, name, Role::normalize(raw_role))
    }
}

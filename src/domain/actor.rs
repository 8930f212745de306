use std::fmt;

use serde::{Deserialize, Serialize};

/// Role of whoever is asking for a change. Supplied by the caller, never
/// authenticated here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActorRole {
    Customer,
    Rider,
    Admin,
}

impl fmt::Display for ActorRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Customer => "customer",
            Self::Rider => "rider",
            Self::Admin => "admin",
        };
        f.write_str(name)
    }
}

/// The acting user behind a transition request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub role: ActorRole,
    pub id: String,
}

impl Actor {
    pub fn new(role: ActorRole, id: impl Into<String>) -> Self {
        Self { role, id: id.into() }
    }

    pub fn customer(id: impl Into<String>) -> Self {
        Self::new(ActorRole::Customer, id)
    }

    pub fn rider(id: impl Into<String>) -> Self {
        Self::new(ActorRole::Rider, id)
    }

    pub fn admin(id: impl Into<String>) -> Self {
        Self::new(ActorRole::Admin, id)
    }
}

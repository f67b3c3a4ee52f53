use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Client,
    Courier,
    Operator,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Client, Role::Courier, Role::Operator];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Client => "client",
            Role::Courier => "courier",
            Role::Operator => "operator",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "client" => Ok(Role::Client),
            "courier" => Ok(Role::Courier),
            "operator" => Ok(Role::Operator),
            other => Err(format!(
                "unknown role: {other}, expected client/courier/operator"
            )),
        }
    }
}

/// An authenticated caller, as resolved by the upstream identity provider.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Principal {
    pub id: Uuid,
    pub role: Role,
}

impl Principal {
    pub fn new(id: Uuid, role: Role) -> Self {
        Self { id, role }
    }

    pub fn client(id: Uuid) -> Self {
        Self::new(id, Role::Client)
    }

    pub fn courier(id: Uuid) -> Self {
        Self::new(id, Role::Courier)
    }

    pub fn operator(id: Uuid) -> Self {
        Self::new(id, Role::Operator)
    }

    pub fn is_operator(&self) -> bool {
        self.role == Role::Operator
    }
}

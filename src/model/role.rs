use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Operator roles carried in the access token as a numeric id.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin = 1,
    Staff = 2,
    Scanner = 3,
}

impl Role {
    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            1 => Some(Role::Admin),
            2 => Some(Role::Staff),
            3 => Some(Role::Scanner),
            _ => None,
        }
    }

    pub fn id(self) -> u8 {
        self as u8
    }
}

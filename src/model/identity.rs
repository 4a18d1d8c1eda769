use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

/// The two kinds of people that can be scanned.
#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize, ToSchema, Display, EnumString,
    AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum IdentityKind {
    Learner,
    Coach,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[schema(
    example = json!({
        "id": 1,
        "kind": "learner",
        "matricule": "APP-2026-0001",
        "first_name": "Awa",
        "last_name": "Diop",
        "email": "awa.diop@example.com",
        "cohort_id": 4,
        "active": true,
        "qr_payload": "{\"v\":1,\"kind\":\"learner\",\"matricule\":\"APP-2026-0001\",\"first_name\":\"Awa\",\"last_name\":\"Diop\"}",
        "created_at": "2026-01-05T08:00:00Z"
    })
)]
pub struct Identity {
    #[schema(example = 1)]
    pub id: u64,

    pub kind: IdentityKind,

    #[schema(example = "APP-2026-0001")]
    pub matricule: String,

    #[schema(example = "Awa")]
    pub first_name: String,

    #[schema(example = "Diop")]
    pub last_name: String,

    #[schema(example = "awa.diop@example.com", nullable = true)]
    pub email: Option<String>,

    /// Referential/promotion the identity belongs to
    #[schema(example = 4, nullable = true)]
    pub cohort_id: Option<u64>,

    pub active: bool,

    pub qr_payload: String,

    #[schema(example = "2026-01-05T08:00:00Z", format = "date-time", value_type = String)]
    pub created_at: DateTime<Utc>,
}

/// Insert payload; the store assigns `id`.
#[derive(Debug, Clone)]
pub struct NewIdentity {
    pub kind: IdentityKind,
    pub matricule: String,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub cohort_id: Option<u64>,
    pub qr_payload: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct IdentityFilter {
    pub kind: Option<IdentityKind>,
    pub cohort_id: Option<u64>,
    pub active: Option<bool>,
}

impl IdentityFilter {
    /// Identities expected to attend: active ones within the kind/cohort filter.
    pub fn expected(kind: Option<IdentityKind>, cohort_id: Option<u64>) -> Self {
        Self {
            kind,
            cohort_id,
            active: Some(true),
        }
    }

    pub fn matches(&self, identity: &Identity) -> bool {
        self.kind.is_none_or(|k| k == identity.kind)
            && self.cohort_id.is_none_or(|c| identity.cohort_id == Some(c))
            && self.active.is_none_or(|a| a == identity.active)
    }
}

use serde::{Deserialize, Serialize};

/// Flat projection of the submitted form. Created once by the parser and
/// never mutated afterwards; leads are not persisted anywhere.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeadInput {
    pub name: String,
    pub email: String,
    pub company: String,
    pub whatsapp: Option<String>,
    /// Honeypot field. Hidden in the UI, must stay empty.
    pub website: Option<String>,
    /// Client start timestamp in epoch ms, digits only.
    pub t0: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ValidationOutcome {
    Accepted {
        data: LeadInput,
        soft_warning: Option<String>,
    },
    Rejected {
        reason: String,
    },
}

/// Wire shape returned to the UI: `{ ok, message?, softWarning? }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadResult {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub soft_warning: Option<String>,
}

impl LeadResult {
    pub fn rejected(message: &str) -> Self {
        Self {
            ok: false,
            message: Some(message.to_string()),
            soft_warning: None,
        }
    }

    pub fn accepted(message: String, soft_warning: Option<String>) -> Self {
        Self {
            ok: true,
            message: Some(message),
            soft_warning,
        }
    }
}

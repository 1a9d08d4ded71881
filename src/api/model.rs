use crate::error::Outcome;
use crate::orchestrator::{CleanUpRequest, PresentRequest};
use crate::store::Targets;
use serde::{Deserialize, Serialize};

/// The body of a present call: a lego `httpreq` RAW message extended with the DNS targets the
/// domain should point at. Empty target strings mean absent.
#[derive(Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub(super) struct PresentMessage {
    pub domain: String,
    pub token: String,
    #[serde(rename = "keyAuth")]
    pub key_auth: String,
    #[serde(rename = "dnstarget_a", default)]
    pub target_a: String,
    #[serde(rename = "dnstarget_aaaa", default)]
    pub target_aaaa: String,
    #[serde(rename = "dnstarget_cname", default)]
    pub target_cname: String,
}

impl From<PresentMessage> for PresentRequest {
    fn from(msg: PresentMessage) -> Self {
        let targets = Targets::from_fields(&msg.target_a, &msg.target_aaaa, &msg.target_cname);
        PresentRequest {
            domain: msg.domain,
            token: msg.token,
            key_auth: msg.key_auth,
            targets,
        }
    }
}

/// The body of a clean-up call: a lego `httpreq` RAW message.
#[derive(Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub(super) struct CleanUpMessage {
    pub domain: String,
    pub token: String,
    #[serde(rename = "keyAuth")]
    pub key_auth: String,
}

impl From<CleanUpMessage> for CleanUpRequest {
    fn from(msg: CleanUpMessage) -> Self {
        CleanUpRequest {
            domain: msg.domain,
            token: msg.token,
            key_auth: msg.key_auth,
        }
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub(super) struct CreatePrincipalMessage {
    pub name: String,
    pub secret: String,
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub(super) struct OutcomeResult {
    pub outcome: Outcome,
}

impl OutcomeResult {
    pub fn success() -> Self {
        Self {
            outcome: Outcome::Success,
        }
    }
}

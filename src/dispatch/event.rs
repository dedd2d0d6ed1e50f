//! Gerrit stream-events payloads.
//!
//! Only `patchset-created` is modelled; every other event type decodes to
//! [`StreamEvent::Other`]. Older Gerrit versions send change and patch set
//! numbers as strings, newer ones as numbers; both are accepted.

use serde::{Deserialize, Deserializer};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum StreamEvent {
    PatchsetCreated(PatchsetCreated),
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchsetCreated {
    pub change: Change,
    pub patch_set: PatchSet,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Change {
    pub project: String,
    pub branch: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(deserialize_with = "number")]
    pub number: u64,
    #[serde(default)]
    pub owner: Option<Account>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Account {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PatchSet {
    #[serde(deserialize_with = "number")]
    pub number: u64,
    /// Fetchable ref, e.g. `refs/changes/00/100/1`.
    #[serde(rename = "ref")]
    pub git_ref: String,
    #[serde(default)]
    pub revision: Option<String>,
}

fn number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumberOrString {
        Number(u64),
        String(String),
    }

    match NumberOrString::deserialize(deserializer)? {
        NumberOrString::Number(n) => Ok(n),
        NumberOrString::String(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

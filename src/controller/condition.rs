//! Status conditions
//!
//! A condition records the last known state of one aspect of a resource.
//! `ConditionType` names a condition and knows how to stamp it onto any status
//! implementing `Conditioned`.

use crate::error::Error;
use serde::{Deserialize, Serialize};

/// A single status condition
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(rename = "type")]
    pub type_: String,
    /// "True", "False" or "Unknown"
    pub status: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_update_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<String>,
}

/// Status types carrying a list of conditions
pub trait Conditioned {
    fn conditions(&self) -> &[Condition];
    fn conditions_mut(&mut self) -> &mut Vec<Condition>;
}

/// Name of a condition, e.g. `Ready` or `Applied`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConditionType(String);

impl ConditionType {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }

    pub fn get<'a, S: Conditioned>(&self, status: &'a S) -> Option<&'a Condition> {
        status.conditions().iter().find(|c| c.type_ == self.0)
    }

    fn find_or_create<'a, S: Conditioned>(&self, status: &'a mut S) -> &'a mut Condition {
        let conditions = status.conditions_mut();
        let idx = match conditions.iter().position(|c| c.type_ == self.0) {
            Some(idx) => idx,
            None => {
                conditions.push(Condition {
                    type_: self.0.clone(),
                    ..Default::default()
                });
                conditions.len() - 1
            }
        };
        &mut conditions[idx]
    }

    fn set_status<S: Conditioned>(&self, status: &mut S, value: &str) {
        let cond = self.find_or_create(status);
        if cond.status != value {
            cond.status = value.to_string();
            cond.last_transition_time = Some(now());
        }
    }

    pub fn set_true<S: Conditioned>(&self, status: &mut S) {
        self.set_status(status, "True");
    }

    pub fn set_false<S: Conditioned>(&self, status: &mut S) {
        self.set_status(status, "False");
    }

    pub fn set_unknown<S: Conditioned>(&self, status: &mut S) {
        self.set_status(status, "Unknown");
    }

    pub fn is_true<S: Conditioned>(&self, status: &S) -> bool {
        self.get(status).is_some_and(|c| c.status == "True")
    }

    pub fn is_false<S: Conditioned>(&self, status: &S) -> bool {
        self.get(status).is_some_and(|c| c.status == "False")
    }

    pub fn set_message<S: Conditioned>(&self, status: &mut S, message: &str) {
        self.find_or_create(status).message = message.to_string();
    }

    pub fn set_reason<S: Conditioned>(&self, status: &mut S, reason: &str) {
        self.find_or_create(status).reason = reason.to_string();
    }

    /// Record the outcome of a handler run
    ///
    /// `None` marks the condition true with an empty message. An error marks it
    /// false, stores the error text, and uses `reason` (or "Error" when empty).
    pub fn set_error<S: Conditioned>(&self, status: &mut S, reason: &str, err: Option<&Error>) {
        match err {
            None => {
                self.set_true(status);
                self.set_message(status, "");
                self.set_reason(status, reason);
            }
            Some(err) => {
                let reason = if reason.is_empty() { "Error" } else { reason };
                self.set_false(status);
                self.set_message(status, &err.to_string());
                self.set_reason(status, reason);
            }
        }
    }

    /// Stamp the last update time
    pub fn last_updated<S: Conditioned>(&self, status: &mut S, timestamp: &str) {
        self.find_or_create(status).last_update_time = Some(timestamp.to_string());
    }
}

impl From<&str> for ConditionType {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

fn now() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}

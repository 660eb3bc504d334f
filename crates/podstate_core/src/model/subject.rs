//! Authenticated subject identity.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Opaque id of the authenticated identity; scopes all record access.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubjectId(String);

impl SubjectId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for SubjectId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// How the current session was established.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignInMethod {
    Anonymous,
    CustomToken,
}

impl SignInMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Anonymous => "anonymous",
            Self::CustomToken => "custom_token",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "anonymous" => Some(Self::Anonymous),
            "custom_token" => Some(Self::CustomToken),
            _ => None,
        }
    }
}

/// An established sign-in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub subject_id: SubjectId,
    pub method: SignInMethod,
}

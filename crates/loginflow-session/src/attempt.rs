//! Login attempts and credential rejections.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Field name → first validation message reported for that field.
pub type FieldErrors = BTreeMap<String, String>;

// ---------------------------------------------------------------------------
// Credentials
// ---------------------------------------------------------------------------

/// A submitted username/password pair.
///
/// `Debug` never prints the password.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    username: String,
    password: String,
}

impl Credentials {
    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    /// Both fields non-empty.
    pub fn is_complete(&self) -> bool {
        !self.username.is_empty() && !self.password.is_empty()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

// ---------------------------------------------------------------------------
// SessionAttempt
// ---------------------------------------------------------------------------

/// One login submission.
///
/// Holds the credentials only until the attempt resolves. The workflow
/// takes them out for the token exchange and discards whatever is left on
/// every exit path, so an attempt handed back to a caller never carries a
/// password.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionAttempt {
    credentials: Option<Credentials>,
    /// Set when the attempt failed without per-field detail.
    pub attempt_failed: bool,
    /// Per-field messages from a field-specific rejection.
    pub field_errors: FieldErrors,
}

impl SessionAttempt {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            credentials: Some(Credentials {
                username: username.into(),
                password: password.into(),
            }),
            attempt_failed: false,
            field_errors: FieldErrors::new(),
        }
    }

    /// Both fields present and non-empty.
    pub fn is_complete(&self) -> bool {
        self.credentials.as_ref().is_some_and(Credentials::is_complete)
    }

    pub fn has_credentials(&self) -> bool {
        self.credentials.is_some()
    }

    pub fn take_credentials(&mut self) -> Option<Credentials> {
        self.credentials.take()
    }

    pub fn discard_credentials(&mut self) {
        self.credentials = None;
    }

    /// Reset the form state and mark the attempt as failed.
    pub fn reject_input(&mut self) {
        self.discard_credentials();
        self.field_errors.clear();
        self.attempt_failed = true;
    }

    /// Apply a credential rejection to this attempt.
    ///
    /// Field-specific rejections fill [`field_errors`](Self::field_errors);
    /// anything else resets the attempt like [`reject_input`](Self::reject_input).
    pub fn apply_rejection(&mut self, rejection: &CredentialRejection) -> RejectionKind {
        self.discard_credentials();
        let kind = rejection.classify();
        match &kind {
            RejectionKind::FieldSpecific(errors) => {
                self.field_errors = errors.clone();
                self.attempt_failed = false;
            }
            RejectionKind::Generic => self.reject_input(),
        }
        kind
    }
}

// ---------------------------------------------------------------------------
// CredentialRejection
// ---------------------------------------------------------------------------

/// Messages for one key of a rejection payload: a bare string or a list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Messages {
    One(String),
    Many(Vec<String>),
}

impl Messages {
    /// The first non-empty message, if any.
    pub fn first(&self) -> Option<&str> {
        match self {
            Self::One(m) => Some(m.as_str()),
            Self::Many(list) => list.first().map(String::as_str),
        }
        .filter(|m| !m.is_empty())
    }
}

/// The body of a rejected token request.
///
/// Deserializes straight from the token endpoint's error payload:
///
/// ```json
/// { "non_field_errors": [], "password": ["This field may not be blank."] }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialRejection {
    /// Messages not tied to a field ("Unable to log in ...").
    #[serde(default)]
    pub non_field_errors: Vec<String>,
    /// A single generic message some endpoints send instead.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// Every other key: per-field messages.
    #[serde(flatten)]
    pub fields: BTreeMap<String, Messages>,
}

/// How a rejection should be presented.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectionKind {
    /// Show each message next to its field.
    FieldSpecific(FieldErrors),
    /// Reset the form and flag the attempt as failed.
    Generic,
}

impl CredentialRejection {
    /// Rejection with per-field messages only.
    pub fn for_fields<I, K, V>(fields: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            fields: fields
                .into_iter()
                .map(|(k, v)| (k.into(), Messages::Many(vec![v.into()])))
                .collect(),
            ..Self::default()
        }
    }

    /// Rejection with one generic message.
    pub fn generic(message: impl Into<String>) -> Self {
        Self {
            non_field_errors: vec![message.into()],
            ..Self::default()
        }
    }

    /// The first message that is not tied to a field.
    pub fn generic_message(&self) -> Option<&str> {
        self.non_field_errors
            .iter()
            .map(String::as_str)
            .find(|m| !m.is_empty())
            .or_else(|| self.detail.as_deref().filter(|m| !m.is_empty()))
    }

    /// Each field mapped to its first message. Fields without a message
    /// are left out.
    pub fn first_field_messages(&self) -> FieldErrors {
        self.fields
            .iter()
            .filter_map(|(field, messages)| {
                messages.first().map(|m| (field.clone(), m.to_string()))
            })
            .collect()
    }

    /// An empty `non_field_errors` list means "no generic message"; the
    /// rejection is field-specific as long as some field has a message.
    pub fn classify(&self) -> RejectionKind {
        if self.generic_message().is_none() {
            let fields = self.first_field_messages();
            if !fields.is_empty() {
                return RejectionKind::FieldSpecific(fields);
            }
        }
        RejectionKind::Generic
    }
}

//! Wire shapes of the Airtable REST API.

use coachsync_core::external::{ExternalRecord, FieldMap};
use serde::{Deserialize, Serialize};

/// Body of a create or partial-update request.
#[derive(Debug, Serialize)]
pub(crate) struct WriteRecordRequest<'a> {
    pub fields: &'a FieldMap,
    /// Lets Airtable coerce strings into dates, selects and links.
    pub typecast: bool,
}

/// One page of a list request.
#[derive(Debug, Deserialize)]
pub(crate) struct ListRecordsResponse {
    pub records: Vec<ExternalRecord>,
    /// Cursor for the next page; absent on the last page.
    #[serde(default)]
    pub offset: Option<String>,
}

/// Error envelope, either `{"error": {"type", "message"}}` or
/// `{"error": "NOT_FOUND"}`.
#[derive(Debug, Deserialize)]
pub(crate) struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum ErrorDetail {
    Typed {
        #[serde(rename = "type")]
        kind: String,
        #[serde(default)]
        message: Option<String>,
    },
    Code(String),
}

impl ErrorDetail {
    pub(crate) fn describe(&self) -> String {
        match self {
            Self::Typed {
                kind,
                message: Some(message),
            } => format!("{kind}: {message}"),
            Self::Typed { kind, message: None } => kind.clone(),
            Self::Code(code) => code.clone(),
        }
    }
}

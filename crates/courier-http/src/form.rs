use axum::{
    extract::{FromRequest, Multipart, Request},
    http::header,
    Form,
};
use serde::Deserialize;

use courier_core::{
    domain::TargetKind,
    errors::Error,
    messages::{parse_lines, parse_upload},
    tasks::Recipients,
};

use crate::error::ApiError;

pub const FILE_FIELD: &str = "messageFile";
pub const CONTACTS_FIELD: &str = "contactsFile";
const DEFAULT_DELAY_SECS: u64 = 1;

/// Fields of a bulk-send submission, from either a multipart or urlencoded body.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageForm {
    pub number: Option<String>,
    pub target: Option<String>,
    pub target_type: Option<String>,
    pub delay_sec: Option<String>,
    pub input_method: Option<String>,
    pub direct_messages: Option<String>,
    /// Newline-separated phone numbers; replaces `target` when present.
    pub contacts: Option<String>,
    #[serde(skip)]
    pub message_file: Option<Vec<u8>>,
    #[serde(skip)]
    pub contacts_file: Option<Vec<u8>>,
}

impl SendMessageForm {
    pub async fn from_request(req: Request) -> Result<Self, ApiError> {
        let is_multipart = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.starts_with("multipart/form-data"));

        if is_multipart {
            let multipart = Multipart::from_request(req, &())
                .await
                .map_err(|e| ApiError::Rejected(e.status(), e.body_text()))?;
            Self::from_multipart(multipart).await
        } else {
            let Form(form) = Form::<SendMessageForm>::from_request(req, &())
                .await
                .map_err(|e| ApiError::Rejected(e.status(), e.body_text()))?;
            Ok(form)
        }
    }

    async fn from_multipart(mut multipart: Multipart) -> Result<Self, ApiError> {
        let mut form = SendMessageForm::default();
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| ApiError::Rejected(e.status(), e.body_text()))?
        {
            let name = field.name().unwrap_or_default().to_string();
            if name == FILE_FIELD || name == CONTACTS_FIELD {
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::Rejected(e.status(), e.body_text()))?
                    .to_vec();
                if name == FILE_FIELD {
                    form.message_file = Some(bytes);
                } else {
                    form.contacts_file = Some(bytes);
                }
                continue;
            }
            let value = field
                .text()
                .await
                .map_err(|e| ApiError::Rejected(e.status(), e.body_text()))?;
            match name.as_str() {
                "number" => form.number = Some(value),
                "target" => form.target = Some(value),
                "targetType" => form.target_type = Some(value),
                "delaySec" => form.delay_sec = Some(value),
                "inputMethod" => form.input_method = Some(value),
                "directMessages" => form.direct_messages = Some(value),
                "contacts" => form.contacts = Some(value),
                _ => {}
            }
        }
        Ok(form)
    }

    pub fn is_direct(&self) -> bool {
        self.input_method.as_deref().map(str::trim) == Some("direct")
    }

    /// Resolve the ordered message list. The uploaded file is read in memory only.
    pub fn messages(&self) -> Result<Vec<String>, ApiError> {
        let messages = if self.is_direct() {
            let text = self.direct_messages.as_deref().unwrap_or_default();
            if text.trim().is_empty() {
                return Err(Error::InvalidRequest("direct messages text is required".into()).into());
            }
            parse_lines(text)
        } else {
            let Some(bytes) = self.message_file.as_deref() else {
                return Err(Error::InvalidRequest(
                    "message file is required when using file input method".into(),
                )
                .into());
            };
            parse_upload(bytes)
        };

        if messages.is_empty() {
            return Err(Error::EmptyMessageSet.into());
        }
        Ok(messages)
    }

    /// A contact list (uploaded file first, then the `contacts` text) or the single target.
    pub fn recipients(&self) -> Result<Recipients, ApiError> {
        let contacts = match (&self.contacts_file, &self.contacts) {
            (Some(bytes), _) => Some(parse_upload(bytes)),
            (None, Some(text)) if !text.trim().is_empty() => Some(parse_lines(text)),
            _ => None,
        };
        if let Some(contacts) = contacts {
            if contacts.is_empty() {
                return Err(Error::InvalidRequest("contact list is empty".into()).into());
            }
            return Ok(Recipients::Contacts(contacts));
        }

        let target = required(self.target.as_deref(), "target")?;
        let kind: TargetKind = self.target_type.as_deref().unwrap_or_default().parse()?;
        Ok(Recipients::Target { target, kind })
    }

    /// Unparseable or missing delays fall back to the minimum.
    pub fn delay_secs(&self) -> u64 {
        self.delay_sec
            .as_deref()
            .and_then(|v| v.trim().parse::<u64>().ok())
            .unwrap_or(DEFAULT_DELAY_SECS)
    }
}

pub fn required(value: Option<&str>, field: &str) -> Result<String, ApiError> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => Err(Error::InvalidRequest(format!("{field} is required")).into()),
    }
}

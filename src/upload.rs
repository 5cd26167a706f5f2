//! Multipart document intake shared by the create-with-documents and upload
//! endpoints.

use axum::extract::Multipart;
use serde_json::{Map, Value};

use crate::error::{AppError, FieldError};
use crate::validation::parse_schema;
use crate::validation::schemas::{has_allowed_extension, UploadDocument};

/// MIME types accepted regardless of the file extension.
pub const ALLOWED_MIME_TYPES: &[&str] = &[
    "application/pdf",
    "text/plain",
    "text/markdown",
    "application/msword",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    "text/csv",
    "application/json",
];

const INVALID_TYPE: &str =
    "Invalid file type. Only PDF, TXT, MD, DOC, DOCX, CSV, and JSON files are allowed.";

#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub filename: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

/// Text fields and file parts of a multipart form.
#[derive(Debug, Default)]
pub struct UploadForm {
    pub fields: Map<String, Value>,
    pub files: Vec<UploadedFile>,
}

/// Drain a multipart body. Parts with a filename are files; the rest are
/// text fields. Every file is checked before anything is returned.
pub async fn read_form(mut multipart: Multipart, max_file_size: usize) -> Result<UploadForm, AppError> {
    let mut form = UploadForm::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("Malformed multipart body: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match field.file_name().map(ToString::to_string) {
            Some(filename) => {
                let mime_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::BadRequest(format!("Failed to read upload: {e}")))?;
                form.files.push(UploadedFile {
                    filename,
                    mime_type,
                    bytes: bytes.to_vec(),
                });
            }
            None => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| AppError::BadRequest(format!("Failed to read field {name}: {e}")))?;
                form.fields.insert(name, Value::String(text));
            }
        }
    }

    for (index, file) in form.files.iter().enumerate() {
        check_file(index, file, max_file_size)?;
    }
    Ok(form)
}

/// A file passes when its MIME type or its extension is on the allow list
/// and its size is within bounds.
pub fn check_file(index: usize, file: &UploadedFile, max_file_size: usize) -> Result<(), AppError> {
    let mime_ok = ALLOWED_MIME_TYPES.contains(&file.mime_type.as_str());
    if !mime_ok && !has_allowed_extension(&file.filename) {
        return Err(AppError::BadRequest(INVALID_TYPE.into()));
    }

    let raw = serde_json::json!({
        "filename": file.filename,
        "fileSize": file.bytes.len(),
    });
    let mut details = match parse_schema::<UploadDocument>(raw) {
        Ok(_) => Vec::new(),
        Err(AppError::Validation(details)) => details
            .into_iter()
            // The extension rule is satisfied by an allowed MIME type.
            .filter(|d| !(mime_ok && d.field == "filename" && d.code == "invalid_string"))
            .collect(),
        Err(other) => return Err(other),
    };

    if file.bytes.len() > max_file_size && !details.iter().any(|d| d.field == "fileSize") {
        details.push(FieldError::new(
            "fileSize",
            format!("File size must be at most {max_file_size} bytes"),
            "too_big",
        ));
    }

    if details.is_empty() {
        return Ok(());
    }
    Err(AppError::Validation(
        details
            .into_iter()
            .map(|d| FieldError::new(format!("files.{index}.{}", d.field), d.message, d.code))
            .collect(),
    ))
}

/// Turn multipart text fields into the JSON shape the chatbot schemas expect.
/// `metadata` and `allowedDomains` may arrive JSON-encoded; `allowedDomains`
/// may also be comma separated; `isEmbeddable` is a boolean string.
pub fn fields_to_json(fields: Map<String, Value>) -> Value {
    let mut out = Map::new();
    for (key, value) in fields {
        let Value::String(text) = value else {
            out.insert(key, value);
            continue;
        };
        let converted = match key.as_str() {
            "metadata" => serde_json::from_str(&text).unwrap_or(Value::String(text)),
            "allowedDomains" => match serde_json::from_str::<Vec<String>>(&text) {
                Ok(list) => Value::from(list),
                Err(_) => Value::from(
                    text.split(',')
                        .map(str::trim)
                        .filter(|d| !d.is_empty())
                        .map(ToString::to_string)
                        .collect::<Vec<_>>(),
                ),
            },
            "isEmbeddable" => match text.trim() {
                "true" => Value::Bool(true),
                "false" => Value::Bool(false),
                _ => Value::String(text),
            },
            _ => Value::String(text),
        };
        out.insert(key, converted);
    }
    Value::Object(out)
}

//! Request schemas for chatbot, chat, upload and paging inputs.
//!
//! String fields are trimmed before length checks run. A missing required key
//! is reported as `invalid_type` "Required"; a present but empty one fails its
//! length rule.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use validator::{Validate, ValidationError};

use super::{issue, require, Schema};
use crate::error::FieldError;

pub const MAX_UPLOAD_BYTES: i64 = 16 * 1024 * 1024;
pub const ALLOWED_EXTENSIONS: &[&str] = &["pdf", "txt", "md", "doc", "docx", "csv", "json"];

// ---------------------------------------------------------------------------
// Path parameters
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ChatbotIdParams {
    #[serde(default)]
    #[validate(custom(function = "check_chatbot_id"))]
    pub chatbot_id: String,
}

impl Schema for ChatbotIdParams {
    const FIELDS: &'static [&'static str] = &["chatbotId"];
}

fn check_chatbot_id(id: &str) -> Result<(), ValidationError> {
    if id.is_empty() {
        return Err(issue("too_small", "Chatbot ID is required"));
    }
    if id.len() != 24 || !id.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(issue("invalid_string", "Invalid chatbot ID format"));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Chatbot bodies
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateChatbot {
    #[serde(default)]
    #[validate(custom(function = "check_name"))]
    pub name: String,
    #[serde(default)]
    #[validate(custom(function = "check_description"))]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(custom(function = "check_system_prompt"))]
    pub system_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(custom(function = "check_domains"))]
    pub allowed_domains: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_embeddable: Option<bool>,
}

const CHATBOT_FIELDS: &[&str] = &[
    "name",
    "description",
    "systemPrompt",
    "metadata",
    "allowedDomains",
    "isEmbeddable",
];

impl Schema for CreateChatbot {
    const FIELDS: &'static [&'static str] = CHATBOT_FIELDS;

    fn check_raw(raw: &Value) -> Vec<FieldError> {
        require(raw, &["name", "description"])
    }

    fn normalize(&mut self) {
        trim_in_place(&mut self.name);
        trim_in_place(&mut self.description);
        trim_opt(&mut self.system_prompt);
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
#[serde(rename_all = "camelCase")]
#[validate(schema(function = "check_update_not_empty"))]
pub struct UpdateChatbot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(custom(function = "check_name"))]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(custom(function = "check_description"))]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(custom(function = "check_system_prompt"))]
    pub system_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(custom(function = "check_domains"))]
    pub allowed_domains: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_embeddable: Option<bool>,
}

impl Schema for UpdateChatbot {
    const FIELDS: &'static [&'static str] = CHATBOT_FIELDS;

    fn normalize(&mut self) {
        trim_opt(&mut self.name);
        trim_opt(&mut self.description);
        trim_opt(&mut self.system_prompt);
    }
}

fn check_update_not_empty(update: &UpdateChatbot) -> Result<(), ValidationError> {
    let any = update.name.is_some()
        || update.description.is_some()
        || update.system_prompt.is_some()
        || update.metadata.is_some()
        || update.allowed_domains.is_some()
        || update.is_embeddable.is_some();
    if any {
        Ok(())
    } else {
        Err(issue("custom", "At least one field must be provided for update"))
    }
}

fn check_name(name: &str) -> Result<(), ValidationError> {
    bounded(name, 1, 100, "Name is required", "Name must be less than 100 characters")
}

fn check_description(description: &str) -> Result<(), ValidationError> {
    bounded(
        description,
        1,
        500,
        "Description is required",
        "Description must be less than 500 characters",
    )
}

fn check_system_prompt(prompt: &str) -> Result<(), ValidationError> {
    bounded(prompt, 0, 1000, "", "System prompt must be less than 1000 characters")
}

fn check_domains(domains: &[String]) -> Result<(), ValidationError> {
    if domains.iter().any(|d| d.is_empty()) {
        return Err(issue("too_small", "Domain cannot be empty"));
    }
    Ok(())
}

/// Body of the add/remove whitelist entry endpoints.
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct DomainEntry {
    #[serde(default)]
    #[validate(custom(function = "check_domain"))]
    pub domain: String,
}

impl Schema for DomainEntry {
    const FIELDS: &'static [&'static str] = &["domain"];

    fn check_raw(raw: &Value) -> Vec<FieldError> {
        require(raw, &["domain"])
    }

    fn normalize(&mut self) {
        trim_in_place(&mut self.domain);
    }
}

fn check_domain(domain: &str) -> Result<(), ValidationError> {
    bounded(domain, 1, 253, "Domain is required", "Domain must be less than 253 characters")
}

// ---------------------------------------------------------------------------
// Chat and vector bodies
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    #[serde(default)]
    #[validate(custom(function = "check_message"))]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default)]
    pub stream: bool,
}

impl Schema for ChatMessage {
    const FIELDS: &'static [&'static str] = &["message", "userId", "stream"];

    fn check_raw(raw: &Value) -> Vec<FieldError> {
        require(raw, &["message"])
    }

    fn normalize(&mut self) {
        trim_in_place(&mut self.message);
    }
}

fn check_message(message: &str) -> Result<(), ValidationError> {
    bounded(message, 1, 5000, "Message is required", "Message must be less than 5000 characters")
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct VectorQuery {
    #[serde(default)]
    #[validate(custom(function = "check_query"))]
    pub query: String,
    #[serde(default = "default_top_k")]
    #[validate(custom(function = "check_top_k"))]
    pub top_k: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<Map<String, Value>>,
}

impl Schema for VectorQuery {
    const FIELDS: &'static [&'static str] = &["query", "topK", "filter"];

    fn check_raw(raw: &Value) -> Vec<FieldError> {
        require(raw, &["query"])
    }

    fn normalize(&mut self) {
        trim_in_place(&mut self.query);
    }
}

fn default_top_k() -> i64 {
    5
}

fn check_query(query: &str) -> Result<(), ValidationError> {
    bounded(query, 1, 1000, "Query is required", "Query must be less than 1000 characters")
}

fn check_top_k(top_k: i64) -> Result<(), ValidationError> {
    match top_k {
        k if k < 1 => Err(issue("too_small", "topK must be at least 1")),
        k if k > 20 => Err(issue("too_big", "topK must be at most 20")),
        _ => Ok(()),
    }
}

// ---------------------------------------------------------------------------
// Uploads
// ---------------------------------------------------------------------------

/// Metadata of one uploaded file, checked before it is forwarded.
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UploadDocument {
    #[serde(default)]
    #[validate(custom(function = "check_filename"))]
    pub filename: String,
    #[validate(custom(function = "check_file_size"))]
    pub file_size: i64,
}

impl Schema for UploadDocument {
    const FIELDS: &'static [&'static str] = &["filename", "fileSize"];

    fn check_raw(raw: &Value) -> Vec<FieldError> {
        require(raw, &["filename", "fileSize"])
    }
}

/// Lowercased extension of `filename`, if it has one.
pub fn extension_of(filename: &str) -> Option<String> {
    filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .filter(|ext| !ext.is_empty())
}

pub fn has_allowed_extension(filename: &str) -> bool {
    extension_of(filename).is_some_and(|ext| ALLOWED_EXTENSIONS.contains(&ext.as_str()))
}

fn check_filename(filename: &str) -> Result<(), ValidationError> {
    if filename.is_empty() {
        return Err(issue("too_small", "Filename is required"));
    }
    if !has_allowed_extension(filename) {
        return Err(issue("invalid_string", "Invalid file type"));
    }
    Ok(())
}

fn check_file_size(size: i64) -> Result<(), ValidationError> {
    match size {
        s if s <= 0 => Err(issue("too_small", "Number must be greater than 0")),
        s if s > MAX_UPLOAD_BYTES => Err(issue("too_big", "File size must be less than 16MB")),
        _ => Ok(()),
    }
}

// ---------------------------------------------------------------------------
// Query strings
// ---------------------------------------------------------------------------

/// `?page=&limit=` paging. Values arrive as strings and leave as numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Validate)]
pub struct Pagination {
    #[serde(default = "default_page", deserialize_with = "whole_number")]
    #[validate(custom(function = "check_page"))]
    pub page: u32,
    #[serde(default = "default_limit", deserialize_with = "whole_number")]
    #[validate(custom(function = "check_limit"))]
    pub limit: u32,
}

impl Schema for Pagination {
    const FIELDS: &'static [&'static str] = &["page", "limit"];

    fn check_raw(raw: &Value) -> Vec<FieldError> {
        let mut out = Vec::new();
        if let Some(page) = raw.get("page") {
            match count(page) {
                Count::Valid(_) => {}
                Count::TooLarge => out.push(FieldError::new(
                    "page",
                    format!("Page must be at most {}", u32::MAX),
                    "too_big",
                )),
                Count::NotANumber => out.push(FieldError::new("page", "Page must be a number", "invalid_string")),
            }
        }
        if let Some(limit) = raw.get("limit") {
            match count(limit) {
                Count::Valid(_) => {}
                Count::TooLarge => out.push(FieldError::new("limit", "Limit must be between 1 and 100", "custom")),
                Count::NotANumber => out.push(FieldError::new("limit", "Limit must be a number", "invalid_string")),
            }
        }
        out
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: default_page(),
            limit: default_limit(),
        }
    }
}

fn default_page() -> u32 {
    1
}

fn default_limit() -> u32 {
    10
}

fn check_page(page: u32) -> Result<(), ValidationError> {
    if page < 1 {
        return Err(issue("custom", "Page must be at least 1"));
    }
    Ok(())
}

fn check_limit(limit: u32) -> Result<(), ValidationError> {
    if !(1..=100).contains(&limit) {
        return Err(issue("custom", "Limit must be between 1 and 100"));
    }
    Ok(())
}

enum Count {
    Valid(u32),
    TooLarge,
    NotANumber,
}

/// A non-negative integer given as a JSON number or an all-digit string.
/// Signs, fractions and blanks are not numbers.
fn count(value: &Value) -> Count {
    let wide = match value {
        Value::Number(n) => match n.as_u64() {
            Some(n) => n,
            None => return Count::NotANumber,
        },
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
                return Count::NotANumber;
            }
            match s.parse::<u64>() {
                Ok(n) => n,
                Err(_) => return Count::TooLarge,
            }
        }
        _ => return Count::NotANumber,
    };
    u32::try_from(wide).map_or(Count::TooLarge, Count::Valid)
}

fn whole_number<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    match count(&Value::deserialize(deserializer)?) {
        Count::Valid(n) => Ok(n),
        Count::TooLarge => Err(D::Error::custom("number out of range")),
        Count::NotANumber => Err(D::Error::custom("expected a whole number")),
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn bounded(
    value: &str,
    min: usize,
    max: usize,
    too_short: &'static str,
    too_long: &'static str,
) -> Result<(), ValidationError> {
    let len = value.chars().count();
    if len < min {
        return Err(issue("too_small", too_short));
    }
    if len > max {
        return Err(issue("too_big", too_long));
    }
    Ok(())
}

fn trim_in_place(s: &mut String) {
    let trimmed = s.trim();
    if trimmed.len() != s.len() {
        *s = trimmed.to_string();
    }
}

fn trim_opt(s: &mut Option<String>) {
    if let Some(s) = s.as_mut() {
        trim_in_place(s);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AppError, FieldError};
    use crate::validation::parse_schema;
    use serde_json::json;

    fn details<T: Schema + std::fmt::Debug>(raw: Value) -> Vec<FieldError> {
        match parse_schema::<T>(raw) {
            Err(AppError::Validation(d)) => d,
            other => panic!("expected validation failure, got {other:?}"),
        }
    }

    #[test]
    fn chatbot_id_format() {
        assert!(parse_schema::<ChatbotIdParams>(json!({"chatbotId": "a1b2c3d4e5f6a1b2c3d4e5f6"})).is_ok());
        assert!(parse_schema::<ChatbotIdParams>(json!({"chatbotId": "A1B2C3D4E5F6A1B2C3D4E5F6"})).is_ok());

        let d = details::<ChatbotIdParams>(json!({"chatbotId": "nope"}));
        assert_eq!(d[0].field, "chatbotId");
        assert_eq!(d[0].message, "Invalid chatbot ID format");

        let d = details::<ChatbotIdParams>(json!({}));
        assert_eq!(d[0].message, "Chatbot ID is required");
    }

    #[test]
    fn missing_required_keys_are_invalid_type() {
        let d = details::<DomainEntry>(json!({}));
        assert_eq!((d[0].field.as_str(), d[0].code.as_str(), d[0].message.as_str()), ("domain", "invalid_type", "Required"));
        let d = details::<DomainEntry>(json!({"domain": "  "}));
        assert_eq!((d[0].code.as_str(), d[0].message.as_str()), ("too_small", "Domain is required"));

        let d = details::<ChatMessage>(json!({"stream": true}));
        assert_eq!(d[0].field, "message");
        assert_eq!(d[0].message, "Required");

        let d = details::<UploadDocument>(json!({"filename": "a.txt"}));
        assert_eq!(d.len(), 1);
        assert_eq!(d[0].field, "fileSize");
        assert_eq!(d[0].code, "invalid_type");
    }

    #[test]
    fn create_chatbot_limits() {
        let d = details::<CreateChatbot>(json!({"name": "x".repeat(101), "description": "ok"}));
        assert_eq!(d.len(), 1);
        assert_eq!(d[0].field, "name");
        assert_eq!(d[0].code, "too_big");

        let d = details::<CreateChatbot>(json!({
            "name": "n",
            "description": "d",
            "systemPrompt": "p".repeat(1001),
        }));
        assert_eq!(d[0].field, "systemPrompt");

        let d = details::<CreateChatbot>(json!({
            "name": "n",
            "description": "d",
            "allowedDomains": ["example.com", ""],
        }));
        assert_eq!(d[0].field, "allowedDomains");
        assert_eq!(d[0].message, "Domain cannot be empty");
    }

    #[test]
    fn create_chatbot_drops_unknown_keys() {
        let bot = parse_schema::<CreateChatbot>(json!({
            "name": "n",
            "description": "d",
            "userId": "spoofed",
        }))
        .unwrap();
        let out = serde_json::to_value(&bot).unwrap();
        assert!(out.get("userId").is_none());
        assert!(out.get("systemPrompt").is_none());
    }

    #[test]
    fn update_requires_a_field() {
        let d = details::<UpdateChatbot>(json!({}));
        assert_eq!(d[0].field, "");
        assert_eq!(d[0].code, "custom");
        assert!(parse_schema::<UpdateChatbot>(json!({"isEmbeddable": true})).is_ok());
    }

    #[test]
    fn chat_message_defaults_stream_off() {
        let msg = parse_schema::<ChatMessage>(json!({"message": "  hi  "})).unwrap();
        assert_eq!(msg.message, "hi");
        assert!(!msg.stream);
        let d = details::<ChatMessage>(json!({"message": "x".repeat(5001)}));
        assert_eq!(d[0].code, "too_big");
    }

    #[test]
    fn vector_query_top_k_default_and_bounds() {
        let q = parse_schema::<VectorQuery>(json!({"query": "refunds"})).unwrap();
        assert_eq!(q.top_k, 5);
        let d = details::<VectorQuery>(json!({"query": "refunds", "topK": 21}));
        assert_eq!(d[0].field, "topK");
        let d = details::<VectorQuery>(json!({"query": "refunds", "topK": 0}));
        assert_eq!(d[0].message, "topK must be at least 1");
    }

    #[test]
    fn upload_document_rules() {
        assert!(parse_schema::<UploadDocument>(json!({"filename": "Guide.PDF", "fileSize": 10})).is_ok());
        let d = details::<UploadDocument>(json!({"filename": "evil.exe", "fileSize": 10}));
        assert_eq!(d[0].message, "Invalid file type");
        let d = details::<UploadDocument>(json!({"filename": "a.txt", "fileSize": MAX_UPLOAD_BYTES + 1}));
        assert_eq!(d[0].field, "fileSize");
        assert_eq!(d[0].code, "too_big");
    }

    #[test]
    fn pagination_coerces_strings() {
        let p = parse_schema::<Pagination>(json!({"page": "3", "limit": "25"})).unwrap();
        assert_eq!((p.page, p.limit), (3, 25));
        assert_eq!(serde_json::to_value(p).unwrap(), json!({"page": 3, "limit": 25}));

        let p = parse_schema::<Pagination>(json!({"page": 4})).unwrap();
        assert_eq!(p, Pagination { page: 4, limit: 10 });

        assert_eq!(parse_schema::<Pagination>(json!({})).unwrap(), Pagination::default());
    }

    #[test]
    fn pagination_rejects_pages_past_u32() {
        let d = details::<Pagination>(json!({"page": "5000000000"}));
        assert_eq!(d.len(), 1);
        assert_eq!(d[0].field, "page");
        assert_eq!(d[0].code, "too_big");

        let d = details::<Pagination>(json!({"page": "99999999999999999999999", "limit": "x"}));
        let fields: Vec<&str> = d.iter().map(|d| d.field.as_str()).collect();
        assert_eq!(fields, ["page", "limit"]);
    }

    #[test]
    fn pagination_rejects_bad_values() {
        let d = details::<Pagination>(json!({"page": "abc"}));
        assert_eq!(d[0].message, "Page must be a number");
        let d = details::<Pagination>(json!({"page": "0"}));
        assert_eq!(d[0].message, "Page must be at least 1");
        let d = details::<Pagination>(json!({"limit": "101"}));
        assert_eq!(d[0].message, "Limit must be between 1 and 100");
        let d = details::<Pagination>(json!({"limit": "-5"}));
        assert_eq!(d[0].message, "Limit must be a number");
        let d = details::<Pagination>(json!({"page": "1.5"}));
        assert_eq!(d[0].message, "Page must be a number");
        let d = details::<Pagination>(json!({"limit": "7000000000"}));
        assert_eq!(d[0].message, "Limit must be between 1 and 100");
    }

    #[test]
    fn extension_helpers() {
        assert_eq!(extension_of("a.tar.GZ").as_deref(), Some("gz"));
        assert_eq!(extension_of("README"), None);
        assert!(has_allowed_extension("notes.md"));
        assert!(!has_allowed_extension("notes.md.exe"));
    }
}

use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use serde_json::{json, Value};

use super::ApiResponse;
use crate::auth::AuthUser;
use crate::chatbot::{Chatbot, ChatbotPatch, NewChatbot};
use crate::error::AppError;
use crate::rag;
use crate::state::{AppState, SharedState};
use crate::upload::{self, UploadedFile};
use crate::validation::schemas::{
    ChatbotIdParams, CreateChatbot, DomainEntry, Pagination, UpdateChatbot, VectorQuery,
};
use crate::validation::{parse_schema, Valid};

type JsonResult<T> = Result<Json<ApiResponse<T>>, AppError>;

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    pub page: u32,
    pub limit: u32,
    pub total: u64,
    pub total_pages: u64,
}

#[derive(Debug, Serialize)]
pub struct ChatbotList {
    pub chatbots: Vec<Chatbot>,
    pub pagination: PageInfo,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentOutcome {
    pub filename: String,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// The caller's chatbot, or 404 when it is missing or owned by someone else.
pub(crate) fn owned_chatbot(state: &AppState, id: &str, user: &AuthUser) -> Result<Chatbot, AppError> {
    state
        .store
        .get_owned(id, &user.user_id)?
        .ok_or_else(|| AppError::NotFound("Chatbot not found".into()))
}

impl From<CreateChatbot> for NewChatbot {
    fn from(body: CreateChatbot) -> Self {
        Self {
            name: body.name,
            description: body.description,
            system_prompt: body.system_prompt,
            metadata: body.metadata.map(Value::Object),
            allowed_domains: body.allowed_domains.unwrap_or_default(),
            is_embeddable: body.is_embeddable.unwrap_or(false),
        }
    }
}

impl From<UpdateChatbot> for ChatbotPatch {
    fn from(body: UpdateChatbot) -> Self {
        Self {
            name: body.name,
            description: body.description,
            system_prompt: body.system_prompt,
            metadata: body.metadata.map(Value::Object),
            allowed_domains: body.allowed_domains,
            is_embeddable: body.is_embeddable,
        }
    }
}

/// Forward files one by one; a failed upload is reported, not fatal.
async fn forward_documents(state: &AppState, chatbot_id: &str, files: Vec<UploadedFile>) -> Vec<DocumentOutcome> {
    let mut outcomes = Vec::with_capacity(files.len());
    for file in files {
        let result = state
            .vectors
            .upload(chatbot_id, &file.filename, &file.mime_type, file.bytes)
            .await;
        outcomes.push(match result {
            Ok(_) => DocumentOutcome {
                filename: file.filename,
                status: "uploaded",
                error: None,
            },
            Err(e) => {
                tracing::warn!(chatbot_id, filename = %file.filename, "document upload failed: {e}");
                DocumentOutcome {
                    filename: file.filename,
                    status: "failed",
                    error: Some(e.to_string()),
                }
            }
        });
    }
    outcomes
}

fn too_many_files(count: usize) -> Result<(), AppError> {
    if count > super::MAX_FILES_PER_REQUEST {
        return Err(AppError::BadRequest(format!(
            "At most {} files can be uploaded at once",
            super::MAX_FILES_PER_REQUEST
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// GET /api/chatbots/all
pub async fn list_chatbots(
    State(state): State<SharedState>,
    user: AuthUser,
    Valid(page): Valid<Pagination>,
) -> JsonResult<ChatbotList> {
    let Pagination { page: page_no, limit } = page;
    let (chatbots, total) = state.store.list_for_user(&user.user_id, page_no, limit)?;
    let total_pages = total.div_ceil(u64::from(limit.max(1)));

    Ok(ApiResponse::data(ChatbotList {
        chatbots,
        pagination: PageInfo {
            page: page_no,
            limit,
            total,
            total_pages,
        },
    }))
}

/// GET /api/chatbots/{chatbotId}
pub async fn get_chatbot(
    State(state): State<SharedState>,
    user: AuthUser,
    Valid(params): Valid<ChatbotIdParams>,
) -> JsonResult<Chatbot> {
    Ok(ApiResponse::data(owned_chatbot(&state, &params.chatbot_id, &user)?))
}

/// POST /api/chatbots
pub async fn create_chatbot(
    State(state): State<SharedState>,
    user: AuthUser,
    Valid(body): Valid<CreateChatbot>,
) -> Result<(StatusCode, Json<ApiResponse<Chatbot>>), AppError> {
    let chatbot = state.store.create(&user.user_id, body.into())?;
    Ok((StatusCode::CREATED, ApiResponse::data(chatbot)))
}

/// POST /api/chatbots/with-documents (multipart: chatbot fields plus `files`)
///
/// Every field and file is validated before the chatbot is created.
pub async fn create_chatbot_with_documents(
    State(state): State<SharedState>,
    user: AuthUser,
    multipart: Multipart,
) -> Result<(StatusCode, Json<ApiResponse<Value>>), AppError> {
    let form = upload::read_form(multipart, state.config.upload.max_file_size).await?;
    too_many_files(form.files.len())?;
    let body = parse_schema::<CreateChatbot>(crate::validation::sanitize(upload::fields_to_json(form.fields)))?;

    let chatbot = state.store.create(&user.user_id, body.into())?;
    let documents = forward_documents(&state, &chatbot.id, form.files).await;

    Ok((
        StatusCode::CREATED,
        ApiResponse::data(json!({
            "chatbot": chatbot,
            "documents": documents,
        })),
    ))
}

/// PUT /api/chatbots/{chatbotId}
pub async fn update_chatbot(
    State(state): State<SharedState>,
    user: AuthUser,
    Valid(params): Valid<ChatbotIdParams>,
    Valid(body): Valid<UpdateChatbot>,
) -> JsonResult<Chatbot> {
    owned_chatbot(&state, &params.chatbot_id, &user)?;
    let updated = state
        .store
        .update(&params.chatbot_id, body.into())?
        .ok_or_else(|| AppError::NotFound("Chatbot not found".into()))?;
    Ok(ApiResponse::data(updated))
}

/// DELETE /api/chatbots/{chatbotId}
pub async fn delete_chatbot(
    State(state): State<SharedState>,
    user: AuthUser,
    Valid(params): Valid<ChatbotIdParams>,
) -> JsonResult<()> {
    owned_chatbot(&state, &params.chatbot_id, &user)?;
    if !state.store.delete(&params.chatbot_id)? {
        return Err(AppError::NotFound("Chatbot not found".into()));
    }
    Ok(ApiResponse::message("Chatbot deleted successfully"))
}

/// POST /api/chatbots/{chatbotId}/documents (multipart `files`)
pub async fn upload_documents(
    State(state): State<SharedState>,
    user: AuthUser,
    Valid(params): Valid<ChatbotIdParams>,
    multipart: Multipart,
) -> JsonResult<Value> {
    let chatbot = owned_chatbot(&state, &params.chatbot_id, &user)?;
    let form = upload::read_form(multipart, state.config.upload.max_file_size).await?;
    if form.files.is_empty() {
        return Err(AppError::BadRequest("No files uploaded".into()));
    }
    too_many_files(form.files.len())?;

    let documents = forward_documents(&state, &chatbot.id, form.files).await;
    Ok(ApiResponse::data(json!({
        "chatbotId": chatbot.id,
        "documents": documents,
    })))
}

/// POST /api/chatbots/{chatbotId}/domains
pub async fn add_domain(
    State(state): State<SharedState>,
    user: AuthUser,
    Valid(params): Valid<ChatbotIdParams>,
    Valid(body): Valid<DomainEntry>,
) -> JsonResult<Chatbot> {
    owned_chatbot(&state, &params.chatbot_id, &user)?;
    let chatbot = state
        .store
        .add_domain(&params.chatbot_id, &body.domain)?
        .ok_or_else(|| AppError::NotFound("Chatbot not found".into()))?;
    Ok(ApiResponse::data(chatbot))
}

/// DELETE /api/chatbots/{chatbotId}/domains
pub async fn remove_domain(
    State(state): State<SharedState>,
    user: AuthUser,
    Valid(params): Valid<ChatbotIdParams>,
    Valid(body): Valid<DomainEntry>,
) -> JsonResult<Chatbot> {
    owned_chatbot(&state, &params.chatbot_id, &user)?;
    let chatbot = state
        .store
        .remove_domain(&params.chatbot_id, &body.domain)?
        .ok_or_else(|| AppError::NotFound("Chatbot not found".into()))?;
    Ok(ApiResponse::data(chatbot))
}

/// GET /api/chatbots/{chatbotId}/vectors/status
pub async fn vector_status(
    State(state): State<SharedState>,
    user: AuthUser,
    Valid(params): Valid<ChatbotIdParams>,
) -> JsonResult<Value> {
    let chatbot = owned_chatbot(&state, &params.chatbot_id, &user)?;
    let has_vectors = state.vectors.status(&chatbot.id).await;
    Ok(ApiResponse::data(json!({
        "chatbotId": chatbot.id,
        "hasVectors": has_vectors,
    })))
}

/// POST /api/chatbots/{chatbotId}/vectors/query
pub async fn vector_query(
    State(state): State<SharedState>,
    user: AuthUser,
    Valid(params): Valid<ChatbotIdParams>,
    Valid(body): Valid<VectorQuery>,
) -> JsonResult<Value> {
    let chatbot = owned_chatbot(&state, &params.chatbot_id, &user)?;
    let filter = body.filter.map(Value::Object);
    let top_k = u32::try_from(body.top_k).unwrap_or(5);
    let results = state
        .vectors
        .query(&chatbot.id, &body.query, top_k, filter.as_ref())
        .await;
    let context = rag::format_context(&results);
    Ok(ApiResponse::data(json!({
        "chatbotId": chatbot.id,
        "query": body.query,
        "results": results,
        "context": context,
    })))
}

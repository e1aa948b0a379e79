use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};

use crate::error::{VALIDATION_INVALID_ID, VALIDATION_PAYLOAD};
use crate::model::{validate_id, ListId, MoveRequest, NewTodo, TodoId, TodoItem, TodoPatch};
use crate::state::AppState;
use crate::{AppError, AppResult};

type ApiResult<T> = AppResult<Json<T>>;

fn payload<T>(body: Result<Json<T>, JsonRejection>) -> AppResult<T> {
    match body {
        Ok(Json(value)) => Ok(value),
        Err(rejection) => Err(AppError::validation(
            VALIDATION_PAYLOAD,
            "Request body is not a valid payload",
        )
        .with_context("detail", rejection.body_text())),
    }
}

fn parse_todo_id(raw: &str) -> AppResult<TodoId> {
    let id = raw.parse::<TodoId>().map_err(|_| {
        AppError::validation(VALIDATION_INVALID_ID, "Ids are positive integers")
            .with_context("field", "todo_id")
            .with_context("value", raw.to_string())
    })?;
    validate_id(id, "todo_id")
}

pub(super) async fn list_todos(
    State(state): State<AppState>,
    Path(list_id): Path<String>,
) -> ApiResult<Vec<TodoItem>> {
    let list = ListId::parse(&list_id)?;
    Ok(Json(state.store.list_all(&list).await?))
}

pub(super) async fn get_todo(
    State(state): State<AppState>,
    Path((list_id, todo_id)): Path<(String, String)>,
) -> ApiResult<TodoItem> {
    let list = ListId::parse(&list_id)?;
    let id = parse_todo_id(&todo_id)?;
    Ok(Json(state.store.get_by_id(&list, id).await?))
}

pub(super) async fn create_todo(
    State(state): State<AppState>,
    Path(list_id): Path<String>,
    body: Result<Json<NewTodo>, JsonRejection>,
) -> AppResult<(StatusCode, Json<TodoItem>)> {
    let list = ListId::parse(&list_id)?;
    let todo = payload(body)?.validated()?;
    let item = state.store.insert(&list, todo).await?;
    Ok((StatusCode::CREATED, Json(item)))
}

pub(super) async fn update_todo(
    State(state): State<AppState>,
    Path((list_id, todo_id)): Path<(String, String)>,
    body: Result<Json<TodoPatch>, JsonRejection>,
) -> ApiResult<TodoItem> {
    let list = ListId::parse(&list_id)?;
    let id = parse_todo_id(&todo_id)?;
    let patch = payload(body)?.validated()?;
    Ok(Json(state.store.update_partial(&list, id, patch).await?))
}

pub(super) async fn move_todo(
    State(state): State<AppState>,
    Path(list_id): Path<String>,
    body: Result<Json<MoveRequest>, JsonRejection>,
) -> ApiResult<TodoItem> {
    let list = ListId::parse(&list_id)?;
    let MoveRequest { from_id, to_id } = payload(body)?;
    let from_id = validate_id(from_id, "fromId")?;
    let to_id = validate_id(to_id, "toId")?;
    Ok(Json(
        state
            .store
            .move_between_positions(&list, from_id, to_id)
            .await?,
    ))
}

pub(super) async fn delete_todo(
    State(state): State<AppState>,
    Path((list_id, todo_id)): Path<(String, String)>,
) -> ApiResult<TodoItem> {
    let list = ListId::parse(&list_id)?;
    let id = parse_todo_id(&todo_id)?;
    Ok(Json(state.store.delete(&list, id).await?))
}

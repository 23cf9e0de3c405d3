use axum::extract::{Path, State};
use pickperfect_core::{Collection, Document};
use pickperfect_db::{InsertOneResult, UpdateResult};
use tracing::info;

use super::{AppJson, AuthenticatedUser, SuccessResponse, parse_id};
use crate::error::RequestResult;
use crate::{LOG_TARGET, SharedState};

/// Counter bumped when a recommendation is added to a query
const RECOMMENDATION_COUNT_FIELD: &str = "recommendationCount";

/// Field of a recommendation pointing at the query it answers
const POST_ID_FIELD: &str = "postID";

pub async fn list(state: State<SharedState>) -> RequestResult<AppJson<Vec<Document>>> {
    Ok(AppJson(state.db.find_all(Collection::Queries).await?))
}

pub async fn create(
    user: AuthenticatedUser,
    state: State<SharedState>,
    AppJson(doc): AppJson<Document>,
) -> RequestResult<AppJson<InsertOneResult>> {
    let res = state.db.insert_one(Collection::Queries, doc).await?;
    info!(target: LOG_TARGET, id = %res.inserted_id, email = %user.email, "New query");
    Ok(AppJson(res))
}

pub async fn update(
    _user: AuthenticatedUser,
    state: State<SharedState>,
    Path(id): Path<String>,
    AppJson(fields): AppJson<Document>,
) -> RequestResult<AppJson<UpdateResult>> {
    let id = parse_id(&id)?;
    Ok(AppJson(
        state.db.update_set(Collection::Queries, id, fields).await?,
    ))
}

pub async fn recommend(
    _user: AuthenticatedUser,
    state: State<SharedState>,
    Path(id): Path<String>,
) -> RequestResult<AppJson<UpdateResult>> {
    bump_recommendation_count(&state, &id, 1).await
}

pub async fn unrecommend(
    _user: AuthenticatedUser,
    state: State<SharedState>,
    Path(id): Path<String>,
) -> RequestResult<AppJson<UpdateResult>> {
    bump_recommendation_count(&state, &id, -1).await
}

async fn bump_recommendation_count(
    state: &SharedState,
    id: &str,
    delta: i64,
) -> RequestResult<AppJson<UpdateResult>> {
    let id = parse_id(id)?;
    Ok(AppJson(
        state
            .db
            .increment(Collection::Queries, id, RECOMMENDATION_COUNT_FIELD, delta)
            .await?,
    ))
}

/// Removes a query together with all recommendations made for it
pub async fn delete(
    user: AuthenticatedUser,
    state: State<SharedState>,
    Path(id): Path<String>,
) -> RequestResult<AppJson<SuccessResponse>> {
    let id = parse_id(&id)?;

    let query = state.db.delete_one(Collection::Queries, id).await?;
    let recommendations = state
        .db
        .delete_many_by_field(Collection::Recommendations, POST_ID_FIELD, &id.to_string())
        .await?;
    info!(
        target: LOG_TARGET,
        %id,
        email = %user.email,
        queries = query.deleted_count,
        recommendations = recommendations.deleted_count,
        "Deleted query"
    );

    Ok(AppJson(SuccessResponse { success: true }))
}

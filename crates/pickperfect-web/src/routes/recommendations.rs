use axum::extract::{Path, State};
use pickperfect_core::{Collection, Document};
use pickperfect_db::{DeleteResult, InsertOneResult};

use super::{AppJson, AuthenticatedUser, parse_id};
use crate::SharedState;
use crate::error::RequestResult;

pub async fn list(
    _user: AuthenticatedUser,
    state: State<SharedState>,
) -> RequestResult<AppJson<Vec<Document>>> {
    Ok(AppJson(state.db.find_all(Collection::Recommendations).await?))
}

pub async fn create(
    _user: AuthenticatedUser,
    state: State<SharedState>,
    AppJson(doc): AppJson<Document>,
) -> RequestResult<AppJson<InsertOneResult>> {
    Ok(AppJson(
        state
            .db
            .insert_one(Collection::Recommendations, doc)
            .await?,
    ))
}

pub async fn delete(
    _user: AuthenticatedUser,
    state: State<SharedState>,
    Path(id): Path<String>,
) -> RequestResult<AppJson<DeleteResult>> {
    let id = parse_id(&id)?;
    Ok(AppJson(
        state
            .db
            .delete_one(Collection::Recommendations, id)
            .await?,
    ))
}

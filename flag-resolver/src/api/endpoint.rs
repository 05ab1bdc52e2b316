use axum::{
    extract::{Path, State},
    Json,
};

use crate::{
    api::{
        errors::FlagError,
        types::{ActiveScope, FlagResponse, FlagsResponse},
    },
    definitions::{FlagDefinition, FlagGroup},
    flags::{
        flag_models::{PartialFlagStore, PartialFlagValue, ScopeType},
        resolver::FlagResolver,
    },
    router,
};

fn flags_response(resolver: &FlagResolver) -> FlagsResponse {
    FlagsResponse {
        flags: resolver.get_feature_flags(),
        active_scope: resolver
            .active_scope()
            .map(|(scope_type, scope_id)| ActiveScope {
                scope_type,
                scope_id,
            }),
    }
}

pub async fn get_flags(State(state): State<router::State>) -> Json<FlagsResponse> {
    state.resolver.load_feature_flags().await;
    Json(flags_response(&state.resolver))
}

pub async fn get_flag(
    State(state): State<router::State>,
    Path(key): Path<String>,
) -> Result<Json<FlagResponse>, FlagError> {
    match state.resolver.get_feature_flag(&key) {
        Some(flag) => Ok(Json(FlagResponse { key, flag })),
        None => Err(FlagError::UnknownFlag(key)),
    }
}

/// Local change only, a later save persists it.
pub async fn set_flag(
    State(state): State<router::State>,
    Path(key): Path<String>,
    Json(value): Json<PartialFlagValue>,
) -> Result<Json<FlagResponse>, FlagError> {
    state.resolver.set_feature_flag(&key, value).await;
    get_flag(State(state), Path(key)).await
}

pub async fn save_flags(
    State(state): State<router::State>,
    Json(flags): Json<PartialFlagStore>,
) -> Result<Json<FlagsResponse>, FlagError> {
    state.resolver.save_feature_flags(flags).await?;
    Ok(Json(flags_response(&state.resolver)))
}

pub async fn reset_flags(
    State(state): State<router::State>,
) -> Result<Json<FlagsResponse>, FlagError> {
    state.resolver.reset_to_defaults().await?;
    Ok(Json(flags_response(&state.resolver)))
}

pub async fn get_definitions(State(state): State<router::State>) -> Json<Vec<FlagDefinition>> {
    Json(state.resolver.get_all_definitions().to_vec())
}

pub async fn get_grouped_definitions(State(state): State<router::State>) -> Json<Vec<FlagGroup>> {
    Json(state.resolver.get_grouped_definitions())
}

pub async fn load_overrides(
    State(state): State<router::State>,
    Path((scope_type, scope_id)): Path<(ScopeType, String)>,
) -> Json<FlagsResponse> {
    match scope_type {
        ScopeType::User => state.resolver.load_user_overrides(&scope_id).await,
        ScopeType::Company => state.resolver.load_company_overrides(&scope_id).await,
    }
    Json(flags_response(&state.resolver))
}

pub async fn save_overrides(
    State(state): State<router::State>,
    Path((scope_type, scope_id)): Path<(ScopeType, String)>,
    Json(flags): Json<PartialFlagStore>,
) -> Result<Json<FlagsResponse>, FlagError> {
    match scope_type {
        ScopeType::User => state.resolver.save_user_override(&scope_id, flags).await?,
        ScopeType::Company => {
            state
                .resolver
                .save_company_override(&scope_id, flags)
                .await?
        }
    }
    Ok(Json(flags_response(&state.resolver)))
}

pub async fn clear_overrides(State(state): State<router::State>) -> Json<FlagsResponse> {
    state.resolver.clear_overrides().await;
    Json(flags_response(&state.resolver))
}

use serde::{Deserialize, Serialize};

use crate::flags::flag_models::{FlagStore, ResolvedFlag, ScopeType};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ActiveScope {
    pub scope_type: ScopeType,
    pub scope_id: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FlagsResponse {
    pub flags: FlagStore,
    pub active_scope: Option<ActiveScope>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FlagResponse {
    pub key: String,
    #[serde(flatten)]
    pub flag: ResolvedFlag,
}

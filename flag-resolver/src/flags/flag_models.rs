use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::persistence::PersistenceError;

/// Settings key the global snapshot is stored under unless configured otherwise.
pub const FEATURE_FLAGS_SETTINGS_KEY: &str = "feature_flags";

/// The capability state of a single flag.
///
/// `visible` only matters while `enabled` is true. That rule lives with the callers
/// rendering toggles, it is not enforced here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
pub struct FlagValue {
    pub enabled: bool,
    pub visible: bool,
}

impl FlagValue {
    pub const fn new(enabled: bool, visible: bool) -> Self {
        Self { enabled, visible }
    }
}

/// A partial update to a flag. Absent fields are left untouched by a merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
pub struct PartialFlagValue {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visible: Option<bool>,
    #[serde(default, rename = "override", skip_serializing_if = "Option::is_none")]
    pub is_override: Option<bool>,
}

impl PartialFlagValue {
    pub fn enabled(enabled: bool) -> Self {
        Self {
            enabled: Some(enabled),
            ..Default::default()
        }
    }

    pub fn visible(visible: bool) -> Self {
        Self {
            visible: Some(visible),
            ..Default::default()
        }
    }

    pub fn with_override(mut self, is_override: bool) -> Self {
        self.is_override = Some(is_override);
        self
    }
}

impl From<FlagValue> for PartialFlagValue {
    fn from(value: FlagValue) -> Self {
        Self {
            enabled: Some(value.enabled),
            visible: Some(value.visible),
            is_override: None,
        }
    }
}

/// A flag as it currently resolves, with a marker telling whether a scope override
/// is responsible for the value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
pub struct ResolvedFlag {
    pub enabled: bool,
    pub visible: bool,
    #[serde(default, rename = "override")]
    pub is_override: bool,
}

impl ResolvedFlag {
    pub fn from_default(value: FlagValue) -> Self {
        Self {
            enabled: value.enabled,
            visible: value.visible,
            is_override: false,
        }
    }

    /// Builds a flag out of a partial value alone. Missing fields resolve to `false`.
    pub fn from_partial(partial: &PartialFlagValue) -> Self {
        let mut flag = Self::default();
        flag.apply(partial);
        flag
    }

    /// Shallow merge: each field is overwritten only when the partial carries it.
    pub fn apply(&mut self, partial: &PartialFlagValue) {
        if let Some(enabled) = partial.enabled {
            self.enabled = enabled;
        }
        if let Some(visible) = partial.visible {
            self.visible = visible;
        }
        if let Some(is_override) = partial.is_override {
            self.is_override = is_override;
        }
    }

    pub fn value(&self) -> FlagValue {
        FlagValue::new(self.enabled, self.visible)
    }
}

pub type FlagStore = HashMap<String, ResolvedFlag>;
pub type PartialFlagStore = HashMap<String, PartialFlagValue>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScopeType {
    User,
    Company,
}

impl ScopeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScopeType::User => "user",
            ScopeType::Company => "company",
        }
    }
}

impl fmt::Display for ScopeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScopeType {
    type Err = PersistenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(ScopeType::User),
            "company" => Ok(ScopeType::Company),
            invalid => Err(PersistenceError::InvalidScopeType(invalid.to_owned())),
        }
    }
}

/// The overrides stored for one user or company. Saving replaces the whole record.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ScopeOverrideRecord {
    pub scope_id: String,
    pub scope_type: ScopeType,
    pub flags: PartialFlagStore,
    pub updated_at: DateTime<Utc>,
}

impl ScopeOverrideRecord {
    pub fn new(scope_id: &str, scope_type: ScopeType, flags: PartialFlagStore) -> Self {
        Self {
            scope_id: scope_id.to_owned(),
            scope_type,
            flags,
            updated_at: Utc::now(),
        }
    }
}

/// Raw row of the global settings table. `value` holds the JSON encoded `FlagStore`.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct GlobalSettingsRow {
    pub key: String,
    pub value: serde_json::Value,
    pub updated_at: DateTime<Utc>,
}

impl GlobalSettingsRow {
    /// Decodes the stored snapshot. Entries may omit fields, so they decode as partials.
    pub fn decode(self) -> Result<PartialFlagStore, PersistenceError> {
        Ok(serde_json::from_value(self.value)?)
    }
}

/// Raw row of the scope override table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ScopeOverrideRow {
    pub scope_id: String,
    pub scope_type: String,
    pub flags: serde_json::Value,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<ScopeOverrideRow> for ScopeOverrideRecord {
    type Error = PersistenceError;

    fn try_from(row: ScopeOverrideRow) -> Result<Self, Self::Error> {
        Ok(ScopeOverrideRecord {
            scope_type: row.scope_type.parse()?,
            flags: serde_json::from_value(row.flags)?,
            scope_id: row.scope_id,
            updated_at: row.updated_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_partial_value_keeps_absent_fields_absent() {
        let partial: PartialFlagValue = serde_json::from_value(json!({"enabled": true})).unwrap();
        assert_eq!(partial, PartialFlagValue::enabled(true));

        let encoded = serde_json::to_value(partial).unwrap();
        assert_eq!(encoded, json!({"enabled": true}));
    }

    #[test]
    fn test_override_marker_uses_wire_name() {
        let flag = ResolvedFlag {
            enabled: true,
            visible: false,
            is_override: true,
        };
        assert_eq!(
            serde_json::to_value(flag).unwrap(),
            json!({"enabled": true, "visible": false, "override": true})
        );

        let decoded: ResolvedFlag =
            serde_json::from_value(json!({"enabled": true, "visible": true})).unwrap();
        assert!(!decoded.is_override);
    }

    #[test]
    fn test_apply_only_overwrites_present_fields() {
        let mut flag = ResolvedFlag::from_default(FlagValue::new(false, true));
        flag.apply(&PartialFlagValue::enabled(true));
        assert_eq!(flag.value(), FlagValue::new(true, true));
        assert!(!flag.is_override);

        flag.apply(&PartialFlagValue::default().with_override(true));
        assert_eq!(flag.value(), FlagValue::new(true, true));
        assert!(flag.is_override);
    }

    #[test]
    fn test_from_partial_fills_missing_fields_with_false() {
        let flag = ResolvedFlag::from_partial(&PartialFlagValue::visible(true));
        assert_eq!(
            flag,
            ResolvedFlag {
                enabled: false,
                visible: true,
                is_override: false
            }
        );
    }

    #[test]
    fn test_scope_row_with_unknown_type_is_rejected() {
        let row = ScopeOverrideRow {
            scope_id: "team-1".to_string(),
            scope_type: "team".to_string(),
            flags: json!({}),
            updated_at: Utc::now(),
        };

        match ScopeOverrideRecord::try_from(row) {
            Err(PersistenceError::InvalidScopeType(scope)) => assert_eq!(scope, "team"),
            other => panic!("Expected InvalidScopeType, got {:?}", other),
        }
    }

    #[test]
    fn test_scope_row_decodes_partial_flags() {
        let row = ScopeOverrideRow {
            scope_id: "user1".to_string(),
            scope_type: "user".to_string(),
            flags: json!({"beta_search": {"enabled": false}}),
            updated_at: Utc::now(),
        };

        let record = ScopeOverrideRecord::try_from(row).unwrap();
        assert_eq!(record.scope_type, ScopeType::User);
        assert_eq!(
            record.flags.get("beta_search"),
            Some(&PartialFlagValue::enabled(false))
        );
    }

    #[test]
    fn test_string_encoded_snapshot_is_not_accepted() {
        let row = GlobalSettingsRow {
            key: FEATURE_FLAGS_SETTINGS_KEY.to_string(),
            value: json!("{\"beta_search\":{\"enabled\":true}}"),
            updated_at: Utc::now(),
        };

        assert!(matches!(
            row.decode(),
            Err(PersistenceError::Serialization(_))
        ));
    }
}

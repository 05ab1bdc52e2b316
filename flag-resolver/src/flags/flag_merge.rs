use crate::definitions::DefinitionCatalog;
use crate::flags::flag_models::{FlagStore, PartialFlagStore, PartialFlagValue, ResolvedFlag};

/// Merges `partial` over `current`. Known keys are shallow merged field by field;
/// keys absent from `current` are inserted from the partial value alone.
pub fn merge_flags(current: &FlagStore, partial: &PartialFlagStore) -> FlagStore {
    let mut merged = current.clone();
    for (key, value) in partial {
        merged
            .entry(key.clone())
            .and_modify(|flag| flag.apply(value))
            .or_insert_with(|| ResolvedFlag::from_partial(value));
    }
    merged
}

/// Rebuilds the store from catalog defaults and merges a persisted snapshot over it,
/// so flags added to the catalog after the snapshot was written still show up.
pub fn merge_with_defaults(catalog: &DefinitionCatalog, persisted: &PartialFlagStore) -> FlagStore {
    merge_flags(&catalog.defaults(), persisted)
}

/// Merges scope overrides, marking every touched key as an override whether or not
/// its value changed.
pub fn merge_scope_flags(current: &FlagStore, overrides: &PartialFlagStore) -> FlagStore {
    let marked: PartialFlagStore = overrides
        .iter()
        .map(|(key, value)| (key.clone(), value.with_override(true)))
        .collect();
    merge_flags(current, &marked)
}

/// Resets every override back to its catalog default. Keys with no definition keep
/// their value and only lose the marker.
pub fn clear_override_flags(catalog: &DefinitionCatalog, current: &FlagStore) -> FlagStore {
    current
        .iter()
        .map(|(key, flag)| {
            let flag = if !flag.is_override {
                *flag
            } else {
                match catalog.get(key) {
                    Some(definition) => ResolvedFlag::from_default(definition.default_value),
                    None => {
                        let mut flag = *flag;
                        flag.apply(&PartialFlagValue::default().with_override(false));
                        flag
                    }
                }
            };
            (key.clone(), flag)
        })
        .collect()
}

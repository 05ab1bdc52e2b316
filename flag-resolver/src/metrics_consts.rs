// Resolver counters
pub const GLOBAL_LOADS_COUNTER: &str = "flag_resolver_global_loads_total";
pub const SCOPE_LOADS_COUNTER: &str = "flag_resolver_scope_loads_total";
pub const WRITES_COUNTER: &str = "flag_resolver_writes_total";
pub const UNKNOWN_KEYS_ADMITTED_COUNTER: &str = "flag_resolver_unknown_keys_admitted_total";
pub const OVERRIDES_CLEARED_COUNTER: &str = "flag_resolver_overrides_cleared_total";

pub fn inc(name: &'static str, labels: &[(String, String)], value: u64) {
    let labels = labels.to_vec();
    metrics::counter!(name, &labels).increment(value);
}

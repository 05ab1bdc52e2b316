pub mod flag_merge;
pub mod flag_models;
pub mod resolver;

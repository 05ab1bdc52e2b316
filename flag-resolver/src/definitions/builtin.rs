use crate::flags::flag_models::FlagValue;

use super::{FlagCategory, FlagDefinition};

struct BuiltinFlag {
    key: &'static str,
    name: &'static str,
    description: &'static str,
    category: &'static str,
    enabled: bool,
    visible: bool,
}

const fn flag(
    key: &'static str,
    name: &'static str,
    description: &'static str,
    category: &'static str,
    enabled: bool,
    visible: bool,
) -> BuiltinFlag {
    BuiltinFlag {
        key,
        name,
        description,
        category,
        enabled,
        visible,
    }
}

const CATEGORIES: &[(&str, &str, &str)] = &[
    (
        "journey",
        "Journey",
        "Step tracking and milestones for the business journey",
    ),
    (
        "community",
        "Community",
        "Expert marketplace, bookings and community payments",
    ),
    (
        "finance",
        "Financial Planning",
        "Budgets, forecasts and scenario planning",
    ),
    ("analytics", "Analytics", "Dashboards, reports and exports"),
    ("decks", "Deck Builder", "Slide deck creation and sharing"),
    ("search", "Search", "Search across the workspace"),
];

const FLAGS: &[BuiltinFlag] = &[
    flag(
        "journey_tracking",
        "Journey tracking",
        "Track progress through journey steps",
        "journey",
        true,
        true,
    ),
    flag(
        "journey_templates",
        "Journey templates",
        "Start a journey from a prebuilt template",
        "journey",
        true,
        false,
    ),
    flag(
        "journey_reminders",
        "Step reminders",
        "Email reminders for stalled journey steps",
        "journey",
        false,
        false,
    ),
    flag(
        "community_marketplace",
        "Expert marketplace",
        "Browse and contact community experts",
        "community",
        true,
        true,
    ),
    flag(
        "expert_booking",
        "Expert booking",
        "Book paid sessions with experts",
        "community",
        true,
        false,
    ),
    flag(
        "community_payments",
        "Community payments",
        "Contracts and payouts for community work",
        "community",
        false,
        false,
    ),
    flag(
        "financial_planning",
        "Financial planning",
        "Budgets and projections",
        "finance",
        true,
        true,
    ),
    flag(
        "cash_flow_forecast",
        "Cash flow forecast",
        "Rolling cash flow forecast",
        "finance",
        false,
        false,
    ),
    flag(
        "scenario_modeling",
        "Scenario modeling",
        "Compare financial scenarios side by side",
        "finance",
        false,
        false,
    ),
    flag(
        "analytics_dashboard",
        "Analytics dashboard",
        "Charts for key business metrics",
        "analytics",
        true,
        true,
    ),
    flag(
        "custom_reports",
        "Custom reports",
        "Build and save custom reports",
        "analytics",
        false,
        false,
    ),
    flag(
        "data_export",
        "Data export",
        "Export analytics data as CSV",
        "analytics",
        true,
        false,
    ),
    flag(
        "deck_builder",
        "Deck builder",
        "Create slide decks from workspace data",
        "decks",
        true,
        true,
    ),
    flag(
        "deck_sharing",
        "Deck sharing",
        "Share decks with a public link",
        "decks",
        false,
        false,
    ),
    flag(
        "global_search",
        "Global search",
        "Search across every module",
        "search",
        true,
        true,
    ),
    flag(
        "beta_search",
        "Beta search",
        "New search ranking, in beta",
        "search",
        false,
        false,
    ),
];

pub fn definitions() -> Vec<FlagDefinition> {
    FLAGS
        .iter()
        .map(|f| FlagDefinition {
            key: f.key.to_string(),
            name: f.name.to_string(),
            description: f.description.to_string(),
            category: f.category.to_string(),
            default_value: FlagValue::new(f.enabled, f.visible),
        })
        .collect()
}

pub fn categories() -> Vec<FlagCategory> {
    CATEGORIES
        .iter()
        .map(|(category, name, description)| FlagCategory {
            category: category.to_string(),
            name: name.to_string(),
            description: description.to_string(),
        })
        .collect()
}

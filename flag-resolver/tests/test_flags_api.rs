use anyhow::Result;
use assert_json_diff::assert_json_include;
use reqwest::{Method, StatusCode};
use serde_json::{json, Value};

use crate::common::*;
mod common;

#[tokio::test]
async fn it_serves_catalog_defaults() -> Result<()> {
    let server = ServerHandle::for_config(DEFAULT_CONFIG.clone()).await;

    let res = server.get("/flags").await;
    assert_eq!(StatusCode::OK, res.status());

    let json_data = res.json::<Value>().await?;
    assert_json_include!(
        actual: json_data,
        expected: json!({
            "flags": {
                "beta_search": {"enabled": false, "visible": false, "override": false},
                "journey_tracking": {"enabled": true, "visible": true, "override": false},
            },
            "active_scope": null,
        })
    );

    Ok(())
}

#[tokio::test]
async fn it_serves_definitions() -> Result<()> {
    let server = ServerHandle::for_config(DEFAULT_CONFIG.clone()).await;

    let definitions = server.get("/definitions").await.json::<Vec<Value>>().await?;
    assert!(definitions
        .iter()
        .any(|d| d["key"] == json!("beta_search")
            && d["default_value"] == json!({"enabled": false, "visible": false})));

    let groups = server
        .get("/definitions/grouped")
        .await
        .json::<Vec<Value>>()
        .await?;
    let grouped: usize = groups
        .iter()
        .map(|g| g["features"].as_array().map_or(0, Vec::len))
        .sum();
    assert_eq!(grouped, definitions.len());

    Ok(())
}

#[tokio::test]
async fn it_resolves_scopes_over_http() -> Result<()> {
    let server = ServerHandle::for_config(DEFAULT_CONFIG.clone()).await;

    let res = server
        .send_json(Method::POST, "/flags", &json!({"beta_search": {"enabled": true}}))
        .await;
    assert_eq!(StatusCode::OK, res.status());

    let res = server
        .send_json(
            Method::PUT,
            "/overrides/company/companyA",
            &json!({"beta_search": {"visible": true}}),
        )
        .await;
    assert_json_include!(
        actual: res.json::<Value>().await?,
        expected: json!({
            "flags": {"beta_search": {"enabled": true, "visible": true, "override": true}},
            "active_scope": {"scope_type": "company", "scope_id": "companyA"},
        })
    );

    let res = server
        .send_json(
            Method::PUT,
            "/overrides/user/user1",
            &json!({"beta_search": {"enabled": false}}),
        )
        .await;
    assert_json_include!(
        actual: res.json::<Value>().await?,
        expected: json!({
            "flags": {"beta_search": {"enabled": false, "visible": true, "override": true}},
            "active_scope": {"scope_type": "user", "scope_id": "user1"},
        })
    );

    // suppressed while the user scope is active
    let res = server
        .send_empty(Method::POST, "/overrides/company/companyA/load")
        .await;
    assert_json_include!(
        actual: res.json::<Value>().await?,
        expected: json!({
            "flags": {"beta_search": {"enabled": false, "visible": true, "override": true}},
        })
    );

    let res = server.send_empty(Method::DELETE, "/overrides").await;
    assert_json_include!(
        actual: res.json::<Value>().await?,
        expected: json!({
            "flags": {"beta_search": {"enabled": false, "visible": false, "override": false}},
            "active_scope": null,
        })
    );

    // the company record is still stored and applies once the user scope is gone
    let res = server
        .send_empty(Method::POST, "/overrides/company/companyA/load")
        .await;
    assert_json_include!(
        actual: res.json::<Value>().await?,
        expected: json!({
            "flags": {"beta_search": {"enabled": false, "visible": true, "override": true}},
            "active_scope": {"scope_type": "company", "scope_id": "companyA"},
        })
    );

    Ok(())
}

#[tokio::test]
async fn it_resets_to_defaults() -> Result<()> {
    let server = ServerHandle::for_config(DEFAULT_CONFIG.clone()).await;

    server
        .send_json(
            Method::POST,
            "/flags",
            &json!({"deck_sharing": {"enabled": true, "visible": true}}),
        )
        .await;
    let res = server.get("/flags/deck_sharing").await;
    assert_eq!(
        res.json::<Value>().await?,
        json!({"key": "deck_sharing", "enabled": true, "visible": true, "override": false})
    );

    let res = server.send_empty(Method::POST, "/flags/reset").await;
    assert_eq!(StatusCode::OK, res.status());

    let res = server.get("/flags/deck_sharing").await;
    assert_eq!(
        res.json::<Value>().await?,
        json!({"key": "deck_sharing", "enabled": false, "visible": false, "override": false})
    );

    Ok(())
}

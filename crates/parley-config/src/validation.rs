// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Semantic checks that serde attributes cannot express.
//!
//! All problems are collected; validation never stops at the first one.

use parley_core::widget::MAX_RAG_TOP_K;

use crate::diagnostic::ConfigError;
use crate::model::ParleyConfig;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];
const SCOPES: &[&str] = &["tab", "persistent"];

pub fn validate_config(config: &ParleyConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    check_http_url(&mut errors, "chat.endpoint", &config.chat.endpoint);
    if !(1..=MAX_RAG_TOP_K).contains(&config.chat.rag_top_k) {
        errors.push(ConfigError::validation(
            "chat.rag_top_k",
            format!("must be between 1 and {MAX_RAG_TOP_K}, got {}", config.chat.rag_top_k),
        ));
    }
    if config.chat.connect_timeout_secs == Some(0) {
        errors.push(ConfigError::validation(
            "chat.connect_timeout_secs",
            "must be positive; omit it to use the transport default",
        ));
    }
    if config.chat.tenant_id.as_deref().is_some_and(|t| t.trim().is_empty()) {
        errors.push(ConfigError::validation("chat.tenant_id", "must not be blank"));
    }

    let subscription = &config.subscription;
    check_http_url(&mut errors, "subscription.api_base_url", &subscription.api_base_url);
    if subscription.cache_ttl_secs == 0 {
        errors.push(ConfigError::validation(
            "subscription.cache_ttl_secs",
            "must be positive",
        ));
    }
    if subscription.request_timeout_secs == 0 {
        errors.push(ConfigError::validation(
            "subscription.request_timeout_secs",
            "must be positive",
        ));
    }

    for (i, origin) in config.bridge.allowed_origins.iter().enumerate() {
        if !is_origin(origin) {
            errors.push(ConfigError::validation(
                format!("bridge.allowed_origins[{i}]"),
                format!("`{origin}` is not an origin like https://shop.example"),
            ));
        }
    }
    if let Some(own) = &config.bridge.own_origin
        && !is_origin(own)
    {
        errors.push(ConfigError::validation(
            "bridge.own_origin",
            format!("`{own}` is not an origin like https://shop.example"),
        ));
    }

    if !SCOPES.contains(&config.session.scope.as_str()) {
        errors.push(ConfigError::validation(
            "session.scope",
            format!("must be one of {}, got `{}`", SCOPES.join(", "), config.session.scope),
        ));
    }
    check_http_url(&mut errors, "session.jobs_url", &config.session.jobs_url);
    if config.session.poll_interval_secs == 0 {
        errors.push(ConfigError::validation("session.poll_interval_secs", "must be positive"));
    }
    if config.session.poll_max_errors == 0 {
        errors.push(ConfigError::validation("session.poll_max_errors", "must be at least 1"));
    }

    let widget = &config.widget;
    if widget.min_width > widget.max_width {
        errors.push(ConfigError::validation(
            "widget.min_width",
            format!("{} exceeds max_width {}", widget.min_width, widget.max_width),
        ));
    }
    if widget.min_height > widget.max_height {
        errors.push(ConfigError::validation(
            "widget.min_height",
            format!("{} exceeds max_height {}", widget.min_height, widget.max_height),
        ));
    }

    if !LOG_LEVELS.contains(&config.logging.level.to_ascii_lowercase().as_str()) {
        errors.push(ConfigError::validation(
            "logging.level",
            format!("must be one of {}, got `{}`", LOG_LEVELS.join(", "), config.logging.level),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_http_url(errors: &mut Vec<ConfigError>, field: &str, value: &str) {
    let value = value.trim();
    let rest = value
        .strip_prefix("https://")
        .or_else(|| value.strip_prefix("http://"));
    if rest.is_none_or(|host| host.is_empty() || host.starts_with('/')) {
        errors.push(ConfigError::validation(
            field,
            format!("`{value}` is not an http(s) URL"),
        ));
    }
}

/// `scheme://host[:port]` with nothing after the authority.
fn is_origin(value: &str) -> bool {
    match value.split_once("://") {
        Some((scheme, authority)) => {
            !scheme.is_empty()
                && scheme.chars().all(|c| c.is_ascii_alphanumeric() || "+-.".contains(c))
                && !authority.is_empty()
                && !authority.contains('/')
        }
        None => false,
    }
}

// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `parley access`, `parley health` and `parley clear-cache`.

use colored::Colorize;
use parley_config::ParleyConfig;
use parley_core::ParleyError;
use parley_gate::StatusLookup;

use crate::engine;

pub async fn run_access(
    config: &ParleyConfig,
    customer: Option<String>,
    no_cache: bool,
) -> Result<(), ParleyError> {
    let store = engine::open_store(&config.storage)?;
    let service = engine::subscription_service(config, store)?;

    let customer_id = customer
        .or_else(|| service.cached_customer_id())
        .or_else(|| config.subscription.customer_id.clone())
        .ok_or_else(|| {
            ParleyError::Config(
                "no customer known; pass --customer or set subscription.customer_id".into(),
            )
        })?;
    service.cache().set_customer_id(&customer_id);

    let lookup = service.get_subscription_status(&customer_id, !no_cache).await?;
    println!("{}", describe(&lookup));
    Ok(())
}

fn describe(lookup: &StatusLookup) -> String {
    let record = &lookup.record;
    let verdict = if lookup.has_access() {
        "access granted".green().bold()
    } else {
        "no access".red().bold()
    };
    let mut out = format!("{verdict}: {} is {}", record.customer_id, record.status);
    if let Some(end) = record.current_period_end {
        let ending = if record.cancel_at_period_end { "ends" } else { "renews" };
        out.push_str(&format!(", {ending} {}", end.format("%Y-%m-%d")));
    }
    let source = if lookup.from_cache {
        format!("cached at {}", lookup.cached_at.to_rfc3339())
    } else {
        "fetched from backend".to_string()
    };
    out.push_str(&format!("\n{}", source.dimmed()));
    out
}

pub async fn run_health(config: &ParleyConfig) -> Result<(), ParleyError> {
    let store = engine::open_store(&config.storage)?;
    let service = engine::subscription_service(config, store)?;

    let health = service.health().await?;
    let version = health.version.as_deref().unwrap_or("unknown");
    println!("backend: {} (version {version})", health.status.green());

    match service.get_config().await {
        Ok(public) => {
            println!("publishable key: {}", public.publishable_key);
            if let Some(price) = public.price_id {
                println!("price: {price}");
            }
        }
        Err(e) => eprintln!("{}: config unavailable: {e}", "warning".yellow()),
    }
    Ok(())
}

pub fn run_clear_cache(config: &ParleyConfig) -> Result<(), ParleyError> {
    let store = engine::open_store(&config.storage)?;
    let service = engine::subscription_service(config, store)?;
    service.clear_cache();
    println!("{}", "subscription cache cleared".dimmed());
    Ok(())
}

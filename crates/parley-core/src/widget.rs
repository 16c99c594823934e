// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Runtime widget options and the pure patch function used by `INIT_CONFIG`
//! and `UPDATE_CONFIG`.
//!
//! Host pages send loosely typed JSON objects. Only the keys listed on
//! [`WidgetOptions`] are recognised; every other key, and every recognised key
//! whose value has the wrong shape, is ignored and reported back in the
//! [`ApplyReport`]. Applying the same patch to the same options always yields
//! the same result.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Corner of the host page the launcher is docked to.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum WidgetPosition {
    #[default]
    BottomRight,
    BottomLeft,
}

/// Colour scheme requested by the host.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum WidgetTheme {
    #[default]
    Light,
    Dark,
    Auto,
}

/// Upper bound accepted for `ragTopK`.
pub const MAX_RAG_TOP_K: u32 = 20;

/// Options the host page may set on the embedded session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WidgetOptions {
    /// `tenantId`: tenant sent with every chat request.
    pub tenant_id: Option<String>,
    /// `title`: header text of the chat window.
    pub title: String,
    /// `welcomeMessage`: greeting shown before the first turn.
    pub welcome_message: Option<String>,
    /// `placeholder`: hint text of the input box.
    pub placeholder: String,
    /// `primaryColor`: accent colour, `#rgb` or `#rrggbb`.
    pub primary_color: String,
    /// `position`: `bottom-right` or `bottom-left`.
    pub position: WidgetPosition,
    /// `theme`: `light`, `dark` or `auto`.
    pub theme: WidgetTheme,
    /// `useRag`: ask the backend to ground answers in tenant documents.
    pub use_rag: bool,
    /// `ragTopK`: number of retrieved passages, 1 to [`MAX_RAG_TOP_K`].
    pub rag_top_k: u32,
    /// `showBranding`: render the "powered by" footer.
    pub show_branding: bool,
}

impl Default for WidgetOptions {
    fn default() -> Self {
        Self {
            tenant_id: None,
            title: "Chat".to_string(),
            welcome_message: None,
            placeholder: "Type a message...".to_string(),
            primary_color: "#2563eb".to_string(),
            position: WidgetPosition::default(),
            theme: WidgetTheme::default(),
            use_rag: true,
            rag_top_k: 5,
            show_branding: true,
        }
    }
}

/// Outcome of applying a patch.
#[derive(Debug, Clone, PartialEq)]
pub struct ApplyReport {
    pub options: WidgetOptions,
    /// Keys that changed the options, in key order.
    pub applied: Vec<String>,
    /// Keys that were unknown or carried an unusable value, in key order.
    pub ignored: Vec<String>,
}

impl WidgetOptions {
    /// Applies the recognised keys of `patch` and returns the new options.
    ///
    /// A non-object patch changes nothing and reports a single ignored key `"$"`.
    pub fn apply(&self, patch: &serde_json::Value) -> ApplyReport {
        let mut options = self.clone();
        let mut applied = Vec::new();
        let mut ignored = Vec::new();

        let Some(map) = patch.as_object() else {
            return ApplyReport {
                options,
                applied,
                ignored: vec!["$".to_string()],
            };
        };

        for (key, value) in map {
            let accepted = match key.as_str() {
                "tenantId" => match value {
                    serde_json::Value::Null => {
                        options.tenant_id = None;
                        true
                    }
                    serde_json::Value::String(s) if !s.trim().is_empty() => {
                        options.tenant_id = Some(s.trim().to_string());
                        true
                    }
                    _ => false,
                },
                "title" => set_string(&mut options.title, value),
                "placeholder" => set_string(&mut options.placeholder, value),
                "welcomeMessage" => match value {
                    serde_json::Value::Null => {
                        options.welcome_message = None;
                        true
                    }
                    serde_json::Value::String(s) => {
                        options.welcome_message = Some(s.clone());
                        true
                    }
                    _ => false,
                },
                "primaryColor" => match value.as_str() {
                    Some(c) if is_hex_color(c) => {
                        options.primary_color = c.to_string();
                        true
                    }
                    _ => false,
                },
                "position" => match value.as_str().and_then(|s| s.parse().ok()) {
                    Some(p) => {
                        options.position = p;
                        true
                    }
                    None => false,
                },
                "theme" => match value.as_str().and_then(|s| s.parse().ok()) {
                    Some(t) => {
                        options.theme = t;
                        true
                    }
                    None => false,
                },
                "useRag" => set_bool(&mut options.use_rag, value),
                "showBranding" => set_bool(&mut options.show_branding, value),
                "ragTopK" => match value.as_u64() {
                    Some(k) if (1..=u64::from(MAX_RAG_TOP_K)).contains(&k) => {
                        options.rag_top_k = k as u32;
                        true
                    }
                    _ => false,
                },
                _ => false,
            };

            if accepted {
                applied.push(key.clone());
            } else {
                ignored.push(key.clone());
            }
        }

        ApplyReport {
            options,
            applied,
            ignored,
        }
    }
}

fn set_string(slot: &mut String, value: &serde_json::Value) -> bool {
    match value.as_str() {
        Some(s) => {
            *slot = s.to_string();
            true
        }
        None => false,
    }
}

fn set_bool(slot: &mut bool, value: &serde_json::Value) -> bool {
    match value.as_bool() {
        Some(b) => {
            *slot = b;
            true
        }
        None => false,
    }
}

fn is_hex_color(s: &str) -> bool {
    let Some(hex) = s.strip_prefix('#') else {
        return false;
    };
    matches!(hex.len(), 3 | 6) && hex.chars().all(|c| c.is_ascii_hexdigit())
}

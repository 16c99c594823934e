// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Control message vocabulary between the host page and the embedded session.

use parley_core::{ApplyReport, ParleyError, WidgetOptions};
use serde::Deserialize;
use strum::{Display, EnumString, IntoStaticStr};

/// Reserved message types the host may send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum InboundType {
    InitConfig,
    UpdateConfig,
    SendMessage,
    FocusRequest,
    PageVisible,
    WindowResize,
}

/// Reserved message types the embedded session sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum OutboundType {
    IframeReady,
    CloseWidget,
    ConversationCleared,
    NavigateToSubscribe,
}

/// A reserved inbound message, decoded, for the session to act on.
#[derive(Debug, Clone, PartialEq)]
pub enum BridgeEvent {
    /// Initial options from the host; `report.options` is the new full value.
    InitConfig(ApplyReport),
    UpdateConfig(ApplyReport),
    SendMessage(String),
    FocusRequest,
    PageVisible(bool),
    WindowResize { width: u32, height: u32 },
}

impl BridgeEvent {
    pub fn kind(&self) -> InboundType {
        match self {
            BridgeEvent::InitConfig(_) => InboundType::InitConfig,
            BridgeEvent::UpdateConfig(_) => InboundType::UpdateConfig,
            BridgeEvent::SendMessage(_) => InboundType::SendMessage,
            BridgeEvent::FocusRequest => InboundType::FocusRequest,
            BridgeEvent::PageVisible(_) => InboundType::PageVisible,
            BridgeEvent::WindowResize { .. } => InboundType::WindowResize,
        }
    }
}

#[derive(Deserialize)]
struct SendMessageData {
    #[serde(alias = "text")]
    message: String,
}

#[derive(Deserialize)]
struct PageVisibleData {
    visible: bool,
}

#[derive(Deserialize)]
struct WindowResizeData {
    width: f64,
    height: f64,
}

/// Decodes the payload of a reserved inbound type.
///
/// `options` is the current widget options; config messages are applied to it.
pub fn decode_event(
    kind: InboundType,
    data: &serde_json::Value,
    options: &WidgetOptions,
) -> Result<BridgeEvent, ParleyError> {
    match kind {
        InboundType::InitConfig => Ok(BridgeEvent::InitConfig(options.apply(data))),
        InboundType::UpdateConfig => Ok(BridgeEvent::UpdateConfig(options.apply(data))),
        InboundType::SendMessage => {
            let text = match data {
                serde_json::Value::String(s) => s.clone(),
                other => serde_json::from_value::<SendMessageData>(other.clone())
                    .map_err(|e| ParleyError::Protocol(format!("SEND_MESSAGE payload: {e}")))?
                    .message,
            };
            if text.trim().is_empty() {
                return Err(ParleyError::Protocol("SEND_MESSAGE with empty text".into()));
            }
            Ok(BridgeEvent::SendMessage(text))
        }
        InboundType::FocusRequest => Ok(BridgeEvent::FocusRequest),
        InboundType::PageVisible => {
            // A bare PAGE_VISIBLE means the page became visible.
            if data.is_null() {
                return Ok(BridgeEvent::PageVisible(true));
            }
            let data: PageVisibleData = serde_json::from_value(data.clone())
                .map_err(|e| ParleyError::Protocol(format!("PAGE_VISIBLE payload: {e}")))?;
            Ok(BridgeEvent::PageVisible(data.visible))
        }
        InboundType::WindowResize => {
            let data: WindowResizeData = serde_json::from_value(data.clone())
                .map_err(|e| ParleyError::Protocol(format!("WINDOW_RESIZE payload: {e}")))?;
            Ok(BridgeEvent::WindowResize {
                width: to_pixels(data.width, "width")?,
                height: to_pixels(data.height, "height")?,
            })
        }
    }
}

fn to_pixels(value: f64, field: &str) -> Result<u32, ParleyError> {
    if !value.is_finite() || value < 0.0 || value > f64::from(u32::MAX) {
        return Err(ParleyError::Protocol(format!(
            "WINDOW_RESIZE {field} out of range: {value}"
        )));
    }
    Ok(value.round() as u32)
}

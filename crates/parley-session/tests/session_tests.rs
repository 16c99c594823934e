// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end session behaviour over fake transport, window and backend.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parley_bridge::{BridgeConfig, BridgeEvent, EmbeddingBridge};
use parley_core::platform::{MemoryStore, TargetOrigin};
use parley_core::{DeltaErrorKind, ParleyError, Role};
use parley_gate::{
    BlockReason, GateDecision, SubscriptionCache, SubscriptionGate, SubscriptionService,
    SubscriptionStatus, DEFAULT_TTL,
};
use parley_session::{
    load_or_create, Layout, SessionShell, TranscriptEvent, TurnOutcome, WidgetWindow,
    WindowBounds,
};
use parley_stream::{ChatSettings, StreamingChatClient};
use parley_test_utils::{
    FakeSubscriptionApi, ManualClock, RecordingWindow, ScriptedResponse, ScriptedTransport,
};
use serde_json::json;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

const HOST: &str = "https://shop.example";

struct Harness {
    shell: Arc<SessionShell>,
    transport: Arc<ScriptedTransport>,
    window: Arc<RecordingWindow>,
    events: mpsc::UnboundedReceiver<BridgeEvent>,
}

fn harness() -> Harness {
    build(None)
}

fn build(gate: Option<Arc<SubscriptionGate>>) -> Harness {
    build_with(ChatSettings::new("http://chat.test/api/chat"), gate)
}

fn build_with(settings: ChatSettings, gate: Option<Arc<SubscriptionGate>>) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let transport = Arc::new(ScriptedTransport::new());
    let window = Arc::new(RecordingWindow::new());
    let (bridge, events) = EmbeddingBridge::new(
        window.clone(),
        BridgeConfig {
            allowed_origins: vec![HOST.to_string()],
            allow_wildcard_fallback: true,
            ..BridgeConfig::default()
        },
    );
    let client = StreamingChatClient::new(
        transport.clone(),
        load_or_create(store.as_ref()),
        settings,
    );
    let mut shell = SessionShell::new(
        client,
        Arc::new(bridge),
        WidgetWindow::new(WindowBounds::default(), store),
    );
    if let Some(gate) = gate {
        shell = shell.with_gate(gate);
    }
    Harness {
        shell: Arc::new(shell),
        transport,
        window,
        events,
    }
}

fn gate(api: &Arc<FakeSubscriptionApi>) -> Arc<SubscriptionGate> {
    let cache = SubscriptionCache::new(
        Arc::new(MemoryStore::new()),
        Arc::new(ManualClock::at_epoch()),
        DEFAULT_TTL,
    );
    Arc::new(SubscriptionGate::new(Arc::new(SubscriptionService::new(
        api.clone(),
        cache,
    ))))
}

fn content_chunk(text: &str) -> Bytes {
    let payload = json!({"choices": [{"delta": {"content": text}}]});
    Bytes::from(format!("data: {payload}\n"))
}

/// Yields until `check` holds, failing the test after a second.
async fn eventually(mut check: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(1), async {
        while !check() {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("condition not reached");
}

#[tokio::test]
async fn completed_turn_is_assembled_in_place() {
    let h = harness();
    h.transport.push(ScriptedResponse::text(&["He", "llo"]));

    let outcome = h.shell.send_message("hi").await.unwrap();

    let TurnOutcome::Completed { content, .. } = outcome else {
        panic!("expected completion, got {outcome:?}");
    };
    assert_eq!(content, "Hello");
    let messages = h.shell.messages();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].role, Role::User);
    assert_eq!(messages[1].content, "Hello");
    assert_eq!(h.transport.requests()[0].body["message"], "hi");
}

#[tokio::test]
async fn deltas_are_broadcast_as_they_arrive() {
    let h = harness();
    h.transport.push(ScriptedResponse::text(&["He", "llo"]));
    let mut updates = h.shell.subscribe();

    let outcome = h.shell.send_message("hi").await.unwrap();
    let TurnOutcome::Completed { message_id, .. } = outcome else {
        panic!("expected completion, got {outcome:?}");
    };

    let mut streamed = Vec::new();
    while let Ok(event) = updates.try_recv() {
        streamed.push(event);
    }
    assert_eq!(
        streamed,
        vec![
            TranscriptEvent::Delta {
                message_id: message_id.clone(),
                text: "He".into()
            },
            TranscriptEvent::Delta {
                message_id,
                text: "llo".into()
            },
        ]
    );
}

#[tokio::test]
async fn second_send_supersedes_the_first() {
    let h = harness();
    let first_body = h.transport.push_channel();
    h.transport.push(ScriptedResponse::text(&["B"]));

    let shell = h.shell.clone();
    let first = tokio::spawn(async move { shell.send_message("A").await });

    first_body.send(Ok(content_chunk("partial A"))).unwrap();
    eventually(|| h.shell.messages().iter().any(|m| m.content == "partial A")).await;

    let second = h.shell.send_message("B").await.unwrap();
    assert!(second.is_completed());
    assert_eq!(first.await.unwrap().unwrap(), TurnOutcome::Cancelled);

    let transcript: Vec<(Role, String)> = h
        .shell
        .messages()
        .into_iter()
        .map(|m| (m.role, m.content))
        .collect();
    assert_eq!(
        transcript,
        vec![
            (Role::User, "A".to_string()),
            (Role::User, "B".to_string()),
            (Role::Assistant, "B".to_string()),
        ]
    );
    assert_eq!(h.transport.overlapping_opens(), 0);
}

#[tokio::test]
async fn cancel_before_any_delta_leaves_no_error() {
    let h = harness();
    let _body = h.transport.push_channel();

    let shell = h.shell.clone();
    let turn = tokio::spawn(async move { shell.send_message("hello?").await });
    eventually(|| h.transport.requests().len() == 1).await;

    h.shell.cancel();

    assert_eq!(turn.await.unwrap().unwrap(), TurnOutcome::Cancelled);
    assert_eq!(h.shell.messages().len(), 1);
    assert!(h.shell.last_failure().is_none());
    eventually(|| h.transport.live_bodies() == 0).await;
}

#[tokio::test]
async fn transport_failure_can_be_retried() {
    let h = harness();
    h.transport.push(ScriptedResponse::status(503, "overloaded"));
    h.transport.push(ScriptedResponse::text(&["ok"]));

    let failed = h.shell.send_message("hi").await.unwrap();
    let TurnOutcome::Failed { error, .. } = failed else {
        panic!("expected failure, got {failed:?}");
    };
    assert_eq!(error.kind, DeltaErrorKind::Transport);
    assert_eq!(error.status, Some(503));
    assert!(h.shell.last_failure().is_some());

    let retried = h.shell.retry_last().await.unwrap();
    assert!(retried.is_completed());
    let messages = h.shell.messages();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[1].content, "ok");
    assert_eq!(h.transport.requests().len(), 2);
    assert!(h.shell.last_failure().is_none());
}

#[tokio::test]
async fn stream_error_keeps_partial_text_until_retried() {
    let h = harness();
    h.transport.push(ScriptedResponse::chunks(vec![
        content_chunk("par"),
        Bytes::from_static(b"data: {\"error\":\"model unavailable\"}\n"),
    ]));
    h.transport.push(ScriptedResponse::text(&["full answer"]));

    let failed = h.shell.send_message("hi").await.unwrap();
    assert!(matches!(
        failed,
        TurnOutcome::Failed { ref error, .. } if error.kind == DeltaErrorKind::Stream
    ));
    // Partial content stays with the failed message.
    assert_eq!(h.shell.messages()[1].content, "par");

    let retried = h.shell.retry_last().await.unwrap();
    assert!(retried.is_completed());
    let messages = h.shell.messages();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[1].content, "full answer");
}

#[tokio::test]
async fn retry_without_a_failure_is_rejected() {
    let h = harness();
    assert!(matches!(
        h.shell.retry_last().await,
        Err(ParleyError::Protocol(_))
    ));
    assert!(h.transport.requests().is_empty());
}

#[tokio::test]
async fn empty_message_is_rejected_without_a_request() {
    let h = harness();
    assert!(matches!(
        h.shell.send_message("   ").await,
        Err(ParleyError::Protocol(_))
    ));
    assert!(h.transport.requests().is_empty());
    assert!(h.shell.messages().is_empty());
}

#[tokio::test]
async fn gate_blocks_until_access_is_confirmed() {
    let api = Arc::new(FakeSubscriptionApi::new());
    api.set_status("cus_1", SubscriptionStatus::Active);
    let gate = gate(&api);
    let h = build(Some(gate.clone()));
    h.transport.push(ScriptedResponse::text(&["welcome back"]));

    let blocked = h.shell.send_message("hi").await.unwrap();
    assert_eq!(
        blocked,
        TurnOutcome::Blocked(GateDecision::Blocked(BlockReason::NoSubscription))
    );
    assert!(h.transport.requests().is_empty());
    assert!(h.shell.messages().is_empty());

    gate.check_subscription(Some("cus_1")).await;
    assert!(h.shell.send_message("hi").await.unwrap().is_completed());
}

#[tokio::test]
async fn failed_access_check_takes_the_blocked_path() {
    let api = Arc::new(FakeSubscriptionApi::new());
    api.fail_with(Some("connection refused"));
    let gate = gate(&api);
    let h = build(Some(gate.clone()));

    gate.check_subscription(Some("cus_1")).await;
    let outcome = h.shell.send_message("hi").await.unwrap();

    assert!(matches!(
        outcome,
        TurnOutcome::Blocked(GateDecision::Blocked(BlockReason::CheckFailed(_)))
    ));
    assert!(h.transport.requests().is_empty());
}

#[tokio::test]
async fn upgrade_request_carries_customer() {
    let api = Arc::new(FakeSubscriptionApi::new());
    api.set_status("cus_9", SubscriptionStatus::Canceled);
    let gate = gate(&api);
    let h = build(Some(gate.clone()));
    h.shell.bridge().handle_inbound(HOST, json!({"type": "FOCUS_REQUEST"}));
    gate.check_subscription(Some("cus_9")).await;

    h.shell.request_upgrade().unwrap();

    let (message, target) = h.window.last().unwrap();
    assert_eq!(message.kind, "NAVIGATE_TO_SUBSCRIBE");
    assert_eq!(message.data["customerId"], "cus_9");
    assert_eq!(target, TargetOrigin::Origin(HOST.to_string()));
}

#[tokio::test]
async fn clear_and_close_notify_the_host() {
    let h = harness();
    h.transport.push(ScriptedResponse::text(&["hello"]));
    h.shell.send_message("hi").await.unwrap();

    h.shell.clear_history().unwrap();
    assert!(h.shell.messages().is_empty());

    h.shell.with_window(|w| w.open()).unwrap();
    h.shell.close().unwrap();
    assert!(!h.shell.with_window(|w| w.is_open()));

    let kinds = h.window.kinds();
    assert_eq!(
        &kinds[kinds.len() - 2..],
        &["CONVERSATION_CLEARED".to_string(), "CLOSE_WIDGET".to_string()]
    );
}

#[tokio::test]
async fn host_events_update_session_state() {
    let mut h = harness();
    h.transport.push(ScriptedResponse::text(&["hola"]));
    let bridge = h.shell.bridge().clone();

    bridge.handle_inbound(
        HOST,
        json!({"type": "INIT_CONFIG", "data": {"tenantId": "acme", "ragTopK": 3, "bogus": 1}}),
    );
    bridge.handle_inbound(HOST, json!({"type": "FOCUS_REQUEST"}));
    bridge.handle_inbound(
        HOST,
        json!({"type": "WINDOW_RESIZE", "data": {"width": 500, "height": 800}}),
    );
    bridge.handle_inbound(HOST, json!({"type": "PAGE_VISIBLE", "data": {"visible": false}}));

    while let Ok(event) = h.events.try_recv() {
        h.shell.handle_event(event).await.unwrap();
    }

    assert_eq!(h.shell.options().tenant_id.as_deref(), Some("acme"));
    assert_eq!(h.shell.layout(), Layout::Compact);
    assert!(h.shell.with_window(|w| w.is_open()));
    assert!(!h.shell.is_page_visible());
    assert!(!h.shell.is_focused());

    h.shell.send_message("hola").await.unwrap();
    let request = &h.transport.requests()[0];
    assert!(
        request
            .headers
            .iter()
            .any(|(k, v)| k == "X-Tenant-ID" && v == "acme")
    );
    assert_eq!(request.body["rag_top_k"], 3);
    assert_eq!(request.body["use_history"], true);
}

#[tokio::test]
async fn config_updates_keep_configured_request_flags() {
    let mut settings = ChatSettings::new("http://chat.test/api/chat");
    settings.tenant_id = Some("acme".into());
    settings.use_rag = false;
    settings.rag_top_k = 10;
    let mut h = build_with(settings, None);
    h.transport.push(ScriptedResponse::text(&["ok"]));
    h.transport.push(ScriptedResponse::text(&["ok"]));
    let bridge = h.shell.bridge().clone();
    assert!(!h.shell.options().use_rag);

    bridge.handle_inbound(HOST, json!({"type": "UPDATE_CONFIG", "data": {"title": "Help"}}));
    h.shell.handle_event(h.events.try_recv().unwrap()).await.unwrap();

    assert_eq!(h.shell.options().title, "Help");
    assert_eq!(h.shell.options().rag_top_k, 10);
    h.shell.send_message("first").await.unwrap();
    let request = &h.transport.requests()[0];
    assert_eq!(request.body["use_rag"], false);
    assert_eq!(request.body["rag_top_k"], 10);
    assert!(request.headers.iter().any(|(k, v)| k == "X-Tenant-ID" && v == "acme"));

    bridge.handle_inbound(HOST, json!({"type": "UPDATE_CONFIG", "data": {"tenantId": null}}));
    h.shell.handle_event(h.events.try_recv().unwrap()).await.unwrap();

    assert_eq!(h.shell.options().tenant_id, None);
    h.shell.send_message("second").await.unwrap();
    let request = &h.transport.requests()[1];
    assert!(!request.headers.iter().any(|(k, _)| k == "X-Tenant-ID"));
    assert_eq!(request.body["rag_top_k"], 10);
}

#[tokio::test]
async fn run_loop_answers_host_messages() {
    let h = harness();
    h.transport.push(ScriptedResponse::text(&["from ", "the loop"]));
    let cancel = CancellationToken::new();
    let bridge = h.shell.bridge().clone();
    let runner = tokio::spawn(h.shell.clone().run(h.events, cancel.clone()));

    bridge.handle_inbound(HOST, json!({"type": "SEND_MESSAGE", "data": {"message": "ping"}}));
    eventually(|| {
        h.shell
            .messages()
            .iter()
            .any(|m| m.content == "from the loop")
    })
    .await;

    cancel.cancel();
    runner.await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn host_sends_start_in_arrival_order() {
    for _ in 0..100 {
        let h = harness();
        let bodies = [h.transport.push_channel(), h.transport.push_channel()];
        let bridge = h.shell.bridge().clone();

        bridge.handle_inbound(HOST, json!({"type": "SEND_MESSAGE", "data": {"message": "A"}}));
        bridge.handle_inbound(HOST, json!({"type": "SEND_MESSAGE", "data": {"message": "B"}}));
        let cancel = CancellationToken::new();
        let runner = tokio::spawn(h.shell.clone().run(h.events, cancel.clone()));

        let transport = h.transport.clone();
        eventually(|| transport.requests().iter().any(|r| r.body["message"] == "B")).await;
        // A may or may not have opened before it was superseded, so answer on
        // both bodies; only the live one is read.
        for body in &bodies {
            let _ = body.send(Ok(content_chunk("answer")));
            let _ = body.send(Ok(Bytes::from_static(b"data: [DONE]\n")));
        }

        let expected = vec![
            (Role::User, "A".to_string()),
            (Role::User, "B".to_string()),
            (Role::Assistant, "answer".to_string()),
        ];
        let shell = h.shell.clone();
        eventually(|| {
            let transcript: Vec<(Role, String)> = shell
                .messages()
                .into_iter()
                .map(|m| (m.role, m.content))
                .collect();
            transcript == expected
        })
        .await;

        cancel.cancel();
        runner.await.unwrap();
    }
}

#[tokio::test]
async fn mount_announces_ready_to_any_host() {
    let h = harness();
    h.shell.mount().await.unwrap();
    let (message, target) = h.window.last().unwrap();
    assert_eq!(message.kind, "IFRAME_READY");
    assert_eq!(target, TargetOrigin::Wildcard);
}

mod common;

use axum::http::{Method, StatusCode};
use common::*;
use kindred_friends::list_messages;
use kindred_server::api_reply::REPLY_IN_PROGRESS;
use kindred_types::{is_alternating_history, MessageRole};
use serde_json::json;
use std::sync::atomic::Ordering;
use std::time::Duration;

#[tokio::test]
async fn greeting_turn_returns_audio_and_stores_one_pair() {
    let t = setup();
    let (_, token) = register(&t.router, "sam@example.com", "Sam").await;
    let friend_id = generate_friend(&t.router, &token).await;

    let res = send(
        &t.router,
        request(
            Method::POST,
            "/api/generate",
            Some(&token),
            Some(reply_body(&friend_id, "")),
        ),
    )
    .await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.headers["content-type"], "audio/mpeg");
    assert_eq!(res.headers["content-disposition"], "inline");
    assert_eq!(res.body, AUDIO);

    // One chat call, spoken in the stored voice.
    assert_eq!(t.chat.reply_requests().len(), 1);
    assert_eq!(
        t.speech.calls(),
        vec![(REPLY_TEXT.to_string(), "aura-luna-en".to_string())]
    );

    let conn = t.pool.get().unwrap();
    let messages = list_messages(&conn, &friend_id).unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].role, MessageRole::User);
    assert_eq!(messages[0].message, "");
    assert_eq!(messages[1].role, MessageRole::Friend);
    assert_eq!(messages[1].message, REPLY_TEXT);
}

#[tokio::test]
async fn conversation_history_feeds_the_next_prompt() {
    let t = setup();
    let (_, token) = register(&t.router, "sam@example.com", "Sam").await;
    let friend_id = generate_friend(&t.router, &token).await;

    for line in ["", "I adopted a cat named Biscuit today."] {
        let res = send(
            &t.router,
            request(
                Method::POST,
                "/api/generate",
                Some(&token),
                Some(reply_body(&friend_id, line)),
            ),
        )
        .await;
        assert_eq!(res.status, StatusCode::OK);
    }

    let prompts = t.chat.reply_requests();
    assert_eq!(prompts.len(), 2);
    assert!(prompts[1].system_prompt.contains("Biscuit"));
    assert!(prompts[1].system_prompt.contains(REPLY_TEXT));
    assert!(prompts[1].system_prompt.contains("Sam"));

    let conn = t.pool.get().unwrap();
    let messages = list_messages(&conn, &friend_id).unwrap();
    assert_eq!(messages.len(), 4);
    assert!(is_alternating_history(&messages));
}

#[tokio::test]
async fn reply_requires_account_before_any_provider_call() {
    let t = setup();
    let res = send(
        &t.router,
        request(
            Method::POST,
            "/api/generate",
            None,
            Some(reply_body("some-friend", "hello")),
        ),
    )
    .await;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);
    assert!(t.chat.requests().is_empty());
    assert!(t.speech.calls().is_empty());
}

#[tokio::test]
async fn unknown_token_is_unauthorized() {
    let t = setup();
    let res = send(
        &t.router,
        request(
            Method::POST,
            "/api/generate",
            Some("not-a-real-token"),
            Some(json!({ "type": "friend" })),
        ),
    )
    .await;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);
    assert!(t.chat.requests().is_empty());
}

#[tokio::test]
async fn other_accounts_friend_is_not_found() {
    let t = setup();
    let (_, owner) = register(&t.router, "owner@example.com", "Owner").await;
    let (_, stranger) = register(&t.router, "stranger@example.com", "Stranger").await;
    let friend_id = generate_friend(&t.router, &owner).await;

    let res = send(
        &t.router,
        request(
            Method::POST,
            "/api/generate",
            Some(&stranger),
            Some(reply_body(&friend_id, "hi")),
        ),
    )
    .await;
    assert_eq!(res.status, StatusCode::NOT_FOUND);
    assert_eq!(res.message(), "Friend not found");
    assert!(t.chat.reply_requests().is_empty());

    let res = send(
        &t.router,
        request(
            Method::GET,
            &format!("/api/friends/{}", friend_id),
            Some(&stranger),
            None,
        ),
    )
    .await;
    assert_eq!(res.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn missing_friend_id_is_a_bad_request() {
    let t = setup();
    let (_, token) = register(&t.router, "sam@example.com", "Sam").await;
    let res = send(
        &t.router,
        request(
            Method::POST,
            "/api/generate",
            Some(&token),
            Some(json!({ "type": "response", "userMessage": "hi" })),
        ),
    )
    .await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn failed_speech_leaves_history_untouched() {
    let t = setup();
    let (_, token) = register(&t.router, "sam@example.com", "Sam").await;
    let friend_id = generate_friend(&t.router, &token).await;
    t.speech.out_of_credits.store(true, Ordering::SeqCst);

    let res = send(
        &t.router,
        request(
            Method::POST,
            "/api/generate",
            Some(&token),
            Some(reply_body(&friend_id, "hello?")),
        ),
    )
    .await;
    assert_eq!(res.status, StatusCode::PAYMENT_REQUIRED);
    assert_eq!(res.message(), kindred_generation::OUT_OF_CREDITS_MESSAGE);

    let conn = t.pool.get().unwrap();
    assert!(list_messages(&conn, &friend_id).unwrap().is_empty());
}

#[tokio::test]
async fn concurrent_reply_for_same_friend_conflicts() {
    let t = setup();
    let (_, token) = register(&t.router, "sam@example.com", "Sam").await;
    let friend_id = generate_friend(&t.router, &token).await;
    t.chat.hold_replies.store(true, Ordering::SeqCst);

    let router = t.router.clone();
    let first_body = reply_body(&friend_id, "first");
    let first_token = token.clone();
    let first = tokio::spawn(async move {
        send(
            &router,
            request(Method::POST, "/api/generate", Some(&first_token), Some(first_body)),
        )
        .await
    });

    tokio::time::timeout(Duration::from_secs(5), t.chat.reply_started.notified())
        .await
        .unwrap();

    let res = send(
        &t.router,
        request(
            Method::POST,
            "/api/generate",
            Some(&token),
            Some(reply_body(&friend_id, "second")),
        ),
    )
    .await;
    assert_eq!(res.status, StatusCode::CONFLICT);
    assert_eq!(res.message(), REPLY_IN_PROGRESS);

    t.chat.release_reply.notify_one();
    let first = first.await.unwrap();
    assert_eq!(first.status, StatusCode::OK);

    let conn = t.pool.get().unwrap();
    let messages = list_messages(&conn, &friend_id).unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].message, "first");
}

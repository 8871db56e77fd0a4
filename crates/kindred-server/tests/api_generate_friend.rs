mod common;

use axum::http::{Method, StatusCode};
use common::*;
use kindred_friends::account_stats;
use kindred_server::middleware::{ANONYMOUS_LIMIT_MESSAGE, AUTHENTICATED_LIMIT_MESSAGE};
use kindred_types::{RateLimitPolicy, WindowQuota};
use serde_json::json;
use std::sync::atomic::Ordering;

fn friend_request(token: Option<&str>) -> axum::http::Request<axum::body::Body> {
    request(Method::POST, "/api/generate", token, Some(json!({ "type": "friend" })))
}

#[tokio::test]
async fn anonymous_caller_gets_one_friend_then_is_limited() {
    let t = setup();

    let res = send(&t.router, friend_request(None)).await;
    assert_eq!(res.status, StatusCode::OK);
    let friend = res.json();
    assert_eq!(friend["name"], "Mara");
    assert_eq!(friend["voice"], "aura-luna-en");
    assert!(friend.get("id").is_none());
    let image_url = friend["imageUrl"].as_str().unwrap();
    assert!(image_url.starts_with("http://kindred.test/uploads/friends/"));
    assert!(image_url.ends_with(".png"));

    let res = send(&t.router, friend_request(None)).await;
    assert_eq!(res.status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(res.message(), ANONYMOUS_LIMIT_MESSAGE);
    let retry_after: u64 = res.headers["retry-after"].to_str().unwrap().parse().unwrap();
    assert!(retry_after > 0 && retry_after <= 21600);

    // The limited request never reached a provider.
    assert_eq!(t.chat.requests().len(), 1);
    assert_eq!(t.images.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn anonymous_quota_follows_forwarded_address_behind_proxy() {
    let t = setup_behind_proxy();

    let mut first = friend_request(None);
    first
        .headers_mut()
        .insert("x-forwarded-for", "203.0.113.7, 10.0.0.1".parse().unwrap());
    assert_eq!(send(&t.router, first).await.status, StatusCode::OK);

    let mut other_client = friend_request(None);
    other_client
        .headers_mut()
        .insert("x-forwarded-for", "198.51.100.2".parse().unwrap());
    assert_eq!(send(&t.router, other_client).await.status, StatusCode::OK);

    let mut again = friend_request(None);
    again
        .headers_mut()
        .insert("x-forwarded-for", "203.0.113.7".parse().unwrap());
    assert_eq!(
        send(&t.router, again).await.status,
        StatusCode::TOO_MANY_REQUESTS
    );
}

#[tokio::test]
async fn forwarded_address_is_ignored_without_trusted_proxy() {
    let t = setup();

    for (i, forwarded) in ["203.0.113.7", "198.51.100.2", "192.0.2.44"].iter().enumerate() {
        let mut req = friend_request(None);
        req.headers_mut()
            .insert("x-forwarded-for", forwarded.parse().unwrap());
        let expected = if i == 0 {
            StatusCode::OK
        } else {
            StatusCode::TOO_MANY_REQUESTS
        };
        assert_eq!(send(&t.router, req).await.status, expected, "{}", forwarded);
    }
    assert_eq!(t.images.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn failed_friend_insert_removes_stored_image() {
    let t = setup();
    let (account_id, token) = register(&t.router, "sam@example.com", "Sam").await;
    t.images.hold.store(true, Ordering::SeqCst);

    let router = t.router.clone();
    let pending = tokio::spawn(async move { send(&router, friend_request(Some(&token))).await });
    t.images.generate_started.notified().await;

    // The account vanishes while the portrait is being generated, so the
    // friend row fails its foreign key.
    t.pool
        .get()
        .unwrap()
        .execute("DELETE FROM accounts WHERE id = ?1", [&account_id])
        .unwrap();
    t.images.release.notify_one();

    let res = pending.await.unwrap();
    assert_eq!(res.status, StatusCode::INTERNAL_SERVER_ERROR);

    let friends_dir = t.uploads.path().join("friends");
    let leftover = std::fs::read_dir(&friends_dir)
        .map(|entries| entries.count())
        .unwrap_or(0);
    assert_eq!(leftover, 0);
}

#[tokio::test]
async fn account_friend_is_persisted_with_a_durable_image() {
    let t = setup();
    let (account_id, token) = register(&t.router, "sam@example.com", "Sam").await;

    let friend_id = generate_friend(&t.router, &token).await;

    let res = send(
        &t.router,
        request(Method::GET, &format!("/api/friends/{}", friend_id), Some(&token), None),
    )
    .await;
    assert_eq!(res.status, StatusCode::OK);
    let friend = res.json();
    assert_eq!(friend["id"], friend_id.as_str());
    assert_eq!(friend["messages"], json!([]));

    let image = t
        .uploads
        .path()
        .join("friends")
        .join(format!("{}.png", friend_id));
    assert!(image.exists());
    assert_eq!(
        friend["imageUrl"],
        format!("http://kindred.test/uploads/friends/{}.png", friend_id)
    );

    let conn = t.pool.get().unwrap();
    assert_eq!(account_stats(&conn, &account_id).unwrap().total_friends, 1);
}

#[tokio::test]
async fn stored_image_is_served_from_uploads() {
    let t = setup();
    let (_, token) = register(&t.router, "sam@example.com", "Sam").await;
    let friend_id = generate_friend(&t.router, &token).await;

    let res = send(
        &t.router,
        request(
            Method::GET,
            &format!("/uploads/friends/{}.png", friend_id),
            None,
            None,
        ),
    )
    .await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(&res.body[..4], b"\x89PNG");
}

#[tokio::test]
async fn account_quota_is_separate_from_anonymous_quota() {
    let t = setup_with_policy(RateLimitPolicy {
        anonymous: WindowQuota {
            quota: 1,
            window_secs: 600,
        },
        authenticated: WindowQuota {
            quota: 2,
            window_secs: 600,
        },
    });
    let (_, token) = register(&t.router, "sam@example.com", "Sam").await;

    assert_eq!(send(&t.router, friend_request(None)).await.status, StatusCode::OK);
    assert_eq!(
        send(&t.router, friend_request(Some(&token))).await.status,
        StatusCode::OK
    );
    assert_eq!(
        send(&t.router, friend_request(Some(&token))).await.status,
        StatusCode::OK
    );

    let res = send(&t.router, friend_request(Some(&token))).await;
    assert_eq!(res.status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(res.message(), AUTHENTICATED_LIMIT_MESSAGE);
}

#[tokio::test]
async fn unusable_image_fails_without_creating_a_friend() {
    let t = setup();
    let (account_id, token) = register(&t.router, "sam@example.com", "Sam").await;
    *t.images.data.lock().unwrap() = "PGh0bWw+".to_string();

    let res = send(&t.router, friend_request(Some(&token))).await;
    assert_eq!(res.status, StatusCode::BAD_GATEWAY);
    assert_eq!(
        res.message(),
        kindred_generation::OUT_OF_CREDITS_MESSAGE
    );

    let conn = t.pool.get().unwrap();
    assert_eq!(account_stats(&conn, &account_id).unwrap().total_friends, 0);
}

#[tokio::test]
async fn legacy_friend_route_generates_too() {
    let t = setup();
    let (_, token) = register(&t.router, "sam@example.com", "Sam").await;

    let res = send(&t.router, request(Method::POST, "/api/friend", Some(&token), None)).await;
    assert_eq!(res.status, StatusCode::OK);
    let created_id = res.json()["id"].as_str().unwrap().to_string();

    let res = send(&t.router, request(Method::GET, "/api/friend", Some(&token), None)).await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.json()["id"], created_id.as_str());
}

#[tokio::test]
async fn current_friend_requires_account_and_existing_friend() {
    let t = setup();
    let res = send(&t.router, request(Method::GET, "/api/friend", None, None)).await;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);

    let (_, token) = register(&t.router, "sam@example.com", "Sam").await;
    let res = send(&t.router, request(Method::GET, "/api/friend", Some(&token), None)).await;
    assert_eq!(res.status, StatusCode::NOT_FOUND);
    assert_eq!(res.message(), "Friend not found");
}

#[tokio::test]
async fn invalid_request_type_is_rejected() {
    let t = setup();
    for body in [json!({ "type": "poem" }), json!({})] {
        let res = send(
            &t.router,
            request(Method::POST, "/api/generate", None, Some(body)),
        )
        .await;
        assert_eq!(res.status, StatusCode::BAD_REQUEST);
        assert_eq!(res.message(), "Invalid request type");
    }

    let res = send(
        &t.router,
        request(Method::POST, "/api/generate", None, None),
    )
    .await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert!(t.chat.requests().is_empty());
}

#[tokio::test]
async fn health_reports_ok() {
    let t = setup();
    let res = send(&t.router, request(Method::GET, "/health", None, None)).await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.json()["status"], "ok");
}

mod support;

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
};
use serde_json::json;

use support::build_app;

fn set_cookies(headers: &axum::http::HeaderMap) -> Vec<String> {
    headers
        .get_all(header::SET_COOKIE)
        .iter()
        .map(|value| value.to_str().unwrap().to_owned())
        .collect()
}

fn cookie_pair(set_cookie: &str) -> &str {
    set_cookie.split(';').next().unwrap()
}

#[tokio::test]
async fn health_and_status_respond() {
    let app = build_app();
    let health = app.request(Method::GET, "/health", None, None).await;
    assert_eq!(health.status, StatusCode::OK);

    let status = app.request(Method::GET, "/api/v1/status", None, None).await;
    assert_eq!(status.status, StatusCode::OK);
    assert_eq!(status.body["status"], "ok");
}

#[tokio::test]
async fn cookie_session_lifecycle() {
    let app = build_app();
    app.register("alice").await;

    let login = app
        .request(
            Method::POST,
            "/api/v1/users/login",
            None,
            Some(json!({ "email": "alice@example.com", "password": "password123" })),
        )
        .await;
    assert_eq!(login.status, StatusCode::OK);
    assert!(login.body["user"].get("password").is_none());
    let cookies = set_cookies(&login.headers);
    assert_eq!(cookies.len(), 2);
    let access = cookies.iter().find(|c| c.starts_with("accessToken=")).unwrap();
    let refresh = cookies.iter().find(|c| c.starts_with("refreshToken=")).unwrap();
    assert!(access.contains("HttpOnly"));

    // 只带 cookie 访问受保护接口
    let me = app
        .send(
            Request::builder()
                .uri("/api/v1/users/me")
                .header(header::COOKIE, cookie_pair(access))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(me.status, StatusCode::OK);
    assert_eq!(me.body["email"], "alice@example.com");

    let refreshed = app
        .send(
            Request::builder()
                .uri("/api/v1/users/refresh_token")
                .header(header::COOKIE, cookie_pair(refresh))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(refreshed.status, StatusCode::OK);
    assert!(refreshed.body["accessToken"].as_str().is_some());

    let logout = app
        .send(
            Request::builder()
                .method(Method::DELETE)
                .uri("/api/v1/users/logout")
                .header(header::COOKIE, cookie_pair(access))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(logout.status, StatusCode::OK);
    assert!(set_cookies(&logout.headers)
        .iter()
        .all(|c| c.contains("Max-Age=0")));

    // 登出后刷新令牌失效
    let after = app
        .send(
            Request::builder()
                .uri("/api/v1/users/refresh_token")
                .header(header::COOKIE, cookie_pair(refresh))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(after.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn authentication_errors() {
    let app = build_app();
    app.register("bob").await;

    let duplicate = app
        .request(
            Method::POST,
            "/api/v1/users/register",
            None,
            Some(json!({
                "username": "bobby",
                "email": "BOB@example.com",
                "password": "password123",
            })),
        )
        .await;
    assert_eq!(duplicate.status, StatusCode::CONFLICT);

    let weak = app
        .request(
            Method::POST,
            "/api/v1/users/register",
            None,
            Some(json!({
                "username": "carol",
                "email": "carol@example.com",
                "password": "short",
            })),
        )
        .await;
    assert_eq!(weak.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(weak.body["code"], "VALIDATION_ERROR");

    let wrong = app
        .request(
            Method::POST,
            "/api/v1/users/login",
            None,
            Some(json!({ "email": "bob@example.com", "password": "password999" })),
        )
        .await;
    assert_eq!(wrong.status, StatusCode::UNAUTHORIZED);

    let anonymous = app.request(Method::GET, "/api/v1/users/me", None, None).await;
    assert_eq!(anonymous.status, StatusCode::UNAUTHORIZED);

    let garbage = app
        .request(Method::GET, "/api/v1/users/me", Some("not-a-jwt"), None)
        .await;
    assert_eq!(garbage.status, StatusCode::UNAUTHORIZED);

    let malformed = app
        .send(
            Request::builder()
                .method(Method::POST)
                .uri("/api/v1/users/login")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await;
    assert_eq!(malformed.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn profile_update_and_favorites() {
    let app = build_app();
    let admin = app.signup_admin("admin").await;
    let seller = app.signup("seller").await;
    let buyer = app.signup("buyer").await;
    let category = app.create_category(&admin, "Bicycles").await;
    let listing = app
        .create_listing(&seller, &category, "Vintage road bike", 120.0)
        .await;

    let updated = app
        .request(
            Method::PUT,
            "/api/v1/users/update",
            Some(&buyer.token),
            Some(json!({ "displayName": "Buyer B", "phoneNumber": "0123456789" })),
        )
        .await;
    assert_eq!(updated.status, StatusCode::OK);
    assert_eq!(updated.body["displayName"], "Buyer B");

    for _ in 0..2 {
        let added = app
            .request(
                Method::POST,
                "/api/v1/users/favorites",
                Some(&buyer.token),
                Some(json!({ "listingId": listing })),
            )
            .await;
        assert_eq!(added.status, StatusCode::OK);
        assert_eq!(added.body["favorites"], json!([listing]));
    }

    let favorites = app
        .request(Method::GET, "/api/v1/users/favorites", Some(&buyer.token), None)
        .await;
    assert_eq!(favorites.status, StatusCode::OK);
    assert_eq!(favorites.body.as_array().unwrap().len(), 1);
    assert_eq!(favorites.body[0]["title"], "Vintage road bike");

    let removed = app
        .request(
            Method::DELETE,
            &format!("/api/v1/users/favorites/{listing}"),
            Some(&buyer.token),
            None,
        )
        .await;
    assert_eq!(removed.status, StatusCode::OK);
    assert_eq!(removed.body["favorites"], json!([]));

    let unknown = app
        .request(
            Method::POST,
            "/api/v1/users/favorites",
            Some(&buyer.token),
            Some(json!({ "listingId": "0123456789abcdef01234567" })),
        )
        .await;
    assert_eq!(unknown.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn listing_search_and_view_counting() {
    let app = build_app();
    let admin = app.signup_admin("admin").await;
    let seller = app.signup("seller").await;
    let viewer = app.signup("viewer").await;
    let category = app.create_category(&admin, "Bicycles").await;
    let bike = app
        .create_listing(&seller, &category, "Vintage road bike", 120.0)
        .await;
    app.create_listing(&seller, &category, "Mountain bike frame", 300.0)
        .await;

    let search = app
        .request(
            Method::GET,
            "/api/v1/listings/search?search=VINTAGE&maxPrice=200",
            None,
            None,
        )
        .await;
    assert_eq!(search.status, StatusCode::OK);
    assert_eq!(search.body["pagination"]["totalItems"], 1);
    assert_eq!(search.body["data"][0]["id"], bike.as_str());
    assert_eq!(search.body["data"][0]["seller"]["username"], "seller");

    let sorted = app
        .request(
            Method::GET,
            "/api/v1/listings?sortBy=price&sortOrder=asc&limit=1",
            None,
            None,
        )
        .await;
    assert_eq!(sorted.status, StatusCode::OK);
    assert_eq!(sorted.body["data"][0]["price"], 120.0);
    assert_eq!(sorted.body["pagination"]["totalPages"], 2);

    // 卖家本人浏览不计数，其他用户重复浏览只计一次
    let path = format!("/api/v1/listings/{bike}");
    app.request(Method::GET, &path, Some(&seller.token), None).await;
    app.request(Method::GET, &path, Some(&viewer.token), None).await;
    let details = app
        .request(Method::GET, &path, Some(&viewer.token), None)
        .await;
    assert_eq!(details.status, StatusCode::OK);
    assert_eq!(details.body["views"], 1);
    assert_eq!(details.body["seller"]["username"], "seller");

    let invalid = app
        .request(Method::GET, "/api/v1/listings/not-an-id", None, None)
        .await;
    assert_eq!(invalid.status, StatusCode::UNPROCESSABLE_ENTITY);

    let missing = app
        .request(
            Method::GET,
            "/api/v1/listings/0123456789abcdef01234567",
            None,
            None,
        )
        .await;
    assert_eq!(missing.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn listing_ownership_and_moderation() {
    let app = build_app();
    let admin = app.signup_admin("admin").await;
    let seller = app.signup("seller").await;
    let other = app.signup("other").await;
    let category = app.create_category(&admin, "Phones").await;

    let pending = app
        .request(
            Method::POST,
            "/api/v1/listings",
            Some(&seller.token),
            Some(json!({
                "title": "Old smartphone",
                "description": "Works fine, minor scratches",
                "price": 50,
                "categoryId": category,
                "condition": "like_new",
            })),
        )
        .await;
    assert_eq!(pending.status, StatusCode::CREATED);
    assert_eq!(pending.body["status"], "PENDING");
    let id = pending.body["id"].as_str().unwrap().to_owned();

    let self_published = app
        .request(
            Method::POST,
            "/api/v1/listings",
            Some(&seller.token),
            Some(json!({
                "title": "Another smartphone",
                "description": "Trying to skip the review queue",
                "price": 60,
                "categoryId": category,
                "condition": "used",
                "status": "PUBLISHED",
            })),
        )
        .await;
    assert_eq!(self_published.status, StatusCode::FORBIDDEN);

    let hidden = app
        .request(Method::GET, "/api/v1/listings/all", None, None)
        .await;
    assert_eq!(hidden.body["pagination"]["totalItems"], 0);

    let mine = app
        .request(Method::GET, "/api/v1/listings/me", Some(&seller.token), None)
        .await;
    assert_eq!(mine.body["pagination"]["totalItems"], 1);

    let foreign_edit = app
        .request(
            Method::PUT,
            &format!("/api/v1/listings/{id}"),
            Some(&other.token),
            Some(json!({ "price": 1 })),
        )
        .await;
    assert_eq!(foreign_edit.status, StatusCode::FORBIDDEN);

    let client_moderation = app
        .request(
            Method::PUT,
            &format!("/api/v1/listings/{id}/status"),
            Some(&seller.token),
            Some(json!({ "status": "PUBLISHED" })),
        )
        .await;
    assert_eq!(client_moderation.status, StatusCode::FORBIDDEN);

    let published = app
        .request(
            Method::PUT,
            &format!("/api/v1/listings/{id}/status"),
            Some(&admin.token),
            Some(json!({ "status": "PUBLISHED" })),
        )
        .await;
    assert_eq!(published.status, StatusCode::OK);
    assert_eq!(published.body["status"], "PUBLISHED");

    let visible = app
        .request(Method::GET, "/api/v1/listings/all", None, None)
        .await;
    assert_eq!(visible.body["pagination"]["totalItems"], 1);

    // 管理员可以按状态筛选，普通用户的状态参数被忽略
    let pending_only = app
        .request(
            Method::GET,
            "/api/v1/listings/search?status=PENDING,REJECTED",
            Some(&admin.token),
            None,
        )
        .await;
    assert_eq!(pending_only.body["pagination"]["totalItems"], 0);
    let client_filter = app
        .request(
            Method::GET,
            "/api/v1/listings/search?status=PENDING",
            Some(&other.token),
            None,
        )
        .await;
    assert_eq!(client_filter.body["pagination"]["totalItems"], 1);

    let too_short = app
        .request(
            Method::PUT,
            &format!("/api/v1/listings/{id}"),
            Some(&seller.token),
            Some(json!({ "title": "bad" })),
        )
        .await;
    assert_eq!(too_short.status, StatusCode::UNPROCESSABLE_ENTITY);

    let deleted = app
        .request(
            Method::DELETE,
            &format!("/api/v1/listings/{id}"),
            Some(&seller.token),
            None,
        )
        .await;
    assert_eq!(deleted.status, StatusCode::OK);
    let gone = app
        .request(Method::GET, &format!("/api/v1/listings/{id}"), None, None)
        .await;
    assert_eq!(gone.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn category_management() {
    let app = build_app();
    let admin = app.signup_admin("admin").await;
    let client = app.signup("client").await;

    let forbidden = app
        .request(
            Method::POST,
            "/api/v1/categories",
            Some(&client.token),
            Some(json!({ "name": "Books" })),
        )
        .await;
    assert_eq!(forbidden.status, StatusCode::FORBIDDEN);

    let parent = app
        .request(
            Method::POST,
            "/api/v1/categories",
            Some(&admin.token),
            Some(json!({ "name": "Home Garden", "code": "HOME" })),
        )
        .await;
    assert_eq!(parent.status, StatusCode::CREATED);
    assert_eq!(parent.body["slug"], "home-garden");
    let parent_id = parent.body["id"].as_str().unwrap().to_owned();

    let duplicate = app
        .request(
            Method::POST,
            "/api/v1/categories",
            Some(&admin.token),
            Some(json!({ "name": "Household", "code": "HOME" })),
        )
        .await;
    assert_eq!(duplicate.status, StatusCode::CONFLICT);

    let child = app
        .request(
            Method::POST,
            "/api/v1/categories",
            Some(&admin.token),
            Some(json!({ "name": "Furniture", "parentId": parent_id })),
        )
        .await;
    assert_eq!(child.status, StatusCode::CREATED);
    let child_id = child.body["id"].as_str().unwrap().to_owned();

    let cycle = app
        .request(
            Method::PUT,
            &format!("/api/v1/categories/{parent_id}"),
            Some(&admin.token),
            Some(json!({ "parentId": child_id })),
        )
        .await;
    assert_eq!(cycle.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(cycle.body["code"], "CATEGORY_CYCLE");

    let listed = app
        .request(Method::GET, "/api/v1/categories?search=furn", None, None)
        .await;
    assert_eq!(listed.status, StatusCode::OK);
    assert_eq!(listed.body["pagination"]["totalItems"], 1);

    let removed = app
        .request(
            Method::DELETE,
            &format!("/api/v1/categories/{child_id}"),
            Some(&admin.token),
            None,
        )
        .await;
    assert_eq!(removed.status, StatusCode::OK);
    let fetched = app
        .request(
            Method::GET,
            &format!("/api/v1/categories/{child_id}"),
            None,
            None,
        )
        .await;
    assert_eq!(fetched.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn reviews_belong_to_their_author() {
    let app = build_app();
    let admin = app.signup_admin("admin").await;
    let seller = app.signup("seller").await;
    let buyer = app.signup("buyer").await;
    let category = app.create_category(&admin, "Cameras").await;
    let listing = app
        .create_listing(&seller, &category, "Film camera body", 80.0)
        .await;

    let created = app
        .request(
            Method::POST,
            "/api/v1/reviews",
            Some(&buyer.token),
            Some(json!({ "listingId": listing, "rating": 4, "comment": "Nice" })),
        )
        .await;
    assert_eq!(created.status, StatusCode::CREATED);
    let review_id = created.body["id"].as_str().unwrap().to_owned();

    let out_of_range = app
        .request(
            Method::POST,
            "/api/v1/reviews",
            Some(&buyer.token),
            Some(json!({ "listingId": listing, "rating": 6 })),
        )
        .await;
    assert_eq!(out_of_range.status, StatusCode::UNPROCESSABLE_ENTITY);

    let listed = app
        .request(
            Method::GET,
            &format!("/api/v1/reviews/listing/{listing}"),
            None,
            None,
        )
        .await;
    assert_eq!(listed.body.as_array().unwrap().len(), 1);

    let foreign = app
        .request(
            Method::PUT,
            &format!("/api/v1/reviews/{review_id}"),
            Some(&seller.token),
            Some(json!({ "rating": 1 })),
        )
        .await;
    assert_eq!(foreign.status, StatusCode::FORBIDDEN);

    let revised = app
        .request(
            Method::PUT,
            &format!("/api/v1/reviews/{review_id}"),
            Some(&buyer.token),
            Some(json!({ "rating": 5 })),
        )
        .await;
    assert_eq!(revised.status, StatusCode::OK);
    assert_eq!(revised.body["rating"], 5);

    let deleted = app
        .request(
            Method::DELETE,
            &format!("/api/v1/reviews/{review_id}"),
            Some(&buyer.token),
            None,
        )
        .await;
    assert_eq!(deleted.status, StatusCode::OK);
    let empty = app
        .request(
            Method::GET,
            &format!("/api/v1/reviews/listing/{listing}"),
            None,
            None,
        )
        .await;
    assert_eq!(empty.body, json!([]));
}

#[tokio::test]
async fn direct_messaging_flow() {
    let app = build_app();
    let alice = app.signup("alice").await;
    let bob = app.signup("bob").await;

    let conversation = app
        .request(
            Method::POST,
            "/api/v1/messages/find-or-create",
            Some(&alice.token),
            Some(json!({ "receiverId": bob.user_id.to_string() })),
        )
        .await;
    assert_eq!(conversation.status, StatusCode::OK);
    let conversation_id = conversation.body["id"].as_str().unwrap().to_owned();

    let again = app
        .request(
            Method::POST,
            "/api/v1/messages/find-or-create",
            Some(&bob.token),
            Some(json!({ "receiverId": alice.user_id.to_string() })),
        )
        .await;
    assert_eq!(again.body["id"], conversation_id.as_str());

    let sent = app
        .request(
            Method::POST,
            "/api/v1/messages",
            Some(&alice.token),
            Some(json!({
                "receiverId": bob.user_id.to_string(),
                "message": "Is the bike still available?",
                "location": { "latitude": 21.03, "longitude": 105.85 },
            })),
        )
        .await;
    assert_eq!(sent.status, StatusCode::CREATED);
    assert_eq!(sent.body["conversationId"], conversation_id.as_str());
    assert_eq!(sent.body["location"]["latitude"], 21.03);

    let empty = app
        .request(
            Method::POST,
            "/api/v1/messages",
            Some(&alice.token),
            Some(json!({ "receiverId": bob.user_id.to_string() })),
        )
        .await;
    assert_eq!(empty.status, StatusCode::UNPROCESSABLE_ENTITY);

    let to_self = app
        .request(
            Method::POST,
            "/api/v1/messages",
            Some(&alice.token),
            Some(json!({ "receiverId": alice.user_id.to_string(), "message": "hi" })),
        )
        .await;
    assert_eq!(to_self.status, StatusCode::UNPROCESSABLE_ENTITY);

    let history = app
        .request(
            Method::GET,
            &format!("/api/v1/messages/{}", alice.user_id),
            Some(&bob.token),
            None,
        )
        .await;
    assert_eq!(history.status, StatusCode::OK);
    assert_eq!(history.body.as_array().unwrap().len(), 1);

    let conversations = app
        .request(Method::GET, "/api/v1/messages/conversations", Some(&bob.token), None)
        .await;
    assert_eq!(conversations.body[0]["otherParticipant"]["username"], "alice");
    assert_eq!(
        conversations.body[0]["lastMessage"]["message"],
        "Is the bike still available?"
    );

    let deleted = app
        .request(
            Method::DELETE,
            &format!("/api/v1/messages/conversations/{conversation_id}"),
            Some(&bob.token),
            None,
        )
        .await;
    assert_eq!(deleted.status, StatusCode::OK);
    let cleared = app
        .request(
            Method::GET,
            &format!("/api/v1/messages/{}", bob.user_id),
            Some(&alice.token),
            None,
        )
        .await;
    assert_eq!(cleared.body, json!([]));
}

#[tokio::test]
async fn admin_user_management_and_dashboard() {
    let app = build_app();
    let admin = app.signup_admin("admin").await;
    let client = app.signup("client").await;

    let denied = app
        .request(Method::GET, "/api/v1/admin/users", Some(&client.token), None)
        .await;
    assert_eq!(denied.status, StatusCode::FORBIDDEN);

    let created = app
        .request(
            Method::POST,
            "/api/v1/admin/users",
            Some(&admin.token),
            Some(json!({
                "username": "moderator",
                "email": "moderator@example.com",
                "password": "password123",
                "role": "admin",
                "displayName": "Mod",
            })),
        )
        .await;
    assert_eq!(created.status, StatusCode::CREATED);
    assert_eq!(created.body["role"], "admin");
    let created_id = created.body["id"].as_str().unwrap().to_owned();

    let listed = app
        .request(
            Method::GET,
            "/api/v1/admin/users?sortBy=username&sortOrder=asc",
            Some(&admin.token),
            None,
        )
        .await;
    assert_eq!(listed.status, StatusCode::OK);
    assert_eq!(listed.body["pagination"]["totalItems"], 3);
    assert_eq!(listed.body["data"][0]["username"], "admin");

    let bad_sort = app
        .request(
            Method::GET,
            "/api/v1/admin/users?sortBy=password",
            Some(&admin.token),
            None,
        )
        .await;
    assert_eq!(bad_sort.status, StatusCode::UNPROCESSABLE_ENTITY);

    let deactivated = app
        .request(
            Method::PUT,
            &format!("/api/v1/admin/users/{}", client.user_id),
            Some(&admin.token),
            Some(json!({ "isActive": false, "displayName": "Suspended" })),
        )
        .await;
    assert_eq!(deactivated.status, StatusCode::OK);
    assert_eq!(deactivated.body["isActive"], false);

    let inactive_login = app
        .request(
            Method::POST,
            "/api/v1/users/login",
            None,
            Some(json!({ "email": "client@example.com", "password": "password123" })),
        )
        .await;
    assert_eq!(inactive_login.status, StatusCode::FORBIDDEN);

    let removed = app
        .request(
            Method::DELETE,
            &format!("/api/v1/admin/users/{created_id}"),
            Some(&admin.token),
            None,
        )
        .await;
    assert_eq!(removed.status, StatusCode::OK);
    let fetched = app
        .request(
            Method::GET,
            &format!("/api/v1/admin/users/{created_id}"),
            Some(&admin.token),
            None,
        )
        .await;
    assert_eq!(fetched.status, StatusCode::NOT_FOUND);

    let stats = app
        .request(Method::GET, "/api/v1/dashboard/stats", Some(&admin.token), None)
        .await;
    assert_eq!(stats.status, StatusCode::OK);
    assert_eq!(stats.body["totalUsers"], 2);
    assert_eq!(stats.body["userGrowth"].as_array().unwrap().len(), 6);
    assert_eq!(stats.body["listingActivity"].as_array().unwrap().len(), 7);

    let client_stats = app
        .request(Method::GET, "/api/v1/dashboard/stats", Some(&client.token), None)
        .await;
    assert_eq!(client_stats.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn status_filters_and_malformed_queries() {
    let app = build_app();
    let admin = app.signup_admin("admin").await;
    let seller = app.signup("seller").await;
    let category = app.create_category(&admin, "Cameras").await;

    let pending = app
        .request(
            Method::POST,
            "/api/v1/listings",
            Some(&seller.token),
            Some(json!({
                "title": "Instant camera",
                "description": "Waiting for an admin to approve",
                "price": 40,
                "categoryId": category,
                "condition": "used",
            })),
        )
        .await;
    assert_eq!(pending.status, StatusCode::CREATED);
    app.create_listing(&seller, &category, "Mirrorless body", 600.0)
        .await;
    let expired = app
        .request(
            Method::POST,
            "/api/v1/listings",
            Some(&admin.token),
            Some(json!({
                "title": "Old flash unit",
                "description": "Imported from an archived listing",
                "price": 15,
                "categoryId": category,
                "condition": "used",
                "status": "EXPIRED",
            })),
        )
        .await;
    assert_eq!(expired.status, StatusCode::CREATED);
    assert_eq!(expired.body["status"], "EXPIRED");

    for (query, expected) in [
        ("status=PENDING&status=EXPIRED", 2),
        ("status%5B%5D=PUBLISHED&status%5B%5D=PENDING", 2),
        ("status=PENDING,PUBLISHED&status=EXPIRED", 3),
        ("status=PENDING&status=PENDING", 1),
        ("", 3),
    ] {
        let page = app
            .request(
                Method::GET,
                &format!("/api/v1/listings/search?{query}"),
                Some(&admin.token),
                None,
            )
            .await;
        assert_eq!(page.status, StatusCode::OK, "{query}");
        assert_eq!(page.body["pagination"]["totalItems"], expected, "{query}");
    }

    let ordinary = app
        .request(
            Method::GET,
            "/api/v1/listings/search?status=PENDING&status=EXPIRED",
            Some(&seller.token),
            None,
        )
        .await;
    assert_eq!(ordinary.body["pagination"]["totalItems"], 1);
    assert_eq!(ordinary.body["data"][0]["status"], "PUBLISHED");

    let unknown_status = app
        .request(
            Method::GET,
            "/api/v1/listings/search?status=SOLD",
            Some(&admin.token),
            None,
        )
        .await;
    assert_eq!(unknown_status.status, StatusCode::UNPROCESSABLE_ENTITY);

    for (uri, token) in [
        ("/api/v1/listings/search?minPrice=cheap", None),
        ("/api/v1/listings/all?page=first", None),
        ("/api/v1/categories?limit=-1", None),
        ("/api/v1/admin/users?page=two", Some(admin.token.as_str())),
    ] {
        let response = app.request(Method::GET, uri, token, None).await;
        assert_eq!(response.status, StatusCode::UNPROCESSABLE_ENTITY, "{uri}");
        assert_eq!(response.body["code"], "VALIDATION_ERROR", "{uri}");
        assert!(response.body["message"].is_string(), "{uri}");
    }
}

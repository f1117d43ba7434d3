#![allow(dead_code)]

use std::sync::Arc;

use application::{
    CategoryService, CategoryServiceDependencies, Clock, ConnectionRegistry, DashboardService,
    DashboardServiceDependencies, ListingService, ListingServiceDependencies,
    LocalConnectionRegistry, MemoryStore, MessageBroadcaster, MessagingService,
    MessagingServiceDependencies, PasswordHasher, PlaintextPasswordHasher, ReviewService,
    ReviewServiceDependencies, ListingRepository, SystemClock, UserRepository, UserService, UserServiceDependencies,
};
use axum::{
    body::{to_bytes, Body},
    http::{header, HeaderMap, Method, Request, StatusCode},
    Router,
};
use config::AppConfig;
use domain::{ListingId, ListingStatus, ReadScope, UserId, UserRole};
use serde_json::{json, Value};
use tower::ServiceExt;
use web_api::{router, AppState, JwtService};

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub store: Arc<MemoryStore>,
}

pub struct Session {
    pub user_id: UserId,
    pub token: String,
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

pub fn build_app() -> TestApp {
    let config = AppConfig::development();
    let store = Arc::new(MemoryStore::new());
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let password_hasher: Arc<dyn PasswordHasher> = Arc::new(PlaintextPasswordHasher);
    let registry = Arc::new(LocalConnectionRegistry::new(
        config.realtime.channel_capacity,
    ));

    let state = AppState {
        user_service: Arc::new(UserService::new(UserServiceDependencies {
            user_repository: store.clone(),
            listing_repository: store.clone(),
            password_hasher,
            clock: clock.clone(),
        })),
        listing_service: Arc::new(ListingService::new(ListingServiceDependencies {
            listing_repository: store.clone(),
            category_repository: store.clone(),
            user_repository: store.clone(),
            clock: clock.clone(),
        })),
        category_service: Arc::new(CategoryService::new(CategoryServiceDependencies {
            category_repository: store.clone(),
            clock: clock.clone(),
        })),
        review_service: Arc::new(ReviewService::new(ReviewServiceDependencies {
            review_repository: store.clone(),
            listing_repository: store.clone(),
            clock: clock.clone(),
        })),
        messaging_service: Arc::new(MessagingService::new(MessagingServiceDependencies {
            user_repository: store.clone(),
            conversation_repository: store.clone(),
            message_repository: store.clone(),
            broadcaster: registry.clone() as Arc<dyn MessageBroadcaster>,
            clock: clock.clone(),
            echo_to_sender: false,
        })),
        dashboard_service: Arc::new(DashboardService::new(DashboardServiceDependencies {
            dashboard_repository: store.clone(),
            clock,
        })),
        connections: registry as Arc<dyn ConnectionRegistry>,
        jwt_service: Arc::new(JwtService::new(&config.jwt)),
        cookie_secure: false,
    };

    TestApp {
        router: router(state.clone()),
        state,
        store,
    }
}

impl TestApp {
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let body = match body {
            Some(value) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(value.to_string())
            }
            None => Body::empty(),
        };
        self.send(builder.body(body).unwrap()).await
    }

    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        TestResponse {
            status,
            headers,
            body,
        }
    }

    pub async fn register(&self, name: &str) -> UserId {
        let response = self
            .request(
                Method::POST,
                "/api/v1/users/register",
                None,
                Some(json!({
                    "username": name,
                    "email": format!("{name}@example.com"),
                    "password": "password123",
                })),
            )
            .await;
        assert_eq!(response.status, StatusCode::CREATED, "{:?}", response.body);
        UserId::parse(response.body["id"].as_str().unwrap()).unwrap()
    }

    pub async fn login(&self, name: &str) -> Session {
        let response = self
            .request(
                Method::POST,
                "/api/v1/users/login",
                None,
                Some(json!({
                    "email": format!("{name}@example.com"),
                    "password": "password123",
                })),
            )
            .await;
        assert_eq!(response.status, StatusCode::OK, "{:?}", response.body);
        Session {
            user_id: UserId::parse(response.body["user"]["id"].as_str().unwrap()).unwrap(),
            token: response.body["accessToken"].as_str().unwrap().to_owned(),
        }
    }

    pub async fn signup(&self, name: &str) -> Session {
        self.register(name).await;
        self.login(name).await
    }

    /// 直接改存储里的角色后重新登录，令牌才带上新角色。
    pub async fn signup_admin(&self, name: &str) -> Session {
        let user_id = self.register(name).await;
        let mut user = UserRepository::find_by_id(self.store.as_ref(), user_id, ReadScope::Live)
            .await
            .unwrap()
            .unwrap();
        user.role = UserRole::Admin;
        UserRepository::update(self.store.as_ref(), user)
            .await
            .unwrap();
        self.login(name).await
    }

    pub async fn create_category(&self, admin: &Session, name: &str) -> String {
        let response = self
            .request(
                Method::POST,
                "/api/v1/categories",
                Some(&admin.token),
                Some(json!({ "name": name })),
            )
            .await;
        assert_eq!(response.status, StatusCode::CREATED, "{:?}", response.body);
        response.body["id"].as_str().unwrap().to_owned()
    }

    /// 卖家发布后直接在存储里改为已上架，省去审核步骤。
    pub async fn create_listing(
        &self,
        seller: &Session,
        category_id: &str,
        title: &str,
        price: f64,
    ) -> String {
        let response = self
            .request(
                Method::POST,
                "/api/v1/listings",
                Some(&seller.token),
                Some(json!({
                    "title": title,
                    "description": "Gently used and well kept",
                    "price": price,
                    "categoryId": category_id,
                    "condition": "used",
                    "location": "Hanoi",
                })),
            )
            .await;
        assert_eq!(response.status, StatusCode::CREATED, "{:?}", response.body);
        let id = response.body["id"].as_str().unwrap().to_owned();

        let listing_id = ListingId::parse(&id).unwrap();
        let mut listing =
            ListingRepository::find_by_id(self.store.as_ref(), listing_id, ReadScope::Live)
                .await
                .unwrap()
                .unwrap();
        listing.status = ListingStatus::Published;
        ListingRepository::update(self.store.as_ref(), listing)
            .await
            .unwrap();
        id
    }
}

//! HTTP-level tests against in-memory storage and a manual clock.

use std::str::FromStr;
use std::sync::Arc;

use actix_web::http::StatusCode;
use actix_web::{test, web, App};
use bigdecimal::BigDecimal;
use serde_json::{json, Value};
use uuid::Uuid;

use order_core::application::{AppServices, CoreSettings};
use order_core::clock::{Clock, ManualClock};
use order_core::domain::auth::Actor;
use order_core::domain::product::NewProduct;
use order_core::handlers;
use order_core::handlers::orders::OrderResponse;
use order_core::handlers::products::ProductResponse;
use order_core::infrastructure::memory::{InMemoryCatalog, InMemoryLedger};

struct Harness {
    services: AppServices,
    clock: Arc<ManualClock>,
    admin: Uuid,
}

fn harness() -> Harness {
    let clock = Arc::new(ManualClock::new(chrono::Utc::now()));
    let services = AppServices::new(
        Arc::new(InMemoryCatalog::new()),
        Arc::new(InMemoryLedger::new()),
        clock.clone(),
        CoreSettings::default(),
    );
    Harness {
        services,
        clock,
        admin: Uuid::new_v4(),
    }
}

impl Harness {
    fn product(&self, price: &str, stock: i32) -> Uuid {
        self.services
            .catalog
            .create_product(
                &Actor::admin(self.admin),
                NewProduct {
                    name: "Saucepan".into(),
                    price: BigDecimal::from_str(price).unwrap(),
                    currency: "USD".into(),
                    stock_quantity: stock,
                    images: vec!["saucepan.jpg".into()],
                },
            )
            .unwrap()
            .id
    }

    fn clock_now_rfc3339(&self) -> String {
        self.clock.now().to_rfc3339()
    }
}

fn as_user(req: test::TestRequest, user: Uuid) -> test::TestRequest {
    req.insert_header(("X-User-Id", user.to_string()))
        .insert_header(("X-User-Roles", "USER"))
}

fn as_admin(req: test::TestRequest, admin: Uuid) -> test::TestRequest {
    req.insert_header(("X-User-Id", admin.to_string()))
        .insert_header(("X-User-Roles", "USER,ADMIN"))
}

fn cart(product_id: Uuid, quantity: i32) -> Value {
    json!({
        "customer_name": "Ada",
        "phone": "555-0100",
        "address": "1 Main St",
        "payment_method": "COD",
        "items": [{ "product_id": product_id, "quantity": quantity }]
    })
}

macro_rules! app {
    ($h:expr) => {
        test::init_service(
            App::new()
                .app_data(web::Data::new($h.services.clone()))
                .configure(handlers::configure),
        )
        .await
    };
}

#[actix_web::test]
async fn placing_an_order_prices_the_cart_and_takes_stock() {
    let h = harness();
    let app = app!(h);
    let product = h.product("10.0", 5);
    let user = Uuid::new_v4();

    let req = as_user(test::TestRequest::post().uri("/api/orders"), user)
        .set_json(cart(product, 3))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);

    let order: OrderResponse = test::read_body_json(resp).await;
    assert_eq!(order.status, "PENDING");
    assert_eq!(order.user_id, user);
    assert_eq!(BigDecimal::from_str(&order.total_amount).unwrap(), BigDecimal::from(30));
    assert_eq!(order.items.len(), 1);
    assert_eq!(order.items[0].image, "saucepan.jpg");

    let req = test::TestRequest::get()
        .uri(&format!("/api/products/{}", product))
        .to_request();
    let p: ProductResponse = test::call_and_read_body_json(&app, req).await;
    assert_eq!(p.stock_quantity, 2);
}

#[actix_web::test]
async fn insufficient_stock_is_a_bad_request_and_changes_nothing() {
    let h = harness();
    let app = app!(h);
    let product = h.product("4.00", 1);
    let user = Uuid::new_v4();

    let req = as_user(test::TestRequest::post().uri("/api/orders"), user)
        .set_json(cart(product, 2))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert!(body["error"].as_str().unwrap().contains("Insufficient stock"));

    let req = as_user(test::TestRequest::get().uri("/api/orders/mine"), user).to_request();
    let mine: Vec<OrderResponse> = test::call_and_read_body_json(&app, req).await;
    assert!(mine.is_empty());
}

#[actix_web::test]
async fn unknown_product_is_not_found() {
    let h = harness();
    let app = app!(h);

    let req = as_user(test::TestRequest::post().uri("/api/orders"), Uuid::new_v4())
        .set_json(cart(Uuid::new_v4(), 1))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn unknown_payment_method_is_rejected() {
    let h = harness();
    let app = app!(h);
    let product = h.product("1", 5);

    let mut body = cart(product, 1);
    body["payment_method"] = json!("CRYPTO");
    let req = as_user(test::TestRequest::post().uri("/api/orders"), Uuid::new_v4())
        .set_json(body)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn missing_identity_is_unauthorized() {
    let h = harness();
    let app = app!(h);
    let product = h.product("1", 5);

    let req = test::TestRequest::post()
        .uri("/api/orders")
        .set_json(cart(product, 1))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "Authentication required");
}

#[actix_web::test]
async fn admin_routes_require_the_admin_role() {
    let h = harness();
    let app = app!(h);

    let req = as_user(test::TestRequest::get().uri("/api/admin/orders"), Uuid::new_v4())
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::FORBIDDEN);

    let req = as_admin(test::TestRequest::get().uri("/api/admin/orders"), h.admin).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);
}

#[actix_web::test]
async fn orders_are_visible_to_owner_and_admin_only() {
    let h = harness();
    let app = app!(h);
    let product = h.product("2", 10);
    let alice = Uuid::new_v4();
    let bob = Uuid::new_v4();

    let req = as_user(test::TestRequest::post().uri("/api/orders"), alice)
        .set_json(cart(product, 1))
        .to_request();
    let order: OrderResponse = test::call_and_read_body_json(&app, req).await;

    let uri = format!("/api/orders/{}", order.id);
    let req = as_user(test::TestRequest::get().uri(&uri), bob).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::FORBIDDEN);

    let req = as_user(test::TestRequest::get().uri(&uri), alice).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);

    let req = as_admin(
        test::TestRequest::get().uri(&format!("/api/users/{}/orders", alice)),
        h.admin,
    )
    .to_request();
    let listed: Vec<OrderResponse> = test::call_and_read_body_json(&app, req).await;
    assert_eq!(listed.len(), 1);

    let req = as_user(
        test::TestRequest::get().uri(&format!("/api/users/{}/orders", alice)),
        bob,
    )
    .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::FORBIDDEN);
}

#[actix_web::test]
async fn status_updates_follow_the_state_machine() {
    let h = harness();
    let app = app!(h);
    let product = h.product("2", 10);

    let req = as_user(test::TestRequest::post().uri("/api/orders"), Uuid::new_v4())
        .set_json(cart(product, 1))
        .to_request();
    let order: OrderResponse = test::call_and_read_body_json(&app, req).await;
    let status_uri = |s: &str| format!("/api/admin/orders/{}/status?status={}", order.id, s);

    // Unknown value is a validation error.
    let req = as_admin(test::TestRequest::put().uri(&status_uri("LOST")), h.admin).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert!(body["error"].as_str().unwrap().contains("unknown order status"));

    // Skipping ahead is an illegal transition.
    let req =
        as_admin(test::TestRequest::put().uri(&status_uri("DELIVERED")), h.admin).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "Invalid transition from PENDING to DELIVERED");

    for next in ["CONFIRMED", "SHIPPING", "DELIVERED"] {
        let req = as_admin(test::TestRequest::put().uri(&status_uri(next)), h.admin).to_request();
        let updated: OrderResponse = test::call_and_read_body_json(&app, req).await;
        assert_eq!(updated.status, next);
    }

    let req = as_admin(test::TestRequest::put().uri(&status_uri("CANCELLED")), h.admin)
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn reconcile_delivers_overdue_shipments() {
    let h = harness();
    let app = app!(h);
    let product = h.product("2", 10);

    let req = as_user(test::TestRequest::post().uri("/api/orders"), Uuid::new_v4())
        .set_json(cart(product, 1))
        .to_request();
    let order: OrderResponse = test::call_and_read_body_json(&app, req).await;
    for next in ["CONFIRMED", "SHIPPING"] {
        let uri = format!("/api/admin/orders/{}/status?status={}", order.id, next);
        let req = as_admin(test::TestRequest::put().uri(&uri), h.admin).to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);
    }

    h.clock.advance(chrono::Duration::minutes(3));

    let req = as_admin(
        test::TestRequest::post().uri("/api/admin/orders/reconcile"),
        h.admin,
    )
    .to_request();
    let report: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(report["delivered"], 1);

    let req = as_admin(
        test::TestRequest::get().uri(&format!("/api/orders/{}", order.id)),
        h.admin,
    )
    .to_request();
    let delivered: OrderResponse = test::call_and_read_body_json(&app, req).await;
    assert_eq!(delivered.status, "DELIVERED");
    assert_eq!(delivered.updated_at, h.clock_now_rfc3339());

    // A second run finds nothing left to do.
    let req = as_admin(
        test::TestRequest::post().uri("/api/admin/orders/reconcile"),
        h.admin,
    )
    .to_request();
    let report: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(report["delivered"], 0);

    let req = as_user(
        test::TestRequest::post().uri("/api/admin/orders/reconcile"),
        Uuid::new_v4(),
    )
    .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::FORBIDDEN);
}

#[actix_web::test]
async fn admin_manages_the_catalog() {
    let h = harness();
    let app = app!(h);

    let req = as_admin(test::TestRequest::post().uri("/api/admin/products"), h.admin)
        .set_json(json!({
            "name": "Whisk",
            "price": "3.25",
            "currency": "USD",
            "stock_quantity": 4
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let created: ProductResponse = test::read_body_json(resp).await;
    assert!(created.images.is_empty());

    let uri = format!("/api/admin/products/{}/stock?delta=-10", created.id);
    let req = as_admin(test::TestRequest::patch().uri(&uri), h.admin).to_request();
    let adjusted: ProductResponse = test::call_and_read_body_json(&app, req).await;
    assert_eq!(adjusted.stock_quantity, 0);

    let req = test::TestRequest::get().uri("/api/products").to_request();
    let listed: Vec<ProductResponse> = test::call_and_read_body_json(&app, req).await;
    assert_eq!(listed.len(), 1);

    let req = as_user(test::TestRequest::post().uri("/api/admin/products"), Uuid::new_v4())
        .set_json(json!({
            "name": "Whisk",
            "price": "3.25",
            "currency": "USD",
            "stock_quantity": 4
        }))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::FORBIDDEN);

    let req = as_admin(test::TestRequest::post().uri("/api/admin/products"), h.admin)
        .set_json(json!({
            "name": "Whisk",
            "price": "cheap",
            "currency": "USD",
            "stock_quantity": 4
        }))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn malformed_json_gets_a_json_error() {
    let h = harness();
    let app = app!(h);

    let req = as_user(test::TestRequest::post().uri("/api/orders"), Uuid::new_v4())
        .insert_header(("content-type", "application/json"))
        .set_payload("{not json")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert!(body["error"].is_string());
}

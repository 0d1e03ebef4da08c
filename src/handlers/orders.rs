use std::str::FromStr;

use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::application::order_service::PlaceOrder;
use crate::application::scheduler::SweepReport;
use crate::application::AppServices;
use crate::domain::auth::Actor;
use crate::domain::errors::DomainError;
use crate::domain::order::{CartLine, DeliveryDetails, Order, OrderItem, OrderStatus, PaymentMethod};
use crate::errors::AppError;

// ── Request / response DTOs ──────────────────────────────────────────────────

#[derive(Debug, Deserialize, ToSchema)]
pub struct CartLineRequest {
    pub product_id: Uuid,
    pub quantity: i32,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct PlaceOrderRequest {
    pub customer_name: String,
    pub phone: String,
    pub address: String,
    /// One of `COD`, `BANK`, `QR`.
    pub payment_method: String,
    pub items: Vec<CartLineRequest>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OrderItemResponse {
    pub product_id: Uuid,
    pub product_name: String,
    /// Decimal price as a string to avoid floating-point issues, e.g. "9.99"
    pub unit_price: String,
    pub quantity: i32,
    pub image: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OrderResponse {
    pub id: Uuid,
    pub user_id: Uuid,
    pub customer_name: String,
    pub phone: String,
    pub address: String,
    pub payment_method: String,
    pub status: String,
    pub items: Vec<OrderItemResponse>,
    pub total_amount: String,
    pub currency: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct StatusParams {
    /// Target status: PENDING, CONFIRMED, SHIPPING, DELIVERED or CANCELLED.
    pub status: String,
}

impl From<OrderItem> for OrderItemResponse {
    fn from(item: OrderItem) -> Self {
        Self {
            product_id: item.product_id,
            product_name: item.product_name,
            unit_price: item.unit_price.to_string(),
            quantity: item.quantity,
            image: item.image,
        }
    }
}

impl From<Order> for OrderResponse {
    fn from(order: Order) -> Self {
        Self {
            id: order.id,
            user_id: order.user_id,
            customer_name: order.delivery.customer_name,
            phone: order.delivery.phone,
            address: order.delivery.address,
            payment_method: order.payment_method.to_string(),
            status: order.status.to_string(),
            items: order.items.into_iter().map(OrderItemResponse::from).collect(),
            total_amount: order.total_amount.to_string(),
            currency: order.currency,
            created_at: order.created_at.to_rfc3339(),
            updated_at: order.updated_at.to_rfc3339(),
        }
    }
}

impl TryFrom<PlaceOrderRequest> for PlaceOrder {
    type Error = DomainError;

    fn try_from(body: PlaceOrderRequest) -> Result<Self, Self::Error> {
        Ok(PlaceOrder {
            payment_method: PaymentMethod::from_str(&body.payment_method)?,
            delivery: DeliveryDetails {
                customer_name: body.customer_name,
                phone: body.phone,
                address: body.address,
            },
            lines: body
                .items
                .into_iter()
                .map(|l| CartLine {
                    product_id: l.product_id,
                    quantity: l.quantity,
                })
                .collect(),
        })
    }
}

fn to_responses(orders: Vec<Order>) -> Vec<OrderResponse> {
    orders.into_iter().map(OrderResponse::from).collect()
}

// ── Handlers ─────────────────────────────────────────────────────────────────

/// POST /api/orders
///
/// Reserves stock for every cart line and records a PENDING order holding a
/// snapshot of name, price and image. Either the whole cart is reserved or
/// nothing is.
#[utoipa::path(
    post,
    path = "/api/orders",
    request_body = PlaceOrderRequest,
    params(
        ("X-User-Id" = Uuid, Header, description = "Caller id"),
        ("X-User-Roles" = String, Header, description = "Comma-separated roles"),
    ),
    responses(
        (status = 201, description = "Order placed", body = OrderResponse),
        (status = 400, description = "Invalid cart or insufficient stock"),
        (status = 401, description = "Missing identity"),
        (status = 404, description = "Unknown product"),
        (status = 503, description = "Busy or storage unavailable, retry"),
    ),
    tag = "orders"
)]
pub async fn place_order(
    services: web::Data<AppServices>,
    actor: Actor,
    body: web::Json<PlaceOrderRequest>,
) -> Result<HttpResponse, AppError> {
    let request = PlaceOrder::try_from(body.into_inner())?;
    let orders = services.orders.clone();

    let order = web::block(move || orders.place_order(&actor, request)).await??;

    Ok(HttpResponse::Created().json(OrderResponse::from(order)))
}

/// GET /api/orders/mine
#[utoipa::path(
    get,
    path = "/api/orders/mine",
    params(
        ("X-User-Id" = Uuid, Header, description = "Caller id"),
        ("X-User-Roles" = String, Header, description = "Comma-separated roles"),
    ),
    responses(
        (status = 200, description = "Caller's orders, newest first", body = [OrderResponse]),
        (status = 401, description = "Missing identity"),
    ),
    tag = "orders"
)]
pub async fn my_orders(
    services: web::Data<AppServices>,
    actor: Actor,
) -> Result<HttpResponse, AppError> {
    let orders = services.orders.clone();
    let result = web::block(move || orders.my_orders(&actor)).await??;
    Ok(HttpResponse::Ok().json(to_responses(result)))
}

/// GET /api/orders/{id}
///
/// Visible to the owner and to administrators.
#[utoipa::path(
    get,
    path = "/api/orders/{id}",
    params(
        ("id" = Uuid, Path, description = "Order UUID"),
        ("X-User-Id" = Uuid, Header, description = "Caller id"),
        ("X-User-Roles" = String, Header, description = "Comma-separated roles"),
    ),
    responses(
        (status = 200, description = "Order found", body = OrderResponse),
        (status = 403, description = "Not the owner"),
        (status = 404, description = "Order not found"),
    ),
    tag = "orders"
)]
pub async fn get_order(
    services: web::Data<AppServices>,
    actor: Actor,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let order_id = path.into_inner();
    let orders = services.orders.clone();
    let order = web::block(move || orders.get_order(&actor, order_id)).await??;
    Ok(HttpResponse::Ok().json(OrderResponse::from(order)))
}

/// GET /api/users/{user_id}/orders
#[utoipa::path(
    get,
    path = "/api/users/{user_id}/orders",
    params(
        ("user_id" = Uuid, Path, description = "Owner UUID"),
        ("X-User-Id" = Uuid, Header, description = "Caller id"),
        ("X-User-Roles" = String, Header, description = "Comma-separated roles"),
    ),
    responses(
        (status = 200, description = "The user's orders, newest first", body = [OrderResponse]),
        (status = 403, description = "Neither that user nor an administrator"),
    ),
    tag = "orders"
)]
pub async fn user_orders(
    services: web::Data<AppServices>,
    actor: Actor,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let user_id = path.into_inner();
    let orders = services.orders.clone();
    let result = web::block(move || orders.orders_for_user(&actor, user_id)).await??;
    Ok(HttpResponse::Ok().json(to_responses(result)))
}

/// GET /api/admin/orders
#[utoipa::path(
    get,
    path = "/api/admin/orders",
    params(
        ("X-User-Id" = Uuid, Header, description = "Caller id"),
        ("X-User-Roles" = String, Header, description = "Must include ADMIN"),
    ),
    responses(
        (status = 200, description = "Every order, newest first", body = [OrderResponse]),
        (status = 403, description = "Administrator role required"),
    ),
    tag = "admin"
)]
pub async fn all_orders(
    services: web::Data<AppServices>,
    actor: Actor,
) -> Result<HttpResponse, AppError> {
    let orders = services.orders.clone();
    let result = web::block(move || orders.all_orders(&actor)).await??;
    Ok(HttpResponse::Ok().json(to_responses(result)))
}

/// PUT /api/admin/orders/{id}/status?status=X
///
/// Moves the order through the lifecycle state machine. An unknown status
/// value is rejected before any transition is attempted.
#[utoipa::path(
    put,
    path = "/api/admin/orders/{id}/status",
    params(
        ("id" = Uuid, Path, description = "Order UUID"),
        StatusParams,
        ("X-User-Id" = Uuid, Header, description = "Caller id"),
        ("X-User-Roles" = String, Header, description = "Must include ADMIN"),
    ),
    responses(
        (status = 200, description = "Transition applied", body = OrderResponse),
        (status = 400, description = "Unknown status or illegal transition"),
        (status = 403, description = "Administrator role required"),
        (status = 404, description = "Order not found"),
    ),
    tag = "admin"
)]
pub async fn update_status(
    services: web::Data<AppServices>,
    actor: Actor,
    path: web::Path<Uuid>,
    query: web::Query<StatusParams>,
) -> Result<HttpResponse, AppError> {
    let order_id = path.into_inner();
    let target = OrderStatus::from_str(query.status.trim())?;
    let orders = services.orders.clone();

    let order = web::block(move || orders.update_status(&actor, order_id, target)).await??;

    Ok(HttpResponse::Ok().json(OrderResponse::from(order)))
}

/// POST /api/admin/orders/reconcile
///
/// Runs a reconciliation sweep now. Shares the single-flight guard with the
/// periodic task, so a sweep already in progress yields 503.
#[utoipa::path(
    post,
    path = "/api/admin/orders/reconcile",
    params(
        ("X-User-Id" = Uuid, Header, description = "Caller id"),
        ("X-User-Roles" = String, Header, description = "Must include ADMIN"),
    ),
    responses(
        (status = 200, description = "Sweep finished", body = SweepReport),
        (status = 403, description = "Administrator role required"),
        (status = 503, description = "A sweep is already running"),
    ),
    tag = "admin"
)]
pub async fn reconcile(
    services: web::Data<AppServices>,
    actor: Actor,
) -> Result<HttpResponse, AppError> {
    actor.require_admin()?;

    match services.scheduler.run_once().await? {
        Some(report) => Ok(HttpResponse::Ok().json(report)),
        None => Err(DomainError::Busy("a reconciliation sweep is already running".into()).into()),
    }
}

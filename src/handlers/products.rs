use std::str::FromStr;

use actix_web::{web, HttpResponse};
use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::application::AppServices;
use crate::domain::auth::Actor;
use crate::domain::errors::DomainError;
use crate::domain::product::{NewProduct, Product};
use crate::errors::AppError;

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateProductRequest {
    pub name: String,
    /// Decimal price as a string, e.g. "9.99"
    pub price: String,
    pub currency: String,
    pub stock_quantity: i32,
    #[serde(default)]
    pub images: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ProductResponse {
    pub id: Uuid,
    pub name: String,
    pub price: String,
    pub currency: String,
    pub stock_quantity: i32,
    pub is_active: bool,
    pub images: Vec<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct StockDelta {
    /// Signed change; the result is clamped at zero.
    pub delta: i32,
}

impl From<Product> for ProductResponse {
    fn from(p: Product) -> Self {
        Self {
            id: p.id,
            name: p.name,
            price: p.price.to_string(),
            currency: p.currency,
            stock_quantity: p.stock_quantity,
            is_active: p.is_active,
            images: p.images,
            created_at: p.created_at.to_rfc3339(),
            updated_at: p.updated_at.to_rfc3339(),
        }
    }
}

impl TryFrom<CreateProductRequest> for NewProduct {
    type Error = DomainError;

    fn try_from(body: CreateProductRequest) -> Result<Self, Self::Error> {
        let price = BigDecimal::from_str(body.price.trim()).map_err(|e| {
            DomainError::InvalidInput(format!("invalid price '{}': {}", body.price, e))
        })?;
        Ok(NewProduct {
            name: body.name,
            price,
            currency: body.currency,
            stock_quantity: body.stock_quantity,
            images: body.images,
        })
    }
}

/// GET /api/products
#[utoipa::path(
    get,
    path = "/api/products",
    responses(
        (status = 200, description = "Active products, newest first", body = [ProductResponse]),
    ),
    tag = "products"
)]
pub async fn list_products(services: web::Data<AppServices>) -> Result<HttpResponse, AppError> {
    let catalog = services.catalog.clone();
    let products = web::block(move || catalog.list_active()).await??;
    Ok(HttpResponse::Ok().json(
        products
            .into_iter()
            .map(ProductResponse::from)
            .collect::<Vec<_>>(),
    ))
}

/// GET /api/products/{id}
#[utoipa::path(
    get,
    path = "/api/products/{id}",
    params(
        ("id" = Uuid, Path, description = "Product UUID"),
    ),
    responses(
        (status = 200, description = "Product found", body = ProductResponse),
        (status = 404, description = "Product not found"),
    ),
    tag = "products"
)]
pub async fn get_product(
    services: web::Data<AppServices>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let id = path.into_inner();
    let catalog = services.catalog.clone();
    let product = web::block(move || catalog.get_product(id)).await??;
    Ok(HttpResponse::Ok().json(ProductResponse::from(product)))
}

/// POST /api/admin/products
#[utoipa::path(
    post,
    path = "/api/admin/products",
    request_body = CreateProductRequest,
    params(
        ("X-User-Id" = Uuid, Header, description = "Caller id"),
        ("X-User-Roles" = String, Header, description = "Must include ADMIN"),
    ),
    responses(
        (status = 201, description = "Product created", body = ProductResponse),
        (status = 400, description = "Invalid product"),
        (status = 403, description = "Administrator role required"),
    ),
    tag = "admin"
)]
pub async fn create_product(
    services: web::Data<AppServices>,
    actor: Actor,
    body: web::Json<CreateProductRequest>,
) -> Result<HttpResponse, AppError> {
    let product = NewProduct::try_from(body.into_inner())?;
    let catalog = services.catalog.clone();
    let created = web::block(move || catalog.create_product(&actor, product)).await??;
    Ok(HttpResponse::Created().json(ProductResponse::from(created)))
}

/// PATCH /api/admin/products/{id}/stock?delta=N
#[utoipa::path(
    patch,
    path = "/api/admin/products/{id}/stock",
    params(
        ("id" = Uuid, Path, description = "Product UUID"),
        StockDelta,
        ("X-User-Id" = Uuid, Header, description = "Caller id"),
        ("X-User-Roles" = String, Header, description = "Must include ADMIN"),
    ),
    responses(
        (status = 200, description = "Stock adjusted", body = ProductResponse),
        (status = 403, description = "Administrator role required"),
        (status = 404, description = "Product not found"),
    ),
    tag = "admin"
)]
pub async fn adjust_stock(
    services: web::Data<AppServices>,
    actor: Actor,
    path: web::Path<Uuid>,
    query: web::Query<StockDelta>,
) -> Result<HttpResponse, AppError> {
    let id = path.into_inner();
    let delta = query.delta;
    let catalog = services.catalog.clone();
    let product = web::block(move || catalog.adjust_stock(&actor, id, delta)).await??;
    Ok(HttpResponse::Ok().json(ProductResponse::from(product)))
}

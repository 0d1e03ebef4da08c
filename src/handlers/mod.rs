pub mod identity;
pub mod orders;
pub mod products;

use actix_web::web;
use utoipa::OpenApi;

use crate::application::scheduler::SweepReport;
use crate::errors::AppError;

#[derive(OpenApi)]
#[openapi(
    paths(
        orders::place_order,
        orders::my_orders,
        orders::get_order,
        orders::user_orders,
        orders::all_orders,
        orders::update_status,
        orders::reconcile,
        products::list_products,
        products::get_product,
        products::create_product,
        products::adjust_stock,
    ),
    components(schemas(
        orders::CartLineRequest,
        orders::PlaceOrderRequest,
        orders::OrderItemResponse,
        orders::OrderResponse,
        products::CreateProductRequest,
        products::ProductResponse,
        SweepReport,
    )),
    tags(
        (name = "orders", description = "Placing and reading orders"),
        (name = "products", description = "Public catalog"),
        (name = "admin", description = "Administrative operations"),
    )
)]
pub struct ApiDoc;

/// Registers every `/api` route. `/api/orders/mine` is registered before
/// `/api/orders/{id}` so it is not captured as an id.
pub fn configure(cfg: &mut web::ServiceConfig) {
    // Malformed bodies and query strings get the same JSON error shape.
    cfg.app_data(
        web::JsonConfig::default()
            .error_handler(|err, _req| AppError::BadRequest(err.to_string()).into()),
    )
    .app_data(
        web::QueryConfig::default()
            .error_handler(|err, _req| AppError::BadRequest(err.to_string()).into()),
    )
    .service(
        web::scope("/api")
            .route("/orders", web::post().to(orders::place_order))
            .route("/orders/mine", web::get().to(orders::my_orders))
            .route("/orders/{id}", web::get().to(orders::get_order))
            .route("/users/{user_id}/orders", web::get().to(orders::user_orders))
            .route("/products", web::get().to(products::list_products))
            .route("/products/{id}", web::get().to(products::get_product))
            .service(
                web::scope("/admin")
                    .route("/orders", web::get().to(orders::all_orders))
                    .route("/orders/reconcile", web::post().to(orders::reconcile))
                    .route("/orders/{id}/status", web::put().to(orders::update_status))
                    .route("/products", web::post().to(products::create_product))
                    .route("/products/{id}/stock", web::patch().to(products::adjust_stock)),
            ),
    );
}

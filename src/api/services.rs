use actix_web::{
    get,
    web::{Data, Query, ServiceConfig},
    HttpResponse,
};
use serde::Deserialize;

use crate::domain::Identity;
use crate::error::AppError;
use crate::service::AppContext;

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    pub query: Option<String>,
}

/// Catalog listing, optionally filtered with `?query=`.
#[get("/services")]
async fn list_services(
    ctx: Data<AppContext>,
    identity: Identity,
    params: Query<SearchParams>,
) -> Result<HttpResponse, AppError> {
    let services = ctx.catalog.list(&identity, params.query.as_deref()).await?;
    Ok(HttpResponse::Ok().json(services))
}

pub fn services_config(config: &mut ServiceConfig) {
    config.service(list_services);
}

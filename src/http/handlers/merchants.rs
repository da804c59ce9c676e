use crate::domain::merchant::MerchantContext;
use axum::{Extension, Json};

pub async fn me(Extension(merchant): Extension<MerchantContext>) -> Json<MerchantContext> {
    Json(merchant)
}

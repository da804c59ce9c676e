use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MerchantContext {
    pub merchant_id: String,
    pub merchant_name: String,
    pub api_key_id: String,
}

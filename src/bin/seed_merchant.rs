use payments_core::bootstrap::{init_tracing, Backends};
use payments_core::config::AppConfig;
use payments_core::hashing::hash_api_key;

/// Usage: seed-merchant <merchant_id> <name> [raw_api_key]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let mut args = std::env::args().skip(1);
    let merchant_id = args.next().unwrap_or_else(|| "m_dev".to_string());
    let name = args.next().unwrap_or_else(|| "Development Merchant".to_string());
    let raw_key = args
        .next()
        .unwrap_or_else(|| format!("sk_test_{}", uuid::Uuid::new_v4().simple()));

    let cfg = AppConfig::from_env();
    let backends = Backends::postgres(&cfg).await?;
    let key_hash = hash_api_key(&cfg.api_key_hash_secret, &raw_key);
    let merchant = backends
        .merchants
        .create_with_api_key(&merchant_id, &name, &key_hash)
        .await?;

    tracing::info!(merchant_id = %merchant.merchant_id, api_key_id = %merchant.api_key_id, "merchant seeded");
    println!("merchant: {}", merchant.merchant_id);
    println!("api key:  {}", raw_key);
    Ok(())
}

use crate::domain::payment::Metadata;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

pub mod mock;
pub mod stripe;

#[derive(Debug, Clone)]
pub struct AuthorizeRequest {
    pub amount: i64,
    pub currency: String,
    pub payment_method_token: String,
    pub metadata: Option<Metadata>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AuthorizeResult {
    pub approved: bool,
    pub provider_charge_id: String,
    pub failure_code: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CaptureRequest {
    pub provider_charge_id: String,
    pub amount: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CaptureResult {
    pub captured_amount: i64,
    pub is_final: bool,
}

#[derive(Debug, Clone)]
pub struct VoidRequest {
    pub provider_charge_id: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VoidResult {
    pub voided: bool,
}

#[derive(Debug, Clone)]
pub struct RefundRequest {
    pub provider_charge_id: String,
    pub amount: i64,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RefundResult {
    pub succeeded: bool,
    pub provider_refund_id: Option<String>,
    pub failure_code: Option<String>,
}

/// Raw webhook delivery. `body` must be the untouched request bytes; the
/// signature is computed over them.
#[derive(Debug, Clone, Copy)]
pub struct ParseWebhookInput<'a> {
    pub body: &'a [u8],
    pub signature: &'a str,
    pub secret: &'a str,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedWebhookEvent {
    pub event_id: String,
    pub event_type: String,
    pub payload: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    #[error("unknown provider: {0}")]
    UnknownProvider(String),
    #[error("invalid webhook signature")]
    InvalidSignature,
    #[error("malformed webhook payload: {0}")]
    MalformedWebhook(String),
    #[error("provider {provider} timed out during {operation}")]
    Timeout { provider: String, operation: &'static str },
    #[error("provider {provider} failed: {message}")]
    Upstream { provider: String, message: String },
}

impl ProviderError {
    pub fn upstream(provider: &str, message: impl Into<String>) -> Self {
        ProviderError::Upstream {
            provider: provider.to_string(),
            message: message.into(),
        }
    }

    pub fn timeout(provider: &str, operation: &'static str) -> Self {
        ProviderError::Timeout {
            provider: provider.to_string(),
            operation,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, ProviderError::Timeout { .. })
    }
}

pub type ProviderResult<T> = Result<T, ProviderError>;

#[async_trait::async_trait]
pub trait PaymentProvider: Send + Sync {
    fn name(&self) -> &'static str;

    async fn authorize(&self, request: AuthorizeRequest) -> ProviderResult<AuthorizeResult>;

    async fn capture(&self, request: CaptureRequest) -> ProviderResult<CaptureResult>;

    async fn void(&self, request: VoidRequest) -> ProviderResult<VoidResult>;

    async fn refund(&self, request: RefundRequest) -> ProviderResult<RefundResult>;

    fn parse_webhook(&self, input: ParseWebhookInput<'_>) -> ProviderResult<ParsedWebhookEvent>;
}

#[derive(Clone)]
pub struct ProviderRegistry {
    providers: Arc<HashMap<String, Arc<dyn PaymentProvider>>>,
    timeout: Duration,
}

impl ProviderRegistry {
    pub fn new(providers: Vec<Arc<dyn PaymentProvider>>, timeout: Duration) -> Self {
        let providers = providers
            .into_iter()
            .map(|p| (p.name().to_string(), p))
            .collect::<HashMap<_, _>>();
        Self {
            providers: Arc::new(providers),
            timeout,
        }
    }

    pub fn get(&self, name: &str) -> ProviderResult<Arc<dyn PaymentProvider>> {
        self.providers
            .get(name)
            .cloned()
            .ok_or_else(|| ProviderError::UnknownProvider(name.to_string()))
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.providers.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub async fn authorize(
        &self,
        provider: &dyn PaymentProvider,
        request: AuthorizeRequest,
    ) -> ProviderResult<AuthorizeResult> {
        with_timeout(self.timeout, provider.name(), "authorize", provider.authorize(request)).await
    }

    pub async fn capture(
        &self,
        provider: &dyn PaymentProvider,
        request: CaptureRequest,
    ) -> ProviderResult<CaptureResult> {
        with_timeout(self.timeout, provider.name(), "capture", provider.capture(request)).await
    }

    pub async fn void(&self, provider: &dyn PaymentProvider, request: VoidRequest) -> ProviderResult<VoidResult> {
        with_timeout(self.timeout, provider.name(), "void", provider.void(request)).await
    }

    pub async fn refund(
        &self,
        provider: &dyn PaymentProvider,
        request: RefundRequest,
    ) -> ProviderResult<RefundResult> {
        with_timeout(self.timeout, provider.name(), "refund", provider.refund(request)).await
    }
}

pub async fn with_timeout<T, F>(
    timeout: Duration,
    provider: &str,
    operation: &'static str,
    fut: F,
) -> ProviderResult<T>
where
    F: Future<Output = ProviderResult<T>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(ProviderError::timeout(provider, operation)),
    }
}

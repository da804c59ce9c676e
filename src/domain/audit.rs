use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorType {
    Merchant,
    System,
}

impl ActorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActorType::Merchant => "merchant",
            ActorType::System => "system",
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AuditEntry {
    pub merchant_id: Option<String>,
    pub actor_type: ActorType,
    pub actor_id: Option<String>,
    pub action: String,
    pub entity_type: String,
    pub entity_id: String,
    pub details: serde_json::Value,
}

impl AuditEntry {
    pub fn merchant(
        merchant_id: &str,
        action: &str,
        entity_type: &str,
        entity_id: impl ToString,
        details: serde_json::Value,
    ) -> Self {
        Self {
            merchant_id: Some(merchant_id.to_string()),
            actor_type: ActorType::Merchant,
            actor_id: None,
            action: action.to_string(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            details,
        }
    }

    pub fn system(action: &str, entity_type: &str, entity_id: impl ToString, details: serde_json::Value) -> Self {
        Self {
            merchant_id: None,
            actor_type: ActorType::System,
            actor_id: None,
            action: action.to_string(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            details,
        }
    }

    pub fn with_actor(mut self, actor_id: impl ToString) -> Self {
        self.actor_id = Some(actor_id.to_string());
        self
    }
}

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Canonical feature order the classifier was trained with.
pub const FEATURE_NAMES: [&str; 8] = [
    "loans_accessed",
    "loans_taken",
    "login_total",
    "overdraft_events",
    "tickets_raised",
    "sentiment_score",
    "monthly_avg_balance",
    "credit_score",
];

/// Ordered feature vector as the dashboard sends it, one value per schema
/// entry, bound positionally.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ChurnInput {
    pub data: Vec<f64>,
}

/// Ordered feature-name list agreed upon at deploy time. Immutable once
/// loaded; the order must match the trained model's input order.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureSchema {
    names: Vec<String>,
}

impl FeatureSchema {
    /// Reads the serialized feature-name list from disk.
    pub fn load(path: &str) -> Result<Self, StartupError> {
        let schema_error = |detail: String| StartupError::Schema {
            path: path.to_string(),
            detail,
        };
        let raw = std::fs::read(path).map_err(|e| schema_error(e.to_string()))?;
        let names: Vec<String> =
            serde_json::from_slice(&raw).map_err(|e| schema_error(e.to_string()))?;
        Self::from_names(names).map_err(schema_error)
    }

    fn from_names(names: Vec<String>) -> Result<Self, String> {
        if names.len() != FEATURE_NAMES.len() {
            return Err(format!(
                "expected {} feature names, got {}",
                FEATURE_NAMES.len(),
                names.len()
            ));
        }
        for (i, name) in names.iter().enumerate() {
            if !FEATURE_NAMES.contains(&name.as_str()) {
                return Err(format!("unknown feature name: {name}"));
            }
            if names[..i].contains(name) {
                return Err(format!("duplicate feature name: {name}"));
            }
        }
        Ok(Self { names })
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Binds a positional vector to the schema. The typed row is what the
    /// reason rules read; the raw vector goes to the model untouched.
    ///
    /// Length is the only check performed here. Out-of-range values flow
    /// through to the model and the rule engine as-is.
    pub fn bind(&self, data: &[f64]) -> Result<FeatureRow, PredictError> {
        if data.len() != self.names.len() {
            return Err(PredictError::SchemaMismatch {
                expected: self.names.len(),
                got: data.len(),
            });
        }
        let mut row = FeatureRow::default();
        for (name, value) in self.names.iter().zip(data) {
            match name.as_str() {
                "loans_accessed" => row.loans_accessed = *value,
                "loans_taken" => row.loans_taken = *value,
                "login_total" => row.login_total = *value,
                "overdraft_events" => row.overdraft_events = *value,
                "tickets_raised" => row.tickets_raised = *value,
                "sentiment_score" => row.sentiment_score = *value,
                "monthly_avg_balance" => row.monthly_avg_balance = *value,
                "credit_score" => row.credit_score = *value,
                // names are checked against FEATURE_NAMES when the schema loads
                _ => {}
            }
        }
        Ok(row)
    }
}

/// One customer's features rebound to their schema names. Always complete
/// after binding; built per request and dropped with the response.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct FeatureRow {
    pub loans_accessed: f64,
    pub loans_taken: f64,
    pub login_total: f64,
    pub overdraft_events: f64,
    pub tickets_raised: f64,
    pub sentiment_score: f64,
    pub monthly_avg_balance: f64,
    pub credit_score: f64,
}

/// The decision payload the dashboard renders verbatim.
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct DecisionResult {
    pub prediction: u8,
    pub churn_probability: f64,
    pub risk_segment: String,
    pub message: String,
    pub churn_reason: String,
    pub recommended_strategy: String,
    pub final_action: String,
}

/// Fatal conditions at boot. The process must not serve without its artifacts.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to load model artifact {path}: {detail}")]
    Model { path: String, detail: String },
    #[error("failed to load feature schema {path}: {detail}")]
    Schema { path: String, detail: String },
}

/// Per-request failures, split client-caused vs server-caused at the boundary.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PredictError {
    /// The caller sent a vector that does not match the deployed schema.
    #[error("expected {expected} features, got {got}")]
    SchemaMismatch { expected: usize, got: usize },
    /// The classifier failed to execute on a well-formed vector.
    #[error("inference failed: {0}")]
    Inference(String),
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
    pub timestamp: String,
    pub execution_time_ms: Option<u64>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        ApiResponse {
            success: true,
            data: Some(data),
            error: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
            execution_time_ms: None,
        }
    }

    pub fn error(message: &str) -> Self {
        ApiResponse {
            success: false,
            data: None,
            error: Some(message.to_string()),
            timestamp: chrono::Utc::now().to_rfc3339(),
            execution_time_ms: None,
        }
    }
}

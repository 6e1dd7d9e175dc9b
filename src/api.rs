//! Request and response bodies for the relay and quote operations
//!
//! Transport-agnostic: the endpoint server and the CLI both deserialize a
//! request, call [`handle_relay`] or [`handle_quote`], and write back the
//! returned status and JSON body.

use crate::relay::{QuoteInstruction, RelayError, Relayer};
use crate::types::CostQuote;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use solana_sdk::pubkey::Pubkey;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayRequest {
    /// Base64 wire transaction, signed by everyone except the operator
    pub transaction: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayResponse {
    /// Base58 transaction signature
    pub signature: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteRequest {
    /// Base58 mint of the paying token
    pub mint: String,

    #[serde(default)]
    pub instructions: Vec<QuoteInstruction>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub error: String,
    pub code: String,
    pub class: String,
    pub retryable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logs: Option<Vec<String>>,
}

impl From<&RelayError> for ErrorBody {
    fn from(err: &RelayError) -> Self {
        Self {
            error: err.to_string(),
            code: err.code().to_string(),
            class: err.class().as_str().to_string(),
            retryable: err.is_retryable(),
            logs: err.logs().map(<[String]>::to_vec),
        }
    }
}

/// Status code and JSON body to send back
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
}

impl ApiResponse {
    fn ok<T: Serialize>(body: &T) -> Self {
        match serde_json::to_value(body) {
            Ok(body) => Self { status: 200, body },
            Err(e) => Self::error(&RelayError::Internal(e.to_string())),
        }
    }

    fn error(err: &RelayError) -> Self {
        Self {
            status: err.status_code(),
            body: serde_json::to_value(ErrorBody::from(err)).unwrap_or(Value::Null),
        }
    }

    fn invalid_request(message: String) -> Self {
        let body = ErrorBody {
            error: message,
            code: "InvalidRequest".to_string(),
            class: "malformed".to_string(),
            retryable: false,
            logs: None,
        };
        Self {
            status: 400,
            body: serde_json::to_value(body).unwrap_or(Value::Null),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

pub async fn handle_relay(relayer: &Relayer, request: RelayRequest) -> ApiResponse {
    match relayer.relay(&request.transaction).await {
        Ok(outcome) => ApiResponse::ok(&RelayResponse {
            signature: outcome.signature.to_string(),
        }),
        Err(e) => ApiResponse::error(&e),
    }
}

pub async fn handle_quote(relayer: &Relayer, request: QuoteRequest) -> ApiResponse {
    let mint = match Pubkey::from_str(&request.mint) {
        Ok(mint) => mint,
        Err(e) => return ApiResponse::invalid_request(format!("invalid mint: {}", e)),
    };
    match relayer.quote(&mint, &request.instructions).await {
        Ok(quote) => ApiResponse::ok::<CostQuote>(&quote),
        Err(e) => ApiResponse::error(&e),
    }
}

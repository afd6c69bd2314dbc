/*
 * Responsibility
 * - POST /authorize の request DTO (API Gateway request authorizer event の必要部分)
 * - response は services::auth::policy::AuthorizerResponse をそのまま返す
 */
use std::collections::HashMap;

use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizeRequest {
    #[serde(default)]
    pub headers: HashMap<String, String>,
    // TOKEN-type authorizers send the header value here instead
    #[serde(default)]
    pub authorization_token: Option<String>,
    pub method_arn: String,
}

impl AuthorizeRequest {
    /// Raw `Authorization` value; header names are case-insensitive. Empty when absent.
    pub fn authorization(&self) -> &str {
        self.headers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case("authorization"))
            .map(|(_, value)| value.as_str())
            .or(self.authorization_token.as_deref())
            .unwrap_or_default()
    }
}

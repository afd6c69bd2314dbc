/*
 * Responsibility
 * - AuthDecision → API Gateway custom-authorizer response (JSON shape)
 * - Allow/Deny 以外の情報 (失敗理由) はここに載せない
 */
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::services::auth::authorizer::AuthDecision;

pub const POLICY_VERSION: &str = "2012-10-17";
pub const INVOKE_ACTION: &str = "execute-api:Invoke";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizerResponse {
    pub principal_id: String,
    pub policy_document: PolicyDocument,
    pub context: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PolicyDocument {
    pub version: String,
    pub statement: Vec<Statement>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Statement {
    pub action: String,
    pub effect: String,
    pub resource: String,
}

impl From<&AuthDecision> for AuthorizerResponse {
    fn from(decision: &AuthDecision) -> Self {
        Self {
            principal_id: decision.principal_id().to_string(),
            policy_document: PolicyDocument {
                version: POLICY_VERSION.to_string(),
                statement: vec![Statement {
                    action: INVOKE_ACTION.to_string(),
                    effect: decision.effect().as_str().to_string(),
                    resource: decision.resource().to_string(),
                }],
            },
            context: decision.context().clone(),
        }
    }
}

/*
 * Responsibility
 * - middleware の公開インターフェース
 *   - http: request id / trace / body limit / timeout
 *   - auth: Authorization → Authorizer → AuthCtx
 */
pub mod auth;
pub mod http;

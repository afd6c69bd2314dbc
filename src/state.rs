/*
 * Responsibility
 * - Router に紐づける共有コンテキスト (AppState)
 *   - authorizer: key set cache を抱えた Authorizer (process-wide static にはしない)
 *   - holdings / prices: trait object で差し替え可能 (Postgres or in-memory, polygon or stub)
 * - Clone 前提で持つ (内部は Arc/Clone cheap)
 */
use std::fmt;
use std::sync::Arc;

use crate::repos::HoldingStore;
use crate::services::auth::Authorizer;
use crate::services::market::PriceSource;

#[derive(Clone)]
pub struct AppState {
    pub authorizer: Arc<Authorizer>,
    pub holdings: Arc<dyn HoldingStore>,
    pub prices: Arc<dyn PriceSource>,
}

impl fmt::Debug for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppState")
            .field("authorizer", &self.authorizer)
            .finish_non_exhaustive()
    }
}

impl AppState {
    pub fn new(
        authorizer: Arc<Authorizer>,
        holdings: Arc<dyn HoldingStore>,
        prices: Arc<dyn PriceSource>,
    ) -> Self {
        Self {
            authorizer,
            holdings,
            prices,
        }
    }
}

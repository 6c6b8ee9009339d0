use std::sync::Arc;

use sqlx::PgPool;

use crate::bot_protection::BotProtection;
use crate::coach::CoachService;

#[derive(Clone)]
pub struct AppState {
    /// Absent when `DATABASE_URL` is unset; events are then only logged.
    pub db: Option<PgPool>,
    pub coach: Arc<CoachService>,
    pub bot_protection: BotProtection,
    pub trust_proxy_headers: bool,
}

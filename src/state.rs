use std::sync::Arc;

use sqlx::PgPool;

use crate::services::job_scheduler_service::JobSchedulerService;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub scheduler: Arc<JobSchedulerService>,
}

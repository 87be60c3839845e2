use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::services::job_scheduler_service::ScheduledJobInfo;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(list_jobs))
}

#[derive(Serialize)]
struct SchedulerStatus {
    state: &'static str,
    jobs: Vec<ScheduledJobInfo>,
}

/// GET /api/jobs - scheduler state and every registered schedule, pending
/// retries included.
async fn list_jobs(State(state): State<AppState>) -> Json<SchedulerStatus> {
    Json(SchedulerStatus {
        state: state.scheduler.state(),
        jobs: state.scheduler.jobs(),
    })
}

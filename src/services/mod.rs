pub mod job_scheduler_service;

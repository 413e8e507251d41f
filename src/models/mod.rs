pub mod job;
pub mod request;

pub use job::{Job, JobStatus, NewJob, Priority};
pub use request::{AgentRequest, NewRequest, RequestStatus, RiskTier};

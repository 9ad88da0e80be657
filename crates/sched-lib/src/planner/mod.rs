//! Chunk sizing and submission planning
//!
//! Both stages are pure functions of their inputs: the samples, the risk
//! assessment and the policy configuration.

mod chunk_sizer;
mod submission;

pub use chunk_sizer::{compute_chunk_size, decide_chunk_size, ChunkDecision, SizeLimit};
pub use submission::{chunk_id, preferred_class, risk_success_factor, SubmissionPlanner};

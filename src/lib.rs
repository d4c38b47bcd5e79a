//! # Klear
//!
//! Backend for a room-decluttering app.
//!
//! A client sends a photo of a messy room. The backend asks a hosted
//! inpainting model for a tidy version of the same room, and a vision model
//! for a cleaning plan sized to the time the user has.
//!
//! ## Plan pipeline
//!
//! ```text
//!   model output ──► extract JSON array ──► sanitize tasks ──► enforce budget
//!   (string or           (fences, trailing      (defaults,          (priority sort,
//!    string chunks)       commas, lone object)   ids, minutes)       greedy fit)
//! ```
//!
//! ## Modules
//! - `api`: HTTP routes, auth and rate limiting
//! - `plan`: Task model and the plan pipeline
//! - `replicate`: Replicate predictions client
//! - `mask`: Image payload decoding and mask dilation
//! - `client`: HTTP client for the API with status polling

pub mod api;
pub mod client;
pub mod config;
pub mod mask;
pub mod plan;
pub mod rate_limit;
pub mod replicate;
pub mod util;

pub use config::Config;
pub use plan::{build_plan, CleaningPlan, Priority, Task, TaskStatus, TimeBudget};

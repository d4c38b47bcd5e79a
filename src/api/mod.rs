//! HTTP API for the Klear app.
//!
//! ## Endpoints
//!
//! - `GET /api/health` - Health check (public)
//! - `GET /api/budgets` - List time budget tiers
//! - `POST /api/inpaint` - Start a "cleaned room" render from an image and mask
//! - `GET /api/inpaint/status?id=` - Poll an inpainting prediction
//! - `POST /api/plan` - Start a cleaning plan for a room photo
//! - `GET /api/plan/status?id=&budget=` - Poll a plan; returns budgeted tasks
//!
//! Everything except `/api/health` requires `x-klear-api-key`. The two `POST`
//! routes are additionally rate limited per `x-device-id`.

mod auth;
pub mod inpaint;
pub mod plan;
mod routes;
pub mod types;

pub use routes::{build_router, prediction_id, serve, AppState};
pub use types::*;

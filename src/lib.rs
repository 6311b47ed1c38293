//! # plant_doctor
//!
//! Client for a plant disease diagnosis service.
//!
//! A photo goes to `/predict`, the predicted disease goes to `/get_cure`, and
//! both answers are merged into one result for display.
//!
//! - `controller`: selection state and the two-step submission
//! - `api`: the network boundary (`DiagnosisApi`, `HttpDiagnosisApi`)
//! - `model`: wire types, normalized on the way in
//! - `render`: read-only result view
//! - `preview`: selected files and their preview handles
//! - `notify`: user-facing toasts

pub mod api;
pub mod config;
pub mod controller;
pub mod error;
pub mod model;
pub mod notify;
pub mod preview;
pub mod render;

pub use api::{DiagnosisApi, HttpDiagnosisApi};
pub use config::ClientConfig;
pub use controller::{Snapshot, SubmitOutcome, UploadController};
pub use error::{DoctorError, Result};
pub use model::{CureInfo, MergedResult, PredictionResult, Steps};
pub use notify::{Notification, Notifier, Variant};
pub use preview::{PreviewStore, PreviewUrl, SelectedFile};
pub use render::{render, ResultView};

//! Moving-object segmentation with an adaptive per-pixel background model,
//! and evaluation of the resulting masks against ground truth.
//!
//! Per frame: [`segmentation::BackgroundModel`] → [`segmentation::MaskRefiner`]
//! → [`segmentation::ObjectLocalizer`]. Independently,
//! [`evaluation::Evaluator`] scores predicted masks against reference masks
//! matched by [`segmentation::FrameId`].

pub mod capture;
pub mod config;
pub mod error;
pub mod evaluation;
pub mod output;
pub mod segmentation;

pub use config::Config;
pub use error::{SegError, SegResult};

//! bandwise-core: Essay assessment protocol.
//!
//! This crate defines the data model, the grading instruction builder, the
//! validator for generator output, band aggregation, the question bank,
//! persistence traits with two stores, and the personalization engine that
//! the bandwise binary and providers build on.

pub mod band;
pub mod error;
pub mod generation;
pub mod model;
pub mod parser;
pub mod personalization;
pub mod question_bank;
pub mod rubric;
pub mod service;
pub mod store;
pub mod traits;
pub mod validator;

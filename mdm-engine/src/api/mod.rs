//! HTTP ingress

pub mod models;
mod rest;

pub use models::{
    ApiError, ApiSuccess, HealthData, SubmitData, SubmitRequest, UpdateWorkloadRequest,
    WorkloadData,
};
pub use rest::RestApi;

//! API request and response models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Submission payload of `POST /request`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRequest {
    pub request_type: String,
    pub email_address: String,
    pub company_code: String,
    pub company_name: String,
    pub department: Option<String>,
    pub attachment_url: Option<String>,
    pub document_number: Option<String>,
    pub additional_attachment: Option<String>,
    pub valid_from: Option<String>,
    pub valid_to: Option<String>,
    pub promo_type: Option<String>,
    pub total_task: Option<i64>,
    pub modify_type: Option<String>,
    pub by_phone_confirmation: Option<bool>,
    pub transaction_section: Option<String>,
    pub update_to: Option<String>,
    pub bank_type: Option<String>,
    pub total_promo: Option<i64>,
    /// Pre-approved cross-chained requests short-circuit these levels
    pub is_requester: Option<bool>,
    pub is_approver: Option<bool>,
    #[serde(rename = "isApproverII")]
    pub is_approver_ii: Option<bool>,
    #[serde(rename = "isApproverIII")]
    pub is_approver_iii: Option<bool>,
    pub requester_name: Option<String>,
    pub approver_name: Option<String>,
    #[serde(rename = "approverIIName")]
    pub approver_ii_name: Option<String>,
    #[serde(rename = "approverIIIName")]
    pub approver_iii_name: Option<String>,
}

/// Success payload of `POST /request`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitData {
    pub message: String,
    pub request_number: String,
    pub attachment_url: String,
    pub timestamp: DateTime<Utc>,
}

/// Payload of `POST /update_workload`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateWorkloadRequest {
    pub mdm_name: String,
    pub seconds: i64,
}

/// Success payload of `POST /update_workload`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkloadData {
    pub mdm_name: String,
    pub total_seconds: i64,
}

/// Uniform success envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiSuccess<T> {
    pub status: String,
    pub data: T,
}

impl<T> ApiSuccess<T> {
    pub fn new(data: T) -> Self {
        Self {
            status: "success".to_string(),
            data,
        }
    }
}

/// Uniform error envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    pub status: String,
    pub message: String,
    pub code: u16,
}

impl ApiError {
    pub fn new(message: impl Into<String>, code: u16) -> Self {
        Self {
            status: "error".to_string(),
            message: message.into(),
            code,
        }
    }
}

/// `GET /health` payload
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthData {
    pub service: String,
    pub version: String,
    pub uptime_seconds: u64,
}

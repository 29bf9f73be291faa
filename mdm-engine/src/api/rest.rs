//! REST ingress
//!
//! `POST /request` files a submission row and runs the submit handler;
//! `POST /update_workload` adjusts an agent's counter. The root route
//! dispatches on an `action` field for callers that post everything to one
//! endpoint. Bad submissions come back as 4xx with a descriptive message;
//! only internal failures surface as 5xx.

use super::models::*;
use crate::engine::RequestEngine;
use crate::error::EngineError;
use crate::model::{columns, CellValue, RequestType, RowValues};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use std::str::FromStr;
use std::time::Instant;

/// Shared handler state
#[derive(Clone)]
pub struct ApiState {
    engine: RequestEngine,
    started: Instant,
}

/// REST API over the engine
pub struct RestApi {
    state: ApiState,
}

impl RestApi {
    pub fn new(engine: RequestEngine) -> Self {
        Self {
            state: ApiState {
                engine,
                started: Instant::now(),
            },
        }
    }

    /// Build the router
    pub fn router(&self) -> Router {
        Router::new()
            .route("/", post(dispatch))
            .route("/request", post(submit))
            .route("/update_workload", post(update_workload))
            .route("/health", get(health))
            .with_state(self.state.clone())
    }
}

async fn submit(State(state): State<ApiState>, Json(request): Json<SubmitRequest>) -> Response {
    match submit_impl(&state, request).await {
        Ok(data) => Json(ApiSuccess::new(data)).into_response(),
        Err(response) => response,
    }
}

async fn update_workload(
    State(state): State<ApiState>,
    Json(request): Json<UpdateWorkloadRequest>,
) -> Response {
    match update_workload_impl(&state, request).await {
        Ok(data) => Json(ApiSuccess::new(data)).into_response(),
        Err(response) => response,
    }
}

/// Single-endpoint dispatch on the `action` body field
async fn dispatch(
    State(state): State<ApiState>,
    Json(body): Json<serde_json::Value>,
) -> Response {
    let action = body.get("action").and_then(|a| a.as_str()).unwrap_or("");
    if action == "update_workload" {
        match serde_json::from_value::<UpdateWorkloadRequest>(body) {
            Ok(request) => match update_workload_impl(&state, request).await {
                Ok(data) => Json(ApiSuccess::new(data)).into_response(),
                Err(response) => response,
            },
            Err(err) => error_response(StatusCode::BAD_REQUEST, format!("bad body: {}", err)),
        }
    } else {
        match serde_json::from_value::<SubmitRequest>(body) {
            Ok(request) => match submit_impl(&state, request).await {
                Ok(data) => Json(ApiSuccess::new(data)).into_response(),
                Err(response) => response,
            },
            Err(err) => error_response(StatusCode::BAD_REQUEST, format!("bad body: {}", err)),
        }
    }
}

async fn health(State(state): State<ApiState>) -> Json<ApiSuccess<HealthData>> {
    Json(ApiSuccess::new(HealthData {
        service: state.engine.config().service.name.clone(),
        version: state.engine.config().service.version.clone(),
        uptime_seconds: state.started.elapsed().as_secs(),
    }))
}

async fn submit_impl(state: &ApiState, request: SubmitRequest) -> Result<SubmitData, Response> {
    let request_type = RequestType::from_str(&request.request_type).map_err(|_| {
        error_response(
            StatusCode::BAD_REQUEST,
            format!("unknown request type: {}", request.request_type),
        )
    })?;
    for (field, value) in [
        ("emailAddress", &request.email_address),
        ("companyCode", &request.company_code),
        ("companyName", &request.company_name),
    ] {
        if value.trim().is_empty() {
            return Err(error_response(
                StatusCode::BAD_REQUEST,
                format!("{} is required", field),
            ));
        }
    }

    let table = request_type.master_table();
    let values = build_row(&request, request_type);
    let row = state
        .engine
        .store()
        .append_row(table, &values)
        .await
        .map_err(engine_error_response)?;
    let outcome = state
        .engine
        .handle_on_submit(table, row)
        .await
        .map_err(engine_error_response)?;

    Ok(SubmitData {
        message: "request submitted".to_string(),
        request_number: outcome.request_number,
        attachment_url: outcome.attachment,
        timestamp: outcome.timestamp,
    })
}

async fn update_workload_impl(
    state: &ApiState,
    request: UpdateWorkloadRequest,
) -> Result<WorkloadData, Response> {
    if request.mdm_name.trim().is_empty() {
        return Err(error_response(
            StatusCode::BAD_REQUEST,
            "mdmName is required",
        ));
    }
    let total = state
        .engine
        .workload
        .add(&request.mdm_name, request.seconds)
        .await
        .map_err(engine_error_response)?;
    Ok(WorkloadData {
        mdm_name: request.mdm_name,
        total_seconds: total,
    })
}

/// Render the submission into its master-table row
fn build_row(request: &SubmitRequest, request_type: RequestType) -> RowValues {
    let mut values = RowValues::new();
    let mut put = |col: &str, value: CellValue| {
        if !value.is_empty() {
            values.insert(col.to_string(), value);
        }
    };

    put(
        columns::REQUEST_TYPE,
        CellValue::from(request_type.to_string()),
    );
    put(
        columns::BUSINESS_UNIT,
        CellValue::from(request.company_name.as_str()),
    );
    put(
        columns::COMPANY_CODE,
        CellValue::from(request.company_code.as_str()),
    );
    put(
        columns::EMAIL_ADDRESS,
        CellValue::from(request.email_address.as_str()),
    );
    put(
        columns::DEPARTMENT,
        request.department.clone().into(),
    );
    put(columns::ATTACHMENT, request.attachment_url.clone().into());
    put(columns::TOTAL_TASK, request.total_task.into());
    put(
        columns::DOCUMENT_NUMBER,
        request.document_number.clone().into(),
    );
    put(
        columns::ADDITIONAL_ATTACHMENT,
        request.additional_attachment.clone().into(),
    );
    put(columns::VALID_FROM, request.valid_from.clone().into());
    put(columns::VALID_TO, request.valid_to.clone().into());
    put(columns::PROMO_TYPE, request.promo_type.clone().into());
    put(columns::TOTAL_PROMO, request.total_promo.into());
    put(columns::MODIFY_TYPE, request.modify_type.clone().into());
    put(
        columns::BY_PHONE_CONFIRMATION,
        request
            .by_phone_confirmation
            .map(|b| if b { "Yes" } else { "No" })
            .into(),
    );
    put(
        columns::TRANSACTION_SECTION,
        request.transaction_section.clone().into(),
    );
    put(columns::UPDATE_TO, request.update_to.clone().into());
    put(columns::BANK_TYPE, request.bank_type.clone().into());

    // Pre-approved chains arrive with their levels already actioned.
    if request.is_requester.unwrap_or(false) {
        put(columns::RESPON_REQUESTER, CellValue::from("Completed"));
        put(
            columns::NAME_REQUESTER,
            CellValue::from(
                request
                    .requester_name
                    .clone()
                    .unwrap_or_else(|| request.email_address.clone()),
            ),
        );
    }
    let pre_approved = [
        (
            request.is_approver,
            &request.approver_name,
            columns::RESPON_APPROVER,
            columns::NAME_APPROVER,
        ),
        (
            request.is_approver_ii,
            &request.approver_ii_name,
            columns::RESPON_APPROVER_II,
            columns::NAME_APPROVER_II,
        ),
        (
            request.is_approver_iii,
            &request.approver_iii_name,
            columns::RESPON_APPROVER_III,
            columns::NAME_APPROVER_III,
        ),
    ];
    for (flag, name, status_col, name_col) in pre_approved {
        if flag.unwrap_or(false) {
            put(status_col, CellValue::from("Approved"));
            put(
                name_col,
                CellValue::from(
                    name.clone()
                        .unwrap_or_else(|| request.email_address.clone()),
                ),
            );
        }
    }
    values
}

fn engine_error_response(err: EngineError) -> Response {
    match &err {
        EngineError::Validation(_) | EngineError::InvalidValue { .. } => {
            error_response(StatusCode::BAD_REQUEST, err.to_string())
        }
        _ => {
            tracing::error!(%err, "request handling failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
        }
    }
}

fn error_response(code: StatusCode, message: impl Into<String>) -> Response {
    (code, Json(ApiError::new(message, code.as_u16()))).into_response()
}

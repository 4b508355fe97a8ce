use axum::{
    extract::{Query, State},
    http::header,
    response::{IntoResponse, Response},
    Json,
};

use super::{
    ask,
    errors::ApiError,
    gateway::{Caller, OwnerOnly},
    AppState,
};
use crate::models::reports::ReportQuery;
use crate::services::reports::{render_report, ReportRequest};

pub async fn owner_report(
    State(state): State<AppState>,
    _caller: Caller<OwnerOnly>,
    Query(query): Query<ReportQuery>,
) -> Result<Response, ApiError> {
    let report = ask(&state.channels.reports, |response| ReportRequest::OwnerReport {
        response,
    })
    .await?;

    if query.format.as_deref() == Some("json") {
        return Ok(Json(report).into_response());
    }

    Ok((
        [
            (header::CONTENT_TYPE, "text/plain; charset=utf-8"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"owner-report.txt\"",
            ),
        ],
        render_report(&report),
    )
        .into_response())
}

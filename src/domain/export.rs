//! Export jobs: durable records of asynchronous report requests.

use std::fmt;
use std::mem::discriminant;
use std::str::FromStr;

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

use super::lifecycle::RequestStatus;
use super::request_view::RequestQuery;
use crate::error::AppError;

/// `pending → processing → completed | failed`, never backwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportJobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl ExportJobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportJobStatus::Pending => "pending",
            ExportJobStatus::Processing => "processing",
            ExportJobStatus::Completed => "completed",
            ExportJobStatus::Failed => "failed",
        }
    }

    pub fn can_advance_to(&self, next: ExportJobStatus) -> bool {
        matches!(
            (self, next),
            (ExportJobStatus::Pending, ExportJobStatus::Processing)
                | (ExportJobStatus::Processing, ExportJobStatus::Completed)
                | (ExportJobStatus::Processing, ExportJobStatus::Failed)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ExportJobStatus::Completed | ExportJobStatus::Failed)
    }
}

impl fmt::Display for ExportJobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExportJobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ExportJobStatus::Pending),
            "processing" => Ok(ExportJobStatus::Processing),
            "completed" => Ok(ExportJobStatus::Completed),
            "failed" => Ok(ExportJobStatus::Failed),
            other => Err(format!("unknown export job status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportFormat {
    #[default]
    Csv,
    Pdf,
}

impl ExportFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Pdf => "pdf",
        }
    }

    pub fn job_type(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "service_requests_csv",
            ExportFormat::Pdf => "service_requests_pdf",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "text/csv",
            ExportFormat::Pdf => "application/pdf",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "csv" => Ok(ExportFormat::Csv),
            "pdf" => Ok(ExportFormat::Pdf),
            other => Err(format!("unknown export format: {}", other)),
        }
    }
}

/// Relative date window keyword, resolved against the worker's clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateRange {
    Today,
    ThisWeek,
    ThisMonth,
    LastMonth,
}

impl DateRange {
    /// Half-open `[start, end)` window.
    pub fn resolve(&self, now: NaiveDateTime) -> (NaiveDateTime, NaiveDateTime) {
        let today = now.date();
        match self {
            DateRange::Today => (midnight(today), now),
            DateRange::ThisWeek => {
                let monday = today - Duration::days(i64::from(today.weekday().num_days_from_monday()));
                (midnight(monday), now)
            }
            DateRange::ThisMonth => (midnight(first_of_month(today)), now),
            DateRange::LastMonth => {
                let this_month = first_of_month(today);
                let last_month = first_of_month(this_month - Duration::days(1));
                (midnight(last_month), midnight(this_month))
            }
        }
    }
}

fn midnight(date: NaiveDate) -> NaiveDateTime {
    date.and_time(NaiveTime::MIN)
}

fn first_of_month(date: NaiveDate) -> NaiveDate {
    date - Duration::days(i64::from(date.day0()))
}

/// One known way of narrowing an export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum FilterCriterion {
    Professional(i32),
    Service(i32),
    Status(RequestStatus),
    DateRange(DateRange),
}

/// Conjunction of criteria, at most one of each kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExportFilter(Vec<FilterCriterion>);

impl ExportFilter {
    pub fn new(criteria: Vec<FilterCriterion>) -> Result<Self, AppError> {
        for (i, criterion) in criteria.iter().enumerate() {
            if criteria[..i].iter().any(|c| discriminant(c) == discriminant(criterion)) {
                return Err(AppError::Validation(format!(
                    "Filter criterion given more than once: {:?}",
                    criterion
                )));
            }
        }
        Ok(ExportFilter(criteria))
    }

    pub fn criteria(&self) -> &[FilterCriterion] {
        &self.0
    }

    /// Pin the export to one professional, replacing any requested one.
    pub fn restrict_to_professional(&mut self, professional_id: i32) {
        self.0.retain(|c| !matches!(c, FilterCriterion::Professional(_)));
        self.0.push(FilterCriterion::Professional(professional_id));
    }

    pub fn to_query(&self, now: NaiveDateTime) -> RequestQuery {
        let mut query = RequestQuery::default();
        for criterion in &self.0 {
            match criterion {
                FilterCriterion::Professional(id) => query.professional_id = Some(*id),
                FilterCriterion::Service(id) => query.service_id = Some(*id),
                FilterCriterion::Status(status) => query.statuses = vec![*status],
                FilterCriterion::DateRange(range) => {
                    let (start, end) = range.resolve(now);
                    query.requested_from = Some(start);
                    query.requested_before = Some(end);
                }
            }
        }
        query
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ExportJob {
    pub id: i32,
    pub owner_id: i32,
    pub format: ExportFormat,
    pub filter: ExportFilter,
    pub deliver_to: Option<String>,
    pub status: ExportJobStatus,
    pub file_name: Option<String>,
    pub error_message: Option<String>,
    pub created_at: NaiveDateTime,
    pub started_at: Option<NaiveDateTime>,
    pub completed_at: Option<NaiveDateTime>,
}

#[derive(Debug, Clone)]
pub struct NewExportJob {
    pub owner_id: i32,
    pub format: ExportFormat,
    pub filter: ExportFilter,
    pub deliver_to: Option<String>,
    pub created_at: NaiveDateTime,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .and_then(|date| date.and_hms_opt(h, min, 0))
            .expect("valid timestamp")
    }

    #[test]
    fn this_week_starts_monday_midnight() {
        // Thursday
        let now = at(2024, 5, 16, 15, 45);
        assert_eq!(DateRange::ThisWeek.resolve(now), (at(2024, 5, 13, 0, 0), now));
    }

    #[test]
    fn this_week_on_monday_starts_today() {
        let now = at(2024, 5, 13, 8, 0);
        assert_eq!(DateRange::ThisWeek.resolve(now), (at(2024, 5, 13, 0, 0), now));
    }

    #[test]
    fn last_month_is_the_full_prior_calendar_month() {
        let now = at(2024, 3, 10, 12, 0);
        assert_eq!(
            DateRange::LastMonth.resolve(now),
            (at(2024, 2, 1, 0, 0), at(2024, 3, 1, 0, 0))
        );
    }

    #[test]
    fn last_month_crosses_year_boundary() {
        let now = at(2025, 1, 1, 0, 5);
        assert_eq!(
            DateRange::LastMonth.resolve(now),
            (at(2024, 12, 1, 0, 0), at(2025, 1, 1, 0, 0))
        );
    }

    #[test]
    fn today_and_this_month_end_now() {
        let now = at(2024, 7, 19, 9, 15);
        assert_eq!(DateRange::Today.resolve(now), (at(2024, 7, 19, 0, 0), now));
        assert_eq!(DateRange::ThisMonth.resolve(now), (at(2024, 7, 1, 0, 0), now));
    }

    #[test]
    fn status_only_moves_forward() {
        use ExportJobStatus::*;
        assert!(Pending.can_advance_to(Processing));
        assert!(Processing.can_advance_to(Completed));
        assert!(Processing.can_advance_to(Failed));
        assert!(!Pending.can_advance_to(Completed));
        assert!(!Completed.can_advance_to(Processing));
        assert!(!Failed.can_advance_to(Pending));
        assert!(!Completed.can_advance_to(Failed));
    }

    #[test]
    fn duplicate_criteria_are_rejected() {
        let result = ExportFilter::new(vec![
            FilterCriterion::Status(RequestStatus::Completed),
            FilterCriterion::Status(RequestStatus::Closed),
        ]);
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[test]
    fn restricting_replaces_requested_professional() {
        let mut filter = ExportFilter::new(vec![FilterCriterion::Professional(2)]).expect("filter");
        filter.restrict_to_professional(7);
        assert_eq!(filter.criteria(), &[FilterCriterion::Professional(7)]);
    }

    #[test]
    fn filter_serializes_as_tagged_list() {
        let filter = ExportFilter::new(vec![
            FilterCriterion::Status(RequestStatus::Completed),
            FilterCriterion::DateRange(DateRange::ThisMonth),
        ])
        .expect("filter");
        let json = serde_json::to_value(&filter).expect("json");
        assert_eq!(
            json,
            serde_json::json!([
                {"kind": "status", "value": "completed"},
                {"kind": "date_range", "value": "this_month"}
            ])
        );
        let back: ExportFilter = serde_json::from_value(json).expect("parse");
        assert_eq!(back, filter);
    }

    #[test]
    fn filter_translates_to_query() {
        let now = at(2024, 5, 16, 15, 45);
        let filter = ExportFilter::new(vec![
            FilterCriterion::Service(3),
            FilterCriterion::Status(RequestStatus::Completed),
            FilterCriterion::DateRange(DateRange::ThisMonth),
        ])
        .expect("filter");
        let query = filter.to_query(now);
        assert_eq!(query.service_id, Some(3));
        assert_eq!(query.statuses, vec![RequestStatus::Completed]);
        assert_eq!(query.requested_from, Some(at(2024, 5, 1, 0, 0)));
        assert_eq!(query.requested_before, Some(now));
    }
}

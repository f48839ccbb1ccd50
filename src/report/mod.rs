//! Rendering of service-request exports and customer activity summaries.

pub mod csv_export;
pub mod monthly;
pub mod pdf_export;

use chrono::NaiveDateTime;
use rand::Rng;
use thiserror::Error;

use crate::domain::{ExportFormat, RequestView};

/// Export column order. Consumers parse by position.
pub const COLUMNS: [&str; 9] = [
    "ID",
    "Service",
    "Customer",
    "Professional",
    "Date Requested",
    "Date Completed",
    "Status",
    "Remarks",
    "Rating",
];

pub const NOT_ASSIGNED: &str = "Not Assigned";
pub const NOT_COMPLETED: &str = "Not Completed";
pub const NO_RATING: &str = "No Rating";

const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("CSV error: {0}")]
    Csv(#[from] ::csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("PDF error: {0}")]
    Pdf(String),
}

/// One request formatted as export cells, in [`COLUMNS`] order.
pub fn cells(view: &RequestView) -> [String; 9] {
    [
        view.id.to_string(),
        view.service_name.clone(),
        view.customer_name.clone(),
        view.professional_name.clone().unwrap_or_else(|| NOT_ASSIGNED.to_string()),
        view.requested_at.format(DATE_FORMAT).to_string(),
        view.completed_at
            .map(|at| at.format(DATE_FORMAT).to_string())
            .unwrap_or_else(|| NOT_COMPLETED.to_string()),
        view.status.to_string(),
        view.remarks.clone().unwrap_or_default(),
        view.rating.map(|r| r.to_string()).unwrap_or_else(|| NO_RATING.to_string()),
    ]
}

pub fn render(format: ExportFormat, rows: &[RequestView], generated_at: NaiveDateTime) -> Result<Vec<u8>, ReportError> {
    match format {
        ExportFormat::Csv => csv_export::render(rows),
        ExportFormat::Pdf => pdf_export::render(rows, generated_at),
    }
}

/// `service_requests_<timestamp>_<8 hex>.<ext>`; unique enough to never collide
/// between workers.
pub fn file_name(format: ExportFormat, now: NaiveDateTime) -> String {
    let suffix: u32 = rand::thread_rng().gen();
    format!(
        "service_requests_{}_{:08x}.{}",
        now.format("%Y%m%d_%H%M%S"),
        suffix,
        format.as_str()
    )
}

#[cfg(test)]
pub(crate) mod fixtures {
    use chrono::{NaiveDate, NaiveDateTime};

    use crate::domain::{RequestStatus, RequestView};

    pub fn at(y: i32, m: u32, d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .and_then(|date| date.and_hms_opt(9, 0, 0))
            .expect("valid timestamp")
    }

    pub fn view(id: i32, status: RequestStatus) -> RequestView {
        RequestView {
            id,
            service_id: 3,
            service_name: "Plumbing".to_string(),
            service_price: 50.0,
            customer_id: 1,
            customer_name: "carol".to_string(),
            customer_email: "carol@example.com".to_string(),
            professional_id: None,
            professional_name: None,
            professional_email: None,
            requested_at: at(2024, 5, 2),
            completed_at: None,
            status,
            remarks: None,
            rating: None,
        }
    }
}

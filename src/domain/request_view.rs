use chrono::NaiveDateTime;
use serde::Serialize;

use super::lifecycle::RequestStatus;

/// Selection over service requests. Unset fields do not constrain.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestQuery {
    pub id: Option<i32>,
    pub customer_id: Option<i32>,
    pub professional_id: Option<i32>,
    pub service_id: Option<i32>,
    /// Empty means any status.
    pub statuses: Vec<RequestStatus>,
    pub unassigned_only: bool,
    pub requested_from: Option<NaiveDateTime>,
    pub requested_before: Option<NaiveDateTime>,
}

impl RequestQuery {
    pub fn by_id(id: i32) -> Self {
        RequestQuery {
            id: Some(id),
            ..Default::default()
        }
    }

    pub fn matches(&self, view: &RequestView) -> bool {
        self.id.map_or(true, |id| view.id == id)
            && self.customer_id.map_or(true, |id| view.customer_id == id)
            && self.professional_id.map_or(true, |id| view.professional_id == Some(id))
            && self.service_id.map_or(true, |id| view.service_id == id)
            && (self.statuses.is_empty() || self.statuses.contains(&view.status))
            && (!self.unassigned_only || view.professional_id.is_none())
            && self.requested_from.map_or(true, |from| view.requested_at >= from)
            && self.requested_before.map_or(true, |before| view.requested_at < before)
    }
}

/// A request joined with everything listings, exports and mail need.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestView {
    pub id: i32,
    pub service_id: i32,
    pub service_name: String,
    pub service_price: f64,
    pub customer_id: i32,
    pub customer_name: String,
    pub customer_email: String,
    pub professional_id: Option<i32>,
    pub professional_name: Option<String>,
    pub professional_email: Option<String>,
    pub requested_at: NaiveDateTime,
    pub completed_at: Option<NaiveDateTime>,
    pub status: RequestStatus,
    pub remarks: Option<String>,
    pub rating: Option<i32>,
}

impl RequestView {
    pub fn has_review(&self) -> bool {
        self.rating.is_some()
    }
}

//! Service request lifecycle.
//!
//! ```text
//! requested ──assign──▶ assigned ──accept──▶ accepted ──complete──▶ completed ──close──▶ closed
//!     │ ▲                  │                    │
//!     │ └──────reject──────┴────────────────────┘
//!     └──accept (unbound)──▶ accepted
//! ```
//!
//! Transitions are pure: [`ServiceRequest::apply`] returns the next state or a
//! [`TransitionError`] and never touches storage. The store persists the result
//! with a compare-and-set on [`ServiceRequest::version`].

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Requested,
    Assigned,
    Accepted,
    Rejected,
    Completed,
    Closed,
}

impl RequestStatus {
    pub const ALL: [RequestStatus; 6] = [
        RequestStatus::Requested,
        RequestStatus::Assigned,
        RequestStatus::Accepted,
        RequestStatus::Rejected,
        RequestStatus::Completed,
        RequestStatus::Closed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Requested => "requested",
            RequestStatus::Assigned => "assigned",
            RequestStatus::Accepted => "accepted",
            RequestStatus::Rejected => "rejected",
            RequestStatus::Completed => "completed",
            RequestStatus::Closed => "closed",
        }
    }

    /// Completed or closed: the work is done and may be reviewed.
    pub fn is_finished(&self) -> bool {
        matches!(self, RequestStatus::Completed | RequestStatus::Closed)
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RequestStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("unknown request status: {}", s))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceRequest {
    pub id: i32,
    pub service_id: i32,
    pub customer_id: i32,
    pub professional_id: Option<i32>,
    pub status: RequestStatus,
    pub requested_at: NaiveDateTime,
    pub completed_at: Option<NaiveDateTime>,
    pub remarks: Option<String>,
    /// Bumped on every write; stale writers lose.
    pub version: i32,
}

#[derive(Debug, Clone)]
pub struct NewServiceRequest {
    pub service_id: i32,
    pub customer_id: i32,
    pub remarks: Option<String>,
    pub requested_at: NaiveDateTime,
}

/// The professional acting on a request, as far as the state machine cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Worker {
    pub professional_id: i32,
    pub service_id: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// Admin binds a professional.
    Assign(Worker),
    Accept(Worker),
    Reject(Worker),
    Complete(Worker),
    /// Customer closes finished work.
    Close,
    /// Admin forces a status.
    Override(RequestStatus),
}

impl Transition {
    pub fn name(&self) -> &'static str {
        match self {
            Transition::Assign(_) => "assign",
            Transition::Accept(_) => "accept",
            Transition::Reject(_) => "reject",
            Transition::Complete(_) => "complete",
            Transition::Close => "close",
            Transition::Override(_) => "override",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("cannot {action} a request that is {status}")]
    IllegalState {
        action: &'static str,
        status: RequestStatus,
    },

    #[error("request is bound to another professional")]
    NotBoundToCaller,

    #[error("request is already assigned to professional {0}")]
    AlreadyAssigned(i32),

    #[error("this service request does not match the professional's service")]
    ServiceMismatch,

    #[error("cannot cancel a completed or closed request")]
    NotCancellable,

    #[error("cannot mark a request {0} while no professional is bound; assign one instead")]
    Unbound(RequestStatus),
}

impl From<TransitionError> for AppError {
    fn from(err: TransitionError) -> Self {
        match err {
            TransitionError::ServiceMismatch => AppError::Forbidden(err.to_string()),
            _ => AppError::Conflict(err.to_string()),
        }
    }
}

impl ServiceRequest {
    /// Compute the state after `transition`, or explain why it is illegal.
    ///
    /// The returned request carries the same `version`; the store bumps it
    /// when the write wins.
    pub fn apply(&self, transition: &Transition, now: NaiveDateTime) -> Result<ServiceRequest, TransitionError> {
        let mut next = self.clone();
        let illegal = TransitionError::IllegalState {
            action: transition.name(),
            status: self.status,
        };

        match transition {
            Transition::Assign(worker) => {
                self.check_service(worker)?;
                match (self.status, self.professional_id) {
                    (RequestStatus::Requested | RequestStatus::Rejected, None) => {}
                    (RequestStatus::Assigned, Some(bound)) if bound == worker.professional_id => {}
                    (RequestStatus::Requested | RequestStatus::Rejected | RequestStatus::Assigned, Some(bound)) => {
                        return Err(TransitionError::AlreadyAssigned(bound));
                    }
                    _ => return Err(illegal),
                }
                next.professional_id = Some(worker.professional_id);
                next.status = RequestStatus::Assigned;
            }
            Transition::Accept(worker) => {
                self.check_service(worker)?;
                match (self.status, self.professional_id) {
                    (RequestStatus::Requested, None) => {}
                    (RequestStatus::Assigned, Some(bound)) if bound == worker.professional_id => {}
                    (RequestStatus::Assigned, Some(_)) => return Err(TransitionError::NotBoundToCaller),
                    _ => return Err(illegal),
                }
                next.professional_id = Some(worker.professional_id);
                next.status = RequestStatus::Accepted;
            }
            Transition::Reject(worker) => {
                self.check_bound(worker)?;
                if !matches!(self.status, RequestStatus::Assigned | RequestStatus::Accepted) {
                    return Err(illegal);
                }
                next.professional_id = None;
                next.status = RequestStatus::Requested;
            }
            Transition::Complete(worker) => {
                self.check_bound(worker)?;
                if self.status != RequestStatus::Accepted {
                    return Err(illegal);
                }
                next.status = RequestStatus::Completed;
                next.completed_at = Some(now);
            }
            Transition::Close => {
                if self.status != RequestStatus::Completed {
                    return Err(illegal);
                }
                next.status = RequestStatus::Closed;
            }
            Transition::Override(status) => {
                match status {
                    RequestStatus::Requested | RequestStatus::Rejected => {
                        next.professional_id = None;
                        next.completed_at = None;
                    }
                    RequestStatus::Assigned | RequestStatus::Accepted if self.professional_id.is_none() => {
                        return Err(TransitionError::Unbound(*status));
                    }
                    RequestStatus::Completed => next.completed_at = Some(now),
                    _ => {}
                }
                next.status = *status;
            }
        }

        Ok(next)
    }

    /// Customers may withdraw anything that has not been finished.
    pub fn ensure_cancellable(&self) -> Result<(), TransitionError> {
        if self.status.is_finished() {
            Err(TransitionError::NotCancellable)
        } else {
            Ok(())
        }
    }

    fn check_service(&self, worker: &Worker) -> Result<(), TransitionError> {
        if self.service_id == worker.service_id {
            Ok(())
        } else {
            Err(TransitionError::ServiceMismatch)
        }
    }

    fn check_bound(&self, worker: &Worker) -> Result<(), TransitionError> {
        if self.professional_id == Some(worker.professional_id) {
            Ok(())
        } else {
            Err(TransitionError::NotBoundToCaller)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rstest::rstest;

    const PLUMBER: Worker = Worker {
        professional_id: 7,
        service_id: 3,
    };
    const OTHER_PLUMBER: Worker = Worker {
        professional_id: 8,
        service_id: 3,
    };
    const CLEANER: Worker = Worker {
        professional_id: 9,
        service_id: 4,
    };

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 14)
            .and_then(|d| d.and_hms_opt(10, 30, 0))
            .expect("valid timestamp")
    }

    fn request(status: RequestStatus, professional_id: Option<i32>) -> ServiceRequest {
        ServiceRequest {
            id: 1,
            service_id: 3,
            customer_id: 11,
            professional_id,
            status,
            requested_at: now(),
            completed_at: None,
            remarks: None,
            version: 0,
        }
    }

    #[test]
    fn happy_path_walks_every_state() {
        let r = request(RequestStatus::Requested, None);
        let r = r.apply(&Transition::Assign(PLUMBER), now()).expect("assign");
        assert_eq!((r.status, r.professional_id), (RequestStatus::Assigned, Some(7)));
        let r = r.apply(&Transition::Accept(PLUMBER), now()).expect("accept");
        assert_eq!(r.status, RequestStatus::Accepted);
        let r = r.apply(&Transition::Complete(PLUMBER), now()).expect("complete");
        assert_eq!(r.status, RequestStatus::Completed);
        assert_eq!(r.completed_at, Some(now()));
        let r = r.apply(&Transition::Close, now()).expect("close");
        assert_eq!(r.status, RequestStatus::Closed);
    }

    #[test]
    fn unbound_request_can_be_accepted_directly() {
        let r = request(RequestStatus::Requested, None)
            .apply(&Transition::Accept(PLUMBER), now())
            .expect("accept");
        assert_eq!((r.status, r.professional_id), (RequestStatus::Accepted, Some(7)));
    }

    #[rstest]
    #[case(RequestStatus::Requested, None)]
    #[case(RequestStatus::Assigned, Some(7))]
    #[case(RequestStatus::Completed, Some(7))]
    #[case(RequestStatus::Closed, Some(7))]
    #[case(RequestStatus::Rejected, None)]
    fn complete_is_only_reachable_from_accepted(#[case] status: RequestStatus, #[case] bound: Option<i32>) {
        let err = request(status, bound)
            .apply(&Transition::Complete(PLUMBER), now())
            .expect_err("must not complete");
        assert!(matches!(
            err,
            TransitionError::IllegalState { .. } | TransitionError::NotBoundToCaller
        ));
    }

    #[rstest]
    #[case(RequestStatus::Requested)]
    #[case(RequestStatus::Assigned)]
    #[case(RequestStatus::Accepted)]
    #[case(RequestStatus::Rejected)]
    #[case(RequestStatus::Closed)]
    fn close_is_only_reachable_from_completed(#[case] status: RequestStatus) {
        let err = request(status, Some(7))
            .apply(&Transition::Close, now())
            .expect_err("must not close");
        assert_eq!(
            err,
            TransitionError::IllegalState {
                action: "close",
                status
            }
        );
    }

    #[test]
    fn reassigning_to_a_different_professional_conflicts() {
        let r = request(RequestStatus::Assigned, Some(7));
        assert_eq!(
            r.apply(&Transition::Assign(OTHER_PLUMBER), now()),
            Err(TransitionError::AlreadyAssigned(7))
        );
    }

    #[test]
    fn reassigning_to_the_same_professional_is_a_no_op() {
        let r = request(RequestStatus::Assigned, Some(7));
        let next = r.apply(&Transition::Assign(PLUMBER), now()).expect("idempotent");
        assert_eq!(next, r);
    }

    #[test]
    fn assign_after_acceptance_is_illegal() {
        let r = request(RequestStatus::Accepted, Some(7));
        assert!(matches!(
            r.apply(&Transition::Assign(PLUMBER), now()),
            Err(TransitionError::IllegalState { action: "assign", .. })
        ));
    }

    #[test]
    fn professional_of_other_trade_cannot_accept() {
        let r = request(RequestStatus::Requested, None);
        assert_eq!(
            r.apply(&Transition::Accept(CLEANER), now()),
            Err(TransitionError::ServiceMismatch)
        );
    }

    #[test]
    fn assigned_request_cannot_be_accepted_by_someone_else() {
        let r = request(RequestStatus::Assigned, Some(7));
        assert_eq!(
            r.apply(&Transition::Accept(OTHER_PLUMBER), now()),
            Err(TransitionError::NotBoundToCaller)
        );
    }

    #[rstest]
    #[case(RequestStatus::Assigned)]
    #[case(RequestStatus::Accepted)]
    fn reject_unbinds_and_requeues(#[case] status: RequestStatus) {
        let r = request(status, Some(7))
            .apply(&Transition::Reject(PLUMBER), now())
            .expect("reject");
        assert_eq!((r.status, r.professional_id), (RequestStatus::Requested, None));
    }

    #[test]
    fn reject_by_unbound_professional_fails() {
        let r = request(RequestStatus::Accepted, Some(7));
        assert_eq!(
            r.apply(&Transition::Reject(OTHER_PLUMBER), now()),
            Err(TransitionError::NotBoundToCaller)
        );
    }

    #[test]
    fn override_to_completed_stamps_completion() {
        let r = request(RequestStatus::Requested, None)
            .apply(&Transition::Override(RequestStatus::Completed), now())
            .expect("override");
        assert_eq!(r.status, RequestStatus::Completed);
        assert_eq!(r.completed_at, Some(now()));
    }

    #[rstest]
    #[case(RequestStatus::Requested)]
    #[case(RequestStatus::Rejected)]
    fn override_back_to_open_releases_the_professional(#[case] status: RequestStatus) {
        let mut done = request(RequestStatus::Completed, Some(PLUMBER.professional_id));
        done.completed_at = Some(now());
        let reopened = done.apply(&Transition::Override(status), now()).expect("override");
        assert_eq!(reopened.status, status);
        assert_eq!(reopened.professional_id, None);
        assert_eq!(reopened.completed_at, None);

        let reassigned = reopened
            .apply(&Transition::Assign(OTHER_PLUMBER), now())
            .expect("assignable again");
        assert_eq!(reassigned.professional_id, Some(OTHER_PLUMBER.professional_id));
    }

    #[rstest]
    #[case(RequestStatus::Assigned)]
    #[case(RequestStatus::Accepted)]
    fn override_cannot_invent_a_binding(#[case] status: RequestStatus) {
        assert_eq!(
            request(RequestStatus::Requested, None).apply(&Transition::Override(status), now()),
            Err(TransitionError::Unbound(status))
        );
        let bound = request(RequestStatus::Completed, Some(PLUMBER.professional_id))
            .apply(&Transition::Override(status), now())
            .expect("bound override");
        assert_eq!(bound.professional_id, Some(PLUMBER.professional_id));
    }

    #[rstest]
    #[case(RequestStatus::Requested, true)]
    #[case(RequestStatus::Assigned, true)]
    #[case(RequestStatus::Accepted, true)]
    #[case(RequestStatus::Rejected, true)]
    #[case(RequestStatus::Completed, false)]
    #[case(RequestStatus::Closed, false)]
    fn cancellation_stops_at_completion(#[case] status: RequestStatus, #[case] allowed: bool) {
        assert_eq!(request(status, None).ensure_cancellable().is_ok(), allowed);
    }

    #[test]
    fn status_parses_from_its_wire_name() {
        for status in RequestStatus::ALL {
            assert_eq!(status.as_str().parse::<RequestStatus>(), Ok(status));
        }
        assert!("pending".parse::<RequestStatus>().is_err());
    }
}

//! Lifecycle notifications and the scheduled reminder/monthly sweeps.
//!
//! Mail failures never escape this module: lifecycle sends are spawned and
//! only logged, sweeps count them per recipient.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{Datelike, NaiveDateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tokio::time::Duration;
use tracing::{error, info, warn};

use crate::db::Store;
use crate::domain::{DateRange, RequestQuery, RequestStatus, RequestView};
use crate::error::AppError;
use crate::notify::mailer::{Email, Mailer};
use crate::report::monthly;

/// Statuses a professional still has to act on.
const PENDING_LIKE: [RequestStatus; 2] = [RequestStatus::Assigned, RequestStatus::Accepted];

const SIGNATURE: &str = "Thank you,\nA-Z Household Services Team";

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SweepSummary {
    pub sent: usize,
    pub failed: usize,
}

pub struct Notifier {
    store: Arc<dyn Store>,
    mailer: Arc<dyn Mailer>,
}

impl Notifier {
    pub fn new(store: Arc<dyn Store>, mailer: Arc<dyn Mailer>) -> Self {
        Self { store, mailer }
    }

    /// Tell the bound professional about a new assignment.
    pub fn request_assigned(&self, view: &RequestView) {
        let Some(to) = view.professional_email.clone() else {
            return;
        };
        let body = format!(
            "Hello {},\n\nYou have been assigned service request #{}: {} for {} (requested on {}).\n\n\
             Please log in to your account to accept or reject it.\n\n{}",
            view.professional_name.as_deref().unwrap_or("there"),
            view.id,
            view.service_name,
            view.customer_name,
            view.requested_at.format("%Y-%m-%d"),
            SIGNATURE
        );
        self.dispatch(Email::text(to, format!("New service request #{}", view.id), body));
    }

    /// Tell the customer their request was completed.
    pub fn request_completed(&self, view: &RequestView) {
        let body = format!(
            "Hello {},\n\nYour service request #{} ({}) has been marked as completed by {}.\n\n\
             You can now close the request and leave a review.\n\n{}",
            view.customer_name,
            view.id,
            view.service_name,
            view.professional_name.as_deref().unwrap_or("your professional"),
            SIGNATURE
        );
        self.dispatch(Email::text(
            view.customer_email.clone(),
            format!("Service request #{} completed", view.id),
            body,
        ));
    }

    fn dispatch(&self, email: Email) {
        let mailer = Arc::clone(&self.mailer);
        tokio::spawn(async move {
            let to = email.to.clone();
            if let Err(e) = mailer.send(email).await {
                warn!(to = %to, error = %e, "Notification email failed");
            }
        });
    }

    /// One digest per professional listing their assigned or accepted requests.
    pub async fn send_reminders(&self) -> Result<SweepSummary, AppError> {
        let pending = self
            .store
            .query_requests(&RequestQuery {
                statuses: PENDING_LIKE.to_vec(),
                ..Default::default()
            })
            .await?;

        let mut by_professional: BTreeMap<i32, Vec<RequestView>> = BTreeMap::new();
        for view in pending {
            if let Some(id) = view.professional_id {
                by_professional.entry(id).or_default().push(view);
            }
        }

        info!("Reminder sweep: {} professional(s) with pending requests", by_professional.len());
        let emails = by_professional.values().filter_map(|views| reminder_email(views)).collect();
        Ok(self.deliver(emails).await)
    }

    /// Activity summary for every customer with requests in the month before `now`.
    pub async fn send_monthly_reports(&self, now: NaiveDateTime) -> Result<SweepSummary, AppError> {
        let (start, end) = DateRange::LastMonth.resolve(now);
        let requests = self
            .store
            .query_requests(&RequestQuery {
                requested_from: Some(start),
                requested_before: Some(end),
                ..Default::default()
            })
            .await?;

        let mut by_customer: BTreeMap<i32, Vec<RequestView>> = BTreeMap::new();
        for view in requests {
            by_customer.entry(view.customer_id).or_default().push(view);
        }

        let month_name = start.format("%B %Y").to_string();
        info!("Monthly report sweep for {}: {} customer(s)", month_name, by_customer.len());

        let emails = by_customer
            .values()
            .filter_map(|views| {
                let first = views.first()?;
                Some(Email::html(
                    first.customer_email.clone(),
                    monthly::subject(&month_name),
                    monthly::render_html(&first.customer_name, &month_name, views),
                ))
            })
            .collect();
        Ok(self.deliver(emails).await)
    }

    async fn deliver(&self, emails: Vec<Email>) -> SweepSummary {
        let mut summary = SweepSummary::default();
        for email in emails {
            let to = email.to.clone();
            match self.mailer.send(email).await {
                Ok(()) => summary.sent += 1,
                Err(e) => {
                    error!(to = %to, error = %e, "Failed to send email");
                    summary.failed += 1;
                }
            }
        }
        summary
    }
}

fn reminder_email(views: &[RequestView]) -> Option<Email> {
    let first = views.first()?;
    let to = first.professional_email.clone()?;

    let mut body = format!(
        "Hello {},\n\nThis is a reminder that you have the following pending service requests:\n\n",
        first.professional_name.as_deref().unwrap_or("there")
    );
    for view in views {
        body.push_str(&format!(
            "- Request #{}: {} for {} (Requested on: {})\n",
            view.id,
            view.service_name,
            view.customer_name,
            view.requested_at.format("%Y-%m-%d")
        ));
    }
    body.push_str("\nPlease log in to your account to manage these requests.\n\n");
    body.push_str(SIGNATURE);

    Some(Email::text(to, "Reminder: You have pending service requests", body))
}

/// Periodic sweeps until shutdown is signalled.
///
/// Reminders go out every `every`; the monthly sweep runs on the first tick
/// that falls on the 1st of a month.
pub async fn run_scheduler(notifier: Arc<Notifier>, every: Duration, mut shutdown_rx: watch::Receiver<bool>) {
    info!("Notification scheduler started, sweeping every {}s", every.as_secs());

    let mut ticker = tokio::time::interval(every);
    // The first tick completes immediately; nothing is due at startup.
    ticker.tick().await;
    let mut last_monthly: Option<(i32, u32)> = None;

    loop {
        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    info!("Notification scheduler received shutdown signal, stopping");
                    break;
                }
            }
            _ = ticker.tick() => {
                match notifier.send_reminders().await {
                    Ok(summary) => info!("Reminders sent: {} ok, {} failed", summary.sent, summary.failed),
                    Err(e) => error!("Reminder sweep failed: {}", e),
                }

                let now = Utc::now().naive_utc();
                let month = (now.year(), now.month());
                if now.day() == 1 && last_monthly != Some(month) {
                    last_monthly = Some(month);
                    match notifier.send_monthly_reports(now).await {
                        Ok(summary) => info!("Monthly reports sent: {} ok, {} failed", summary.sent, summary.failed),
                        Err(e) => error!("Monthly report sweep failed: {}", e),
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::InMemoryStore;
    use crate::notify::mailer::testing::RecordingMailer;
    use crate::notify::mailer::EmailBody;
    use crate::tests::support::{at, Marketplace};

    #[tokio::test]
    async fn reminders_group_by_professional_and_survive_failures() {
        let store = Arc::new(InMemoryStore::new());
        let market = Marketplace::seed(store.clone()).await;
        let pat = market.professional("pat", market.plumbing).await;
        let sam = market.professional("sam", market.plumbing).await;

        market.request_in(RequestStatus::Assigned, Some(pat.profile_id), at(2024, 5, 2)).await;
        market.request_in(RequestStatus::Accepted, Some(pat.profile_id), at(2024, 5, 3)).await;
        market.request_in(RequestStatus::Assigned, Some(sam.profile_id), at(2024, 5, 4)).await;
        market.request_in(RequestStatus::Completed, Some(sam.profile_id), at(2024, 5, 5)).await;
        market.request_in(RequestStatus::Requested, None, at(2024, 5, 6)).await;

        let mailer = Arc::new(RecordingMailer::refusing(&["sam@example.com"]));
        let notifier = Notifier::new(store, mailer.clone());
        let summary = notifier.send_reminders().await.expect("sweep");

        assert_eq!(summary, SweepSummary { sent: 1, failed: 1 });
        let sent = mailer.sent();
        assert_eq!(sent[0].to, "pat@example.com");
        assert_eq!(sent[0].subject, "Reminder: You have pending service requests");
        match &sent[0].body {
            EmailBody::Text(body) => {
                assert_eq!(body.matches("- Request #").count(), 2);
                assert!(body.contains("(Requested on: 2024-05-02)"));
            }
            other => panic!("unexpected body {:?}", other),
        }
    }

    #[tokio::test]
    async fn monthly_reports_cover_only_the_previous_month() {
        let store = Arc::new(InMemoryStore::new());
        let market = Marketplace::seed(store.clone()).await;
        let other = market.customer("dana").await;

        market.request_in(RequestStatus::Completed, None, at(2024, 4, 10)).await;
        market.request_for(other.profile_id, at(2024, 5, 2)).await;

        let mailer = Arc::new(RecordingMailer::default());
        let notifier = Notifier::new(store, mailer.clone());
        let summary = notifier.send_monthly_reports(at(2024, 5, 1)).await.expect("sweep");

        assert_eq!(summary, SweepSummary { sent: 1, failed: 0 });
        let sent = mailer.sent();
        assert_eq!(sent[0].to, "carol@example.com");
        assert_eq!(sent[0].subject, "Your Monthly Activity Report - April 2024");
        assert!(matches!(&sent[0].body, EmailBody::Html(html) if html.contains("Completed Requests: 1")));
    }
}

//! Per-customer monthly activity summary, mailed as HTML.

use crate::domain::RequestView;

#[derive(Debug, Clone, PartialEq)]
pub struct MonthlyTotals {
    pub total: usize,
    /// Completed or closed.
    pub completed: usize,
    pub total_cost: f64,
    /// 0.0 when nothing was reviewed.
    pub average_rating: f64,
}

impl MonthlyTotals {
    pub fn from_requests(requests: &[RequestView]) -> Self {
        let ratings: Vec<i32> = requests.iter().filter_map(|r| r.rating).collect();
        let average_rating = if ratings.is_empty() {
            0.0
        } else {
            f64::from(ratings.iter().sum::<i32>()) / ratings.len() as f64
        };

        MonthlyTotals {
            total: requests.len(),
            completed: requests.iter().filter(|r| r.status.is_finished()).count(),
            total_cost: requests.iter().map(|r| r.service_price).sum(),
            average_rating,
        }
    }
}

pub fn subject(month_name: &str) -> String {
    format!("Your Monthly Activity Report - {}", month_name)
}

pub fn render_html(customer_name: &str, month_name: &str, requests: &[RequestView]) -> String {
    let totals = MonthlyTotals::from_requests(requests);

    let mut rows = String::new();
    for request in requests {
        rows.push_str(&format!(
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>${:.2}</td></tr>\n",
            escape(&request.service_name),
            request.requested_at.format("%Y-%m-%d"),
            request.status,
            request.service_price
        ));
    }

    format!(
        r#"<!DOCTYPE html>
<html>
<head>
<meta charset="UTF-8">
<title>Monthly Activity Report - {month}</title>
</head>
<body style="font-family: Arial, sans-serif; color: #333;">
<h1>Monthly Activity Report</h1>
<p>{month}</p>
<p>Prepared for: {customer}</p>
<h2>Monthly Summary</h2>
<ul>
<li>Total Service Requests: {total}</li>
<li>Completed Requests: {completed}</li>
<li>Total Service Cost: ${cost:.2}</li>
<li>Average Rating: {rating:.1}/5</li>
</ul>
<h2>Service Request Details</h2>
<table>
<thead><tr><th>Service</th><th>Date</th><th>Status</th><th>Price</th></tr></thead>
<tbody>
{rows}</tbody>
</table>
<p>Thank you for choosing A-Z Household Services.</p>
</body>
</html>
"#,
        month = escape(month_name),
        customer = escape(customer_name),
        total = totals.total,
        completed = totals.completed,
        cost = totals.total_cost,
        rating = totals.average_rating,
        rows = rows,
    )
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

//! HTML overview of every stored metric

use std::fmt::Write;

use axum::{extract::State, response::Html};
use tracing::instrument;

use crate::api::ApiState;

/// GET /
#[instrument(skip_all)]
pub async fn list_metrics(State(state): State<ApiState>) -> Html<String> {
    let metrics = state.repository.get_all().await;

    let mut page = String::from(
        "<!DOCTYPE html>\n<html>\n<head><title>Metrics</title></head>\n<body>\n\
         <table>\n<tr><th>Name</th><th>Type</th><th>Value</th></tr>\n",
    );
    for metric in &metrics {
        let _ = writeln!(
            page,
            "<tr><td>{}</td><td>{}</td><td>{}</td></tr>",
            escape(&metric.id),
            metric.kind(),
            metric.render()
        );
    }
    page.push_str("</table>\n</body>\n</html>\n");

    Html(page)
}

fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

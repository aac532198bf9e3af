//! Dashboard HTML page handler.
//!
//! Serves a self-contained HTML page with inline CSS showing fleet health, resources,
//! open issues, recent cost anomalies and simulator status.

use crate::cost;
use crate::lifecycle;
use crate::overview;
use crate::resources;
use crate::routes::AppState;
use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;
use chrono::Utc;
use fleet_monitor_types::*;
use std::sync::Arc;
use std::sync::atomic::Ordering;

pub async fn dashboard(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = overview::health_summary(&state.db).ok();
    let fleet = resources::list_resources(&state.db, &ResourceFilter::default()).unwrap_or_default();
    let open_issues = lifecycle::list_issues(
        &state.db,
        &IssueFilter {
            status: Some(IssueStatus::Active),
            limit: Some(20),
            ..Default::default()
        },
    )
    .unwrap_or_default();
    let anomalies = cost::list_anomalies(
        &state.db,
        &AnomalyFilter {
            limit: Some(10),
            ..Default::default()
        },
    )
    .unwrap_or_default();
    let cost_summary = cost::resolve_window(&WindowRequest::default(), Utc::now().date_naive())
        .and_then(|w| cost::summary(&state.db, &w))
        .ok();
    let last_tick = state.stats.last_tick_at.lock().await.clone();
    let ticks = state.stats.ticks_completed.load(Ordering::Relaxed);
    let uptime = state.start_time.elapsed().as_secs();

    let stats_html = if let Some(h) = &health {
        let (spend, change) = cost_summary
            .as_ref()
            .map(|c| (c.total_cost, c.cost_change_percent))
            .unwrap_or((0.0, 0.0));
        format!(
            r#"<div class="stats">
                <div class="stat"><span class="val">{}</span><span class="lbl">Resources</span></div>
                <div class="stat"><span class="val">{:.1}</span><span class="lbl">Fleet Health</span></div>
                <div class="stat"><span class="val healthy">{}</span><span class="lbl">Healthy</span></div>
                <div class="stat"><span class="val warning">{}</span><span class="lbl">Warning</span></div>
                <div class="stat"><span class="val critical">{}</span><span class="lbl">Critical</span></div>
                <div class="stat"><span class="val">${:.2}</span><span class="lbl">30d Spend ({:+.1}%)</span></div>
            </div>"#,
            h.total_resources,
            h.overall_health_score,
            h.healthy_count,
            h.warning_count,
            h.critical_count,
            spend,
            change
        )
    } else {
        "<p>No stats available.</p>".to_string()
    };

    let mut resource_rows = String::new();
    for r in &fleet {
        resource_rows.push_str(&format!(
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td class=\"{}\">{:.2}</td><td>{:.1}% / {:.1}% / {:.1}%</td><td>{}/{}</td><td>${:.2}</td><td>{}</td></tr>\n",
            r.id,
            escape(&r.name),
            r.engine,
            escape(&format!("{} {}", r.cloud_provider, r.region)),
            r.health_status,
            r.health_score,
            r.cpu_usage,
            r.memory_usage,
            r.storage_usage,
            r.connections_active,
            r.connections_max,
            r.monthly_cost,
            r.active_issue_count,
        ));
    }
    if resource_rows.is_empty() {
        resource_rows = "<tr><td colspan=\"9\">No resources</td></tr>".to_string();
    }

    let mut issue_rows = String::new();
    for i in &open_issues {
        issue_rows.push_str(&format!(
            "<tr><td>{}</td><td>{}</td><td class=\"sev-{}\">{}</td><td>{}</td><td>{}</td><td>{}</td><td class=\"mono\">{}</td></tr>\n",
            i.id,
            i.resource_id,
            i.severity,
            i.severity,
            i.category,
            escape(&i.title),
            i.occurrence_count,
            i.last_detected_at.format("%Y-%m-%d %H:%M:%S"),
        ));
    }
    if issue_rows.is_empty() {
        issue_rows = "<tr><td colspan=\"7\">No active issues</td></tr>".to_string();
    }

    let mut anomaly_rows = String::new();
    for a in &anomalies {
        anomaly_rows.push_str(&format!(
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>${:.2}</td><td>${:.2}</td><td>{:+.1}%</td><td>{}</td><td class=\"mono\">{}</td></tr>\n",
            a.id,
            a.resource_id.map(|id| id.to_string()).unwrap_or_else(|| "-".to_string()),
            a.anomaly_type,
            a.amount,
            a.baseline_amount,
            a.deviation_percent,
            a.acknowledged_by.as_deref().map(escape).unwrap_or_else(|| "-".to_string()),
            a.detected_at.format("%Y-%m-%d %H:%M:%S"),
        ));
    }
    if anomaly_rows.is_empty() {
        anomaly_rows = "<tr><td colspan=\"8\">No anomalies</td></tr>".to_string();
    }

    let uptime_str = format_uptime(uptime);
    let simulator_str = if state.simulator_enabled {
        format!(
            "every {}s, {} ticks, last {}",
            state.tick_interval_secs,
            ticks,
            last_tick.as_deref().unwrap_or("never")
        )
    } else {
        "disabled".to_string()
    };

    let html = format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>Fleet Monitor</title>
<style>
  * {{ margin: 0; padding: 0; box-sizing: border-box; }}
  body {{ font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif; background: #0f1117; color: #e0e0e0; padding: 20px; }}
  h1 {{ color: #58a6ff; margin-bottom: 8px; }}
  .meta {{ color: #8b949e; font-size: 0.85em; margin-bottom: 20px; }}
  .stats {{ display: flex; gap: 16px; margin-bottom: 24px; flex-wrap: wrap; }}
  .stat {{ background: #161b22; border: 1px solid #30363d; border-radius: 8px; padding: 16px 24px; text-align: center; min-width: 120px; }}
  .stat .val {{ display: block; font-size: 2em; font-weight: bold; color: #58a6ff; }}
  .stat .lbl {{ display: block; font-size: 0.85em; color: #8b949e; margin-top: 4px; }}
  table {{ width: 100%; border-collapse: collapse; margin-bottom: 24px; }}
  th {{ background: #161b22; color: #8b949e; text-align: left; padding: 8px 12px; font-size: 0.85em; text-transform: uppercase; border-bottom: 1px solid #30363d; }}
  td {{ padding: 8px 12px; border-bottom: 1px solid #21262d; font-size: 0.9em; }}
  tr:hover {{ background: #161b22; }}
  .healthy {{ color: #3fb950; }}
  .warning {{ color: #d29922; }}
  .critical, .sev-critical {{ color: #f85149; }}
  .sev-high {{ color: #db6d28; }}
  .sev-medium {{ color: #d29922; }}
  .sev-low {{ color: #8b949e; }}
  .mono {{ font-family: 'SF Mono', 'Consolas', monospace; font-size: 0.85em; }}
  h2 {{ color: #c9d1d9; margin-bottom: 12px; font-size: 1.1em; }}
  .section {{ margin-bottom: 28px; }}
</style>
</head>
<body>
  <h1>Fleet Monitor</h1>
  <div class="meta">Uptime: {uptime_str} | Simulator: {simulator_str}</div>

  {stats_html}

  <div class="section">
    <h2>Resources</h2>
    <table>
      <thead><tr><th>ID</th><th>Name</th><th>Engine</th><th>Location</th><th>Health</th><th>CPU / Mem / Storage</th><th>Connections</th><th>Monthly</th><th>Open Issues</th></tr></thead>
      <tbody>{resource_rows}</tbody>
    </table>
  </div>

  <div class="section">
    <h2>Active Issues</h2>
    <table>
      <thead><tr><th>ID</th><th>Resource</th><th>Severity</th><th>Category</th><th>Title</th><th>Seen</th><th>Last Detected</th></tr></thead>
      <tbody>{issue_rows}</tbody>
    </table>
  </div>

  <div class="section">
    <h2>Cost Anomalies</h2>
    <table>
      <thead><tr><th>ID</th><th>Resource</th><th>Type</th><th>Amount</th><th>Baseline</th><th>Deviation</th><th>Acknowledged By</th><th>Detected</th></tr></thead>
      <tbody>{anomaly_rows}</tbody>
    </table>
  </div>

  <script>
    // Auto-refresh every 15 seconds
    setTimeout(() => location.reload(), 15000);
  </script>
</body>
</html>"#,
        uptime_str = uptime_str,
        simulator_str = escape(&simulator_str),
        stats_html = stats_html,
        resource_rows = resource_rows,
        issue_rows = issue_rows,
        anomaly_rows = anomaly_rows,
    );

    ([(header::CONTENT_TYPE, "text/html; charset=utf-8")], html)
}

fn escape(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn format_uptime(secs: u64) -> String {
    let hours = secs / 3600;
    let minutes = (secs % 3600) / 60;
    let seconds = secs % 60;
    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_markup() {
        assert_eq!(escape("<db & \"x\">"), "&lt;db &amp; &quot;x&quot;&gt;");
    }

    #[test]
    fn test_format_uptime() {
        assert_eq!(format_uptime(5), "5s");
        assert_eq!(format_uptime(125), "2m 5s");
        assert_eq!(format_uptime(3725), "1h 2m 5s");
    }
}

//! Minimal server-rendered pages for the dashboard.

use postrider_delivery::EffectiveConfig;
use postrider_store::MailSnapshot;

use crate::stats::Stats;

/// Escape text destined for an HTML context.
#[must_use]
pub fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

fn page(title: &str, refresh_secs: Option<u32>, body: &str) -> String {
    let refresh = refresh_secs
        .map(|secs| format!("<meta http-equiv=\"refresh\" content=\"{secs}\">"))
        .unwrap_or_default();
    format!(
        "<!doctype html>\n<html><head><meta charset=\"utf-8\">{refresh}<title>{title}</title>\
<style>body{{font-family:sans-serif;margin:2em}}table{{border-collapse:collapse}}\
td,th{{border:1px solid #ccc;padding:4px 8px;text-align:left}}\
.green{{color:#090}}.red{{color:#c00}}.banner{{background:#fee;padding:8px;border:1px solid #c00}}\
nav a{{margin-right:1em}}</style></head><body>\
<nav><a href=\"/\">Dashboard</a><a href=\"/emails?state=SENT\">Sent</a>\
<a href=\"/emails?state=ERROR\">Errors</a><a href=\"/config\">Config</a>\
<a href=\"/logs\">Logs</a></nav>\n{body}\n</body></html>",
        title = escape(title),
    )
}

#[must_use]
pub fn error_banner(message: &str) -> String {
    format!("<p class=\"banner\">{}</p>", escape(message))
}

#[must_use]
pub fn dashboard(stats: &Stats, config: &EffectiveConfig) -> String {
    let refresh = config.dashboard_refresh_secs.unwrap_or(30);
    let indicator_class = stats.status.indicator;
    let last = stats
        .last_processed_at
        .map_or_else(|| "never".to_string(), |ts| ts.to_rfc3339());
    let cutoff = if config.process_from_after.is_empty() {
        "none".to_string()
    } else {
        escape(&config.process_from_after)
    };
    let body = format!(
        "<h1>Postrider</h1>\
<p>Status: <strong class=\"{indicator_class}\">{indicator}</strong> \
({errors} errors since {since})</p>\
<h2>Throughput</h2>\
<table><tr><th></th><th>Sent</th><th>Errors</th></tr>\
<tr><td>Last hour</td><td>{h1_sent}</td><td>{h1_error}</td></tr>\
<tr><td>Last 24 hours</td><td>{h24_sent}</td><td>{h24_error}</td></tr></table>\
<p>Last processed: {last}</p>\
<h2>Effective configuration</h2>\
<table>\
<tr><td>pollInterval</td><td>{poll}s</td></tr>\
<tr><td>maxRetryCount</td><td>{mrc}</td></tr>\
<tr><td>processFromAfter</td><td>{cutoff}</td></tr>\
<tr><td>logLevel</td><td>{level}</td></tr>\
</table>",
        indicator = stats.status.indicator,
        errors = stats.status.errors_since_reset,
        since = stats
            .status
            .since
            .map_or_else(|| "-".to_string(), |ts| ts.to_rfc3339()),
        h1_sent = stats.h1.sent,
        h1_error = stats.h1.error,
        h24_sent = stats.h24.sent,
        h24_error = stats.h24.error,
        poll = config.poll_interval_secs,
        mrc = config.max_retry_count,
        level = config.log_level,
    );
    page("Postrider", Some(refresh), &body)
}

fn snapshot_row(snapshot: &MailSnapshot, state_filter: &str) -> String {
    let to = snapshot.recipients().join(", ");
    let subject = snapshot.subject().unwrap_or("-");
    let updated = snapshot
        .last_updated_at()
        .map_or_else(|| "-".to_string(), |ts| ts.to_rfc3339());
    let error = snapshot.last_error_message().unwrap_or("");
    format!(
        "<tr><td><a href=\"/emails/{id}?state={state_filter}\">{id}</a></td>\
<td>{to}</td><td>{subject}</td><td>{state}</td><td>{updated}</td><td>{error}</td></tr>",
        id = escape(&snapshot.id),
        to = escape(&to),
        subject = escape(subject),
        state = snapshot.state(),
        error = escape(error),
    )
}

#[must_use]
pub fn emails_list(
    items: &[MailSnapshot],
    state_filter: &str,
    limit: usize,
    error: Option<&str>,
) -> String {
    let banner = error.map(error_banner).unwrap_or_default();
    let rows: String = items
        .iter()
        .map(|snapshot| snapshot_row(snapshot, state_filter))
        .collect();
    let body = format!(
        "{banner}<h1>Emails {filter}</h1><p>showing up to {limit}</p>\
<table><tr><th>Id</th><th>To</th><th>Subject</th><th>State</th>\
<th>Last updated</th><th>Error</th></tr>{rows}</table>",
        filter = if state_filter.is_empty() {
            String::new()
        } else {
            format!("({})", escape(state_filter))
        },
    );
    page("Emails", None, &body)
}

#[must_use]
pub fn email_detail(
    snapshot: &MailSnapshot,
    state_filter: &str,
    prev_id: Option<&str>,
    next_id: Option<&str>,
) -> String {
    let nav = |label: &str, id: Option<&str>| {
        id.map_or_else(String::new, |id| {
            format!("<a href=\"/emails/{}?state={state_filter}\">{label}</a> ", escape(id))
        })
    };
    let raw = serde_json::to_string_pretty(&snapshot.doc.to_json()).unwrap_or_default();
    let body = format!(
        "<h1>{id}</h1><p>{newer}{older}</p>\
<table>\
<tr><td>To</td><td>{to}</td></tr>\
<tr><td>Subject</td><td>{subject}</td></tr>\
<tr><td>State</td><td>{state}</td></tr>\
<tr><td>Attempts</td><td>{attempts}</td></tr>\
<tr><td>Created</td><td>{created}</td></tr>\
<tr><td>Last error</td><td>{error}</td></tr>\
</table>\
<h2>Document</h2><pre>{raw}</pre>",
        id = escape(&snapshot.id),
        newer = nav("&laquo; newer", next_id),
        older = nav("older &raquo;", prev_id),
        to = escape(&snapshot.recipients().join(", ")),
        subject = escape(snapshot.subject().unwrap_or("-")),
        state = snapshot.state(),
        attempts = snapshot.attempts(),
        created = snapshot
            .created_at()
            .map_or_else(|| "-".to_string(), |ts| ts.to_rfc3339()),
        error = escape(snapshot.last_error_message().unwrap_or("")),
        raw = escape(&raw),
    );
    page("Email detail", None, &body)
}

#[must_use]
pub fn config_form(config: &EffectiveConfig, error: Option<&str>) -> String {
    let banner = error.map(error_banner).unwrap_or_default();
    let refresh = config
        .dashboard_refresh_secs
        .map_or_else(String::new, |secs| secs.to_string());
    let body = format!(
        "{banner}<h1>Agent configuration</h1>\
<form method=\"post\" action=\"/config\"><table>\
<tr><td><label for=\"pollInterval\">pollInterval (s)</label></td>\
<td><input name=\"pollInterval\" value=\"{poll}\"></td></tr>\
<tr><td><label for=\"maxRetryCount\">maxRetryCount</label></td>\
<td><input name=\"maxRetryCount\" value=\"{mrc}\"></td></tr>\
<tr><td><label for=\"processFromAfter\">processFromAfter</label></td>\
<td><input name=\"processFromAfter\" value=\"{cutoff}\"></td></tr>\
<tr><td><label for=\"logLevel\">logLevel</label></td>\
<td><select name=\"logLevel\">{levels}</select></td></tr>\
<tr><td><label for=\"dashboardRefreshSec\">dashboardRefreshSec</label></td>\
<td><input name=\"dashboardRefreshSec\" value=\"{refresh}\"></td></tr>\
</table><button type=\"submit\">Save</button></form>",
        poll = config.poll_interval_secs,
        mrc = config.max_retry_count,
        cutoff = escape(&config.process_from_after),
        levels = ["DEBUG", "INFO", "WARNING", "ERROR"]
            .iter()
            .map(|level| {
                let selected = if *level == config.log_level.as_str() {
                    " selected"
                } else {
                    ""
                };
                format!("<option value=\"{level}\"{selected}>{level}</option>")
            })
            .collect::<String>(),
    );
    page("Agent configuration", None, &body)
}

#[must_use]
pub fn log_tail(lines: &[&str]) -> String {
    let body = format!("<h1>Logs</h1><pre>{}</pre>", escape(&lines.join("\n")));
    page("Logs", None, &body)
}

//! 单页界面
//!
//! The page is rendered once per request from the enabled services; disabled
//! kinds never get a tab.

use common::models::ServiceStatus;

const TEMPLATE: &str = include_str!("../assets/index.html");
const APP_JS: &str = include_str!("../assets/app.js");

/// Renders the page with one tab per enabled service.
pub fn render(statuses: &[ServiceStatus]) -> String {
    let tabs: String = statuses.iter().map(tab).collect();
    let empty = if statuses.is_empty() {
        "No services are enabled. Check services-config.yml."
    } else {
        "Select a service."
    };
    TEMPLATE
        .replace("{{TABS}}", &tabs)
        .replace("{{EMPTY}}", empty)
        .replace("{{APP_JS}}", APP_JS)
}

fn tab(status: &ServiceStatus) -> String {
    format!(
        r#"<button class="tab{}" data-service="{}" data-available="{}" data-source="{}" data-reason="{}">{}</button>"#,
        if status.available { "" } else { " unavailable" },
        status.id,
        status.available,
        escape(status.source.as_deref().unwrap_or("")),
        escape(status.reason.as_deref().unwrap_or("")),
        escape(&status.display_name),
    )
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
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

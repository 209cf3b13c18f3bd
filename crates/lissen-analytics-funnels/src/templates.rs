//! HTML and terminal renderings of a funnel report

use crate::types::{Funnel, FunnelReport};

/// Default page title
pub const DASHBOARD_TITLE: &str = "Lissen - Onboarding";

const NO_DATA_MESSAGE: &str = "No funnel data available";

/// Bar colours, cycled by step
const PALETTE: [&str; 6] = [
    "#1f77b4", "#ff7f0e", "#2ca02c", "#d62728", "#9467bd", "#8c564b",
];

/// Render the full dashboard page
pub fn render_html_dashboard(report: &FunnelReport, title: &str) -> String {
    let title = escape_html(title);

    let mut html = format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>{title}</title>
    <style>
        body {{
            font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, 'Helvetica Neue', Arial, sans-serif;
            line-height: 1.6;
            color: #333;
            max-width: 1100px;
            margin: 0 auto;
            padding: 20px;
            background-color: #f5f5f5;
        }}
        .container {{
            background-color: white;
            border-radius: 8px;
            padding: 30px;
            box-shadow: 0 2px 4px rgba(0,0,0,0.1);
        }}
        h1 {{
            margin: 0 0 30px 0;
            font-size: 28px;
        }}
        h2 {{
            font-size: 20px;
            margin-top: 40px;
            padding-bottom: 10px;
            border-bottom: 2px solid #e0e0e0;
        }}
        .funnel-row {{
            display: flex;
            align-items: center;
            margin-bottom: 8px;
        }}
        .funnel-label {{
            width: 180px;
            flex-shrink: 0;
            font-weight: bold;
        }}
        .funnel-track {{
            flex-grow: 1;
        }}
        .funnel-bar {{
            color: white;
            padding: 8px 10px;
            border-radius: 4px;
            white-space: nowrap;
            min-width: 120px;
            box-sizing: border-box;
        }}
        table {{
            width: 100%;
            border-collapse: collapse;
        }}
        th, td {{
            padding: 10px;
            border-bottom: 1px solid #e0e0e0;
            text-align: right;
        }}
        th:first-child, td:first-child {{
            text-align: left;
        }}
        .warning {{
            padding: 15px;
            border-radius: 6px;
            background-color: #fef3c7;
            color: #92400e;
        }}
        .note {{
            margin-top: 30px;
            color: #666;
            font-size: 13px;
        }}
        .footer {{
            margin-top: 40px;
            padding-top: 20px;
            border-top: 2px solid #e0e0e0;
            text-align: center;
            color: #666;
            font-size: 12px;
        }}
    </style>
</head>
<body>
    <div class="container">
        <h1>{title}</h1>
"#
    );

    match &report.funnel {
        Funnel::NoData => {
            html.push_str(&format!(
                "        <div class=\"warning\">{}</div>\n",
                NO_DATA_MESSAGE
            ));
        }
        Funnel::Steps(steps) => {
            html.push_str("        <h2>Onboarding Funnel Analysis</h2>\n        <div class=\"funnel\">\n");
            for (index, step) in steps.iter().enumerate() {
                html.push_str(&format!(
                    r#"            <div class="funnel-row">
                <div class="funnel-label">{}</div>
                <div class="funnel-track">
                    <div class="funnel-bar" style="width: {:.1}%; background-color: {};">{} ({:.1}%)</div>
                </div>
            </div>
"#,
                    escape_html(&step.step_label),
                    step.conversion_rate.clamp(0.0, 100.0),
                    PALETTE[index % PALETTE.len()],
                    format_number(step.users as i64),
                    step.conversion_rate
                ));
            }
            html.push_str("        </div>\n");

            html.push_str(
                r#"
        <h2>Step-by-Step Breakdown</h2>
        <table>
            <thead>
                <tr>
                    <th>Step</th>
                    <th>Users</th>
                    <th>Conversion Rate</th>
                    <th>Drop Off</th>
                    <th>Drop Off %</th>
                </tr>
            </thead>
            <tbody>
"#,
            );
            for step in steps {
                html.push_str(&format!(
                    r#"                <tr>
                    <td>{}</td>
                    <td>{}</td>
                    <td>{:.1}%</td>
                    <td>{}</td>
                    <td>{:.1}%</td>
                </tr>
"#,
                    escape_html(&step.step_label),
                    format_number(step.users as i64),
                    step.conversion_rate,
                    format_number(step.drop_off),
                    step.drop_off_pct
                ));
            }
            html.push_str("            </tbody>\n        </table>\n");
        }
    }

    if !report.unrecognized_steps.is_empty() {
        let steps = report
            .unrecognized_steps
            .iter()
            .map(|s| format!("<code>{}</code>", escape_html(s)))
            .collect::<Vec<_>>()
            .join(", ");
        html.push_str(&format!(
            "        <div class=\"note\">Not part of the funnel: {}</div>\n",
            steps
        ));
    }

    html.push_str(&format!(
        r#"        <div class="footer">
            {} events &middot; generated {}
        </div>
    </div>
</body>
</html>
"#,
        format_number(report.total_events as i64),
        report.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));

    html
}

/// Render the funnel as a plain text table for terminals
pub fn render_text_report(report: &FunnelReport) -> String {
    let mut text = format!(
        "{}\nGenerated {} from {} events\n\n",
        DASHBOARD_TITLE.to_uppercase(),
        report.generated_at.format("%Y-%m-%d %H:%M:%S UTC"),
        format_number(report.total_events as i64)
    );

    match &report.funnel {
        Funnel::NoData => {
            text.push_str(NO_DATA_MESSAGE);
            text.push('\n');
        }
        Funnel::Steps(steps) => {
            let label_width = steps
                .iter()
                .map(|s| s.step_label.chars().count())
                .chain(std::iter::once("Step".len()))
                .max()
                .unwrap_or(4);

            let header = format!(
                "{:<w$}  {:>10}  {:>15}  {:>10}  {:>10}",
                "Step",
                "Users",
                "Conversion Rate",
                "Drop Off",
                "Drop Off %",
                w = label_width
            );
            text.push_str(&header);
            text.push('\n');
            text.push_str(&"-".repeat(header.chars().count()));
            text.push('\n');

            for step in steps {
                text.push_str(&format!(
                    "{:<w$}  {:>10}  {:>15}  {:>10}  {:>10}\n",
                    step.step_label,
                    format_number(step.users as i64),
                    format!("{:.1}%", step.conversion_rate),
                    format_number(step.drop_off),
                    format!("{:.1}%", step.drop_off_pct),
                    w = label_width
                ));
            }
        }
    }

    if !report.unrecognized_steps.is_empty() {
        text.push_str(&format!(
            "\nNot part of the funnel: {}\n",
            report.unrecognized_steps.join(", ")
        ));
    }

    text
}

/// Format an integer with thousands separators
pub fn format_number(n: i64) -> String {
    let digits = n.unsigned_abs().to_string();
    let mut result = String::new();

    for (count, c) in digits.chars().rev().enumerate() {
        if count > 0 && count % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    if n < 0 {
        result.push('-');
    }

    result.chars().rev().collect()
}

fn escape_html(s: &str) -> String {
    let mut escaped = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

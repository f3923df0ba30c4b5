//! HTML report rendering
//!
//! Plain string templating over a [`ReportSnapshot`]. Every interpolated
//! value goes through [`html_escape`].

use super::snapshot::{ReportSnapshot, ResultLine};
use crate::storage::{ReportStatus, ResultFlag};

const REPORT_STYLES: &str = r#"
body { font-family: "Helvetica Neue", Arial, sans-serif; color: #1d1f24; margin: 2rem; }
header { border-bottom: 2px solid #1d3f72; padding-bottom: 0.75rem; margin-bottom: 1rem; }
header h1 { margin: 0; font-size: 1.4rem; color: #1d3f72; }
header .branch { font-size: 0.85rem; color: #555; }
.patient { display: grid; grid-template-columns: repeat(2, 1fr); gap: 0.25rem 2rem; font-size: 0.9rem; }
.patient .label { color: #666; }
table { width: 100%; border-collapse: collapse; margin-top: 1.25rem; font-size: 0.9rem; }
th, td { text-align: left; padding: 0.4rem 0.5rem; border-bottom: 1px solid #ddd; }
th { background: #f1f4f9; }
td.flag-low, td.flag-high, td.flag-abnormal { font-weight: bold; color: #b3261e; }
td.pending { color: #888; font-style: italic; }
.remarks { font-size: 0.8rem; color: #555; }
.signature { margin-top: 2.5rem; text-align: right; font-size: 0.9rem; }
.watermark { position: fixed; top: 40%; left: 0; right: 0; text-align: center;
    font-size: 6rem; color: rgba(179, 38, 30, 0.12); transform: rotate(-30deg); pointer-events: none; }
footer { margin-top: 2rem; font-size: 0.75rem; color: #888; }
"#;

/// Simple HTML escaping to prevent XSS.
pub fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

fn opt(value: Option<&str>) -> String {
    value.map(html_escape).unwrap_or_default()
}

fn flag_label(flag: Option<ResultFlag>) -> (&'static str, &'static str) {
    match flag {
        Some(ResultFlag::Low) => ("L", "flag-low"),
        Some(ResultFlag::High) => ("H", "flag-high"),
        Some(ResultFlag::Abnormal) => ("A", "flag-abnormal"),
        Some(ResultFlag::Normal) | None => ("", ""),
    }
}

fn push_patient_field(out: &mut String, label: &str, value: &str) {
    out.push_str("<div><span class=\"label\">");
    out.push_str(&html_escape(label));
    out.push_str(":</span> ");
    out.push_str(value);
    out.push_str("</div>\n");
}

fn push_result_row(out: &mut String, line: &ResultLine) {
    let (flag_text, flag_class) = flag_label(line.flag);
    out.push_str("<tr>\n<td>");
    out.push_str(&html_escape(&line.test_name));
    out.push_str("</td>\n");
    match &line.value {
        Some(value) => {
            out.push_str("<td class=\"");
            out.push_str(flag_class);
            out.push_str("\">");
            out.push_str(&html_escape(value));
            if !flag_text.is_empty() {
                out.push(' ');
                out.push_str(flag_text);
            }
            out.push_str("</td>\n");
        }
        None => out.push_str("<td class=\"pending\">Pending</td>\n"),
    }
    out.push_str("<td>");
    out.push_str(&opt(line.unit.as_deref()));
    out.push_str("</td>\n<td>");
    out.push_str(&opt(line.ref_range.as_deref()));
    out.push_str("</td>\n</tr>\n");
    if let Some(remarks) = line.remarks.as_deref().filter(|r| !r.is_empty()) {
        out.push_str("<tr><td colspan=\"4\" class=\"remarks\">");
        out.push_str(&html_escape(remarks));
        out.push_str("</td></tr>\n");
    }
}

/// Render a report page
///
/// Drafts get a watermark so a printed preview cannot pass for a signed
/// report.
pub fn render_report_html(snapshot: &ReportSnapshot, status: ReportStatus) -> String {
    let p = &snapshot.patient;
    let mut content = String::with_capacity(4096);

    if status == ReportStatus::Draft {
        content.push_str("<div class=\"watermark\">DRAFT</div>\n");
    }

    content.push_str("<header>\n<h1>");
    content.push_str(&html_escape(&p.lab_name));
    content.push_str("</h1>\n<div class=\"branch\">");
    content.push_str(&html_escape(&p.branch_name));
    if let Some(address) = p.branch_address.as_deref() {
        content.push_str(" &middot; ");
        content.push_str(&html_escape(address));
    }
    if let Some(phone) = p.branch_phone.as_deref() {
        content.push_str(" &middot; ");
        content.push_str(&html_escape(phone));
    }
    content.push_str("</div>\n</header>\n");

    content.push_str("<section class=\"patient\">\n");
    push_patient_field(&mut content, "Patient", &html_escape(&p.full_name));
    push_patient_field(&mut content, "Patient No", &html_escape(&p.patient_number));
    let age_sex = match (p.age_years, p.sex.as_deref()) {
        (Some(age), Some(sex)) => format!("{} Y / {}", age, html_escape(sex)),
        (Some(age), None) => format!("{} Y", age),
        (None, Some(sex)) => html_escape(sex),
        (None, None) => String::new(),
    };
    push_patient_field(&mut content, "Age / Sex", &age_sex);
    push_patient_field(&mut content, "Visit No", &html_escape(&p.visit_number));
    push_patient_field(
        &mut content,
        "Visit Date",
        &html_escape(&p.visited_at.format("%d-%m-%Y %H:%M").to_string()),
    );
    push_patient_field(&mut content, "Referred By", &opt(p.referring_doctor.as_deref()));
    push_patient_field(
        &mut content,
        "Report No",
        &format!("{} (v{})", html_escape(&snapshot.report_number), snapshot.version),
    );
    content.push_str("</section>\n");

    content.push_str(
        "<table>\n<thead><tr><th>Test</th><th>Result</th><th>Unit</th><th>Reference Range</th></tr></thead>\n<tbody>\n",
    );
    for line in &snapshot.results.lines {
        push_result_row(&mut content, line);
    }
    content.push_str("</tbody>\n</table>\n");

    if let Some(sig) = &snapshot.signature {
        content.push_str("<div class=\"signature\">\n<div><strong>");
        content.push_str(&html_escape(&sig.doctor_name));
        content.push_str("</strong></div>\n");
        if let Some(q) = sig.qualification.as_deref() {
            content.push_str("<div>");
            content.push_str(&html_escape(q));
            content.push_str("</div>\n");
        }
        if let Some(reg) = sig.registration_no.as_deref() {
            content.push_str("<div>Reg. No. ");
            content.push_str(&html_escape(reg));
            content.push_str("</div>\n");
        }
        content.push_str("<div>Signed ");
        content.push_str(&html_escape(
            &sig.signed_at.format("%d-%m-%Y %H:%M UTC").to_string(),
        ));
        content.push_str("</div>\n</div>\n");
    }

    content.push_str("<footer>");
    content.push_str(match status {
        ReportStatus::Finalized => "Electronically verified report.",
        ReportStatus::Draft => "Preview only. Results are not verified.",
    });
    content.push_str("</footer>\n");

    html_page(
        &format!("{} - {}", snapshot.report_number, p.full_name),
        &content,
    )
}

fn html_page(title: &str, content: &str) -> String {
    let mut page = String::with_capacity(content.len() + REPORT_STYLES.len() + 256);
    page.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n<title>");
    page.push_str(&html_escape(title));
    page.push_str("</title>\n<style>");
    page.push_str(REPORT_STYLES);
    page.push_str("</style>\n</head>\n<body>\n");
    page.push_str(content);
    page.push_str("</body>\n</html>\n");
    page
}

//! HTML rendering of the current snapshot.

use std::fmt::Write;

use crate::snapshot::{EnrichedCameraRecord, Snapshot};

const STYLE: &str = "body{font-family:sans-serif;margin:1.5rem;background:#f4f4f4}\
.cards{display:flex;flex-wrap:wrap;gap:1rem}\
.card{background:#fff;padding:.75rem;border-radius:6px;width:340px}\
.card img{width:100%}\
.counts{font-size:.9rem;color:#333}\
.gaps{color:#a33;font-size:.85rem}";

/// Render the viewer page. `None` renders the first-refresh notice.
pub fn render_page(snapshot: Option<&Snapshot>) -> String {
    let mut out = String::new();
    out.push_str("<!doctype html><html><head><meta charset=\"utf-8\">");
    out.push_str("<title>Traffic cameras</title><style>");
    out.push_str(STYLE);
    out.push_str("</style></head><body><h1>Traffic cameras</h1>");

    match snapshot {
        None => {
            out.push_str("<p>First refresh in progress; check back shortly.</p>");
        }
        Some(snapshot) => {
            let _ = write!(
                out,
                "<p>Last updated: {} (cycle {})</p>",
                escape(&snapshot.published_at.format("%Y-%m-%d %H:%M:%S").to_string()),
                snapshot.cycle
            );
            for entry in &snapshot.locations {
                let _ = write!(
                    out,
                    "<section id=\"{}\"><h2>{}</h2>",
                    escape(&entry.location.id),
                    escape(&entry.location.name)
                );
                if entry.cameras.is_empty() {
                    out.push_str("<p>No cameras listed.</p>");
                } else {
                    out.push_str("<div class=\"cards\">");
                    for camera in &entry.cameras {
                        render_camera(&mut out, camera);
                    }
                    out.push_str("</div>");
                }
                out.push_str("</section>");
            }
            if !snapshot.gaps.is_empty() {
                let _ = write!(
                    out,
                    "<p class=\"gaps\">{} item(s) could not be refreshed this cycle.</p>",
                    snapshot.gaps.len()
                );
            }
        }
    }

    out.push_str("</body></html>");
    out
}

fn render_camera(out: &mut String, camera: &EnrichedCameraRecord) {
    let _ = write!(
        out,
        "<div class=\"card\"><img src=\"/static/{}\" alt=\"{}\"><h3>{}</h3><p>{}</p><p class=\"counts\">",
        escape(&camera.annotated_image_ref),
        escape(&camera.description),
        escape(&camera.description),
        escape(&camera.timestamp_text)
    );
    for (class, count) in camera.vehicle_counts.iter() {
        let _ = write!(out, "{}: {} ", escape(class), count);
    }
    let _ = write!(
        out,
        "<strong>total: {}</strong></p></div>",
        camera.vehicle_counts.total()
    );
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counts::VehicleCounts;
    use crate::detect::VehicleClasses;
    use crate::directory::{Location, RawCameraRecord};
    use crate::snapshot::LocationEntry;
    use chrono::Local;

    #[test]
    fn renders_notice_before_first_cycle() {
        let html = render_page(None);
        assert!(html.contains("First refresh in progress"));
    }

    #[test]
    fn renders_cameras_and_escapes_text() {
        let raw = RawCameraRecord::new("<b>Exit 5</b>", "10:20", "https://img.test/1.jpg");
        let snapshot = Snapshot {
            cycle: 4,
            published_at: Local::now(),
            locations: vec![
                LocationEntry {
                    location: Location::new("cte", "CTE"),
                    cameras: vec![EnrichedCameraRecord::from_raw(
                        &raw,
                        0,
                        VehicleCounts::zero(&VehicleClasses::default()),
                        "cte_0.jpg".to_string(),
                        4,
                    )],
                },
                LocationEntry {
                    location: Location::new("pie", "PIE"),
                    cameras: Vec::new(),
                },
            ],
            gaps: Vec::new(),
        };
        let html = render_page(Some(&snapshot));
        assert!(html.contains("/static/cte_0.jpg"));
        assert!(html.contains("&lt;b&gt;Exit 5&lt;/b&gt;"));
        assert!(!html.contains("<b>Exit 5</b>"));
        assert!(html.contains("total: 0"));
        assert!(html.contains("No cameras listed."));
        assert!(html.contains("cycle 4"));
    }
}

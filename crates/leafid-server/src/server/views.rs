//! Server-rendered HTML pages
//!
//! Every interpolated value goes through [`escape_html`].

use leafid_core::{HistoryEntry, Identification, PlantLookup};
use std::fmt::Write;

use crate::state::AppState;

/// Values shown in the page chrome
#[derive(Debug, Clone, Default)]
pub struct PageContext {
    pub classifier: String,
    pub species: usize,
    pub history_enabled: bool,
    pub uploads_enabled: bool,
}

impl PageContext {
    pub fn from_state(state: &AppState) -> Self {
        Self {
            classifier: state.classifier.name().to_string(),
            species: state.classifier.labels().len(),
            history_enabled: state.history.is_some(),
            uploads_enabled: state.settings.upload_dir.is_some(),
        }
    }
}

/// Escape text for use in HTML element content and quoted attributes
pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}

fn layout(title: &str, nav_history: bool, body: &str) -> String {
    let history_link = if nav_history {
        r#"<a href="/history">History</a>"#
    } else {
        ""
    };
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>{title} · LeafID</title>
    <link rel="stylesheet" href="/static/style.css">
</head>
<body>
    <header>
        <a class="brand" href="/">LeafID</a>
        <nav><a href="/">Identify</a> {history_link}</nav>
    </header>
    <main>
{body}
    </main>
    <footer>Identifications are informational only. Consult a qualified practitioner before medicinal use.</footer>
</body>
</html>
"#,
        title = escape_html(title),
        history_link = history_link,
        body = body,
    )
}

fn upload_form() -> &'static str {
    r#"        <section class="card">
            <h2>Upload a leaf photo</h2>
            <form action="/identify" method="post" enctype="multipart/form-data">
                <input type="file" name="file" accept=".jpg,.jpeg,.png,.bmp,.webp" required>
                <button type="submit">Identify</button>
            </form>
        </section>"#
}

fn webcam_panel() -> &'static str {
    r#"        <section class="card">
            <h2>Use your camera</h2>
            <video id="camera" autoplay playsinline muted></video>
            <canvas id="frame" hidden></canvas>
            <div class="actions">
                <button id="start-camera" type="button">Start camera</button>
                <button id="capture" type="button" disabled>Capture &amp; identify</button>
            </div>
            <div id="camera-result" class="result" aria-live="polite"></div>
        </section>
        <script src="/static/webcam.js" defer></script>"#
}

/// Landing page: upload form and webcam capture
pub fn index_page(ctx: &PageContext) -> String {
    let body = format!(
        r#"        <h1>Medicinal leaf identification</h1>
        <p class="muted">Classifier <code>{}</code> recognizes {} species.</p>
{}
{}"#,
        escape_html(&ctx.classifier),
        ctx.species,
        upload_form(),
        webcam_panel(),
    );
    layout("Identify", ctx.history_enabled, &body)
}

fn plant_details(identification: &Identification) -> String {
    match &identification.plant {
        PlantLookup::Found(record) => {
            let mut html = format!(
                r#"            <dl>
                <dt>Scientific name</dt><dd><em>{}</em></dd>
                <dt>Medicinal uses</dt><dd>{}</dd>"#,
                escape_html(&record.scientific_name),
                escape_html(&record.uses),
            );
            if let Some(precautions) = &record.precautions {
                let _ = write!(
                    html,
                    "\n                <dt>Precautions</dt><dd>{}</dd>",
                    escape_html(precautions)
                );
            }
            html.push_str("\n            </dl>");
            html
        }
        PlantLookup::Unavailable => {
            r#"            <p class="muted">Species recognized, but details are unavailable.</p>"#
                .to_string()
        }
    }
}

/// Result of an identification, followed by the upload form
pub fn result_page(identification: &Identification, ctx: &PageContext) -> String {
    let prediction = &identification.prediction;

    let mut alternatives = String::new();
    for alt in prediction.top_k.iter().skip(1) {
        let _ = write!(
            alternatives,
            "\n                <li>{} <span class=\"muted\">{:.1}%</span></li>",
            escape_html(&alt.label),
            alt.score * 100.0
        );
    }
    let alternatives = if alternatives.is_empty() {
        String::new()
    } else {
        format!(
            "\n            <h3>Other candidates</h3>\n            <ul>{}\n            </ul>",
            alternatives
        )
    };

    let image = match (&identification.saved_as, ctx.uploads_enabled) {
        (Some(name), true) => format!(
            "\n            <img class=\"preview\" src=\"/uploads/{}\" alt=\"Uploaded leaf\">",
            escape_html(name)
        ),
        _ => String::new(),
    };

    let body = format!(
        r#"        <section class="card result">{image}
            <h1>{label}</h1>
            <p class="confidence">Confidence {confidence:.1}%</p>
{details}{alternatives}
        </section>
{form}"#,
        image = image,
        label = escape_html(&prediction.label),
        confidence = prediction.confidence_percent(),
        details = plant_details(identification),
        alternatives = alternatives,
        form = upload_form(),
    );
    layout(&prediction.label, ctx.history_enabled, &body)
}

/// Error message followed by the upload form
pub fn error_page(message: &str) -> String {
    let body = format!(
        r#"        <section class="card error">
            <h1>Could not identify the image</h1>
            <p>{}</p>
        </section>
{}"#,
        escape_html(message),
        upload_form(),
    );
    layout("Error", false, &body)
}

/// Table of recent identifications
pub fn history_page(entries: &[HistoryEntry], ctx: &PageContext) -> String {
    let mut rows = String::new();
    for entry in entries {
        let file = match (&entry.filename, ctx.uploads_enabled) {
            (Some(name), true) => format!(
                "<a href=\"/uploads/{0}\">{0}</a>",
                escape_html(name)
            ),
            (Some(name), false) => escape_html(name),
            (None, _) => "-".to_string(),
        };
        let _ = write!(
            rows,
            "\n                <tr><td>{}</td><td>{}</td><td>{:.1}%</td><td>{}</td><td>{}</td></tr>",
            entry.created_at.format("%Y-%m-%d %H:%M:%S UTC"),
            escape_html(&entry.label),
            entry.confidence * 100.0,
            entry.source,
            file,
        );
    }

    let table = if entries.is_empty() {
        r#"        <p class="muted">No identifications yet.</p>"#.to_string()
    } else {
        format!(
            r#"        <table>
            <thead>
                <tr><th>When</th><th>Label</th><th>Confidence</th><th>Source</th><th>Image</th></tr>
            </thead>
            <tbody>{}
            </tbody>
        </table>"#,
            rows
        )
    };

    let body = format!("        <h1>Recent identifications</h1>\n{}", table);
    layout("History", ctx.history_enabled, &body)
}

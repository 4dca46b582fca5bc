use crate::insight::InsightKind;

/// Generated text together with its display forms.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedInsight {
    pub kind: InsightKind,
    pub text: String,
    pub html: String,
}

impl RenderedInsight {
    pub fn new(kind: InsightKind, text: String) -> Self {
        let html = insight_html(kind, &text);
        Self { kind, text, html }
    }

    /// Terminal-friendly form: bullet markers become "•", nothing else changes.
    pub fn plain(&self) -> String {
        self.text
            .lines()
            .map(|line| match strip_bullet(line) {
                Some(rest) => format!("• {rest}"),
                None => line.to_string(),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

pub fn insight_html(kind: InsightKind, text: &str) -> String {
    format!(
        r#"<div><h4 class="text-lg font-semibold text-slate-800 mb-2">AI Insight: {}</h4><div class="prose prose-sm max-w-none text-slate-700">{}</div></div>"#,
        kind.title(),
        text_to_html(text)
    )
}

pub fn error_html(message: &str) -> String {
    format!(
        r#"<div class="text-red-500">Error generating AI insight: {}</div>"#,
        escape_html(message)
    )
}

/// Newlines become `<br>`, lines led by `* ` or `- ` become `• ` bullets.
pub fn text_to_html(text: &str) -> String {
    text.lines()
        .map(|line| match strip_bullet(line) {
            Some(rest) => format!("• {}", escape_html(rest)),
            None => escape_html(line),
        })
        .collect::<Vec<_>>()
        .join("<br>")
}

fn strip_bullet(line: &str) -> Option<&str> {
    let trimmed = line.trim_start();
    trimmed
        .strip_prefix("* ")
        .or_else(|| trimmed.strip_prefix("- "))
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newlines_and_bullets() {
        let html = text_to_html("Tips:\n* Stay inside\n- Use a purifier\nPM2.5 - high");
        assert_eq!(
            html,
            "Tips:<br>• Stay inside<br>• Use a purifier<br>PM2.5 - high"
        );
    }

    #[test]
    fn markup_in_model_output_is_escaped() {
        assert_eq!(text_to_html("<b>hi</b> & bye"), "&lt;b&gt;hi&lt;/b&gt; &amp; bye");
    }

    #[test]
    fn insight_html_has_title() {
        let html = insight_html(InsightKind::Mask, "Wear one.");
        assert!(html.contains("AI Insight: Mask"));
        assert!(html.contains("Wear one."));
    }

    #[test]
    fn error_html_prefixes_message() {
        assert_eq!(
            error_html("Live data is incomplete for this location."),
            r#"<div class="text-red-500">Error generating AI insight: Live data is incomplete for this location.</div>"#
        );
    }

    #[test]
    fn plain_keeps_text_but_renders_bullets() {
        let r = RenderedInsight::new(InsightKind::Health, "Advice:\n - Rest\n* Hydrate".into());
        assert_eq!(r.plain(), "Advice:\n• Rest\n• Hydrate");
    }
}

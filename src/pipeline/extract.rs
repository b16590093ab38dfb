//! Fulltext extraction
//!
//! Two strategies over the fetched HTML: a primary pass scoped to article
//! containers and a fallback paragraph sweep. The longer clean text wins,
//! then the quality gate (minimum length, junk-character ratio) decides
//! whether the result is usable at all.

use scraper::{Html, Selector};

/// Minimum characters for a usable fulltext.
pub const MIN_FULLTEXT_CHARS: usize = 400;
/// Reject extractions whose junk ratio reaches this.
pub const MAX_JUNK_RATIO: f64 = 0.15;
/// Paragraphs shorter than this are navigation debris, not prose.
const MIN_PARAGRAPH_CHARS: usize = 60;

/// Outcome of one extraction attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractOutcome {
    Ok(String),
    Empty,
    LowQuality,
}

/// Extract the main text from an HTML document.
pub fn extract_fulltext(html: &str) -> ExtractOutcome {
    let doc = Html::parse_document(html);

    let primary = article_container_text(&doc);
    let fallback = paragraph_sweep_text(&doc);

    let text = if primary.chars().count() >= fallback.chars().count() {
        primary
    } else {
        fallback
    };

    if text.trim().is_empty() {
        return ExtractOutcome::Empty;
    }
    if text.chars().count() < MIN_FULLTEXT_CHARS || junk_ratio(&text) >= MAX_JUNK_RATIO {
        return ExtractOutcome::LowQuality;
    }
    ExtractOutcome::Ok(text)
}

/// Primary strategy: paragraphs inside recognized article containers.
fn article_container_text(doc: &Html) -> String {
    let container_sel = Selector::parse(
        "article p, main p, [class*=article] p, [class*=content] p, [class*=post] p, [id*=article] p",
    )
    .expect("static selector");

    collect_paragraphs(doc.select(&container_sel).map(element_text))
}

/// Fallback strategy: every substantial paragraph in the document.
fn paragraph_sweep_text(doc: &Html) -> String {
    let p_sel = Selector::parse("p").expect("static selector");
    collect_paragraphs(doc.select(&p_sel).map(element_text))
}

fn element_text(el: scraper::ElementRef) -> String {
    el.text()
        .collect::<Vec<_>>()
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn collect_paragraphs(paragraphs: impl Iterator<Item = String>) -> String {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for p in paragraphs {
        if p.chars().count() < MIN_PARAGRAPH_CHARS {
            continue;
        }
        // Repeated nav/footer blocks show up once.
        if seen.insert(p.clone()) {
            out.push(p);
        }
    }
    out.join("\n\n")
}

/// Ratio of junk characters and junk lines across the text: control chars,
/// URL-only lines, and repeated navigation tokens all count against it.
pub fn junk_ratio(text: &str) -> f64 {
    let total_chars = text.chars().count();
    if total_chars == 0 {
        return 1.0;
    }

    let mut junk_chars = 0usize;
    for c in text.chars() {
        if c.is_control() && c != '\n' && c != '\t' {
            junk_chars += 1;
        }
    }

    let mut line_counts: std::collections::HashMap<&str, usize> = std::collections::HashMap::new();
    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        *line_counts.entry(trimmed).or_default() += 1;
        if is_url_only_line(trimmed) {
            junk_chars += trimmed.chars().count();
        }
    }
    // Every repeat of an identical line is junk (nav tokens, cookie banners).
    for (line, count) in line_counts {
        if count > 1 {
            junk_chars += line.chars().count() * (count - 1);
        }
    }

    (junk_chars as f64 / total_chars as f64).min(1.0)
}

fn is_url_only_line(line: &str) -> bool {
    let mut words = line.split_whitespace();
    match (words.next(), words.next()) {
        (Some(w), None) => w.starts_with("http://") || w.starts_with("https://"),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn long_paragraph(tag: &str) -> String {
        format!(
            "<p>{tag} paragraph with plenty of words to clear the minimum length \
             threshold used by the extractor, describing the announcement in detail \
             and quoting the relevant executives at length for the record.</p>"
        )
    }

    #[test]
    fn prefers_article_container_when_longer() {
        let html = format!(
            "<html><body><nav><p>tiny nav</p></nav><article>{}{}{}</article></body></html>",
            long_paragraph("First"),
            long_paragraph("Second"),
            long_paragraph("Third"),
        );
        match extract_fulltext(&html) {
            ExtractOutcome::Ok(text) => {
                assert!(text.starts_with("First paragraph"));
                assert!(text.contains("\n\n"));
            }
            other => panic!("expected Ok, got {other:?}"),
        }
    }

    #[test]
    fn falls_back_to_paragraph_sweep() {
        let html = format!(
            "<html><body><div>{}{}{}</div></body></html>",
            long_paragraph("Alpha"),
            long_paragraph("Beta"),
            long_paragraph("Gamma"),
        );
        assert!(matches!(extract_fulltext(&html), ExtractOutcome::Ok(_)));
    }

    #[test]
    fn empty_page_is_empty() {
        assert_eq!(extract_fulltext("<html><body></body></html>"), ExtractOutcome::Empty);
    }

    #[test]
    fn short_text_is_low_quality() {
        let html = "<html><body><article><p>A single paragraph that is long enough to \
                    be kept but far too short overall to pass the fulltext gate.</p>\
                    </article></body></html>";
        assert_eq!(extract_fulltext(html), ExtractOutcome::LowQuality);
    }

    #[test]
    fn repeated_nav_lines_raise_junk_ratio() {
        let nav = "Subscribe to our newsletter today for more updates and offers";
        let repeated = format!("{nav}\n{nav}\n{nav}\n{nav}\n{nav}\n{nav}");
        assert!(junk_ratio(&repeated) > 0.5);
        assert!(junk_ratio("Normal prose without repetition at all.") < 0.05);
    }

    #[test]
    fn url_only_lines_count_as_junk() {
        let text = "https://example.com/a\nhttps://example.com/b";
        assert!(junk_ratio(text) > 0.9);
    }
}

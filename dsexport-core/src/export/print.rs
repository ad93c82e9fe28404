//! Styled HTML view of the canonical string, meant for a print dialog.

use chrono::{DateTime, Utc};

use crate::canonical::{CanonicalString, Headers, TURN_SEPARATOR};
use crate::dom::escape_text;
use crate::export::file_name;
use crate::model::{ArtifactKind, ExportArtifact};

const PRINT_STYLE: &str = r#"body { font-family: -apple-system, BlinkMacSystemFont, "Segoe UI", Roboto, sans-serif; line-height: 1.6; padding: 20px; max-width: 800px; margin: 0 auto; }
h1 { color: #2c3e50; }
h2 { color: #2c3e50; border-bottom: 1px solid #eee; padding-bottom: 0.3em; }
h3 { color: #555; margin-top: 15px; }
.ai-answer { color: #1a7f37; margin: 15px 0; }
.ai-chain { color: #666; font-style: italic; margin: 10px 0; padding-left: 15px; border-left: 3px solid #ddd; }
hr { border: 0; border-top: 1px solid #eee; margin: 25px 0; }
blockquote { border-left: 3px solid #ddd; margin: 0 0 20px; padding-left: 15px; color: #666; font-style: italic; }"#;

#[derive(Default)]
struct Open {
    section: bool,
    chain: bool,
}

impl Open {
    fn close_chain(&mut self, out: &mut String) {
        if self.chain {
            out.push_str("</blockquote>");
            self.chain = false;
        }
    }

    fn close(&mut self, out: &mut String) {
        self.close_chain(out);
        if self.section {
            out.push_str("</div>");
            self.section = false;
        }
    }
}

pub fn render_print_html(canonical: &CanonicalString, title: Option<&str>, headers: &Headers) -> String {
    let mut text = canonical.as_str();
    let mut body = String::new();

    if let Some(title) = title
        && let Some(rest) = text.strip_prefix(&format!("# {title}\n\n"))
    {
        body.push_str(&format!("<h1>{}</h1>", escape_text(title)));
        text = rest;
    }

    let user_prefix = format!("## {}\n\n", headers.user);
    let assistant_prefix = format!("## {}\n\n", headers.assistant);
    let thoughts_line = format!("### {}", headers.thoughts);

    let mut open = Open::default();
    for (idx, part) in text.split(TURN_SEPARATOR).enumerate() {
        if idx > 0 {
            open.close(&mut body);
            body.push_str("<hr>");
        }

        let section = [
            (&user_prefix, &headers.user, "user-question"),
            (&assistant_prefix, &headers.assistant, "ai-answer"),
        ]
        .into_iter()
        .find_map(|(prefix, header, class)| {
            part.strip_prefix(prefix.as_str())
                .map(|rest| (header, class, rest))
        });

        let content = match section {
            Some((header, class, rest)) => {
                body.push_str(&format!(
                    "<h2>{}</h2><div class=\"{class}\">",
                    escape_text(header)
                ));
                open.section = true;
                rest
            }
            // A horizontal rule inside an answer, not a turn boundary.
            None => part,
        };
        render_lines(content, &thoughts_line, headers, &mut open, &mut body);
    }
    open.close(&mut body);

    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>DeepSeek Chat Export</title>\n<style>\n{PRINT_STYLE}\n</style>\n</head>\n<body>\n{body}\n</body>\n</html>\n"
    )
}

fn render_lines(content: &str, thoughts_line: &str, headers: &Headers, open: &mut Open, out: &mut String) {
    let mut lines = content.split('\n').peekable();
    while let Some(line) = lines.next() {
        if line == thoughts_line && !open.chain {
            out.push_str(&format!(
                "<h3>{}</h3><blockquote class=\"ai-chain\">",
                escape_text(&headers.thoughts)
            ));
            open.chain = true;
            if lines.peek().is_some_and(|next| next.is_empty()) {
                lines.next();
            }
            continue;
        }

        if open.chain {
            if let Some(quoted) = unquote(line) {
                out.push_str(&escape_text(quoted));
                out.push_str("<br>");
                continue;
            }
            open.close_chain(out);
            if line.is_empty() {
                continue;
            }
        }

        out.push_str(&escape_text(unquote(line).unwrap_or(line)));
        if lines.peek().is_some() {
            out.push_str("<br>");
        }
    }
}

/// Line without its blockquote marker, if it has one.
fn unquote(line: &str) -> Option<&str> {
    let quoted = line.strip_prefix('>')?;
    Some(quoted.strip_prefix(' ').unwrap_or(quoted))
}

pub fn print_artifact(
    canonical: &CanonicalString,
    title: Option<&str>,
    headers: &Headers,
    prefix: &str,
    now: DateTime<Utc>,
) -> ExportArtifact {
    let kind = ArtifactKind::PrintHtml;
    ExportArtifact {
        kind,
        file_name: file_name(prefix, title, now, kind.extension()),
        bytes: render_print_html(canonical, title, headers).into_bytes(),
    }
}

#[cfg(test)]
mod tests {
    use super::render_print_html;
    use crate::canonical::{CanonicalOptions, Headers, canonicalize};
    use crate::model::{ConversationDocument, Turn};

    fn body_of(html: &str) -> &str {
        let start = html.find("<body>\n").expect("body") + "<body>\n".len();
        let end = html.find("\n</body>").expect("end");
        &html[start..end]
    }

    #[test]
    fn turns_become_sections() {
        let doc = ConversationDocument {
            title: Some("A <b> chat".into()),
            turns: vec![
                Turn::user(0, "1 < 2?\nsure"),
                Turn::assistant(
                    1,
                    Some("**Thought for 2 seconds**".into()),
                    Some("### Thought Process\n\n> check\n>\n> done".into()),
                    Some("Yes.\n\n---\n\nAlso true.".into()),
                )
                .expect("turn"),
            ],
            warnings: Vec::new(),
        };
        let canonical = canonicalize(&doc, &CanonicalOptions::default());
        let html = render_print_html(&canonical, doc.title.as_deref(), &Headers::default());

        assert!(html.contains("<title>DeepSeek Chat Export</title>"));
        assert!(html.contains(".ai-chain {"));
        assert_eq!(
            body_of(&html),
            concat!(
                "<h1>A &lt;b&gt; chat</h1>",
                "<h2>User</h2><div class=\"user-question\">1 &lt; 2?<br>sure</div>",
                "<hr>",
                "<h2>Assistant</h2><div class=\"ai-answer\">**Thought for 2 seconds**<br><br>",
                "<h3>Thought Process</h3><blockquote class=\"ai-chain\">check<br><br>done<br></blockquote>",
                "Yes.</div><hr>Also true.",
            )
        );
    }

    #[test]
    fn answer_quotes_lose_their_markers() {
        let doc = ConversationDocument {
            title: None,
            turns: vec![
                Turn::user(0, "Quote it"),
                Turn::assistant(1, None, None, Some("> to be\n>\n> or not\n\nDone.".into()))
                    .expect("turn"),
            ],
            warnings: Vec::new(),
        };
        let canonical = canonicalize(&doc, &CanonicalOptions::default());
        let html = render_print_html(&canonical, None, &Headers::default());

        assert!(!html.contains("&gt;"));
        assert!(body_of(&html).ends_with(
            "<div class=\"ai-answer\">to be<br><br>or not<br><br>Done.</div>"
        ));
    }

    #[test]
    fn empty_canonical_has_empty_body() {
        let canonical = canonicalize(&ConversationDocument::default(), &CanonicalOptions::default());
        let html = render_print_html(&canonical, None, &Headers::default());
        assert_eq!(body_of(&html), "");
    }
}

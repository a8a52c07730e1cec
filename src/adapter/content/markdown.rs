//! Markdown Extractor
//!
//! 記事ページの HTML から本文を取り出し、CommonMark に変換する

use anyhow::{anyhow, Result};
use scraper::node::Node;
use scraper::{ElementRef, Html, Selector};

use crate::domain::repositories::collaborators::TextExtractor;

// Candidates for the article body, most specific first
const CONTENT_ROOTS: &[&str] = &[".entry-content", "article", "main", "body"];

// Never part of the body text
const SKIPPED_TAGS: &[&str] = &[
    "script", "style", "noscript", "nav", "header", "footer", "aside", "form", "iframe", "svg",
    "button",
];

/// scraper による本文抽出
pub struct MarkdownExtractor {
    roots: Vec<Selector>,
    ignored: Vec<Selector>,
}

impl MarkdownExtractor {
    /// 新しい抽出器を作成
    ///
    /// # Arguments
    ///
    /// * `ignored` - 本文から除外する要素のセレクタ（著者欄など）
    ///
    /// # Errors
    ///
    /// セレクタが不正な場合にエラーを返す
    pub fn new(ignored: &[String]) -> Result<Self> {
        Ok(Self {
            roots: CONTENT_ROOTS
                .iter()
                .map(|css| parse_selector(css))
                .collect::<Result<_>>()?,
            ignored: ignored
                .iter()
                .map(|css| parse_selector(css))
                .collect::<Result<_>>()?,
        })
    }

    fn is_skipped(&self, element: &ElementRef<'_>) -> bool {
        SKIPPED_TAGS.contains(&element.value().name())
            || self.ignored.iter().any(|s| s.matches(element))
    }

    /// ブロック要素を Markdown のブロック列に変換
    fn blocks(&self, element: ElementRef<'_>, out: &mut Vec<String>) {
        for child in element.children() {
            match child.value() {
                Node::Text(text) => {
                    let text = collapse(text);
                    if !text.is_empty() {
                        out.push(text);
                    }
                }
                Node::Element(_) => {
                    let Some(child) = ElementRef::wrap(child) else {
                        continue;
                    };
                    if self.is_skipped(&child) {
                        continue;
                    }
                    self.block(child, out);
                }
                _ => {}
            }
        }
    }

    fn block(&self, element: ElementRef<'_>, out: &mut Vec<String>) {
        let name = element.value().name();
        match name {
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
                let level = name[1..].parse::<usize>().unwrap_or(2);
                let text = self.inline(element);
                if !text.is_empty() {
                    out.push(format!("{} {}", "#".repeat(level), text));
                }
            }
            "p" => {
                let text = self.inline(element);
                if !text.is_empty() {
                    out.push(text);
                }
            }
            "ul" | "ol" => {
                let items = self.list_items(element, name == "ol");
                if !items.is_empty() {
                    out.push(items.join("\n"));
                }
            }
            "blockquote" => {
                let mut inner = Vec::new();
                self.blocks(element, &mut inner);
                if !inner.is_empty() {
                    let quoted = inner
                        .join("\n\n")
                        .lines()
                        .map(|line| format!("> {}", line).trim_end().to_string())
                        .collect::<Vec<_>>()
                        .join("\n");
                    out.push(quoted);
                }
            }
            "img" => {
                if let Some(image) = image_markdown(element) {
                    out.push(image);
                }
            }
            "hr" => out.push("---".to_string()),
            "pre" => {
                let code: String = element.text().collect();
                out.push(format!("```\n{}\n```", code.trim_end()));
            }
            _ if has_block_children(element) => self.blocks(element, out),
            _ => {
                let text = self.inline(element);
                if !text.is_empty() {
                    out.push(text);
                }
            }
        }
    }

    fn list_items(&self, list: ElementRef<'_>, ordered: bool) -> Vec<String> {
        list.children()
            .filter_map(ElementRef::wrap)
            .filter(|child| child.value().name() == "li")
            .map(|item| self.inline(item))
            .filter(|text| !text.is_empty())
            .enumerate()
            .map(|(index, text)| {
                if ordered {
                    format!("{}. {}", index + 1, text)
                } else {
                    format!("- {}", text)
                }
            })
            .collect()
    }

    /// インライン要素を1行の Markdown に変換
    fn inline(&self, element: ElementRef<'_>) -> String {
        let mut buffer = String::new();
        self.inline_into(element, &mut buffer);
        buffer
            .split('\n')
            .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
            .collect::<Vec<_>>()
            .join("  \n")
            .trim()
            .to_string()
    }

    fn inline_into(&self, element: ElementRef<'_>, buffer: &mut String) {
        for child in element.children() {
            match child.value() {
                Node::Text(text) => buffer.push_str(text),
                Node::Element(_) => {
                    let Some(child) = ElementRef::wrap(child) else {
                        continue;
                    };
                    if self.is_skipped(&child) {
                        continue;
                    }
                    match child.value().name() {
                        "br" => buffer.push('\n'),
                        "strong" | "b" => wrap_inline(buffer, "**", &self.inline(child)),
                        "em" | "i" => wrap_inline(buffer, "*", &self.inline(child)),
                        "code" => wrap_inline(buffer, "`", &self.inline(child)),
                        "a" => {
                            let text = self.inline(child);
                            match child.value().attr("href") {
                                Some(href) if !text.is_empty() && !href.starts_with('#') => {
                                    buffer.push_str(&format!("[{}]({})", text, href));
                                }
                                _ => buffer.push_str(&text),
                            }
                        }
                        "img" => {
                            if let Some(image) = image_markdown(child) {
                                buffer.push_str(&image);
                            }
                        }
                        _ => self.inline_into(child, buffer),
                    }
                }
                _ => {}
            }
        }
    }
}

impl TextExtractor for MarkdownExtractor {
    fn extract(&self, html: &str) -> Option<String> {
        let document = Html::parse_document(html);
        let root = self
            .roots
            .iter()
            .find_map(|selector| document.select(selector).next())?;

        let mut blocks = Vec::new();
        self.blocks(root, &mut blocks);

        let text = blocks.join("\n\n");
        if text.trim().is_empty() {
            None
        } else {
            Some(text)
        }
    }
}

fn parse_selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| anyhow!("Invalid selector '{}': {:?}", css, e))
}

fn collapse(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn wrap_inline(buffer: &mut String, marker: &str, text: &str) {
    if text.is_empty() {
        return;
    }
    buffer.push_str(marker);
    buffer.push_str(text);
    buffer.push_str(marker);
}

fn image_markdown(element: ElementRef<'_>) -> Option<String> {
    let src = element
        .value()
        .attr("src")
        .or_else(|| element.value().attr("data-src"))?;
    if src.starts_with("data:") {
        return None;
    }
    let alt = element.value().attr("alt").map(collapse).unwrap_or_default();
    Some(format!("![{}]({})", alt, src))
}

fn has_block_children(element: ElementRef<'_>) -> bool {
    const BLOCKS: &[&str] = &[
        "p", "div", "section", "article", "figure", "ul", "ol", "blockquote", "h1", "h2", "h3",
        "h4", "h5", "h6", "img", "pre", "hr", "table",
    ];
    element
        .children()
        .filter_map(ElementRef::wrap)
        .any(|child| BLOCKS.contains(&child.value().name()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extractor() -> MarkdownExtractor {
        MarkdownExtractor::new(&["#author".to_string()]).unwrap()
    }

    #[test]
    fn test_extracts_paragraphs_and_headings() {
        let html = r#"
            <html><body>
              <nav><a href="/">Home</a></nav>
              <article>
                <h2>Introdução</h2>
                <p>O   mercado <strong>livre</strong> e a <em>ordem</em>.</p>
                <p>Leia <a href="https://example.com/x">mais</a>.</p>
              </article>
              <footer>Rodapé</footer>
            </body></html>
        "#;

        let text = extractor().extract(html).unwrap();

        assert_eq!(
            text,
            "## Introdução\n\nO mercado **livre** e a *ordem*.\n\nLeia [mais](https://example.com/x)."
        );
    }

    #[test]
    fn test_prefers_entry_content_and_skips_author_block() {
        let html = r#"
            <body>
              <p>Outside</p>
              <div class="entry-content">
                <p>Inside</p>
                <div id="author"><h6>Maria</h6><p>Bio</p></div>
              </div>
            </body>
        "#;

        assert_eq!(extractor().extract(html).unwrap(), "Inside");
    }

    #[test]
    fn test_lists_quotes_and_images() {
        let html = r#"
            <article>
              <ul><li>um</li><li>dois</li></ul>
              <ol><li>first</li></ol>
              <blockquote><p>Citação</p></blockquote>
              <figure><img src="https://cdn.test/a.webp" alt="Foto"></figure>
            </article>
        "#;

        let text = extractor().extract(html).unwrap();

        assert!(text.contains("- um\n- dois"));
        assert!(text.contains("1. first"));
        assert!(text.contains("> Citação"));
        assert!(text.contains("![Foto](https://cdn.test/a.webp)"));
    }

    #[test]
    fn test_empty_body_yields_none() {
        let html = "<html><body><script>var x = 1;</script><nav>menu</nav></body></html>";
        assert!(extractor().extract(html).is_none());
    }

    #[test]
    fn test_invalid_ignored_selector() {
        assert!(MarkdownExtractor::new(&["[[".to_string()]).is_err());
    }
}

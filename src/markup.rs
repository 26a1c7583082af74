//! HTML → Markdown → terminal text conversion.

use regex::Regex;
use scraper::{ElementRef, Html, Node, Selector};
use std::sync::LazyLock;

static BODY: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("body").expect("body selector"));
static IMAGE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"!\[([^\]]*)\]\([^)]*\)").expect("image pattern"));
static LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([^\]]+)\]\(([^)\s]+)\)").expect("link pattern"));
static STRONG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*\*([^*]+)\*\*|__([^_]+)__").expect("strong pattern"));
static EMPHASIS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*([^*\s][^*]*)\*").expect("emphasis pattern"));
static CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"`([^`]+)`").expect("code pattern"));
static HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^#{1,6}\s+").expect("heading pattern"));
static BULLET: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\s*)[-*+]\s+").expect("bullet pattern"));

const SKIPPED_TAGS: &[&str] = &[
    "script", "style", "noscript", "template", "svg", "nav", "head", "iframe", "form",
];

pub fn html_to_markdown(html: &str) -> String {
    let document = Html::parse_document(html);
    let root = document
        .select(&BODY)
        .next()
        .unwrap_or_else(|| document.root_element());

    let mut writer = MarkdownWriter::default();
    writer.walk(root);
    writer.finish()
}

pub fn markdown_to_text(markdown: &str) -> String {
    let mut lines = Vec::new();
    let mut in_fence = false;

    for line in markdown.lines() {
        if line.trim_start().starts_with("```") {
            in_fence = !in_fence;
            continue;
        }
        if in_fence {
            lines.push(line.to_string());
            continue;
        }

        let trimmed = line.trim();
        if matches!(trimmed, "---" | "***" | "___") {
            lines.push("─".repeat(40));
            continue;
        }

        let mut text = HEADING.replace(line, "").into_owned();
        if let Some(rest) = text.trim_start().strip_prefix("> ") {
            text = format!("│ {rest}");
        }
        text = BULLET.replace(&text, "$1• ").into_owned();
        lines.push(render_inline(&text));
    }

    lines.join("\n").trim().to_string()
}

pub fn html_to_text(html: &str) -> String {
    markdown_to_text(&html_to_markdown(html))
}

fn render_inline(line: &str) -> String {
    let line = IMAGE.replace_all(line, "$1");
    let line = LINK.replace_all(&line, "$1 ($2)");
    let line = STRONG.replace_all(&line, "$1$2");
    let line = EMPHASIS.replace_all(&line, "$1");
    CODE.replace_all(&line, "$1").into_owned()
}

#[derive(Default)]
struct MarkdownWriter {
    out: String,
    list_depth: usize,
}

impl MarkdownWriter {
    fn walk(&mut self, element: ElementRef<'_>) {
        for child in element.children() {
            match child.value() {
                Node::Text(text) => self.push_text(text),
                Node::Element(_) => {
                    if let Some(child) = ElementRef::wrap(child) {
                        self.element(child);
                    }
                }
                _ => {}
            }
        }
    }

    fn element(&mut self, element: ElementRef<'_>) {
        let tag = element.value().name();
        if SKIPPED_TAGS.contains(&tag) {
            return;
        }

        match tag {
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
                let level = tag[1..].parse::<usize>().unwrap_or(1);
                self.block_break();
                self.out.push_str(&"#".repeat(level));
                self.out.push(' ');
                self.out.push_str(&collapse_whitespace(&inline_text(element)));
                self.block_break();
            }
            "p" | "div" | "section" | "article" | "main" | "header" | "footer" | "aside"
            | "table" | "tr" | "figure" => {
                self.block_break();
                self.walk(element);
                self.block_break();
            }
            "br" => self.line_break(),
            "hr" => {
                self.block_break();
                self.out.push_str("---");
                self.block_break();
            }
            "ul" | "ol" => {
                self.block_break();
                self.list_depth += 1;
                self.walk(element);
                self.list_depth -= 1;
                self.block_break();
            }
            "li" => {
                self.line_break();
                self.out
                    .push_str(&"  ".repeat(self.list_depth.saturating_sub(1)));
                self.out.push_str("- ");
                self.walk(element);
                self.line_break();
            }
            "a" => {
                let text = collapse_whitespace(&inline_text(element));
                let href = element.value().attr("href").unwrap_or("").trim();
                if text.is_empty() {
                    return;
                }
                if href.is_empty() || href.starts_with('#') || href.starts_with("javascript:") {
                    self.push_text(&text);
                } else {
                    self.push_inline(&format!("[{text}]({href})"));
                }
            }
            "strong" | "b" => self.wrap_inline(element, "**"),
            "em" | "i" => self.wrap_inline(element, "*"),
            "code" => {
                let text = collapse_whitespace(&inline_text(element));
                if !text.is_empty() {
                    self.push_inline(&format!("`{text}`"));
                }
            }
            "pre" => {
                let raw = inline_text(element);
                self.block_break();
                self.out.push_str("```\n");
                self.out.push_str(raw.trim_matches('\n'));
                self.out.push_str("\n```");
                self.block_break();
            }
            "blockquote" => {
                self.block_break();
                self.out.push_str("> ");
                self.out
                    .push_str(&collapse_whitespace(&inline_text(element)));
                self.block_break();
            }
            "img" => {
                if let Some(alt) = element.value().attr("alt").map(str::trim)
                    && !alt.is_empty()
                {
                    self.push_text(alt);
                }
            }
            "td" | "th" => {
                self.walk(element);
                self.push_text(" ");
            }
            _ => self.walk(element),
        }
    }

    fn wrap_inline(&mut self, element: ElementRef<'_>, marker: &str) {
        let text = collapse_whitespace(&inline_text(element));
        if !text.is_empty() {
            self.push_inline(&format!("{marker}{text}{marker}"));
        }
    }

    fn push_inline(&mut self, fragment: &str) {
        if self.out.ends_with(|ch: char| ch.is_alphanumeric()) {
            self.out.push(' ');
        }
        self.out.push_str(fragment);
    }

    fn push_text(&mut self, text: &str) {
        let starts_with_space = text.starts_with(char::is_whitespace);
        let ends_with_space = text.ends_with(char::is_whitespace);
        let collapsed = collapse_whitespace(text);

        if collapsed.is_empty() {
            if !text.is_empty() && !self.at_boundary() {
                self.out.push(' ');
            }
            return;
        }
        if starts_with_space && !self.at_boundary() {
            self.out.push(' ');
        }
        self.out.push_str(&collapsed);
        if ends_with_space {
            self.out.push(' ');
        }
    }

    fn at_boundary(&self) -> bool {
        self.out.is_empty() || self.out.ends_with(char::is_whitespace)
    }

    fn line_break(&mut self) {
        self.trim_trailing_spaces();
        if !self.out.is_empty() && !self.out.ends_with('\n') {
            self.out.push('\n');
        }
    }

    fn block_break(&mut self) {
        self.trim_trailing_spaces();
        if self.out.is_empty() {
            return;
        }
        while !self.out.ends_with("\n\n") {
            self.out.push('\n');
        }
    }

    fn trim_trailing_spaces(&mut self) {
        let trimmed = self.out.trim_end_matches([' ', '\t']).len();
        self.out.truncate(trimmed);
    }

    fn finish(self) -> String {
        self.out
            .lines()
            .map(str::trim_end)
            .collect::<Vec<_>>()
            .join("\n")
            .trim()
            .to_string()
    }
}

fn inline_text(element: ElementRef<'_>) -> String {
    element.text().collect()
}

fn collapse_whitespace(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

//! Text substitution for prompt template bodies.
//!
//! Supported actions: `{{.Name}}`, `{{if .Name}}`, `{{else if .Name}}`, `{{else}}`, `{{end}}`,
//! `{{/* comment */}}`, and the `{{-` / `-}}` whitespace trim markers. A field that is missing from
//! the variables renders as an empty string and counts as false.

use anyhow::{Result, bail};
use std::collections::BTreeMap;

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token<'a> {
    Text(&'a str),
    Action { body: &'a str, offset: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Node {
    Text(String),
    Field(String),
    If {
        branches: Vec<(String, Vec<Node>)>,
        otherwise: Vec<Node>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Terminator {
    End,
    Else,
    ElseIf(String),
    Eof,
}

/// A parsed template body, ready to execute against any variable map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    nodes: Vec<Node>,
}

impl Template {
    pub fn parse(source: &str) -> Result<Self> {
        let tokens = tokenize(source)?;
        let mut pos = 0;
        let (nodes, terminator) = parse_block(&tokens, &mut pos)?;
        match terminator {
            Terminator::Eof => Ok(Self { nodes }),
            Terminator::End => bail!("template syntax error: unexpected {{{{end}}}}"),
            Terminator::Else | Terminator::ElseIf(_) => {
                bail!("template syntax error: unexpected {{{{else}}}}")
            }
        }
    }

    pub fn execute(&self, vars: &BTreeMap<String, String>) -> String {
        let mut out = String::new();
        render_nodes(&self.nodes, vars, &mut out);
        out
    }
}

fn tokenize(source: &str) -> Result<Vec<Token<'_>>> {
    let mut tokens = Vec::new();
    let mut rest = source;
    let mut consumed = 0;
    let mut trim_next_text = false;

    while let Some(start) = rest.find(OPEN) {
        let text = &rest[..start];
        let after_open = &rest[start + OPEN.len()..];
        let Some(end) = after_open.find(CLOSE) else {
            bail!(
                "template syntax error at offset {}: unclosed action",
                consumed + start
            );
        };
        let raw_body = &after_open[..end];

        let trim_left = raw_body.starts_with('-')
            && raw_body[1..].starts_with(|ch: char| ch.is_whitespace());
        let trim_right = raw_body.ends_with('-')
            && raw_body[..raw_body.len() - 1].ends_with(|ch: char| ch.is_whitespace());
        let mut body = raw_body;
        if trim_left {
            body = &body[1..];
        }
        if trim_right {
            body = &body[..body.len() - 1];
        }

        let mut text = if trim_next_text { text.trim_start() } else { text };
        if trim_left {
            text = text.trim_end();
        }
        if !text.is_empty() {
            tokens.push(Token::Text(text));
        }
        tokens.push(Token::Action {
            body: body.trim(),
            offset: consumed + start,
        });

        trim_next_text = trim_right;
        let advance = start + OPEN.len() + end + CLOSE.len();
        consumed += advance;
        rest = &rest[advance..];
    }

    let tail = if trim_next_text { rest.trim_start() } else { rest };
    if !tail.is_empty() {
        tokens.push(Token::Text(tail));
    }
    Ok(tokens)
}

fn parse_field(expr: &str, offset: usize) -> Result<String> {
    let expr = expr.trim();
    let Some(name) = expr.strip_prefix('.') else {
        bail!(
            "template syntax error at offset {}: expected a field like .Name, found '{}'",
            offset,
            expr
        );
    };
    if name.is_empty() || !name.chars().all(|ch| ch.is_ascii_alphanumeric() || ch == '_') {
        bail!(
            "template syntax error at offset {}: invalid field name '{}'",
            offset,
            expr
        );
    }
    Ok(name.to_string())
}

fn parse_block(tokens: &[Token<'_>], pos: &mut usize) -> Result<(Vec<Node>, Terminator)> {
    let mut nodes = Vec::new();

    while let Some(token) = tokens.get(*pos) {
        *pos += 1;
        let (body, offset) = match token {
            Token::Text(text) => {
                nodes.push(Node::Text((*text).to_string()));
                continue;
            }
            Token::Action { body, offset } => (*body, *offset),
        };

        if body.starts_with("/*") && body.ends_with("*/") {
            continue;
        }
        if body == "end" {
            return Ok((nodes, Terminator::End));
        }
        if body == "else" {
            return Ok((nodes, Terminator::Else));
        }
        if let Some(cond) = body.strip_prefix("else if ") {
            return Ok((nodes, Terminator::ElseIf(parse_field(cond, offset)?)));
        }
        if let Some(cond) = body.strip_prefix("if ") {
            nodes.push(parse_if(tokens, pos, parse_field(cond, offset)?, offset)?);
            continue;
        }
        if body.starts_with('.') {
            nodes.push(Node::Field(parse_field(body, offset)?));
            continue;
        }
        bail!(
            "template syntax error at offset {}: unsupported action '{}'",
            offset,
            body
        );
    }

    Ok((nodes, Terminator::Eof))
}

fn parse_if(tokens: &[Token<'_>], pos: &mut usize, first: String, offset: usize) -> Result<Node> {
    let mut branches = Vec::new();
    let mut cond = first;

    loop {
        let (body, terminator) = parse_block(tokens, pos)?;
        branches.push((cond, body));
        match terminator {
            Terminator::End => {
                return Ok(Node::If {
                    branches,
                    otherwise: Vec::new(),
                });
            }
            Terminator::ElseIf(next) => cond = next,
            Terminator::Else => {
                let (otherwise, terminator) = parse_block(tokens, pos)?;
                if terminator != Terminator::End {
                    bail!(
                        "template syntax error at offset {}: {{{{if}}}} is missing its {{{{end}}}}",
                        offset
                    );
                }
                return Ok(Node::If {
                    branches,
                    otherwise,
                });
            }
            Terminator::Eof => bail!(
                "template syntax error at offset {}: {{{{if}}}} is missing its {{{{end}}}}",
                offset
            ),
        }
    }
}

fn is_truthy(vars: &BTreeMap<String, String>, name: &str) -> bool {
    vars.get(name).is_some_and(|value| !value.is_empty())
}

fn render_nodes(nodes: &[Node], vars: &BTreeMap<String, String>, out: &mut String) {
    for node in nodes {
        match node {
            Node::Text(text) => out.push_str(text),
            Node::Field(name) => {
                if let Some(value) = vars.get(name) {
                    out.push_str(value);
                }
            }
            Node::If {
                branches,
                otherwise,
            } => {
                let chosen = branches
                    .iter()
                    .find(|(cond, _)| is_truthy(vars, cond))
                    .map(|(_, body)| body)
                    .unwrap_or(otherwise);
                render_nodes(chosen, vars, out);
            }
        }
    }
}

use anyhow::{Context, Result, anyhow, bail};
use regex::Regex;
use reqwest::Client;
use reqwest::header::CONTENT_TYPE;
use serde::Deserialize;
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

use super::VariableMap;
use super::render::Template;
use crate::config::DEFAULT_REQUEST_TIMEOUT_SECS;
use crate::http::errors::describe_request_error;
use crate::markup::html_to_text;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariableKind {
    Text,
    File,
    Url,
}

impl VariableKind {
    /// Unknown kinds are treated as plain text.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "file" => Self::File,
            "url" => Self::Url,
            _ => Self::Text,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TemplateVariable {
    pub name: String,
    pub vtype: String,
    pub otype: String,
    pub default: String,
    pub validation: String,
}

impl TemplateVariable {
    pub fn kind(&self) -> VariableKind {
        VariableKind::parse(&self.vtype)
    }

    fn validate(&self, value: &str) -> Result<()> {
        let pattern = self.validation.trim();
        if pattern.is_empty() {
            return Ok(());
        }
        let regex = Regex::new(pattern).with_context(|| {
            format!("Invalid validation pattern for variable '{}'", self.name)
        })?;
        if !regex.is_match(value) {
            bail!(
                "Value '{}' for variable '{}' does not match validation pattern '{}'",
                value,
                self.name,
                pattern
            );
        }
        Ok(())
    }
}

/// A reusable prompt definition loaded from YAML.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PromptTemplate {
    pub id: String,
    pub name: String,
    pub description: String,
    pub author: String,
    pub default_engine: String,
    pub default_model: String,
    pub variables: Vec<TemplateVariable>,
    pub template: String,
}

impl PromptTemplate {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read prompt template '{}'", path.display()))?;
        Self::from_yaml_str(&raw)
            .with_context(|| format!("Failed to load prompt template '{}'", path.display()))
    }

    pub fn from_yaml_str(raw: &str) -> Result<Self> {
        let template: Self =
            serde_yaml::from_str(raw).context("Failed to parse prompt template YAML")?;

        let mut seen = BTreeSet::new();
        for variable in &template.variables {
            let name = variable.name.trim();
            if name.is_empty() {
                bail!("Prompt template declares a variable without a name");
            }
            if !seen.insert(name) {
                bail!("Prompt template declares variable '{}' more than once", name);
            }
        }
        Ok(template)
    }

    pub fn default_engine(&self) -> Option<&str> {
        non_empty(&self.default_engine)
    }

    pub fn default_model(&self) -> Option<&str> {
        non_empty(&self.default_model)
    }

    pub fn default_vars(&self) -> VariableMap {
        self.variables
            .iter()
            .map(|variable| (variable.name.trim().to_string(), variable.default.clone()))
            .collect()
    }

    /// Defaults overlaid with `overrides`. Declared validation patterns apply to overrides that differ
    /// from the variable's default.
    pub fn merge_overrides(&self, overrides: &VariableMap) -> Result<VariableMap> {
        let mut vars = self.default_vars();
        for (key, value) in overrides {
            if let Some(variable) = self.variable(key)
                && *value != variable.default
            {
                variable.validate(value)?;
            }
            vars.insert(key.clone(), value.clone());
        }
        Ok(vars)
    }

    /// Replaces file and URL variables with their content. A failed read or fetch keeps the current value.
    pub async fn hydrate(&self, client: &Client, vars: &mut VariableMap) {
        for variable in &self.variables {
            let name = variable.name.trim();
            let Some(current) = vars.get(name).cloned() else {
                continue;
            };

            let content = match variable.kind() {
                VariableKind::Text => None,
                VariableKind::File => read_file_variable(name, &current),
                VariableKind::Url => fetch_url_variable(client, name, &current).await,
            };
            if let Some(content) = content {
                vars.insert(name.to_string(), content);
            }
        }
    }

    pub async fn render(&self, client: &Client, overrides: &VariableMap) -> Result<String> {
        let body = Template::parse(&self.template)
            .with_context(|| format!("Failed to parse prompt template '{}'", self.label()))?;
        let mut vars = self.merge_overrides(overrides)?;
        self.hydrate(client, &mut vars).await;
        info!(
            template = %self.label(),
            variable_count = vars.len(),
            "rendering prompt template"
        );
        Ok(body.execute(&vars))
    }

    fn variable(&self, name: &str) -> Option<&TemplateVariable> {
        self.variables
            .iter()
            .find(|variable| variable.name.trim() == name)
    }

    fn label(&self) -> &str {
        non_empty(&self.id)
            .or_else(|| non_empty(&self.name))
            .unwrap_or("<unnamed>")
    }
}

fn non_empty(value: &str) -> Option<&str> {
    let value = value.trim();
    (!value.is_empty()).then_some(value)
}

fn read_file_variable(name: &str, value: &str) -> Option<String> {
    let path = Path::new(value);
    if value.is_empty() || !path.exists() {
        debug!(variable = %name, path = %value, "file variable path does not exist, keeping value");
        return None;
    }
    match fs::read_to_string(path) {
        Ok(content) => {
            debug!(variable = %name, path = %value, content_len = content.len(), "loaded file variable");
            Some(content)
        }
        Err(err) => {
            warn!(variable = %name, path = %value, error = %err, "failed to read file variable, keeping value");
            None
        }
    }
}

async fn fetch_url_variable(client: &Client, name: &str, url: &str) -> Option<String> {
    if url.trim().is_empty() {
        return None;
    }
    match fetch_url(client, url.trim()).await {
        Ok(content) => {
            debug!(variable = %name, url = %url, content_len = content.len(), "loaded url variable");
            Some(content)
        }
        Err(err) => {
            let error = format!("{err:#}");
            warn!(variable = %name, url = %url, error = %error, "failed to fetch url variable, keeping value");
            None
        }
    }
}

async fn fetch_url(client: &Client, url: &str) -> Result<String> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|err| anyhow!(describe_request_error(&err, url, DEFAULT_REQUEST_TIMEOUT_SECS)))?;

    let status = response.status();
    if !status.is_success() {
        bail!("GET '{}' returned status {}", url, status);
    }

    let is_html = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.to_ascii_lowercase().contains("text/html"));
    let body = response
        .text()
        .await
        .with_context(|| format!("Failed to read response body from '{}'", url))?;

    Ok(if is_html { html_to_text(&body) } else { body })
}

#[cfg(test)]
mod tests {
    use std::fs;

    use reqwest::Client;

    use super::{PromptTemplate, VariableKind};
    use crate::prompt::VariableMap;
    use crate::test_support::{StubResponse, StubServer, unused_local_url};

    const SUMMARY: &str = r#"
id: summarize
name: Summarizer
description: Summarize some content
author: tests
default_engine: claude
variables:
  - name: content
    vtype: string
    default: ""
  - name: file_content
    vtype: File
    default: ""
  - name: url_content
    vtype: url
    default: ""
template: |
  Summarize:
  {{if .content}}{{.content}}{{end}}{{if .file_content}}{{.file_content}}{{end}}{{if .url_content}}{{.url_content}}{{end}}
"#;

    fn vars(pairs: &[(&str, &str)]) -> VariableMap {
        pairs
            .iter()
            .map(|(key, value)| ((*key).to_string(), (*value).to_string()))
            .collect()
    }

    fn template(yaml: &str) -> PromptTemplate {
        PromptTemplate::from_yaml_str(yaml).expect("template should parse")
    }

    #[test]
    fn variable_kinds_are_case_insensitive() {
        assert_eq!(VariableKind::parse("FILE"), VariableKind::File);
        assert_eq!(VariableKind::parse(" Url "), VariableKind::Url);
        assert_eq!(VariableKind::parse("string"), VariableKind::Text);
        assert_eq!(VariableKind::parse("markdown"), VariableKind::Text);
    }

    #[test]
    fn loads_metadata_and_defaults() {
        let template = template(SUMMARY);
        assert_eq!(template.id, "summarize");
        assert_eq!(template.default_engine(), Some("claude"));
        assert_eq!(template.default_model(), None);
        assert_eq!(
            template.default_vars(),
            vars(&[("content", ""), ("file_content", ""), ("url_content", "")])
        );
    }

    #[test]
    fn rejects_duplicate_or_unnamed_variables() {
        let err = PromptTemplate::from_yaml_str(
            "variables: [{name: a}, {name: a}]\ntemplate: x",
        )
        .expect_err("duplicates should be rejected");
        assert!(err.to_string().contains("more than once"), "unexpected: {err}");

        let err = PromptTemplate::from_yaml_str("variables: [{default: x}]\ntemplate: x")
            .expect_err("unnamed variables should be rejected");
        assert!(err.to_string().contains("without a name"), "unexpected: {err}");
    }

    #[test]
    fn malformed_yaml_is_an_error() {
        assert!(PromptTemplate::from_yaml_str("variables: [unclosed").is_err());
    }

    #[test]
    fn overrides_win_and_extra_keys_are_kept() {
        let merged = template(SUMMARY)
            .merge_overrides(&vars(&[("content", "hello"), ("extra", "world")]))
            .expect("merge should work");
        assert_eq!(merged["content"], "hello");
        assert_eq!(merged["extra"], "world");
        assert_eq!(merged["url_content"], "");
    }

    #[test]
    fn validation_applies_to_overrides_only() {
        let template = template(
            "variables: [{name: lang, default: 'not checked', validation: '^[a-z]{2}$'}]\ntemplate: '{{.lang}}'",
        );
        assert!(template.merge_overrides(&VariableMap::new()).is_ok());
        assert!(template.merge_overrides(&vars(&[("lang", "en")])).is_ok());

        let err = template
            .merge_overrides(&vars(&[("lang", "english")]))
            .expect_err("override should be validated");
        assert!(
            err.to_string().contains("does not match validation pattern"),
            "unexpected: {err}"
        );
    }

    #[test]
    fn invalid_validation_pattern_is_reported() {
        let template = template("variables: [{name: a, validation: '(['}]\ntemplate: x");
        let err = template
            .merge_overrides(&vars(&[("a", "x")]))
            .expect_err("bad pattern should fail");
        assert!(
            err.to_string().contains("Invalid validation pattern"),
            "unexpected: {err}"
        );
    }

    #[tokio::test]
    async fn render_with_overrides_from_payload() {
        let out = template(SUMMARY)
            .render(&Client::new(), &vars(&[("content", "hello"), ("extra", "world")]))
            .await
            .expect("render should work");
        assert_eq!(out, "Summarize:\nhello\n");
    }

    #[tokio::test]
    async fn rendering_defaults_matches_rendering_identical_overrides() {
        let template = template(
            "variables: [{name: who, default: world}, {name: mood, default: ''}]\ntemplate: 'hi {{.who}}{{if .mood}} ({{.mood}}){{end}}'",
        );
        let client = Client::new();

        let plain = template
            .render(&client, &VariableMap::new())
            .await
            .expect("render should work");
        let echoed = template
            .render(&client, &template.default_vars())
            .await
            .expect("render should work");

        assert_eq!(plain, "hi world");
        assert_eq!(plain, echoed);
    }

    #[tokio::test]
    async fn echoing_defaults_skips_validation_of_unchanged_values() {
        let template = template(
            "variables: [{name: content, default: '', validation: '^.+$'}]\ntemplate: 'x{{.content}}'",
        );
        let client = Client::new();

        let plain = template
            .render(&client, &VariableMap::new())
            .await
            .expect("render should work");
        let echoed = template
            .render(&client, &template.default_vars())
            .await
            .expect("echoed defaults should pass");

        assert_eq!(plain, "x");
        assert_eq!(plain, echoed);
        assert!(template.merge_overrides(&vars(&[("content", "filled")])).is_ok());
    }

    #[tokio::test]
    async fn file_variable_is_replaced_by_content() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("notes.txt");
        fs::write(&path, "from disk").expect("write fixture");

        let out = template(SUMMARY)
            .render(
                &Client::new(),
                &vars(&[("file_content", path.to_str().expect("utf-8 path"))]),
            )
            .await
            .expect("render should work");

        assert_eq!(out, "Summarize:\nfrom disk\n");
    }

    #[tokio::test]
    async fn missing_file_keeps_value() {
        let template = template(SUMMARY);
        let mut hydrated = template
            .merge_overrides(&vars(&[("file_content", "/no/such/file.txt")]))
            .expect("merge should work");
        template.hydrate(&Client::new(), &mut hydrated).await;
        assert_eq!(hydrated["file_content"], "/no/such/file.txt");
    }

    #[tokio::test]
    async fn refused_url_keeps_value_and_render_succeeds() {
        let url = unused_local_url("/page");
        let out = template(SUMMARY)
            .render(&Client::new(), &vars(&[("url_content", url.as_str())]))
            .await
            .expect("render should still work");
        assert_eq!(out, format!("Summarize:\n{url}\n"));
    }

    #[tokio::test]
    async fn non_success_url_keeps_value() {
        let server = StubServer::start(vec![StubResponse::status(404, "missing")]);
        let template = template(SUMMARY);
        let mut hydrated = template
            .merge_overrides(&vars(&[("url_content", server.url("/gone").as_str())]))
            .expect("merge should work");

        template.hydrate(&Client::new(), &mut hydrated).await;

        assert_eq!(hydrated["url_content"], server.url("/gone"));
        assert_eq!(server.hits(), 1);
    }

    #[tokio::test]
    async fn html_url_is_converted_to_text() {
        let server = StubServer::start(vec![StubResponse::html(
            "<html><body><h2>News</h2><p>Rust <em>ships</em> again.</p><script>x()</script></body></html>",
        )]);

        let out = template(SUMMARY)
            .render(
                &Client::new(),
                &vars(&[("url_content", server.url("/news").as_str())]),
            )
            .await
            .expect("render should work");

        assert_eq!(out, "Summarize:\nNews\n\nRust ships again.\n");
        let request = &server.requests()[0];
        assert_eq!(request.method, "GET");
        assert_eq!(request.path, "/news");
    }

    #[tokio::test]
    async fn non_html_url_body_is_kept_raw() {
        let server = StubServer::start(vec![StubResponse::text("**raw** text")]);
        let template = template(SUMMARY);
        let mut hydrated = template
            .merge_overrides(&vars(&[("url_content", server.url("/raw").as_str())]))
            .expect("merge should work");

        template.hydrate(&Client::new(), &mut hydrated).await;

        assert_eq!(hydrated["url_content"], "**raw** text");
    }

    #[tokio::test]
    async fn template_syntax_errors_abort_rendering() {
        let template = template("template: '{{if .a}}never closed'");
        let err = template
            .render(&Client::new(), &VariableMap::new())
            .await
            .expect_err("render should fail");
        assert!(
            format!("{err:#}").contains("template syntax error"),
            "unexpected: {err:#}"
        );
    }
}

//! Prompt resolution: filling a parsed [`Template`] from a [`ParameterSet`].
//!
//! Resolution only accepts a `Template`. Generated scripts are never
//! templates, so there is no way to run substitution over backend output.

use std::collections::BTreeMap;
use std::fmt;

use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::template::{Segment, Template, residual_placeholders};

/// Named values for one pipeline run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParameterSet {
    values: BTreeMap<String, String>,
}

impl ParameterSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ParameterSet {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = ParameterSet::new();
        for (k, v) in iter {
            params.insert(k, v);
        }
        params
    }
}

/// Placeholder-looking text left in a prompt after substitution.
///
/// Parameter values are free text, so this is a warning, never an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionAnomaly {
    pub key: String,
    pub residual: String,
}

impl fmt::Display for ResolutionAnomaly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "resolved prompt '{}' still contains {{{}}}",
            self.key, self.residual
        )
    }
}

/// A template with every placeholder substituted. Only [`resolve`] builds one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPrompt {
    key: String,
    text: String,
    anomalies: Vec<ResolutionAnomaly>,
}

impl ResolvedPrompt {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn anomalies(&self) -> &[ResolutionAnomaly] {
        &self.anomalies
    }
}

impl fmt::Display for ResolvedPrompt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Substitutes every placeholder of `template` from `params`.
///
/// All placeholders are checked before any text is produced; the first one
/// (in template order) without a value is reported as `MissingParameter`.
/// Parameters the template does not reference are ignored.
pub fn resolve(template: &Template, params: &ParameterSet) -> Result<ResolvedPrompt> {
    for segment in template.segments() {
        if let Segment::Placeholder(name) = segment {
            if params.get(name).is_none() {
                return Err(Error::MissingParameter {
                    key: template.key().to_string(),
                    name: name.clone(),
                });
            }
        }
    }

    let mut text = String::with_capacity(template.source().len());
    for segment in template.segments() {
        match segment {
            Segment::Literal(s) => text.push_str(s),
            Segment::Placeholder(name) => text.push_str(params.get(name).unwrap_or_default()),
        }
    }

    let anomalies: Vec<ResolutionAnomaly> = residual_placeholders(&text)
        .into_iter()
        .map(|residual| ResolutionAnomaly {
            key: template.key().to_string(),
            residual,
        })
        .collect();
    for anomaly in &anomalies {
        warn!("{}", anomaly);
    }
    debug!(
        "Resolved '{}' ({} chars, {} anomalies)",
        template.key(),
        text.len(),
        anomalies.len()
    );

    Ok(ResolvedPrompt {
        key: template.key().to_string(),
        text,
        anomalies,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn short() -> Template {
        Template::parse(
            "short_prompt",
            "Write a YouTube script about {title}. It must last {time} seconds.",
        )
        .unwrap()
    }

    #[test]
    fn test_should_substitute_every_placeholder() {
        let params = ParameterSet::new().with("title", "cooking").with("time", "40");
        let prompt = resolve(&short(), &params).unwrap();
        assert_eq!(
            prompt.as_str(),
            "Write a YouTube script about cooking. It must last 40 seconds."
        );
        assert_eq!(prompt.key(), "short_prompt");
        assert!(prompt.anomalies().is_empty());
    }

    #[test]
    fn test_should_name_the_missing_parameter() {
        let params = ParameterSet::new().with("title", "cooking").with("unused", "x");
        let err = resolve(&short(), &params).unwrap_err();
        match err {
            Error::MissingParameter { key, name } => {
                assert_eq!(key, "short_prompt");
                assert_eq!(name, "time");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_should_flag_placeholder_syntax_coming_from_values() {
        let params = ParameterSet::new().with("title", "{time} travel").with("time", "30");
        let prompt = resolve(&short(), &params).unwrap();
        assert!(prompt.as_str().contains("{time} travel"));
        assert_eq!(prompt.anomalies().len(), 1);
        assert_eq!(prompt.anomalies()[0].residual, "time");
    }

    #[test]
    fn test_should_keep_literal_braces_from_escapes() {
        let t = Template::parse("k", "{{not_a_param}} {x}").unwrap();
        let prompt = resolve(&t, &ParameterSet::new().with("x", "1")).unwrap();
        assert_eq!(prompt.as_str(), "{not_a_param} 1");
        assert_eq!(prompt.anomalies().len(), 1);
    }

    #[test]
    fn test_should_resolve_template_without_placeholders() {
        let t = Template::parse("k", "plain text").unwrap();
        let prompt = resolve(&t, &ParameterSet::new()).unwrap();
        assert_eq!(prompt.to_string(), "plain text");
    }

    #[test]
    fn test_should_collect_parameters_from_pairs() {
        let params: ParameterSet = [("title", "a"), ("time", "1")].into_iter().collect();
        assert_eq!(params.len(), 2);
        assert_eq!(params.get("time"), Some("1"));
    }
}

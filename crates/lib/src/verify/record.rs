//! Configuration record parsing.
//!
//! The interpreter build emits a record of which feature macros its configure
//! step detected. Three layouts are understood:
//!
//! - `header`: a generated C header (`pyconfig.h` style). `#define NAME value`
//!   marks NAME present unless the value is `0`; `/* #undef NAME */` marks it
//!   absent.
//! - `json`: a flat object. `true`, non-zero numbers and non-empty strings
//!   other than `"0"` are present.
//! - `env`: `NAME=value` lines with the same value rule as JSON strings.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordFormat {
  #[default]
  Header,
  Json,
  Env,
}

impl std::str::FromStr for RecordFormat {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "header" => Ok(RecordFormat::Header),
      "json" => Ok(RecordFormat::Json),
      "env" => Ok(RecordFormat::Env),
      other => Err(format!("unknown record format: {} (expected header, json or env)", other)),
    }
  }
}

#[derive(Debug, Error)]
pub enum RecordError {
  #[error("failed to read configuration record {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to parse configuration record {path}: {source}")]
  Json {
    path: PathBuf,
    #[source]
    source: serde_json::Error,
  },

  #[error("configuration record {path} is not a JSON object")]
  NotAnObject { path: PathBuf },
}

/// Marker name -> present/absent, as read from a configuration record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigRecord {
  markers: BTreeMap<String, bool>,
}

impl ConfigRecord {
  pub fn load(path: &Path, format: RecordFormat) -> Result<Self, RecordError> {
    let content = std::fs::read_to_string(path).map_err(|source| RecordError::Read {
      path: path.to_path_buf(),
      source,
    })?;
    Self::parse(&content, format, path)
  }

  /// Parse record content. `origin` is only used in error messages.
  pub fn parse(content: &str, format: RecordFormat, origin: &Path) -> Result<Self, RecordError> {
    let markers = match format {
      RecordFormat::Header => parse_header(content),
      RecordFormat::Env => parse_env(content),
      RecordFormat::Json => parse_json(content, origin)?,
    };
    Ok(Self { markers })
  }

  /// Whether the marker is defined and enabled.
  pub fn has(&self, marker: &str) -> bool {
    self.markers.get(marker).copied().unwrap_or(false)
  }

  /// Whether the record mentions the marker at all, enabled or not.
  pub fn mentions(&self, marker: &str) -> bool {
    self.markers.contains_key(marker)
  }

  pub fn len(&self) -> usize {
    self.markers.len()
  }

  pub fn is_empty(&self) -> bool {
    self.markers.is_empty()
  }
}

impl FromIterator<(String, bool)> for ConfigRecord {
  fn from_iter<I: IntoIterator<Item = (String, bool)>>(iter: I) -> Self {
    Self {
      markers: iter.into_iter().collect(),
    }
  }
}

fn value_enabled(value: &str) -> bool {
  let value = value.trim().trim_matches('"');
  !value.is_empty() && value != "0"
}

/// Remove `/* ... */` and `//` comments from one line. An unterminated block
/// comment runs to the end of the line.
fn strip_comments(line: &str) -> String {
  let mut out = String::with_capacity(line.len());
  let mut rest = line;

  loop {
    let block = rest.find("/*");
    let trailing = rest.find("//");
    match (block, trailing) {
      (Some(b), t) if t.is_none_or(|t| b < t) => {
        out.push_str(&rest[..b]);
        match rest[b + 2..].find("*/") {
          Some(close) => {
            out.push(' ');
            rest = &rest[b + 2 + close + 2..];
          }
          None => return out,
        }
      }
      (_, Some(t)) => {
        out.push_str(&rest[..t]);
        return out;
      }
      _ => {
        out.push_str(rest);
        return out;
      }
    }
  }
}

/// The text after a `#keyword` directive. Whitespace is allowed between `#`
/// and the keyword, as autoconf emits it in nested conditionals.
fn directive<'a>(line: &'a str, keyword: &str) -> Option<&'a str> {
  let rest = line.strip_prefix('#')?.trim_start().strip_prefix(keyword)?;
  (rest.is_empty() || rest.starts_with(char::is_whitespace)).then_some(rest)
}

fn parse_header(content: &str) -> BTreeMap<String, bool> {
  let mut markers = BTreeMap::new();

  for raw in content.lines() {
    let raw = raw.trim();

    // configure leaves undetected features as `/* #undef NAME */`
    if let Some(inner) = raw.strip_prefix("/*")
      && let Some(rest) = directive(inner.trim_start(), "undef")
    {
      if let Some(name) = rest.split_whitespace().next() {
        markers.entry(name.to_string()).or_insert(false);
      }
      continue;
    }

    let line = strip_comments(raw);
    let line = line.trim();

    if let Some(rest) = directive(line, "define") {
      let mut parts = rest.split_whitespace();
      let Some(name) = parts.next() else { continue };
      // function-like macros are not feature markers
      if name.contains('(') {
        continue;
      }
      let value: Vec<&str> = parts.collect();
      let enabled = value.is_empty() || value_enabled(&value.join(" "));
      markers.insert(name.to_string(), enabled);
    } else if let Some(rest) = directive(line, "undef")
      && let Some(name) = rest.split_whitespace().next()
    {
      markers.insert(name.to_string(), false);
    }
  }

  markers
}

fn parse_env(content: &str) -> BTreeMap<String, bool> {
  content
    .lines()
    .map(str::trim)
    .filter(|line| !line.is_empty() && !line.starts_with('#'))
    .filter_map(|line| line.split_once('='))
    .map(|(key, value)| (key.trim().to_string(), value_enabled(value)))
    .collect()
}

fn parse_json(content: &str, origin: &Path) -> Result<BTreeMap<String, bool>, RecordError> {
  let value: serde_json::Value = serde_json::from_str(content).map_err(|source| RecordError::Json {
    path: origin.to_path_buf(),
    source,
  })?;

  let serde_json::Value::Object(map) = value else {
    return Err(RecordError::NotAnObject {
      path: origin.to_path_buf(),
    });
  };

  Ok(
    map
      .into_iter()
      .map(|(key, value)| {
        let enabled = match value {
          serde_json::Value::Bool(b) => b,
          serde_json::Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
          serde_json::Value::String(s) => value_enabled(&s),
          serde_json::Value::Null => false,
          serde_json::Value::Array(_) | serde_json::Value::Object(_) => true,
        };
        (key, enabled)
      })
      .collect(),
  )
}

//! Config-file rendering.
//!
//! Two flavours: text templates with `{{ key }}` placeholders, and
//! structured JSON documents patched by deep-merging new data over a base
//! file. Both write the result next to where deployment needs it and return
//! it for inspection.

use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{DeployError, Result};

/// File-name prefix marking a text template.
const TEMPLATE_PREFIX: &str = "template_";

/// Render a text template to `target_path`.
///
/// With no explicit target, the template file name must carry the
/// `template_` prefix exactly once and the output drops it, landing next to
/// the template (`template_nginx.conf` renders to `nginx.conf`).
///
/// A `warning` key marking the output as autogenerated is injected unless
/// the context already provides one. Unknown placeholders are an error.
pub fn render_template(
    tmpl_path: &Path,
    context: &Map<String, Value>,
    target_path: Option<&Path>,
) -> Result<String> {
    let file_name = tmpl_path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| DeployError::Template(format!("`{}` has no file name", tmpl_path.display())))?
        .to_string();

    let target: PathBuf = match target_path {
        Some(path) => path.to_path_buf(),
        None => {
            let valid = file_name.starts_with(TEMPLATE_PREFIX)
                && file_name.matches(TEMPLATE_PREFIX).count() == 1
                && file_name.len() > TEMPLATE_PREFIX.len();
            if !valid {
                return Err(DeployError::Template(format!(
                    "cannot derive an output name from `{file_name}`: \
                     expected a single `{TEMPLATE_PREFIX}` prefix"
                )));
            }
            let parent = tmpl_path.parent().unwrap_or_else(|| Path::new(""));
            parent.join(file_name.replacen(TEMPLATE_PREFIX, "", 1))
        }
    };

    let source = std::fs::read_to_string(tmpl_path)?;

    let mut context = context.clone();
    context.entry("warning").or_insert_with(|| {
        Value::String(format!(
            "This file was autogenerated from the template: {file_name}"
        ))
    });

    let rendered = render_str(&source, &context)?;
    std::fs::write(&target, &rendered)?;
    debug!(template = %tmpl_path.display(), target = %target.display(), "template rendered");
    Ok(rendered)
}

/// Substitute `{{ key }}` placeholders from the context into `source`.
pub fn render_str(source: &str, context: &Map<String, Value>) -> Result<String> {
    let mut out = String::with_capacity(source.len());
    let mut rest = source;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after
            .find("}}")
            .ok_or_else(|| DeployError::Template("unclosed `{{` placeholder".to_string()))?;
        let key = after[..end].trim();
        let value = context
            .get(key)
            .ok_or_else(|| DeployError::Template(format!("no value for placeholder `{key}`")))?;
        out.push_str(&value_text(value));
        rest = &after[end + 2..];
    }
    out.push_str(rest);
    Ok(out)
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Patch a JSON document: load `data_path`, deep-merge `new_data` over it
/// and write the merged document to `target_path` as pretty JSON.
///
/// Objects merge recursively; scalars and arrays in `new_data` replace.
pub fn render_json_template(
    data_path: &Path,
    new_data: &Value,
    target_path: &Path,
) -> Result<Value> {
    let base: Value = serde_json::from_str(&std::fs::read_to_string(data_path)?)?;
    let merged = deep_merge(base, new_data.clone());
    std::fs::write(target_path, serde_json::to_string_pretty(&merged)?)?;
    debug!(data = %data_path.display(), target = %target_path.display(), "json rendered");
    Ok(merged)
}

fn deep_merge(base: Value, new: Value) -> Value {
    match (base, new) {
        (Value::Object(mut base_map), Value::Object(new_map)) => {
            for (key, new_value) in new_map {
                let merged = match base_map.remove(&key) {
                    Some(old) => deep_merge(old, new_value),
                    None => new_value,
                };
                base_map.insert(key, merged);
            }
            Value::Object(base_map)
        }
        (_, new) => new,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn context(pairs: &[(&str, Value)]) -> Map<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn render_str_substitutes_strings_and_numbers() {
        let ctx = context(&[("name", json!("site")), ("port", json!(8080))]);
        let out = render_str("server {{ name }} listens on {{ port }}", &ctx).unwrap();
        assert_eq!(out, "server site listens on 8080");
    }

    #[test]
    fn render_str_rejects_unknown_placeholder() {
        let ctx = context(&[]);
        let err = render_str("hello {{ missing }}", &ctx).unwrap_err();
        assert!(err.to_string().contains("missing"));
    }

    #[test]
    fn render_str_rejects_unclosed_placeholder() {
        let ctx = context(&[]);
        assert!(render_str("broken {{ tail", &ctx).is_err());
    }

    #[test]
    fn render_template_derives_target_from_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let tmpl = dir.path().join("template_site.conf");
        std::fs::write(&tmpl, "name = {{ app }}\n# {{ warning }}\n").unwrap();

        let ctx = context(&[("app", json!("blog"))]);
        let rendered = render_template(&tmpl, &ctx, None).unwrap();

        let target = dir.path().join("site.conf");
        assert!(target.is_file());
        assert!(rendered.contains("name = blog"));
        // the injected warning names the template it came from
        assert!(rendered.contains("autogenerated"));
        assert!(rendered.contains("template_site.conf"));
        assert_eq!(std::fs::read_to_string(target).unwrap(), rendered);
    }

    #[test]
    fn render_template_honours_explicit_target() {
        let dir = tempfile::tempdir().unwrap();
        let tmpl = dir.path().join("template_site.conf");
        std::fs::write(&tmpl, "app={{ app }}").unwrap();
        let target = dir.path().join("elsewhere.conf");

        render_template(&tmpl, &context(&[("app", json!("blog"))]), Some(&target)).unwrap();
        assert!(target.is_file());
    }

    #[test]
    fn render_template_without_prefix_needs_explicit_target() {
        let dir = tempfile::tempdir().unwrap();
        let tmpl = dir.path().join("site.conf");
        std::fs::write(&tmpl, "app={{ app }}").unwrap();

        let err = render_template(&tmpl, &context(&[("app", json!("blog"))]), None).unwrap_err();
        assert!(err.to_string().contains("template_"));
    }

    #[test]
    fn render_template_keeps_caller_warning() {
        let dir = tempfile::tempdir().unwrap();
        let tmpl = dir.path().join("template_site.conf");
        std::fs::write(&tmpl, "{{ warning }}").unwrap();

        let ctx = context(&[("warning", json!("custom note"))]);
        let rendered = render_template(&tmpl, &ctx, None).unwrap();
        assert_eq!(rendered, "custom note");
    }

    #[test]
    fn deep_merge_preserves_untouched_keys() {
        let base = json!({
            "key1": {"lore": "foo"},
            "key2": {"stable_key": "baz", "xyz": "old value"}
        });
        let new = json!({
            "key2": {"abc": 1234, "xyz": "new value"},
            "key3": 100
        });

        let merged = deep_merge(base, new);
        assert_eq!(merged["key1"]["lore"], "foo");
        assert_eq!(merged["key2"]["stable_key"], "baz");
        assert_eq!(merged["key2"]["xyz"], "new value");
        assert_eq!(merged["key2"]["abc"], 1234);
        assert_eq!(merged["key3"], 100);
    }

    #[test]
    fn render_json_template_writes_merged_document() {
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().join("fixtures.json");
        std::fs::write(
            &data,
            r#"{"key1": {"lore": "foo"}, "key2": {"stable_key": "baz"}}"#,
        )
        .unwrap();
        let target = dir.path().join("out.json");

        let merged = render_json_template(
            &data,
            &json!({"key2": {"abc": 1234}, "key3": 100}),
            &target,
        )
        .unwrap();

        let written: Value =
            serde_json::from_str(&std::fs::read_to_string(&target).unwrap()).unwrap();
        assert_eq!(written, merged);
        assert_eq!(written["key1"]["lore"], "foo");
        assert_eq!(written["key2"]["stable_key"], "baz");
        assert_eq!(written["key2"]["abc"], 1234);
        assert_eq!(written["key3"], 100);
    }
}

//! Name grammars for modules, models, fields, routes and service names.

use crate::core::error::ModsetError;
use regex::Regex;
use std::sync::LazyLock;

static MODULE_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9a-z/]{3,30}$").unwrap());
static MODEL_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z][0-9a-z_]{1,20}$").unwrap());
static ROUTE_PATH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9a-zA-Z_/\-:]{1,50}$").unwrap());
static ROUTE_PARAM_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z][0-9a-zA-Z_]{0,29}$").unwrap());
static SRV_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9a-z_\-]{1,30}$").unwrap());
static LANG_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z]{2}(-[0-9a-z]{2,4})?$").unwrap());

fn invalid(what: &str, value: &str) -> ModsetError {
    ModsetError::InvalidArgument(format!("invalid {} ({})", what, value))
}

/// Lexically cleans a slash-separated path: drops empty and `.` segments,
/// resolves `..` against preceding segments, strips leading/trailing `/`.
fn clean_path(raw: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for seg in raw.split('/') {
        match seg {
            "" | "." => {}
            ".." => {
                if segments.last().is_some_and(|s| *s != "..") {
                    segments.pop();
                } else {
                    segments.push("..");
                }
            }
            s => segments.push(s),
        }
    }
    segments.join("/")
}

/// Canonical module name: lower-cased, path-cleaned, `[0-9a-z/]{3,30}`.
pub fn module_name(name: &str) -> Result<String, ModsetError> {
    let canonical = clean_path(&name.trim().to_lowercase());
    if !MODULE_NAME.is_match(&canonical) {
        return Err(invalid("module name", &canonical));
    }
    Ok(canonical)
}

/// Canonical model name: trimmed, lower-cased, letter then `[0-9a-z_]`.
pub fn model_name(name: &str) -> Result<String, ModsetError> {
    let canonical = name.trim().to_lowercase();
    if !MODEL_NAME.is_match(&canonical) {
        return Err(invalid("model name", &canonical));
    }
    Ok(canonical)
}

pub fn route_path(path: &str) -> Result<String, ModsetError> {
    let canonical = path.trim();
    if !ROUTE_PATH.is_match(canonical) {
        return Err(invalid("route path", canonical));
    }
    Ok(canonical.to_string())
}

pub fn field_name(name: &str) -> Result<(), ModsetError> {
    if !MODEL_NAME.is_match(name) {
        return Err(invalid("field name", name));
    }
    Ok(())
}

pub fn attr_key(key: &str) -> Result<(), ModsetError> {
    if !MODEL_NAME.is_match(key) {
        return Err(invalid("field attribute key", key));
    }
    Ok(())
}

pub fn action_name(name: &str) -> Result<(), ModsetError> {
    if !MODEL_NAME.is_match(name) {
        return Err(invalid("action name", name));
    }
    Ok(())
}

pub fn datax_name(name: &str) -> Result<(), ModsetError> {
    if !MODEL_NAME.is_match(name) {
        return Err(invalid("datax name", name));
    }
    Ok(())
}

pub fn route_param_name(name: &str) -> Result<(), ModsetError> {
    if !ROUTE_PARAM_NAME.is_match(name) {
        return Err(invalid("route param name", name));
    }
    Ok(())
}

/// Service name derived from free text or a module name (`a/b` -> `a-b`).
pub fn srv_name(name: &str) -> Result<String, ModsetError> {
    let canonical = name.trim().to_lowercase().replace('/', "-");
    if !SRV_NAME.is_match(&canonical) {
        return Err(invalid("service name", &canonical));
    }
    Ok(canonical)
}

/// Normalizes a `langs` attribute value into a comma-joined list of
/// distinct language tags, dropping anything that is not a tag.
pub fn langs(value: &str) -> String {
    let mut out: Vec<String> = Vec::new();
    for token in value.split(|c: char| c == ',' || c.is_whitespace()) {
        let tag = token.trim().to_lowercase().replace('_', "-");
        if LANG_TAG.is_match(&tag) && !out.contains(&tag) {
            out.push(tag);
        }
    }
    out.join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_name_canonicalization() {
        assert_eq!(module_name(" Blog ").unwrap(), "blog");
        assert_eq!(module_name("/core//general/").unwrap(), "core/general");
        assert_eq!(module_name("core/./x/../general").unwrap(), "core/general");
        assert!(module_name("ab").is_err());
        assert!(module_name("../etc").is_err());
        assert!(module_name("blog_v2").is_err());

        let err = module_name("a b c").unwrap_err();
        assert!(err.is_invalid_argument());
        assert!(err.to_string().contains("a b c"));
    }

    #[test]
    fn test_model_and_field_names() {
        assert_eq!(model_name(" Post ").unwrap(), "post");
        assert!(model_name("1post").is_err());
        assert!(model_name("p").is_err());
        assert!(model_name("a_very_long_model_name").is_err());
        assert!(model_name("a_long_model_name_ok1").is_ok());

        assert!(field_name("title").is_ok());
        assert!(field_name("Title").is_err());
        assert!(attr_key("langs").is_ok());
        assert!(attr_key("x-y").is_err());
    }

    #[test]
    fn test_route_grammar() {
        assert_eq!(route_path(" view/:id ").unwrap(), "view/:id");
        assert!(route_path("view?id").is_err());
        assert!(route_path(&"a".repeat(51)).is_err());

        assert!(route_param_name("id").is_ok());
        assert!(route_param_name("pageNum").is_ok());
        assert!(route_param_name("Id").is_err());
    }

    #[test]
    fn test_srv_name() {
        assert_eq!(srv_name("core/general").unwrap(), "core-general");
        assert_eq!(srv_name("Blog").unwrap(), "blog");
        assert!(srv_name("").is_err());
    }

    #[test]
    fn test_langs_filter() {
        assert_eq!(langs("en, zh_CN,en  fr"), "en,zh-cn,fr");
        assert_eq!(langs("english"), "");
        assert_eq!(langs(""), "");
    }
}

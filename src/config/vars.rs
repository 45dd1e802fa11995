//! Environment variable substitution for configuration files.
//!
//! Config files may reference `$VAR` or `${VAR}`. `${VAR:-fallback}`
//! supplies a fallback when the variable is unset or empty, and `$$`
//! produces a literal `$`. Unresolvable references are collected rather
//! than short-circuited, so a config with several problems reports them
//! all at once.

use std::env;
use std::sync::LazyLock;

use regex::{Captures, Regex};

static VAR_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\$(?:\$|\{(?P<name>[A-Za-z_][A-Za-z0-9_]*)(?::-(?P<fallback>[^}]*))?\}|(?P<bare>[A-Za-z_][A-Za-z0-9_]*))",
    )
    .expect("variable pattern is valid")
});

/// Substitute environment variables in `input`.
///
/// Returns the substituted text, or every resolution error found.
pub fn interpolate(input: &str) -> Result<String, Vec<String>> {
    let mut errors = Vec::new();

    let text = VAR_PATTERN.replace_all(input, |caps: &Captures| {
        expand(caps).unwrap_or_else(|e| {
            errors.push(e);
            // Leave the reference in place; the text is discarded on error
            caps.get(0).map(|m| m.as_str()).unwrap_or_default().to_string()
        })
    });

    if errors.is_empty() {
        Ok(text.into_owned())
    } else {
        Err(errors)
    }
}

fn expand(caps: &Captures) -> Result<String, String> {
    let Some(name) = caps.name("name").or_else(|| caps.name("bare")) else {
        // The $$ escape
        return Ok("$".to_string());
    };
    let name = name.as_str();
    let fallback = caps.name("fallback").map(|m| m.as_str());

    match env::var(name) {
        // A value with line breaks would corrupt the surrounding YAML
        Ok(value) if value.contains(['\n', '\r']) => {
            Err(format!("environment variable '{name}' contains line breaks"))
        }
        Ok(value) if value.is_empty() => match fallback {
            Some(fallback) => Ok(fallback.to_string()),
            None => Ok(value),
        },
        Ok(value) => Ok(value),
        Err(_) => fallback
            .map(str::to_string)
            .ok_or_else(|| format!("environment variable '{name}' is not set")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_env_vars<F, R>(vars: &[(&str, Option<&str>)], f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let originals: Vec<_> = vars.iter().map(|(k, _)| (*k, env::var(k).ok())).collect();

        // SAFETY: test env vars are namespaced and restored before returning
        for (key, value) in vars {
            match value {
                Some(v) => unsafe { env::set_var(key, v) },
                None => unsafe { env::remove_var(key) },
            }
        }

        let result = f();

        for (key, original) in originals {
            match original {
                Some(v) => unsafe { env::set_var(key, v) },
                None => unsafe { env::remove_var(key) },
            }
        }

        result
    }

    #[test]
    fn test_bare_reference() {
        with_env_vars(&[("GLACIER_TEST_BUCKET", Some("s3://snapshots"))], || {
            let text = interpolate("bucket_url: $GLACIER_TEST_BUCKET").unwrap();
            assert_eq!(text, "bucket_url: s3://snapshots");
        });
    }

    #[test]
    fn test_braced_reference() {
        with_env_vars(&[("GLACIER_TEST_PASSWORD", Some("hunter2"))], || {
            let text = interpolate("password: ${GLACIER_TEST_PASSWORD}").unwrap();
            assert_eq!(text, "password: hunter2");
        });
    }

    #[test]
    fn test_missing_variable_is_an_error() {
        with_env_vars(&[("GLACIER_TEST_MISSING", None)], || {
            let errors = interpolate("value: $GLACIER_TEST_MISSING").unwrap_err();
            assert_eq!(errors.len(), 1);
            assert!(errors[0].contains("GLACIER_TEST_MISSING"));
        });
    }

    #[test]
    fn test_all_errors_collected() {
        with_env_vars(
            &[("GLACIER_TEST_A", None), ("GLACIER_TEST_B", None)],
            || {
                let errors =
                    interpolate("a: $GLACIER_TEST_A\nb: ${GLACIER_TEST_B}").unwrap_err();
                assert_eq!(errors.len(), 2);
            },
        );
    }

    #[test]
    fn test_fallback_when_unset() {
        with_env_vars(&[("GLACIER_TEST_UNSET", None)], || {
            let text = interpolate("schema: ${GLACIER_TEST_UNSET:-finance}").unwrap();
            assert_eq!(text, "schema: finance");
        });
    }

    #[test]
    fn test_fallback_when_empty() {
        with_env_vars(&[("GLACIER_TEST_EMPTY", Some(""))], || {
            let text = interpolate("schema: ${GLACIER_TEST_EMPTY:-finance}").unwrap();
            assert_eq!(text, "schema: finance");
        });
    }

    #[test]
    fn test_dollar_escape() {
        assert_eq!(interpolate("amount: $$100").unwrap(), "amount: $100");
    }

    #[test]
    fn test_line_breaks_rejected() {
        with_env_vars(&[("GLACIER_TEST_MULTILINE", Some("a\nb"))], || {
            let errors = interpolate("value: $GLACIER_TEST_MULTILINE").unwrap_err();
            assert!(errors[0].contains("line breaks"));
        });
    }
}

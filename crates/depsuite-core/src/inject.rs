//! Appending synthesized statements to source text.

use crate::error::Error;
use crate::sourcemap::SourceMap;

/// Statement form of one reference.
#[must_use]
pub fn wrap_in_require_include(reference: &str) -> String {
    format!("require.include('{reference}');")
}

/// Result of an injection.
#[derive(Debug, Clone, PartialEq)]
pub struct Injected {
    pub code: String,
    pub map: Option<SourceMap>,
}

/// Separator between the original text and the first injected statement.
fn separator(source: &str) -> &'static str {
    if !source.trim_end().ends_with(';') {
        ";\n"
    } else if source.ends_with('\n') {
        ""
    } else {
        "\n"
    }
}

/// Append `statements` to `source`.
///
/// Exactly one terminator ends up between the original text and the
/// injected block. A supplied map must describe `source`; it is returned
/// with `file` set and leaves the appended lines unmapped.
pub fn inject(
    source: &str,
    statements: &[String],
    map: Option<SourceMap>,
    file: Option<&str>,
) -> Result<Injected, Error> {
    let map = match map {
        Some(mut map) => {
            map.validate(source)?;
            if let Some(file) = file {
                map.file = Some(file.to_string());
            }
            Some(map)
        }
        None => None,
    };

    if statements.is_empty() {
        return Ok(Injected {
            code: source.to_string(),
            map,
        });
    }

    let mut code = String::with_capacity(
        source.len() + statements.iter().map(|s| s.len() + 1).sum::<usize>() + 2,
    );
    code.push_str(source);
    code.push_str(separator(source));
    code.push_str(&statements.join("\n"));
    code.push('\n');

    Ok(Injected { code, map })
}

/// [`inject`], delivering the result through `callback`.
///
/// The callback runs exactly once, before this function returns. Async
/// callers await the surrounding future instead; injection never suspends.
pub fn inject_with_callback<F>(
    source: &str,
    statements: &[String],
    map: Option<SourceMap>,
    file: Option<&str>,
    callback: F,
) where
    F: FnOnce(Result<Injected, Error>),
{
    callback(inject(source, statements, map, file));
}

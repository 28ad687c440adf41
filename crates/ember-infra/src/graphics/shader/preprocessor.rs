// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! A small line-based preprocessor for WGSL sources.
//!
//! WGSL has no preprocessor of its own. The supported directives are
//! `#define NAME [value]`, `#ifdef NAME`, `#ifndef NAME`, `#else` and `#endif`.
//! Defines carrying a value are substituted wherever their name appears as a
//! whole identifier outside of directives.

use ember_core::renderer::{ShaderDefine, ShaderError};
use std::collections::HashMap;

/// One open `#ifdef`/`#ifndef` block.
#[derive(Debug, Clone, Copy)]
struct Branch {
    /// Whether the enclosing block emits lines.
    parent_active: bool,
    /// Whether the current arm of this block emits lines.
    active: bool,
    /// Set once `#else` has been seen.
    in_else: bool,
    /// Line of the opening directive, for unterminated-block errors.
    opened_at: usize,
}

/// Preprocesses `source`.
///
/// `path` is only used in error reports. Lines removed by a conditional are
/// replaced by empty lines so that backend diagnostics keep their line numbers.
pub fn preprocess(
    source: &str,
    defines: &[ShaderDefine],
    path: &str,
) -> Result<String, ShaderError> {
    let mut table: HashMap<String, String> = defines
        .iter()
        .map(|d| (d.name.to_string(), d.value.to_string()))
        .collect();
    let mut stack: Vec<Branch> = Vec::new();
    let mut output = String::with_capacity(source.len());

    let error = |line: usize, message: String| ShaderError::PreprocessError {
        path: path.to_string(),
        line,
        message,
    };

    for (index, line) in source.lines().enumerate() {
        let line_number = index + 1;
        let emitting = stack.last().is_none_or(|b| b.active);
        let trimmed = line.trim_start();

        if let Some(directive) = trimmed.strip_prefix('#') {
            let mut parts = directive.split_whitespace();
            let keyword = parts.next().unwrap_or_default();
            match keyword {
                "ifdef" | "ifndef" => {
                    let name = parts
                        .next()
                        .ok_or_else(|| error(line_number, format!("#{keyword} needs a name")))?;
                    let defined = table.contains_key(name);
                    let condition = if keyword == "ifdef" { defined } else { !defined };
                    stack.push(Branch {
                        parent_active: emitting,
                        active: emitting && condition,
                        in_else: false,
                        opened_at: line_number,
                    });
                }
                "else" => {
                    let branch = stack
                        .last_mut()
                        .ok_or_else(|| error(line_number, "#else without #ifdef".to_string()))?;
                    if branch.in_else {
                        return Err(error(line_number, "second #else in block".to_string()));
                    }
                    branch.in_else = true;
                    branch.active = branch.parent_active && !branch.active;
                }
                "endif" => {
                    stack
                        .pop()
                        .ok_or_else(|| error(line_number, "#endif without #ifdef".to_string()))?;
                }
                "define" => {
                    let name = parts
                        .next()
                        .ok_or_else(|| error(line_number, "#define needs a name".to_string()))?;
                    if emitting {
                        let value = parts.collect::<Vec<_>>().join(" ");
                        table.insert(name.to_string(), value);
                    }
                }
                other => {
                    return Err(error(line_number, format!("unknown directive #{other}")));
                }
            }
            output.push('\n');
            continue;
        }

        if emitting {
            substitute_into(line, &table, &mut output);
        }
        output.push('\n');
    }

    if let Some(branch) = stack.last() {
        return Err(error(
            branch.opened_at,
            "block is never closed with #endif".to_string(),
        ));
    }
    Ok(output)
}

/// Appends `line` to `out`, replacing every identifier that names a valued define.
fn substitute_into(line: &str, table: &HashMap<String, String>, out: &mut String) {
    let mut rest = line;
    while let Some(start) = rest.find(is_ident_char) {
        out.push_str(&rest[..start]);
        let word = &rest[start..];
        let end = word.find(|c: char| !is_ident_char(c)).unwrap_or(word.len());
        let token = &word[..end];
        match table.get(token) {
            Some(value) if !value.is_empty() && !starts_with_digit(token) => out.push_str(value),
            _ => out.push_str(token),
        }
        rest = &word[end..];
    }
    out.push_str(rest);
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn starts_with_digit(token: &str) -> bool {
    token.starts_with(|c: char| c.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(source: &str, defines: &[ShaderDefine]) -> String {
        preprocess(source, defines, "test.wgsl").unwrap()
    }

    fn non_empty_lines(text: &str) -> Vec<&str> {
        text.lines().filter(|l| !l.trim().is_empty()).collect()
    }

    #[test]
    fn substitutes_whole_identifiers_only() {
        let out = run(
            "@workgroup_size(TILE_SIZE, TILE_SIZE, 1)\nlet a = MAX_TILE_SIZE;",
            &[ShaderDefine::value("TILE_SIZE", 8)],
        );
        assert_eq!(
            non_empty_lines(&out),
            vec!["@workgroup_size(8, 8, 1)", "let a = MAX_TILE_SIZE;"]
        );
    }

    #[test]
    fn flags_select_branches() {
        let source = "#ifdef ALPHA_MASK\nmasked\n#else\nopaque\n#endif\n#ifndef ALPHA_MASK\nplain\n#endif";
        let with = run(source, &[ShaderDefine::flag("ALPHA_MASK")]);
        let without = run(source, &[]);
        assert_eq!(non_empty_lines(&with), vec!["masked"]);
        assert_eq!(non_empty_lines(&without), vec!["opaque", "plain"]);
    }

    #[test]
    fn flags_are_not_substituted() {
        let out = run("let x = SPECULAR_POWER;", &[ShaderDefine::flag("SPECULAR_POWER")]);
        assert_eq!(non_empty_lines(&out), vec!["let x = SPECULAR_POWER;"]);
    }

    #[test]
    fn nested_blocks_respect_the_outer_branch() {
        let source = "#ifdef A\n#ifdef B\nab\n#else\na_only\n#endif\n#endif";
        assert!(non_empty_lines(&run(source, &[ShaderDefine::flag("B")])).is_empty());
        assert_eq!(
            non_empty_lines(&run(source, &[ShaderDefine::flag("A")])),
            vec!["a_only"]
        );
    }

    #[test]
    fn inline_define_applies_to_later_lines() {
        let out = run("#define CELLS 4.0\nlet c = CELLS;", &[]);
        assert_eq!(non_empty_lines(&out), vec!["let c = 4.0;"]);
    }

    #[test]
    fn line_count_is_preserved() {
        let source = "a\n#ifdef X\nb\n#endif\nc";
        assert_eq!(run(source, &[]).lines().count(), 5);
    }

    #[test]
    fn unbalanced_blocks_report_the_line() {
        match preprocess("x\n#ifdef A\ny", &[], "f.wgsl") {
            Err(ShaderError::PreprocessError { path, line, .. }) => {
                assert_eq!(path, "f.wgsl");
                assert_eq!(line, 2);
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert!(matches!(
            preprocess("#endif", &[], "f.wgsl"),
            Err(ShaderError::PreprocessError { line: 1, .. })
        ));
        assert!(matches!(
            preprocess("#ifdef A\n#else\n#else\n#endif", &[], "f.wgsl"),
            Err(ShaderError::PreprocessError { line: 3, .. })
        ));
    }

    #[test]
    fn unknown_directive_is_rejected() {
        assert!(preprocess("#include \"x.wgsl\"", &[], "f.wgsl").is_err());
    }
}

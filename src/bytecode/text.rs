//! Textual bytecode units
//!
//! A line-oriented description of a unit, used by the inspector and by
//! tests:
//!
//! ```text
//! # comment
//! identifier "main"          # string 0, interned at load
//! string "hello"             # string 1
//! function 0 2 8 0a0b0c      # name, params, frame size, body (hex)
//! lazy 0 1                   # name, params; body compiled on demand
//! cjs 1 0                    # filename string, function
//! cjs-static 42 1            # module id, function
//! regexp 00ff
//! epilogue "trailing data"
//! global 0
//! ```

use std::sync::LazyLock;

use regex::Regex;

use super::{BytecodeBuilder, BytecodeModule};
use crate::error::{Error, Result};

static QUOTED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"^"((?:[^"\\]|\\.)*)"$"#).expect("valid regex"));

static HEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:[0-9a-fA-F]{2})*$").expect("valid regex"));

fn syntax(line: usize, message: impl Into<String>) -> Error {
    Error::Syntax {
        line,
        message: message.into(),
    }
}

fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}

/// Strip a trailing `#` comment that is not inside a quoted string
fn strip_comment(line: &str) -> &str {
    let mut in_string = false;
    let mut escaped = false;
    for (i, c) in line.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            '#' if !in_string => return &line[..i],
            _ => {}
        }
    }
    line
}

fn parse_quoted(line: usize, arg: &str) -> Result<String> {
    QUOTED
        .captures(arg)
        .map(|caps| unescape(&caps[1]))
        .ok_or_else(|| syntax(line, format!("expected a quoted string, got `{}`", arg)))
}

fn parse_hex(line: usize, arg: &str) -> Result<Vec<u8>> {
    if !HEX.is_match(arg) {
        return Err(syntax(line, format!("invalid hex bytes `{}`", arg)));
    }
    (0..arg.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&arg[i..i + 2], 16).map_err(|e| syntax(line, e.to_string())))
        .collect()
}

struct Args<'a> {
    line: usize,
    words: std::str::SplitWhitespace<'a>,
}

impl Args<'_> {
    fn number(&mut self, what: &str) -> Result<u32> {
        let word = self
            .words
            .next()
            .ok_or_else(|| syntax(self.line, format!("missing {}", what)))?;
        word.parse()
            .map_err(|_| syntax(self.line, format!("invalid {} `{}`", what, word)))
    }

    fn optional(&mut self) -> Option<&str> {
        self.words.next()
    }

    fn finish(mut self) -> Result<()> {
        match self.words.next() {
            Some(extra) => Err(syntax(self.line, format!("unexpected `{}`", extra))),
            None => Ok(()),
        }
    }
}

/// Parse a textual unit
pub fn parse_unit(source: &str) -> Result<BytecodeModule> {
    let mut builder = BytecodeBuilder::new();
    let mut strings = 0u32;
    let mut global = None;

    for (index, raw) in source.lines().enumerate() {
        let line = index + 1;
        let text = strip_comment(raw).trim();
        if text.is_empty() {
            continue;
        }
        let (directive, rest) = text.split_once(char::is_whitespace).unwrap_or((text, ""));
        let rest = rest.trim();
        let mut args = Args {
            line,
            words: rest.split_whitespace(),
        };

        let check_string = move |id: u32| {
            if id < strings {
                Ok(id)
            } else {
                Err(syntax(line, format!("unknown string {}", id)))
            }
        };

        match directive {
            "string" => {
                builder.add_string(&parse_quoted(line, rest)?);
                strings += 1;
            }
            "identifier" => {
                builder.add_identifier(&parse_quoted(line, rest)?);
                strings += 1;
            }
            "epilogue" => builder.set_epilogue(parse_quoted(line, rest)?.into_bytes()),
            "function" => {
                let name = check_string(args.number("function name")?)?;
                let params = args.number("parameter count")?;
                let frame = args.number("frame size")?;
                let body = match args.optional() {
                    Some(hex) => parse_hex(line, hex)?,
                    None => Vec::new(),
                };
                args.finish()?;
                builder.add_function(name, params, frame, body);
            }
            "lazy" => {
                let name = check_string(args.number("function name")?)?;
                let params = args.number("parameter count")?;
                args.finish()?;
                builder.add_lazy_function(name, params);
            }
            "cjs" => {
                let filename = check_string(args.number("filename")?)?;
                let function = args.number("function index")?;
                args.finish()?;
                builder.add_cjs_module(filename, function);
            }
            "cjs-static" => {
                let module = args.number("module id")?;
                let function = args.number("function index")?;
                args.finish()?;
                builder.add_cjs_module_static(module, function);
            }
            "regexp" => {
                builder.add_regexp(parse_hex(line, rest)?);
            }
            "global" => {
                let function = args.number("function index")?;
                args.finish()?;
                global = Some((line, function));
            }
            other => return Err(syntax(line, format!("unknown directive `{}`", other))),
        }
    }

    if let Some((line, function)) = global {
        if function >= builder.function_count() {
            return Err(syntax(line, format!("unknown function {}", function)));
        }
        builder.set_global_function(function);
    }

    Ok(builder.build())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::BytecodeProvider;

    #[test]
    fn test_parse_unit() {
        let unit = parse_unit(
            r#"
            # two strings
            identifier "main"
            string "a \"quoted\" # not a comment"
            function 0 2 8 0a0B   # body
            lazy 0 1
            cjs 1 0
            cjs-static 42 1
            regexp 00ff
            epilogue "tail"
            global 1
            "#,
        )
        .unwrap();

        assert_eq!(unit.string_count(), 2);
        assert_eq!(unit.string(1), "a \"quoted\" # not a comment");
        assert!(unit.string_table_entry(0).is_identifier);
        assert_eq!(unit.bytecode(0), &[0x0a, 0x0b]);
        assert!(unit.function_header(1).lazy);
        assert_eq!(unit.cjs_module_table(), &[(1, 0)]);
        assert_eq!(unit.cjs_module_table_static(), &[(42, 1)]);
        assert_eq!(unit.regexp_bytecode(0), &[0x00, 0xff]);
        assert_eq!(unit.epilogue(), b"tail");
        assert_eq!(unit.global_function_index(), 1);
    }

    #[test]
    fn test_empty_source() {
        let unit = parse_unit("# nothing\n\n").unwrap();
        assert_eq!(unit.function_count(), 0);
    }

    #[test]
    fn test_errors_carry_line() {
        let err = parse_unit("string \"ok\"\nbogus 1").unwrap_err();
        assert_eq!(
            err,
            Error::Syntax {
                line: 2,
                message: "unknown directive `bogus`".into()
            }
        );

        let err = parse_unit("function 3 0 0").unwrap_err();
        assert!(err.to_string().contains("unknown string 3"));

        let err = parse_unit("identifier \"f\"\nfunction 0 0 0 abc").unwrap_err();
        assert!(err.to_string().starts_with("line 2"));

        let err = parse_unit("global 0").unwrap_err();
        assert!(err.to_string().contains("unknown function"));

        assert!(parse_unit("string unquoted").is_err());
        assert!(parse_unit("cjs-static 1 2 3").is_err());
    }
}

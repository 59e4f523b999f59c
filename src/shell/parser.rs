use anyhow::{bail, Result};

use crate::config::CONFIG;

/// One parsed command line. Immutable once built; dropped after dispatch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Invocation {
    /// First token, or empty for a blank line or comment.
    pub name: String,
    /// Ordered arguments with `argv[0] == name`. Converted to a
    /// NUL-terminated `CString` vector only at exec time.
    pub argv: Vec<String>,
    pub redirect_in: Option<String>,
    pub redirect_out: Option<String>,
    /// True iff the final token was a lone `&`, which is stripped here.
    pub background: bool,
}

impl Invocation {
    pub fn is_empty(&self) -> bool {
        self.name.is_empty()
    }
}

/// Replaces every non-overlapping `$$` with the shell's pid in decimal. A
/// `$` that is not immediately doubled passes through literally, so `$$$`
/// becomes the pid followed by `$`.
fn expand_pid(input: &str, pid: u32) -> String {
    let pid_text = pid.to_string();
    let mut expanded = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '$' && chars.peek() == Some(&'$') {
            chars.next();
            expanded.push_str(&pid_text);
        } else {
            expanded.push(c);
        }
    }

    expanded
}

/// Turns one raw input line into an Invocation. Blank lines and `#` comments
/// come back with an empty name; callers treat those as no-ops, not errors.
///
/// Exceeding the token cap is the one fatal parse condition: the limit is a
/// hard resource cap, not something the shell recovers from.
pub fn parse(line: &str, pid: u32) -> Result<Invocation> {
    let line = line.strip_suffix('\n').unwrap_or(line);
    let expanded = expand_pid(line, pid);
    let trimmed = expanded.trim();

    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Ok(Invocation::default());
    }

    let mut tokens: Vec<&str> = trimmed.split_whitespace().collect();
    if tokens.len() > CONFIG.max_args {
        bail!(
            "command line has {} tokens, more than the {} supported",
            tokens.len(),
            CONFIG.max_args
        );
    }

    let background = tokens.last() == Some(&"&");
    if background {
        tokens.pop();
    }

    let mut argv = Vec::new();
    let mut redirect_in = None;
    let mut redirect_out = None;
    let mut i = 0;

    // Redirection tokens and their paths never reach the exec argv. If the
    // same direction is redirected twice, the last occurrence wins.
    while i < tokens.len() {
        match tokens[i] {
            "<" if i + 1 < tokens.len() => {
                redirect_in = Some(tokens[i + 1].to_string());
                i += 2;
            }
            ">" if i + 1 < tokens.len() => {
                redirect_out = Some(tokens[i + 1].to_string());
                i += 2;
            }
            // a trailing redirection token with no path is dropped
            "<" | ">" => i += 1,
            word => {
                argv.push(word.to_string());
                i += 1;
            }
        }
    }

    let name = argv.first().cloned().unwrap_or_default();

    Ok(Invocation {
        name,
        argv,
        redirect_in,
        redirect_out,
        background,
    })
}

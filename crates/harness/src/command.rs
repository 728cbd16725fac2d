//! Service command-line construction.
//!
//! The service is spawned from an argument vector, never through a shell,
//! so directory names with spaces, newlines or commas reach it intact.
//! Shell quoting is only used to render the command for logs.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Exit code the memory checker uses when it detects errors.
pub const VALGRIND_ERROR_EXIT_CODE: i32 = 100;

/// Split a CLI-style argument string into words.
///
/// Supports single quotes (literal), double quotes (with `\"` and `\\`
/// escapes) and backslash escapes outside quotes.
pub fn split_args(input: &str) -> Result<Vec<String>, String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut chars = input.chars();

    while let Some(c) = chars.next() {
        match c {
            '\'' => {
                in_word = true;
                loop {
                    match chars.next() {
                        Some('\'') => break,
                        Some(ch) => current.push(ch),
                        None => return Err("unterminated single quote".to_owned()),
                    }
                }
            }
            '"' => {
                in_word = true;
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some(ch @ ('"' | '\\')) => current.push(ch),
                            Some(ch) => {
                                current.push('\\');
                                current.push(ch);
                            }
                            None => return Err("unterminated double quote".to_owned()),
                        },
                        Some(ch) => current.push(ch),
                        None => return Err("unterminated double quote".to_owned()),
                    }
                }
            }
            '\\' => {
                in_word = true;
                match chars.next() {
                    Some(ch) => current.push(ch),
                    None => return Err("trailing backslash".to_owned()),
                }
            }
            c if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            c => {
                in_word = true;
                current.push(c);
            }
        }
    }
    if in_word {
        words.push(current);
    }
    Ok(words)
}

/// Quote `word` for a POSIX shell.
pub fn shell_quote(word: &str) -> String {
    let safe = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:@%+,".contains(c));
    if safe {
        word.to_owned()
    } else {
        format!("'{}'", word.replace('\'', r"'\''"))
    }
}

/// Memory-checker wrapping for the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Valgrind {
    pub tool: String,
    /// Extra options passed through from `--valgrind=<opts>`.
    pub options: Vec<String>,
}

/// Full command line for one service invocation.
#[derive(Debug, Clone)]
pub struct ServiceCommand {
    pub executable: PathBuf,
    pub args: Vec<String>,
    pub foreground_flag: String,
    pub extra_flags: Vec<String>,
    pub valgrind: Option<Valgrind>,
    pub src: PathBuf,
    pub mnt: PathBuf,
}

impl ServiceCommand {
    /// Program and argument vector, in spawn order.
    pub fn argv(&self) -> (OsString, Vec<OsString>) {
        let mut service: Vec<OsString> = Vec::new();
        service.push(self.executable.clone().into_os_string());
        service.extend(self.args.iter().map(OsString::from));
        if !self.foreground_flag.is_empty() {
            service.push(OsString::from(&self.foreground_flag));
        }
        service.extend(self.extra_flags.iter().map(OsString::from));
        service.push(self.src.clone().into_os_string());
        service.push(self.mnt.clone().into_os_string());

        match &self.valgrind {
            Some(valgrind) => {
                let mut args: Vec<OsString> = vec![
                    format!("--error-exitcode={VALGRIND_ERROR_EXIT_CODE}").into(),
                    format!("--tool={}", valgrind.tool).into(),
                ];
                args.extend(valgrind.options.iter().map(OsString::from));
                args.extend(service);
                ("valgrind".into(), args)
            }
            None => {
                let program = service.remove(0);
                (program, service)
            }
        }
    }

    /// A [`Command`] ready to spawn, with `cwd` as working directory.
    pub fn to_command(&self, cwd: &Path) -> Command {
        let (program, args) = self.argv();
        let mut command = Command::new(program);
        command.args(args).current_dir(cwd);
        command
    }

    /// Shell-quoted rendering of the command line.
    pub fn display(&self) -> String {
        let (program, args) = self.argv();
        std::iter::once(program)
            .chain(args)
            .map(|arg| shell_quote(&arg.to_string_lossy()))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

//! Operator command parsing.
//!
//! Commands arrive one per line on stdin. Names containing spaces can be
//! quoted: `add "Front Gate" rtsp rtsp://10.0.0.5/stream auto`.

use tokio::io::Stdin;
use tokio_util::codec::{FramedRead, LinesCodec};

use crate::camera::{CameraDefinition, CameraId, Source, SourceType};
use crate::error::FleetError;

/// Longest line accepted from stdin
const MAX_LINE: usize = 4096;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Add(CameraDefinition),
    Toggle(CameraId),
    Delete(CameraId),
    Maximize(CameraId),
    Layout(u32),
    List,
    Help,
    Quit,
    /// Blank line; redraws the grid
    Refresh,
}

pub const HELP: &[&str] = &[
    "add <name> <local|rtsp|http|file> <source> [auto]   register a camera",
    "toggle <id>                                        start or stop a camera",
    "delete <id>                                        remove a camera",
    "max <id>                                           show one camera full size",
    "layout <1|4|6|9>                                   change the grid size",
    "list                                               list cameras",
    "quit                                               exit",
];

/// Split on whitespace, keeping double-quoted runs together
fn tokenize(line: &str) -> Result<Vec<String>, FleetError> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut in_token = false;

    for c in line.chars() {
        match c {
            '"' => {
                quoted = !quoted;
                in_token = true;
            }
            c if c.is_whitespace() && !quoted => {
                if in_token {
                    tokens.push(std::mem::take(&mut current));
                    in_token = false;
                }
            }
            c => {
                current.push(c);
                in_token = true;
            }
        }
    }
    if quoted {
        return Err(FleetError::Validation("unterminated quote".to_string()));
    }
    if in_token {
        tokens.push(current);
    }
    Ok(tokens)
}

fn camera_id(arg: Option<&String>) -> Result<CameraId, FleetError> {
    let arg = arg.ok_or_else(|| FleetError::Validation("camera id is required".to_string()))?;
    arg.parse()
        .map_err(|_| FleetError::Validation(format!("invalid camera id '{}'", arg)))
}

/// Parse one input line
pub fn parse_command(line: &str) -> Result<Command, FleetError> {
    let tokens = tokenize(line)?;
    let Some((verb, args)) = tokens.split_first() else {
        return Ok(Command::Refresh);
    };

    match verb.to_lowercase().as_str() {
        "add" | "a" => {
            let [name, kind, source, rest @ ..] = args else {
                return Err(FleetError::Validation(
                    "usage: add <name> <local|rtsp|http|file> <source> [auto]".to_string(),
                ));
            };
            let auto_start = match rest {
                [] => false,
                [flag] if flag.eq_ignore_ascii_case("auto") => true,
                _ => {
                    return Err(FleetError::Validation(format!(
                        "unexpected arguments after source: {}",
                        rest.join(" ")
                    )));
                }
            };
            let kind: SourceType = kind.parse()?;
            let source = Source::parse(kind, source)?;
            Ok(Command::Add(CameraDefinition::new(name.as_str(), source, auto_start)))
        }
        "toggle" | "t" => camera_id(args.first()).map(Command::Toggle),
        "delete" | "del" | "rm" => camera_id(args.first()).map(Command::Delete),
        "max" | "maximize" => camera_id(args.first()).map(Command::Maximize),
        "layout" | "grid" => {
            let size = args
                .first()
                .ok_or_else(|| FleetError::Validation("layout size is required".to_string()))?;
            size.parse()
                .map(Command::Layout)
                .map_err(|_| FleetError::Validation(format!("invalid layout '{}'", size)))
        }
        "list" | "ls" => Ok(Command::List),
        "help" | "?" => Ok(Command::Help),
        "quit" | "exit" | "q" => Ok(Command::Quit),
        other => Err(FleetError::Validation(format!(
            "unknown command '{}', type help for a list",
            other
        ))),
    }
}

/// Line reader over the process's stdin
pub fn stdin_lines() -> FramedRead<Stdin, LinesCodec> {
    FramedRead::new(tokio::io::stdin(), LinesCodec::new_with_max_length(MAX_LINE))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_add() {
        let cmd = parse_command("add Gate rtsp rtsp://x/y").unwrap();
        assert_eq!(
            cmd,
            Command::Add(CameraDefinition::new("Gate", Source::Rtsp("rtsp://x/y".to_string()), false))
        );
    }

    #[test]
    fn test_parse_add_quoted_auto() {
        let cmd = parse_command(r#"add "Front Desk" local 0 auto"#).unwrap();
        assert_eq!(
            cmd,
            Command::Add(CameraDefinition::new("Front Desk", Source::Local(0), true))
        );
    }

    #[test]
    fn test_parse_add_errors() {
        assert!(parse_command("add Gate rtsp").is_err());
        assert!(parse_command("add Desk local zero").is_err());
        assert!(parse_command("add Desk webcam 0").is_err());
        assert!(parse_command("add Desk local 0 now").is_err());
        assert!(parse_command(r#"add "Desk local 0"#).is_err());
    }

    #[test]
    fn test_parse_id_commands() {
        assert_eq!(parse_command("toggle 3").unwrap(), Command::Toggle(CameraId(3)));
        assert_eq!(parse_command("t #3").unwrap(), Command::Toggle(CameraId(3)));
        assert_eq!(parse_command("delete 0").unwrap(), Command::Delete(CameraId(0)));
        assert_eq!(parse_command("MAX 12").unwrap(), Command::Maximize(CameraId(12)));
        assert!(parse_command("toggle").is_err());
        assert!(parse_command("toggle gate").is_err());
    }

    #[test]
    fn test_parse_misc() {
        assert_eq!(parse_command("layout 6").unwrap(), Command::Layout(6));
        // Range is checked by the grid, not the parser
        assert_eq!(parse_command("layout 5").unwrap(), Command::Layout(5));
        assert!(parse_command("layout big").is_err());
        assert_eq!(parse_command("  ").unwrap(), Command::Refresh);
        assert_eq!(parse_command("list").unwrap(), Command::List);
        assert_eq!(parse_command("q").unwrap(), Command::Quit);
        assert!(parse_command("dance").is_err());
    }
}

//! Prompt command parsing
//!
//! Lines starting with `:` control the session; anything else is sent to
//! the device as-is.
//!
//! | Input | Meaning |
//! |---|---|
//! | `:connect` | connect (or join the attempt in flight) |
//! | `:close` | close and stop reconnecting |
//! | `:status` | print state and counters |
//! | `:request <ok> <err\|-> <command>` | send and wait for a matching reply |
//! | `:quit` | close and exit |

use devlink::{Pattern, SessionError};

#[derive(Debug)]
pub enum ConsoleCommand {
    Connect,
    Close,
    Status,
    Quit,
    Send(String),
    Request {
        command: String,
        success: Pattern,
        failure: Option<Pattern>,
    },
    Empty,
}

impl ConsoleCommand {
    pub fn parse(line: &str) -> Result<Self, SessionError> {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.trim().is_empty() {
            return Ok(ConsoleCommand::Empty);
        }

        let Some(meta) = line.strip_prefix(':') else {
            return Ok(ConsoleCommand::Send(line.to_string()));
        };

        let mut parts = meta.splitn(4, char::is_whitespace);
        match parts.next().unwrap_or_default() {
            "connect" => Ok(ConsoleCommand::Connect),
            "close" => Ok(ConsoleCommand::Close),
            "status" => Ok(ConsoleCommand::Status),
            "quit" | "q" => Ok(ConsoleCommand::Quit),
            "request" | "req" => {
                let (Some(success), Some(failure), Some(command)) =
                    (parts.next(), parts.next(), parts.next())
                else {
                    return Err(SessionError::Configuration(
                        "usage: :request <success> <failure|-> <command>".to_string(),
                    ));
                };
                let failure = match failure {
                    "-" => None,
                    pattern => Some(Pattern::new(pattern)?),
                };
                Ok(ConsoleCommand::Request {
                    command: command.to_string(),
                    success: Pattern::new(success)?,
                    failure,
                })
            }
            other => Err(SessionError::Configuration(format!(
                "unknown command :{}",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_line_is_sent() {
        match ConsoleCommand::parse("PWR ON\n").unwrap() {
            ConsoleCommand::Send(text) => assert_eq!(text, "PWR ON"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_meta_commands() {
        assert!(matches!(ConsoleCommand::parse(":connect"), Ok(ConsoleCommand::Connect)));
        assert!(matches!(ConsoleCommand::parse(":close"), Ok(ConsoleCommand::Close)));
        assert!(matches!(ConsoleCommand::parse(":status"), Ok(ConsoleCommand::Status)));
        assert!(matches!(ConsoleCommand::parse(":q"), Ok(ConsoleCommand::Quit)));
        assert!(matches!(ConsoleCommand::parse("   "), Ok(ConsoleCommand::Empty)));
        assert!(ConsoleCommand::parse(":reboot").is_err());
    }

    #[test]
    fn test_request_parsing() {
        match ConsoleCommand::parse(":request ^OK ERR\\s\\d+ VOL 10").unwrap() {
            ConsoleCommand::Request {
                command,
                success,
                failure,
            } => {
                assert_eq!(command, "VOL 10");
                assert_eq!(success.as_str(), "^OK");
                assert_eq!(failure.unwrap().as_str(), "ERR\\s\\d+");
            }
            other => panic!("unexpected {:?}", other),
        }

        assert!(matches!(
            ConsoleCommand::parse(":req OK - PING"),
            Ok(ConsoleCommand::Request { failure: None, .. })
        ));
        assert!(ConsoleCommand::parse(":request OK").is_err());
        assert!(matches!(
            ConsoleCommand::parse(":request (OK - PING"),
            Err(SessionError::InvalidPattern(_))
        ));
    }
}

//! Command parsing for the interactive session.
//!
//! Lines starting with `/` are commands. Anything else is cast as a vote, so
//! typing a card value is enough during a round.

/// Parsed command from user input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Start a voting round.
    StartRound,

    /// Cast or replace the local vote.
    Vote {
        /// Card value.
        value: String,
    },

    /// Reveal the round. Host only.
    Reveal,

    /// Clear votes and start over. Host only.
    Reset,

    /// Remove a participant. Host only.
    Kick {
        /// Participant id.
        participant_id: String,
    },

    /// Hand the host role to another participant. Host only.
    Transfer {
        /// Participant id of the new host.
        participant_id: String,
    },

    /// Set the topic under estimation. Host only.
    Topic {
        /// Topic text.
        topic: String,
    },

    /// Reload the room snapshot.
    Refresh,

    /// Show the room and the round.
    Show,

    /// Leave the room and quit.
    Leave,

    /// Quit without leaving; the seat can be reclaimed later.
    Quit,

    /// Nothing to do.
    Empty,

    /// Unknown command.
    Unknown {
        /// The original input.
        input: String,
    },

    /// Command with missing or invalid arguments.
    InvalidArgs {
        /// Command name.
        command: String,
        /// Error message.
        error: String,
    },
}

/// Parse one line of user input.
pub fn parse(input: &str) -> Command {
    let input = input.trim();

    if input.is_empty() {
        return Command::Empty;
    }

    let Some(cmd_str) = input.strip_prefix('/') else {
        return Command::Vote { value: input.to_string() };
    };

    let (command, rest) = match cmd_str.split_once(char::is_whitespace) {
        Some((command, rest)) => (command, rest.trim()),
        None => (cmd_str, ""),
    };

    match command {
        "start" => Command::StartRound,

        "vote" => match rest.split_whitespace().next() {
            Some(value) => Command::Vote { value: value.to_string() },
            None => usage("vote", "Usage: /vote <card>"),
        },

        "reveal" => Command::Reveal,

        "reset" => Command::Reset,

        "kick" => match rest.split_whitespace().next() {
            Some(id) => Command::Kick { participant_id: id.to_string() },
            None => usage("kick", "Usage: /kick <participant_id>"),
        },

        "host" => match rest.split_whitespace().next() {
            Some(id) => Command::Transfer { participant_id: id.to_string() },
            None => usage("host", "Usage: /host <participant_id>"),
        },

        "topic" => {
            if rest.is_empty() {
                usage("topic", "Usage: /topic <text>")
            } else {
                Command::Topic { topic: rest.to_string() }
            }
        },

        "refresh" => Command::Refresh,

        "show" | "s" => Command::Show,

        "leave" => Command::Leave,

        "quit" | "q" => Command::Quit,

        _ => Command::Unknown { input: input.to_string() },
    }
}

fn usage(command: &str, error: &str) -> Command {
    Command::InvalidArgs { command: command.into(), error: error.into() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_bare_value_votes() {
        assert_eq!(parse(" 8 "), Command::Vote { value: "8".into() });
    }

    #[test]
    fn parse_vote() {
        assert_eq!(parse("/vote XL"), Command::Vote { value: "XL".into() });
    }

    #[test]
    fn parse_vote_missing_value() {
        assert!(matches!(parse("/vote"), Command::InvalidArgs { command, .. } if command == "vote"));
    }

    #[test]
    fn parse_round_commands() {
        assert_eq!(parse("/start"), Command::StartRound);
        assert_eq!(parse("/reveal"), Command::Reveal);
        assert_eq!(parse("/reset"), Command::Reset);
        assert_eq!(parse("/refresh"), Command::Refresh);
    }

    #[test]
    fn parse_kick() {
        assert_eq!(parse("/kick p-2"), Command::Kick { participant_id: "p-2".into() });
        assert!(matches!(parse("/kick"), Command::InvalidArgs { command, .. } if command == "kick"));
    }

    #[test]
    fn parse_transfer() {
        assert_eq!(parse("/host p-3"), Command::Transfer { participant_id: "p-3".into() });
    }

    #[test]
    fn parse_topic_keeps_spaces() {
        assert_eq!(parse("/topic  Login  page "), Command::Topic { topic: "Login  page".into() });
        assert!(matches!(parse("/topic"), Command::InvalidArgs { command, .. } if command == "topic"));
    }

    #[test]
    fn parse_leave_and_quit() {
        assert_eq!(parse("/leave"), Command::Leave);
        assert_eq!(parse("/quit"), Command::Quit);
        assert_eq!(parse("/q"), Command::Quit);
    }

    #[test]
    fn parse_unknown_command() {
        assert!(matches!(parse("/unknown"), Command::Unknown { .. }));
    }

    #[test]
    fn parse_empty() {
        assert_eq!(parse("   "), Command::Empty);
    }
}

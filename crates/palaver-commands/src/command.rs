//! Recognising commands in message text.

use std::fmt;

/// Russian keyword that starts an image request without a slash.
pub const DRAW_KEYWORD: &str = "рисуй";

/// A command the router understands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `/start`
    Start,
    /// `/help`
    Help,
    /// `/clear`
    Clear,
    /// `/memory [n]`
    Memory,
    /// `/forget`, as a reply
    Forget,
    /// `/replace <text>`, as a reply
    Replace,
    /// `/system <text>`
    System,
    /// `/personality <text>`
    Personality,
    /// `/set <field> <value>`
    Set,
    /// `/reset_settings`
    ResetSettings,
    /// `/settings`
    Settings,
    /// `/history`
    History,
    /// `/stats`
    Stats,
    /// `/draw <description>` or `рисуй <description>`
    Draw,
    /// `/broadcast [#tag] <text>`
    Broadcast,
    /// Any other slash command.
    Unknown(String),
}

impl Command {
    fn from_name(name: &str) -> Self {
        match name {
            "start" => Self::Start,
            "help" => Self::Help,
            "clear" => Self::Clear,
            "memory" => Self::Memory,
            "forget" => Self::Forget,
            "replace" => Self::Replace,
            "system" => Self::System,
            "personality" => Self::Personality,
            "set" => Self::Set,
            "reset_settings" => Self::ResetSettings,
            "settings" => Self::Settings,
            "history" => Self::History,
            "stats" => Self::Stats,
            "draw" => Self::Draw,
            "broadcast" => Self::Broadcast,
            other => Self::Unknown(other.to_string()),
        }
    }

    /// Name as typed after the slash.
    pub fn name(&self) -> &str {
        match self {
            Self::Start => "start",
            Self::Help => "help",
            Self::Clear => "clear",
            Self::Memory => "memory",
            Self::Forget => "forget",
            Self::Replace => "replace",
            Self::System => "system",
            Self::Personality => "personality",
            Self::Set => "set",
            Self::ResetSettings => "reset_settings",
            Self::Settings => "settings",
            Self::History => "history",
            Self::Stats => "stats",
            Self::Draw => "draw",
            Self::Broadcast => "broadcast",
            Self::Unknown(name) => name,
        }
    }

    /// Whether the command changes the entity's settings or memory.
    /// `/memory` only does when given an argument.
    pub fn is_mutating(&self, args: &str) -> bool {
        match self {
            Self::Clear
            | Self::Forget
            | Self::Replace
            | Self::System
            | Self::Personality
            | Self::Set
            | Self::ResetSettings => true,
            Self::Memory => !args.is_empty(),
            _ => false,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.name())
    }
}

/// A command with the text that followed it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCommand {
    /// The command.
    pub command: Command,
    /// Trimmed remainder of the message.
    pub args: String,
}

impl ParsedCommand {
    /// Recognises a command in `text`.
    ///
    /// `/name@bot` addressed to another bot is not ours and yields `None`,
    /// as does plain text other than the draw keyword.
    pub fn parse(text: &str, bot_username: &str) -> Option<Self> {
        let text = text.trim();
        let (head, args) = text
            .split_once(char::is_whitespace)
            .map_or((text, ""), |(head, rest)| (head, rest.trim()));

        if let Some(invocation) = head.strip_prefix('/') {
            let (name, target) = invocation
                .split_once('@')
                .map_or((invocation, None), |(name, target)| (name, Some(target)));
            if target.is_some_and(|target| !target.eq_ignore_ascii_case(bot_username)) {
                return None;
            }
            if name.is_empty() {
                return None;
            }
            return Some(Self {
                command: Command::from_name(&name.to_lowercase()),
                args: args.to_string(),
            });
        }

        (head.to_lowercase() == DRAW_KEYWORD).then(|| Self {
            command: Command::Draw,
            args: args.to_string(),
        })
    }
}

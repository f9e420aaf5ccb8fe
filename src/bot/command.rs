use thiserror::Error;

use crate::ledger::{LedgerError, Outcome, UserId};

/// A parsed inbound chat message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Command(Command),
    /// Anything that is not a slash command is a wager submission.
    Wager(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Help,
    DateOpen,
    DateClose,
    Ledger,
    Break { limit: u64 },
    Overbuy { user: UserId },
    PNumber { outcome: Outcome },
    ListCommissionUsers,
    SetCommission { user: UserId, commission: i64, multiplier: i64 },
    Total,
    TSent,
    AllData,
    Reset,
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Start => "start",
            Command::Help => "help",
            Command::DateOpen => "dateopen",
            Command::DateClose => "dateclose",
            Command::Ledger => "ledger",
            Command::Break { .. } => "break",
            Command::Overbuy { .. } => "overbuy",
            Command::PNumber { .. } => "pnumber",
            Command::ListCommissionUsers | Command::SetCommission { .. } => "comandza",
            Command::Total => "total",
            Command::TSent => "tsent",
            Command::AllData => "alldata",
            Command::Reset => "reset",
        }
    }

    pub fn requires_admin(&self) -> bool {
        !matches!(self, Command::Start | Command::Help)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("/{command} is restricted to the administrator")]
    PermissionDenied { command: &'static str },
    #[error("usage: {0}")]
    Usage(&'static str),
    #[error("unknown command /{0}")]
    UnknownCommand(String),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

pub const BREAK_USAGE: &str = "/break <limit>";
pub const OVERBUY_USAGE: &str = "/overbuy <user>";
pub const PNUMBER_USAGE: &str = "/pnumber <00-99>";
pub const COMANDZA_USAGE: &str = "/comandza <user> <com>/<za>  (e.g. /comandza mya 15/80)";

/// Classify a raw message. Command names may carry a `@botname` suffix.
pub fn parse_message(text: &str) -> Result<Message, CommandError> {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix('/') else {
        return Ok(Message::Wager(trimmed.to_string()));
    };

    let mut parts = rest.split_whitespace();
    let head = parts.next().unwrap_or_default();
    let name = head.split('@').next().unwrap_or_default().to_lowercase();
    let args: Vec<&str> = parts.collect();

    let cmd = match name.as_str() {
        "start" => Command::Start,
        "help" => Command::Help,
        "dateopen" => Command::DateOpen,
        "dateclose" => Command::DateClose,
        "ledger" => Command::Ledger,
        "break" => {
            let limit = args
                .first()
                .and_then(|a| a.parse::<u64>().ok())
                .ok_or(CommandError::Usage(BREAK_USAGE))?;
            Command::Break { limit }
        }
        "overbuy" => match args.as_slice() {
            [user] => Command::Overbuy {
                user: UserId::new(*user),
            },
            _ => return Err(CommandError::Usage(OVERBUY_USAGE)),
        },
        "pnumber" => {
            let outcome = args
                .first()
                .and_then(|a| a.parse::<Outcome>().ok())
                .ok_or(CommandError::Usage(PNUMBER_USAGE))?;
            Command::PNumber { outcome }
        }
        "comandza" => match args.as_slice() {
            [] => Command::ListCommissionUsers,
            [user, terms] => {
                let (commission, multiplier) =
                    parse_terms(terms).ok_or(CommandError::Usage(COMANDZA_USAGE))?;
                Command::SetCommission {
                    user: UserId::new(*user),
                    commission,
                    multiplier,
                }
            }
            _ => return Err(CommandError::Usage(COMANDZA_USAGE)),
        },
        "total" => Command::Total,
        "tsent" => Command::TSent,
        "alldata" => Command::AllData,
        "reset" => Command::Reset,
        _ => return Err(CommandError::UnknownCommand(name)),
    };
    Ok(Message::Command(cmd))
}

/// `"15/80"` → `(15, 80)`. Range checks happen in the account directory.
fn parse_terms(s: &str) -> Option<(i64, i64)> {
    let (com, za) = s.split_once('/')?;
    Some((com.trim().parse().ok()?, za.trim().parse().ok()?))
}

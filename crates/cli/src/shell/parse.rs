//! Shell line parsing
//!
//! Each input line is one command word followed by arguments. Short keys
//! mirror a two-pane file manager (`j`/`k` to move, `tab` to switch panes).

use std::path::PathBuf;

use sc_core::{Command, Error, OverwritePolicy, Result, TransferKind};

/// One parsed input line
#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    Command(Command),
    /// Print both panes
    Show,
    /// Block until the running transfer finishes
    Wait,
    Help,
    Quit,
}

pub const HELP: &str = "\
navigation   j/down [n]  k/up [n]  top  bottom  enter  ..  back  cd <bucket/prefix>  tab
selection    space  all  none  match <glob>  find <text>  clear
transfers    cp [--overwrite|--if-newer]  mv [..]  rm  get <dir> [..]  put <path> [..]
             y/yes  n/no/cancel  wait
buckets      mb <name> [region]  rb [name]  mkdir <name>  rename <name>  view
other        ls  refresh  help  quit";

fn count(arg: Option<&str>) -> Result<isize> {
    match arg {
        None => Ok(1),
        Some(text) => text
            .parse()
            .map_err(|_| Error::InvalidCommand(format!("Not a number: {text}"))),
    }
}

fn required<'a>(arg: Option<&'a str>, what: &str) -> Result<&'a str> {
    arg.filter(|a| !a.is_empty())
        .ok_or_else(|| Error::InvalidCommand(format!("Missing {what}")))
}

/// Transfer flags and an optional path operand
fn transfer(kind: TransferKind, args: &[&str], needs_path: bool) -> Result<Command> {
    let mut policy = None;
    let mut path = None;
    for arg in args {
        match *arg {
            "--overwrite" | "-f" => policy = Some(OverwritePolicy::Overwrite),
            "--if-newer" | "-u" => policy = Some(OverwritePolicy::OverwriteIfNewer),
            flag if flag.starts_with("--policy=") => policy = Some(flag["--policy=".len()..].parse()?),
            flag if flag.starts_with('-') => {
                return Err(Error::InvalidCommand(format!("Unknown flag: {flag}")));
            }
            other if path.is_none() => path = Some(PathBuf::from(other)),
            other => return Err(Error::InvalidCommand(format!("Unexpected argument: {other}"))),
        }
    }
    if needs_path && path.is_none() {
        return Err(Error::InvalidCommand(format!("{kind} needs a local path")));
    }
    Ok(Command::Execute {
        kind,
        policy,
        local_path: path,
    })
}

/// Parse one line; blank lines and `#` comments yield `None`
pub fn parse_line(line: &str) -> Result<Option<Input>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }

    // `/text` searches, like a pager
    if let Some(needle) = line.strip_prefix('/') {
        return Ok(Some(Input::Command(Command::Search(needle.trim().to_string()))));
    }

    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };
    let args: Vec<&str> = rest.split_whitespace().collect();
    let first = args.first().copied();

    let command = match word {
        "j" | "down" => Command::MoveCursor(count(first)?),
        "k" | "up" => Command::MoveCursor(-count(first)?),
        "top" | "g" => Command::CursorTop,
        "bottom" | "G" => Command::CursorBottom,
        "enter" | "open" | "l" => Command::Enter,
        ".." | "parent" | "h" => Command::Parent,
        "back" | "b" => Command::Back,
        "cd" | "goto" => Command::GoTo(rest.to_string()),
        "tab" => Command::SwitchPane,
        "space" | "sel" | "s" => Command::ToggleSelect,
        "all" => Command::SelectAll,
        "none" => Command::DeselectAll,
        "match" => Command::SelectPattern(required(first, "pattern")?.to_string()),
        "find" => Command::Search(rest.to_string()),
        "clear" => Command::ClearFilter,
        "cp" | "copy" => transfer(TransferKind::Copy, &args, false)?,
        "mv" | "move" => transfer(TransferKind::Move, &args, false)?,
        "rm" | "del" | "delete" => transfer(TransferKind::Delete, &args, false)?,
        "get" | "download" => transfer(TransferKind::Download, &args, true)?,
        "put" | "upload" => transfer(TransferKind::Upload, &args, true)?,
        "y" | "yes" => Command::Confirm,
        "n" | "no" | "cancel" => Command::Cancel,
        "r" | "refresh" => Command::Refresh,
        "mb" => Command::CreateBucket {
            name: required(first, "bucket name")?.to_string(),
            region: args.get(1).map(|r| r.to_string()),
        },
        "rb" => Command::DeleteBucket(first.map(str::to_string)),
        "mkdir" => Command::CreateFolder(required(first, "folder name")?.to_string()),
        "rename" => Command::Rename(required(first, "new name")?.to_string()),
        "view" | "cat" => Command::View,
        "ls" | "show" => return Ok(Some(Input::Show)),
        "wait" => return Ok(Some(Input::Wait)),
        "help" | "?" => return Ok(Some(Input::Help)),
        "q" | "quit" | "exit" => return Ok(Some(Input::Quit)),
        other => return Err(Error::InvalidCommand(format!("Unknown command: {other} (try 'help')"))),
    };
    Ok(Some(Input::Command(command)))
}

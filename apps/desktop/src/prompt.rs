use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptCommand {
    Talk,
    Over,
    Send(PathBuf),
    Mute(String),
    Unmute(String),
    Toggle(String),
    Who,
    CatchUp,
    Stop,
    Close,
    Quit,
}

pub const USAGE: &str =
    "commands: talk | over | send <path> | mute <user> | unmute <user> | toggle <user> | who | catchup | stop | close | quit";

/// Parses one prompt line. Blank lines yield `Ok(None)`.
pub fn parse(line: &str) -> Result<Option<PromptCommand>, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };
    let argument = |name: &str| {
        if rest.is_empty() {
            Err(format!("{word} needs a {name}"))
        } else {
            Ok(rest.to_string())
        }
    };
    let command = match word.to_ascii_lowercase().as_str() {
        "talk" => PromptCommand::Talk,
        "over" => PromptCommand::Over,
        "send" => PromptCommand::Send(PathBuf::from(argument("path")?)),
        "mute" => PromptCommand::Mute(argument("username")?),
        "unmute" => PromptCommand::Unmute(argument("username")?),
        "toggle" => PromptCommand::Toggle(argument("username")?),
        "who" => PromptCommand::Who,
        "catchup" => PromptCommand::CatchUp,
        "stop" => PromptCommand::Stop,
        "close" => PromptCommand::Close,
        "quit" | "exit" => PromptCommand::Quit,
        other => return Err(format!("unknown command '{other}'")),
    };
    Ok(Some(command))
}

#[cfg(test)]
#[path = "tests/prompt_tests.rs"]
mod tests;

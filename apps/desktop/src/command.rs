use std::path::Path;

use tokio::process::Command;

/// Splits a command template on whitespace and substitutes `{file}`.
///
/// Templates without a placeholder get the path appended.
pub fn build_command(template: &str, file: &Path) -> Option<Command> {
    let file = file.to_string_lossy();
    let mut parts = template.split_whitespace();
    let program = parts.next()?;
    let mut args: Vec<String> = parts.map(|arg| arg.replace("{file}", &file)).collect();
    if !template.contains("{file}") {
        args.push(file.into_owned());
    }
    let mut command = Command::new(program);
    command.args(args).kill_on_drop(true);
    Some(command)
}

#[cfg(test)]
#[path = "tests/command_tests.rs"]
mod tests;

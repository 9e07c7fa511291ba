use vg_core::command::{display_command, CommandOutput, CommandRunner};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum HelperError {
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("{}", command_failed_message(.command, .code, .details))]
    CommandFailed {
        command: String,
        code: Option<i32>,
        details: String,
    },

    #[error("{0}")]
    Launch(String),

    #[error("wifi interface not found")]
    InterfaceNotFound,

    #[error("could not parse {0} output")]
    ParseFailed(&'static str),
}

fn command_failed_message(command: &str, code: &Option<i32>, details: &str) -> String {
    let code = code.map_or_else(|| "signal".to_string(), |c| c.to_string());
    if details.is_empty() {
        format!("command failed (code: {code}): {command}")
    } else {
        format!("command failed (code: {code}): {details} [{command}]")
    }
}

pub type Result<T> = std::result::Result<T, HelperError>;

/// Run a command and require a zero exit status.
pub(crate) async fn run_checked(
    runner: &dyn CommandRunner,
    program: &str,
    args: &[&str],
    timeout: std::time::Duration,
) -> Result<CommandOutput> {
    let output = runner
        .run(program, args, timeout)
        .await
        .map_err(HelperError::Launch)?;
    if !output.success() {
        return Err(HelperError::CommandFailed {
            command: display_command(program, args),
            code: output.status,
            details: output.stderr.trim().to_string(),
        });
    }
    Ok(output)
}

//! Translation of a [`ClientConfig`] into CLI arguments.
//!
//! This is the only place that knows the CLI's flag vocabulary. It is a pure
//! function: no I/O, and the same config always yields the same arguments.

use std::collections::HashSet;

use super::builder::ClientConfig;
use super::options::PermissionMode;
use crate::{Error, Result};

/// Build CLI arguments for a config.
///
/// Empty or zero-valued options are omitted rather than emitted as
/// empty-valued flags. The only failures are contradictions: an unknown
/// permission mode, or a tool that is both allowed and disallowed.
///
/// The prompt is not included; the orchestrator appends it (or pipes it to
/// stdin when it is too long for the command line).
pub fn build_args(config: &ClientConfig) -> Result<Vec<String>> {
    let mut args = vec!["--print".to_string()];

    if let Some(ref model) = config.model {
        push_flag(&mut args, "--model", model.to_string());
    }

    if let Some(prompt) = non_empty(config.system_prompt.as_deref()) {
        push_flag(&mut args, "--system-prompt", prompt);
    }

    if let Some(prompt) = non_empty(config.append_system_prompt.as_deref()) {
        push_flag(&mut args, "--append-system-prompt", prompt);
    }

    if config.max_turns > 0 {
        push_flag(&mut args, "--max-turns", config.max_turns.to_string());
    }

    if let Some(mode) = non_empty(config.permission_mode.as_deref()) {
        let mode: PermissionMode = mode.parse()?;
        if mode != PermissionMode::Default {
            push_flag(&mut args, "--permission-mode", mode.as_str());
        }
    }

    let allowed = tool_list(&config.allowed_tools);
    let disallowed = tool_list(&config.disallowed_tools);
    let disallowed_set: HashSet<&str> = disallowed.iter().copied().collect();
    if let Some(conflict) = allowed.iter().find(|t| disallowed_set.contains(*t)) {
        return Err(Error::InvalidConfig(format!(
            "tool {conflict:?} is both allowed and disallowed"
        )));
    }
    if !allowed.is_empty() {
        push_flag(&mut args, "--allowedTools", allowed.join(","));
    }
    if !disallowed.is_empty() {
        push_flag(&mut args, "--disallowedTools", disallowed.join(","));
    }

    if let Some(ref path) = config.mcp_config {
        push_flag(&mut args, "--mcp-config", path.display().to_string());
    }

    match config.session_id.as_ref().filter(|id| !id.as_str().is_empty()) {
        Some(id) if config.resume => push_flag(&mut args, "--resume", id.as_str()),
        Some(id) => push_flag(&mut args, "--session-id", id.as_str()),
        None if config.continue_session => args.push("--continue".to_string()),
        None => {}
    }

    Ok(args)
}

fn push_flag(args: &mut Vec<String>, flag: &str, value: impl Into<String>) {
    args.push(flag.to_string());
    args.push(value.into());
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

fn tool_list(tools: &[String]) -> Vec<&str> {
    tools
        .iter()
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::config::{tools, Model, SessionId};

    fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
        let idx = args.iter().position(|a| a == flag)?;
        args.get(idx + 1).map(String::as_str)
    }

    #[test]
    fn build_args_basic() {
        let args = build_args(&ClientConfig::default()).unwrap();
        assert_eq!(args, vec!["--print".to_string()]);
    }

    #[test]
    fn build_args_is_deterministic() {
        let config = ClientConfig::builder()
            .model(Model::Opus)
            .allowed_tools(["Read", "Grep"])
            .max_turns(3)
            .build()
            .unwrap();
        assert_eq!(build_args(&config).unwrap(), build_args(&config).unwrap());
    }

    #[test]
    fn build_args_full_order() {
        let config = ClientConfig::builder()
            .model(Model::Opus)
            .system_prompt("Be terse")
            .append_system_prompt("Use British spelling")
            .max_turns(5)
            .permission_mode(PermissionMode::AcceptEdits)
            .allowed_tools(["Read", "Write"])
            .disallowed_tools(["Bash"])
            .mcp_config("/tmp/mcp.json")
            .session_id("abc")
            .build()
            .unwrap();

        let args = build_args(&config).unwrap();
        assert_eq!(
            args,
            [
                "--print",
                "--model",
                "opus",
                "--system-prompt",
                "Be terse",
                "--append-system-prompt",
                "Use British spelling",
                "--max-turns",
                "5",
                "--permission-mode",
                "acceptEdits",
                "--allowedTools",
                "Read,Write",
                "--disallowedTools",
                "Bash",
                "--mcp-config",
                "/tmp/mcp.json",
                "--session-id",
                "abc",
            ]
        );
    }

    #[test]
    fn empty_values_are_omitted() {
        let config = ClientConfig::builder()
            .system_prompt("   ")
            .max_turns(0)
            .allowed_tools(Vec::<String>::new())
            .disallowed_tools([""])
            .permission_mode("")
            .session_id("")
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap();

        let args = build_args(&config).unwrap();
        assert_eq!(args, vec!["--print".to_string()]);
    }

    #[test]
    fn default_permission_mode_adds_no_flag() {
        let config = ClientConfig::builder()
            .permission_mode(PermissionMode::Default)
            .build()
            .unwrap();
        let args = build_args(&config).unwrap();
        assert!(!args.contains(&"--permission-mode".to_string()));
    }

    #[test]
    fn unknown_permission_mode_is_rejected() {
        let config = ClientConfig::builder()
            .permission_mode("dangerouslyEverything")
            .build()
            .unwrap();
        assert!(matches!(build_args(&config), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn builtin_tool_names_become_tool_flags() {
        let config = ClientConfig::builder()
            .allowed_tools([tools::READ, tools::GREP, tools::GLOB])
            .disallowed_tools([tools::BASH, tools::WEB_FETCH])
            .build()
            .unwrap();
        let args = build_args(&config).unwrap();
        assert_eq!(flag_value(&args, "--allowedTools"), Some("Read,Grep,Glob"));
        assert_eq!(flag_value(&args, "--disallowedTools"), Some("Bash,WebFetch"));

        let config = ClientConfig::builder()
            .allowed_tools([tools::EDIT, " Write "])
            .disallowed_tools([tools::WRITE])
            .build()
            .unwrap();
        let err = build_args(&config).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(msg) if msg.contains(tools::WRITE)));
    }

    #[test]
    fn conflicting_tool_lists_are_rejected() {
        let config = ClientConfig::builder()
            .allowed_tools(["Read", "Bash"])
            .disallowed_tools(["Bash"])
            .build()
            .unwrap();
        let err = build_args(&config).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(msg) if msg.contains("Bash")));
    }

    #[test]
    fn resume_selects_resume_flag() {
        let config = ClientConfig::builder()
            .session_id(SessionId::new("s-42"))
            .resume(true)
            .continue_session(true)
            .build()
            .unwrap();
        let args = build_args(&config).unwrap();
        assert_eq!(flag_value(&args, "--resume"), Some("s-42"));
        assert!(!args.contains(&"--session-id".to_string()));
        // An explicit session wins over --continue.
        assert!(!args.contains(&"--continue".to_string()));
    }

    #[test]
    fn continue_without_session_id() {
        let config = ClientConfig::builder()
            .continue_session(true)
            .build()
            .unwrap();
        let args = build_args(&config).unwrap();
        assert!(args.contains(&"--continue".to_string()));
    }

    #[test]
    fn timeout_and_working_directory_are_not_flags() {
        let config = ClientConfig::builder()
            .timeout(Duration::from_secs(5))
            .working_directory("/tmp")
            .build()
            .unwrap();
        let args = build_args(&config).unwrap();
        assert_eq!(args.len(), 1);
    }

    #[test]
    fn custom_model_passes_through() {
        let config = ClientConfig::builder()
            .model("claude-sonnet-4-5-20250929")
            .build()
            .unwrap();
        let args = build_args(&config).unwrap();
        assert_eq!(flag_value(&args, "--model"), Some("claude-sonnet-4-5-20250929"));
    }
}

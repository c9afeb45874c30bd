use std::{fs, path::Path, path::PathBuf};

use anyhow::Context;

use datachat_core::domain::Message;

pub const BANNER: &str = "AI Data Assistant: ask about AQI, COVID stats, literacy rates or crime data. /help for commands.";

pub const HELP: &str = "\
Type a question and press Enter.

/history         show the whole conversation
/export <path>   write the conversation as JSON
/quit            leave";

/// One line of terminal input.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Input {
    /// Free text, passed to the assistant verbatim.
    Text(String),
    Command(Command),
    /// Empty or whitespace-only line; nothing to send.
    Blank,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    Help,
    History,
    Export(PathBuf),
    Quit,
    Usage(&'static str),
    Unknown(String),
}

pub fn parse(line: &str) -> Input {
    if line.trim().is_empty() {
        return Input::Blank;
    }
    let Some(rest) = line.trim_start().strip_prefix('/') else {
        return Input::Text(line.to_string());
    };

    let (name, args) = match rest.split_once(char::is_whitespace) {
        Some((name, args)) => (name, args.trim()),
        None => (rest.trim(), ""),
    };

    let cmd = match name.to_lowercase().as_str() {
        "help" | "?" => Command::Help,
        "history" => Command::History,
        "export" if args.is_empty() => Command::Usage("/export <path>"),
        "export" => Command::Export(PathBuf::from(args)),
        "quit" | "exit" => Command::Quit,
        _ => Command::Unknown(name.to_string()),
    };
    Input::Command(cmd)
}

pub fn export_transcript(messages: &[Message], path: &Path) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(messages).context("failed to encode transcript")?;
    fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use datachat_core::domain::{MessageId, Sender};

    #[test]
    fn plain_text_is_kept_verbatim() {
        assert_eq!(
            parse("  what's the AQI?  "),
            Input::Text("  what's the AQI?  ".to_string())
        );
    }

    #[test]
    fn blank_lines_are_skipped() {
        for line in ["", "   ", "\t", " \t  "] {
            assert_eq!(parse(line), Input::Blank, "line: {line:?}");
        }
    }

    #[test]
    fn slash_commands_parse() {
        assert_eq!(parse("/help"), Input::Command(Command::Help));
        assert_eq!(parse(" /HISTORY"), Input::Command(Command::History));
        assert_eq!(parse("/exit"), Input::Command(Command::Quit));
        assert_eq!(
            parse("/export  /tmp/chat log.json "),
            Input::Command(Command::Export(PathBuf::from("/tmp/chat log.json")))
        );
        assert_eq!(
            parse("/export"),
            Input::Command(Command::Usage("/export <path>"))
        );
        assert_eq!(
            parse("/stats now"),
            Input::Command(Command::Unknown("stats".to_string()))
        );
    }

    #[test]
    fn export_writes_json_array() {
        let path = std::env::temp_dir().join(format!("datachat-export-{}.json", std::process::id()));
        let messages = vec![
            Message {
                id: MessageId(1),
                content: "aqi?".to_string(),
                sender: Sender::User,
                timestamp: Utc::now(),
            },
            Message {
                id: MessageId(2),
                content: "156".to_string(),
                sender: Sender::Bot,
                timestamp: Utc::now(),
            },
        ];

        export_transcript(&messages, &path).unwrap();
        let raw = std::fs::read_to_string(&path).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value[0]["sender"], "user");
        assert_eq!(value[1]["id"], 2);
        assert_eq!(value[1]["content"], "156");

        let back: Vec<Message> = serde_json::from_str(&raw).unwrap();
        assert_eq!(back, messages);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn export_to_missing_dir_reports_path() {
        let err = export_transcript(&[], Path::new("/nonexistent-dir/x.json")).unwrap_err();
        assert!(format!("{err:#}").contains("/nonexistent-dir/x.json"));
    }
}

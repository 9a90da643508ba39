/// Line commands read from stdin, one per `SessionController` operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Start logging; falls back to the configured sensor name
    Start(Option<String>),
    Stop,
    Foreground,
    Background,
    Status,
    Quit,
}

const USAGE: &str = "start [name], stop, foreground, background, status, quit";

impl Command {
    pub fn parse(line: &str) -> Result<Option<Command>, String> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }

        let (verb, rest) = match line.split_once(char::is_whitespace) {
            Some((verb, rest)) => (verb, rest.trim()),
            None => (line, ""),
        };

        let command = match verb.to_lowercase().as_str() {
            "start" => Command::Start((!rest.is_empty()).then(|| rest.to_string())),
            "stop" => Command::Stop,
            "foreground" | "fg" => Command::Foreground,
            "background" | "bg" => Command::Background,
            "status" => Command::Status,
            "quit" | "exit" => Command::Quit,
            other => {
                return Err(format!("Unknown command '{}' ({})", other, USAGE));
            }
        };

        Ok(Some(command))
    }
}

use anyhow::{anyhow, Result};
use rustyline::error::ReadlineError;
use rustyline::{Config, DefaultEditor, EditMode};

pub enum ReadOutcome {
    Line(String),
    Interrupted,
    Eof,
}

pub struct Terminal {
    editor: DefaultEditor,
}

impl Terminal {
    pub fn new() -> Self {
        let config = Config::builder()
            .edit_mode(EditMode::Emacs)
            .auto_add_history(false)
            .build();

        let editor =
            DefaultEditor::with_config(config).unwrap_or_else(|_| DefaultEditor::new().unwrap());

        Terminal { editor }
    }

    /// Reads one line of input. Ctrl+C at the prompt discards the line,
    /// end of input is surfaced to the caller to shut the shell down.
    pub fn read_line(&mut self, prompt: &str) -> Result<ReadOutcome> {
        match self.editor.readline(prompt) {
            Ok(line) => {
                if !line.trim().is_empty() {
                    let _ = self.editor.add_history_entry(line.as_str());
                }
                Ok(ReadOutcome::Line(line))
            }
            Err(ReadlineError::Interrupted) => Ok(ReadOutcome::Interrupted),
            Err(ReadlineError::Eof) => Ok(ReadOutcome::Eof),
            Err(err) => Err(anyhow!("error reading input: {}", err)),
        }
    }
}

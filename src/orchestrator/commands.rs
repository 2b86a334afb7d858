use super::*;

use std::io::BufRead;

/// Validated, non-empty list of configuration lines for the CLI stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct CommandSet {
    lines: Vec<String>,
}

fn is_commit(line: &str) -> bool {
    line.split_whitespace().next() == Some("commit")
}

impl CommandSet {
    /// Parses one command per line, skipping blank lines.
    ///
    /// A set with no lines, or whose only lines are commits, is rejected.
    pub fn parse(text: &str) -> Result<Self, VerifyError> {
        let lines = text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect::<Vec<_>>();

        if lines.iter().all(|l| is_commit(l)) {
            return Err(VerifyError::EmptyCommandSet);
        }
        Ok(Self { lines })
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, VerifyError> {
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text)
    }

    /// Reads lines until one containing `commit`, which is kept, or EOF.
    pub fn read_interactive<R: BufRead>(reader: R) -> Result<Self, VerifyError> {
        let mut text = String::new();
        for line in reader.lines() {
            let line = line?;
            text.push_str(&line);
            text.push('\n');
            if line.contains("commit") {
                break;
            }
        }
        Self::parse(&text)
    }

    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().map(|l| l.as_str())
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

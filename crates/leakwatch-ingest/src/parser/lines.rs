//! Line-oriented credential grammars for `.txt` / `.csv` dumps
//!
//! Grammars are tried in order. The first one whose trigger matches a line
//! owns it: if that grammar then rejects the line, no later grammar sees it.
//! With the default order this means a line holding `:`, `;` and `@` is only
//! ever read as `email:password`.

use super::{FileParser, ParseContext};
use crate::models::{ContentType, ExtractedFile, Record};

/// Fields pulled out of one line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineMatch {
    pub content_type: ContentType,
    pub email: String,
    pub password: String,
    pub additional_data: String,
}

pub trait LineGrammar: Send + Sync {
    /// Whether this grammar claims the (trimmed) line
    fn triggers(&self, line: &str) -> bool;

    /// Parse a claimed line; `None` when the email candidate has no `@`
    fn parse(&self, line: &str) -> Option<LineMatch>;
}

/// `email:password`, split on the first `:`
#[derive(Debug, Default, Clone, Copy)]
pub struct ColonGrammar;

impl LineGrammar for ColonGrammar {
    fn triggers(&self, line: &str) -> bool {
        line.contains(':') && line.contains('@')
    }

    fn parse(&self, line: &str) -> Option<LineMatch> {
        let (email, password) = line.split_once(':')?;
        let email = email.trim();
        if !email.contains('@') {
            return None;
        }
        Some(LineMatch {
            content_type: ContentType::EmailPassword,
            email: email.to_string(),
            password: password.trim().to_string(),
            additional_data: String::new(),
        })
    }
}

/// `email;password;info...`, split on every `;`
#[derive(Debug, Default, Clone, Copy)]
pub struct SemicolonGrammar;

impl LineGrammar for SemicolonGrammar {
    fn triggers(&self, line: &str) -> bool {
        line.contains(';') && line.contains('@')
    }

    fn parse(&self, line: &str) -> Option<LineMatch> {
        let parts: Vec<&str> = line.split(';').collect();
        if parts.len() < 2 {
            return None;
        }
        let email = parts[0].trim();
        if !email.contains('@') {
            return None;
        }
        Some(LineMatch {
            content_type: ContentType::EmailPasswordInfo,
            email: email.to_string(),
            password: parts[1].trim().to_string(),
            additional_data: parts[2..].join(";"),
        })
    }
}

/// Apply `grammars` in order to one raw line
pub fn match_line(grammars: &[Box<dyn LineGrammar>], line: &str) -> Option<LineMatch> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    grammars
        .iter()
        .find(|grammar| grammar.triggers(line))
        .and_then(|grammar| grammar.parse(line))
}

/// [`FileParser`] for plain-text dumps
pub struct LineParser {
    grammars: Vec<Box<dyn LineGrammar>>,
}

impl Default for LineParser {
    fn default() -> Self {
        Self {
            grammars: vec![Box::new(ColonGrammar), Box::new(SemicolonGrammar)],
        }
    }
}

impl LineParser {
    pub fn with_grammars(grammars: Vec<Box<dyn LineGrammar>>) -> Self {
        Self { grammars }
    }

    pub fn match_line(&self, line: &str) -> Option<LineMatch> {
        match_line(&self.grammars, line)
    }
}

impl FileParser for LineParser {
    fn name(&self) -> &'static str {
        "lines"
    }

    fn suffixes(&self) -> &'static [&'static str] {
        &[".txt", ".csv"]
    }

    fn parse_file(&self, file: &ExtractedFile, ctx: &ParseContext<'_>) -> Vec<Record> {
        file.content
            .lines()
            .filter_map(|line| self.match_line(line))
            .filter_map(|m| {
                Record::new(
                    m.email,
                    m.password,
                    m.additional_data,
                    m.content_type,
                    file.inner_filename.as_str(),
                    ctx.message_id.clone(),
                    ctx.parsed_at,
                )
            })
            .collect()
    }
}

use std::fmt;

use winnow::{
    combinator::{alt, delimited, preceded, rest, separated_pair},
    token::{one_of, take_till},
    PResult, Parser,
};

#[derive(Debug, PartialEq, Clone)]
pub enum Line {
    Section(String),
    Entry { key: String, value: String },
    Comment,
}

#[derive(Debug, PartialEq)]
pub struct ParseIniError {
    pub line: usize,
    pub message: String,
}

impl fmt::Display for ParseIniError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {}", self.line, self.message)
    }
}

impl std::error::Error for ParseIniError {}

pub fn parse_section(input: &mut &str) -> PResult<Line> {
    delimited('[', take_till(1.., ']'), ']')
        .map(|name: &str| Line::Section(name.trim().to_owned()))
        .parse_next(input)
}

pub fn parse_comment(input: &mut &str) -> PResult<Line> {
    preceded(one_of(['#', ';']), rest)
        .value(Line::Comment)
        .parse_next(input)
}

/// `key = value` or `key: value`; the first delimiter on the line wins.
pub fn parse_entry(input: &mut &str) -> PResult<Line> {
    separated_pair(
        take_till(1.., ['=', ':']).verify(|key: &str| !key.trim().is_empty()),
        one_of(['=', ':']),
        rest,
    )
    .map(|(key, value): (&str, &str)| Line::Entry {
        key: key.trim().to_owned(),
        value: value.trim().to_owned(),
    })
    .parse_next(input)
}

pub fn parse_line(input: &str) -> Result<Line, String> {
    let input = input.trim();
    if input.is_empty() {
        return Ok(Line::Comment);
    }

    alt((parse_section, parse_comment, parse_entry))
        .parse(input)
        .map_err(|error| error.to_string())
}

type Entries = Vec<(String, String)>;

/// Flat `[SECTION]` / `key = value` document.
///
/// Sections keep their order of appearance so that a document which is read
/// and written back keeps its layout. Key lookups are case-insensitive, section
/// names are not.
#[derive(Debug, Default, PartialEq, Clone)]
pub struct IniDocument {
    sections: Vec<(String, Entries)>,
}

impl IniDocument {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parse(input: &str) -> Result<Self, ParseIniError> {
        let mut document = Self::new();
        let mut current: Option<usize> = None;

        for (index, raw) in input.lines().enumerate() {
            let line = parse_line(raw).map_err(|message| ParseIniError {
                line: index + 1,
                message,
            })?;

            match line {
                Line::Comment => continue,
                Line::Section(name) => current = Some(document.section_index(&name)),
                Line::Entry { key, value } => {
                    let Some(section) = current else {
                        return Err(ParseIniError {
                            line: index + 1,
                            message: format!("`{key}` appears before any [SECTION] header"),
                        });
                    };

                    document.sections[section].1.push((key, value));
                }
            }
        }

        Ok(document)
    }

    pub fn has_section(&self, section: &str) -> bool {
        self.sections.iter().any(|(name, _)| name == section)
    }

    /// Last value written for `key` in `section`, if any.
    pub fn get(&self, section: &str, key: &str) -> Option<&str> {
        self.sections
            .iter()
            .filter(|(name, _)| name == section)
            .flat_map(|(_, entries)| entries.iter())
            .rev()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    pub fn set(&mut self, section: &str, key: &str, value: impl Into<String>) {
        let index = self.section_index(section);
        let entries = &mut self.sections[index].1;
        let value = value.into();

        match entries.iter_mut().find(|(k, _)| k.eq_ignore_ascii_case(key)) {
            Some(entry) => entry.1 = value,
            None => entries.push((key.to_owned(), value)),
        }
    }

    fn section_index(&mut self, section: &str) -> usize {
        if let Some(index) = self.sections.iter().position(|(name, _)| name == section) {
            return index;
        }

        self.sections.push((section.to_owned(), Vec::new()));
        self.sections.len() - 1
    }
}

impl fmt::Display for IniDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, (name, entries)) in self.sections.iter().enumerate() {
            if index > 0 {
                writeln!(f)?;
            }

            writeln!(f, "[{name}]")?;
            for (key, value) in entries {
                if value.is_empty() {
                    writeln!(f, "{key} =")?;
                } else {
                    writeln!(f, "{key} = {value}")?;
                }
            }
        }

        Ok(())
    }
}

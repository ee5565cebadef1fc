//! Script text parser
//!
//! Parses the tag syntax of a statement template into a light element tree.
//! Only the subset needed by templates is understood: elements with quoted
//! attributes, self-closing tags, character entities, CDATA sections and
//! comments. A `<` that does not open a tag (`a < b`, `x <= 1`) is text.

use crate::error::{Result, ScriptError};

/// Parsed template markup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XNode {
    /// Character data with entities decoded
    Text(String),
    Element(XElement),
}

/// A tag with its attributes and children
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XElement {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<XNode>,
    /// Line of the opening tag
    pub line: usize,
}

impl XElement {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            children: Vec::new(),
            line: 1,
        }
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Concatenated text of all descendants
    pub fn text(&self) -> String {
        let mut out = String::new();
        collect_text(&self.children, &mut out);
        out
    }
}

fn collect_text(nodes: &[XNode], out: &mut String) {
    for node in nodes {
        match node {
            XNode::Text(text) => out.push_str(text),
            XNode::Element(element) => collect_text(&element.children, out),
        }
    }
}

/// Parse template markup into a node list
pub fn parse(content: &str) -> Result<Vec<XNode>> {
    let mut parser = Parser::new(content);
    parser.parse_nodes(None)
}

/// Internal parser state machine
struct Parser {
    chars: Vec<char>,
    position: usize,
    line: usize,
}

impl Parser {
    fn new(content: &str) -> Self {
        Self {
            chars: content.chars().collect(),
            position: 0,
            line: 1,
        }
    }

    /// Parse children until the closing tag of `parent` (or end of input at
    /// the top level)
    fn parse_nodes(&mut self, parent: Option<&str>) -> Result<Vec<XNode>> {
        let mut nodes = Vec::new();
        let mut text = String::new();

        while self.peek_char().is_some() {
            if self.starts_with("</") {
                let line = self.line;
                self.consume_string("</")?;
                let name = self.read_name();
                self.skip_whitespace();
                self.consume_string(">")?;
                return match parent {
                    Some(expected) if expected == name => {
                        flush_text(&mut text, &mut nodes);
                        Ok(nodes)
                    }
                    Some(expected) => Err(self.error_at(
                        line,
                        format!("Expected </{}> but found </{}>", expected, name),
                    )),
                    None => Err(self.error_at(line, format!("Unexpected closing tag </{}>", name))),
                };
            }

            if self.starts_with("<!--") {
                self.consume_string("<!--")?;
                self.read_until_string("-->")?;
                self.consume_string("-->")?;
                continue;
            }

            if self.starts_with("<![CDATA[") {
                self.consume_string("<![CDATA[")?;
                text.push_str(&self.read_until_string("]]>")?);
                self.consume_string("]]>")?;
                continue;
            }

            if self.peek_char() == Some('<') && self.peek_ahead(1).map_or(false, is_name_start) {
                flush_text(&mut text, &mut nodes);
                nodes.push(XNode::Element(self.parse_element()?));
                continue;
            }

            if self.peek_char() == Some('&') {
                text.push(self.parse_entity()?);
                continue;
            }

            text.push(self.consume_char()?);
        }

        match parent {
            Some(name) => Err(self.error(format!("Unclosed element <{}>", name))),
            None => {
                flush_text(&mut text, &mut nodes);
                Ok(nodes)
            }
        }
    }

    fn parse_element(&mut self) -> Result<XElement> {
        let line = self.line;
        self.consume_string("<")?;
        let mut element = XElement::new(self.read_name());
        element.line = line;

        loop {
            self.skip_whitespace();
            match self.peek_char() {
                Some('/') => {
                    self.consume_string("/>")?;
                    return Ok(element);
                }
                Some('>') => {
                    self.consume_char()?;
                    break;
                }
                Some(c) if is_name_start(c) => {
                    let (key, value) = self.parse_attribute()?;
                    if element.attribute(&key).is_some() {
                        return Err(self.error(format!(
                            "Duplicate attribute '{}' on <{}>",
                            key, element.name
                        )));
                    }
                    element.attributes.push((key, value));
                }
                Some(c) => {
                    return Err(self.error(format!(
                        "Unexpected character '{}' in <{}>",
                        c, element.name
                    )))
                }
                None => return Err(self.error(format!("Unterminated tag <{}>", element.name))),
            }
        }

        let name = element.name.clone();
        element.children = self.parse_nodes(Some(&name))?;
        Ok(element)
    }

    fn parse_attribute(&mut self) -> Result<(String, String)> {
        let key = self.read_name();
        self.skip_whitespace();
        self.consume_string("=")
            .map_err(|_| self.error(format!("Attribute '{}' has no value", key)))?;
        self.skip_whitespace();

        let quote = match self.peek_char() {
            Some(q @ ('"' | '\'')) => q,
            _ => return Err(self.error(format!("Attribute '{}' value must be quoted", key))),
        };
        self.consume_char()?;

        let mut value = String::new();
        loop {
            match self.peek_char() {
                Some(c) if c == quote => {
                    self.consume_char()?;
                    return Ok((key, value));
                }
                Some('&') => value.push(self.parse_entity()?),
                Some(_) => value.push(self.consume_char()?),
                None => return Err(self.error(format!("Unterminated value of '{}'", key))),
            }
        }
    }

    fn parse_entity(&mut self) -> Result<char> {
        self.consume_string("&")?;
        let mut name = String::new();
        loop {
            match self.peek_char() {
                Some(';') => {
                    self.consume_char()?;
                    break;
                }
                Some(c) if c.is_ascii_alphanumeric() || c == '#' => {
                    name.push(self.consume_char()?);
                }
                _ => return Err(self.error(format!("Unterminated entity '&{}'", name))),
            }
        }

        let decoded = match name.as_str() {
            "lt" => Some('<'),
            "gt" => Some('>'),
            "amp" => Some('&'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            numeric => numeric.strip_prefix('#').and_then(|code| {
                let point = match code.strip_prefix('x').or_else(|| code.strip_prefix('X')) {
                    Some(hex) => u32::from_str_radix(hex, 16).ok(),
                    None => code.parse().ok(),
                };
                point.and_then(char::from_u32)
            }),
        };
        decoded.ok_or_else(|| self.error(format!("Unknown entity '&{};'", name)))
    }

    fn read_name(&mut self) -> String {
        let mut name = String::new();
        while let Some(c) = self.peek_char() {
            if c.is_alphanumeric() || matches!(c, '_' | '-' | ':' | '.') {
                name.push(c);
                self.position += 1;
            } else {
                break;
            }
        }
        name
    }

    fn read_until_string(&mut self, delimiter: &str) -> Result<String> {
        let mut result = String::new();
        while self.peek_char().is_some() {
            if self.starts_with(delimiter) {
                return Ok(result);
            }
            result.push(self.consume_char()?);
        }
        Err(self.error(format!("Unterminated section, expected '{}'", delimiter)))
    }

    fn starts_with(&self, s: &str) -> bool {
        s.chars()
            .enumerate()
            .all(|(i, c)| self.peek_ahead(i) == Some(c))
    }

    fn peek_char(&self) -> Option<char> {
        self.chars.get(self.position).copied()
    }

    fn peek_ahead(&self, offset: usize) -> Option<char> {
        self.chars.get(self.position + offset).copied()
    }

    fn consume_char(&mut self) -> Result<char> {
        match self.peek_char() {
            Some(ch) => {
                self.position += 1;
                if ch == '\n' {
                    self.line += 1;
                }
                Ok(ch)
            }
            None => Err(self.error("Unexpected end of template")),
        }
    }

    fn consume_string(&mut self, s: &str) -> Result<()> {
        for ch in s.chars() {
            if self.consume_char()? != ch {
                return Err(self.error(format!("Expected '{}'", s)));
            }
        }
        Ok(())
    }

    fn skip_whitespace(&mut self) {
        while self.peek_char().map_or(false, char::is_whitespace) {
            let _ = self.consume_char();
        }
    }

    fn error(&self, message: impl Into<String>) -> ScriptError {
        self.error_at(self.line, message)
    }

    fn error_at(&self, line: usize, message: impl Into<String>) -> ScriptError {
        ScriptError::Parse {
            line,
            message: message.into(),
        }
    }
}

fn is_name_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn flush_text(text: &mut String, nodes: &mut Vec<XNode>) {
    if !text.is_empty() {
        nodes.push(XNode::Text(std::mem::take(text)));
    }
}

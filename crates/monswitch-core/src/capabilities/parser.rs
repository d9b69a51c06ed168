//! Recursive-descent parser for the capabilities grammar.
//!
//! The parser walks the input bytes with a single cursor.  Structural tokens
//! are all ASCII, so every position at which an error is reported is a UTF-8
//! character boundary.

use std::collections::BTreeMap;

use tracing::debug;

use super::{CapabilitiesError, VcpComponent};

/// One top-level component of the capabilities list.
#[derive(Debug)]
pub(super) enum Component {
    /// Any component other than `vcp`; only the name is kept.
    Generic(String),
    /// The `vcp(...)` component.
    Vcp(VcpComponent),
}

/// Parses the root list and returns its components in order.
pub(super) fn parse_components(input: &str) -> Result<Vec<Component>, CapabilitiesError> {
    let mut parser = Parser { input, pos: 0 };
    let components = parser.capabilities()?;
    parser.finish()?;
    Ok(components)
}

struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

fn is_name_byte(byte: u8) -> bool {
    byte.is_ascii_lowercase() || byte == b'_'
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<u8> {
        self.input.as_bytes().get(self.pos).copied()
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(), Some(b) if b.is_ascii_whitespace()) {
            self.pos += 1;
        }
    }

    fn unexpected(&self, expected: &'static str) -> CapabilitiesError {
        match self.input.get(self.pos..).and_then(|rest| rest.chars().next()) {
            Some(found) => CapabilitiesError::UnexpectedChar {
                offset: self.pos,
                found,
                expected,
            },
            None => CapabilitiesError::UnexpectedEnd {
                offset: self.pos,
                expected,
            },
        }
    }

    fn expect(&mut self, byte: u8, expected: &'static str) -> Result<(), CapabilitiesError> {
        self.skip_whitespace();
        if self.peek() == Some(byte) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.unexpected(expected))
        }
    }

    /// `capabilities := '(' component* ')'`
    fn capabilities(&mut self) -> Result<Vec<Component>, CapabilitiesError> {
        self.expect(b'(', "'(' opening the capabilities list")?;

        let mut components = Vec::new();
        loop {
            self.skip_whitespace();
            match self.peek() {
                Some(b')') => {
                    self.pos += 1;
                    return Ok(components);
                }
                Some(b) if is_name_byte(b) => components.push(self.component()?),
                _ => return Err(self.unexpected("a component name or ')'")),
            }
        }
    }

    /// `component := vcp_component | generic_component`
    ///
    /// The whole name is read first, so `vcpx(...)` is generic while `vcp(...)`
    /// is the vcp component.
    fn component(&mut self) -> Result<Component, CapabilitiesError> {
        let name = self.name();
        if name == "vcp" {
            self.vcp_codes().map(Component::Vcp)
        } else {
            self.generic_params()?;
            Ok(Component::Generic(name.to_owned()))
        }
    }

    fn name(&mut self) -> &'a str {
        let input = self.input;
        let start = self.pos;
        while matches!(self.peek(), Some(b) if is_name_byte(b)) {
            self.pos += 1;
        }
        &input[start..self.pos]
    }

    /// `generic_params := '(' (generic_params | any_char_except_paren)* ')'`
    ///
    /// The contents are discarded, so nested groups are matched with a depth
    /// counter instead of recursion and any depth is accepted.
    fn generic_params(&mut self) -> Result<(), CapabilitiesError> {
        self.expect(b'(', "'(' opening the component parameters")?;
        let mut depth = 1usize;
        while let Some(byte) = self.peek() {
            self.pos += 1;
            match byte {
                b'(' => depth += 1,
                b')' => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(());
                    }
                }
                _ => {}
            }
        }
        Err(CapabilitiesError::UnexpectedEnd {
            offset: self.pos,
            expected: "')' closing the component parameters",
        })
    }

    /// `vcp_component := "vcp" '(' vcp_code* ')'` (the name is already consumed)
    fn vcp_codes(&mut self) -> Result<VcpComponent, CapabilitiesError> {
        self.expect(b'(', "'(' opening the vcp code list")?;

        let mut codes = BTreeMap::new();
        loop {
            self.skip_whitespace();
            match self.peek() {
                Some(b')') => {
                    self.pos += 1;
                    return Ok(VcpComponent::from(codes));
                }
                Some(b) if b.is_ascii_hexdigit() => {
                    let code = self.byte()?;
                    let values = self.vcp_values()?;
                    if codes.insert(code, values).is_some() {
                        debug!("vcp code {code:#04x} listed twice; keeping the later entry");
                    }
                }
                _ => return Err(self.unexpected("a hex vcp code or ')'")),
            }
        }
    }

    /// The optional `'(' byte* ')'` value list after a vcp code.
    fn vcp_values(&mut self) -> Result<Vec<u8>, CapabilitiesError> {
        self.skip_whitespace();
        if self.peek() != Some(b'(') {
            return Ok(Vec::new());
        }
        self.pos += 1;

        let mut values = Vec::new();
        loop {
            self.skip_whitespace();
            match self.peek() {
                Some(b')') => {
                    self.pos += 1;
                    return Ok(values);
                }
                Some(b) if b.is_ascii_hexdigit() => values.push(self.byte()?),
                _ => return Err(self.unexpected("a hex value or ')'")),
            }
        }
    }

    /// `byte := hex_digit hex_digit`
    fn byte(&mut self) -> Result<u8, CapabilitiesError> {
        let high = self.hex_digit()?;
        let low = self.hex_digit()?;
        Ok((high << 4) | low)
    }

    fn hex_digit(&mut self) -> Result<u8, CapabilitiesError> {
        match self.peek().and_then(|b| char::from(b).to_digit(16)) {
            Some(digit) => {
                self.pos += 1;
                Ok(digit as u8)
            }
            None => Err(self.unexpected("a hex digit")),
        }
    }

    /// Accepts trailing whitespace and NUL padding after the root list.
    fn finish(&mut self) -> Result<(), CapabilitiesError> {
        while matches!(self.peek(), Some(b) if b.is_ascii_whitespace() || b == 0) {
            self.pos += 1;
        }
        if self.pos == self.input.len() {
            Ok(())
        } else {
            Err(CapabilitiesError::TrailingInput { offset: self.pos })
        }
    }
}

//! MCCS capabilities string parsing.
//!
//! Every DDC/CI monitor can describe itself with a *capabilities string*, a
//! nested parenthesized list such as:
//!
//! ```text
//! (prot(monitor)type(LCD)model(U2720Q)vcp(02 04 14(05 08 0B 0C) 60(1B 11 12))mccs_ver(2.1))
//! ```
//!
//! Only the `vcp(...)` component matters to monswitch: it lists every VCP code
//! the monitor supports and, for codes with enumerated values, the legal
//! values.  For `0x60` (input select) those values are the monitor's inputs.
//!
//! # Grammar
//!
//! ```text
//! capabilities      := '(' component* ')'
//! component         := vcp_component | generic_component
//! generic_component := generic_name generic_params
//! generic_name      := (lowercase | '_')+
//! generic_params    := '(' (generic_params | any_char_except_paren)* ')'
//! vcp_component     := "vcp" '(' vcp_code* ')'
//! vcp_code          := byte ( '(' byte* ')' )?
//! byte              := hex_digit hex_digit
//! ```
//!
//! Whitespace may appear between tokens.  Components other than `vcp` are
//! parsed (to any nesting depth) and discarded, so unknown MCCS fields never
//! break the parse.
//!
//! # Failure handling
//!
//! Real monitors frequently report malformed strings.  A failed parse is a
//! feature-detection outcome, not an error: [`parse_vcp_component`] logs a
//! warning and returns `None`.  [`try_parse_vcp_component`] exposes the reason.

mod parser;

use std::collections::BTreeMap;

use thiserror::Error;
use tracing::{trace, warn};

use parser::Component;

/// Reasons a capabilities string can be rejected.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CapabilitiesError {
    /// The input ended while the parser still expected more tokens.
    #[error("unexpected end of input at offset {offset}; expected {expected}")]
    UnexpectedEnd {
        offset: usize,
        expected: &'static str,
    },

    /// A character that does not fit the grammar at this position.
    #[error("unexpected character {found:?} at offset {offset}; expected {expected}")]
    UnexpectedChar {
        offset: usize,
        found: char,
        expected: &'static str,
    },

    /// The root list closed but non-whitespace input follows it.
    #[error("unexpected input after the capabilities list at offset {offset}")]
    TrailingInput { offset: usize },

    /// The string parsed but contains no `vcp(...)` component.
    #[error("capabilities string has no vcp component")]
    MissingVcp,

    /// The string parsed but contains more than one `vcp(...)` component.
    #[error("capabilities string has {0} vcp components; exactly one is allowed")]
    MultipleVcp(usize),
}

/// The parsed `vcp(...)` component: VCP code → legal values.
///
/// An empty value list means the code is continuous (e.g. brightness) or the
/// monitor simply does not enumerate its values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VcpComponent {
    codes: BTreeMap<u8, Vec<u8>>,
}

impl VcpComponent {
    /// Returns the declared values for `code`, or `None` if the code is not
    /// supported at all.
    pub fn values(&self, code: u8) -> Option<&[u8]> {
        self.codes.get(&code).map(Vec::as_slice)
    }

    /// Returns `true` if the monitor declares support for `code`.
    pub fn supports(&self, code: u8) -> bool {
        self.codes.contains_key(&code)
    }

    /// Iterates over `(code, values)` pairs in ascending code order.
    pub fn codes(&self) -> impl Iterator<Item = (u8, &[u8])> {
        self.codes.iter().map(|(code, values)| (*code, values.as_slice()))
    }

    /// Number of supported VCP codes.
    pub fn len(&self) -> usize {
        self.codes.len()
    }

    /// Returns `true` when the vcp component lists no codes.
    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    /// Consumes the component and returns the underlying map.
    pub fn into_map(self) -> BTreeMap<u8, Vec<u8>> {
        self.codes
    }
}

impl From<BTreeMap<u8, Vec<u8>>> for VcpComponent {
    fn from(codes: BTreeMap<u8, Vec<u8>>) -> Self {
        Self { codes }
    }
}

impl FromIterator<(u8, Vec<u8>)> for VcpComponent {
    fn from_iter<I: IntoIterator<Item = (u8, Vec<u8>)>>(iter: I) -> Self {
        Self {
            codes: iter.into_iter().collect(),
        }
    }
}

/// Parses `capabilities` and returns its single vcp component.
///
/// # Errors
///
/// Returns [`CapabilitiesError`] when the string does not match the grammar or
/// does not contain exactly one `vcp(...)` component.
///
/// # Examples
///
/// ```rust
/// use monswitch_core::try_parse_vcp_component;
///
/// let vcp = try_parse_vcp_component("(type(LCD)vcp(10 60(0F 11)))").unwrap();
/// assert_eq!(vcp.values(0x60), Some(&[0x0F, 0x11][..]));
/// assert_eq!(vcp.values(0x10), Some(&[][..]));
/// ```
pub fn try_parse_vcp_component(capabilities: &str) -> Result<VcpComponent, CapabilitiesError> {
    let components = parser::parse_components(capabilities)?;

    let mut vcp_components: Vec<VcpComponent> = components
        .into_iter()
        .filter_map(|component| match component {
            Component::Vcp(vcp) => Some(vcp),
            Component::Generic(name) => {
                trace!("skipping capabilities component {name:?}");
                None
            }
        })
        .collect();

    match vcp_components.len() {
        0 => Err(CapabilitiesError::MissingVcp),
        1 => Ok(vcp_components.remove(0)),
        n => Err(CapabilitiesError::MultipleVcp(n)),
    }
}

/// Parses `capabilities`, logging and swallowing any failure.
///
/// Returns `None` for malformed strings and for strings with zero or several
/// vcp components.  Never panics.
pub fn parse_vcp_component(capabilities: &str) -> Option<VcpComponent> {
    match try_parse_vcp_component(capabilities) {
        Ok(vcp) => Some(vcp),
        Err(e) => {
            warn!("could not parse monitor capabilities {capabilities:?}: {e}");
            None
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str =
        "(prot(monitor)type(LCD)vcp(02 04 14(05 08 0B 0C) 60(1B 11 12))mccs_ver(2.1))";

    fn map(entries: &[(u8, &[u8])]) -> BTreeMap<u8, Vec<u8>> {
        entries.iter().map(|(c, v)| (*c, v.to_vec())).collect()
    }

    // ── Well-formed input ─────────────────────────────────────────────────────

    #[test]
    fn test_parse_sample_string_yields_exact_code_map() {
        // Act
        let vcp = try_parse_vcp_component(SAMPLE).expect("parse");

        // Assert
        assert_eq!(
            vcp.into_map(),
            map(&[
                (0x02, &[][..]),
                (0x04, &[][..]),
                (0x14, &[0x05, 0x08, 0x0b, 0x0c][..]),
                (0x60, &[0x1b, 0x11, 0x12][..]),
            ])
        );
    }

    #[test]
    fn test_parse_keeps_input_value_order_as_declared() {
        let vcp = try_parse_vcp_component("(vcp(60(12 0F 11)))").expect("parse");
        assert_eq!(vcp.values(0x60), Some(&[0x12, 0x0F, 0x11][..]));
    }

    #[test]
    fn test_parse_accepts_lowercase_hex() {
        let vcp = try_parse_vcp_component("(vcp(6a(0f 1b)))").expect("parse");
        assert_eq!(vcp.values(0x6A), Some(&[0x0F, 0x1B][..]));
    }

    #[test]
    fn test_parse_accepts_whitespace_between_every_token() {
        let vcp = try_parse_vcp_component("  ( type ( LCD ) vcp ( 10 60 ( 0F 11 ) ) )  ")
            .expect("parse");
        assert!(vcp.supports(0x10));
        assert_eq!(vcp.values(0x60), Some(&[0x0F, 0x11][..]));
    }

    #[test]
    fn test_parse_accepts_bytes_without_separating_whitespace() {
        let vcp = try_parse_vcp_component("(vcp(020410(0102)))").expect("parse");
        assert_eq!(vcp.len(), 3);
        assert_eq!(vcp.values(0x10), Some(&[0x01, 0x02][..]));
    }

    #[test]
    fn test_parse_accepts_empty_vcp_component() {
        let vcp = try_parse_vcp_component("(vcp())").expect("parse");
        assert!(vcp.is_empty());
    }

    #[test]
    fn test_parse_tolerates_trailing_nul_padding() {
        let vcp = try_parse_vcp_component("(vcp(10))\0\0").expect("parse");
        assert!(vcp.supports(0x10));
    }

    #[test]
    fn test_parse_repeated_code_keeps_later_entry() {
        let vcp = try_parse_vcp_component("(vcp(60(0F) 60(11 12)))").expect("parse");
        assert_eq!(vcp.values(0x60), Some(&[0x11, 0x12][..]));
    }

    // ── Generic components ────────────────────────────────────────────────────

    #[test]
    fn test_parse_discards_deeply_nested_generic_component() {
        // Arrange
        let input = "(vcpname(10(a(b(c)d)e) 60(x(y(z))))vcp(60(0F)))";

        // Act
        let vcp = try_parse_vcp_component(input).expect("parse");

        // Assert
        assert_eq!(vcp.len(), 1);
        assert_eq!(vcp.values(0x60), Some(&[0x0F][..]));
    }

    #[test]
    fn test_parse_treats_vcp_prefixed_name_as_generic() {
        // `vcpx` is not `vcp`; with no real vcp component the parse must fail.
        let result = try_parse_vcp_component("(vcpx(10 60(0F)))");
        assert_eq!(result, Err(CapabilitiesError::MissingVcp));
    }

    #[test]
    fn test_parse_generic_params_may_contain_arbitrary_text() {
        let input = "(model(Dell U2720Q, rev. A00 #1!)vcp(10))";
        assert!(try_parse_vcp_component(input).is_ok());
    }

    #[test]
    fn test_parse_accepts_deeply_nested_generic_params() {
        // Arrange
        let depth = 10_000;
        let input = format!("(x{}{}vcp(60(0F 11)))", "(".repeat(depth), ")".repeat(depth));

        // Act
        let vcp = try_parse_vcp_component(&input).expect("parse");

        // Assert
        assert_eq!(vcp.values(0x60), Some(&[0x0F, 0x11][..]));
    }

    #[test]
    fn test_parse_rejects_unclosed_nested_generic_params() {
        let result = try_parse_vcp_component("(x((())vcp(10))");
        assert!(matches!(result, Err(CapabilitiesError::UnexpectedEnd { .. })));
    }

    // ── vcp component count ───────────────────────────────────────────────────

    #[test]
    fn test_parse_without_vcp_component_is_missing_vcp() {
        let result = try_parse_vcp_component("(prot(monitor)type(LCD))");
        assert_eq!(result, Err(CapabilitiesError::MissingVcp));
    }

    #[test]
    fn test_parse_with_two_vcp_components_is_rejected() {
        let result = try_parse_vcp_component("(vcp(10)vcp(12))");
        assert_eq!(result, Err(CapabilitiesError::MultipleVcp(2)));
    }

    // ── Malformed input ───────────────────────────────────────────────────────

    #[test]
    fn test_parse_rejects_unbalanced_parentheses() {
        let result = try_parse_vcp_component("(prot(monitor)vcp(10 60(0F 11))");
        assert!(matches!(result, Err(CapabilitiesError::UnexpectedEnd { .. })));
    }

    #[test]
    fn test_parse_rejects_empty_string() {
        let result = try_parse_vcp_component("");
        assert!(matches!(result, Err(CapabilitiesError::UnexpectedEnd { offset: 0, .. })));
    }

    #[test]
    fn test_parse_rejects_missing_root_parenthesis() {
        let result = try_parse_vcp_component("vcp(10)");
        assert!(matches!(
            result,
            Err(CapabilitiesError::UnexpectedChar { offset: 0, found: 'v', .. })
        ));
    }

    #[test]
    fn test_parse_rejects_single_hex_digit() {
        let result = try_parse_vcp_component("(vcp(1 60))");
        assert!(matches!(
            result,
            Err(CapabilitiesError::UnexpectedChar { found: ' ', .. })
        ));
    }

    #[test]
    fn test_parse_rejects_non_hex_vcp_code() {
        let result = try_parse_vcp_component("(vcp(10 ZZ))");
        assert!(matches!(
            result,
            Err(CapabilitiesError::UnexpectedChar { found: 'Z', .. })
        ));
    }

    #[test]
    fn test_parse_rejects_uppercase_component_name() {
        let result = try_parse_vcp_component("(Type(LCD)vcp(10))");
        assert!(matches!(
            result,
            Err(CapabilitiesError::UnexpectedChar { found: 'T', .. })
        ));
    }

    #[test]
    fn test_parse_rejects_input_after_root_list() {
        let result = try_parse_vcp_component("(vcp(10))garbage");
        assert_eq!(result, Err(CapabilitiesError::TrailingInput { offset: 9 }));
    }

    #[test]
    fn test_parse_vcp_component_returns_none_for_malformed_input() {
        assert!(parse_vcp_component("(vcp(10").is_none());
        assert!(parse_vcp_component("(type(LCD))").is_none());
    }

    #[test]
    fn test_parse_vcp_component_returns_some_for_sample() {
        let vcp = parse_vcp_component(SAMPLE).expect("sample parses");
        assert_eq!(vcp.values(0x14), Some(&[0x05, 0x08, 0x0B, 0x0C][..]));
    }

    #[test]
    fn test_codes_iterates_in_ascending_order() {
        let vcp = try_parse_vcp_component("(vcp(60 10 02))").expect("parse");
        let codes: Vec<u8> = vcp.codes().map(|(code, _)| code).collect();
        assert_eq!(codes, vec![0x02, 0x10, 0x60]);
    }
}

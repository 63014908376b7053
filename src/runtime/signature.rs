//! Method descriptors
//!
//! A [`MethodDescriptor`] is the (class, name, signature) key the host uses to
//! dispatch a call. The bridge never resolves it; it only parses the signature
//! so argument tags can be checked before anything crosses the boundary.
//!
//! Signature grammar: `(` param* `)` return, where each type is one of
//! `Z B C S I J F D` (primitives), `V` (void, return only), `L<class>;` or
//! `[<type>` (both marshaled as objects).

use std::fmt;

use super::abi::ValueKind;
use super::error::{BridgeError, BridgeResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    params: Vec<ValueKind>,
    ret: ValueKind,
}

impl Signature {
    pub fn parse(signature: &str) -> BridgeResult<Self> {
        let mut chars = signature.chars().peekable();
        if chars.next() != Some('(') {
            return Err(BridgeError::invalid_signature(signature, "expected '('"));
        }

        let mut params = Vec::new();
        loop {
            match chars.peek() {
                Some(')') => {
                    chars.next();
                    break;
                }
                Some(_) => {
                    let kind = parse_type(signature, &mut chars)?;
                    if kind == ValueKind::Void {
                        return Err(BridgeError::invalid_signature(
                            signature,
                            "void is not a parameter type",
                        ));
                    }
                    params.push(kind);
                }
                None => return Err(BridgeError::invalid_signature(signature, "unterminated parameter list")),
            }
        }

        if chars.peek().is_none() {
            return Err(BridgeError::invalid_signature(signature, "missing return type"));
        }
        let ret = parse_type(signature, &mut chars)?;
        if chars.next().is_some() {
            return Err(BridgeError::invalid_signature(signature, "trailing characters"));
        }
        Ok(Self { params, ret })
    }

    pub fn params(&self) -> &[ValueKind] {
        &self.params
    }

    pub fn return_kind(&self) -> ValueKind {
        self.ret
    }
}

fn parse_type<I>(signature: &str, chars: &mut std::iter::Peekable<I>) -> BridgeResult<ValueKind>
where
    I: Iterator<Item = char>,
{
    let Some(c) = chars.next() else {
        return Err(BridgeError::invalid_signature(signature, "unexpected end"));
    };
    let kind = match c {
        'Z' => ValueKind::Boolean,
        'B' => ValueKind::Byte,
        'C' => ValueKind::Char,
        'S' => ValueKind::Short,
        'I' => ValueKind::Int,
        'J' => ValueKind::Long,
        'F' => ValueKind::Float,
        'D' => ValueKind::Double,
        'V' => ValueKind::Void,
        'L' => {
            let mut len = 0;
            loop {
                match chars.next() {
                    Some(';') if len > 0 => break,
                    Some(';') | None => {
                        return Err(BridgeError::invalid_signature(signature, "malformed class name"));
                    }
                    Some(_) => len += 1,
                }
            }
            ValueKind::Object
        }
        '[' => {
            if parse_type(signature, chars)? == ValueKind::Void {
                return Err(BridgeError::invalid_signature(signature, "array of void"));
            }
            ValueKind::Object
        }
        other => {
            return Err(BridgeError::invalid_signature(
                signature,
                format!("unknown type character '{}'", other),
            ));
        }
    };
    Ok(kind)
}

/// Dispatch key for a crossing call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDescriptor {
    class: String,
    name: String,
    signature: String,
    parsed: Signature,
}

impl MethodDescriptor {
    pub fn new(
        class: impl Into<String>,
        name: impl Into<String>,
        signature: impl Into<String>,
    ) -> BridgeResult<Self> {
        let signature = signature.into();
        let parsed = Signature::parse(&signature)?;
        Ok(Self {
            class: class.into(),
            name: name.into(),
            signature,
            parsed,
        })
    }

    pub fn class(&self) -> &str {
        &self.class
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn signature(&self) -> &str {
        &self.signature
    }

    pub fn parsed(&self) -> &Signature {
        &self.parsed
    }
}

impl fmt::Display for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}{}", self.class, self.name, self.signature)
    }
}

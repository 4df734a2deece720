//! Descriptor Parsing and Normalization
//!
//! Parses JVM field/method descriptors and produces the normalized form used
//! for scoring: every object type outside a stable platform package collapses
//! to the placeholder `L*;`, while array depth and primitive-vs-object
//! category are preserved.
//!
//! # Compatibility
//! Two method descriptors are compatible when argument count, per-argument
//! array depth and per-argument primitive/object category agree. Object
//! arguments are further compared by an [`ObjectCompatibility`] strategy;
//! the default compares internal-name lengths, a weak signal that obfuscators
//! happen to preserve.

use crate::remapper::error::{RemapError, RemapResult};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt::Write as _;

/// Package prefixes whose names survive obfuscation.
pub const STABLE_PREFIXES: &[&str] = &["java/", "javax/", "jdk/", "sun/"];

/// Placeholder for an obfuscated object type.
pub const OBJECT_PLACEHOLDER: &str = "L*;";

/// `true` when the internal name belongs to the platform and is stable across builds.
#[inline]
pub fn is_stable_name(internal_name: &str) -> bool {
    STABLE_PREFIXES.iter().any(|p| internal_name.starts_with(p))
}

/// Parsed JVM type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum JvmType {
    Boolean,
    Byte,
    Char,
    Short,
    Int,
    Long,
    Float,
    Double,
    Void,
    /// Object type by internal name (`java/lang/String`).
    Object(String),
    /// Array with dimension count and non-array element type.
    Array { dimensions: usize, element: Box<JvmType> },
}

impl JvmType {
    #[inline]
    pub fn is_primitive(&self) -> bool {
        !matches!(self, JvmType::Object(_) | JvmType::Array { .. } | JvmType::Void)
    }

    #[inline]
    pub fn is_object(&self) -> bool {
        matches!(self, JvmType::Object(_))
    }

    /// Primitives that travel as an `int` on the operand stack.
    #[inline]
    pub fn is_int_like(&self) -> bool {
        matches!(
            self,
            JvmType::Boolean | JvmType::Byte | JvmType::Char | JvmType::Short | JvmType::Int
        )
    }

    /// Local-variable slots occupied by a value of this type.
    #[inline]
    pub fn slot_size(&self) -> usize {
        match self {
            JvmType::Long | JvmType::Double => 2,
            JvmType::Void => 0,
            _ => 1,
        }
    }

    #[inline]
    pub fn array_dimensions(&self) -> usize {
        match self {
            JvmType::Array { dimensions, .. } => *dimensions,
            _ => 0,
        }
    }

    /// Element type of an array, the type itself otherwise.
    #[inline]
    pub fn element(&self) -> &JvmType {
        match self {
            JvmType::Array { element, .. } => element,
            other => other,
        }
    }

    /// Write the descriptor form, optionally normalizing obfuscated object names.
    pub fn write_descriptor(&self, out: &mut String, normalize: bool) {
        match self {
            JvmType::Boolean => out.push('Z'),
            JvmType::Byte => out.push('B'),
            JvmType::Char => out.push('C'),
            JvmType::Short => out.push('S'),
            JvmType::Int => out.push('I'),
            JvmType::Long => out.push('J'),
            JvmType::Float => out.push('F'),
            JvmType::Double => out.push('D'),
            JvmType::Void => out.push('V'),
            JvmType::Object(name) => {
                if normalize && !is_stable_name(name) {
                    out.push_str(OBJECT_PLACEHOLDER);
                } else {
                    let _ = write!(out, "L{};", name);
                }
            }
            JvmType::Array { dimensions, element } => {
                for _ in 0..*dimensions {
                    out.push('[');
                }
                element.write_descriptor(out, normalize);
            }
        }
    }

    pub fn descriptor(&self) -> String {
        let mut out = String::new();
        self.write_descriptor(&mut out, false);
        out
    }

    pub fn normalized(&self) -> String {
        let mut out = String::new();
        self.write_descriptor(&mut out, true);
        out
    }
}

/// Parsed method descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDescriptor {
    pub params: SmallVec<[JvmType; 4]>,
    pub ret: JvmType,
}

impl MethodDescriptor {
    /// Normalized descriptor string, e.g. `(IL*;)Ljava/lang/String;`.
    pub fn normalized(&self) -> String {
        let mut out = String::with_capacity(16);
        out.push('(');
        for param in &self.params {
            param.write_descriptor(&mut out, true);
        }
        out.push(')');
        self.ret.write_descriptor(&mut out, true);
        out
    }

    /// Total local-variable slots used by the parameters.
    #[inline]
    pub fn param_slots(&self) -> usize {
        self.params.iter().map(JvmType::slot_size).sum()
    }
}

/// Parse a field descriptor such as `[[Ljava/lang/String;`.
pub fn parse_field_type(descriptor: &str) -> RemapResult<JvmType> {
    let (ty, rest) = parse_type(descriptor, descriptor)?;
    if !rest.is_empty() {
        return Err(RemapError::descriptor(descriptor, "trailing characters after type"));
    }
    if ty == JvmType::Void {
        return Err(RemapError::descriptor(descriptor, "void is not a field type"));
    }
    Ok(ty)
}

/// Parse a method descriptor such as `(I[JLfoo;)V`.
pub fn parse_method_descriptor(descriptor: &str) -> RemapResult<MethodDescriptor> {
    let mut rest = descriptor
        .strip_prefix('(')
        .ok_or_else(|| RemapError::descriptor(descriptor, "expected '('"))?;

    let mut params: SmallVec<[JvmType; 4]> = SmallVec::new();
    loop {
        if let Some(after) = rest.strip_prefix(')') {
            rest = after;
            break;
        }
        if rest.is_empty() {
            return Err(RemapError::descriptor(descriptor, "unterminated parameter list"));
        }
        let (param, after) = parse_type(rest, descriptor)?;
        if param == JvmType::Void {
            return Err(RemapError::descriptor(descriptor, "void parameter"));
        }
        params.push(param);
        rest = after;
    }

    let (ret, tail) = parse_type(rest, descriptor)?;
    if !tail.is_empty() {
        return Err(RemapError::descriptor(descriptor, "trailing characters after return type"));
    }
    Ok(MethodDescriptor { params, ret })
}

fn parse_type<'a>(input: &'a str, whole: &str) -> RemapResult<(JvmType, &'a str)> {
    let dimensions = input.bytes().take_while(|b| *b == b'[').count();
    let body = &input[dimensions..];
    let first = body
        .chars()
        .next()
        .ok_or_else(|| RemapError::descriptor(whole, "unexpected end of descriptor"))?;

    let (element, rest) = match first {
        'Z' => (JvmType::Boolean, &body[1..]),
        'B' => (JvmType::Byte, &body[1..]),
        'C' => (JvmType::Char, &body[1..]),
        'S' => (JvmType::Short, &body[1..]),
        'I' => (JvmType::Int, &body[1..]),
        'J' => (JvmType::Long, &body[1..]),
        'F' => (JvmType::Float, &body[1..]),
        'D' => (JvmType::Double, &body[1..]),
        'V' if dimensions == 0 => (JvmType::Void, &body[1..]),
        'L' => {
            let end = body
                .find(';')
                .ok_or_else(|| RemapError::descriptor(whole, "object type missing ';'"))?;
            if end == 1 {
                return Err(RemapError::descriptor(whole, "empty class name"));
            }
            (JvmType::Object(body[1..end].to_string()), &body[end + 1..])
        }
        other => {
            return Err(RemapError::descriptor(whole, format!("unexpected character '{}'", other)));
        }
    };

    if dimensions == 0 {
        Ok((element, rest))
    } else {
        Ok((JvmType::Array { dimensions, element: Box::new(element) }, rest))
    }
}

/// Strategy for comparing two object-typed arguments before scoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectCompatibility {
    /// Internal names must have equal length.
    #[default]
    NameLength,
    /// Any two object types are compatible.
    Permissive,
}

impl ObjectCompatibility {
    #[inline]
    fn objects_compatible(self, a: &str, b: &str) -> bool {
        match self {
            ObjectCompatibility::NameLength => a.len() == b.len(),
            ObjectCompatibility::Permissive => true,
        }
    }

    /// Argument-shape pre-filter for a candidate method pair.
    pub fn compatible(self, a: &MethodDescriptor, b: &MethodDescriptor) -> bool {
        a.params.len() == b.params.len()
            && a.params
                .iter()
                .zip(b.params.iter())
                .all(|(x, y)| self.types_compatible(x, y))
    }

    fn types_compatible(self, a: &JvmType, b: &JvmType) -> bool {
        if a.array_dimensions() != b.array_dimensions() {
            return false;
        }
        let (ea, eb) = (a.element(), b.element());
        match (ea, eb) {
            (JvmType::Object(na), JvmType::Object(nb)) => self.objects_compatible(na, nb),
            _ => ea.is_primitive() == eb.is_primitive(),
        }
    }
}

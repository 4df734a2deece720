//! Method and Field Normalization
//!
//! Builds the feature sets the scorer compares: normalized descriptor,
//! invoked-signature tokens, string constants, opcode histogram and
//! field-operation pattern tokens. Everything is computed once at
//! construction and never changes afterwards.
//!
//! # Algorithm
//! 1. Detect obfuscator exception wrappers (`RuntimeException` handlers that
//!    rethrow through a `(Throwable, String)` helper) and exclude their
//!    handler instructions and noisy `"x.y(...)"` strings
//! 2. Walk the remaining real instructions, collecting opcodes, call targets
//!    and string literals
//! 3. Collapse plumbing calls into canonical tokens
//! 4. Scan for field-operation idioms
//! 5. Hash the sorted features into a SHA-256 fingerprint

use crate::remapper::bytecode::{label_index, opcodes, Constant, Insn};
use crate::remapper::descriptor::{is_stable_name, parse_field_type, parse_method_descriptor, JvmType, MethodDescriptor};
use crate::remapper::error::{RemapError, RemapResult};
use crate::remapper::model::{FieldKey, FieldRecord, MethodKey, MethodRecord};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;

pub const EXCEPTION_WRAP_TOKEN: &str = "EXCEPTION_WRAP";
pub const STRING_BUILDER_TOKEN: &str = "STRING_BUILDER_TO_STRING";

const EXCEPTION_WRAP_PREFIX: &str = "(Ljava/lang/Throwable;Ljava/lang/String;)";
const WRAPPER_CATCH_TYPE: &str = "java/lang/RuntimeException";
const STRING_BUILDER: &str = "java/lang/StringBuilder";
const STRING_BUILDER_CHAIN: &[(&str, &str)] = &[
    ("<init>", "()V"),
    ("append", "(C)Ljava/lang/StringBuilder;"),
    ("append", "(Ljava/lang/String;)Ljava/lang/StringBuilder;"),
    ("toString", "()Ljava/lang/String;"),
];

/// Canonical token for a call, collapsing known plumbing.
pub fn canonical_call(op: u8, owner: &str, name: &str, desc: &str) -> String {
    if op == opcodes::INVOKESTATIC && desc.starts_with(EXCEPTION_WRAP_PREFIX) && returns_object(desc) {
        return EXCEPTION_WRAP_TOKEN.to_string();
    }
    if owner == STRING_BUILDER && STRING_BUILDER_CHAIN.iter().any(|(n, d)| *n == name && *d == desc) {
        return STRING_BUILDER_TOKEN.to_string();
    }
    format!("{}.{}{}", owner, name, desc)
}

#[inline]
pub fn is_plumbing_token(token: &str) -> bool {
    token == EXCEPTION_WRAP_TOKEN || token == STRING_BUILDER_TOKEN
}

fn returns_object(desc: &str) -> bool {
    desc.rsplit(')')
        .next()
        .map(|ret| ret.starts_with('L') || ret.starts_with('['))
        .unwrap_or(false)
}

/// Kind of field-operation idiom.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum FieldPattern {
    CallOnArg,
    ArgGetField,
    ArgPutField,
    ArgAccumMul,
    ArgZeroField,
    ThisAccumAdd,
}

impl FieldPattern {
    pub fn as_str(self) -> &'static str {
        match self {
            FieldPattern::CallOnArg => "CALL_ON_ARG",
            FieldPattern::ArgGetField => "ARG_GETFIELD",
            FieldPattern::ArgPutField => "ARG_PUTFIELD",
            FieldPattern::ArgAccumMul => "ARG_ACCUM_MUL",
            FieldPattern::ArgZeroField => "ARG_ZERO_FIELD",
            FieldPattern::ThisAccumAdd => "THIS_ACCUM_ADD",
        }
    }

    fn token(self, shape: &str) -> String {
        format!("{}:{}", self.as_str(), shape)
    }
}

/// Build-stable shape of a call target: platform calls keep their name.
fn call_shape(owner: &str, name: &str, desc: &str) -> String {
    let normalized = parse_method_descriptor(desc)
        .map(|d| d.normalized())
        .unwrap_or_else(|_| desc.to_string());
    if is_stable_name(owner) {
        format!("{}.{}{}", owner, name, normalized)
    } else {
        format!("*{}", normalized)
    }
}

/// Build-stable shape of a field access.
fn field_shape(owner: &str, name: &str, desc: &str) -> String {
    let normalized = parse_field_type(desc)
        .map(|t| t.normalized())
        .unwrap_or_else(|_| desc.to_string());
    if is_stable_name(owner) {
        format!("{}.{} {}", owner, name, normalized)
    } else {
        normalized
    }
}

/// Scan real instructions for field-operation idioms.
pub fn extract_field_patterns(instructions: &[Insn]) -> BTreeSet<String> {
    let insns: Vec<&Insn> = instructions.iter().filter(|i| !i.is_pseudo()).collect();
    let mut tokens: BTreeSet<String> = BTreeSet::new();
    let is_aload = |insn: &Insn, var: u16| insn.var_of(opcodes::ALOAD) == Some(var);

    for (i, insn) in insns.iter().enumerate() {
        match insn {
            Insn::Method { op, owner, name, desc } if opcodes::is_invoke(*op) => {
                if i >= 1 && is_aload(insns[i - 1], 1) {
                    tokens.insert(FieldPattern::CallOnArg.token(&call_shape(owner, name, desc)));
                }
            }
            Insn::Field { op, owner, name, desc } if *op == opcodes::GETFIELD => {
                if i >= 1 && is_aload(insns[i - 1], 1) {
                    tokens.insert(FieldPattern::ArgGetField.token(&field_shape(owner, name, desc)));
                }
            }
            Insn::Field { op, owner, name, desc } if *op == opcodes::PUTFIELD => {
                let shape = field_shape(owner, name, desc);

                let writes_arg = insns[i.saturating_sub(4)..i].iter().any(|p| is_aload(p, 1));
                if writes_arg {
                    let scaled = insns[i.saturating_sub(3)..i]
                        .iter()
                        .any(|p| p.opcode() == Some(opcodes::IMUL));
                    let kind = if scaled { FieldPattern::ArgAccumMul } else { FieldPattern::ArgPutField };
                    tokens.insert(kind.token(&shape));
                }

                if i >= 2
                    && insns[i - 1].opcode() == Some(opcodes::ICONST_0)
                    && is_aload(insns[i - 2], 1)
                {
                    tokens.insert(FieldPattern::ArgZeroField.token(&shape));
                }

                // ALOAD; GETFIELD f; <value>; IADD; PUTFIELD f
                if i >= 4 && insns[i - 1].opcode() == Some(opcodes::IADD) {
                    if let Insn::Field { op: prior_op, owner: prior_owner, name: prior_name, .. } = insns[i - 3] {
                        if *prior_op == opcodes::GETFIELD
                            && prior_owner == owner
                            && prior_name == name
                            && insns[i - 4].opcode() == Some(opcodes::ALOAD)
                        {
                            tokens.insert(FieldPattern::ThisAccumAdd.token(&shape));
                        }
                    }
                }
            }
            _ => {}
        }
    }
    tokens
}

/// Next real instruction at or after `from`.
fn next_real(instructions: &[Insn], mut from: usize) -> Option<usize> {
    while from < instructions.len() {
        if !instructions[from].is_pseudo() {
            return Some(from);
        }
        from += 1;
    }
    None
}

/// Obfuscator exception wrapper found at a handler.
struct WrapperHandler {
    /// Handler instruction range, through the ATHROW.
    start: usize,
    end: usize,
    noisy_string: String,
}

/// Match `[ASTORE] ALOAD; LDC "x.y(...)"; INVOKESTATIC (Throwable,String)Throwable; ATHROW`.
fn match_wrapper_handler(instructions: &[Insn], handler: usize) -> Option<WrapperHandler> {
    let mut cur = next_real(instructions, handler)?;
    if instructions[cur].var_of(opcodes::ASTORE).is_some() {
        cur = next_real(instructions, cur + 1)?;
    }
    instructions[cur].var_of(opcodes::ALOAD)?;

    cur = next_real(instructions, cur + 1)?;
    let noisy_string = match &instructions[cur] {
        Insn::Ldc { value: Constant::String(s) } if s.contains('(') && s.contains(')') => s.clone(),
        _ => return None,
    };

    cur = next_real(instructions, cur + 1)?;
    match &instructions[cur] {
        Insn::Method { op, desc, .. }
            if *op == opcodes::INVOKESTATIC && desc.starts_with(EXCEPTION_WRAP_PREFIX) && returns_object(desc) => {}
        _ => return None,
    }

    cur = next_real(instructions, cur + 1)?;
    if instructions[cur].opcode() != Some(opcodes::ATHROW) {
        return None;
    }
    Some(WrapperHandler {
        start: handler,
        end: cur,
        noisy_string,
    })
}

/// Normalized feature view of one method.
#[derive(Debug, Clone)]
pub struct NormalizedMethod {
    key: MethodKey,
    access: u16,
    descriptor: MethodDescriptor,
    normalized_descriptor: String,
    invoked: BTreeSet<String>,
    canonical_invoked: BTreeSet<String>,
    strings: BTreeSet<String>,
    opcode_histogram: BTreeMap<u8, u32>,
    field_patterns: BTreeSet<String>,
    instructions: Vec<Insn>,
    fingerprint: String,
}

impl NormalizedMethod {
    /// Normalize a method record. Fails when the descriptor is missing or malformed.
    pub fn from_record(owner: &str, record: &MethodRecord) -> RemapResult<Self> {
        let descriptor = parse_method_descriptor(&record.descriptor)
            .map_err(|err| RemapError::malformed(format!("method {}.{}", owner, record.name), err.to_string()))?;
        let normalized_descriptor = descriptor.normalized();
        let instructions = &record.instructions;

        let mut excluded = vec![false; instructions.len()];
        let mut noisy_strings: BTreeSet<String> = BTreeSet::new();
        for block in &record.try_catch_blocks {
            if block.catch_type.as_deref() != Some(WRAPPER_CATCH_TYPE) {
                continue;
            }
            let wrapper = label_index(instructions, block.handler)
                .and_then(|handler| match_wrapper_handler(instructions, handler));
            if let Some(wrapper) = wrapper {
                excluded[wrapper.start..=wrapper.end].iter_mut().for_each(|e| *e = true);
                noisy_strings.insert(wrapper.noisy_string);
            }
        }

        let mut invoked: BTreeSet<String> = BTreeSet::new();
        let mut call_shapes: BTreeSet<String> = BTreeSet::new();
        let mut canonical_invoked: BTreeSet<String> = BTreeSet::new();
        let mut strings: BTreeSet<String> = BTreeSet::new();
        let mut opcode_histogram: BTreeMap<u8, u32> = BTreeMap::new();

        for (insn, _) in instructions.iter().zip(&excluded).filter(|(_, skip)| !**skip) {
            let Some(op) = insn.opcode() else { continue };
            *opcode_histogram.entry(op).or_insert(0) += 1;

            match insn {
                Insn::Ldc { value: Constant::String(s) } if !noisy_strings.contains(s) => {
                    strings.insert(s.clone());
                }
                Insn::Method { op, owner, name, desc } => {
                    invoked.insert(format!("{}.{}{}", owner, name, desc));
                    canonical_invoked.insert(canonical_call(*op, owner, name, desc));
                    call_shapes.insert(call_shape(owner, name, desc));
                }
                _ => {}
            }
        }

        let field_patterns = extract_field_patterns(instructions);
        let fingerprint = content_fingerprint(&normalized_descriptor, &opcode_histogram, &call_shapes, &strings);

        Ok(Self {
            key: record.key(owner),
            access: record.access,
            descriptor,
            normalized_descriptor,
            invoked,
            canonical_invoked,
            strings,
            opcode_histogram,
            field_patterns,
            instructions: instructions.clone(),
            fingerprint,
        })
    }

    #[inline]
    pub fn key(&self) -> &MethodKey {
        &self.key
    }

    #[inline]
    pub fn access(&self) -> u16 {
        self.access
    }

    #[inline]
    pub fn descriptor(&self) -> &MethodDescriptor {
        &self.descriptor
    }

    #[inline]
    pub fn normalized_descriptor(&self) -> &str {
        &self.normalized_descriptor
    }

    /// Raw `owner.name(desc)` tokens of every call instruction.
    #[inline]
    pub fn invoked(&self) -> &BTreeSet<String> {
        &self.invoked
    }

    /// Invoked tokens after plumbing canonicalization.
    #[inline]
    pub fn canonical_invoked(&self) -> &BTreeSet<String> {
        &self.canonical_invoked
    }

    #[inline]
    pub fn strings(&self) -> &BTreeSet<String> {
        &self.strings
    }

    #[inline]
    pub fn opcode_histogram(&self) -> &BTreeMap<u8, u32> {
        &self.opcode_histogram
    }

    #[inline]
    pub fn field_patterns(&self) -> &BTreeSet<String> {
        &self.field_patterns
    }

    /// The method's instruction stream, pseudo-instructions included.
    #[inline]
    pub fn instructions(&self) -> &[Insn] {
        &self.instructions
    }

    /// Hex SHA-256 of the build-stable features: normalized descriptor,
    /// opcode set, call shapes and strings. Equal across builds for a body
    /// that only had its names changed.
    #[inline]
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Token richness in `[0, 1]`, saturating at five signals.
    pub fn complexity(&self) -> f64 {
        let signals = self.canonical_invoked.len() + self.strings.len();
        (signals as f64 / 5.0).min(1.0)
    }

    /// Only plumbing calls, no strings and no field idioms.
    pub fn is_plumbing_only(&self) -> bool {
        self.canonical_invoked.iter().all(|t| is_plumbing_token(t))
            && self.strings.is_empty()
            && self.field_patterns.is_empty()
    }
}

fn content_fingerprint(
    normalized_descriptor: &str,
    opcode_histogram: &BTreeMap<u8, u32>,
    call_shapes: &BTreeSet<String>,
    strings: &BTreeSet<String>,
) -> String {
    let opcodes: Vec<String> = opcode_histogram.keys().map(|op| op.to_string()).collect();
    let mut hasher = Sha256::new();
    hasher.update(normalized_descriptor.as_bytes());
    hasher.update(b"|");
    hasher.update(opcodes.join(",").as_bytes());
    hasher.update(b"|");
    hasher.update(call_shapes.iter().map(String::as_str).collect::<Vec<_>>().join(",").as_bytes());
    hasher.update(b"|");
    hasher.update(strings.iter().map(String::as_str).collect::<Vec<_>>().join(",").as_bytes());
    hasher.update(b"|");

    let digest = hasher.finalize();
    let mut hex = String::with_capacity(64);
    for byte in digest.iter() {
        let _ = write!(hex, "{:02x}", byte);
    }
    hex
}

/// Normalized view of one field plus its read/write neighborhood.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedField {
    pub key: FieldKey,
    pub field_type: JvmType,
    pub is_static: bool,
    pub is_final: bool,
    pub readers: BTreeSet<MethodKey>,
    pub writers: BTreeSet<MethodKey>,
}

impl NormalizedField {
    /// Normalize a field record with an empty neighborhood.
    pub fn from_record(owner: &str, record: &FieldRecord) -> RemapResult<Self> {
        use crate::remapper::bytecode::access;

        let field_type = parse_field_type(&record.descriptor)
            .map_err(|err| RemapError::malformed(format!("field {}.{}", owner, record.name), err.to_string()))?;
        Ok(Self {
            key: FieldKey::new(owner, &record.name, &record.descriptor),
            field_type,
            is_static: access::has(record.access, access::STATIC),
            is_final: access::has(record.access, access::FINAL),
            readers: BTreeSet::new(),
            writers: BTreeSet::new(),
        })
    }

    /// Descriptor of the field type.
    #[inline]
    pub fn descriptor(&self) -> &str {
        &self.key.desc
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remapper::bytecode::TryCatchBlock;

    fn method(desc: &str, instructions: Vec<Insn>) -> MethodRecord {
        MethodRecord {
            name: "a".to_string(),
            descriptor: desc.to_string(),
            access: 0,
            instructions,
            try_catch_blocks: Vec::new(),
        }
    }

    fn call(op: u8, owner: &str, name: &str, desc: &str) -> Insn {
        Insn::Method { op, owner: owner.into(), name: name.into(), desc: desc.into() }
    }

    fn field(op: u8, owner: &str, name: &str, desc: &str) -> Insn {
        Insn::Field { op, owner: owner.into(), name: name.into(), desc: desc.into() }
    }

    #[test]
    fn test_plumbing_collapse() {
        assert_eq!(
            canonical_call(opcodes::INVOKESTATIC, "ln", "an", "(Ljava/lang/Throwable;Ljava/lang/String;)Lwu;"),
            EXCEPTION_WRAP_TOKEN
        );
        assert_eq!(
            canonical_call(opcodes::INVOKEVIRTUAL, STRING_BUILDER, "append", "(C)Ljava/lang/StringBuilder;"),
            STRING_BUILDER_TOKEN
        );
        assert_eq!(
            canonical_call(opcodes::INVOKEVIRTUAL, STRING_BUILDER, "append", "(I)Ljava/lang/StringBuilder;"),
            "java/lang/StringBuilder.append(I)Ljava/lang/StringBuilder;"
        );
    }

    #[test]
    fn test_string_builder_method_is_plumbing_only() {
        let record = method(
            "()Ljava/lang/String;",
            vec![
                Insn::Type { op: opcodes::NEW, desc: STRING_BUILDER.into() },
                Insn::Simple { op: opcodes::DUP },
                call(opcodes::INVOKESPECIAL, STRING_BUILDER, "<init>", "()V"),
                call(opcodes::INVOKEVIRTUAL, STRING_BUILDER, "toString", "()Ljava/lang/String;"),
                Insn::Simple { op: opcodes::ARETURN },
            ],
        );
        let normalized = NormalizedMethod::from_record("ab", &record).unwrap();
        assert_eq!(normalized.invoked().len(), 2);
        assert_eq!(normalized.canonical_invoked().len(), 1);
        assert!(normalized.is_plumbing_only());
        assert!((normalized.complexity() - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_field_pattern_tokens() {
        let instructions = vec![
            Insn::Label { id: 0 },
            Insn::Var { op: opcodes::ALOAD, var: 1 },
            field(opcodes::GETFIELD, "qq", "a", "I"),
            Insn::Var { op: opcodes::ALOAD, var: 1 },
            Insn::Var { op: opcodes::ILOAD, var: 2 },
            Insn::Int { op: opcodes::SIPUSH, operand: 31 },
            Insn::Simple { op: opcodes::IMUL },
            field(opcodes::PUTFIELD, "qq", "b", "I"),
            Insn::Var { op: opcodes::ALOAD, var: 1 },
            Insn::Simple { op: opcodes::ICONST_0 },
            field(opcodes::PUTFIELD, "qq", "c", "Z"),
            Insn::Var { op: opcodes::ALOAD, var: 0 },
            Insn::Var { op: opcodes::ALOAD, var: 0 },
            field(opcodes::GETFIELD, "zz", "d", "J"),
            Insn::Var { op: opcodes::ILOAD, var: 2 },
            Insn::Simple { op: opcodes::IADD },
            field(opcodes::PUTFIELD, "zz", "d", "J"),
            Insn::Var { op: opcodes::ALOAD, var: 1 },
            call(opcodes::INVOKEVIRTUAL, "qq", "x", "(Lpp;)V"),
            Insn::Simple { op: opcodes::RETURN },
        ];
        let tokens = extract_field_patterns(&instructions);
        let expected: BTreeSet<String> = [
            "ARG_GETFIELD:I",
            "ARG_ACCUM_MUL:I",
            "ARG_PUTFIELD:Z",
            "ARG_ZERO_FIELD:Z",
            "THIS_ACCUM_ADD:J",
            "CALL_ON_ARG:*(L*;)V",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        assert_eq!(tokens, expected);
    }

    #[test]
    fn test_wrapper_strings_excluded() {
        let record = MethodRecord {
            name: "b".to_string(),
            descriptor: "(I)V".to_string(),
            access: 0,
            instructions: vec![
                Insn::Label { id: 1 },
                Insn::Ldc { value: Constant::String("kept".into()) },
                call(opcodes::INVOKESTATIC, "ab", "p", "(Ljava/lang/String;)V"),
                Insn::Label { id: 2 },
                Insn::Simple { op: opcodes::RETURN },
                Insn::Label { id: 3 },
                Insn::Var { op: opcodes::ASTORE, var: 2 },
                Insn::Var { op: opcodes::ALOAD, var: 2 },
                Insn::Ldc { value: Constant::String("ab.b(".into()) },
                Insn::Ldc { value: Constant::String(")".into()) },
                Insn::Simple { op: opcodes::ATHROW },
            ],
            try_catch_blocks: vec![TryCatchBlock {
                start: 1,
                end: 2,
                handler: 3,
                catch_type: Some(WRAPPER_CATCH_TYPE.into()),
            }],
        };
        // Not the wrapper shape (second LDC instead of the helper call): strings stay.
        let normalized = NormalizedMethod::from_record("ab", &record).unwrap();
        assert!(normalized.strings().contains("ab.b("));

        let mut wrapped = record.clone();
        wrapped.instructions[8] = Insn::Ldc { value: Constant::String("ab.b(I)".into()) };
        wrapped.instructions[9] = call(
            opcodes::INVOKESTATIC,
            "ln",
            "an",
            "(Ljava/lang/Throwable;Ljava/lang/String;)Lwu;",
        );
        let normalized = NormalizedMethod::from_record("ab", &wrapped).unwrap();
        let expected: BTreeSet<String> = ["kept".to_string()].into_iter().collect();
        assert_eq!(normalized.strings(), &expected);
        assert!(!normalized.canonical_invoked().contains(EXCEPTION_WRAP_TOKEN));
        assert!(!normalized.opcode_histogram().contains_key(&opcodes::ATHROW));
    }

    #[test]
    fn test_fingerprint_ignores_obfuscated_descriptor_names() {
        let a = NormalizedMethod::from_record("ab", &method("(Lqq;)V", vec![Insn::Simple { op: opcodes::RETURN }])).unwrap();
        let b = NormalizedMethod::from_record("cd", &method("(Lzz;)V", vec![Insn::Simple { op: opcodes::RETURN }])).unwrap();
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint().len(), 64);
    }

    #[test]
    fn test_fingerprint_follows_call_shapes() {
        let calling = |owner: &str, name: &str| {
            let code = vec![call(opcodes::INVOKESTATIC, owner, name, "(I)V"), Insn::Simple { op: opcodes::RETURN }];
            NormalizedMethod::from_record("ab", &method("()V", code)).unwrap()
        };
        // Obfuscated targets collapse to their shape, platform targets keep their name.
        assert_eq!(calling("qq", "a").fingerprint(), calling("zz", "b").fingerprint());
        assert_ne!(
            calling("java/lang/System", "exit").fingerprint(),
            calling("java/lang/Thread", "sleep").fingerprint()
        );
    }

    #[test]
    fn test_malformed_descriptor_rejected() {
        let err = NormalizedMethod::from_record("ab", &method("", vec![])).unwrap_err();
        assert!(matches!(err, RemapError::MalformedElement { ref element, .. } if element == "method ab.a"));
    }
}

//! Class Fingerprints
//!
//! Cheap structural summary of a class used for class-level matching and as
//! the soft owner prior for method and field matching. Obfuscated type names
//! inside descriptors and the hierarchy are normalized the same way method
//! descriptors are, so fingerprints of the same class in two builds compare
//! equal.
//!
//! # Algorithm
//! Similarity is the weighted mean of nine components:
//! kind (1.0), hierarchy Jaccard (1.0), method-descriptor multiset Jaccard
//! (2.0), opcode cosine (2.0), string Jaccard (1.5), static-method Jaccard
//! (1.0), field-type multiset Jaccard (1.0), constructor-count closeness
//! (0.5) and static-initializer equality (0.2).

use crate::remapper::bytecode::{access, Constant, Insn};
use crate::remapper::descriptor::{is_stable_name, parse_field_type, parse_method_descriptor};
use crate::remapper::model::ClassRecord;
use crate::remapper::similarity::{cosine, jaccard, multiset_jaccard};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

const KIND_WEIGHT: f64 = 1.0;
const HIERARCHY_WEIGHT: f64 = 1.0;
const METHOD_DESC_WEIGHT: f64 = 2.0;
const OPCODE_WEIGHT: f64 = 2.0;
const STRING_WEIGHT: f64 = 1.5;
const STATIC_METHOD_WEIGHT: f64 = 1.0;
const FIELD_WEIGHT: f64 = 1.0;
const CONSTRUCTOR_WEIGHT: f64 = 0.5;
const STATIC_INIT_WEIGHT: f64 = 0.2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassKind {
    Class,
    Interface,
    Enum,
    Annotation,
}

impl ClassKind {
    pub fn from_access(flags: u16) -> Self {
        if access::has(flags, access::ANNOTATION) {
            ClassKind::Annotation
        } else if access::has(flags, access::INTERFACE) {
            ClassKind::Interface
        } else if access::has(flags, access::ENUM) {
            ClassKind::Enum
        } else {
            ClassKind::Class
        }
    }
}

fn normalize_name(name: &str) -> String {
    if is_stable_name(name) {
        name.to_string()
    } else {
        "*".to_string()
    }
}

fn normalize_method_desc(desc: &str) -> String {
    parse_method_descriptor(desc)
        .map(|d| d.normalized())
        .unwrap_or_else(|_| desc.to_string())
}

fn normalize_field_desc(desc: &str) -> String {
    parse_field_type(desc)
        .map(|t| t.normalized())
        .unwrap_or_else(|_| desc.to_string())
}

/// Structural summary of one class.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassFingerprint {
    pub name: String,
    pub kind: ClassKind,
    pub super_name: Option<String>,
    pub interfaces: BTreeSet<String>,
    pub constructor_count: usize,
    pub has_static_init: bool,
    /// Normalized method descriptor → count.
    pub method_descriptors: BTreeMap<String, u32>,
    /// Normalized descriptors of static methods.
    pub static_methods: BTreeSet<String>,
    pub opcode_histogram: BTreeMap<u8, u32>,
    pub strings: BTreeSet<String>,
    pub static_field_types: BTreeMap<String, u32>,
    pub instance_field_types: BTreeMap<String, u32>,
    pub method_count: usize,
    pub field_count: usize,
}

/// Per-component similarity of two fingerprints.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ClassSimilarity {
    pub kind: f64,
    pub hierarchy: f64,
    pub method_descriptors: f64,
    pub opcodes: f64,
    pub strings: f64,
    pub static_methods: f64,
    pub static_fields: f64,
    pub instance_fields: f64,
    pub constructors: f64,
    pub static_init: f64,
}

impl ClassSimilarity {
    /// Weighted mean in `[0, 1]`.
    pub fn weighted(&self) -> f64 {
        let fields = (self.static_fields + self.instance_fields) / 2.0;
        let sum = self.kind * KIND_WEIGHT
            + self.hierarchy * HIERARCHY_WEIGHT
            + self.method_descriptors * METHOD_DESC_WEIGHT
            + self.opcodes * OPCODE_WEIGHT
            + self.strings * STRING_WEIGHT
            + self.static_methods * STATIC_METHOD_WEIGHT
            + fields * FIELD_WEIGHT
            + self.constructors * CONSTRUCTOR_WEIGHT
            + self.static_init * STATIC_INIT_WEIGHT;
        let total_weight = KIND_WEIGHT
            + HIERARCHY_WEIGHT
            + METHOD_DESC_WEIGHT
            + OPCODE_WEIGHT
            + STRING_WEIGHT
            + STATIC_METHOD_WEIGHT
            + FIELD_WEIGHT
            + CONSTRUCTOR_WEIGHT
            + STATIC_INIT_WEIGHT;
        sum / total_weight
    }
}

impl ClassFingerprint {
    pub fn from_record(class: &ClassRecord) -> Self {
        let mut constructor_count: usize = 0;
        let mut has_static_init = false;
        let mut method_descriptors: BTreeMap<String, u32> = BTreeMap::new();
        let mut static_methods: BTreeSet<String> = BTreeSet::new();
        let mut opcode_histogram: BTreeMap<u8, u32> = BTreeMap::new();
        let mut strings: BTreeSet<String> = BTreeSet::new();

        for method in &class.methods {
            match method.name.as_str() {
                "<init>" => constructor_count += 1,
                "<clinit>" => has_static_init = true,
                _ => {}
            }
            let desc = normalize_method_desc(&method.descriptor);
            if method.is_static() {
                static_methods.insert(desc.clone());
            }
            *method_descriptors.entry(desc).or_insert(0) += 1;

            if method.is_abstract() {
                continue;
            }
            for insn in &method.instructions {
                let Some(op) = insn.opcode() else { continue };
                *opcode_histogram.entry(op).or_insert(0) += 1;
                if let Insn::Ldc { value: Constant::String(s) } = insn {
                    strings.insert(s.clone());
                }
            }
        }

        let mut static_field_types: BTreeMap<String, u32> = BTreeMap::new();
        let mut instance_field_types: BTreeMap<String, u32> = BTreeMap::new();
        for field in &class.fields {
            let target = if field.is_static() { &mut static_field_types } else { &mut instance_field_types };
            *target.entry(normalize_field_desc(&field.descriptor)).or_insert(0) += 1;
        }

        Self {
            name: class.name.clone(),
            kind: ClassKind::from_access(class.access),
            super_name: class.super_name.clone(),
            interfaces: class.interfaces.iter().cloned().collect(),
            constructor_count,
            has_static_init,
            method_descriptors,
            static_methods,
            opcode_histogram,
            strings,
            static_field_types,
            instance_field_types,
            method_count: class.methods.len(),
            field_count: class.fields.len(),
        }
    }

    fn hierarchy(&self) -> BTreeSet<String> {
        self.super_name
            .iter()
            .chain(self.interfaces.iter())
            .map(|n| normalize_name(n))
            .collect()
    }

    pub fn component_breakdown(&self, other: &ClassFingerprint) -> ClassSimilarity {
        let max_ctors = self.constructor_count.max(other.constructor_count).max(1) as f64;
        let ctor_diff = (self.constructor_count as f64 - other.constructor_count as f64).abs();

        ClassSimilarity {
            kind: if self.kind == other.kind { 1.0 } else { 0.0 },
            hierarchy: jaccard(&self.hierarchy(), &other.hierarchy()),
            method_descriptors: multiset_jaccard(&self.method_descriptors, &other.method_descriptors),
            opcodes: cosine(&self.opcode_histogram, &other.opcode_histogram),
            strings: jaccard(&self.strings, &other.strings),
            static_methods: jaccard(&self.static_methods, &other.static_methods),
            static_fields: multiset_jaccard(&self.static_field_types, &other.static_field_types),
            instance_fields: multiset_jaccard(&self.instance_field_types, &other.instance_field_types),
            constructors: 1.0 - ctor_diff / max_ctors,
            static_init: if self.has_static_init == other.has_static_init { 1.0 } else { 0.0 },
        }
    }

    /// Weighted similarity in `[0, 1]`.
    pub fn similarity(&self, other: &ClassFingerprint) -> f64 {
        self.component_breakdown(other).weighted()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remapper::bytecode::opcodes;
    use crate::remapper::model::{FieldRecord, MethodRecord};

    fn class(name: &str, field_type: &str, text: &str) -> ClassRecord {
        ClassRecord {
            name: name.to_string(),
            super_name: Some("java/lang/Object".to_string()),
            interfaces: vec![],
            access: access::PUBLIC,
            methods: vec![MethodRecord {
                name: "<init>".to_string(),
                descriptor: format!("(L{};)V", name),
                access: 0,
                instructions: vec![
                    Insn::Ldc { value: Constant::String(text.to_string()) },
                    Insn::Simple { op: opcodes::RETURN },
                ],
                try_catch_blocks: vec![],
            }],
            fields: vec![FieldRecord {
                name: "a".to_string(),
                descriptor: field_type.to_string(),
                access: 0,
            }],
        }
    }

    #[test]
    fn test_renamed_class_is_identical() {
        let a = ClassFingerprint::from_record(&class("ab", "Lqq;", "hello"));
        let b = ClassFingerprint::from_record(&class("cd", "Lzz;", "hello"));
        assert!((a.similarity(&b) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_differences_lower_similarity() {
        let a = ClassFingerprint::from_record(&class("ab", "I", "hello"));
        let b = ClassFingerprint::from_record(&class("cd", "J", "world"));
        let breakdown = a.component_breakdown(&b);
        assert_eq!(breakdown.strings, 0.0);
        assert_eq!(breakdown.instance_fields, 0.0);
        assert_eq!(breakdown.kind, 1.0);
        assert!(a.similarity(&b) < 1.0);
    }

    #[test]
    fn test_kind_from_access() {
        assert_eq!(ClassKind::from_access(access::INTERFACE | access::ANNOTATION), ClassKind::Annotation);
        assert_eq!(ClassKind::from_access(access::INTERFACE | access::ABSTRACT), ClassKind::Interface);
        assert_eq!(ClassKind::from_access(access::ENUM), ClassKind::Enum);
        assert_eq!(ClassKind::from_access(access::ABSTRACT), ClassKind::Class);
    }
}

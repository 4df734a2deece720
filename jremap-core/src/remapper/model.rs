//! Snapshot Records and Element Keys
//!
//! Input records produced by an external class-file reader, plus the
//! structural keys that identify classes, methods and fields within one
//! snapshot.

use crate::remapper::bytecode::{access, Insn, TryCatchBlock};
use crate::remapper::error::RemapResult;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Read;
use std::path::Path;

/// Structural identity of a method: `(owner, name, descriptor)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MethodKey {
    pub owner: String,
    pub name: String,
    pub desc: String,
}

impl MethodKey {
    pub fn new(owner: impl Into<String>, name: impl Into<String>, desc: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
            desc: desc.into(),
        }
    }
}

impl fmt::Display for MethodKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}{}", self.owner, self.name, self.desc)
    }
}

/// Structural identity of a field: `(owner, name, descriptor)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FieldKey {
    pub owner: String,
    pub name: String,
    pub desc: String,
}

impl FieldKey {
    pub fn new(owner: impl Into<String>, name: impl Into<String>, desc: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
            desc: desc.into(),
        }
    }
}

impl fmt::Display for FieldKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{} {}", self.owner, self.name, self.desc)
    }
}

/// Structural identity of a class. Classes carry no owner or descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClassKey {
    pub name: String,
}

impl ClassKey {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl fmt::Display for ClassKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Any element key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "element", rename_all = "snake_case")]
pub enum ElementKey {
    Class(ClassKey),
    Method(MethodKey),
    Field(FieldKey),
}

impl ElementKey {
    /// The `(owner, name, descriptor)` triple; classes use an empty owner and descriptor.
    pub fn triple(&self) -> (&str, &str, &str) {
        match self {
            ElementKey::Class(k) => ("", &k.name, ""),
            ElementKey::Method(k) => (&k.owner, &k.name, &k.desc),
            ElementKey::Field(k) => (&k.owner, &k.name, &k.desc),
        }
    }
}

impl fmt::Display for ElementKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ElementKey::Class(k) => k.fmt(f),
            ElementKey::Method(k) => k.fmt(f),
            ElementKey::Field(k) => k.fmt(f),
        }
    }
}

impl From<MethodKey> for ElementKey {
    fn from(key: MethodKey) -> Self {
        ElementKey::Method(key)
    }
}

impl From<FieldKey> for ElementKey {
    fn from(key: FieldKey) -> Self {
        ElementKey::Field(key)
    }
}

impl From<ClassKey> for ElementKey {
    fn from(key: ClassKey) -> Self {
        ElementKey::Class(key)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldRecord {
    pub name: String,
    /// Empty when the reader could not supply one; such fields are skipped.
    #[serde(default)]
    pub descriptor: String,
    #[serde(default)]
    pub access: u16,
}

impl FieldRecord {
    #[inline]
    pub fn is_static(&self) -> bool {
        access::has(self.access, access::STATIC)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodRecord {
    pub name: String,
    /// Empty when the reader could not supply one; such methods are skipped.
    #[serde(default)]
    pub descriptor: String,
    #[serde(default)]
    pub access: u16,
    #[serde(default)]
    pub instructions: Vec<Insn>,
    #[serde(default)]
    pub try_catch_blocks: Vec<TryCatchBlock>,
}

impl MethodRecord {
    #[inline]
    pub fn is_static(&self) -> bool {
        access::has(self.access, access::STATIC)
    }

    #[inline]
    pub fn is_abstract(&self) -> bool {
        access::has(self.access, access::ABSTRACT)
    }

    pub fn key(&self, owner: &str) -> MethodKey {
        MethodKey::new(owner, &self.name, &self.descriptor)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassRecord {
    pub name: String,
    #[serde(default)]
    pub super_name: Option<String>,
    #[serde(default)]
    pub interfaces: Vec<String>,
    #[serde(default)]
    pub access: u16,
    #[serde(default)]
    pub methods: Vec<MethodRecord>,
    #[serde(default)]
    pub fields: Vec<FieldRecord>,
}

impl ClassRecord {
    pub fn key(&self) -> ClassKey {
        ClassKey::new(&self.name)
    }

    pub fn find_method(&self, name: &str, desc: &str) -> Option<&MethodRecord> {
        self.methods.iter().find(|m| m.name == name && m.descriptor == desc)
    }
}

/// One parsed build of the program.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub classes: Vec<ClassRecord>,
}

impl Snapshot {
    pub fn new(classes: Vec<ClassRecord>) -> Self {
        Self { classes }
    }

    /// Load a JSON snapshot from disk.
    pub fn load(path: &Path) -> RemapResult<Self> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(std::io::BufReader::new(file))
    }

    pub fn from_reader<R: Read>(reader: R) -> RemapResult<Self> {
        let snapshot: Snapshot = serde_json::from_reader(reader)?;
        log::debug!("Loaded snapshot with {} classes", snapshot.classes.len());
        Ok(snapshot)
    }

    pub fn class(&self, name: &str) -> Option<&ClassRecord> {
        self.classes.iter().find(|c| c.name == name)
    }

    /// Every `(owner, method)` pair in class order.
    pub fn methods(&self) -> impl Iterator<Item = (&ClassRecord, &MethodRecord)> {
        self.classes
            .iter()
            .flat_map(|c| c.methods.iter().map(move |m| (c, m)))
    }

    pub fn method_count(&self) -> usize {
        self.classes.iter().map(|c| c.methods.len()).sum()
    }
}

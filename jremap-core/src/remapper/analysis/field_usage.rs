// Field usage extraction
use crate::remapper::bytecode::{opcodes, Insn};
use crate::remapper::model::{ClassRecord, FieldKey, MethodKey};
use crate::remapper::normalize::{NormalizedField, NormalizedMethod};
use std::collections::{BTreeMap, HashMap};

/// Normalize every declared field and fill its reader/writer sets from the
/// given methods.
///
/// Accesses through a subclass owner resolve to the declaring class by
/// walking the superclass chain. Accesses to undeclared (library) fields are
/// ignored. Fields with malformed descriptors are logged and skipped.
pub fn extract_field_usage<'a, I>(classes: &[ClassRecord], methods: I) -> BTreeMap<FieldKey, NormalizedField>
where
    I: IntoIterator<Item = &'a NormalizedMethod>,
{
    let mut fields: BTreeMap<FieldKey, NormalizedField> = BTreeMap::new();
    for class in classes {
        for record in &class.fields {
            match NormalizedField::from_record(&class.name, record) {
                Ok(field) => {
                    fields.insert(field.key.clone(), field);
                }
                Err(err) => log::warn!("Skipping field {}.{}: {}", class.name, record.name, err),
            }
        }
    }

    let supers: HashMap<&str, &str> = classes
        .iter()
        .filter_map(|c| c.super_name.as_deref().map(|s| (c.name.as_str(), s)))
        .collect();

    for method in methods {
        for insn in method.instructions() {
            let Insn::Field { op, owner, name, desc } = insn else { continue };
            let Some(key) = resolve_field(&fields, &supers, owner, name, desc) else { continue };
            let Some(field) = fields.get_mut(&key) else { continue };
            let accessor: MethodKey = method.key().clone();
            match *op {
                opcodes::GETFIELD | opcodes::GETSTATIC => {
                    field.readers.insert(accessor);
                }
                opcodes::PUTFIELD | opcodes::PUTSTATIC => {
                    field.writers.insert(accessor);
                }
                _ => {}
            }
        }
    }
    fields
}

fn resolve_field(
    fields: &BTreeMap<FieldKey, NormalizedField>,
    supers: &HashMap<&str, &str>,
    owner: &str,
    name: &str,
    desc: &str,
) -> Option<FieldKey> {
    let mut current: &str = owner;
    // Bounded walk guards against cyclic hierarchies in malformed input.
    for _ in 0..64 {
        let key = FieldKey::new(current, name, desc);
        if fields.contains_key(&key) {
            return Some(key);
        }
        current = *supers.get(current)?;
    }
    None
}

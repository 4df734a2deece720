//! Opaque-Predicate Constant Recovery
//!
//! Obfuscators append a numeric "garbage" parameter to many methods and guard
//! the body with a comparison against a literal that throws
//! `IllegalStateException` on mismatch. Call sites all pass the expected
//! literal, so the most frequent resolvable argument reveals it.
//!
//! # Detection
//! A method is a guard candidate when its last parameter is int-like
//! (`B`, `S`, `I`, `C`, `Z`) and the body contains either
//! `ILOAD last; <int const>; IF*` or `ILOAD last; IFEQ/IFNE` where the jump
//! target or the fall-through reaches `NEW IllegalStateException; DUP;
//! INVOKESPECIAL <init>; ATHROW`.
//!
//! # Recovery
//! Every invoke of a guard method is resolved with
//! [`stack_sim::constant_before`]. Unresolved sites contribute nothing; a
//! guard with no resolved site is omitted.

use crate::remapper::analysis::stack_sim;
use crate::remapper::bytecode::{label_index, opcodes, Insn};
use crate::remapper::descriptor::parse_method_descriptor;
use crate::remapper::model::{MethodKey, MethodRecord, Snapshot};
use std::collections::{BTreeMap, BTreeSet};

const ILLEGAL_STATE: &str = "java/lang/IllegalStateException";

/// Local slot holding the last parameter, when it is int-like.
fn guarded_param_slot(method: &MethodRecord) -> Option<u16> {
    let desc = parse_method_descriptor(&method.descriptor).ok()?;
    let (last, leading) = desc.params.split_last()?;
    if !last.is_int_like() {
        return None;
    }
    let receiver = usize::from(!method.is_static());
    let slot = receiver + leading.iter().map(|p| p.slot_size()).sum::<usize>();
    u16::try_from(slot).ok()
}

/// Next real instruction at or after `from`.
fn next_real(instructions: &[Insn], from: usize) -> Option<usize> {
    (from..instructions.len()).find(|&i| !instructions[i].is_pseudo())
}

/// `NEW ISE; DUP; INVOKESPECIAL ISE.<init>; ATHROW` anywhere from `start` on.
fn throws_illegal_state_from(instructions: &[Insn], start: usize) -> bool {
    let mut cursor = start;
    while let Some(i) = next_real(instructions, cursor) {
        cursor = i + 1;
        let Insn::Type { op: opcodes::NEW, desc } = &instructions[i] else { continue };
        if desc != ILLEGAL_STATE {
            continue;
        }
        let Some(dup) = next_real(instructions, i + 1) else { return false };
        if instructions[dup].opcode() != Some(opcodes::DUP) {
            continue;
        }
        let Some(init) = next_real(instructions, dup + 1) else { return false };
        let is_ctor = matches!(
            &instructions[init],
            Insn::Method { op: opcodes::INVOKESPECIAL, owner, name, .. }
                if owner == ILLEGAL_STATE && name == "<init>"
        );
        if !is_ctor {
            continue;
        }
        if let Some(throw) = next_real(instructions, init + 1) {
            if instructions[throw].opcode() == Some(opcodes::ATHROW) {
                return true;
            }
        }
    }
    false
}

fn jump_reaches_throw(instructions: &[Insn], jump_at: usize) -> bool {
    let Insn::Jump { label, .. } = &instructions[jump_at] else { return false };
    let via_target = label_index(instructions, *label).map_or(false, |t| throws_illegal_state_from(instructions, t));
    via_target || throws_illegal_state_from(instructions, jump_at + 1)
}

/// `true` when `method` compares its last parameter and throws on mismatch.
pub fn is_guard_method(method: &MethodRecord) -> bool {
    let Some(slot) = guarded_param_slot(method) else { return false };
    let code = &method.instructions;

    for (i, insn) in code.iter().enumerate() {
        if insn.var_of(opcodes::ILOAD) != Some(slot) {
            continue;
        }
        let Some(next) = next_real(code, i + 1) else { continue };

        if code[next].int_constant().is_some() {
            if let Some(branch) = next_real(code, next + 1) {
                if matches!(code[branch], Insn::Jump { .. }) && jump_reaches_throw(code, branch) {
                    return true;
                }
            }
        }

        if matches!(code[next], Insn::Jump { op: opcodes::IFEQ | opcodes::IFNE, .. }) && jump_reaches_throw(code, next) {
            return true;
        }
    }
    false
}

/// Recovers the literal expected by each guard method.
pub struct OpaqueCollector<'a> {
    methods: BTreeMap<MethodKey, &'a MethodRecord>,
}

impl<'a> OpaqueCollector<'a> {
    pub fn new(methods: BTreeMap<MethodKey, &'a MethodRecord>) -> Self {
        Self { methods }
    }

    /// Every method of `snapshot`, optionally restricted to `reachable`.
    pub fn from_snapshot(snapshot: &'a Snapshot, reachable: Option<&BTreeSet<MethodKey>>) -> Self {
        let methods = snapshot
            .methods()
            .map(|(class, method)| (method.key(&class.name), method))
            .filter(|(key, _)| reachable.map_or(true, |r| r.contains(key)))
            .collect();
        Self::new(methods)
    }

    pub fn guard_methods(&self) -> BTreeSet<MethodKey> {
        self.methods
            .iter()
            .filter(|(_, m)| is_guard_method(m))
            .map(|(k, _)| k.clone())
            .collect()
    }

    /// Resolved last-argument values at every call of `target`, as value → count.
    pub fn call_site_values(&self, target: &MethodKey) -> BTreeMap<i32, u32> {
        let mut freq: BTreeMap<i32, u32> = BTreeMap::new();
        for caller in self.methods.values() {
            for (i, insn) in caller.instructions.iter().enumerate() {
                let Insn::Method { owner, name, desc, .. } = insn else { continue };
                if *owner != target.owner || *name != target.name || *desc != target.desc {
                    continue;
                }
                if let Some(v) = stack_sim::constant_before(&caller.instructions, i) {
                    *freq.entry(v).or_insert(0) += 1;
                }
            }
        }
        freq
    }

    /// Most frequent resolved constant per guard method; ties go to the smaller value.
    pub fn collect_most_frequent(&self) -> BTreeMap<MethodKey, i32> {
        let guards = self.guard_methods();
        log::debug!("Opaque predicates: {} guard candidates", guards.len());

        let mut result: BTreeMap<MethodKey, i32> = BTreeMap::new();
        for guard in guards {
            let freq = self.call_site_values(&guard);
            // Ascending keys, so the first maximum is the smallest tied value.
            let best = freq
                .iter()
                .fold(None, |best: Option<(i32, u32)>, (&value, &count)| match best {
                    Some((_, c)) if c >= count => best,
                    _ => Some((value, count)),
                });
            if let Some((value, _)) = best {
                result.insert(guard, value);
            }
        }
        log::info!("Opaque predicates: recovered {} constants", result.len());
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remapper::bytecode::access;

    fn guard_body(slot: u16) -> Vec<Insn> {
        vec![
            Insn::Var { op: opcodes::ILOAD, var: slot },
            Insn::Int { op: opcodes::SIPUSH, operand: 1000 },
            Insn::Jump { op: opcodes::IF_ICMPEQ, label: 1 },
            Insn::Type { op: opcodes::NEW, desc: ILLEGAL_STATE.into() },
            Insn::Simple { op: opcodes::DUP },
            Insn::Method {
                op: opcodes::INVOKESPECIAL,
                owner: ILLEGAL_STATE.into(),
                name: "<init>".into(),
                desc: "()V".into(),
            },
            Insn::Simple { op: opcodes::ATHROW },
            Insn::Label { id: 1 },
            Insn::Simple { op: opcodes::RETURN },
        ]
    }

    fn record(desc: &str, flags: u16, instructions: Vec<Insn>) -> MethodRecord {
        MethodRecord {
            name: "g".into(),
            descriptor: desc.into(),
            access: flags,
            instructions,
            try_catch_blocks: vec![],
        }
    }

    #[test]
    fn test_slot_accounts_for_wide_params() {
        let m = record("(JLjava/lang/String;I)V", 0, vec![]);
        assert_eq!(guarded_param_slot(&m), Some(4));
        let s = record("(DI)V", access::STATIC, vec![]);
        assert_eq!(guarded_param_slot(&s), Some(2));
        assert_eq!(guarded_param_slot(&record("(IJ)V", 0, vec![])), None);
    }

    #[test]
    fn test_detects_guard() {
        assert!(is_guard_method(&record("(JI)V", 0, guard_body(3))));
        // Wrong slot.
        assert!(!is_guard_method(&record("(JI)V", 0, guard_body(1))));
    }

    #[test]
    fn test_ifeq_guard() {
        let body = vec![
            Insn::Var { op: opcodes::ILOAD, var: 0 },
            Insn::Jump { op: opcodes::IFNE, label: 7 },
            Insn::Simple { op: opcodes::RETURN },
            Insn::Label { id: 7 },
            Insn::Type { op: opcodes::NEW, desc: ILLEGAL_STATE.into() },
            Insn::Simple { op: opcodes::DUP },
            Insn::Method {
                op: opcodes::INVOKESPECIAL,
                owner: ILLEGAL_STATE.into(),
                name: "<init>".into(),
                desc: "()V".into(),
            },
            Insn::Simple { op: opcodes::ATHROW },
        ];
        assert!(is_guard_method(&record("(Z)V", access::STATIC, body)));
    }
}

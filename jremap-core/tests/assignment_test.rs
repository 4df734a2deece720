//! Hungarian assignment and field matching

mod common;

use common::*;
use jremap_core::remapper::analysis::field_usage::extract_field_usage;
use jremap_core::remapper::bytecode::opcodes;
use jremap_core::remapper::config::MatcherConfig;
use jremap_core::remapper::descriptor::JvmType;
use jremap_core::remapper::hungarian;
use jremap_core::remapper::matcher::fields::{field_score_breakdown, FieldMatcher};
use jremap_core::remapper::model::{FieldKey, MethodKey};
use jremap_core::remapper::normalize::{NormalizedField, NormalizedMethod};
use pretty_assertions::assert_eq;
use std::collections::{BTreeMap, BTreeSet};

#[test]
fn test_hungarian_unique_optimum() {
    let weights = vec![
        vec![5.0, 9.0, 1.0],
        vec![10.0, 3.0, 2.0],
        vec![8.0, 7.0, 4.0],
    ];
    assert_eq!(hungarian::maximize(&weights), vec![Some(1), Some(0), Some(2)]);
}

#[test]
fn test_hungarian_all_zero_is_a_permutation() {
    let weights = vec![vec![0.0; 3]; 3];
    let assignment = hungarian::maximize(&weights);
    let columns: BTreeSet<usize> = assignment.iter().map(|c| c.unwrap()).collect();
    assert_eq!(assignment.len(), 3);
    assert_eq!(columns, (0..3).collect::<BTreeSet<usize>>());
}

#[test]
#[should_panic(expected = "matrix must be")]
fn test_hungarian_rejects_ragged_matrix() {
    hungarian::solve(&[vec![1.0, 2.0], vec![3.0]]);
}

fn plain_field(owner: &str, name: &str) -> NormalizedField {
    NormalizedField {
        key: FieldKey::new(owner, name, "I"),
        field_type: JvmType::Int,
        is_static: false,
        is_final: false,
        readers: BTreeSet::new(),
        writers: BTreeSet::new(),
    }
}

fn keyed(fields: Vec<NormalizedField>) -> BTreeMap<FieldKey, NormalizedField> {
    fields.into_iter().map(|f| (f.key.clone(), f)).collect()
}

#[test]
fn test_field_assignment_is_one_to_one() {
    let old = keyed((0..5).map(|i| plain_field("aa", &format!("f{}", i))).collect());
    let new = keyed((0..4).map(|i| plain_field("bb", &format!("g{}", i))).collect());
    let mapping: BTreeMap<MethodKey, MethodKey> = BTreeMap::new();
    let config = MatcherConfig::default();

    let matches = FieldMatcher::new(&mapping, &config).match_one_to_one(&old, &new);
    assert_eq!(matches.len(), 4);
    let targets: BTreeSet<&FieldKey> = matches.iter().map(|m| &m.new).collect();
    assert_eq!(targets.len(), matches.len());
    let sources: BTreeSet<&FieldKey> = matches.iter().map(|m| &m.old).collect();
    assert_eq!(sources.len(), matches.len());
}

#[test]
fn test_constructor_written_getter_read_field_agrees_fully() {
    let build = |class: &str, name: &str, getter: &str| {
        ClassBuilder::new(class)
            .field(field(name, "I", 0))
            .method(method(
                "<init>",
                "()V",
                0,
                vec![
                    var(opcodes::ALOAD, 0),
                    push_int(3),
                    field_insn(opcodes::PUTFIELD, class, name, "I"),
                    simple(opcodes::RETURN),
                ],
            ))
            .method(method(
                getter,
                "()I",
                0,
                vec![
                    var(opcodes::ALOAD, 0),
                    field_insn(opcodes::GETFIELD, class, name, "I"),
                    simple(opcodes::IRETURN),
                ],
            ))
            .build()
    };
    let old_class = build("aa", "q", "r");
    let new_class = build("bb", "s", "t");

    let normalize = |class: &jremap_core::remapper::model::ClassRecord| -> Vec<NormalizedMethod> {
        class
            .methods
            .iter()
            .map(|m| NormalizedMethod::from_record(&class.name, m).unwrap())
            .collect()
    };
    let old_methods = normalize(&old_class);
    let new_methods = normalize(&new_class);
    let old_fields = extract_field_usage(std::slice::from_ref(&old_class), old_methods.iter());
    let new_fields = extract_field_usage(std::slice::from_ref(&new_class), new_methods.iter());

    let mut mapping: BTreeMap<MethodKey, MethodKey> = BTreeMap::new();
    mapping.insert(MethodKey::new("aa", "<init>", "()V"), MethodKey::new("bb", "<init>", "()V"));
    mapping.insert(MethodKey::new("aa", "r", "()I"), MethodKey::new("bb", "t", "()I"));

    let old_field = &old_fields[&FieldKey::new("aa", "q", "I")];
    let new_field = &new_fields[&FieldKey::new("bb", "s", "I")];
    assert_eq!(old_field.writers.len(), 1);
    assert_eq!(old_field.readers.len(), 1);

    let breakdown = field_score_breakdown(old_field, new_field, &mapping, 0.4);
    assert_eq!(breakdown.neighborhood, 1.0);
    assert_eq!(breakdown.type_match, 1.0);
}

fn read_field(owner: &str, name: &str, field_type: JvmType, is_static: bool, reader: &str) -> NormalizedField {
    let desc = field_type.descriptor();
    NormalizedField {
        key: FieldKey::new(owner, name, desc),
        field_type,
        is_static,
        is_final: false,
        readers: [MethodKey::new(owner, reader, "()V")].into_iter().collect(),
        writers: BTreeSet::new(),
    }
}

fn method_mapping(pairs: &[((&str, &str), (&str, &str))]) -> BTreeMap<MethodKey, MethodKey> {
    pairs
        .iter()
        .map(|((o_owner, o_name), (n_owner, n_name))| {
            (MethodKey::new(*o_owner, *o_name, "()V"), MethodKey::new(*n_owner, *n_name, "()V"))
        })
        .collect()
}

/// f0 fits g0 best; f1 also fits g0 but g1 fits nothing.
fn contested_fields() -> (BTreeMap<FieldKey, NormalizedField>, BTreeMap<FieldKey, NormalizedField>) {
    let old = keyed(vec![
        read_field("aa", "f0", JvmType::Int, false, "r1"),
        read_field("aa", "f1", JvmType::Int, false, "r2"),
    ]);
    let new = keyed(vec![
        read_field("bb", "g0", JvmType::Int, false, "s1"),
        read_field("bb", "g1", JvmType::Long, true, "s9"),
    ]);
    (old, new)
}

#[test]
fn test_sub_threshold_assignment_is_dropped() {
    let (old, new) = contested_fields();
    let mapping = method_mapping(&[(("aa", "r1"), ("bb", "s1")), (("aa", "r2"), ("bb", "s2"))]);
    let config = MatcherConfig::default();

    // The optimum pairs f1 with g1 (below threshold) so f0 can keep g0;
    // f1 ends up unmatched even though f1 -> g0 alone would pass.
    let matches = FieldMatcher::new(&mapping, &config).match_one_to_one(&old, &new);
    let pairs: Vec<(&str, &str)> = matches.iter().map(|m| (m.old.name.as_str(), m.new.name.as_str())).collect();
    assert_eq!(pairs, vec![("f0", "g0")]);
    assert!((matches[0].score - 0.95).abs() < 1e-12);
}

#[test]
fn test_top_k_lists_every_candidate_above_threshold() {
    let (old, new) = contested_fields();
    let mapping = method_mapping(&[(("aa", "r1"), ("bb", "s1")), (("aa", "r2"), ("bb", "s2"))]);
    let config = MatcherConfig::default();

    let matches = FieldMatcher::new(&mapping, &config).match_top_k(&old, &new);
    let pairs: Vec<(&str, &str)> = matches.iter().map(|m| (m.old.name.as_str(), m.new.name.as_str())).collect();
    assert_eq!(pairs, vec![("f0", "g0"), ("f1", "g0")]);
    assert!((matches[0].score - 0.95).abs() < 1e-12);
    assert!((matches[1].score - 0.75).abs() < 1e-12);

    let narrow = MatcherConfig { min_field_score: 0.9, ..MatcherConfig::default() };
    assert_eq!(FieldMatcher::new(&mapping, &narrow).match_top_k(&old, &new).len(), 1);
}

#[test]
fn test_class_alignment_changes_the_winner() {
    let old = keyed(vec![read_field("aa", "f", JvmType::Int, false, "r")]);
    let new = keyed(vec![
        read_field("bb", "p", JvmType::Int, false, "s"),
        read_field("cc", "q", JvmType::Int, false, "t"),
    ]);
    let mapping = method_mapping(&[(("aa", "r"), ("bb", "s"))]);
    let config = MatcherConfig::default();

    let unaligned = FieldMatcher::new(&mapping, &config).match_one_to_one(&old, &new);
    assert_eq!(unaligned[0].new.name, "p");

    // p: 0.95·0.8 = 0.76, q: 0.75·0.8 + 0.2 = 0.80
    let classes: BTreeMap<String, String> = [("aa".to_string(), "cc".to_string())].into_iter().collect();
    let aligned = FieldMatcher::new(&mapping, &config)
        .with_class_matches(&classes)
        .match_one_to_one(&old, &new);
    assert_eq!(aligned.len(), 1);
    assert_eq!(aligned[0].new.name, "q");
    assert!((aligned[0].score - 0.8).abs() < 1e-12);
}

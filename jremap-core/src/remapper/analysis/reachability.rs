//! Reachability Scanner
//!
//! Finds the methods worth matching: everything transitively invoked from
//! framework callbacks (applet lifecycle, listeners, `Runnable.run`, ...)
//! implemented by obfuscated-looking classes.
//!
//! # Algorithm
//! 1. Seed every concrete method of an obfuscated-looking class whose name is
//!    a framework callback name
//! 2. Worklist expansion over invoke instructions whose owner is also
//!    obfuscated-looking
//! 3. Abstract callees resolve to the first concrete override in a subclass
//!    or implementor
//!
//! The worklist and visited set live on the stack of one call, so the scanner
//! is reentrant.

use crate::remapper::bytecode::Insn;
use crate::remapper::model::{ClassRecord, MethodKey, MethodRecord};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, VecDeque};

const DEFAULT_CALLBACKS: &[&str] = &[
    // java.applet.Applet
    "init", "start", "stop", "destroy", "paint", "update", "getAppletInfo", "getParameter",
    "getParameterInfo", "isActive", "resize", "showStatus", "getAppletContext", "getCodeBase",
    "getDocumentBase", "setStub",
    // java.lang.Runnable / java.util.concurrent.Callable / ThreadFactory
    "run", "call", "newThread",
    // java.awt.event listeners
    "focusGained", "focusLost",
    "windowOpened", "windowClosing", "windowClosed", "windowIconified", "windowDeiconified",
    "windowActivated", "windowDeactivated",
    "mouseClicked", "mousePressed", "mouseReleased", "mouseEntered", "mouseExited",
    "mouseDragged", "mouseMoved", "mouseWheelMoved",
    "keyTyped", "keyPressed", "keyReleased",
    // java.util.Comparator / Iterable / Iterator / Collection
    "compare", "reversed", "thenComparing", "iterator", "forEach", "spliterator",
    "hasNext", "next", "remove", "size", "isEmpty", "contains", "toArray", "add",
    "containsAll", "addAll", "removeAll", "removeIf", "retainAll", "clear", "stream",
    "parallelStream",
    // javax.net.ssl sockets and TLS client callbacks
    "getSession", "startHandshake", "getSupportedCipherSuites", "getEnabledCipherSuites",
    "createSocket", "getDefaultCipherSuites", "getAuthentication", "notifyServerCertificate",
    "getClientCredentials", "getCipherSuites",
];

/// Which classes look obfuscated and which methods are entry points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EntryPolicy {
    /// Class names up to this length count as obfuscated.
    pub max_obfuscated_name_len: usize,
    /// Unobfuscated class names treated as obfuscated (e.g. the main client class).
    pub allow_listed: BTreeSet<String>,
    /// Method names that framework code calls back into.
    pub callback_names: BTreeSet<String>,
}

impl Default for EntryPolicy {
    fn default() -> Self {
        Self {
            max_obfuscated_name_len: 2,
            allow_listed: ["client".to_string()].into_iter().collect(),
            callback_names: DEFAULT_CALLBACKS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl EntryPolicy {
    #[inline]
    pub fn is_obfuscated(&self, class_name: &str) -> bool {
        class_name.len() <= self.max_obfuscated_name_len || self.allow_listed.contains(class_name)
    }

    #[inline]
    pub fn is_callback(&self, method_name: &str) -> bool {
        self.callback_names.contains(method_name)
    }
}

struct ClassIndex<'a> {
    classes: &'a [ClassRecord],
    by_name: HashMap<&'a str, &'a ClassRecord>,
}

impl<'a> ClassIndex<'a> {
    fn new(classes: &'a [ClassRecord]) -> Self {
        Self {
            classes,
            by_name: classes.iter().map(|c| (c.name.as_str(), c)).collect(),
        }
    }

    fn method(&self, key: &MethodKey) -> Option<&'a MethodRecord> {
        let class: &'a ClassRecord = self.by_name.get(key.owner.as_str()).copied()?;
        class.find_method(&key.name, &key.desc)
    }

    /// `true` when `candidate` is a strict subtype of `target`.
    fn extends_or_implements(&self, candidate: &ClassRecord, target: &str) -> bool {
        if candidate.name == target {
            return false;
        }
        let mut seen: BTreeSet<&str> = BTreeSet::new();
        let mut pending: Vec<&str> = vec![candidate.name.as_str()];
        while let Some(name) = pending.pop() {
            if !seen.insert(name) {
                continue;
            }
            if name == target && name != candidate.name {
                return true;
            }
            if let Some(class) = self.by_name.get(name) {
                pending.extend(class.super_name.as_deref());
                pending.extend(class.interfaces.iter().map(String::as_str));
            }
        }
        false
    }

    /// First concrete override of `name desc` in a subtype of `owner`.
    fn resolve_override(&self, owner: &str, name: &str, desc: &str) -> Option<MethodKey> {
        self.classes
            .iter()
            .filter(|c| self.extends_or_implements(c, owner))
            .find_map(|c| {
                c.find_method(name, desc)
                    .filter(|m| !m.is_abstract())
                    .map(|m| m.key(&c.name))
            })
    }
}

/// Methods transitively reachable from framework callbacks.
pub fn find_used_methods(classes: &[ClassRecord], policy: &EntryPolicy) -> BTreeSet<MethodKey> {
    let index = ClassIndex::new(classes);
    let mut worklist: VecDeque<MethodKey> = VecDeque::new();
    let mut used: BTreeSet<MethodKey> = BTreeSet::new();

    for class in classes.iter().filter(|c| policy.is_obfuscated(&c.name)) {
        for method in &class.methods {
            if !method.is_abstract() && policy.is_callback(&method.name) {
                worklist.push_back(method.key(&class.name));
            }
        }
    }
    log::debug!("Reachability: {} entry points", worklist.len());

    while let Some(next) = worklist.pop_front() {
        if used.contains(&next) {
            continue;
        }
        let Some(method) = index.method(&next) else {
            continue;
        };
        used.insert(next);

        for insn in &method.instructions {
            let Insn::Method { owner, name, desc, .. } = insn else { continue };
            if !policy.is_obfuscated(owner) {
                continue;
            }
            let callee_key = MethodKey::new(owner, name, desc);
            let Some(callee) = index.method(&callee_key) else { continue };

            if callee.is_abstract() {
                if let Some(concrete) = index.resolve_override(owner, name, desc) {
                    worklist.push_back(concrete);
                }
            } else {
                worklist.push_back(callee_key);
            }
        }
    }

    log::info!("Reachability: {} methods in use", used.len());
    used
}

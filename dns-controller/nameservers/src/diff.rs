use ahash::AHashMap as HashMap;
use local_dns_controller_core::{Record, RecordKey, RecordSet};

/// The protocol operations one reconcile pass must perform. They are issued
/// in field order: removals release names before additions claim them.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct Changes {
    pub remove: Vec<Record>,
    pub add: Vec<Record>,
    pub modify: Vec<Record>,
}

impl Changes {
    pub fn is_empty(&self) -> bool {
        self.remove.is_empty() && self.add.is_empty() && self.modify.is_empty()
    }
}

/// Restricts a snapshot to the records whose fqdn ends in `suffix`.
pub(crate) fn domain_filter(snapshot: &RecordSet, suffix: &str) -> RecordSet {
    snapshot
        .iter()
        .filter(|record| record.fqdn().ends_with(suffix))
        .cloned()
        .collect()
}

/// Computes the operations that bring `published` in line with `desired`.
///
/// Records are matched on their key; a published record whose key survives
/// but whose port changed is a modification.
pub(crate) fn diff(published: &HashMap<RecordKey, Record>, desired: &RecordSet) -> Changes {
    let desired: HashMap<RecordKey, &Record> =
        desired.iter().map(|record| (record.key(), record)).collect();

    let mut changes = Changes::default();
    for (key, record) in published {
        match desired.get(key) {
            None => changes.remove.push(record.clone()),
            Some(&want) if want != record => changes.modify.push(want.clone()),
            Some(_) => {}
        }
    }
    for (key, &record) in &desired {
        if !published.contains_key(key) {
            changes.add.push(record.clone());
        }
    }

    changes.remove.sort();
    changes.add.sort();
    changes.modify.sort();
    changes
}

//! Per-document results keyed by URI, with version tickets so a slow
//! reindex pass can never overwrite a newer one.

use std::collections::HashMap;

use crate::index::IndexOutput;

/// Monotonic per-document reindex ticket.
pub type Ticket = u64;

#[derive(Debug, Default)]
struct Slot {
    issued: Ticket,
    current: Option<IndexOutput>,
}

/// Latest successfully indexed state of every open document.
///
/// A pass that fails installs nothing, so the previous state keeps serving
/// queries until a later pass succeeds.
#[derive(Debug, Default)]
pub struct DocumentStore {
    slots: HashMap<String, Slot>,
}

impl DocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issues the ticket for the next reindex pass of `uri`. Any pass still
    /// in flight under an earlier ticket becomes stale.
    pub fn begin(&mut self, uri: &str) -> Ticket {
        let slot = self.slots.entry(uri.to_string()).or_default();
        slot.issued += 1;
        slot.issued
    }

    /// Installs a finished pass if its ticket is still the newest issued
    /// one. Returns whether the result was installed.
    pub fn apply(&mut self, uri: &str, ticket: Ticket, output: IndexOutput) -> bool {
        let Some(slot) = self.slots.get_mut(uri) else {
            return false;
        };
        if ticket != slot.issued {
            return false;
        }
        slot.current = Some(output);
        true
    }

    pub fn get(&self, uri: &str) -> Option<&IndexOutput> {
        self.slots.get(uri).and_then(|slot| slot.current.as_ref())
    }

    /// Drops everything known about `uri`, including pending tickets.
    pub fn remove(&mut self, uri: &str) {
        self.slots.remove(uri);
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;
    use crate::index::IndexBuilder;

    fn output(src: &str, report: &str) -> IndexOutput {
        IndexBuilder::new(src, "main.k", Path::new("/proj"))
            .run(report)
            .unwrap()
    }

    #[test]
    fn tickets_are_monotonic_per_document() {
        let mut store = DocumentStore::new();
        let a1 = store.begin("file:///a.k");
        let a2 = store.begin("file:///a.k");
        let b1 = store.begin("file:///b.k");
        assert!(a2 > a1);
        assert_eq!(b1, 1);
    }

    #[test]
    fn stale_result_is_discarded() {
        let mut store = DocumentStore::new();
        let uri = "file:///a.k";
        let old = store.begin(uri);
        let new = store.begin(uri);

        let old_out = output("var x = 1;", "#define\tvar\tx\tmain.k\t1\n");
        let new_out = output("var y = 1;", "#define\tvar\ty\tmain.k\t1\n");
        assert!(store.apply(uri, new, new_out));
        assert!(!store.apply(uri, old, old_out));

        let kept = store.get(uri).unwrap();
        assert_eq!(kept.index.definitions[0].name, "y");
    }

    #[test]
    fn failed_pass_keeps_previous_state() {
        let mut store = DocumentStore::new();
        let uri = "file:///a.k";
        let first = store.begin(uri);
        assert!(store.apply(uri, first, output("var x = 1;", "#define\tvar\tx\tmain.k\t1\n")));

        // the next pass fails: nothing is applied, the old state survives
        store.begin(uri);
        assert_eq!(store.get(uri).unwrap().index.definitions[0].name, "x");
    }

    #[test]
    fn remove_forgets_state_and_tickets() {
        let mut store = DocumentStore::new();
        let uri = "file:///a.k";
        let t = store.begin(uri);
        store.apply(uri, t, output("var x = 1;", ""));
        store.remove(uri);
        assert!(store.get(uri).is_none());
        assert!(!store.apply(uri, t, output("var x = 1;", "")));
        assert_eq!(store.begin(uri), 1);
    }
}

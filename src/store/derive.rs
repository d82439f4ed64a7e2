use tracing::{debug, trace};

use super::{Store, StoreState};
use crate::filters::{filter_persons, filter_properties};

/// Set of filter pipelines waiting to run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Pipelines {
    properties: bool,
    persons: bool,
}

impl Pipelines {
    pub(crate) const NONE: Pipelines = Pipelines {
        properties: false,
        persons: false,
    };
    pub(crate) const PROPERTIES: Pipelines = Pipelines {
        properties: true,
        persons: false,
    };
    pub(crate) const PERSONS: Pipelines = Pipelines {
        properties: false,
        persons: true,
    };
    pub(crate) const ALL: Pipelines = Pipelines {
        properties: true,
        persons: true,
    };

    fn union(self, other: Pipelines) -> Pipelines {
        Pipelines {
            properties: self.properties || other.properties,
            persons: self.persons || other.persons,
        }
    }

    fn is_empty(&self) -> bool {
        *self == Pipelines::NONE
    }
}

/// How many times each pipeline has actually run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DerivationCounts {
    pub properties: u64,
    pub persons: u64,
}

impl Store {
    /// Queue pipelines to run on the next scheduler turn.
    ///
    /// Requests made before that turn coalesce into one run per pipeline.
    /// That holds on a current-thread runtime; a multi-threaded one may flush
    /// mid-burst.
    pub(crate) fn schedule(&self, state: &mut StoreState, pipelines: Pipelines) {
        let idle = state.scheduled.is_empty();
        state.scheduled = state.scheduled.union(pipelines);
        if !idle || state.scheduled.is_empty() {
            return;
        }

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let store = self.clone();
                handle.spawn(async move { store.flush_derivations() });
            }
            Err(_) => trace!("No runtime, derivation waits for an explicit flush"),
        }
    }

    /// Run every queued pipeline now
    pub fn flush_derivations(&self) {
        let mut state = self.state();
        let pending = std::mem::take(&mut state.scheduled);
        derive(&mut state, pending);
    }
}

/// Recompute the requested filtered views from canonical state
pub(crate) fn derive(state: &mut StoreState, pipelines: Pipelines) {
    if pipelines.properties {
        state.filtered_properties = filter_properties(
            &state.properties,
            &state.persons,
            &state.connections,
            &state.filters,
        );
        state.derivations.properties += 1;
    }
    if pipelines.persons {
        state.filtered_persons = filter_persons(&state.persons, &state.connections, &state.person_filters);
        state.derivations.persons += 1;
    }
    if !pipelines.is_empty() {
        debug!(
            properties = state.filtered_properties.len(),
            persons = state.filtered_persons.len(),
            "Derived filtered views"
        );
    }
}

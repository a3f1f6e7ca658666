use crate::{
    error::IntegrityError,
    id::Key,
    repo::RepositoryHandle,
    trace::{MapTraceEvent, MapTraceSink},
    tree::{self, Map},
};
use serde_json::Value;
use std::{collections::HashMap, rc::Rc};

///
/// ResolvedHandler
///
/// Callback run once a set of internal ids is resolvable, receiving the
/// resolved real keys positionally (null ids pass through as `None`).
///

pub type ResolvedHandler = Box<dyn FnOnce(&[Option<Key>]) -> Result<(), IntegrityError>>;

/// One recorded "apply this real key into this field" instruction.
#[derive(Debug)]
struct PatchRecord {
    token: String,
    primary_key: Key,
    /// Dotted path from the entity root to the receiving leaf.
    field: String,
    /// Entity data as created, used to seed deep patches so sibling
    /// sub-fields written during creation survive the update.
    initial: Map,
    fallback: Option<Value>,
}

/// Deferred patches destined for one repository instance.
///
/// Grouping is by instance identity (`Rc::ptr_eq`), never by structural
/// equality: two distinct repositories are never merged even if they would
/// compare equal.
struct RepoGroup {
    repository: RepositoryHandle,
    records: Vec<PatchRecord>,
}

struct CustomDeferred {
    ids: Vec<Option<String>>,
    handler: ResolvedHandler,
}

///
/// IdResolver
///
/// Deserialize-side counterpart of the id factory: binds internal id tokens
/// to real keys as entities are created, records reference patches that
/// cannot be applied yet, and flushes everything in a single resolution
/// pass once the whole entity tree exists. Creation order is thereby
/// irrelevant: forward and backward references both resolve.
///

#[derive(Default)]
pub struct IdResolver {
    bound: HashMap<String, Key>,
    groups: Vec<RepoGroup>,
    custom: Vec<CustomDeferred>,
    trace: Option<Rc<dyn MapTraceSink>>,
}

impl IdResolver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach an observer for deferral/patch events. Tracing must not
    /// affect resolution semantics.
    #[must_use]
    pub fn with_trace(mut self, sink: Rc<dyn MapTraceSink>) -> Self {
        self.trace = Some(sink);
        self
    }

    fn emit(&self, event: MapTraceEvent) {
        if let Some(sink) = &self.trace {
            sink.on_event(event);
        }
    }

    /// Bind an internal id to the real key of its freshly created entity.
    ///
    /// Bindings are write-once; a duplicate bind means two entities were
    /// created under the same internal id.
    pub fn bind(&mut self, token: &str, key: Key) -> Result<(), IntegrityError> {
        if self.bound.contains_key(token) {
            return Err(IntegrityError::AlreadyBound {
                id: token.to_string(),
            });
        }
        self.bound.insert(token.to_string(), key);

        Ok(())
    }

    /// Record a patch to apply during [`resolve`](Self::resolve).
    ///
    /// Never applied eagerly, even if the token is already bound: patches
    /// are batched per repository and merged per primary key.
    pub fn defer(
        &mut self,
        token: impl Into<String>,
        repository: RepositoryHandle,
        primary_key: Key,
        field: impl Into<String>,
        initial: Map,
        fallback: Option<Value>,
    ) {
        let record = PatchRecord {
            token: token.into(),
            primary_key,
            field: field.into(),
            initial,
            fallback,
        };

        self.emit(MapTraceEvent::ReferenceDeferred {
            token: record.token.clone(),
            path: record.field.clone(),
        });

        let group = self
            .groups
            .iter_mut()
            .find(|group| Rc::ptr_eq(&group.repository, &repository));
        match group {
            Some(group) => group.records.push(record),
            None => self.groups.push(RepoGroup {
                repository,
                records: vec![record],
            }),
        }
    }

    /// Register an arbitrary side effect to run once every listed id is
    /// resolvable. `None` ids pass through as `None` to the handler.
    pub fn defer_custom(&mut self, ids: Vec<Option<String>>, handler: ResolvedHandler) {
        self.custom.push(CustomDeferred { ids, handler });
    }

    /// Single-id convenience over [`defer_custom`](Self::defer_custom).
    pub fn on_resolve<F>(&mut self, token: impl Into<String>, handler: F)
    where
        F: FnOnce(&Key) -> Result<(), IntegrityError> + 'static,
    {
        let token = token.into();
        let fallback_token = token.clone();
        self.defer_custom(
            vec![Some(token)],
            Box::new(move |keys| match keys.first() {
                Some(Some(key)) => handler(key),
                _ => Err(IntegrityError::Unresolved { id: fallback_token }),
            }),
        );
    }

    fn resolve_token(
        bound: &HashMap<String, Key>,
        token: &str,
        fallback: Option<&Value>,
    ) -> Result<Value, IntegrityError> {
        if let Some(key) = bound.get(token) {
            return Ok(key.to_value());
        }
        if let Some(fallback) = fallback {
            return Ok(fallback.clone());
        }

        Err(IntegrityError::Unresolved {
            id: token.to_string(),
        })
    }

    /// Flush every deferred patch and custom handler.
    ///
    /// Consumes the resolver: resolution runs exactly once, after the whole
    /// entity tree has been created. Patches destined for the same primary
    /// key merge into a single nested patch (a dotted field merges into
    /// the created entity's existing root-field value rather than
    /// overwriting it wholesale) and exactly one `update` is issued per
    /// primary key.
    pub fn resolve(mut self) -> Result<(), IntegrityError> {
        let mut patch_count = 0usize;

        // Groups move out of the resolver so events can be emitted while
        // they are walked.
        for group in std::mem::take(&mut self.groups) {
            // Phase 1: merge records into one patch object per primary key,
            // preserving first-encounter order.
            let mut updates: Vec<(Key, Map)> = Vec::new();

            for record in group.records {
                let resolved =
                    Self::resolve_token(&self.bound, &record.token, record.fallback.as_ref())?;

                let position = updates
                    .iter()
                    .position(|(key, _)| *key == record.primary_key)
                    .unwrap_or_else(|| {
                        updates.push((record.primary_key.clone(), Map::new()));
                        updates.len() - 1
                    });
                let patch = &mut updates[position].1;

                let (root, rest) = tree::split_root(&record.field);
                match rest {
                    // Plain field: the resolved key replaces the value.
                    None => {
                        patch.insert(root.to_string(), resolved);
                    }
                    // Deep field: seed from the created entity's root field
                    // so untouched sibling sub-fields survive.
                    Some(rest) => {
                        let slot = patch.entry(root.to_string()).or_insert_with(|| {
                            record
                                .initial
                                .get(root)
                                .cloned()
                                .unwrap_or(Value::Object(Map::new()))
                        });
                        tree::set_path(slot, rest, resolved);
                    }
                }
            }

            // Phase 2: one update per primary key.
            for (primary_key, patch) in updates {
                let fields = patch.len();
                group.repository.update(&primary_key, &patch)?;
                patch_count += 1;

                self.emit(MapTraceEvent::PatchApplied {
                    key: primary_key,
                    fields,
                });
            }
        }

        // Phase 3: custom handlers, with null passthrough.
        let handler_count = self.custom.len();
        for deferred in self.custom.drain(..) {
            let mut keys = Vec::with_capacity(deferred.ids.len());
            for id in &deferred.ids {
                match id {
                    None => keys.push(None),
                    Some(token) => match self.bound.get(token) {
                        Some(key) => keys.push(Some(key.clone())),
                        None => {
                            return Err(IntegrityError::Unresolved { id: token.clone() });
                        }
                    },
                }
            }
            (deferred.handler)(&keys)?;
        }

        self.emit(MapTraceEvent::ResolveFinished {
            patches: patch_count,
            handlers: handler_count,
        });

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{error::IntegrityError, repo::Repository, repo::RepositoryError};
    use serde_json::json;
    use std::cell::RefCell;

    /// Accepts any update and records it for assertions.
    #[derive(Default)]
    struct RecordingRepo {
        updates: RefCell<Vec<(Key, Map)>>,
    }

    impl Repository for RecordingRepo {
        fn create(&self, data: &Map) -> Result<Map, RepositoryError> {
            Ok(data.clone())
        }

        fn update(&self, key: &Key, patch: &Map) -> Result<(), RepositoryError> {
            self.updates.borrow_mut().push((key.clone(), patch.clone()));
            Ok(())
        }

        fn find(&self, _key: &Key) -> Result<Option<Map>, RepositoryError> {
            Ok(None)
        }
    }

    fn as_map(value: serde_json::Value) -> Map {
        value.as_object().expect("fixture must be an object").clone()
    }

    #[test]
    fn bind_is_write_once() {
        let mut resolver = IdResolver::new();
        resolver.bind("foos_0", Key::Int(1)).expect("first bind");

        let err = resolver
            .bind("foos_0", Key::Int(2))
            .expect_err("second bind must fail");
        assert!(matches!(err, IntegrityError::AlreadyBound { id } if id == "foos_0"));
    }

    #[test]
    fn binding_and_custom_handlers_resolve_in_any_order() {
        let mut resolver = IdResolver::new();
        let seen: Rc<RefCell<Vec<Key>>> = Rc::default();

        resolver.bind("foos_0", Key::Int(1)).expect("bind foos_0");
        let sink = Rc::clone(&seen);
        resolver.on_resolve("foos_1", move |key| {
            sink.borrow_mut().push(key.clone());
            Ok(())
        });
        resolver.bind("foos_1", Key::Int(2)).expect("bind foos_1");
        let sink = Rc::clone(&seen);
        resolver.on_resolve("foos_0", move |key| {
            sink.borrow_mut().push(key.clone());
            Ok(())
        });

        resolver.resolve().expect("resolve");
        assert_eq!(*seen.borrow(), vec![Key::Int(2), Key::Int(1)]);
    }

    #[test]
    fn custom_handler_ids_pass_null_through() {
        let mut resolver = IdResolver::new();
        let seen: Rc<RefCell<Vec<Option<Key>>>> = Rc::default();

        resolver.bind("foos_0", Key::Int(1)).expect("bind");
        resolver.bind("foos_1", Key::Int(2)).expect("bind");

        let sink = Rc::clone(&seen);
        resolver.defer_custom(
            vec![Some("foos_0".into()), None, Some("foos_1".into())],
            Box::new(move |keys| {
                sink.borrow_mut().extend(keys.iter().cloned());
                Ok(())
            }),
        );

        resolver.resolve().expect("resolve");
        assert_eq!(
            *seen.borrow(),
            vec![Some(Key::Int(1)), None, Some(Key::Int(2))]
        );
    }

    #[test]
    fn patches_merge_per_primary_key_and_preserve_deep_siblings() {
        let repo = Rc::new(RecordingRepo::default());
        let handle: RepositoryHandle = repo.clone();
        let mut resolver = IdResolver::new();

        let initial = as_map(json!({
            "data": {"color_swatch_id": 0, "opacity": 0.5},
        }));

        resolver.bind("swatches_0", Key::Int(9)).expect("bind");
        resolver.bind("pages_1", Key::Int(4)).expect("bind");

        resolver.defer(
            "swatches_0",
            handle.clone(),
            Key::Int(7),
            "data.color_swatch_id",
            initial.clone(),
            None,
        );
        resolver.defer("pages_1", handle, Key::Int(7), "landing_page_id", initial, None);

        resolver.resolve().expect("resolve");

        let updates = repo.updates.borrow();
        assert_eq!(updates.len(), 1, "one update per primary key");
        let (key, patch) = &updates[0];
        assert_eq!(*key, Key::Int(7));
        assert_eq!(
            serde_json::Value::Object(patch.clone()),
            json!({
                "data": {"color_swatch_id": 9, "opacity": 0.5},
                "landing_page_id": 4,
            })
        );
    }

    #[test]
    fn distinct_repository_instances_are_never_merged() {
        let first = Rc::new(RecordingRepo::default());
        let second = Rc::new(RecordingRepo::default());
        let mut resolver = IdResolver::new();

        resolver.bind("foos_0", Key::Int(1)).expect("bind");
        resolver.defer("foos_0", first.clone(), Key::Int(5), "foo_id", Map::new(), None);
        resolver.defer("foos_0", second.clone(), Key::Int(5), "foo_id", Map::new(), None);

        resolver.resolve().expect("resolve");

        assert_eq!(first.updates.borrow().len(), 1);
        assert_eq!(second.updates.borrow().len(), 1);
    }

    #[derive(Default)]
    struct RecordingSink {
        events: RefCell<Vec<MapTraceEvent>>,
    }

    impl MapTraceSink for RecordingSink {
        fn on_event(&self, event: MapTraceEvent) {
            self.events.borrow_mut().push(event);
        }
    }

    #[test]
    fn resolving_emits_patch_events_as_updates_are_issued() {
        let repo = Rc::new(RecordingRepo::default());
        let sink = Rc::new(RecordingSink::default());
        let mut resolver = IdResolver::new().with_trace(sink.clone());

        resolver.bind("foos_0", Key::Int(1)).expect("bind");
        resolver.defer("foos_0", repo.clone(), Key::Int(5), "foo_id", Map::new(), None);
        resolver.defer("foos_0", repo, Key::Int(6), "foo_id", Map::new(), None);

        resolver.resolve().expect("resolve");

        let events = sink.events.borrow();
        let patches: Vec<&MapTraceEvent> = events
            .iter()
            .filter(|event| matches!(event, MapTraceEvent::PatchApplied { .. }))
            .collect();
        assert_eq!(
            patches,
            vec![
                &MapTraceEvent::PatchApplied {
                    key: Key::Int(5),
                    fields: 1,
                },
                &MapTraceEvent::PatchApplied {
                    key: Key::Int(6),
                    fields: 1,
                },
            ]
        );
        assert!(events.iter().any(|event| matches!(
            event,
            MapTraceEvent::ResolveFinished {
                patches: 2,
                handlers: 0,
            }
        )));
    }

    #[test]
    fn unresolved_without_fallback_fails_and_fallback_substitutes() {
        let repo = Rc::new(RecordingRepo::default());

        let mut failing = IdResolver::new();
        failing.defer("ghosts_0", repo.clone(), Key::Int(1), "ghost_id", Map::new(), None);
        let err = failing.resolve().expect_err("unresolved id must fail");
        assert!(matches!(err, IntegrityError::Unresolved { id } if id == "ghosts_0"));

        let mut falling_back = IdResolver::new();
        falling_back.defer(
            "ghosts_0",
            repo.clone(),
            Key::Int(1),
            "ghost_id",
            Map::new(),
            Some(json!(0)),
        );
        falling_back.resolve().expect("fallback must substitute");

        let updates = repo.updates.borrow();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].1.get("ghost_id"), Some(&json!(0)));
    }
}

use crate::event::{EventType, Routable};
use crate::registry::FinderCache;
use fxhash::FxHashMap;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::debug;

/// Types that route objects of one concrete type, concrete type first.
pub(crate) type HierarchySet = Arc<[EventType]>;

/// Namespaces that never take part in routing.
pub const DEFAULT_EXCLUDED_NAMESPACES: &[&str] = &["core::", "alloc::", "std::"];

/// Flattens ancestor chains and memoizes them per concrete type.
///
/// Two caches are kept. The posting hierarchy holds every ancestor outside the
/// excluded namespaces. The registration hierarchy keeps only those that the
/// finder reports capabilities for, so it is always a subset of the posting one.
#[derive(Debug)]
pub(crate) struct HierarchyResolver {
    excluded: Vec<String>,
    posting: RwLock<FxHashMap<EventType, HierarchySet>>,
    registration: RwLock<FxHashMap<EventType, HierarchySet>>,
}

impl HierarchyResolver {
    pub(crate) fn new(excluded: Vec<String>) -> Self {
        Self {
            excluded,
            posting: RwLock::new(FxHashMap::default()),
            registration: RwLock::new(FxHashMap::default()),
        }
    }

    pub(crate) fn for_posting(&self, value: &dyn Routable) -> HierarchySet {
        memoize(&self.posting, EventType::of_val(value), || self.lineage(value))
    }

    pub(crate) fn for_registration(&self, value: &dyn Routable, finder: &FinderCache) -> HierarchySet {
        memoize(&self.registration, EventType::of_val(value), || {
            self.lineage(value)
                .into_iter()
                .filter(|ty| !finder.lookup(*ty).is_empty())
                .collect()
        })
    }

    /// Walks the supertype chain outward, stopping at the first excluded ancestor.
    fn lineage(&self, value: &dyn Routable) -> Vec<EventType> {
        let mut types = vec![EventType::of_val(value)];
        let mut current = value.supertype();

        while let Some(parent) = current {
            let ty = EventType::of_val(parent);
            if self.is_excluded(ty) || types.contains(&ty) {
                break;
            }
            types.push(ty);
            current = parent.supertype();
        }

        types
    }

    fn is_excluded(&self, ty: EventType) -> bool {
        self.excluded.iter().any(|prefix| ty.name().starts_with(prefix.as_str()))
    }
}

fn memoize(
    cache: &RwLock<FxHashMap<EventType, HierarchySet>>,
    key: EventType,
    compute: impl FnOnce() -> Vec<EventType>,
) -> HierarchySet {
    if let Some(found) = cache.read().get(&key) {
        return Arc::clone(found);
    }

    let computed: HierarchySet = compute().into();

    let mut entries = cache.write();
    Arc::clone(entries.entry(key).or_insert_with(|| {
        debug!(event = key.name(), depth = computed.len(), "Flattened type hierarchy");
        computed
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Registry;

    struct Root;
    impl Routable for Root {}

    struct Base {
        root: Root,
    }
    impl Routable for Base {
        fn supertype(&self) -> Option<&dyn Routable> {
            Some(&self.root)
        }
    }

    struct Leaf {
        base: Base,
    }
    impl Routable for Leaf {
        fn supertype(&self) -> Option<&dyn Routable> {
            Some(&self.base)
        }
    }

    struct Looping;
    impl Routable for Looping {
        fn supertype(&self) -> Option<&dyn Routable> {
            Some(self)
        }
    }

    fn leaf() -> Leaf {
        Leaf { base: Base { root: Root } }
    }

    fn resolver() -> HierarchyResolver {
        HierarchyResolver::new(DEFAULT_EXCLUDED_NAMESPACES.iter().map(|s| (*s).to_owned()).collect())
    }

    #[test]
    fn test_posting_hierarchy_is_ordered_from_concrete_type() {
        let set = resolver().for_posting(&leaf());

        assert_eq!(
            &*set,
            &[EventType::of::<Leaf>(), EventType::of::<Base>(), EventType::of::<Root>()]
        );
    }

    #[test]
    fn test_walk_stops_at_excluded_namespace() {
        let resolver = HierarchyResolver::new(vec![std::any::type_name::<Base>().to_owned()]);
        let set = resolver.for_posting(&leaf());

        assert_eq!(&*set, &[EventType::of::<Leaf>()]);
    }

    #[test]
    fn test_concrete_type_is_never_excluded() {
        let resolver = HierarchyResolver::new(vec![std::any::type_name::<Root>().to_owned()]);
        let set = resolver.for_posting(&Root);

        assert_eq!(&*set, &[EventType::of::<Root>()]);
    }

    #[test]
    fn test_self_referencing_supertype_terminates() {
        let set = resolver().for_posting(&Looping);
        assert_eq!(&*set, &[EventType::of::<Looping>()]);
    }

    #[test]
    fn test_results_are_cached_per_concrete_type() {
        let resolver = resolver();
        let first = resolver.for_posting(&leaf());
        let second = resolver.for_posting(&leaf());

        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_registration_hierarchy_keeps_only_capable_types() {
        let registry = Registry::builder().subscribe::<Base, Root>(|_, _| {}).build();
        let finder = FinderCache::new(Arc::new(registry));
        let resolver = resolver();

        let registration = resolver.for_registration(&leaf(), &finder);
        let posting = resolver.for_posting(&leaf());

        assert_eq!(&*registration, &[EventType::of::<Base>()]);
        assert!(registration.iter().all(|ty| posting.contains(ty)));
    }
}

//! Subscriber identity and per-publish filter predicates.
//!
//! A filter answers one question about a subscriber: should this publish skip
//! it? Filters are pure, never allocate while evaluating, and are combined by
//! [`PublishConfig`](crate::PublishConfig) with OR semantics.

use crate::error::{DispatchError, Result};
use std::any::{Any, TypeId};
use std::collections::HashSet;
use std::fmt;
use std::rc::{Rc, Weak};

/// Reference identity of a subscriber instance.
///
/// Two ids are equal only when they come from the same `Rc` allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(usize);

impl SubscriberId {
    /// Identity of a live subscriber.
    pub fn of<S>(subscriber: &Rc<S>) -> Self {
        Self(Rc::as_ptr(subscriber) as usize)
    }

    /// Identity of an allocation kept alive by a weak reference, whether or
    /// not the value itself has been dropped.
    pub(crate) fn of_weak<S>(subscriber: &Weak<S>) -> Self {
        Self(Weak::as_ptr(subscriber) as usize)
    }
}

/// Anything that can name a subscriber instance.
///
/// `None` and dead weak references name nothing, which filter constructors
/// reject with [`DispatchError::InvalidArgument`].
pub trait AsSubscriberId {
    fn subscriber_id(&self) -> Option<SubscriberId>;
}

impl AsSubscriberId for SubscriberId {
    fn subscriber_id(&self) -> Option<SubscriberId> {
        Some(*self)
    }
}

impl<S> AsSubscriberId for Rc<S> {
    fn subscriber_id(&self) -> Option<SubscriberId> {
        Some(SubscriberId::of(self))
    }
}

impl<S> AsSubscriberId for Weak<S> {
    fn subscriber_id(&self) -> Option<SubscriberId> {
        self.upgrade().map(|subscriber| SubscriberId::of(&subscriber))
    }
}

impl<T: AsSubscriberId + ?Sized> AsSubscriberId for &T {
    fn subscriber_id(&self) -> Option<SubscriberId> {
        (**self).subscriber_id()
    }
}

impl<T: AsSubscriberId> AsSubscriberId for Option<T> {
    fn subscriber_id(&self) -> Option<SubscriberId> {
        self.as_ref().and_then(AsSubscriberId::subscriber_id)
    }
}

/// Borrowed view of a subscriber handed to filters.
pub struct SubscriberView<'a> {
    id: SubscriberId,
    type_id: TypeId,
    type_name: &'static str,
    subscriber: &'a dyn Any,
}

impl<'a> SubscriberView<'a> {
    pub fn new<S: Any>(subscriber: &'a Rc<S>) -> Self {
        Self {
            id: SubscriberId::of(subscriber),
            type_id: TypeId::of::<S>(),
            type_name: std::any::type_name::<S>(),
            subscriber: subscriber.as_ref(),
        }
    }

    pub fn id(&self) -> SubscriberId {
        self.id
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// True when the concrete subscriber type is exactly `T`.
    pub fn is<T: Any>(&self) -> bool {
        self.type_id == TypeId::of::<T>()
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&'a T> {
        self.subscriber.downcast_ref::<T>()
    }
}

impl fmt::Debug for SubscriberView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriberView")
            .field("id", &self.id)
            .field("type_name", &self.type_name)
            .finish()
    }
}

/// A set of subscriber identities used by the set filters.
///
/// Cloning is cheap; the underlying set is shared and copied on write, so a
/// filter keeps seeing the set as it was when the filter was built.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriberSet {
    ids: Rc<HashSet<SubscriberId>>,
}

impl SubscriberSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a set from subscriber references, failing on any that name
    /// nothing.
    pub fn from_subscribers<I>(subscribers: I) -> Result<Self>
    where
        I: IntoIterator,
        I::Item: AsSubscriberId,
    {
        let mut set = Self::new();
        for subscriber in subscribers {
            set.insert(subscriber)?;
        }
        Ok(set)
    }

    /// Adds a subscriber; returns whether it was newly inserted.
    pub fn insert(&mut self, subscriber: impl AsSubscriberId) -> Result<bool> {
        let id = require_id(&subscriber, "set member")?;
        Ok(Rc::make_mut(&mut self.ids).insert(id))
    }

    pub fn remove(&mut self, subscriber: impl AsSubscriberId) -> bool {
        match subscriber.subscriber_id() {
            Some(id) => Rc::make_mut(&mut self.ids).remove(&id),
            None => false,
        }
    }

    pub fn contains(&self, id: SubscriberId) -> bool {
        self.ids.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

impl FromIterator<SubscriberId> for SubscriberSet {
    fn from_iter<I: IntoIterator<Item = SubscriberId>>(iter: I) -> Self {
        Self {
            ids: Rc::new(iter.into_iter().collect()),
        }
    }
}

/// Predicate deciding whether a subscriber is skipped for one publish.
#[derive(Clone)]
pub struct Filter {
    kind: FilterKind,
}

#[derive(Clone)]
enum FilterKind {
    ExcludeInstance(SubscriberId),
    IncludeOnlyInstance(SubscriberId),
    ExcludeSet(SubscriberSet),
    IncludeOnlySet(SubscriberSet),
    ExcludeType(TypeId, &'static str),
    IncludeOnlyType(TypeId, &'static str),
    Custom(Rc<dyn Fn(&SubscriberView<'_>) -> bool>),
}

impl Filter {
    /// Skips exactly the given instance.
    pub fn exclude_instance(target: impl AsSubscriberId) -> Result<Self> {
        let id = require_id(&target, "exclude_instance target")?;
        Ok(Self {
            kind: FilterKind::ExcludeInstance(id),
        })
    }

    /// Skips every instance except the given one.
    pub fn include_only_instance(target: impl AsSubscriberId) -> Result<Self> {
        let id = require_id(&target, "include_only_instance target")?;
        Ok(Self {
            kind: FilterKind::IncludeOnlyInstance(id),
        })
    }

    /// Skips every member of the set.
    pub fn exclude_set(set: &SubscriberSet) -> Result<Self> {
        require_members(set, "exclude_set")?;
        Ok(Self {
            kind: FilterKind::ExcludeSet(set.clone()),
        })
    }

    /// Skips every instance outside the set.
    pub fn include_only_set(set: &SubscriberSet) -> Result<Self> {
        require_members(set, "include_only_set")?;
        Ok(Self {
            kind: FilterKind::IncludeOnlySet(set.clone()),
        })
    }

    /// Skips subscribers whose concrete type is `T`.
    pub fn exclude_type<T: Any>() -> Self {
        Self {
            kind: FilterKind::ExcludeType(TypeId::of::<T>(), std::any::type_name::<T>()),
        }
    }

    /// Skips subscribers whose concrete type is not `T`.
    pub fn include_only_type<T: Any>() -> Self {
        Self {
            kind: FilterKind::IncludeOnlyType(TypeId::of::<T>(), std::any::type_name::<T>()),
        }
    }

    /// Skips subscribers for which `predicate` returns true.
    pub fn custom(predicate: impl Fn(&SubscriberView<'_>) -> bool + 'static) -> Self {
        Self {
            kind: FilterKind::Custom(Rc::new(predicate)),
        }
    }

    /// True when this filter excludes the subscriber from the publish.
    pub fn excludes(&self, subscriber: &SubscriberView<'_>) -> bool {
        match &self.kind {
            FilterKind::ExcludeInstance(id) => subscriber.id() == *id,
            FilterKind::IncludeOnlyInstance(id) => subscriber.id() != *id,
            FilterKind::ExcludeSet(set) => set.contains(subscriber.id()),
            FilterKind::IncludeOnlySet(set) => !set.contains(subscriber.id()),
            FilterKind::ExcludeType(type_id, _) => subscriber.type_id() == *type_id,
            FilterKind::IncludeOnlyType(type_id, _) => subscriber.type_id() != *type_id,
            FilterKind::Custom(predicate) => predicate(subscriber),
        }
    }
}

impl fmt::Debug for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            FilterKind::ExcludeInstance(id) => f.debug_tuple("ExcludeInstance").field(id).finish(),
            FilterKind::IncludeOnlyInstance(id) => {
                f.debug_tuple("IncludeOnlyInstance").field(id).finish()
            }
            FilterKind::ExcludeSet(set) => f.debug_tuple("ExcludeSet").field(&set.len()).finish(),
            FilterKind::IncludeOnlySet(set) => {
                f.debug_tuple("IncludeOnlySet").field(&set.len()).finish()
            }
            FilterKind::ExcludeType(_, name) => f.debug_tuple("ExcludeType").field(name).finish(),
            FilterKind::IncludeOnlyType(_, name) => {
                f.debug_tuple("IncludeOnlyType").field(name).finish()
            }
            FilterKind::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

fn require_id(target: &impl AsSubscriberId, what: &str) -> Result<SubscriberId> {
    target
        .subscriber_id()
        .ok_or_else(|| DispatchError::InvalidArgument(format!("{what} names no live subscriber")))
}

fn require_members(set: &SubscriberSet, what: &str) -> Result<()> {
    if set.is_empty() {
        return Err(DispatchError::InvalidArgument(format!(
            "{what} requires a non-empty subscriber set"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Alpha;
    struct Beta {
        tag: u8,
    }

    #[test]
    fn instance_filters_compare_identity() {
        let a = Rc::new(Alpha);
        let other = Rc::new(Alpha);
        let view = SubscriberView::new(&a);
        let other_view = SubscriberView::new(&other);

        let exclude = Filter::exclude_instance(&a).unwrap();
        assert!(exclude.excludes(&view));
        assert!(!exclude.excludes(&other_view));

        let only = Filter::include_only_instance(&a).unwrap();
        assert!(!only.excludes(&view));
        assert!(only.excludes(&other_view));
    }

    #[test]
    fn missing_or_dead_targets_are_rejected() {
        let none: Option<&Rc<Alpha>> = None;
        assert!(matches!(
            Filter::exclude_instance(none),
            Err(DispatchError::InvalidArgument(_))
        ));

        let weak = Rc::downgrade(&Rc::new(Alpha));
        assert!(matches!(
            Filter::include_only_instance(&weak),
            Err(DispatchError::InvalidArgument(_))
        ));

        let live = Rc::new(Alpha);
        assert!(Filter::exclude_instance(Some(&live)).is_ok());
        assert!(Filter::exclude_instance(Rc::downgrade(&live)).is_ok());
    }

    #[test]
    fn set_filters_require_members() {
        let empty = SubscriberSet::new();
        assert!(matches!(
            Filter::exclude_set(&empty),
            Err(DispatchError::InvalidArgument(_))
        ));
        assert!(matches!(
            Filter::include_only_set(&empty),
            Err(DispatchError::InvalidArgument(_))
        ));
    }

    #[test]
    fn set_filters_check_membership() {
        let a = Rc::new(Alpha);
        let b = Rc::new(Beta { tag: 1 });
        let c = Rc::new(Alpha);
        let set = SubscriberSet::from_subscribers([SubscriberId::of(&a), SubscriberId::of(&b)])
            .unwrap();

        let exclude = Filter::exclude_set(&set).unwrap();
        assert!(exclude.excludes(&SubscriberView::new(&a)));
        assert!(exclude.excludes(&SubscriberView::new(&b)));
        assert!(!exclude.excludes(&SubscriberView::new(&c)));

        let only = Filter::include_only_set(&set).unwrap();
        assert!(!only.excludes(&SubscriberView::new(&b)));
        assert!(only.excludes(&SubscriberView::new(&c)));
    }

    #[test]
    fn set_is_copied_on_write() {
        let a = Rc::new(Alpha);
        let c = Rc::new(Alpha);
        let mut set = SubscriberSet::new();
        assert!(set.insert(&a).unwrap());
        assert!(!set.insert(&a).unwrap());

        let filter = Filter::exclude_set(&set).unwrap();
        set.insert(&c).unwrap();

        assert_eq!(set.len(), 2);
        assert!(!filter.excludes(&SubscriberView::new(&c)));
        assert!(set.remove(&c));
        assert!(!set.remove(&c));
    }

    #[test]
    fn type_filters_use_concrete_type() {
        let a = Rc::new(Alpha);
        let b = Rc::new(Beta { tag: 7 });

        let exclude = Filter::exclude_type::<Alpha>();
        assert!(exclude.excludes(&SubscriberView::new(&a)));
        assert!(!exclude.excludes(&SubscriberView::new(&b)));

        let only = Filter::include_only_type::<Alpha>();
        assert!(!only.excludes(&SubscriberView::new(&a)));
        assert!(only.excludes(&SubscriberView::new(&b)));
    }

    #[test]
    fn custom_filter_can_inspect_subscriber() {
        let b = Rc::new(Beta { tag: 7 });
        let quiet = Rc::new(Beta { tag: 0 });
        let filter = Filter::custom(|view| {
            view.downcast_ref::<Beta>()
                .map(|beta| beta.tag == 0)
                .unwrap_or(false)
        });

        assert!(!filter.excludes(&SubscriberView::new(&b)));
        assert!(filter.excludes(&SubscriberView::new(&quiet)));
        assert!(!filter.excludes(&SubscriberView::new(&Rc::new(Alpha))));
    }

    #[test]
    fn view_reports_type_information() {
        let b = Rc::new(Beta { tag: 2 });
        let view = SubscriberView::new(&b);
        assert!(view.is::<Beta>());
        assert!(!view.is::<Alpha>());
        assert_eq!(view.type_id(), TypeId::of::<Beta>());
        assert!(view.type_name().ends_with("Beta"));
        assert_eq!(view.id(), SubscriberId::of(&b));
    }
}
